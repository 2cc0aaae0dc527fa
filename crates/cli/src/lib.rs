use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};

pub mod commands;

/// Resolve `path` against the current directory when it is relative.
pub fn resolve_path(path: &str) -> Result<PathBuf> {
    let p = Path::new(path);
    if p.is_absolute() {
        return Ok(p.to_path_buf());
    }
    let cwd = env::current_dir().context("Failed to get current directory")?;
    Ok(cwd.join(p))
}

/// Parse a decimal or `0x`-prefixed hexadecimal address.
pub fn parse_address(text: &str) -> Result<u64> {
    let text = text.trim();
    let parsed = match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => text.parse::<u64>(),
    };
    parsed.map_err(|_| anyhow!("Invalid address: {text}"))
}
