use anyhow::Result;
use serde::Serialize;

use disasm_core::targets::{default_target_registry, TargetDescriptor};

#[derive(Debug, Serialize)]
pub struct TargetInfo {
    pub target: String,
    pub descriptor: TargetDescriptor,
    pub program: String,
}

/// List the target pipelines known to this binary.
pub fn targets_command(json: bool) -> Result<()> {
    let registry = default_target_registry();
    let entries: Vec<TargetInfo> = registry
        .specs()
        .map(|spec| TargetInfo {
            target: spec.descriptor.to_string(),
            descriptor: spec.descriptor,
            program: spec.program.to_string(),
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("Targets: (none)");
        return Ok(());
    }

    println!("Targets:");
    for entry in entries {
        println!("- {}: {}", entry.target, entry.program);
    }

    Ok(())
}
