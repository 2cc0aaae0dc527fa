//! Pipeline configuration files.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::passes::{
    AnalysisPass, DisassemblyPass, FunctionInferencePass, NoReturnAnalysisPass, PassPipeline,
    PipelineError,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown pass '{0}'")]
    UnknownPass(String),
    #[error("unsupported config format '{0}' (expected .json, .yaml or .yml)")]
    UnsupportedFormat(String),
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
}

/// Named, ordered list of passes to run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub name: String,
    pub passes: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            passes: PASS_NAMES.iter().map(|p| p.to_string()).collect(),
        }
    }
}

/// Every built-in pass, in dependency order.
pub const PASS_NAMES: &[&str] = &["disassembly", "no return analysis", "function inference"];

/// Instantiate a built-in pass by name.
pub fn pass_by_name(name: &str) -> Option<Box<dyn AnalysisPass>> {
    match name {
        "disassembly" => Some(Box::new(DisassemblyPass)),
        "no return analysis" => Some(Box::new(NoReturnAnalysisPass)),
        "function inference" => Some(Box::new(FunctionInferencePass)),
        _ => None,
    }
}

/// Build and validate the pipeline a config describes.
pub fn build_pipeline(config: &PipelineConfig) -> Result<PassPipeline, ConfigError> {
    let mut pipeline = PassPipeline::new(config.name.clone());
    for name in &config.passes {
        let pass = pass_by_name(name).ok_or_else(|| ConfigError::UnknownPass(name.clone()))?;
        pipeline.add_boxed(pass);
    }
    pipeline.validate()?;
    Ok(pipeline)
}

/// Load a pipeline config; the format follows the file extension.
pub fn load_pipeline_config(path: &Path) -> Result<PipelineConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("Failed to read pipeline config at {}", path.display()))?;
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("").to_ascii_lowercase();
    let config = match extension.as_str() {
        "json" => serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse JSON config {}", path.display()))?,
        "yaml" | "yml" => serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse YAML config {}", path.display()))?,
        other => return Err(ConfigError::UnsupportedFormat(other.to_string()).into()),
    };
    Ok(config)
}
