use anyhow::Result;
use serde::Serialize;

use disasm_core::config::{build_pipeline, load_pipeline_config};

use crate::resolve_path;

#[derive(Debug, Serialize)]
pub struct PlannedPass {
    pub name: String,
    pub ruleset: String,
    pub dependency: Option<String>,
    pub load: bool,
    pub transform: bool,
}

#[derive(Debug, Serialize)]
pub struct PlanInfo {
    pub pipeline: String,
    pub passes: Vec<PlannedPass>,
}

/// Load a pipeline config, validate it and print its passes in run order.
pub fn plan_command(config: &str, json: bool) -> Result<()> {
    let path = resolve_path(config)?;
    let config = load_pipeline_config(&path)?;
    let pipeline = build_pipeline(&config)?;

    let plan = PlanInfo {
        pipeline: pipeline.name().to_string(),
        passes: pipeline
            .passes()
            .map(|pass| PlannedPass {
                name: pass.name().to_string(),
                ruleset: pass.source_ruleset().to_string(),
                dependency: pass.dependency().map(str::to_string),
                load: pass.has_load(),
                transform: pass.has_transform(),
            })
            .collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
        return Ok(());
    }

    println!("Pipeline: {}", plan.pipeline);
    for (i, pass) in plan.passes.iter().enumerate() {
        match &pass.dependency {
            Some(dep) => println!("  {}. {} [{}] after '{}'", i + 1, pass.name, pass.ruleset, dep),
            None => println!("  {}. {} [{}]", i + 1, pass.name, pass.ruleset),
        }
    }

    Ok(())
}
