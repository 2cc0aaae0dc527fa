use std::collections::BTreeMap;
use std::fs;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;

use disasm_core::engine::InMemoryEngine;
use disasm_core::model::{ByteOrder, Isa, Module};
use disasm_core::targets::{default_target_registry, TargetDescriptor};

use crate::{parse_address, resolve_path};

/// Arguments of the `facts` command.
#[derive(Debug, Clone)]
pub struct FactsArgs {
    pub binary: String,
    pub raw: bool,
    pub isa: Option<String>,
    pub endian: String,
    pub base: String,
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub struct FactsSummary {
    pub binary: String,
    pub target: TargetDescriptor,
    pub program: String,
    pub relations: BTreeMap<String, usize>,
}

fn parse_byte_order(text: &str) -> Result<ByteOrder> {
    match text.to_ascii_lowercase().as_str() {
        "be" | "big" => Ok(ByteOrder::Big),
        "le" | "little" => Ok(ByteOrder::Little),
        other => Err(anyhow!("Invalid byte order '{other}' (expected be or le)")),
    }
}

/// Build the module described by `args`.
pub fn load_module(args: &FactsArgs) -> Result<Module> {
    let path = resolve_path(&args.binary)?;
    let bytes = fs::read(&path)
        .with_context(|| format!("Failed to read binary at {}", path.display()))?;
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or(&args.binary).to_string();

    if args.raw {
        let isa_name = args.isa.as_deref().ok_or_else(|| anyhow!("--raw requires --isa"))?;
        let isa = Isa::from_name(isa_name).ok_or_else(|| anyhow!("Unknown ISA '{isa_name}'"))?;
        let byte_order = parse_byte_order(&args.endian)?;
        let base = parse_address(&args.base)?;
        let mut module = Module::raw(bytes, isa, byte_order, base);
        module.name = name;
        return Ok(module);
    }

    Module::from_bytes(name, &bytes)
        .with_context(|| format!("Failed to parse binary at {}", path.display()))
}

/// Run the target pipeline for a binary and report per-relation row counts.
pub fn facts_command(args: &FactsArgs) -> Result<()> {
    let module = load_module(args)?;
    let registry = default_target_registry();
    let descriptor = module.target_descriptor();
    let pipeline = registry.pipeline(&descriptor)?;

    let mut engine = InMemoryEngine::new();
    for program in registry.programs() {
        engine.register_empty(program);
    }
    let facts = pipeline
        .load(&module, &engine)
        .ok_or_else(|| anyhow!("Rule program '{}' could not be instantiated", pipeline.name()))?;

    let summary = FactsSummary {
        binary: module.name.clone(),
        target: descriptor,
        program: pipeline.name().to_string(),
        relations: facts.summary(),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Facts for {}", summary.binary);
    println!("  Target: {}", summary.target);
    println!("  Program: {}", summary.program);
    println!("  Relations:");
    for (relation, rows) in &summary.relations {
        println!("    {relation}: {rows}");
    }

    Ok(())
}
