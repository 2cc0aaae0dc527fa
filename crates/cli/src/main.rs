use anyhow::Result;
use clap::{Parser, Subcommand};

use disasm_facts::commands::{facts_command, plan_command, targets_command, FactsArgs};

/// Fact extraction frontend for the rule-based disassembler.
///
/// This CLI is a thin wrapper around `disasm-core` (exposed in code as `disasm_core`).
/// All substantive logic lives in the library so it can be tested thoroughly
/// and reused from other frontends.
#[derive(Parser, Debug)]
#[command(
    name = "disasm-facts",
    version,
    about = "Extract disassembly facts from binaries",
    long_about = None
)]
struct Cli {
    /// Enable debug logging (overridden by RUST_LOG).
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the registered target pipelines.
    Targets {
        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Run a binary through its target pipeline and summarize the relations produced.
    Facts {
        /// Path to the binary (ELF/PE, or raw bytes with `--raw`).
        #[arg(long)]
        binary: String,

        /// Treat the input as headerless machine code.
        #[arg(long, default_value_t = false)]
        raw: bool,

        /// Instruction set of a raw input (mips32, arm, x64).
        #[arg(long, requires = "raw")]
        isa: Option<String>,

        /// Byte order of a raw input (`be` or `le`).
        #[arg(long, default_value = "le")]
        endian: String,

        /// Load address of a raw input (decimal or 0x-prefixed hex).
        #[arg(long, default_value = "0")]
        base: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },

    /// Validate a pipeline config and show the passes it would run.
    Plan {
        /// Path to a JSON or YAML pipeline config.
        #[arg(long)]
        config: String,

        /// Emit JSON instead of human-readable text.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match cli.command {
        Command::Targets { json } => targets_command(json)?,
        Command::Facts { binary, raw, isa, endian, base, json } => {
            facts_command(&FactsArgs { binary, raw, isa, endian, base, json })?
        }
        Command::Plan { config, json } => plan_command(&config, json)?,
    }

    Ok(())
}
