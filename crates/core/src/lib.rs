//! disasm-core
//!
//! Fact extraction and pass orchestration for a rule-based disassembler.
//!
//! This crate turns a binary (container metadata, sections, instruction bytes)
//! into named relations for an external rule engine, and drives the chain of
//! analysis passes that feed the engine's conclusions back into the module.
//!
//! All substantive logic lives here so it is testable and reusable from
//! multiple frontends.

pub mod facts;
pub mod model;
pub mod engine;
pub mod decoders;
pub mod loaders;
pub mod targets;
pub mod passes;
pub mod config;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
