//! Analysis passes and the driver that sequences them.
//!
//! A pass optionally loads facts and runs its rule program (`load`), then
//! optionally applies the derived relations to the module (`transform`).
//! Passes communicate only through [`AnalysisPassResult`]s, which the driver
//! threads from one pass into the next.

mod disassembly;
mod driver;
mod function_inference;
mod no_return;

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::engine::{EngineError, RuleEngine};
use crate::facts::{FactStore, Row, Value};
use crate::model::Module;
use crate::row;
use crate::targets::{TargetError, TargetRegistry};

pub use disassembly::DisassemblyPass;
pub use driver::{PassPipeline, PassReport, PassState, PipelineError, PipelineReport, Stage};
pub use function_inference::FunctionInferencePass;
pub use no_return::NoReturnAnalysisPass;

#[derive(Debug, Error)]
pub enum PassError {
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error("rule program '{0}' could not be instantiated")]
    EngineInstantiationFailed(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("malformed relation {relation}: {reason}")]
    MalformedRelation { relation: String, reason: String },
    #[error("no result from '{0}' was provided")]
    MissingPrevious(String),
}

/// Shared collaborators handed to every pass stage.
#[derive(Clone, Copy)]
pub struct AnalysisContext<'a> {
    pub engine: &'a dyn RuleEngine,
    pub targets: &'a TargetRegistry,
}

impl<'a> AnalysisContext<'a> {
    pub fn new(engine: &'a dyn RuleEngine, targets: &'a TargetRegistry) -> Self {
        Self { engine, targets }
    }
}

/// Output of one pass, read-only once the pass completes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnalysisPassResult {
    pub pass: String,
    /// Facts the pass submitted plus the relations its program derived.
    pub facts: Option<FactStore>,
    pub warnings: Vec<String>,
    pub elapsed: Duration,
}

impl AnalysisPassResult {
    pub fn new(pass: impl Into<String>) -> Self {
        Self { pass: pass.into(), ..Self::default() }
    }

    /// Rows of `relation` in this result's facts; empty when absent.
    pub fn rows(&self, relation: &str) -> &[Row] {
        self.facts.as_ref().map(|f| f.rows(relation)).unwrap_or(&[])
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{}: {}", self.pass, message);
        self.warnings.push(message);
    }
}

/// One analysis pass.
pub trait AnalysisPass {
    fn name(&self) -> &'static str;

    /// Rule program this pass drives.
    fn source_ruleset(&self) -> &'static str;

    fn has_load(&self) -> bool {
        true
    }

    fn has_transform(&self) -> bool {
        true
    }

    /// Name of a pass that must run earlier in the same pipeline.
    fn dependency(&self) -> Option<&'static str> {
        None
    }

    fn load(
        &self,
        _result: &mut AnalysisPassResult,
        _ctx: &AnalysisContext<'_>,
        _module: &Module,
        _previous: Option<&AnalysisPassResult>,
    ) -> Result<(), PassError> {
        Ok(())
    }

    fn transform(
        &self,
        _result: &mut AnalysisPassResult,
        _ctx: &AnalysisContext<'_>,
        _module: &mut Module,
    ) -> Result<(), PassError> {
        Ok(())
    }
}

/// Instantiate `program`, failing when the engine does not know it.
pub(crate) fn instantiate(ctx: &AnalysisContext<'_>, program: &str) -> Result<FactStore, PassError> {
    ctx.engine
        .instantiate(program)
        .ok_or_else(|| PassError::EngineInstantiationFailed(program.to_string()))
}

/// Submit the module's current blocks, edges and named symbols.
pub(crate) fn submit_module_graph(module: &Module, facts: &mut FactStore) {
    facts.insert("block", module.code_blocks.values().map(|b| row![b.address, b.size]));
    facts.insert(
        "cfg_edge",
        module.cfg_edges.iter().map(|e| row![e.from, e.to, e.kind.as_str()]),
    );
    facts.insert(
        "symbol",
        module
            .symbols
            .iter()
            .filter_map(|s| s.address.map(|address| row![address, s.name.as_str()])),
    );
}

fn malformed(relation: &str, reason: String) -> PassError {
    PassError::MalformedRelation { relation: relation.to_string(), reason }
}

/// Check a derived row's arity before reading columns.
pub(crate) fn expect_arity(relation: &str, row: &[Value], arity: usize) -> Result<(), PassError> {
    if row.len() != arity {
        return Err(malformed(relation, format!("expected {arity} columns, found {}", row.len())));
    }
    Ok(())
}

pub(crate) fn unsigned_at(relation: &str, row: &[Value], column: usize) -> Result<u64, PassError> {
    row.get(column)
        .and_then(Value::as_unsigned)
        .ok_or_else(|| malformed(relation, format!("column {column} is not an address")))
}

pub(crate) fn symbol_at<'r>(
    relation: &str,
    row: &'r [Value],
    column: usize,
) -> Result<&'r str, PassError> {
    row.get(column)
        .and_then(Value::as_symbol)
        .ok_or_else(|| malformed(relation, format!("column {column} is not a symbol")))
}

