//! Seam to the external rule engine.
//!
//! The engine is an opaque relational solver: it hands out a fresh
//! [`FactStore`] for a named program, accepts bulk relation inserts into that
//! store, and appends its derived output relations when run.

use std::collections::HashMap;

use thiserror::Error;

use crate::facts::FactStore;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no rule program registered under '{0}'")]
    UnknownProgram(String),
    #[error("rule program '{program}' failed: {message}")]
    Evaluation { program: String, message: String },
}

/// Trait implemented by rule engines.
pub trait RuleEngine: Send + Sync {
    /// Create an empty store bound to `program`, or `None` if no such program exists.
    fn instantiate(&self, program: &str) -> Option<FactStore>;

    /// Evaluate the store's program, appending derived relations to `facts`.
    fn run(&self, facts: &mut FactStore) -> Result<(), EngineError>;
}

type Rules = Box<dyn Fn(&mut FactStore) -> Result<(), EngineError> + Send + Sync>;

/// Engine whose programs are Rust closures over the fact store.
#[derive(Default)]
pub struct InMemoryEngine {
    programs: HashMap<String, Rules>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self { programs: HashMap::new() }
    }

    pub fn register<F>(&mut self, program: impl Into<String>, rules: F) -> &mut Self
    where
        F: Fn(&mut FactStore) -> Result<(), EngineError> + Send + Sync + 'static,
    {
        self.programs.insert(program.into(), Box::new(rules));
        self
    }

    /// Register a program that derives nothing (fact extraction only).
    pub fn register_empty(&mut self, program: impl Into<String>) -> &mut Self {
        self.register(program, |_| Ok(()))
    }

    /// Sorted program names, for diagnostics.
    pub fn names(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.programs.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl RuleEngine for InMemoryEngine {
    fn instantiate(&self, program: &str) -> Option<FactStore> {
        self.programs.contains_key(program).then(|| FactStore::new(program))
    }

    fn run(&self, facts: &mut FactStore) -> Result<(), EngineError> {
        let rules = self
            .programs
            .get(facts.program())
            .ok_or_else(|| EngineError::UnknownProgram(facts.program().to_string()))?;
        log::debug!("running rule program {}", facts.program());
        rules(facts)
    }
}
