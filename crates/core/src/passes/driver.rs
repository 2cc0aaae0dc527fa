use std::fmt;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

use super::{AnalysisContext, AnalysisPass, AnalysisPassResult, PassError};
use crate::model::Module;

/// Progress of one pass within a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PassState {
    Pending,
    Loaded,
    Transformed,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Load,
    Transform,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Load => f.write_str("load"),
            Stage::Transform => f.write_str("transform"),
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("pass '{pass}' depends on '{dependency}', which does not run before it")]
    MissingDependency { pass: String, dependency: String },
    #[error("pass '{pass}' failed during {stage}: {source}")]
    StageFailed {
        pass: String,
        stage: Stage,
        #[source]
        source: PassError,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub name: String,
    pub ruleset: String,
    pub state: PassState,
    pub result: AnalysisPassResult,
}

/// Outcome of a successful pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub pipeline: String,
    pub passes: Vec<PassReport>,
}

impl PipelineReport {
    pub fn result(&self, pass: &str) -> Option<&AnalysisPassResult> {
        self.passes.iter().find(|p| p.name == pass).map(|p| &p.result)
    }

    pub fn warnings(&self) -> impl Iterator<Item = (&str, &str)> {
        self.passes
            .iter()
            .flat_map(|p| p.result.warnings.iter().map(move |w| (p.name.as_str(), w.as_str())))
    }
}

/// Ordered chain of passes run against one module.
///
/// Passes run strictly in registration order. Each pass receives the result of
/// the pass it depends on (or, without a declared dependency, the result of the
/// pass just before it).
pub struct PassPipeline {
    name: String,
    passes: Vec<Box<dyn AnalysisPass>>,
    states: Vec<PassState>,
}

impl PassPipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), passes: Vec::new(), states: Vec::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add<P: AnalysisPass + 'static>(&mut self, pass: P) -> &mut Self {
        self.add_boxed(Box::new(pass))
    }

    pub fn add_boxed(&mut self, pass: Box<dyn AnalysisPass>) -> &mut Self {
        self.passes.push(pass);
        self.states.push(PassState::Pending);
        self
    }

    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn passes(&self) -> impl Iterator<Item = &dyn AnalysisPass> {
        self.passes.iter().map(|p| &**p)
    }

    /// State each pass reached in the most recent run.
    pub fn states(&self) -> Vec<(&'static str, PassState)> {
        self.passes.iter().zip(&self.states).map(|(p, s)| (p.name(), *s)).collect()
    }

    /// Check that every declared dependency names a pass registered earlier.
    pub fn validate(&self) -> Result<(), PipelineError> {
        for (i, pass) in self.passes.iter().enumerate() {
            let Some(dependency) = pass.dependency() else {
                continue;
            };
            if !self.passes[..i].iter().any(|p| p.name() == dependency) {
                return Err(PipelineError::MissingDependency {
                    pass: pass.name().to_string(),
                    dependency: dependency.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Run every pass against `module`.
    ///
    /// Dependencies are validated up front, so a `MissingDependency` failure
    /// leaves the module untouched. A stage failure aborts the remaining passes.
    pub fn run(
        &mut self,
        ctx: &AnalysisContext<'_>,
        module: &mut Module,
    ) -> Result<PipelineReport, PipelineError> {
        self.states.iter_mut().for_each(|s| *s = PassState::Pending);
        self.validate()?;

        let mut reports: Vec<PassReport> = Vec::with_capacity(self.passes.len());
        for (i, pass) in self.passes.iter().enumerate() {
            let name = pass.name();
            let started = Instant::now();
            let mut result = AnalysisPassResult::new(name);

            let previous = match pass.dependency() {
                Some(dependency) => reports.iter().find(|r| r.name == dependency),
                None => reports.last(),
            }
            .map(|r| &r.result);

            if pass.has_load() {
                log::info!("{}: loading {name} ({})", self.name, pass.source_ruleset());
                pass.load(&mut result, ctx, module, previous).map_err(|source| {
                    PipelineError::StageFailed { pass: name.to_string(), stage: Stage::Load, source }
                })?;
            }
            self.states[i] = PassState::Loaded;

            if pass.has_transform() {
                log::info!("{}: transforming with {name}", self.name);
                pass.transform(&mut result, ctx, module).map_err(|source| {
                    PipelineError::StageFailed {
                        pass: name.to_string(),
                        stage: Stage::Transform,
                        source,
                    }
                })?;
            }
            self.states[i] = PassState::Transformed;

            result.elapsed = started.elapsed();
            self.states[i] = PassState::Done;
            reports.push(PassReport {
                name: name.to_string(),
                ruleset: pass.source_ruleset().to_string(),
                state: PassState::Done,
                result,
            });
        }

        Ok(PipelineReport { pipeline: self.name.clone(), passes: reports })
    }
}

impl fmt::Debug for PassPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PassPipeline")
            .field("name", &self.name)
            .field("passes", &self.states())
            .finish()
    }
}
