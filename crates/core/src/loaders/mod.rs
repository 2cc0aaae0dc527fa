//! Fact loaders and their composition into per-target pipelines.
//!
//! A loader reads a [`Module`] and appends relations to a [`FactStore`].
//! Plain functions are loaders; parameterised loaders (decoders, the data
//! loader) are structs carrying their configuration. A [`CompositeLoader`]
//! runs an ordered list of them and is itself a loader, so pipelines nest.
//!
//! Loader order is a convention of pipeline assembly and is not checked at
//! run time: decoders resolve bytes through the module's sections, so they are
//! registered after the module and section loaders.

mod elf;
mod module;
mod raw;

use thiserror::Error;

use crate::engine::RuleEngine;
use crate::facts::FactStore;
use crate::model::Module;

pub use elf::{elf_dynamic_entry_loader, elf_exception_loader, elf_symbol_loader};
pub use module::{
    binary_endianness, binary_format, binary_isa, binary_type, module_loader, section_loader,
    DataLoader, PointerSize,
};
pub use raw::raw_entry_loader;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("capstone init failed: {0}")]
    Capstone(String),
}

impl LoaderError {
    pub(crate) fn capstone(err: capstone::Error) -> Self {
        LoaderError::Capstone(err.to_string())
    }
}

/// Byte order a parameterised loader is configured for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Endian {
    Little,
    Big,
}

/// Anything that can populate relations from a module.
pub trait Loader {
    fn populate(&self, module: &Module, facts: &mut FactStore);
}

impl<F> Loader for F
where
    F: Fn(&Module, &mut FactStore),
{
    fn populate(&self, module: &Module, facts: &mut FactStore) {
        self(module, facts)
    }
}

/// Loader constructed from a configuration value.
pub trait BuildLoader: Loader + Sized {
    type Config;

    fn build(config: Self::Config) -> Result<Self, LoaderError>;
}

/// Ordered, named sequence of loaders forming one pipeline.
pub struct CompositeLoader {
    name: String,
    loaders: Vec<Box<dyn Loader>>,
}

impl CompositeLoader {
    /// `name` is the rule program the pipeline's facts are meant for.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), loaders: Vec::new() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.loaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.loaders.is_empty()
    }

    /// Append a loader.
    pub fn add<L: Loader + 'static>(&mut self, loader: L) -> &mut Self {
        self.loaders.push(Box::new(loader));
        self
    }

    /// Append a newly built loader of kind `T`.
    pub fn add_built<T: BuildLoader + 'static>(
        &mut self,
        config: T::Config,
    ) -> Result<&mut Self, LoaderError> {
        let loader = T::build(config)?;
        Ok(self.add(loader))
    }

    /// Instantiate a fresh store for this pipeline's program and populate it.
    ///
    /// Returns `None` when the engine has no program under this pipeline's name.
    pub fn load(&self, module: &Module, engine: &dyn RuleEngine) -> Option<FactStore> {
        let Some(mut facts) = engine.instantiate(&self.name) else {
            log::warn!("rule program '{}' could not be instantiated", self.name);
            return None;
        };
        self.populate(module, &mut facts);
        Some(facts)
    }
}

impl Loader for CompositeLoader {
    fn populate(&self, module: &Module, facts: &mut FactStore) {
        log::debug!("running {} loaders of pipeline {}", self.loaders.len(), self.name);
        for loader in &self.loaders {
            loader.populate(module, facts);
        }
    }
}

impl std::fmt::Debug for CompositeLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompositeLoader")
            .field("name", &self.name)
            .field("loaders", &self.loaders.len())
            .finish()
    }
}
