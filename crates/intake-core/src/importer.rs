//! Importer registry and automatic importer resolution

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::config::{EngineConfig, ImporterConfig};
use crate::error::{Error, Result};
use crate::precondition::{PreconditionMatcher, SourceDescriptor};

/// A registered importer and its compiled precondition
#[derive(Debug, Clone)]
pub struct RegisteredImporter {
    config: Arc<ImporterConfig>,
    matcher: PreconditionMatcher,
}

impl RegisteredImporter {
    /// Importer name
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Importer configuration
    pub fn config(&self) -> &Arc<ImporterConfig> {
        &self.config
    }

    /// Compiled precondition
    pub fn matcher(&self) -> &PreconditionMatcher {
        &self.matcher
    }
}

/// Importers by name, in registration order
#[derive(Debug, Clone, Default)]
pub struct ImporterRegistry {
    entries: Vec<RegisteredImporter>,
    by_name: HashMap<String, usize>,
}

impl ImporterRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every importer of `config` in document order
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let mut registry = Self::new();
        for importer in &config.importers {
            registry.register(importer.clone())?;
        }
        Ok(registry)
    }

    /// Register an importer, compiling its precondition
    pub fn register(&mut self, config: ImporterConfig) -> Result<()> {
        let matcher = PreconditionMatcher::compile(&config.name, config.precondition.as_ref())?;
        self.register_with(config, matcher)
    }

    /// Register an importer with an already compiled precondition
    pub fn register_with(
        &mut self,
        config: ImporterConfig,
        matcher: PreconditionMatcher,
    ) -> Result<()> {
        if self.by_name.contains_key(&config.name) {
            return Err(Error::DuplicateImporter { name: config.name });
        }
        debug!(
            importer = %config.name,
            catch_all = matcher.is_catch_all(),
            "Registered importer"
        );
        self.by_name.insert(config.name.clone(), self.entries.len());
        self.entries.push(RegisteredImporter {
            config: Arc::new(config),
            matcher,
        });
        Ok(())
    }

    /// Look up an importer by name
    pub fn get(&self, name: &str) -> Result<&Arc<ImporterConfig>> {
        self.by_name
            .get(name)
            .map(|&i| &self.entries[i].config)
            .ok_or_else(|| Error::UnknownImporter {
                name: name.to_string(),
            })
    }

    /// Pick the importer whose precondition matches `source`
    ///
    /// Importers with a populated precondition take precedence; a single
    /// specific match wins. Catch-all importers are only used when nothing
    /// specific matches. More than one winner on the same level is an error,
    /// never a silent pick.
    pub fn resolve(&self, source: &SourceDescriptor) -> Result<&Arc<ImporterConfig>> {
        let (catch_alls, specific): (Vec<_>, Vec<_>) = self
            .entries
            .iter()
            .filter(|entry| entry.matcher.matches(source))
            .partition(|entry| entry.matcher.is_catch_all());

        let winners = if specific.is_empty() { catch_alls } else { specific };

        match winners.as_slice() {
            [winner] => {
                debug!(importer = %winner.name(), ?source, "Resolved importer");
                Ok(&winner.config)
            }
            [] => Err(Error::NoMatchingImporter {
                candidates: self.names().map(str::to_string).collect(),
            }),
            _ => Err(Error::AmbiguousImporter {
                candidates: winners.iter().map(|e| e.name().to_string()).collect(),
            }),
        }
    }

    /// Importer names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(RegisteredImporter::name)
    }

    /// Registered importers in registration order
    pub fn iter(&self) -> impl Iterator<Item = &RegisteredImporter> {
        self.entries.iter()
    }

    /// Number of registered importers
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
