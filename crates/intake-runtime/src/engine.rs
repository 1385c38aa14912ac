//! Import engine
//!
//! The engine owns one configuration document for its whole life:
//!
//! 1. `bootstrap` normalizes, validates and types the document, then fills the
//!    storage provider and importer registries (both stay empty when no
//!    importer is configured).
//! 2. Pipelines are assembled on first use and cached per importer, or all at
//!    bootstrap when [`EngineOptions::eager`] is set.
//! 3. `run` streams the records of one job through its pipeline; `run_all`
//!    runs independent jobs concurrently.

use anyhow::Context;
use futures::future::join_all;
use once_cell::sync::OnceCell;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{debug, info, trace};

use intake_assembler::{
    DuplicatePolicy, Outcome, Pipeline, PipelineAssembler, Services, StorageHandle,
    StorageProviderRegistry,
};
use intake_core::{EngineConfig, ImporterConfig, ImporterRegistry, SourceDescriptor};

use crate::error::Result;
use crate::import::{ImportJob, ImportReport, ImporterSelection, JobSource};

/// Bootstrap options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineOptions {
    /// Handling of duplicate storage provider names
    pub policy: DuplicatePolicy,

    /// Assemble every pipeline during bootstrap
    pub eager: bool,

    /// Upper bound on jobs `run_all` runs at once
    pub max_concurrent_jobs: usize,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            policy: DuplicatePolicy::default(),
            eager: false,
            max_concurrent_jobs: 4,
        }
    }
}

impl EngineOptions {
    /// Set the duplicate provider policy
    pub fn with_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Assemble every pipeline during bootstrap
    pub fn eager(mut self) -> Self {
        self.eager = true;
        self
    }

    /// Set the concurrency bound of `run_all`
    pub fn with_max_concurrent_jobs(mut self, jobs: usize) -> Self {
        self.max_concurrent_jobs = jobs.max(1);
        self
    }
}

/// Registries, cached pipelines and the record runner of one configuration
pub struct ImportEngine {
    config: EngineConfig,
    importers: ImporterRegistry,
    providers: StorageProviderRegistry,
    assembler: PipelineAssembler,
    pipelines: HashMap<String, OnceCell<Arc<Pipeline>>>,
    jobs: Semaphore,
}

impl ImportEngine {
    /// Build an engine from a raw configuration document
    pub fn bootstrap(document: &Value, services: Services, options: EngineOptions) -> Result<Self> {
        let config = EngineConfig::from_document(document)?;
        info!(
            fingerprint = %config.fingerprint(),
            importers = config.importers.len(),
            providers = config.storage_providers.len(),
            "Bootstrapping import engine"
        );

        let mut providers =
            StorageProviderRegistry::new(services.clone()).with_policy(options.policy);
        let importers = if config.is_enabled() {
            providers.populate(&config)?;
            ImporterRegistry::from_config(&config)?
        } else {
            info!("No importer configured, import engine disabled");
            ImporterRegistry::new()
        };

        let pipelines = importers
            .names()
            .map(|name| (name.to_string(), OnceCell::new()))
            .collect();

        let engine = Self {
            config,
            importers,
            providers,
            assembler: PipelineAssembler::new(services),
            pipelines,
            jobs: Semaphore::new(options.max_concurrent_jobs.max(1)),
        };

        if options.eager {
            for name in engine.importers.names() {
                engine.pipeline(name)?;
            }
            debug!(pipelines = engine.pipelines.len(), "Assembled every pipeline");
        }

        info!(
            importers = engine.importers.len(),
            providers = engine.providers.len(),
            "Import engine ready"
        );
        Ok(engine)
    }

    /// Typed configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Whether any importer is configured
    pub fn is_enabled(&self) -> bool {
        self.config.is_enabled()
    }

    /// Importer registry
    pub fn importers(&self) -> &ImporterRegistry {
        &self.importers
    }

    /// Storage provider registry
    pub fn providers(&self) -> &StorageProviderRegistry {
        &self.providers
    }

    /// Importer matching `descriptor`
    pub fn resolve(&self, descriptor: &SourceDescriptor) -> Result<&Arc<ImporterConfig>> {
        Ok(self.importers.resolve(descriptor)?)
    }

    /// Storage `id` of the provider `provider`
    pub fn storage(&self, provider: &str, id: &str) -> Result<StorageHandle> {
        Ok(self.providers.resolve(provider)?.select(id)?)
    }

    /// Pipeline of the importer `name`, assembled on first call
    pub fn pipeline(&self, name: &str) -> Result<Arc<Pipeline>> {
        let importer = self.importers.get(name)?;
        let cell = self
            .pipelines
            .get(name)
            .with_context(|| format!("no pipeline slot for importer '{name}'"))?;
        let pipeline = cell.get_or_try_init(|| {
            debug!(importer = %name, "Assembling pipeline on first use");
            self.assembler.assemble(importer).map(Arc::new)
        })?;
        Ok(pipeline.clone())
    }

    /// Run one job to completion
    ///
    /// Rejected and filtered records are counted in the report; a failing
    /// collaborator aborts the run.
    pub async fn run(&self, job: ImportJob) -> Result<ImportReport> {
        let ImportJob { selection, source } = job;

        let name = match &selection {
            ImporterSelection::Named(name) => name.clone(),
            ImporterSelection::Describe(descriptor) => self.resolve(descriptor)?.name.clone(),
            ImporterSelection::FromStorage => {
                let JobSource::Storage(storage) = &source else {
                    anyhow::bail!("automatic resolution from storage needs a storage source");
                };
                let descriptor = storage.describe()?;
                self.resolve(&descriptor)?.name.clone()
            }
        };
        let pipeline = self.pipeline(&name)?;

        let mut reader = match source {
            JobSource::Configured => pipeline
                .open_source()?
                .with_context(|| format!("importer '{name}' has no source"))?,
            JobSource::Storage(storage) => storage.open()?,
            JobSource::Records(records) => records,
        };
        let mut writer = pipeline.open_target()?;

        info!(importer = %name, target = %pipeline.target().label(), "Import started");
        let mut report = ImportReport::new(&name);
        while let Some(record) = reader
            .next_record()
            .await
            .map_err(|e| intake_assembler::Error::capability("record source", e))?
        {
            let row = report.read;
            report.read += 1;
            match pipeline.process(record, row)? {
                Outcome::Accepted(value) => {
                    writer
                        .write(value)
                        .await
                        .map_err(|e| intake_assembler::Error::capability("record sink", e))?;
                    report.written += 1;
                }
                Outcome::Rejected(violations) => {
                    debug!(importer = %name, row, violations = violations.len(), "Record rejected");
                    report.reject(row, violations);
                }
                Outcome::Filtered => {
                    trace!(importer = %name, row, "Record filtered");
                    report.filtered += 1;
                }
            }
        }
        writer
            .flush()
            .await
            .map_err(|e| intake_assembler::Error::capability("record sink", e))?;

        info!(
            importer = %name,
            read = report.read,
            written = report.written,
            filtered = report.filtered,
            invalid = report.invalid,
            "Import finished"
        );
        Ok(report)
    }

    /// Run independent jobs concurrently; reports come back in job order
    pub async fn run_all(
        &self,
        jobs: impl IntoIterator<Item = ImportJob>,
    ) -> Vec<Result<ImportReport>> {
        join_all(jobs.into_iter().map(|job| async move {
            let _permit = self.jobs.acquire().await?;
            self.run(job).await
        }))
        .await
    }
}

impl std::fmt::Debug for ImportEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportEngine")
            .field("fingerprint", &self.config.fingerprint())
            .field("importers", &self.importers.names().collect::<Vec<_>>())
            .field("providers", &self.providers)
            .finish()
    }
}
