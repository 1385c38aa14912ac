//! Pipeline assembler
//!
//! Compiles an [`ImporterConfig`] into a [`Pipeline`]. Assembly is a pure
//! function of the configuration and the supplied [`Services`]: every
//! capability the configuration needs is checked and every name that can be
//! looked up without touching storage (object factories, filters, codecs) is
//! resolved, but no storage is opened.

use std::sync::Arc;
use tracing::debug;

use intake_core::ImporterConfig;
use intake_core::capabilities::Filter;

use crate::endpoint::{Endpoint, Role};
use crate::error::{Error, Result};
use crate::pipeline::Pipeline;
use crate::services::Services;
use crate::stages::{FilterChain, Materializer, RecordValidator, TargetCheck, Transformer};

/// Builds pipelines from importer configurations
#[derive(Debug, Clone)]
pub struct PipelineAssembler {
    services: Services,
}

impl PipelineAssembler {
    /// Assembler resolving capabilities from `services`
    pub fn new(services: Services) -> Self {
        Self { services }
    }

    /// Supplied capabilities
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Assemble the pipeline of `importer`
    pub fn assemble(&self, importer: &ImporterConfig) -> Result<Pipeline> {
        let name = importer.name.as_str();
        let required_by = format!("importer '{name}'");
        debug!(importer = %name, "Assembling pipeline");

        let materializer = match &importer.object_factory {
            Some(config) => {
                let factory = self
                    .services
                    .object_factories(&required_by)?
                    .factory(config.kind, &config.class)
                    .ok_or_else(|| {
                        Error::assembly(
                            name,
                            format!("no object factory for class '{}'", config.class),
                        )
                    })?;
                debug!(importer = %name, class = %config.class, "Object factory resolved");
                Some(Materializer::new(config.kind, config.class.clone(), factory))
            }
            None => None,
        };

        let target = Endpoint::resolve(name, Role::Target, &importer.target, &self.services)?;
        debug!(importer = %name, target = %target.label(), "Target resolved");

        let source = importer
            .source
            .as_ref()
            .map(|source| Endpoint::resolve(name, Role::Source, source, &self.services))
            .transpose()?;

        let transformer = if importer.mappings.is_empty() {
            None
        } else {
            let needs_converters = importer.mappings.iter().any(|(_, r)| r.converter.is_some());
            let converters = if needs_converters {
                Some(self.services.converters(&required_by)?)
            } else {
                None
            };
            debug!(importer = %name, mappings = importer.mappings.len(), "Transformer built");
            Some(Transformer::new(&importer.mappings, converters))
        };

        let validator = match &importer.validation {
            Some(validation) if !validation.is_empty() => {
                let mut validator = RecordValidator::new(
                    self.services.validator(&required_by)?.clone(),
                    validation.effective_options(),
                );
                if let Some(source) = &validation.source {
                    validator = validator.with_source(source.clone());
                }
                if let Some(target) = &validation.target {
                    let check = match &materializer {
                        Some(m) => TargetCheck::Object {
                            class: m.class().to_string(),
                        },
                        None => TargetCheck::Fields(target.clone()),
                    };
                    validator = validator.with_target(check);
                }
                debug!(
                    importer = %name,
                    options = ?validation.effective_options(),
                    "Validator built"
                );
                Some(validator)
            }
            _ => None,
        };

        let filters = if importer.filters.is_empty() {
            None
        } else {
            let provider = self.services.filters(&required_by)?;
            let filters = importer
                .filters
                .iter()
                .map(|filter| {
                    provider
                        .resolve(filter)
                        .map(|f| (filter.clone(), f))
                        .ok_or_else(|| Error::assembly(name, format!("unknown filter '{filter}'")))
                })
                .collect::<Result<Vec<(String, Arc<dyn Filter>)>>>()?;
            debug!(importer = %name, filters = filters.len(), "Filter chain built");
            Some(FilterChain::new(filters))
        };

        let pipeline = Pipeline {
            importer: name.to_string(),
            context: importer.context.clone(),
            writes_objects: materializer.is_some() && importer.target.is_object_producing(),
            source,
            target,
            transformer,
            validator,
            filters,
            materializer,
        };
        debug!(importer = %name, stages = ?pipeline.stages(), "Pipeline assembled");
        Ok(pipeline)
    }
}
