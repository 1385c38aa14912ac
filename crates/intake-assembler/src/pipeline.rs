//! Assembled import pipelines
//!
//! A [`Pipeline`] holds the compiled stages of one importer:
//!
//! ```text
//! [SourceReader?] → [Transformer?] → [Validator?] → [FilterChain?] → TargetWriter
//! ```
//!
//! Records are processed one at a time by [`Pipeline::process`]:
//! source validation, transformation, target validation, filters, then
//! materialization and whole-object validation.

use serde::Serialize;
use serde_json::Value;

use intake_core::capabilities::{ExecutionContext, Record, RecordSink, RecordSource};

use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::stages::{FilterChain, Materializer, RecordValidator, Transformer, Violation};

/// Stage kinds in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    /// Reads records from the configured source
    SourceReader,
    /// Applies field mappings
    Transformer,
    /// Checks constraints
    Validator,
    /// Drops records
    FilterChain,
    /// Writes records or objects to the target
    TargetWriter,
}

/// Result of processing one record
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Value to write to the target
    Accepted(Value),
    /// The record failed validation
    Rejected(Vec<Violation>),
    /// A filter dropped the record
    Filtered,
}

/// Inspectable summary of an assembled pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelinePlan {
    /// Importer name
    pub importer: String,
    /// Stages in execution order
    pub stages: Vec<StageKind>,
    /// Source endpoint label
    pub source: Option<String>,
    /// Target endpoint label
    pub target: String,
    /// `(from, to, converter)` per mapping
    pub mappings: Vec<(String, String, Option<String>)>,
    /// Filter names in order
    pub filters: Vec<String>,
    /// Class of materialized objects
    pub object_class: Option<String>,
    /// Static context
    pub context: Option<Value>,
}

/// The compiled stages of one importer
pub struct Pipeline {
    pub(crate) importer: String,
    pub(crate) context: Option<Value>,
    pub(crate) source: Option<Endpoint>,
    pub(crate) target: Endpoint,
    pub(crate) transformer: Option<Transformer>,
    pub(crate) validator: Option<RecordValidator>,
    pub(crate) filters: Option<FilterChain>,
    pub(crate) materializer: Option<Materializer>,
    pub(crate) writes_objects: bool,
}

impl Pipeline {
    /// Importer name
    pub fn importer(&self) -> &str {
        &self.importer
    }

    /// Static context
    pub fn context(&self) -> Option<&Value> {
        self.context.as_ref()
    }

    /// Configured source, if any
    pub fn source(&self) -> Option<&Endpoint> {
        self.source.as_ref()
    }

    /// Target
    pub fn target(&self) -> &Endpoint {
        &self.target
    }

    /// Stages in execution order
    pub fn stages(&self) -> Vec<StageKind> {
        let mut stages = Vec::with_capacity(5);
        if self.source.is_some() {
            stages.push(StageKind::SourceReader);
        }
        if self.transformer.is_some() {
            stages.push(StageKind::Transformer);
        }
        if self.validator.is_some() {
            stages.push(StageKind::Validator);
        }
        if self.filters.is_some() {
            stages.push(StageKind::FilterChain);
        }
        stages.push(StageKind::TargetWriter);
        stages
    }

    /// Summary for inspection and comparison
    pub fn plan(&self) -> PipelinePlan {
        PipelinePlan {
            importer: self.importer.clone(),
            stages: self.stages(),
            source: self.source.as_ref().map(|s| s.label().to_string()),
            target: self.target.label().to_string(),
            mappings: self
                .transformer
                .iter()
                .flat_map(|t| t.mappings())
                .map(|m| {
                    (
                        m.from().to_string(),
                        m.target().to_string(),
                        m.converter().map(str::to_string),
                    )
                })
                .collect(),
            filters: self
                .filters
                .iter()
                .flat_map(|f| f.names())
                .map(str::to_string)
                .collect(),
            object_class: self.materializer.as_ref().map(|m| m.class().to_string()),
            context: self.context.clone(),
        }
    }

    /// Open the configured source
    pub fn open_source(&self) -> Result<Option<Box<dyn RecordSource>>> {
        self.source.as_ref().map(Endpoint::open_reader).transpose()
    }

    /// Open the target
    pub fn open_target(&self) -> Result<Box<dyn RecordSink>> {
        self.target.open_writer()
    }

    /// Run one record through every stage
    ///
    /// Validation failures and filtering are outcomes; errors are collaborator
    /// failures.
    pub fn process(&self, record: Record, row: usize) -> Result<Outcome> {
        let ctx = ExecutionContext {
            importer: &self.importer,
            context: self.context.as_ref(),
            row,
        };

        if let Some(validator) = &self.validator {
            let violations = validator.check_source(&record)?;
            if !violations.is_empty() {
                return Ok(Outcome::Rejected(violations));
            }
        }

        let record = match &self.transformer {
            Some(transformer) => transformer.apply(record, &ctx)?,
            None => record,
        };

        if let Some(validator) = &self.validator {
            let violations = validator.check_target(&record)?;
            if !violations.is_empty() {
                return Ok(Outcome::Rejected(violations));
            }
        }

        if let Some(filters) = &self.filters {
            if !filters.accept(&record, &ctx)? {
                return Ok(Outcome::Filtered);
            }
        }

        let Some(materializer) = &self.materializer else {
            return Ok(Outcome::Accepted(Value::Object(record)));
        };

        let (object, plain) = if self.writes_objects {
            (materializer.materialize(record)?, None)
        } else {
            (materializer.materialize(record.clone())?, Some(record))
        };

        if let Some(validator) = &self.validator {
            let violations = validator.check_object(&object)?;
            if !violations.is_empty() {
                return Ok(Outcome::Rejected(violations));
            }
        }

        Ok(Outcome::Accepted(match plain {
            Some(record) => Value::Object(record),
            None => object,
        }))
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("importer", &self.importer)
            .field("stages", &self.stages())
            .field("source", &self.source)
            .field("target", &self.target)
            .finish()
    }
}
