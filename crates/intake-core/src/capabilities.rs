//! Capabilities supplied by the host application
//!
//! Everything that touches the outside world (codecs, database connections,
//! application services, converters, constraint checks, object materialization,
//! filters, expressions) is reached through one of these traits. The pipeline
//! assembler only wires them together. Collaborator failures are reported as
//! [`anyhow::Error`].

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

use crate::config::{FileFormat, FormatSpec, ObjectFactoryKind};

/// One record, field name to value in field order
pub type Record = Map<String, Value>;

// ============================================================================
// Record streams
// ============================================================================

/// A stream of records read from a storage
#[async_trait]
pub trait RecordSource: Send {
    /// Read the next record; `None` at the end of the stream
    async fn next_record(&mut self) -> anyhow::Result<Option<Record>>;
}

/// A storage records are written to
#[async_trait]
pub trait RecordSink: Send {
    /// Write one record or materialized object
    async fn write(&mut self, value: Value) -> anyhow::Result<()>;

    /// Flush buffered writes
    async fn flush(&mut self) -> anyhow::Result<()>;
}

// ============================================================================
// Files
// ============================================================================

/// A file codec
pub trait Format: Send + Sync {
    /// Header fields of the file at `path`
    fn header_fields(&self, path: &Path) -> anyhow::Result<Vec<String>>;

    /// Open `path` for reading
    fn reader(&self, path: &Path) -> anyhow::Result<Box<dyn RecordSource>>;

    /// Open `path` for writing
    fn writer(&self, path: &Path) -> anyhow::Result<Box<dyn RecordSink>>;
}

/// Builds codecs from `format` specs
pub trait FormatFactory: Send + Sync {
    /// Codec for `spec`; unknown codec types are an error
    fn create(&self, spec: &FormatSpec) -> anyhow::Result<Arc<dyn Format>>;
}

/// Detects the format of an existing file
pub trait FormatDiscovery: Send + Sync {
    /// Detected format (if it is a precondition format) and a codec to read it
    fn discover(&self, path: &Path) -> anyhow::Result<(Option<FileFormat>, Arc<dyn Format>)>;
}

// ============================================================================
// Connections and services
// ============================================================================

/// Named database connections
pub trait ConnectionFactory: Send + Sync {
    /// Connection registered under `name`
    fn get(&self, name: &str) -> anyhow::Result<Arc<dyn Connection>>;
}

/// A database connection
pub trait Connection: Send + Sync {
    /// Stream the rows of `statement`
    fn reader(&self, statement: &str) -> anyhow::Result<Box<dyn RecordSource>>;

    /// Persist records as `entity`
    fn writer(&self, entity: &str) -> anyhow::Result<Box<dyn RecordSink>>;
}

/// Application services by name
pub trait ServiceLocator: Send + Sync {
    /// Records produced by `service`; `method` defaults to the service's own
    fn reader(&self, service: &str, method: Option<&str>)
    -> anyhow::Result<Box<dyn RecordSource>>;

    /// A sink calling `service` for each record
    fn writer(&self, service: &str, method: Option<&str>) -> anyhow::Result<Box<dyn RecordSink>>;
}

// ============================================================================
// Record processing
// ============================================================================

/// What a converter or filter sees besides the value itself
#[derive(Debug, Clone, Copy)]
pub struct ExecutionContext<'a> {
    /// Importer name
    pub importer: &'a str,
    /// Static context configured on the importer
    pub context: Option<&'a Value>,
    /// Zero-based index of the record being processed
    pub row: usize,
}

/// Converters by name
pub trait ConverterProvider: Send + Sync {
    /// Converter registered under `name`
    fn resolve(&self, name: &str) -> Option<Arc<dyn Converter>>;
}

/// Converts one field value
pub trait Converter: Send + Sync {
    /// Converted value
    fn convert(&self, value: Value, ctx: &ExecutionContext<'_>) -> anyhow::Result<Value>;
}

/// Constraint checks
pub trait Validator: Send + Sync {
    /// Violation messages of `value` against the constraint `constraint`
    fn check(&self, value: &Value, constraint: &str) -> anyhow::Result<Vec<String>>;

    /// Violation messages of a materialized object of `class`
    fn check_object(&self, class: &str, object: &Value) -> anyhow::Result<Vec<String>>;
}

/// Object factories by kind and class
pub trait ObjectFactoryProvider: Send + Sync {
    /// Factory materializing `class`, if one exists
    fn factory(&self, kind: ObjectFactoryKind, class: &str) -> Option<Arc<dyn ObjectFactory>>;
}

/// Materializes records into objects
pub trait ObjectFactory: Send + Sync {
    /// Object built from `record`
    fn materialize(&self, record: Record) -> anyhow::Result<Value>;
}

/// Filters by name
pub trait FilterProvider: Send + Sync {
    /// Filter registered under `name`
    fn resolve(&self, name: &str) -> Option<Arc<dyn Filter>>;
}

/// Decides whether a record is imported
pub trait Filter: Send + Sync {
    /// `false` drops the record
    fn accept(&self, record: &Record, ctx: &ExecutionContext<'_>) -> anyhow::Result<bool>;
}

/// Evaluates deferred `@=` expressions
pub trait ExpressionEvaluator: Send + Sync {
    /// Evaluated expression
    fn evaluate(&self, expression: &str) -> anyhow::Result<String>;
}
