//! In-memory capability implementations
//!
//! Small, dependency-free implementations of the capability traits, used by
//! the unit and integration tests of the Intake crates and enabled by the
//! `testing` feature. Files are streamed through a CSV codec; connections and
//! services read and write buffers of an [`ArrayStore`].

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use intake_core::FileFormat;
use intake_core::capabilities::{
    Connection, ConnectionFactory, Converter, ConverterProvider, ExecutionContext,
    ExpressionEvaluator, Filter, FilterProvider, Format, FormatDiscovery, FormatFactory,
    ObjectFactory, ObjectFactoryProvider, Record, RecordSink, RecordSource, ServiceLocator,
    Validator,
};
use intake_core::config::{FormatSpec, ObjectFactoryKind};

use crate::array::{ArraySink, ArraySource, ArrayStore};

// ============================================================================
// Files
// ============================================================================

/// Delimited text read and written with the `csv` crate; the first row is the header
#[derive(Debug, Clone, Copy)]
pub struct CsvFormat {
    delimiter: u8,
}

impl CsvFormat {
    /// Codec splitting on `delimiter`
    pub fn new(delimiter: u8) -> Self {
        Self { delimiter }
    }

    fn open(&self, path: &Path) -> anyhow::Result<csv::Reader<BufReader<File>>> {
        let file = File::open(path)?;
        Ok(csv::ReaderBuilder::new()
            .delimiter(self.delimiter)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(BufReader::new(file)))
    }
}

impl Default for CsvFormat {
    fn default() -> Self {
        Self::new(b',')
    }
}

impl Format for CsvFormat {
    fn header_fields(&self, path: &Path) -> anyhow::Result<Vec<String>> {
        let mut reader = self.open(path)?;
        Ok(reader.headers()?.iter().map(str::to_string).collect())
    }

    fn reader(&self, path: &Path) -> anyhow::Result<Box<dyn RecordSource>> {
        let mut reader = self.open(path)?;
        let header = reader.headers()?.iter().map(str::to_string).collect();
        Ok(Box::new(CsvSource {
            reader,
            header,
            row: csv::StringRecord::new(),
        }))
    }

    fn writer(&self, path: &Path) -> anyhow::Result<Box<dyn RecordSink>> {
        Ok(Box::new(CsvSink {
            path: path.to_path_buf(),
            delimiter: self.delimiter,
            header: Vec::new(),
            writer: None,
        }))
    }
}

/// Streams rows one at a time
struct CsvSource {
    reader: csv::Reader<BufReader<File>>,
    header: Vec<String>,
    row: csv::StringRecord,
}

#[async_trait]
impl RecordSource for CsvSource {
    async fn next_record(&mut self) -> anyhow::Result<Option<Record>> {
        if !self.reader.read_record(&mut self.row)? {
            return Ok(None);
        }
        Ok(Some(
            self.header
                .iter()
                .cloned()
                .zip(self.row.iter().map(|cell| Value::String(cell.to_string())))
                .collect(),
        ))
    }
}

/// Writes the header from the first record's fields, then one row per record
struct CsvSink {
    path: PathBuf,
    delimiter: u8,
    header: Vec<String>,
    writer: Option<csv::Writer<File>>,
}

#[async_trait]
impl RecordSink for CsvSink {
    async fn write(&mut self, value: Value) -> anyhow::Result<()> {
        let record = match value {
            Value::Object(record) => record,
            other => anyhow::bail!("csv rows must be records, got {other}"),
        };
        let mut writer = match self.writer.take() {
            Some(writer) => writer,
            None => {
                let mut writer = csv::WriterBuilder::new()
                    .delimiter(self.delimiter)
                    .from_path(&self.path)?;
                self.header = record.keys().cloned().collect();
                writer.write_record(&self.header)?;
                writer
            }
        };
        let cells = self.header.iter().map(|field| match record.get(field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        });
        writer.write_record(cells)?;
        self.writer = Some(writer);
        Ok(())
    }

    async fn flush(&mut self) -> anyhow::Result<()> {
        if let Some(writer) = &mut self.writer {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Builds [`CsvFormat`] codecs; the first argument is the delimiter
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvFormats;

impl FormatFactory for CsvFormats {
    fn create(&self, spec: &FormatSpec) -> anyhow::Result<Arc<dyn Format>> {
        if spec.codec_type != "csv" {
            anyhow::bail!("unknown codec '{}'", spec.codec_type);
        }
        let delimiter = match spec.arguments.first().map(String::as_bytes) {
            None => b',',
            Some([delimiter]) => *delimiter,
            Some(_) => anyhow::bail!("csv delimiter must be a single byte"),
        };
        Ok(Arc::new(CsvFormat::new(delimiter)))
    }
}

/// Discovers `.csv` files; `.txt` files are read as CSV of unknown format
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvDiscovery;

impl FormatDiscovery for CsvDiscovery {
    fn discover(&self, path: &Path) -> anyhow::Result<(Option<FileFormat>, Arc<dyn Format>)> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("csv") => Ok((Some(FileFormat::Csv), Arc::new(CsvFormat::default()) as _)),
            Some("txt") => Ok((None, Arc::new(CsvFormat::default()) as _)),
            _ => anyhow::bail!("cannot discover the format of {}", path.display()),
        }
    }
}

// ============================================================================
// Connections and services
// ============================================================================

/// Connections whose queries and entities are array buffers
///
/// Every connection name resolves; `reader(statement)` reads the buffer named
/// after the statement and `writer(entity)` appends to the buffer named after
/// the entity.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnections {
    store: ArrayStore,
}

impl MemoryConnections {
    /// Connections backed by `store`
    pub fn new(store: ArrayStore) -> Self {
        Self { store }
    }
}

impl ConnectionFactory for MemoryConnections {
    fn get(&self, _name: &str) -> anyhow::Result<Arc<dyn Connection>> {
        Ok(Arc::new(self.clone()))
    }
}

impl Connection for MemoryConnections {
    fn reader(&self, statement: &str) -> anyhow::Result<Box<dyn RecordSource>> {
        Ok(Box::new(ArraySource::new(self.store.buffer(statement))))
    }

    fn writer(&self, entity: &str) -> anyhow::Result<Box<dyn RecordSink>> {
        Ok(Box::new(ArraySink::new(self.store.buffer(entity))))
    }
}

/// Services whose methods are array buffers named `service::method`
///
/// A call without a method uses the buffer named after the service.
#[derive(Debug, Clone, Default)]
pub struct MemoryServices {
    store: ArrayStore,
}

impl MemoryServices {
    /// Services backed by `store`
    pub fn new(store: ArrayStore) -> Self {
        Self { store }
    }

    fn buffer_name(service: &str, method: Option<&str>) -> String {
        match method {
            Some(method) => format!("{service}::{method}"),
            None => service.to_string(),
        }
    }
}

impl ServiceLocator for MemoryServices {
    fn reader(
        &self,
        service: &str,
        method: Option<&str>,
    ) -> anyhow::Result<Box<dyn RecordSource>> {
        let buffer = self.store.buffer(&Self::buffer_name(service, method));
        Ok(Box::new(ArraySource::new(buffer)))
    }

    fn writer(&self, service: &str, method: Option<&str>) -> anyhow::Result<Box<dyn RecordSink>> {
        let buffer = self.store.buffer(&Self::buffer_name(service, method));
        Ok(Box::new(ArraySink::new(buffer)))
    }
}

// ============================================================================
// Record processing
// ============================================================================

type ConvertFn = dyn Fn(Value) -> anyhow::Result<Value> + Send + Sync;

struct FnConverter(Box<ConvertFn>);

impl Converter for FnConverter {
    fn convert(&self, value: Value, _ctx: &ExecutionContext<'_>) -> anyhow::Result<Value> {
        (self.0)(value)
    }
}

/// Converters by name
#[derive(Clone, Default)]
pub struct NamedConverters {
    converters: HashMap<String, Arc<dyn Converter>>,
}

impl NamedConverters {
    /// `upper`, `trim` and `int`
    pub fn standard() -> Self {
        Self::default()
            .with_fn("upper", |v| match v {
                Value::String(s) => Ok(Value::String(s.to_uppercase())),
                other => anyhow::bail!("cannot uppercase {other}"),
            })
            .with_fn("trim", |v| match v {
                Value::String(s) => Ok(Value::String(s.trim().to_string())),
                other => Ok(other),
            })
            .with_fn("int", |v| match v {
                Value::String(s) => Ok(Value::from(s.trim().parse::<i64>()?)),
                Value::Number(n) => Ok(Value::Number(n)),
                other => anyhow::bail!("not an integer: {other}"),
            })
    }

    /// Add a converter
    pub fn with(mut self, name: impl Into<String>, converter: Arc<dyn Converter>) -> Self {
        self.converters.insert(name.into(), converter);
        self
    }

    /// Add a converter from a function
    pub fn with_fn<F>(self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.with(name, Arc::new(FnConverter(Box::new(f))))
    }
}

impl ConverterProvider for NamedConverters {
    fn resolve(&self, name: &str) -> Option<Arc<dyn Converter>> {
        self.converters.get(name).cloned()
    }
}

/// Checks `not_blank`, `email` and `numeric`; object rules are per class
#[derive(Debug, Clone, Default)]
pub struct RuleValidator {
    object_rules: HashMap<String, Vec<(String, String)>>,
}

impl RuleValidator {
    /// Require `constraint` on `field` of objects of `class`
    pub fn with_object_rule(
        mut self,
        class: impl Into<String>,
        field: impl Into<String>,
        constraint: impl Into<String>,
    ) -> Self {
        self.object_rules
            .entry(class.into())
            .or_default()
            .push((field.into(), constraint.into()));
        self
    }
}

impl Validator for RuleValidator {
    fn check(&self, value: &Value, constraint: &str) -> anyhow::Result<Vec<String>> {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        };
        let violation = match constraint {
            "not_blank" => text.trim().is_empty().then_some("must not be blank"),
            "email" => (!text.contains('@')).then_some("is not an email address"),
            "numeric" => text.parse::<f64>().is_err().then_some("is not numeric"),
            other => anyhow::bail!("unknown constraint '{other}'"),
        };
        Ok(violation.into_iter().map(str::to_string).collect())
    }

    fn check_object(&self, class: &str, object: &Value) -> anyhow::Result<Vec<String>> {
        let mut messages = Vec::new();
        for (field, constraint) in self.object_rules.get(class).into_iter().flatten() {
            let value = object.get(field).unwrap_or(&Value::Null);
            for message in self.check(value, constraint)? {
                messages.push(format!("{field} {message}"));
            }
        }
        Ok(messages)
    }
}

/// Object factories for a fixed set of classes
///
/// Objects are the record with a leading `@class` field.
#[derive(Debug, Clone, Default)]
pub struct PlainObjects {
    classes: HashSet<String>,
}

impl PlainObjects {
    /// Make `class` known
    pub fn with_class(mut self, class: impl Into<String>) -> Self {
        self.classes.insert(class.into());
        self
    }
}

struct PlainFactory {
    class: String,
}

impl ObjectFactory for PlainFactory {
    fn materialize(&self, record: Record) -> anyhow::Result<Value> {
        let mut object = Map::new();
        object.insert("@class".to_string(), Value::String(self.class.clone()));
        object.extend(record);
        Ok(Value::Object(object))
    }
}

impl ObjectFactoryProvider for PlainObjects {
    fn factory(&self, _kind: ObjectFactoryKind, class: &str) -> Option<Arc<dyn ObjectFactory>> {
        self.classes.contains(class).then(|| {
            Arc::new(PlainFactory {
                class: class.to_string(),
            }) as Arc<dyn ObjectFactory>
        })
    }
}

/// Accepts records whose `field` equals `value`
#[derive(Debug, Clone)]
pub struct FieldEquals {
    field: String,
    value: Value,
}

impl FieldEquals {
    /// Filter on `field == value`
    pub fn new(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            value,
        }
    }
}

impl Filter for FieldEquals {
    fn accept(&self, record: &Record, _ctx: &ExecutionContext<'_>) -> anyhow::Result<bool> {
        Ok(record.get(&self.field) == Some(&self.value))
    }
}

/// Filters by name
#[derive(Clone, Default)]
pub struct NamedFilters {
    filters: HashMap<String, Arc<dyn Filter>>,
}

impl NamedFilters {
    /// Add a filter
    pub fn with(mut self, name: impl Into<String>, filter: Arc<dyn Filter>) -> Self {
        self.filters.insert(name.into(), filter);
        self
    }
}

impl FilterProvider for NamedFilters {
    fn resolve(&self, name: &str) -> Option<Arc<dyn Filter>> {
        self.filters.get(name).cloned()
    }
}

/// Expressions looked up in a table
#[derive(Debug, Clone, Default)]
pub struct MapExpressions {
    values: HashMap<String, String>,
}

impl MapExpressions {
    /// `expression` evaluates to `value`
    pub fn with(mut self, expression: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(expression.into(), value.into());
        self
    }
}

impl ExpressionEvaluator for MapExpressions {
    fn evaluate(&self, expression: &str) -> anyhow::Result<String> {
        self.values
            .get(expression)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("undefined expression '{expression}'"))
    }
}
