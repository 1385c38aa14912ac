//! Canonical configuration model
//!
//! The raw configuration document is a loosely typed tree (`serde_json::Value`).
//! [`EngineConfig::from_document`] runs it through the normalizer and the
//! validator, then deserializes the canonical document into the typed structs
//! below.
//!
//! # Document shape
//!
//! ```yaml
//! storageprovider:
//!   uploads:
//!     type: upload
//!     uri: /var/imports
//!
//! importers:
//!   customers:
//!     preconditions:
//!       format: csv
//!       fields: [email, name]
//!     mappings:
//!       email: contact_email
//!     target: customer_sink
//! ```

use serde::de::{DeserializeOwned, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;

use crate::error::{ConfigRule, Error, Result};
use crate::{normalize, validate};

/// Storage endpoint kinds accepted for importer sources and targets
pub const STORAGE_KINDS: &[&str] = &["callable", "service", "array", "doctrine", "file"];

/// Storage provider kinds
pub const PROVIDER_KINDS: &[&str] = &["file", "directory", "upload", "doctrine", "service", "dbal"];

/// File formats a precondition can require
pub const FILE_FORMATS: &[&str] = &["csv", "excel", "xml", "yaml"];

/// Object factory kinds
pub const OBJECT_FACTORY_KINDS: &[&str] = &["default", "custom"];

/// Prefix marking a URI as a deferred expression
pub const EXPRESSION_PREFIX: &str = "@=";

/// Validated, typed configuration of the whole engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Storage providers in document order
    pub storage_providers: Vec<StorageProviderConfig>,

    /// Importers in document order (this is the registration order)
    pub importers: Vec<ImporterConfig>,

    fingerprint: String,
}

impl EngineConfig {
    /// Normalize, validate and type a raw configuration document
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let config = EngineConfig::from_document(&serde_json::json!({
    ///     "importers": { "customers": { "target": "sink" } }
    /// }))?;
    /// assert_eq!(config.importers[0].name, "customers");
    /// ```
    pub fn from_document(document: &Value) -> Result<Self> {
        let canonical = normalize::normalize(document);
        validate::validate(&canonical)?;
        Self::from_canonical(&canonical)
    }

    fn from_canonical(canonical: &Value) -> Result<Self> {
        let storage_providers =
            named_section(canonical, "storageprovider", |mut p: StorageProviderConfig, name| {
                p.name = name;
                p
            })?;
        let importers = named_section(canonical, "importers", |mut i: ImporterConfig, name| {
            i.name = name;
            i
        })?;

        Ok(Self {
            storage_providers,
            importers,
            fingerprint: fingerprint(canonical)?,
        })
    }

    /// `false` when no importer is configured; the registries stay empty then
    pub fn is_enabled(&self) -> bool {
        !self.importers.is_empty()
    }

    /// SHA-256 of the canonical document
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}

fn named_section<T, F>(canonical: &Value, key: &str, name: F) -> Result<Vec<T>>
where
    T: DeserializeOwned,
    F: Fn(T, String) -> T,
{
    let Some(section) = canonical.get(key) else {
        return Ok(Vec::new());
    };
    let entries = section
        .as_object()
        .ok_or_else(|| Error::config(key, ConfigRule::InvalidType("a mapping")))?;

    entries
        .iter()
        .map(|(entry_name, value)| {
            let typed: T = serde_json::from_value(value.clone())?;
            Ok(name(typed, entry_name.clone()))
        })
        .collect()
}

/// Hex SHA-256 of a (canonical) document
pub fn fingerprint(document: &Value) -> Result<String> {
    let bytes = serde_json::to_vec(document)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

// ============================================================================
// Ordered mappings
// ============================================================================

/// A string-keyed mapping that keeps document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ordered<T>(Vec<(String, T)>);

impl<T> Default for Ordered<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> Ordered<T> {
    /// Iterate entries in order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Look up an entry by key
    pub fn get(&self, key: &str) -> Option<&T> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Keys in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no entries
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Insert or replace, keeping the position of a replaced key
    pub fn insert(&mut self, key: impl Into<String>, value: T) {
        let key = key.into();
        match self.0.iter_mut().find(|(k, _)| *k == key) {
            Some(slot) => slot.1 = value,
            None => self.0.push((key, value)),
        }
    }
}

impl<K: Into<String>, T> FromIterator<(K, T)> for Ordered<T> {
    fn from_iter<I: IntoIterator<Item = (K, T)>>(iter: I) -> Self {
        let mut ordered = Self::default();
        for (k, v) in iter {
            ordered.insert(k, v);
        }
        ordered
    }
}

impl<T: Serialize> Serialize for Ordered<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Ordered<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct OrderedVisitor<T>(PhantomData<T>);

        impl<'de, T: Deserialize<'de>> Visitor<'de> for OrderedVisitor<T> {
            type Value = Ordered<T>;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping")
            }

            fn visit_map<A: MapAccess<'de>>(
                self,
                mut access: A,
            ) -> std::result::Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some((key, value)) = access.next_entry::<String, T>()? {
                    entries.push((key, value));
                }
                Ok(Ordered(entries))
            }
        }

        deserializer.deserialize_map(OrderedVisitor(PhantomData))
    }
}

// ============================================================================
// Storage providers
// ============================================================================

/// Storage provider definition from `storageprovider.<name>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageProviderConfig {
    /// Provider name (the mapping key)
    #[serde(skip)]
    pub name: String,

    /// Provider kind; `None` is kept so resolution can report it
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ProviderKind>,

    /// Location for file, directory and upload providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,

    /// Connection name for dbal and doctrine providers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection_factory: Option<String>,

    /// Services and their callable methods for service providers
    #[serde(default, skip_serializing_if = "Ordered::is_empty")]
    pub services: Ordered<ServiceMethods>,

    /// Queries for dbal and doctrine providers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub queries: Vec<String>,
}

impl StorageProviderConfig {
    /// Create a provider definition of the given kind
    pub fn new(name: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            name: name.into(),
            kind: Some(kind),
            uri: None,
            connection_factory: None,
            services: Ordered::default(),
            queries: Vec::new(),
        }
    }

    /// Set the location
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Set the connection name
    pub fn with_connection(mut self, connection: impl Into<String>) -> Self {
        self.connection_factory = Some(connection.into());
        self
    }

    /// Add a query
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.queries.push(query.into());
        self
    }

    /// Allow `methods` to be called on `service`
    pub fn with_service<I, S>(mut self, service: impl Into<String>, methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.services.insert(
            service,
            ServiceMethods {
                methods: methods.into_iter().map(Into::into).collect(),
            },
        );
        self
    }
}

/// Methods exposed by one service of a service provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMethods {
    /// Callable method names
    #[serde(default)]
    pub methods: Vec<String>,
}

/// Storage provider kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Any local file
    File,
    /// Files below a directory
    Directory,
    /// Uploaded files placed in a directory
    Upload,
    /// ORM queries
    Doctrine,
    /// Application services
    Service,
    /// SQL queries
    Dbal,
}

impl ProviderKind {
    /// Name as written in configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
            Self::Upload => "upload",
            Self::Doctrine => "doctrine",
            Self::Service => "service",
            Self::Dbal => "dbal",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Importers
// ============================================================================

/// Importer definition from `importers.<name>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImporterConfig {
    /// Importer name (the mapping key)
    #[serde(skip)]
    pub name: String,

    /// Static context handed to every stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,

    /// Rules for automatic importer selection
    #[serde(
        rename = "preconditions",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub precondition: Option<Precondition>,

    /// Materialize records into objects before writing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_factory: Option<ObjectFactoryConfig>,

    /// Filter references, applied in order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filters: Vec<String>,

    /// Field mappings keyed by source field
    #[serde(default, skip_serializing_if = "Ordered::is_empty")]
    pub mappings: Ordered<MappingRule>,

    /// Source storage; supplied at import time when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<StorageEndpoint>,

    /// Target storage
    pub target: StorageEndpoint,

    /// Validation of source and target records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationConfig>,
}

impl ImporterConfig {
    /// Create an importer writing to `target`
    pub fn new(name: impl Into<String>, target: StorageEndpoint) -> Self {
        Self {
            name: name.into(),
            context: None,
            precondition: None,
            object_factory: None,
            filters: Vec::new(),
            mappings: Ordered::default(),
            source: None,
            target,
            validation: None,
        }
    }

    /// Set the precondition
    pub fn with_precondition(mut self, precondition: Precondition) -> Self {
        self.precondition = Some(precondition);
        self
    }

    /// Set the source storage
    pub fn with_source(mut self, source: StorageEndpoint) -> Self {
        self.source = Some(source);
        self
    }

    /// Add a field mapping
    pub fn with_mapping(mut self, from: impl Into<String>, rule: MappingRule) -> Self {
        self.mappings.insert(from, rule);
        self
    }

    /// Append a filter reference
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
        self
    }

    /// Set the validation
    pub fn with_validation(mut self, validation: ValidationConfig) -> Self {
        self.validation = Some(validation);
        self
    }

    /// Set the object factory
    pub fn with_object_factory(mut self, factory: ObjectFactoryConfig) -> Self {
        self.object_factory = Some(factory);
        self
    }

    /// Set the static context
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }
}

/// Precondition rule set; every populated constraint must hold
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Precondition {
    /// Glob patterns, at least one must match the filename
    #[serde(rename = "filename", default, skip_serializing_if = "Vec::is_empty")]
    pub filenames: Vec<String>,

    /// Accepted formats
    #[serde(rename = "format", default, skip_serializing_if = "Vec::is_empty")]
    pub formats: Vec<FileFormat>,

    /// Exact number of header fields
    #[serde(rename = "fieldcount", default, skip_serializing_if = "Option::is_none")]
    pub field_count: Option<usize>,

    /// Exact header field set
    #[serde(rename = "fieldset", default, skip_serializing_if = "Vec::is_empty")]
    pub field_set: Vec<String>,

    /// Fields that must be present in the header
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

impl Precondition {
    /// Whether no constraint is populated (a catch-all)
    pub fn is_empty(&self) -> bool {
        self.filenames.is_empty()
            && self.formats.is_empty()
            && self.field_count.is_none()
            && self.field_set.is_empty()
            && self.fields.is_empty()
    }

    /// Add a filename pattern
    pub fn with_filename(mut self, pattern: impl Into<String>) -> Self {
        self.filenames.push(pattern.into());
        self
    }

    /// Add an accepted format
    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.formats.push(format);
        self
    }

    /// Require an exact field count
    pub fn with_field_count(mut self, count: usize) -> Self {
        self.field_count = Some(count);
        self
    }

    /// Require an exact header field set
    pub fn with_field_set<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.field_set = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Require a header field
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.fields.push(field.into());
        self
    }
}

/// File format of an import source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    /// Comma (or otherwise) separated values
    Csv,
    /// Spreadsheet workbook
    Excel,
    /// XML document
    Xml,
    /// YAML document
    Yaml,
}

impl FileFormat {
    /// Name as written in configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Excel => "excel",
            Self::Xml => "xml",
            Self::Yaml => "yaml",
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FileFormat {
    type Err = ConfigRule;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "csv" => Ok(Self::Csv),
            "excel" => Ok(Self::Excel),
            "xml" => Ok(Self::Xml),
            "yaml" => Ok(Self::Yaml),
            other => Err(ConfigRule::UnknownVariant {
                value: other.to_string(),
                allowed: FILE_FORMATS,
            }),
        }
    }
}

/// Object factory selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectFactoryConfig {
    /// Factory kind
    #[serde(rename = "type", default)]
    pub kind: ObjectFactoryKind,

    /// Target class the factory materializes
    pub class: String,
}

impl ObjectFactoryConfig {
    /// Default-kind factory for `class`
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            kind: ObjectFactoryKind::default(),
            class: class.into(),
        }
    }
}

/// Object factory kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectFactoryKind {
    /// Plain field-by-field materialization
    #[default]
    #[serde(rename = "default")]
    Plain,
    /// Caller-supplied (serializer-backed) materialization
    #[serde(rename = "custom")]
    Custom,
}

/// Mapping of one source field
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRule {
    /// Target field name; the field keeps its name when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,

    /// Converter reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converter: Option<String>,
}

impl MappingRule {
    /// Rename to `field`
    pub fn to(field: impl Into<String>) -> Self {
        Self {
            to: Some(field.into()),
            converter: None,
        }
    }

    /// Convert in place
    pub fn converted(converter: impl Into<String>) -> Self {
        Self {
            to: None,
            converter: Some(converter.into()),
        }
    }

    /// Add a converter
    pub fn with_converter(mut self, converter: impl Into<String>) -> Self {
        self.converter = Some(converter.into());
        self
    }
}

// ============================================================================
// Storage endpoints
// ============================================================================

/// Source or target storage of an importer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StorageEndpoint {
    /// A service method called per record
    Callable {
        /// Service and optional method
        callable: CallableRef,
    },

    /// A service method (explicit form)
    Service {
        /// Service name
        service: String,
        /// Method name
        method: String,
    },

    /// In-memory record buffer, optionally named
    Array {
        /// Buffer name shared with the caller
        #[serde(default, skip_serializing_if = "Option::is_none")]
        uri: Option<String>,
    },

    /// ORM entity
    Doctrine {
        /// Entity name
        entity: String,
    },

    /// Local file
    File {
        /// File location
        uri: Uri,
        /// Codec; discovered from the file when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        format: Option<FormatSpec>,
    },
}

impl StorageEndpoint {
    /// Callable endpoint for a bare service name
    pub fn callable(service: impl Into<String>) -> Self {
        Self::Callable {
            callable: CallableRef {
                service: service.into(),
                method: None,
            },
        }
    }

    /// Endpoint kind as written in configuration
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Callable { .. } => "callable",
            Self::Service { .. } => "service",
            Self::Array { .. } => "array",
            Self::Doctrine { .. } => "doctrine",
            Self::File { .. } => "file",
        }
    }

    /// Whether the endpoint can receive materialized objects
    pub fn is_object_producing(&self) -> bool {
        matches!(self, Self::Callable { .. } | Self::Service { .. })
    }
}

/// Reference to a service and optionally one of its methods
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct CallableRef {
    /// Service name
    pub service: String,
    /// Method name
    pub method: Option<String>,
}

impl TryFrom<Vec<String>> for CallableRef {
    type Error = String;

    fn try_from(parts: Vec<String>) -> std::result::Result<Self, Self::Error> {
        let mut parts = parts.into_iter();
        match (parts.next(), parts.next(), parts.next()) {
            (Some(service), method, None) => Ok(Self { service, method }),
            _ => Err("callable must be [service] or [service, method]".to_string()),
        }
    }
}

impl From<CallableRef> for Vec<String> {
    fn from(callable: CallableRef) -> Self {
        std::iter::once(callable.service)
            .chain(callable.method)
            .collect()
    }
}

impl fmt::Display for CallableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.method {
            Some(method) => write!(f, "{}::{}", self.service, method),
            None => f.write_str(&self.service),
        }
    }
}

/// A storage location, either literal or evaluated on first use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Uri {
    /// Plain path
    Literal(String),
    /// Expression evaluated by the expression capability
    Deferred(String),
}

impl From<String> for Uri {
    fn from(raw: String) -> Self {
        match raw.strip_prefix(EXPRESSION_PREFIX) {
            Some(expression) => Self::Deferred(expression.to_string()),
            None => Self::Literal(raw),
        }
    }
}

impl From<&str> for Uri {
    fn from(raw: &str) -> Self {
        Self::from(raw.to_string())
    }
}

impl From<Uri> for String {
    fn from(uri: Uri) -> Self {
        match uri {
            Uri::Literal(path) => path,
            Uri::Deferred(expression) => format!("{EXPRESSION_PREFIX}{expression}"),
        }
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(path) => f.write_str(path),
            Self::Deferred(expression) => write!(f, "{EXPRESSION_PREFIX}{expression}"),
        }
    }
}

/// Codec selection for file storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatSpec {
    /// Codec type, e.g. `csv`
    #[serde(rename = "type")]
    pub codec_type: String,

    /// Positional codec arguments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<String>,
}

impl FormatSpec {
    /// Codec without arguments
    pub fn new(codec_type: impl Into<String>) -> Self {
        Self {
            codec_type: codec_type.into(),
            arguments: Vec::new(),
        }
    }

    /// The precondition format this codec reads, if it is one of the known ones
    pub fn file_format(&self) -> Option<FileFormat> {
        self.codec_type.parse().ok()
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Validation configuration of an importer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Structural tolerance
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ValidationOptions>,

    /// Constraints on source records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ConstraintSet>,

    /// Constraints on target records
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ConstraintSet>,
}

impl ValidationConfig {
    /// Whether nothing at all is configured
    pub fn is_empty(&self) -> bool {
        self.options.is_none() && self.source.is_none() && self.target.is_none()
    }

    /// Effective options
    pub fn effective_options(&self) -> ValidationOptions {
        self.options.unwrap_or_default()
    }
}

/// Structural tolerance of record validation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOptions {
    /// Fields without a constraint are tolerated
    #[serde(rename = "allowExtraFields", default)]
    pub allow_extra_fields: bool,

    /// Constrained fields may be absent
    #[serde(rename = "allowMissingFields", default)]
    pub allow_missing_fields: bool,
}

/// Per-field constraint references
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstraintSet {
    /// Constraint reference keyed by field
    #[serde(default)]
    pub constraints: Ordered<String>,
}

impl ConstraintSet {
    /// Build from `(field, constraint)` pairs
    pub fn from_pairs<I, F, C>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (F, C)>,
        F: Into<String>,
        C: Into<String>,
    {
        Self {
            constraints: pairs.into_iter().map(|(f, c)| (f.into(), c.into())).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn load(yaml: &str) -> EngineConfig {
        let document: Value = serde_yaml::from_str(yaml).unwrap();
        EngineConfig::from_document(&document).unwrap()
    }

    #[test]
    fn test_parse_minimal_importer() {
        let config = load(
            r#"
importers:
  customers:
    target: customer_sink
"#,
        );
        assert!(config.is_enabled());
        assert!(config.storage_providers.is_empty());
        let importer = &config.importers[0];
        assert_eq!(importer.name, "customers");
        assert_eq!(importer.target, StorageEndpoint::callable("customer_sink"));
        assert!(importer.precondition.is_none());
    }

    #[test]
    fn test_empty_document_is_disabled() {
        let config = EngineConfig::from_document(&json!({})).unwrap();
        assert!(!config.is_enabled());
    }

    #[test]
    fn test_importers_keep_document_order() {
        let config = load(
            r#"
importers:
  zeta:
    target: a
  alpha:
    target: b
  mid:
    target: c
"#,
        );
        let names: Vec<_> = config.importers.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_parse_full_importer() {
        let config = load(
            r#"
storageprovider:
  uploads:
    type: upload
    uri: /tmp/uploads
importers:
  orders:
    context: batch-7
    preconditions:
      format: csv
      filename: "orders_*.csv"
      fieldcount: 3
      fields: [id, total]
    object_factory:
      class: Order
    filters: [skip_cancelled]
    mappings:
      id: order_id
      total:
        to: amount
        converter: decimal
    source:
      type: file
      uri: "@=upload_path"
      format:
        type: csv
        arguments: [";"]
    validation:
      options:
        allowExtraFields: true
      source:
        id: not_blank
    target:
      type: doctrine
      entity: Order
"#,
        );
        let provider = &config.storage_providers[0];
        assert_eq!(provider.name, "uploads");
        assert_eq!(provider.kind, Some(ProviderKind::Upload));

        let orders = &config.importers[0];
        assert_eq!(orders.context, Some(json!(["batch-7"])));

        let precondition = orders.precondition.as_ref().unwrap();
        assert_eq!(precondition.formats, vec![FileFormat::Csv]);
        assert_eq!(precondition.filenames, vec!["orders_*.csv"]);
        assert_eq!(precondition.field_count, Some(3));
        assert_eq!(precondition.fields, vec!["id", "total"]);

        let factory = orders.object_factory.as_ref().unwrap();
        assert_eq!(factory.kind, ObjectFactoryKind::Plain);
        assert_eq!(factory.class, "Order");

        let mapped: Vec<_> = orders.mappings.keys().collect();
        assert_eq!(mapped, vec!["id", "total"]);
        assert_eq!(orders.mappings.get("id"), Some(&MappingRule::to("order_id")));
        assert_eq!(
            orders.mappings.get("total"),
            Some(&MappingRule::to("amount").with_converter("decimal"))
        );

        match orders.source.as_ref().unwrap() {
            StorageEndpoint::File { uri, format } => {
                assert_eq!(uri, &Uri::Deferred("upload_path".to_string()));
                let format = format.as_ref().unwrap();
                assert_eq!(format.codec_type, "csv");
                assert_eq!(format.arguments, vec![";"]);
                assert_eq!(format.file_format(), Some(FileFormat::Csv));
            }
            other => panic!("Expected file endpoint, got {other:?}"),
        }

        let validation = orders.validation.as_ref().unwrap();
        assert!(validation.effective_options().allow_extra_fields);
        assert!(!validation.effective_options().allow_missing_fields);
        let source = validation.source.as_ref().unwrap();
        assert_eq!(source.constraints.get("id"), Some(&"not_blank".to_string()));

        assert_eq!(
            orders.target,
            StorageEndpoint::Doctrine {
                entity: "Order".to_string()
            }
        );
    }

    #[test]
    fn test_callable_ref_conversions() {
        let pair = CallableRef::try_from(vec!["svc".to_string(), "write".to_string()]).unwrap();
        assert_eq!(pair.method.as_deref(), Some("write"));
        assert_eq!(pair.to_string(), "svc::write");

        assert!(CallableRef::try_from(Vec::<String>::new()).is_err());
        assert!(
            CallableRef::try_from(vec!["a".to_string(), "b".to_string(), "c".to_string()])
                .is_err()
        );
    }

    #[test]
    fn test_uri_round_trips_expression_prefix() {
        let uri = Uri::from("@=service('paths').inbox()");
        assert_eq!(uri, Uri::Deferred("service('paths').inbox()".to_string()));
        assert_eq!(String::from(uri), "@=service('paths').inbox()");
        assert_eq!(Uri::from("/data/in.csv"), Uri::Literal("/data/in.csv".to_string()));
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let a = load("importers:\n  x:\n    target: sink\n");
        let b = load("importers:\n  x:\n    target: [sink]\n");
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_ordered_insert_replaces_in_place() {
        let mut ordered: Ordered<i32> = [("a", 1), ("b", 2)].into_iter().collect();
        ordered.insert("a", 3);
        assert_eq!(ordered.iter().collect::<Vec<_>>(), vec![("a", &3), ("b", &2)]);
    }

    #[test]
    fn test_precondition_is_empty() {
        assert!(Precondition::default().is_empty());
        assert!(!Precondition::default().with_field_count(0).is_empty());
    }
}
