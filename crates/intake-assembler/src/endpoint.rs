//! Storage endpoint resolution
//!
//! Turns a configured [`StorageEndpoint`] into an [`Endpoint`] bound to the
//! capabilities it needs. Resolution fails fast on missing capabilities and
//! unknown codecs but opens nothing: readers and writers are opened by the
//! runner, and deferred URIs are evaluated on first use.

use once_cell::sync::OnceCell;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use intake_core::SourceDescriptor;
use intake_core::capabilities::{
    ConnectionFactory, ExpressionEvaluator, Format, FormatDiscovery, RecordSink, RecordSource,
    ServiceLocator,
};
use intake_core::config::{StorageEndpoint, Uri};

use crate::array::{ArraySink, ArraySource, ArrayStore};
use crate::error::{Error, Result};
use crate::services::Services;
use crate::storage::DEFAULT_CONNECTION;

/// Which side of the pipeline an endpoint is on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Records are read from it
    Source,
    /// Records are written to it
    Target,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Source => f.write_str("source"),
            Self::Target => f.write_str("target"),
        }
    }
}

enum Codec {
    Fixed(Arc<dyn Format>),
    Discovered(Arc<dyn FormatDiscovery>),
}

struct FileLocation {
    uri: Uri,
    expressions: Option<Arc<dyn ExpressionEvaluator>>,
    path: OnceCell<PathBuf>,
}

impl FileLocation {
    fn path(&self) -> Result<&Path> {
        let path = self.path.get_or_try_init(|| match &self.uri {
            Uri::Literal(path) => Ok(PathBuf::from(path)),
            Uri::Deferred(expression) => {
                let evaluator = self
                    .expressions
                    .as_ref()
                    .ok_or_else(|| Error::MissingCapability {
                        capability: "expression evaluator",
                        required_by: format!("uri '{}'", self.uri),
                    })?;
                evaluator
                    .evaluate(expression)
                    .map(PathBuf::from)
                    .map_err(|source| Error::Expression {
                        expression: expression.clone(),
                        source,
                    })
            }
        })?;
        Ok(path.as_path())
    }
}

enum Binding {
    File {
        location: FileLocation,
        codec: Codec,
    },
    Service {
        service: String,
        method: Option<String>,
        locator: Arc<dyn ServiceLocator>,
    },
    /// Buffer looked up by name when opened
    Array {
        name: String,
        arrays: ArrayStore,
    },
    /// Entities read and written through the default connection
    Doctrine {
        entity: String,
        connections: Arc<dyn ConnectionFactory>,
    },
}

/// A storage endpoint bound to its capabilities
pub struct Endpoint {
    role: Role,
    label: String,
    config: StorageEndpoint,
    binding: Binding,
}

impl Endpoint {
    /// Resolve `config` as the `role` endpoint of `importer`
    ///
    /// Unnamed `array` endpoints use the buffer `<importer>.<role>`.
    pub fn resolve(
        importer: &str,
        role: Role,
        config: &StorageEndpoint,
        services: &Services,
    ) -> Result<Self> {
        let required_by = format!("{role} of importer '{importer}'");

        let binding = match config {
            StorageEndpoint::File { uri, format } => {
                let codec = match format {
                    Some(spec) => Codec::Fixed(
                        services
                            .format_factory(&required_by)?
                            .create(spec)
                            .map_err(|e| {
                                Error::assembly(
                                    importer,
                                    format!("{role} format '{}': {e}", spec.codec_type),
                                )
                            })?,
                    ),
                    None => Codec::Discovered(services.format_discovery(&required_by)?.clone()),
                };
                let expressions = match uri {
                    Uri::Deferred(_) => Some(services.expressions(&required_by)?.clone()),
                    Uri::Literal(_) => None,
                };
                Binding::File {
                    location: FileLocation {
                        uri: uri.clone(),
                        expressions,
                        path: OnceCell::new(),
                    },
                    codec,
                }
            }
            StorageEndpoint::Callable { callable } => Binding::Service {
                service: callable.service.clone(),
                method: callable.method.clone(),
                locator: services.service_locator(&required_by)?.clone(),
            },
            StorageEndpoint::Service { service, method } => Binding::Service {
                service: service.clone(),
                method: Some(method.clone()),
                locator: services.service_locator(&required_by)?.clone(),
            },
            StorageEndpoint::Array { uri } => Binding::Array {
                name: uri.clone().unwrap_or_else(|| format!("{importer}.{role}")),
                arrays: services.arrays().clone(),
            },
            StorageEndpoint::Doctrine { entity } => Binding::Doctrine {
                entity: entity.clone(),
                connections: services.connections(&required_by)?.clone(),
            },
        };

        Ok(Self {
            role,
            label: label(config),
            config: config.clone(),
            binding,
        })
    }

    /// Source or target
    pub fn role(&self) -> Role {
        self.role
    }

    /// Short human readable description, e.g. `callable:sink::write`
    pub fn label(&self) -> &str {
        &self.label
    }

    /// The configuration this endpoint was resolved from
    pub fn config(&self) -> &StorageEndpoint {
        &self.config
    }

    /// Open the endpoint for reading
    ///
    /// Doctrine endpoints always use the [`DEFAULT_CONNECTION`].
    pub fn open_reader(&self) -> Result<Box<dyn RecordSource>> {
        match &self.binding {
            Binding::File { location, codec } => {
                let path = location.path()?;
                self.codec(codec, path)?
                    .reader(path)
                    .map_err(|e| Error::capability("format", e))
            }
            Binding::Service {
                service,
                method,
                locator,
            } => locator
                .reader(service, method.as_deref())
                .map_err(|e| Error::capability("service locator", e)),
            Binding::Array { name, arrays } => Ok(Box::new(ArraySource::new(arrays.buffer(name)))),
            Binding::Doctrine {
                entity,
                connections,
            } => connections
                .get(DEFAULT_CONNECTION)
                .and_then(|c| c.reader(entity))
                .map_err(|e| Error::capability("connection factory", e)),
        }
    }

    /// Open the endpoint for writing
    ///
    /// Doctrine endpoints always use the [`DEFAULT_CONNECTION`].
    pub fn open_writer(&self) -> Result<Box<dyn RecordSink>> {
        match &self.binding {
            Binding::File { location, codec } => {
                let path = location.path()?;
                self.codec(codec, path)?
                    .writer(path)
                    .map_err(|e| Error::capability("format", e))
            }
            Binding::Service {
                service,
                method,
                locator,
            } => locator
                .writer(service, method.as_deref())
                .map_err(|e| Error::capability("service locator", e)),
            Binding::Array { name, arrays } => Ok(Box::new(ArraySink::new(arrays.buffer(name)))),
            Binding::Doctrine {
                entity,
                connections,
            } => connections
                .get(DEFAULT_CONNECTION)
                .and_then(|c| c.writer(entity))
                .map_err(|e| Error::capability("connection factory", e)),
        }
    }

    /// Describe a file endpoint for importer resolution
    pub fn describe(&self) -> Result<SourceDescriptor> {
        let Binding::File { location, codec } = &self.binding else {
            return Ok(SourceDescriptor::new());
        };
        let path = location.path()?;
        let (format, codec) = match codec {
            Codec::Fixed(format) => (None, format.clone()),
            Codec::Discovered(discovery) => discovery
                .discover(path)
                .map_err(|e| Error::capability("format discovery", e))?,
        };
        let header = codec
            .header_fields(path)
            .map_err(|e| Error::capability("format", e))?;
        let mut descriptor = SourceDescriptor::new()
            .with_filename(path.display().to_string())
            .with_header_fields(header);
        descriptor.format = format.or_else(|| match &self.config {
            StorageEndpoint::File {
                format: Some(spec), ..
            } => spec.file_format(),
            _ => None,
        });
        Ok(descriptor)
    }

    fn codec(&self, codec: &Codec, path: &Path) -> Result<Arc<dyn Format>> {
        match codec {
            Codec::Fixed(format) => Ok(format.clone()),
            Codec::Discovered(discovery) => discovery
                .discover(path)
                .map(|(_, format)| format)
                .map_err(|e| Error::capability("format discovery", e)),
        }
    }
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("role", &self.role)
            .field("label", &self.label)
            .finish()
    }
}

fn label(config: &StorageEndpoint) -> String {
    match config {
        StorageEndpoint::Callable { callable } => format!("callable:{callable}"),
        StorageEndpoint::Service { service, method } => format!("service:{service}::{method}"),
        StorageEndpoint::Array { uri: Some(uri) } => format!("array:{uri}"),
        StorageEndpoint::Array { uri: None } => "array".to_string(),
        StorageEndpoint::Doctrine { entity } => format!("doctrine:{entity}"),
        StorageEndpoint::File { uri, .. } => format!("file:{uri}"),
    }
}
