//! Storage provider registry
//!
//! A storage provider is a named place import sources come from: a directory,
//! an upload area, a set of database queries or application services. The
//! registry keeps provider definitions in registration order and builds each
//! runtime [`StorageProvider`] on first resolution.
//!
//! Providers hand out [`StorageHandle`]s. A handle can describe itself as a
//! [`SourceDescriptor`] for importer resolution and open a record stream.

use once_cell::sync::OnceCell;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

use intake_core::capabilities::{ConnectionFactory, FormatDiscovery, RecordSource, ServiceLocator};
use intake_core::config::{
    EngineConfig, Ordered, ProviderKind, ServiceMethods, StorageProviderConfig,
};
use intake_core::{ConfigRule, SourceDescriptor};

use crate::error::{Error, Result};
use crate::services::Services;

/// Connection used by dbal and doctrine providers without `connection_factory`
pub const DEFAULT_CONNECTION: &str = "default";

/// What happens when a provider name is registered twice
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// The later definition replaces the earlier one
    #[default]
    LastWins,
    /// Registration fails with [`Error::DuplicateProvider`]
    Reject,
}

struct ProviderSlot {
    config: StorageProviderConfig,
    provider: OnceCell<Arc<StorageProvider>>,
}

/// Storage providers by name
pub struct StorageProviderRegistry {
    slots: Vec<ProviderSlot>,
    policy: DuplicatePolicy,
    services: Services,
}

impl StorageProviderRegistry {
    /// Empty registry resolving providers with `services`
    pub fn new(services: Services) -> Self {
        Self {
            slots: Vec::new(),
            policy: DuplicatePolicy::default(),
            services,
        }
    }

    /// Set the duplicate name policy
    pub fn with_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Register every provider of `config` in document order
    pub fn populate(&mut self, config: &EngineConfig) -> Result<()> {
        for provider in &config.storage_providers {
            self.register(provider.clone())?;
        }
        Ok(())
    }

    /// Register a provider definition
    pub fn register(&mut self, config: StorageProviderConfig) -> Result<()> {
        let slot = ProviderSlot {
            config,
            provider: OnceCell::new(),
        };

        match self.slots.iter_mut().find(|s| s.config.name == slot.config.name) {
            Some(_) if self.policy == DuplicatePolicy::Reject => Err(Error::DuplicateProvider {
                name: slot.config.name,
            }),
            Some(existing) => {
                warn!(provider = %slot.config.name, "Replacing storage provider definition");
                *existing = slot;
                Ok(())
            }
            None => {
                debug!(
                    provider = %slot.config.name,
                    kind = ?slot.config.kind,
                    "Registered storage provider"
                );
                self.slots.push(slot);
                Ok(())
            }
        }
    }

    /// Runtime provider registered under `name`, built on first call
    pub fn resolve(&self, name: &str) -> Result<Arc<StorageProvider>> {
        let slot = self
            .slots
            .iter()
            .find(|s| s.config.name == name)
            .ok_or_else(|| Error::UnknownProvider {
                name: name.to_string(),
            })?;

        slot.provider
            .get_or_try_init(|| StorageProvider::build(&slot.config, &self.services).map(Arc::new))
            .cloned()
    }

    /// Registered definition of `name`
    pub fn get(&self, name: &str) -> Option<&StorageProviderConfig> {
        self.slots
            .iter()
            .map(|s| &s.config)
            .find(|config| config.name == name)
    }

    /// Provider names in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|s| s.config.name.as_str())
    }

    /// Number of registered providers
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl fmt::Debug for StorageProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageProviderRegistry")
            .field("providers", &self.names().collect::<Vec<_>>())
            .field("policy", &self.policy)
            .finish()
    }
}

// ============================================================================
// Runtime providers
// ============================================================================

enum Backend {
    Files {
        root: Option<PathBuf>,
        discovery: Arc<dyn FormatDiscovery>,
    },
    Services {
        locator: Arc<dyn ServiceLocator>,
        services: Ordered<ServiceMethods>,
    },
    Queries {
        connections: Arc<dyn ConnectionFactory>,
        connection: String,
        queries: Vec<String>,
    },
}

/// A resolved storage provider
pub struct StorageProvider {
    name: String,
    kind: ProviderKind,
    backend: Backend,
}

impl StorageProvider {
    fn build(config: &StorageProviderConfig, services: &Services) -> Result<Self> {
        let kind = config.kind.ok_or_else(|| Error::UnknownProviderKind {
            name: config.name.clone(),
        })?;
        let required_by = format!("storage provider '{}'", config.name);

        let backend = match kind {
            ProviderKind::File | ProviderKind::Directory | ProviderKind::Upload => {
                let root = config.uri.as_ref().map(PathBuf::from);
                if root.is_none() && kind != ProviderKind::File {
                    return Err(intake_core::Error::config(
                        format!("storageprovider.{}", config.name),
                        ConfigRule::MissingField("uri"),
                    )
                    .into());
                }
                Backend::Files {
                    root,
                    discovery: services.format_discovery(&required_by)?.clone(),
                }
            }
            ProviderKind::Service => Backend::Services {
                locator: services.service_locator(&required_by)?.clone(),
                services: config.services.clone(),
            },
            ProviderKind::Dbal | ProviderKind::Doctrine => Backend::Queries {
                connections: services.connections(&required_by)?.clone(),
                connection: config
                    .connection_factory
                    .clone()
                    .unwrap_or_else(|| DEFAULT_CONNECTION.to_string()),
                queries: config.queries.clone(),
            },
        };

        debug!(provider = %config.name, %kind, "Built storage provider");
        Ok(Self {
            name: config.name.clone(),
            kind,
            backend,
        })
    }

    /// Provider name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Provider kind
    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    /// Every storage the provider currently offers
    ///
    /// Directory providers list files below their root recursively, upload
    /// providers the files directly in their upload area, service providers
    /// every configured `(service, method)` pair and query providers every
    /// configured query. A file provider offers its `uri` when one is set.
    pub fn storages(&self) -> Result<Vec<StorageHandle>> {
        match &self.backend {
            Backend::Files { root, discovery } => {
                let Some(root) = root else {
                    return Ok(Vec::new());
                };
                let depth = match self.kind {
                    ProviderKind::Directory => usize::MAX,
                    ProviderKind::Upload => 1,
                    _ => 0,
                };
                let mut handles = Vec::new();
                for entry in WalkDir::new(root).max_depth(depth).sort_by_file_name() {
                    let entry = entry.map_err(std::io::Error::from)?;
                    if entry.file_type().is_file() {
                        handles.push(StorageHandle::file(entry.into_path(), discovery));
                    }
                }
                Ok(handles)
            }
            Backend::Services { locator, services } => Ok(services
                .iter()
                .flat_map(|(service, methods)| {
                    methods
                        .methods
                        .iter()
                        .map(move |method| StorageHandle::Service {
                            service: service.to_string(),
                            method: method.clone(),
                            locator: locator.clone(),
                        })
                })
                .collect()),
            Backend::Queries {
                connections,
                connection,
                queries,
            } => Ok(queries
                .iter()
                .map(|statement| StorageHandle::Query {
                    statement: statement.clone(),
                    connection: connection.clone(),
                    connections: connections.clone(),
                })
                .collect()),
        }
    }

    /// Select one storage by id
    ///
    /// Ids are a path for file providers (relative to the root for directory
    /// providers), a file name for upload providers, `service::method` for
    /// service providers and the query text for query providers.
    pub fn select(&self, id: &str) -> Result<StorageHandle> {
        let unknown = || Error::UnknownStorage {
            provider: self.name.clone(),
            selection: id.to_string(),
        };

        match &self.backend {
            Backend::Files { root, discovery } => {
                let path = match (self.kind, root) {
                    (ProviderKind::Upload, Some(root)) => {
                        let file_name = Path::new(id).file_name().ok_or_else(unknown)?;
                        root.join(file_name)
                    }
                    (ProviderKind::Directory, Some(root)) => {
                        let relative = Path::new(id);
                        let escapes = relative
                            .components()
                            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
                        let path = root.join(relative);
                        if escapes || !path.starts_with(root) {
                            return Err(unknown());
                        }
                        path
                    }
                    _ => PathBuf::from(id),
                };
                Ok(StorageHandle::file(path, discovery))
            }
            Backend::Services { locator, services } => {
                let (service, method) = id.split_once("::").ok_or_else(unknown)?;
                let allowed = services
                    .get(service)
                    .is_some_and(|s| s.methods.iter().any(|m| m == method));
                if !allowed {
                    return Err(unknown());
                }
                Ok(StorageHandle::Service {
                    service: service.to_string(),
                    method: method.to_string(),
                    locator: locator.clone(),
                })
            }
            Backend::Queries {
                connections,
                connection,
                queries,
            } => {
                let statement = queries.iter().find(|q| *q == id).ok_or_else(unknown)?;
                Ok(StorageHandle::Query {
                    statement: statement.clone(),
                    connection: connection.clone(),
                    connections: connections.clone(),
                })
            }
        }
    }

    /// Place an uploaded file in the upload area
    pub fn upload(&self, file_name: &str) -> Result<StorageHandle> {
        if self.kind != ProviderKind::Upload {
            return Err(Error::UnknownStorage {
                provider: self.name.clone(),
                selection: file_name.to_string(),
            });
        }
        self.select(file_name)
    }
}

impl fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageProvider")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

// ============================================================================
// Storage handles
// ============================================================================

/// One storage selected from a provider
#[derive(Clone)]
pub enum StorageHandle {
    /// A local file
    File {
        /// File path
        path: PathBuf,
        /// Format discovery used to read it
        discovery: Arc<dyn FormatDiscovery>,
    },

    /// A service method producing records
    Service {
        /// Service name
        service: String,
        /// Method name
        method: String,
        /// Service locator
        locator: Arc<dyn ServiceLocator>,
    },

    /// A database query
    Query {
        /// Query text
        statement: String,
        /// Connection name
        connection: String,
        /// Connection factory
        connections: Arc<dyn ConnectionFactory>,
    },
}

impl StorageHandle {
    fn file(path: PathBuf, discovery: &Arc<dyn FormatDiscovery>) -> Self {
        Self::File {
            path,
            discovery: discovery.clone(),
        }
    }

    /// Identifier of the storage
    pub fn id(&self) -> String {
        match self {
            Self::File { path, .. } => path.display().to_string(),
            Self::Service {
                service, method, ..
            } => format!("{service}::{method}"),
            Self::Query { statement, .. } => statement.clone(),
        }
    }

    /// What can be known about the storage before an importer is chosen
    ///
    /// Files report their name, discovered format and header fields. Other
    /// storages describe nothing and only match catch-all importers.
    pub fn describe(&self) -> Result<SourceDescriptor> {
        match self {
            Self::File { path, discovery } => {
                let (format, codec) = discovery
                    .discover(path)
                    .map_err(|e| Error::capability("format discovery", e))?;
                let header = codec
                    .header_fields(path)
                    .map_err(|e| Error::capability("format", e))?;
                let mut descriptor = SourceDescriptor::new()
                    .with_filename(path.display().to_string())
                    .with_header_fields(header);
                descriptor.format = format;
                Ok(descriptor)
            }
            _ => Ok(SourceDescriptor::new()),
        }
    }

    /// Open the storage for reading
    pub fn open(&self) -> Result<Box<dyn RecordSource>> {
        match self {
            Self::File { path, discovery } => {
                let (_, codec) = discovery
                    .discover(path)
                    .map_err(|e| Error::capability("format discovery", e))?;
                codec
                    .reader(path)
                    .map_err(|e| Error::capability("format", e))
            }
            Self::Service {
                service,
                method,
                locator,
            } => locator
                .reader(service, Some(method))
                .map_err(|e| Error::capability("service locator", e)),
            Self::Query {
                statement,
                connection,
                connections,
            } => connections
                .get(connection)
                .and_then(|c| c.reader(statement))
                .map_err(|e| Error::capability("connection factory", e)),
        }
    }
}

impl fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File { path, .. } => f.debug_tuple("File").field(path).finish(),
            Self::Service {
                service, method, ..
            } => f.debug_tuple("Service").field(service).field(method).finish(),
            Self::Query {
                statement,
                connection,
                ..
            } => f
                .debug_tuple("Query")
                .field(connection)
                .field(statement)
                .finish(),
        }
    }
}
