//! Error types for storage resolution and pipeline assembly

use thiserror::Error;

/// Result type for assembler operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while resolving storages or assembling pipelines
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration or importer lookup error
    #[error(transparent)]
    Core(#[from] intake_core::Error),

    /// Pipeline construction failed for one importer
    #[error("cannot assemble importer '{importer}': {message}")]
    Assembly {
        /// Importer name
        importer: String,
        /// Error description
        message: String,
    },

    /// No storage provider is registered under this name
    #[error("unknown storage provider '{name}'")]
    UnknownProvider {
        /// Requested provider name
        name: String,
    },

    /// The provider has no recognised kind
    #[error("storage provider '{name}' has no known type")]
    UnknownProviderKind {
        /// Provider name
        name: String,
    },

    /// A provider with this name is already registered
    #[error("storage provider '{name}' is already registered")]
    DuplicateProvider {
        /// Provider name
        name: String,
    },

    /// The provider cannot supply the requested storage
    #[error("storage provider '{provider}' does not offer '{selection}'")]
    UnknownStorage {
        /// Provider name
        provider: String,
        /// Requested storage
        selection: String,
    },

    /// A capability needed by the configuration was not supplied
    #[error("capability '{capability}' is required by {required_by}")]
    MissingCapability {
        /// Capability name
        capability: &'static str,
        /// What needs it
        required_by: String,
    },

    /// A mapping names a converter the converter provider does not know
    #[error("unknown converter '{name}'")]
    UnknownConverter {
        /// Converter name
        name: String,
    },

    /// A capability failed
    #[error("{capability} failed: {source}")]
    Capability {
        /// Capability name
        capability: &'static str,
        /// Underlying error
        #[source]
        source: anyhow::Error,
    },

    /// A deferred URI could not be evaluated
    #[error("cannot evaluate expression '{expression}': {source}")]
    Expression {
        /// The expression
        expression: String,
        /// Underlying error
        #[source]
        source: anyhow::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a collaborator failure
    pub fn capability(capability: &'static str, source: anyhow::Error) -> Self {
        Self::Capability { capability, source }
    }

    /// Assembly failure of `importer`
    pub fn assembly(importer: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Assembly {
            importer: importer.into(),
            message: message.into(),
        }
    }
}
