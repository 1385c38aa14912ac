//! Error types for intake-core

use thiserror::Error;

/// Result type alias for intake-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in intake-core
#[derive(Error, Debug)]
pub enum Error {
    /// The configuration document violates the schema
    #[error("invalid configuration at '{path}': {rule}")]
    Configuration {
        /// Dotted path of the offending node
        path: String,
        /// The violated rule
        rule: ConfigRule,
    },

    /// No importer is registered under this name
    #[error("unknown importer '{name}'")]
    UnknownImporter {
        /// Requested importer name
        name: String,
    },

    /// An importer with this name is already registered
    #[error("importer '{name}' is already registered")]
    DuplicateImporter {
        /// Importer name
        name: String,
    },

    /// More than one importer matches the source
    #[error("source matches more than one importer: {}", candidates.join(", "))]
    AmbiguousImporter {
        /// Names of all matching importers, in registration order
        candidates: Vec<String>,
    },

    /// No importer matches the source and there is no catch-all
    #[error("no importer matches the source (considered: {})", candidates.join(", "))]
    NoMatchingImporter {
        /// Names of all importers that were considered
        candidates: Vec<String>,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build a configuration error for `path`
    pub fn config(path: impl Into<String>, rule: ConfigRule) -> Self {
        Self::Configuration {
            path: path.into(),
            rule,
        }
    }
}

/// A schema rule broken by a configuration document
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigRule {
    /// Key not part of the schema at this position
    #[error("unrecognized option")]
    UnknownKey,

    /// Required field is absent
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// Value outside a closed enumeration
    #[error("unknown value '{value}', expected one of: {}", allowed.join(", "))]
    UnknownVariant {
        /// The rejected value
        value: String,
        /// The closed set of allowed values
        allowed: &'static [&'static str],
    },

    /// Value has the wrong shape
    #[error("expected {0}")]
    InvalidType(&'static str),

    /// `fieldcount` below zero
    #[error("field count must be non-negative, got {0}")]
    NegativeFieldCount(i64),

    /// Filename pattern does not compile
    #[error("invalid filename pattern '{pattern}': {message}")]
    InvalidPattern {
        /// The pattern
        pattern: String,
        /// Compiler message
        message: String,
    },

    /// A mapping rule with neither `to` nor `converter`
    #[error("mapping needs 'to' or 'converter'")]
    EmptyMapping,
}
