//! Intake Core Library
//!
//! This crate provides the configuration side of Intake:
//! - Shorthand normalization and schema validation of configuration documents
//! - The typed importer and storage provider model
//! - Precondition matching and the importer registry
//! - Capability traits implemented by the host application
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │  Document   │────▶│  Normalize  │────▶│  Validate   │────▶│EngineConfig │
//! │(YAML/JSON)  │     │             │     │             │     │             │
//! └─────────────┘     └─────────────┘     └─────────────┘     └──────┬──────┘
//!                                                                    │
//!                     ┌─────────────┐     ┌─────────────┐            │
//!                     │  Importer   │◀────│Precondition │◀───────────┘
//!                     │  Registry   │     │  Matcher    │
//!                     └─────────────┘     └─────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use intake_core::{EngineConfig, ImporterRegistry, SourceDescriptor};
//!
//! let document: serde_json::Value = serde_yaml::from_str(yaml)?;
//! let config = EngineConfig::from_document(&document)?;
//! let importers = ImporterRegistry::from_config(&config)?;
//! let importer = importers.resolve(
//!     &SourceDescriptor::new().with_header_fields(["email", "name", "city"]),
//! )?;
//! println!("Importing with {}", importer.name);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod capabilities;
pub mod config;
pub mod error;
pub mod importer;
pub mod normalize;
pub mod precondition;
pub mod validate;

pub use capabilities::{ExecutionContext, Record};
pub use config::{
    EngineConfig, FileFormat, ImporterConfig, Precondition, StorageEndpoint,
    StorageProviderConfig,
};
pub use error::{ConfigRule, Error, Result};
pub use importer::ImporterRegistry;
pub use precondition::{PreconditionMatcher, SourceDescriptor};
