//! Intake Assembler Library
//!
//! This crate turns validated configuration into runnable parts:
//! - Storage provider registries over directories, uploads, services and queries
//! - Source and target endpoints resolved against host capabilities
//! - Import pipelines compiled from importer configurations
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────────────────────────┐
//! │  Importer   │────▶│  Pipeline   │────▶│            Pipeline             │
//! │   Config    │     │  Assembler  │     │ Source → Transform → Validate → │
//! └─────────────┘     └──────┬──────┘     │ Filter → Materialize → Target   │
//!                            │            └─────────────────────────────────┘
//!                     ┌──────▼──────┐
//!                     │  Services   │  formats, connections, service locator,
//!                     │             │  converters, validator, object factories,
//!                     └─────────────┘  filters, expressions, arrays
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use intake_assembler::{PipelineAssembler, Services};
//!
//! let services = Services::new()
//!     .with_service_locator(locator)
//!     .with_validator(validator);
//! let pipeline = PipelineAssembler::new(services).assemble(&importer)?;
//! println!("{:?}", pipeline.stages());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod array;
pub mod assembler;
pub mod endpoint;
pub mod error;
pub mod pipeline;
pub mod services;
pub mod stages;
pub mod storage;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use array::ArrayStore;
pub use assembler::PipelineAssembler;
pub use endpoint::{Endpoint, Role};
pub use error::{Error, Result};
pub use pipeline::{Outcome, Pipeline, PipelinePlan, StageKind};
pub use services::Services;
pub use stages::Violation;
pub use storage::{
    DEFAULT_CONNECTION, DuplicatePolicy, StorageHandle, StorageProvider, StorageProviderRegistry,
};
