//! Intake Runtime
//!
//! This crate runs imports configured with Intake.
//!
//! # Features
//!
//! - Engine bootstrap from a raw configuration document
//! - Importer resolution from source descriptions
//! - Pipelines assembled on first use and cached per importer
//! - Record runner producing an [`ImportReport`] per job
//!
//! # Usage
//!
//! ```rust,ignore
//! use intake_runtime::{EngineOptions, ImportEngine, ImportJob};
//!
//! let engine = ImportEngine::bootstrap(&document, services, EngineOptions::default())?;
//! let storage = engine.storage("uploads", "customers.csv")?;
//! let report = engine.run(ImportJob::for_storage(storage)).await?;
//! println!("{} written, {} invalid", report.written, report.invalid);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod engine;
pub mod error;
pub mod import;

pub use engine::{EngineOptions, ImportEngine};
pub use error::{Error, Result};
pub use import::{ImportJob, ImportReport, ImporterSelection, JobSource, RowViolation};
