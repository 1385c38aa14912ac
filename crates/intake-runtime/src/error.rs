//! Runtime error types
//!
//! Typed failures of the lower crates (`intake_core::Error`,
//! `intake_assembler::Error`) travel inside [`Error`] and can be recovered with
//! `downcast_ref`.

/// Result type for runtime operations
pub type Result<T> = anyhow::Result<T>;

/// Runtime error (re-export anyhow for application-level errors)
pub type Error = anyhow::Error;
