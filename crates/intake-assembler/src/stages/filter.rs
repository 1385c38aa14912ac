//! Filter chain stage

use std::sync::Arc;

use intake_core::capabilities::{ExecutionContext, Filter, Record};

use crate::error::{Error, Result};

/// Filters applied in configuration order
pub struct FilterChain {
    filters: Vec<(String, Arc<dyn Filter>)>,
}

impl FilterChain {
    /// Chain of named filters
    pub fn new(filters: Vec<(String, Arc<dyn Filter>)>) -> Self {
        Self { filters }
    }

    /// Filter names in order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.filters.iter().map(|(name, _)| name.as_str())
    }

    /// `false` as soon as one filter drops the record
    pub fn accept(&self, record: &Record, ctx: &ExecutionContext<'_>) -> Result<bool> {
        for (name, filter) in &self.filters {
            let accepted = filter
                .accept(record, ctx)
                .map_err(|e| Error::capability("filter", e.context(format!("filter '{name}'"))))?;
            if !accepted {
                tracing::trace!(filter = %name, row = ctx.row, "Record filtered");
                return Ok(false);
            }
        }
        Ok(true)
    }
}
