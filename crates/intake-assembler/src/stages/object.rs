//! Object materialization stage

use serde_json::Value;
use std::sync::Arc;

use intake_core::capabilities::{ObjectFactory, Record};
use intake_core::config::ObjectFactoryKind;

use crate::error::{Error, Result};

/// Turns mapped records into objects of one class
pub struct Materializer {
    kind: ObjectFactoryKind,
    class: String,
    factory: Arc<dyn ObjectFactory>,
}

impl Materializer {
    /// Materializer for `class` using `factory`
    pub fn new(
        kind: ObjectFactoryKind,
        class: impl Into<String>,
        factory: Arc<dyn ObjectFactory>,
    ) -> Self {
        Self {
            kind,
            class: class.into(),
            factory,
        }
    }

    /// Factory kind
    pub fn kind(&self) -> ObjectFactoryKind {
        self.kind
    }

    /// Materialized class
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Object built from `record`
    pub fn materialize(&self, record: Record) -> Result<Value> {
        self.factory.materialize(record).map_err(|e| {
            Error::capability("object factory", e.context(format!("class '{}'", self.class)))
        })
    }
}
