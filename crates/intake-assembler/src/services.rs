//! Capability bundle handed to the assembler and the storage registry

use std::fmt;
use std::sync::Arc;

use intake_core::capabilities::{
    ConnectionFactory, ConverterProvider, ExpressionEvaluator, FilterProvider, FormatDiscovery,
    FormatFactory, ObjectFactoryProvider, ServiceLocator, Validator,
};

use crate::array::ArrayStore;
use crate::error::{Error, Result};

/// Capabilities supplied by the host application
///
/// Every capability is optional. Whatever a configuration needs is checked when
/// a provider is resolved or an importer is assembled, and reported as
/// [`Error::MissingCapability`].
#[derive(Clone, Default)]
pub struct Services {
    format_factory: Option<Arc<dyn FormatFactory>>,
    format_discovery: Option<Arc<dyn FormatDiscovery>>,
    connections: Option<Arc<dyn ConnectionFactory>>,
    service_locator: Option<Arc<dyn ServiceLocator>>,
    converters: Option<Arc<dyn ConverterProvider>>,
    validator: Option<Arc<dyn Validator>>,
    object_factories: Option<Arc<dyn ObjectFactoryProvider>>,
    filters: Option<Arc<dyn FilterProvider>>,
    expressions: Option<Arc<dyn ExpressionEvaluator>>,
    arrays: ArrayStore,
}

macro_rules! capability {
    ($field:ident, $with:ident, $require:ident, $trait:ident, $name:literal $(,)?) => {
        #[doc = concat!("Supply the `", $name, "` capability")]
        pub fn $with(mut self, capability: Arc<dyn $trait>) -> Self {
            self.$field = Some(capability);
            self
        }

        #[doc = concat!("The `", $name, "` capability, or an error naming `required_by`")]
        pub fn $require(&self, required_by: impl fmt::Display) -> Result<&Arc<dyn $trait>> {
            self.$field.as_ref().ok_or_else(|| Error::MissingCapability {
                capability: $name,
                required_by: required_by.to_string(),
            })
        }
    };
}

impl Services {
    /// No capabilities
    pub fn new() -> Self {
        Self::default()
    }

    capability!(
        format_factory,
        with_format_factory,
        format_factory,
        FormatFactory,
        "format factory",
    );
    capability!(
        format_discovery,
        with_format_discovery,
        format_discovery,
        FormatDiscovery,
        "format discovery",
    );
    capability!(
        connections,
        with_connections,
        connections,
        ConnectionFactory,
        "connection factory",
    );
    capability!(
        service_locator,
        with_service_locator,
        service_locator,
        ServiceLocator,
        "service locator",
    );
    capability!(converters, with_converters, converters, ConverterProvider, "converter provider");
    capability!(validator, with_validator, validator, Validator, "validator");
    capability!(
        object_factories,
        with_object_factories,
        object_factories,
        ObjectFactoryProvider,
        "object factory provider",
    );
    capability!(filters, with_filters, filters, FilterProvider, "filter provider");
    capability!(
        expressions,
        with_expressions,
        expressions,
        ExpressionEvaluator,
        "expression evaluator",
    );

    /// Share an array store with the caller
    pub fn with_arrays(mut self, arrays: ArrayStore) -> Self {
        self.arrays = arrays;
        self
    }

    /// Named in-memory buffers used by `array` endpoints
    pub fn arrays(&self) -> &ArrayStore {
        &self.arrays
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("format_factory", &self.format_factory.is_some())
            .field("format_discovery", &self.format_discovery.is_some())
            .field("connections", &self.connections.is_some())
            .field("service_locator", &self.service_locator.is_some())
            .field("converters", &self.converters.is_some())
            .field("validator", &self.validator.is_some())
            .field("object_factories", &self.object_factories.is_some())
            .field("filters", &self.filters.is_some())
            .field("expressions", &self.expressions.is_some())
            .field("arrays", &self.arrays)
            .finish()
    }
}
