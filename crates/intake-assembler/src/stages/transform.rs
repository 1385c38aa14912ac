//! Field mapping stage
//!
//! Applies an importer's `mappings` to a record. A mapping with `to` moves the
//! field to its new name, keeping its position; a mapping with only a
//! `converter` converts the field in place. Fields without a mapping pass
//! through unchanged and mappings whose source field is absent are skipped.

use once_cell::sync::OnceCell;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

use intake_core::capabilities::{Converter, ConverterProvider, ExecutionContext, Record};
use intake_core::config::{MappingRule, Ordered};

use crate::error::{Error, Result};

/// A converter looked up by name on first use
pub struct LazyConverter {
    name: String,
    provider: Arc<dyn ConverterProvider>,
    resolved: OnceCell<Arc<dyn Converter>>,
}

impl LazyConverter {
    /// Converter `name` from `provider`
    pub fn new(name: impl Into<String>, provider: Arc<dyn ConverterProvider>) -> Self {
        Self {
            name: name.into(),
            provider,
            resolved: OnceCell::new(),
        }
    }

    /// Converter name
    pub fn name(&self) -> &str {
        &self.name
    }

    fn get(&self) -> Result<&Arc<dyn Converter>> {
        self.resolved.get_or_try_init(|| {
            self.provider
                .resolve(&self.name)
                .ok_or_else(|| Error::UnknownConverter {
                    name: self.name.clone(),
                })
        })
    }

    /// Convert `value`
    pub fn convert(&self, value: Value, ctx: &ExecutionContext<'_>) -> Result<Value> {
        self.get()?
            .convert(value, ctx)
            .map_err(|e| Error::capability("converter", e))
    }
}

/// One compiled mapping
pub struct FieldMapping {
    from: String,
    to: Option<String>,
    converter: Option<LazyConverter>,
}

impl FieldMapping {
    /// Source field
    pub fn from(&self) -> &str {
        &self.from
    }

    /// Field name the value ends up under
    pub fn target(&self) -> &str {
        self.to.as_deref().unwrap_or(&self.from)
    }

    /// Converter name, if any
    pub fn converter(&self) -> Option<&str> {
        self.converter.as_ref().map(LazyConverter::name)
    }
}

/// Applies field mappings in configuration order
pub struct Transformer {
    mappings: Vec<FieldMapping>,
}

impl Transformer {
    /// Compile `mappings`; converters resolve through `converters` on first use
    pub fn new(
        mappings: &Ordered<MappingRule>,
        converters: Option<&Arc<dyn ConverterProvider>>,
    ) -> Self {
        let mappings = mappings
            .iter()
            .map(|(from, rule)| FieldMapping {
                from: from.to_string(),
                to: rule.to.clone(),
                converter: match (&rule.converter, converters) {
                    (Some(name), Some(provider)) => {
                        Some(LazyConverter::new(name.clone(), provider.clone()))
                    }
                    _ => None,
                },
            })
            .collect();
        Self { mappings }
    }

    /// Compiled mappings
    pub fn mappings(&self) -> &[FieldMapping] {
        &self.mappings
    }

    /// Apply every mapping to `record`
    pub fn apply(&self, record: Record, ctx: &ExecutionContext<'_>) -> Result<Record> {
        let mut mapped: Vec<(&str, &str, Value)> = Vec::new();
        for mapping in &self.mappings {
            let Some(value) = record.get(&mapping.from) else {
                continue;
            };
            let value = match &mapping.converter {
                Some(converter) => converter.convert(value.clone(), ctx)?,
                None => value.clone(),
            };
            mapped.push((mapping.from.as_str(), mapping.target(), value));
        }

        let targets: HashSet<&str> = mapped.iter().map(|(_, to, _)| *to).collect();
        let mut output = Record::new();
        for (field, value) in record {
            match mapped.iter().position(|(from, _, _)| *from == field) {
                Some(i) => {
                    let (_, to, value) = mapped.swap_remove(i);
                    output.insert(to.to_string(), value);
                }
                None if targets.contains(field.as_str()) => {}
                None => {
                    output.insert(field, value);
                }
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Upper;

    impl Converter for Upper {
        fn convert(&self, value: Value, _ctx: &ExecutionContext<'_>) -> anyhow::Result<Value> {
            match value {
                Value::String(s) => Ok(Value::String(s.to_uppercase())),
                other => anyhow::bail!("cannot uppercase {other}"),
            }
        }
    }

    struct Converters;

    impl ConverterProvider for Converters {
        fn resolve(&self, name: &str) -> Option<Arc<dyn Converter>> {
            (name == "upper").then(|| Arc::new(Upper) as Arc<dyn Converter>)
        }
    }

    fn ctx() -> ExecutionContext<'static> {
        ExecutionContext {
            importer: "test",
            context: None,
            row: 0,
        }
    }

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("Expected object, got {other}"),
        }
    }

    fn transformer(rules: Vec<(&str, MappingRule)>) -> Transformer {
        let provider: Arc<dyn ConverterProvider> = Arc::new(Converters);
        let rules: Ordered<MappingRule> = rules.into_iter().collect();
        Transformer::new(&rules, Some(&provider))
    }

    #[test]
    fn test_rename_moves_field_in_place() {
        let t = transformer(vec![("first_name", MappingRule::to("name"))]);
        let out = t
            .apply(record(json!({"id": 1, "first_name": "Alice", "age": 30})), &ctx())
            .unwrap();
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["id", "name", "age"]);
        assert_eq!(out["name"], "Alice");
        assert!(out.get("first_name").is_none());
    }

    #[test]
    fn test_converter_only_converts_in_place() {
        let t = transformer(vec![("city", MappingRule::converted("upper"))]);
        let out = t.apply(record(json!({"city": "oslo"})), &ctx()).unwrap();
        assert_eq!(out["city"], "OSLO");
    }

    #[test]
    fn test_rename_with_converter() {
        let t = transformer(vec![(
            "town",
            MappingRule::to("city").with_converter("upper"),
        )]);
        let out = t.apply(record(json!({"town": "bergen"})), &ctx()).unwrap();
        assert_eq!(out, record(json!({"city": "BERGEN"})));
    }

    #[test]
    fn test_missing_source_field_is_skipped() {
        let t = transformer(vec![("missing", MappingRule::to("other"))]);
        let input = record(json!({"a": 1}));
        assert_eq!(t.apply(input.clone(), &ctx()).unwrap(), input);
    }

    #[test]
    fn test_mapped_value_wins_over_existing_target() {
        let t = transformer(vec![("new_email", MappingRule::to("email"))]);
        let out = t
            .apply(
                record(json!({"email": "old@x", "new_email": "new@x"})),
                &ctx(),
            )
            .unwrap();
        assert_eq!(out, record(json!({"email": "new@x"})));
    }

    #[test]
    fn test_unknown_converter_fails_on_first_use() {
        let t = transformer(vec![("a", MappingRule::converted("nope"))]);
        // Not touched when the field is absent
        assert!(t.apply(record(json!({"b": 1})), &ctx()).is_ok());
        match t.apply(record(json!({"a": 1})), &ctx()) {
            Err(Error::UnknownConverter { name }) => assert_eq!(name, "nope"),
            other => panic!("Expected UnknownConverter, got {other:?}"),
        }
    }

    #[test]
    fn test_converter_failure_is_a_capability_error() {
        let t = transformer(vec![("n", MappingRule::converted("upper"))]);
        assert!(matches!(
            t.apply(record(json!({"n": 5})), &ctx()),
            Err(Error::Capability { capability: "converter", .. })
        ));
    }
}
