//! Schema validation of canonical configuration documents
//!
//! Runs after [`crate::normalize`]. The first violation aborts validation with
//! [`Error::Configuration`], naming the dotted path of the offending node.

use serde_json::{Map, Value};
use std::fmt;

use crate::config::{FILE_FORMATS, OBJECT_FACTORY_KINDS, PROVIDER_KINDS, STORAGE_KINDS};
use crate::error::{ConfigRule, Error, Result};

const ROOT_KEYS: &[&str] = &["storageprovider", "importers"];
const PROVIDER_KEYS: &[&str] = &["type", "uri", "connection_factory", "services", "queries"];
const IMPORTER_KEYS: &[&str] = &[
    "context",
    "preconditions",
    "object_factory",
    "filters",
    "mappings",
    "source",
    "target",
    "validation",
];
const PRECONDITION_KEYS: &[&str] = &["format", "fieldcount", "filename", "fieldset", "fields"];
const ENDPOINT_KEYS: &[&str] = &["type", "uri", "format", "callable", "service", "method", "entity"];

/// Validate a canonical document
pub fn validate(document: &Value) -> Result<()> {
    let root = NodePath::default();
    let map = object(document, &root)?;
    known_keys(map, &root, ROOT_KEYS)?;

    if let Some(providers) = map.get("storageprovider") {
        let path = root.child("storageprovider");
        for (name, provider) in object(providers, &path)? {
            validate_provider(provider, &path.child(name))?;
        }
    }

    if let Some(importers) = map.get("importers") {
        let path = root.child("importers");
        for (name, importer) in object(importers, &path)? {
            validate_importer(importer, &path.child(name))?;
        }
    }

    Ok(())
}

fn validate_provider(provider: &Value, path: &NodePath) -> Result<()> {
    let map = object(provider, path)?;
    known_keys(map, path, PROVIDER_KEYS)?;

    if let Some(kind) = map.get("type") {
        one_of(kind, &path.child("type"), PROVIDER_KINDS)?;
    }
    optional_string(map, path, "uri")?;
    optional_string(map, path, "connection_factory")?;

    if let Some(services) = map.get("services") {
        let services_path = path.child("services");
        for (name, service) in object(services, &services_path)? {
            let service_path = services_path.child(name);
            let service = object(service, &service_path)?;
            known_keys(service, &service_path, &["methods"])?;
            if let Some(methods) = service.get("methods") {
                string_list(methods, &service_path.child("methods"))?;
            }
        }
    }

    if let Some(queries) = map.get("queries") {
        string_list(queries, &path.child("queries"))?;
    }

    Ok(())
}

fn validate_importer(importer: &Value, path: &NodePath) -> Result<()> {
    let map = object(importer, path)?;
    known_keys(map, path, IMPORTER_KEYS)?;

    if let Some(context) = map.get("context") {
        if !context.is_array() && !context.is_object() {
            return Err(Error::config(
                path.child("context"),
                ConfigRule::InvalidType("a list or mapping"),
            ));
        }
    }

    if let Some(preconditions) = map.get("preconditions") {
        validate_precondition(preconditions, &path.child("preconditions"))?;
    }

    if let Some(factory) = map.get("object_factory") {
        let factory_path = path.child("object_factory");
        let factory = object(factory, &factory_path)?;
        known_keys(factory, &factory_path, &["type", "class"])?;
        if let Some(kind) = factory.get("type") {
            one_of(kind, &factory_path.child("type"), OBJECT_FACTORY_KINDS)?;
        }
        let class = required(factory, &factory_path, "class")?;
        non_empty_string(class, &factory_path.child("class"))?;
    }

    if let Some(filters) = map.get("filters") {
        string_list(filters, &path.child("filters"))?;
    }

    if let Some(mappings) = map.get("mappings") {
        let mappings_path = path.child("mappings");
        for (field, rule) in object(mappings, &mappings_path)? {
            validate_mapping(rule, &mappings_path.child(field))?;
        }
    }

    if let Some(source) = map.get("source") {
        validate_endpoint(source, &path.child("source"))?;
    }

    let target = required(map, path, "target")?;
    validate_endpoint(target, &path.child("target"))?;

    if let Some(validation) = map.get("validation") {
        validate_validation(validation, &path.child("validation"))?;
    }

    Ok(())
}

fn validate_precondition(precondition: &Value, path: &NodePath) -> Result<()> {
    let map = object(precondition, path)?;
    known_keys(map, path, PRECONDITION_KEYS)?;

    if let Some(formats) = map.get("format") {
        let formats_path = path.child("format");
        for (i, format) in list(formats, &formats_path)?.iter().enumerate() {
            one_of(format, &formats_path.item(i), FILE_FORMATS)?;
        }
    }

    if let Some(count) = map.get("fieldcount") {
        let count_path = path.child("fieldcount");
        match (count.as_u64(), count.as_i64()) {
            (Some(_), _) => {}
            (None, Some(negative)) => {
                return Err(Error::config(
                    count_path,
                    ConfigRule::NegativeFieldCount(negative),
                ));
            }
            (None, None) => {
                return Err(Error::config(
                    count_path,
                    ConfigRule::InvalidType("a non-negative integer"),
                ));
            }
        }
    }

    if let Some(filenames) = map.get("filename") {
        let filenames_path = path.child("filename");
        for (i, pattern) in string_list(filenames, &filenames_path)?.into_iter().enumerate() {
            glob::Pattern::new(pattern).map_err(|e| {
                Error::config(
                    filenames_path.item(i),
                    ConfigRule::InvalidPattern {
                        pattern: pattern.to_string(),
                        message: e.msg.to_string(),
                    },
                )
            })?;
        }
    }

    for key in ["fieldset", "fields"] {
        if let Some(fields) = map.get(key) {
            string_list(fields, &path.child(key))?;
        }
    }

    Ok(())
}

fn validate_mapping(rule: &Value, path: &NodePath) -> Result<()> {
    let map = object(rule, path)?;
    known_keys(map, path, &["to", "converter"])?;
    let to = optional_string(map, path, "to")?;
    let converter = optional_string(map, path, "converter")?;
    if to.is_none() && converter.is_none() {
        return Err(Error::config(path.clone(), ConfigRule::EmptyMapping));
    }
    Ok(())
}

fn validate_endpoint(endpoint: &Value, path: &NodePath) -> Result<()> {
    let map = object(endpoint, path)?;
    known_keys(map, path, ENDPOINT_KEYS)?;

    let kind = one_of(required(map, path, "type")?, &path.child("type"), STORAGE_KINDS)?;

    for key in ["uri", "service", "method", "entity"] {
        optional_string(map, path, key)?;
    }

    if let Some(format) = map.get("format") {
        let format_path = path.child("format");
        let format = object(format, &format_path)?;
        known_keys(format, &format_path, &["type", "arguments"])?;
        non_empty_string(required(format, &format_path, "type")?, &format_path.child("type"))?;
        if let Some(arguments) = format.get("arguments") {
            string_list(arguments, &format_path.child("arguments"))?;
        }
    }

    if let Some(callable) = map.get("callable") {
        let callable_path = path.child("callable");
        let parts = string_list(callable, &callable_path)?;
        if parts.is_empty() || parts.len() > 2 {
            return Err(Error::config(
                callable_path,
                ConfigRule::InvalidType("[service] or [service, method]"),
            ));
        }
    }

    match kind {
        "file" => {
            required(map, path, "uri")?;
        }
        "service" => {
            required(map, path, "service")?;
            required(map, path, "method")?;
        }
        "callable" => {
            required(map, path, "callable")?;
        }
        "doctrine" => {
            required(map, path, "entity")?;
        }
        _ => {}
    }

    Ok(())
}

fn validate_validation(validation: &Value, path: &NodePath) -> Result<()> {
    let map = object(validation, path)?;
    known_keys(map, path, &["options", "source", "target"])?;

    if let Some(options) = map.get("options") {
        let options_path = path.child("options");
        let options = object(options, &options_path)?;
        known_keys(
            options,
            &options_path,
            &["allowExtraFields", "allowMissingFields"],
        )?;
        for (key, value) in options {
            if !value.is_boolean() {
                return Err(Error::config(
                    options_path.child(key),
                    ConfigRule::InvalidType("a boolean"),
                ));
            }
        }
    }

    for side in ["source", "target"] {
        let Some(constraints) = map.get(side) else {
            continue;
        };
        let side_path = path.child(side);
        let side_map = object(constraints, &side_path)?;
        known_keys(side_map, &side_path, &["constraints"])?;
        if let Some(constraints) = side_map.get("constraints") {
            let constraints_path = side_path.child("constraints");
            for (field, constraint) in object(constraints, &constraints_path)? {
                non_empty_string(constraint, &constraints_path.child(field))?;
            }
        }
    }

    Ok(())
}

// ============================================================================
// Node helpers
// ============================================================================

/// Dotted path of a node, e.g. `importers.orders.preconditions.format[1]`
#[derive(Debug, Clone, Default)]
struct NodePath(String);

impl NodePath {
    fn child(&self, key: &str) -> Self {
        if self.0.is_empty() {
            Self(key.to_string())
        } else {
            Self(format!("{}.{}", self.0, key))
        }
    }

    fn item(&self, index: usize) -> Self {
        Self(format!("{}[{}]", self.0, index))
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("(root)")
        } else {
            f.write_str(&self.0)
        }
    }
}

impl From<NodePath> for String {
    fn from(path: NodePath) -> Self {
        path.to_string()
    }
}

fn object<'a>(value: &'a Value, path: &NodePath) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| Error::config(path.clone(), ConfigRule::InvalidType("a mapping")))
}

fn list<'a>(value: &'a Value, path: &NodePath) -> Result<&'a Vec<Value>> {
    value
        .as_array()
        .ok_or_else(|| Error::config(path.clone(), ConfigRule::InvalidType("a list")))
}

fn string<'a>(value: &'a Value, path: &NodePath) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| Error::config(path.clone(), ConfigRule::InvalidType("a string")))
}

fn non_empty_string<'a>(value: &'a Value, path: &NodePath) -> Result<&'a str> {
    match string(value, path)? {
        "" => Err(Error::config(
            path.clone(),
            ConfigRule::InvalidType("a non-empty string"),
        )),
        s => Ok(s),
    }
}

fn string_list<'a>(value: &'a Value, path: &NodePath) -> Result<Vec<&'a str>> {
    list(value, path)?
        .iter()
        .enumerate()
        .map(|(i, item)| string(item, &path.item(i)))
        .collect()
}

fn one_of<'a>(value: &'a Value, path: &NodePath, allowed: &'static [&'static str]) -> Result<&'a str> {
    let s = string(value, path)?;
    if allowed.contains(&s) {
        Ok(s)
    } else {
        Err(Error::config(
            path.clone(),
            ConfigRule::UnknownVariant {
                value: s.to_string(),
                allowed,
            },
        ))
    }
}

fn required<'a>(map: &'a Map<String, Value>, path: &NodePath, key: &'static str) -> Result<&'a Value> {
    map.get(key)
        .ok_or_else(|| Error::config(path.clone(), ConfigRule::MissingField(key)))
}

fn optional_string<'a>(
    map: &'a Map<String, Value>,
    path: &NodePath,
    key: &str,
) -> Result<Option<&'a str>> {
    map.get(key)
        .map(|value| string(value, &path.child(key)))
        .transpose()
}

fn known_keys(map: &Map<String, Value>, path: &NodePath, allowed: &[&str]) -> Result<()> {
    match map.keys().find(|key| !allowed.contains(&key.as_str())) {
        Some(unknown) => Err(Error::config(path.child(unknown), ConfigRule::UnknownKey)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use rstest::rstest;
    use serde_json::json;

    fn check(document: Value) -> Result<()> {
        validate(&normalize(&document))
    }

    fn violation(document: Value) -> (String, ConfigRule) {
        match check(document) {
            Err(Error::Configuration { path, rule }) => (path, rule),
            other => panic!("Expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_document() {
        let document = json!({
            "storageprovider": {
                "uploads": { "type": "upload", "uri": "/tmp/up" },
                "db": { "type": "dbal", "connection_factory": "conns", "queries": ["SELECT 1"] },
                "svc": { "type": "service", "services": { "exporter": ["all"] } }
            },
            "importers": {
                "customers": {
                    "context": { "batch": 1 },
                    "preconditions": { "format": ["csv", "excel"], "fieldcount": 0, "filename": ["*.csv"] },
                    "object_factory": { "type": "custom", "class": "Customer" },
                    "filters": ["active"],
                    "mappings": { "a": "b", "c": { "converter": "upper" } },
                    "source": { "type": "file", "uri": "in.csv", "format": "csv" },
                    "validation": {
                        "options": { "allowExtraFields": true, "allowMissingFields": false },
                        "source": { "a": "not_blank" },
                        "target": { "constraints": { "b": "email" } }
                    },
                    "target": { "type": "service", "service": "writer", "method": "write" }
                }
            }
        });
        check(document).unwrap();
    }

    #[test]
    fn test_zero_importers_is_valid() {
        check(json!({ "importers": {} })).unwrap();
        check(json!({ "storageprovider": { "f": { "type": "file" } } })).unwrap();
    }

    #[test]
    fn test_provider_without_type_is_accepted() {
        check(json!({ "storageprovider": { "f": { "uri": "/tmp" } } })).unwrap();
    }

    #[rstest]
    #[case::unknown_provider_kind(
        json!({ "storageprovider": { "p": { "type": "ftp" } } }),
        "storageprovider.p.type"
    )]
    #[case::unknown_storage_kind(
        json!({ "importers": { "a": { "target": { "type": "kafka" } } } }),
        "importers.a.target.type"
    )]
    #[case::unknown_format(
        json!({ "importers": { "a": { "preconditions": { "format": ["csv", "json"] }, "target": "t" } } }),
        "importers.a.preconditions.format[1]"
    )]
    #[case::unknown_factory_kind(
        json!({ "importers": { "a": { "object_factory": { "type": "magic", "class": "C" }, "target": "t" } } }),
        "importers.a.object_factory.type"
    )]
    fn test_enumerations_are_closed(#[case] document: Value, #[case] expected_path: &str) {
        let (path, rule) = violation(document);
        assert_eq!(path, expected_path);
        assert!(matches!(rule, ConfigRule::UnknownVariant { .. }));
    }

    #[test]
    fn test_missing_target() {
        let (path, rule) = violation(json!({ "importers": { "a": { "filters": [] } } }));
        assert_eq!(path, "importers.a");
        assert_eq!(rule, ConfigRule::MissingField("target"));
    }

    #[rstest]
    #[case(json!({ "type": "file" }), "uri")]
    #[case(json!({ "type": "service", "service": "s" }), "method")]
    #[case(json!({ "type": "doctrine" }), "entity")]
    #[case(json!({ "type": "callable" }), "callable")]
    fn test_endpoint_required_fields(#[case] target: Value, #[case] field: &'static str) {
        let (path, rule) = violation(json!({ "importers": { "a": { "target": target } } }));
        assert_eq!(path, "importers.a.target");
        assert_eq!(rule, ConfigRule::MissingField(field));
    }

    #[test]
    fn test_negative_field_count() {
        let (path, rule) = violation(json!({
            "importers": { "a": { "preconditions": { "fieldcount": -1 }, "target": "t" } }
        }));
        assert_eq!(path, "importers.a.preconditions.fieldcount");
        assert_eq!(rule, ConfigRule::NegativeFieldCount(-1));
    }

    #[test]
    fn test_fractional_field_count() {
        let (_, rule) = violation(json!({
            "importers": { "a": { "preconditions": { "fieldcount": 2.5 }, "target": "t" } }
        }));
        assert_eq!(rule, ConfigRule::InvalidType("a non-negative integer"));
    }

    #[test]
    fn test_invalid_filename_pattern() {
        let (path, rule) = violation(json!({
            "importers": { "a": { "preconditions": { "filename": "[abc" }, "target": "t" } }
        }));
        assert_eq!(path, "importers.a.preconditions.filename[0]");
        assert!(matches!(rule, ConfigRule::InvalidPattern { .. }));
    }

    #[test]
    fn test_unknown_key() {
        let (path, rule) = violation(json!({
            "importers": { "a": { "target": "t", "priority": 1 } }
        }));
        assert_eq!(path, "importers.a.priority");
        assert_eq!(rule, ConfigRule::UnknownKey);
    }

    #[test]
    fn test_empty_mapping_rule() {
        let (path, rule) = violation(json!({
            "importers": { "a": { "mappings": { "x": {} }, "target": "t" } }
        }));
        assert_eq!(path, "importers.a.mappings.x");
        assert_eq!(rule, ConfigRule::EmptyMapping);
    }

    #[test]
    fn test_object_factory_requires_class() {
        let (path, rule) = violation(json!({
            "importers": { "a": { "object_factory": {}, "target": "t" } }
        }));
        assert_eq!(path, "importers.a.object_factory");
        assert_eq!(rule, ConfigRule::MissingField("class"));
    }

    #[test]
    fn test_callable_with_too_many_parts() {
        let (path, _) = violation(json!({
            "importers": { "a": { "target": ["svc", "method", "extra"] } }
        }));
        assert_eq!(path, "importers.a.target.callable");
    }

    #[test]
    fn test_untyped_target_mapping_is_rejected() {
        let (path, rule) = violation(json!({
            "importers": { "a": { "target": { "uri": "/out.csv" } } }
        }));
        assert_eq!(path, "importers.a.target.callable");
        assert_eq!(rule, ConfigRule::InvalidType("a list"));
    }

    #[test]
    fn test_validation_options_must_be_boolean() {
        let (path, _) = violation(json!({
            "importers": { "a": {
                "validation": { "options": { "allowExtraFields": "yes" } },
                "target": "t"
            } }
        }));
        assert_eq!(path, "importers.a.validation.options.allowExtraFields");
    }

    #[test]
    fn test_root_must_be_mapping() {
        let (path, _) = violation(json!(["importers"]));
        assert_eq!(path, "(root)");
    }

    #[test]
    fn test_error_message_names_path_and_rule() {
        let err = check(json!({ "storageprovider": { "p": { "type": "ftp" } } })).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("storageprovider.p.type"));
        assert!(message.contains("ftp"));
        assert!(message.contains("dbal"));
    }
}
