//! Shorthand normalization
//!
//! Rewrites the permissive forms accepted in configuration documents into the
//! one canonical shape the validator and the typed model understand. Every
//! rule only fires on the shorthand form, so normalizing a canonical document
//! is a no-op and `normalize(normalize(doc)) == normalize(doc)`.
//!
//! | Position | Shorthand | Canonical |
//! |---|---|---|
//! | any list (filters, formats, queries...) | `csv` | `[csv]` |
//! | `mappings.<field>` | `target_field` | `{to: target_field}` |
//! | `target` without `type` | `my_service` | `{type: callable, callable: [my_service]}` |
//! | `source.format` / `target.format` | `csv` | `{type: csv}` |
//! | `validation.source` / `validation.target` | `{field: ref}` | `{constraints: {field: ref}}` |
//! | `storageprovider.<name>.services.<svc>` | `[m1, m2]` | `{methods: [m1, m2]}` |
//!
//! Singular aliases (`importer`, `service`, `query`, `method`, `mapping`,
//! `field`, `argument`, `constraint`) fold into their plural key, and
//! `callableRef` folds into `callable`.

use serde_json::{Map, Value, json};

/// Normalize a raw configuration document
pub fn normalize(document: &Value) -> Value {
    let mut canonical = document.clone();
    if let Some(root) = canonical.as_object_mut() {
        fold_alias(root, "importer", "importers");

        if let Some(Value::Object(providers)) = root.get_mut("storageprovider") {
            for provider in providers.values_mut() {
                normalize_provider(provider);
            }
        }

        if let Some(Value::Object(importers)) = root.get_mut("importers") {
            for importer in importers.values_mut() {
                normalize_importer(importer);
            }
        }
    }
    canonical
}

fn normalize_provider(provider: &mut Value) {
    let Some(map) = provider.as_object_mut() else {
        return;
    };
    fold_alias(map, "service", "services");
    fold_alias(map, "query", "queries");

    if let Some(queries) = map.get_mut("queries") {
        into_list(queries);
    }

    if let Some(Value::Object(services)) = map.get_mut("services") {
        for service in services.values_mut() {
            normalize_service(service);
        }
    }
}

fn normalize_service(service: &mut Value) {
    match service {
        Value::Object(map) => {
            fold_alias(map, "method", "methods");
            if let Some(methods) = map.get_mut("methods") {
                into_list(methods);
            }
        }
        _ => {
            let mut methods = service.take();
            into_list(&mut methods);
            *service = json!({ "methods": methods });
        }
    }
}

fn normalize_importer(importer: &mut Value) {
    let Some(map) = importer.as_object_mut() else {
        return;
    };
    fold_alias(map, "mapping", "mappings");

    if let Some(context) = map.get_mut("context") {
        if is_scalar(context) {
            into_list(context);
        }
    }

    if let Some(Value::Object(preconditions)) = map.get_mut("preconditions") {
        fold_alias(preconditions, "field", "fields");
        for key in ["format", "filename", "fieldset", "fields"] {
            if let Some(list) = preconditions.get_mut(key) {
                into_list(list);
            }
        }
    }

    if let Some(Value::Object(factory)) = map.get_mut("object_factory") {
        factory
            .entry("type")
            .or_insert_with(|| Value::String("default".to_string()));
    }

    if let Some(filters) = map.get_mut("filters") {
        into_list(filters);
    }

    if let Some(Value::Object(mappings)) = map.get_mut("mappings") {
        for rule in mappings.values_mut() {
            if is_scalar(rule) {
                *rule = json!({ "to": rule.take() });
            }
        }
    }

    if let Some(source) = map.get_mut("source") {
        normalize_endpoint(source);
    }

    if let Some(target) = map.get_mut("target") {
        let typed = target.as_object().is_some_and(|t| t.contains_key("type"));
        if !typed {
            *target = json!({ "type": "callable", "callable": target.take() });
        }
        normalize_endpoint(target);
    }

    if let Some(Value::Object(validation)) = map.get_mut("validation") {
        for side in ["source", "target"] {
            if let Some(constraints) = validation.get_mut(side) {
                normalize_constraints(constraints);
            }
        }
    }
}

fn normalize_endpoint(endpoint: &mut Value) {
    let Some(map) = endpoint.as_object_mut() else {
        return;
    };
    fold_alias(map, "callableRef", "callable");

    if let Some(callable) = map.get_mut("callable") {
        into_list(callable);
    }

    if let Some(format) = map.get_mut("format") {
        match format {
            Value::String(_) => *format = json!({ "type": format.take() }),
            Value::Object(spec) => {
                fold_alias(spec, "argument", "arguments");
                if let Some(arguments) = spec.get_mut("arguments") {
                    into_list(arguments);
                }
            }
            _ => {}
        }
    }
}

fn normalize_constraints(side: &mut Value) {
    if let Value::Object(map) = side {
        if map.contains_key("constraints") || map.contains_key("constraint") {
            fold_alias(map, "constraint", "constraints");
            return;
        }
    }
    let constraints = match side.take() {
        Value::Null => Value::Object(Map::new()),
        other => other,
    };
    *side = json!({ "constraints": constraints });
}

/// Move `singular` to `plural` unless `plural` is already set
fn fold_alias(map: &mut Map<String, Value>, singular: &str, plural: &str) {
    if map.contains_key(plural) {
        return;
    }
    if let Some(value) = map.remove(singular) {
        map.insert(plural.to_string(), value);
    }
}

fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

/// Scalars become one-element lists, null becomes the empty list
fn into_list(value: &mut Value) {
    if is_scalar(value) {
        *value = Value::Array(vec![value.take()]);
    } else if value.is_null() {
        *value = Value::Array(Vec::new());
    }
}
