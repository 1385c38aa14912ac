//! Record validation stage

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use intake_core::capabilities::{Record, Validator};
use intake_core::config::{ConstraintSet, ValidationOptions};

use crate::error::{Error, Result};

/// One validation failure of a record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Offending field; `None` for whole-object violations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    /// What is wrong
    pub message: String,
}

impl Violation {
    /// Violation of `field`
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    /// Violation of the whole object
    pub fn object(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.field {
            Some(field) => write!(f, "{field}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// How target records are validated
#[derive(Debug, Clone)]
pub enum TargetCheck {
    /// Per-field constraints on the mapped record
    Fields(ConstraintSet),
    /// Whole-object validation of the materialized object
    Object {
        /// Class of the materialized object
        class: String,
    },
}

/// Checks records against the configured constraints
pub struct RecordValidator {
    validator: Arc<dyn Validator>,
    options: ValidationOptions,
    source: Option<ConstraintSet>,
    target: Option<TargetCheck>,
}

impl RecordValidator {
    /// Validator with structural tolerance `options`
    pub fn new(validator: Arc<dyn Validator>, options: ValidationOptions) -> Self {
        Self {
            validator,
            options,
            source: None,
            target: None,
        }
    }

    /// Check source records against `constraints`
    pub fn with_source(mut self, constraints: ConstraintSet) -> Self {
        self.source = Some(constraints);
        self
    }

    /// Check target records
    pub fn with_target(mut self, check: TargetCheck) -> Self {
        self.target = Some(check);
        self
    }

    /// Structural tolerance
    pub fn options(&self) -> ValidationOptions {
        self.options
    }

    /// Target check, if configured
    pub fn target(&self) -> Option<&TargetCheck> {
        self.target.as_ref()
    }

    /// Violations of a source record
    pub fn check_source(&self, record: &Record) -> Result<Vec<Violation>> {
        match &self.source {
            Some(constraints) => self.check_fields(record, constraints),
            None => Ok(Vec::new()),
        }
    }

    /// Violations of a mapped record against per-field target constraints
    pub fn check_target(&self, record: &Record) -> Result<Vec<Violation>> {
        match &self.target {
            Some(TargetCheck::Fields(constraints)) => self.check_fields(record, constraints),
            _ => Ok(Vec::new()),
        }
    }

    /// Violations of a materialized object
    pub fn check_object(&self, object: &Value) -> Result<Vec<Violation>> {
        let Some(TargetCheck::Object { class }) = &self.target else {
            return Ok(Vec::new());
        };
        let messages = self
            .validator
            .check_object(class, object)
            .map_err(|e| Error::capability("validator", e))?;
        Ok(messages.into_iter().map(Violation::object).collect())
    }

    fn check_fields(&self, record: &Record, constraints: &ConstraintSet) -> Result<Vec<Violation>> {
        let mut violations = Vec::new();

        for (field, constraint) in constraints.constraints.iter() {
            match record.get(field) {
                Some(value) => {
                    let messages = self
                        .validator
                        .check(value, constraint)
                        .map_err(|e| Error::capability("validator", e))?;
                    violations.extend(messages.into_iter().map(|m| Violation::field(field, m)));
                }
                None if !self.options.allow_missing_fields => {
                    violations.push(Violation::field(field, "field is missing"));
                }
                None => {}
            }
        }

        if !self.options.allow_extra_fields {
            violations.extend(
                record
                    .keys()
                    .filter(|key| constraints.constraints.get(key).is_none())
                    .map(|key| Violation::field(key.as_str(), "field is not expected")),
            );
        }

        Ok(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    struct NotBlank;

    impl Validator for NotBlank {
        fn check(&self, value: &Value, constraint: &str) -> anyhow::Result<Vec<String>> {
            match constraint {
                "not_blank" if value.as_str().is_some_and(str::is_empty) || value.is_null() => {
                    Ok(vec!["must not be blank".to_string()])
                }
                "not_blank" => Ok(Vec::new()),
                other => anyhow::bail!("unknown constraint '{other}'"),
            }
        }

        fn check_object(&self, class: &str, object: &Value) -> anyhow::Result<Vec<String>> {
            if object.get("id").is_none() {
                Ok(vec![format!("{class} needs an id")])
            } else {
                Ok(Vec::new())
            }
        }
    }

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap_or_default()
    }

    fn validator(allow_extra: bool, allow_missing: bool) -> RecordValidator {
        RecordValidator::new(
            Arc::new(NotBlank),
            ValidationOptions {
                allow_extra_fields: allow_extra,
                allow_missing_fields: allow_missing,
            },
        )
        .with_source(ConstraintSet::from_pairs([("name", "not_blank")]))
    }

    #[test]
    fn test_valid_record() {
        let v = validator(false, false);
        assert!(v.check_source(&record(json!({"name": "Ann"}))).unwrap().is_empty());
    }

    #[test]
    fn test_constraint_violation_names_field() {
        let v = validator(false, false);
        let violations = v.check_source(&record(json!({"name": ""}))).unwrap();
        assert_eq!(violations, vec![Violation::field("name", "must not be blank")]);
        assert_eq!(violations[0].to_string(), "name: must not be blank");
    }

    #[rstest]
    #[case(false, false, json!({"name": "Ann", "age": 3}), 1)]
    #[case(true, false, json!({"name": "Ann", "age": 3}), 0)]
    #[case(false, false, json!({}), 1)]
    #[case(false, true, json!({}), 0)]
    #[case(false, false, json!({"age": 3}), 2)]
    #[case(true, true, json!({"age": 3}), 0)]
    fn test_structural_options(
        #[case] allow_extra: bool,
        #[case] allow_missing: bool,
        #[case] input: Value,
        #[case] expected: usize,
    ) {
        let v = validator(allow_extra, allow_missing);
        assert_eq!(v.check_source(&record(input)).unwrap().len(), expected);
    }

    #[test]
    fn test_object_check() {
        let v = RecordValidator::new(Arc::new(NotBlank), ValidationOptions::default())
            .with_target(TargetCheck::Object {
                class: "Customer".to_string(),
            });
        assert!(v.check_target(&record(json!({"x": 1}))).unwrap().is_empty());
        assert_eq!(
            v.check_object(&json!({"name": "Ann"})).unwrap(),
            vec![Violation::object("Customer needs an id")]
        );
    }

    #[test]
    fn test_validator_failure_is_an_error() {
        let v = RecordValidator::new(Arc::new(NotBlank), ValidationOptions::default())
            .with_target(TargetCheck::Fields(ConstraintSet::from_pairs([("a", "bogus")])));
        assert!(matches!(
            v.check_target(&record(json!({"a": 1}))),
            Err(Error::Capability { capability: "validator", .. })
        ));
    }
}
