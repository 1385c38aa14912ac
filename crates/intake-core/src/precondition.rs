//! Precondition matching
//!
//! A [`PreconditionMatcher`] is the compiled form of a [`Precondition`]: glob
//! patterns are parsed once and field lists become sets. It decides whether an
//! importer applies to an unclassified source described by a
//! [`SourceDescriptor`].

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::config::{FileFormat, Precondition};
use crate::error::{ConfigRule, Error, Result};

/// What is known about a source before an importer is chosen
///
/// Every part is optional. A populated precondition constraint that needs a
/// part the descriptor lacks does not match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// File name or path
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Detected file format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<FileFormat>,

    /// Header fields in file order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_fields: Option<Vec<String>>,
}

impl SourceDescriptor {
    /// Empty descriptor
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the file name
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }

    /// Set the detected format
    pub fn with_format(mut self, format: FileFormat) -> Self {
        self.format = Some(format);
        self
    }

    /// Set the header fields
    pub fn with_header_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.header_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }
}

/// Compiled precondition of one importer
#[derive(Debug, Clone, Default)]
pub struct PreconditionMatcher {
    filenames: Vec<glob::Pattern>,
    formats: BTreeSet<FileFormat>,
    field_count: Option<usize>,
    field_set: Option<BTreeSet<String>>,
    fields: BTreeSet<String>,
}

impl PreconditionMatcher {
    /// Compile the precondition of `importer`; `None` compiles to a catch-all
    pub fn compile(importer: &str, precondition: Option<&Precondition>) -> Result<Self> {
        let Some(precondition) = precondition else {
            return Ok(Self::default());
        };

        let filenames = precondition
            .filenames
            .iter()
            .enumerate()
            .map(|(i, pattern)| {
                glob::Pattern::new(pattern).map_err(|e| {
                    Error::config(
                        format!("importers.{importer}.preconditions.filename[{i}]"),
                        ConfigRule::InvalidPattern {
                            pattern: pattern.clone(),
                            message: e.msg.to_string(),
                        },
                    )
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let field_set = (!precondition.field_set.is_empty())
            .then(|| precondition.field_set.iter().cloned().collect());

        Ok(Self {
            filenames,
            formats: precondition.formats.iter().copied().collect(),
            field_count: precondition.field_count,
            field_set,
            fields: precondition.fields.iter().cloned().collect(),
        })
    }

    /// Whether no constraint is populated
    pub fn is_catch_all(&self) -> bool {
        self.filenames.is_empty()
            && self.formats.is_empty()
            && self.field_count.is_none()
            && self.field_set.is_none()
            && self.fields.is_empty()
    }

    /// Whether every populated constraint holds for `source`
    pub fn matches(&self, source: &SourceDescriptor) -> bool {
        self.matches_filename(source.filename.as_deref())
            && self.matches_format(source.format)
            && self.matches_header(source.header_fields.as_deref())
    }

    fn matches_filename(&self, filename: Option<&str>) -> bool {
        if self.filenames.is_empty() {
            return true;
        }
        let Some(filename) = filename else {
            return false;
        };
        let base = Path::new(filename)
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or(filename);
        self.filenames
            .iter()
            .any(|pattern| pattern.matches(filename) || pattern.matches(base))
    }

    fn matches_format(&self, format: Option<FileFormat>) -> bool {
        if self.formats.is_empty() {
            return true;
        }
        format.is_some_and(|format| self.formats.contains(&format))
    }

    fn matches_header(&self, header: Option<&[String]>) -> bool {
        let constrained =
            self.field_count.is_some() || self.field_set.is_some() || !self.fields.is_empty();
        if !constrained {
            return true;
        }
        let Some(header) = header else {
            return false;
        };

        if self.field_count.is_some_and(|count| header.len() != count) {
            return false;
        }

        let present: BTreeSet<&str> = header.iter().map(String::as_str).collect();

        if let Some(field_set) = &self.field_set {
            let expected: BTreeSet<&str> = field_set.iter().map(String::as_str).collect();
            if present != expected {
                return false;
            }
        }

        self.fields.iter().all(|field| present.contains(field.as_str()))
    }
}
