//! Import jobs and their reports

use serde::Serialize;
use std::fmt;

use intake_assembler::{StorageHandle, Violation};
use intake_core::SourceDescriptor;
use intake_core::capabilities::RecordSource;

/// How a job picks its importer
#[derive(Debug, Clone)]
pub enum ImporterSelection {
    /// The importer registered under this name
    Named(String),

    /// Automatic resolution against a descriptor
    Describe(SourceDescriptor),

    /// Automatic resolution against the job's storage
    FromStorage,
}

/// Where a job reads records from
pub enum JobSource {
    /// The importer's configured source
    Configured,

    /// A storage selected from a provider
    Storage(StorageHandle),

    /// Records supplied by the caller
    Records(Box<dyn RecordSource>),
}

impl fmt::Debug for JobSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configured => f.write_str("Configured"),
            Self::Storage(handle) => f.debug_tuple("Storage").field(handle).finish(),
            Self::Records(_) => f.write_str("Records(..)"),
        }
    }
}

/// One import run
#[derive(Debug)]
pub struct ImportJob {
    /// Importer selection
    pub selection: ImporterSelection,

    /// Record source
    pub source: JobSource,
}

impl ImportJob {
    /// Run the importer `name` on its configured source
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            selection: ImporterSelection::Named(name.into()),
            source: JobSource::Configured,
        }
    }

    /// Run the importer resolved for `descriptor`
    pub fn resolved(descriptor: SourceDescriptor) -> Self {
        Self {
            selection: ImporterSelection::Describe(descriptor),
            source: JobSource::Configured,
        }
    }

    /// Import `storage` with the importer resolved from its description
    pub fn for_storage(storage: StorageHandle) -> Self {
        Self {
            selection: ImporterSelection::FromStorage,
            source: JobSource::Storage(storage),
        }
    }

    /// Read from `storage` instead of the configured source
    pub fn with_storage(mut self, storage: StorageHandle) -> Self {
        self.source = JobSource::Storage(storage);
        self
    }

    /// Read caller-supplied records instead of the configured source
    pub fn with_records(mut self, records: Box<dyn RecordSource>) -> Self {
        self.source = JobSource::Records(records);
        self
    }
}

/// A violation together with the row it was found in
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowViolation {
    /// Zero-based row of the source
    pub row: usize,

    /// The violation
    #[serde(flatten)]
    pub violation: Violation,
}

/// Counts and violations of one import run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    /// Importer that ran
    pub importer: String,

    /// Records read from the source
    pub read: usize,

    /// Records or objects written to the target
    pub written: usize,

    /// Records dropped by filters
    pub filtered: usize,

    /// Records that failed validation
    pub invalid: usize,

    /// Every violation, in row order
    pub violations: Vec<RowViolation>,
}

impl ImportReport {
    /// Empty report for `importer`
    pub fn new(importer: impl Into<String>) -> Self {
        Self {
            importer: importer.into(),
            ..Self::default()
        }
    }

    /// Record the violations of one rejected row
    pub fn reject(&mut self, row: usize, violations: Vec<Violation>) {
        self.invalid += 1;
        self.violations
            .extend(violations.into_iter().map(|violation| RowViolation { row, violation }));
    }

    /// Whether every record read was written or filtered
    pub fn is_clean(&self) -> bool {
        self.invalid == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_assembler::ArrayStore;
    use intake_assembler::array::ArraySource;
    use serde_json::json;

    #[test]
    fn test_named_job_reads_configured_source() {
        let job = ImportJob::named("customers");
        assert!(matches!(job.selection, ImporterSelection::Named(ref n) if n == "customers"));
        assert!(matches!(job.source, JobSource::Configured));
    }

    #[test]
    fn test_with_records_replaces_source() {
        let store = ArrayStore::new();
        let job = ImportJob::resolved(SourceDescriptor::new().with_header_fields(["a"]))
            .with_records(Box::new(ArraySource::new(store.buffer("rows"))));
        assert!(matches!(job.selection, ImporterSelection::Describe(_)));
        assert!(matches!(job.source, JobSource::Records(_)));
        assert!(format!("{job:?}").contains("Records(..)"));
    }

    #[test]
    fn test_report_reject_keeps_rows() {
        let mut report = ImportReport::new("customers");
        report.read = 3;
        report.reject(
            1,
            vec![
                Violation::field("email", "is not an email address"),
                Violation::field("name", "must not be blank"),
            ],
        );
        report.reject(2, vec![Violation::object("email is missing")]);

        assert_eq!(report.invalid, 2);
        assert!(!report.is_clean());
        let rows: Vec<_> = report.violations.iter().map(|v| v.row).collect();
        assert_eq!(rows, vec![1, 1, 2]);
    }

    #[test]
    fn test_report_serialization() {
        let mut report = ImportReport::new("customers");
        report.read = 2;
        report.written = 1;
        report.reject(0, vec![Violation::field("email", "must not be blank")]);

        let serialized = serde_json::to_value(&report).unwrap();
        assert_eq!(
            serialized,
            json!({
                "importer": "customers",
                "read": 2,
                "written": 1,
                "filtered": 0,
                "invalid": 1,
                "violations": [
                    {"row": 0, "field": "email", "message": "must not be blank"}
                ]
            })
        );
    }
}
