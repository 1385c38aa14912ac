//! Integration tests for pipeline assembly
//!
//! Importers are loaded from YAML documents, assembled against the in-memory
//! capabilities of `intake_assembler::testing` and driven record by record.

use serde_json::{Value, json};
use std::sync::Arc;
use tempfile::TempDir;

use intake_assembler::testing::{
    CsvDiscovery, CsvFormats, FieldEquals, MapExpressions, MemoryServices, NamedConverters,
    NamedFilters, PlainObjects, RuleValidator,
};
use intake_assembler::{
    ArrayStore, Error, Outcome, Pipeline, PipelineAssembler, Services, StageKind,
    StorageProviderRegistry,
};
use intake_core::{EngineConfig, ImporterRegistry};

fn load(yaml: &str) -> EngineConfig {
    let document: Value = serde_yaml::from_str(yaml).unwrap();
    EngineConfig::from_document(&document).unwrap()
}

fn services(arrays: &ArrayStore) -> Services {
    Services::new()
        .with_arrays(arrays.clone())
        .with_service_locator(Arc::new(MemoryServices::new(arrays.clone())))
        .with_format_factory(Arc::new(CsvFormats))
        .with_format_discovery(Arc::new(CsvDiscovery))
        .with_converters(Arc::new(NamedConverters::standard()))
        .with_validator(Arc::new(
            RuleValidator::default().with_object_rule("Customer", "email", "email"),
        ))
        .with_object_factories(Arc::new(PlainObjects::default().with_class("Customer")))
        .with_filters(Arc::new(NamedFilters::default().with(
            "active",
            Arc::new(FieldEquals::new("status", json!("active"))),
        )))
}

fn assemble(config: &EngineConfig, arrays: &ArrayStore, importer: &str) -> Pipeline {
    let importer = config
        .importers
        .iter()
        .find(|i| i.name == importer)
        .unwrap();
    PipelineAssembler::new(services(arrays))
        .assemble(importer)
        .unwrap()
}

/// Read every source record through the pipeline into the target
async fn drain(pipeline: &Pipeline) -> Vec<Outcome> {
    let mut source = pipeline.open_source().unwrap().unwrap();
    let mut target = pipeline.open_target().unwrap();
    let mut outcomes = Vec::new();
    let mut row = 0;
    while let Some(record) = source.next_record().await.unwrap() {
        let outcome = pipeline.process(record, row).unwrap();
        if let Outcome::Accepted(value) = &outcome {
            target.write(value.clone()).await.unwrap();
        }
        outcomes.push(outcome);
        row += 1;
    }
    target.flush().await.unwrap();
    outcomes
}

// =============================================================================
// Shorthand equivalence
// =============================================================================

#[test]
fn test_shorthand_and_canonical_forms_assemble_identically() {
    let arrays = ArrayStore::new();
    let shorthand = load(
        r#"
importers:
  customers:
    filter: active
    mapping:
      mail: email
      city:
        converter: upper
    validation:
      source:
        mail: email
    target: customer_writer
"#,
    );
    let canonical = load(
        r#"
importers:
  customers:
    filters: [active]
    mappings:
      mail:
        to: email
      city:
        converter: upper
    validation:
      source:
        constraints:
          mail: email
    target:
      type: callable
      callableRef: customer_writer
"#,
    );

    let left = assemble(&shorthand, &arrays, "customers").plan();
    let right = assemble(&canonical, &arrays, "customers").plan();
    assert_eq!(left, right);
    assert_eq!(left.target, "callable:customer_writer");
    assert_eq!(
        left.mappings,
        vec![
            ("mail".to_string(), "email".to_string(), None),
            ("city".to_string(), "city".to_string(), Some("upper".to_string())),
        ]
    );
}

// =============================================================================
// Record processing
// =============================================================================

const CUSTOMERS: &str = r#"
importers:
  customers:
    context: {batch: 7}
    filters: [active]
    mappings:
      mail: email
      city:
        converter: upper
    validation:
      options:
        allowExtraFields: true
      source:
        mail: not_blank
      target:
        email: email
    source:
      type: array
      uri: incoming
    target:
      type: array
      uri: imported
"#;

#[tokio::test]
async fn test_array_to_array_import() {
    let arrays = ArrayStore::new();
    arrays.fill(
        "incoming",
        [
            json!({"mail": "ann@example.com", "city": "oslo", "status": "active"}),
            json!({"mail": "", "city": "rome", "status": "active"}),
            json!({"mail": "bob@example.com", "city": "lima", "status": "closed"}),
            json!({"mail": "not-an-address", "city": "baku", "status": "active"}),
        ],
    );
    let config = load(CUSTOMERS);
    let pipeline = assemble(&config, &arrays, "customers");
    assert_eq!(
        pipeline.stages(),
        vec![
            StageKind::SourceReader,
            StageKind::Transformer,
            StageKind::Validator,
            StageKind::FilterChain,
            StageKind::TargetWriter,
        ]
    );
    assert_eq!(pipeline.context(), Some(&json!({"batch": 7})));

    let outcomes = drain(&pipeline).await;
    assert!(matches!(outcomes[0], Outcome::Accepted(_)));
    assert!(matches!(&outcomes[1], Outcome::Rejected(v) if v[0].field.as_deref() == Some("mail")));
    assert_eq!(outcomes[2], Outcome::Filtered);
    assert!(
        matches!(&outcomes[3], Outcome::Rejected(v) if v[0].field.as_deref() == Some("email"))
    );

    assert_eq!(
        arrays.records("imported"),
        vec![json!({"email": "ann@example.com", "city": "OSLO", "status": "active"})]
    );
}

#[tokio::test]
async fn test_object_factory_materializes_for_callable_targets() {
    let arrays = ArrayStore::new();
    arrays.fill(
        "people",
        [json!({"email": "ann@example.com"}), json!({"email": "nobody"})],
    );
    let config = load(
        r#"
importers:
  people:
    object_factory:
      class: Customer
    validation:
      target:
        email: not_blank
    source:
      type: array
      uri: people
    target: customer_writer
"#,
    );
    let pipeline = assemble(&config, &arrays, "people");
    let outcomes = drain(&pipeline).await;

    assert_eq!(
        outcomes[0],
        Outcome::Accepted(json!({"@class": "Customer", "email": "ann@example.com"}))
    );
    match &outcomes[1] {
        Outcome::Rejected(violations) => {
            assert_eq!(violations.len(), 1);
            assert_eq!(violations[0].field, None);
            assert_eq!(violations[0].message, "email is not an email address");
        }
        other => panic!("Expected Rejected, got {other:?}"),
    }

    assert_eq!(
        arrays.records("customer_writer"),
        vec![json!({"@class": "Customer", "email": "ann@example.com"})]
    );
}

#[tokio::test]
async fn test_unnamed_array_endpoints_use_importer_buffers() {
    let arrays = ArrayStore::new();
    arrays.fill("copy.source", [json!({"id": "1"})]);
    let config = load(
        r#"
importers:
  copy:
    source:
      type: array
    target:
      type: array
"#,
    );
    let pipeline = assemble(&config, &arrays, "copy");
    drain(&pipeline).await;
    assert_eq!(arrays.records("copy.target"), vec![json!({"id": "1"})]);
}

#[test]
fn test_assembly_leaves_array_store_untouched() {
    let arrays = ArrayStore::new();
    let config = load(CUSTOMERS);
    let pipeline = assemble(&config, &arrays, "customers");
    assert_eq!(pipeline.source().unwrap().label(), "array:incoming");
    assert!(arrays.names().is_empty(), "Expected no buffers, got {arrays:?}");
}

#[tokio::test]
async fn test_empty_validation_section_needs_no_validator() {
    let arrays = ArrayStore::new();
    arrays.fill("loose", [json!({"anything": ""})]);
    let config = load(
        r#"
importers:
  loose:
    validation: {}
    source:
      type: array
      uri: loose
    target: sink
"#,
    );
    let services = Services::new()
        .with_arrays(arrays.clone())
        .with_service_locator(Arc::new(MemoryServices::new(arrays.clone())));
    let pipeline = PipelineAssembler::new(services)
        .assemble(&config.importers[0])
        .unwrap();
    assert_eq!(
        pipeline.stages(),
        vec![StageKind::SourceReader, StageKind::TargetWriter]
    );

    drain(&pipeline).await;
    assert_eq!(arrays.records("sink"), vec![json!({"anything": ""})]);
}

// =============================================================================
// Files
// =============================================================================

#[tokio::test]
async fn test_file_source_with_deferred_uri() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("orders.csv");
    std::fs::write(&input, "id;total\n1;10\n2;25\n").unwrap();
    let output = dir.path().join("out.csv");

    let config = load(&format!(
        r#"
importers:
  orders:
    mappings:
      total:
        converter: int
    source:
      type: file
      uri: "@=upload_path"
      format:
        type: csv
        arguments: [";"]
    target:
      type: file
      uri: "{}"
      format: csv
"#,
        output.display()
    ));
    let arrays = ArrayStore::new();
    let importer = &config.importers[0];
    let services = services(&arrays).with_expressions(Arc::new(
        MapExpressions::default().with("upload_path", input.display().to_string()),
    ));
    let pipeline = PipelineAssembler::new(services).assemble(importer).unwrap();
    assert_eq!(pipeline.source().unwrap().label(), "file:@=upload_path");

    let outcomes = drain(&pipeline).await;
    assert_eq!(
        outcomes,
        vec![
            Outcome::Accepted(json!({"id": "1", "total": 10})),
            Outcome::Accepted(json!({"id": "2", "total": 25})),
        ]
    );
    assert_eq!(
        std::fs::read_to_string(&output).unwrap(),
        "id,total\n1,10\n2,25\n"
    );
}

#[test]
fn test_deferred_uri_without_evaluator_fails_at_assembly() {
    let config = load(
        r#"
importers:
  orders:
    source:
      type: file
      uri: "@=upload_path"
      format: csv
    target: sink
"#,
    );
    let arrays = ArrayStore::new();
    let result = PipelineAssembler::new(services(&arrays)).assemble(&config.importers[0]);
    assert!(matches!(
        result,
        Err(Error::MissingCapability {
            capability: "expression evaluator",
            ..
        })
    ));
}

#[test]
fn test_unknown_codec_fails_at_assembly() {
    let config = load(
        r#"
importers:
  orders:
    source:
      type: file
      uri: /tmp/orders.xlsx
      format: xlsx
    target: sink
"#,
    );
    let arrays = ArrayStore::new();
    let result = PipelineAssembler::new(services(&arrays)).assemble(&config.importers[0]);
    assert!(result.is_err(), "Expected codec error, got {result:?}");
}

// =============================================================================
// Providers and resolution together
// =============================================================================

#[tokio::test]
async fn test_directory_provider_selects_importer_by_header() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("customers.csv"),
        "email,name,city\nann@example.com,Ann,Oslo\n",
    )
    .unwrap();
    std::fs::write(dir.path().join("orders.csv"), "id,total\n1,10\n").unwrap();

    let config = load(&format!(
        r#"
storageprovider:
  inbox:
    type: directory
    uri: "{}"
importers:
  customers:
    preconditions:
      format: csv
      fields: [email]
    target:
      type: array
      uri: customers
  orders:
    preconditions:
      fieldset: [id, total]
    target:
      type: array
      uri: orders
"#,
        dir.path().display()
    ));
    let arrays = ArrayStore::new();
    let mut providers = StorageProviderRegistry::new(services(&arrays));
    providers.populate(&config).unwrap();
    let importers = ImporterRegistry::from_config(&config).unwrap();
    let assembler = PipelineAssembler::new(services(&arrays));

    let inbox = providers.resolve("inbox").unwrap();
    let storages = inbox.storages().unwrap();
    assert_eq!(storages.len(), 2);

    for storage in &storages {
        let importer = importers.resolve(&storage.describe().unwrap()).unwrap();
        let pipeline = assembler.assemble(importer).unwrap();
        let mut source = storage.open().unwrap();
        let mut target = pipeline.open_target().unwrap();
        let mut row = 0;
        while let Some(record) = source.next_record().await.unwrap() {
            if let Outcome::Accepted(value) = pipeline.process(record, row).unwrap() {
                target.write(value).await.unwrap();
            }
            row += 1;
        }
        target.flush().await.unwrap();
    }

    assert_eq!(
        arrays.records("customers"),
        vec![json!({"email": "ann@example.com", "name": "Ann", "city": "Oslo"})]
    );
    assert_eq!(arrays.records("orders"), vec![json!({"id": "1", "total": "10"})]);
}

#[tokio::test]
async fn test_quoted_header_counts_as_one_field() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("people.csv"),
        "\"last, first\",email,city\n\"Doe, Ann\",ann@example.com,Oslo\n",
    )
    .unwrap();

    let config = load(&format!(
        r#"
storageprovider:
  inbox:
    type: directory
    uri: "{}"
importers:
  wide:
    preconditions:
      fieldcount: 4
    target: wide
  people:
    preconditions:
      fieldcount: 3
      fieldset: ["last, first", email, city]
    target:
      type: array
      uri: people
"#,
        dir.path().display()
    ));
    let arrays = ArrayStore::new();
    let mut providers = StorageProviderRegistry::new(services(&arrays));
    providers.populate(&config).unwrap();
    let importers = ImporterRegistry::from_config(&config).unwrap();

    let storage = providers.resolve("inbox").unwrap().storages().unwrap().remove(0);
    let importer = importers.resolve(&storage.describe().unwrap()).unwrap();
    assert_eq!(importer.name, "people");

    let pipeline = assemble(&config, &arrays, "people");
    let mut source = storage.open().unwrap();
    let mut target = pipeline.open_target().unwrap();
    while let Some(record) = source.next_record().await.unwrap() {
        if let Outcome::Accepted(value) = pipeline.process(record, 0).unwrap() {
            target.write(value).await.unwrap();
        }
    }
    target.flush().await.unwrap();
    assert_eq!(
        arrays.records("people"),
        vec![json!({"last, first": "Doe, Ann", "email": "ann@example.com", "city": "Oslo"})]
    );
}
