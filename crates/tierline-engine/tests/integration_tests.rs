//! Integration tests for the engine
//!
//! Exercise whole workflows over the fixture dictionary and catalog:
//! check, change + DDL, import, explain and persistence.

mod fixtures;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use tierline_core::{
    DdlConfig, Field, Layer, MetricRecord, ReferentialError, SeverityThreshold, SourceFieldRecord, ValidationError,
};
use tierline_engine::{
    apply_change, build_report, explain, import_metrics, DdlSink, DictionaryStore, DirectoryDdlSink, EngineError,
    ExplainRequest, ImportSource, JsonDictionaryStore, MetricSheetRow, QualityStatus, SchemaChange, SinkStatus,
    SourceFieldSheetRow, TabularExtract,
};
use tierline_lineage::StepType;
use tierline_schema::DdlGenerator;

// =============================================================================
// Check
// =============================================================================

#[test]
fn fixture_dictionary_and_catalog_are_consistent() {
    let report = build_report(&fixtures::dictionary(), &fixtures::catalog(), &SeverityThreshold::default());

    assert_eq!(report.summary.total, 0, "{:#?}", report.diagnostics);
    assert_eq!(report.summary.tables_checked, 7);
    assert_eq!(report.summary.relationships_checked, 5);
    assert_eq!(report.summary.metrics_checked, 1);
}

// =============================================================================
// DDL and schema changes
// =============================================================================

#[test]
fn layer_ddl_carries_composite_keys_and_foreign_keys() {
    let bundle = DdlGenerator::new(DdlConfig::default()).generate(&fixtures::dictionary());
    let l2 = bundle.layer(Layer::L2).unwrap();

    assert!(l2.sql.starts_with("-- L2 tables\nCREATE SCHEMA IF NOT EXISTS l2;\n"));
    assert!(l2.sql.contains("    as_of_date DATE NOT NULL,\n"));
    assert!(l2.sql.contains("    PRIMARY KEY (facility_id, as_of_date)\n"));
    assert!(l2.sql.contains(
        "ALTER TABLE l2.facility_risk_snapshot ADD CONSTRAINT fk_facility_risk_snapshot_facility_id \
         FOREIGN KEY (facility_id) REFERENCES l1.facility (facility_id);\n"
    ));
    assert!(l2.empty_tables.is_empty());
}

#[test]
fn removing_referenced_table_is_refused() {
    let dictionary = fixtures::dictionary();
    let err = apply_change(
        &dictionary,
        SchemaChange::RemoveTables(vec!["desk".into()]),
        &DdlGenerator::default(),
    )
    .unwrap_err();

    match err {
        EngineError::Referential(ReferentialError::DependentsOutsideBatch { dependents, .. }) => {
            assert_eq!(dependents, vec!["desk_exposure_summary".to_string(), "facility".to_string()]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(dictionary.table("desk").is_some());
}

#[test]
fn removing_derived_tables_together_drops_consumers_first() {
    let (next, outcome) = apply_change(
        &fixtures::dictionary(),
        SchemaChange::RemoveTables(vec!["desk_exposure_summary".into(), "desk_utilization".into()]),
        &DdlGenerator::default(),
    )
    .unwrap();

    assert_eq!(
        outcome.statements,
        "DROP TABLE IF EXISTS l3.desk_utilization;\nDROP TABLE IF EXISTS l3.desk_exposure_summary;\n"
    );
    assert_eq!(next.tables_in(Layer::L3).count(), 0);
    assert!(next.derivation().is_empty());
    assert_eq!(next.relationships().len(), 4);
}

// =============================================================================
// Import
// =============================================================================

#[test]
fn rejected_rows_never_reach_the_catalog() {
    let catalog = fixtures::catalog();
    let row = |id: &str, formula: &str| MetricSheetRow {
        id: id.into(),
        name: format!("Metric {}", id),
        formula: formula.into(),
        ..Default::default()
    };
    let field = |metric_id: &str, layer: &str| SourceFieldSheetRow {
        metric_id: metric_id.into(),
        layer: layer.into(),
        table: "facility_exposure_snapshot".into(),
        field: "drawn_amount".into(),
        ..Default::default()
    };

    let extract = TabularExtract {
        metrics: vec![
            row("CUS-001", "SUM(drawn_amount)"),
            row("CUS-002", ""),
            row("CUS-003", "SUM(drawn_amount)"),
            row("EXP-WAVG-PD", "0"),
            row("CUS-005", "SUM(drawn_amount)"),
            row("", "SUM(drawn_amount)"),
        ],
        source_fields: vec![
            field("CUS-001", "L2"),
            field("CUS-002", "L2"),
            field("CUS-003", "L3"),
            field("EXP-WAVG-PD", "L2"),
            field("CUS-005", "L1"),
        ],
    };

    let (next, outcome) = import_metrics(&catalog, ImportSource::Tabular(extract));

    assert_eq!(outcome.created, vec!["CUS-001".to_string(), "CUS-005".to_string()]);
    assert_eq!(outcome.rejected.len(), 4);
    for rejection in &outcome.rejected {
        assert!(!rejection.errors.is_empty());
        if !rejection.id.is_empty() && rejection.id != "EXP-WAVG-PD" {
            assert!(next.get(&rejection.id).is_none(), "{} leaked into the catalog", rejection.id);
        }
    }
    assert_eq!(next.len(), catalog.len() + outcome.accepted());
    assert_eq!(next.get("EXP-WAVG-PD").unwrap().formula(), "SUM(pd * ead) / SUM(ead)");
    assert!(outcome.rejected[2].errors.contains(&ValidationError::ReservedId("EXP-WAVG-PD".into())));
}

#[test]
fn structured_import_updates_existing_custom_metric() {
    let record = |name: &str| MetricRecord {
        id: "CUS-001".into(),
        name: name.into(),
        formula: "SUM(drawn_amount)".into(),
        source_fields: vec![SourceFieldRecord {
            layer: "L2".into(),
            table: "facility_exposure_snapshot".into(),
            field: "drawn_amount".into(),
            description: None,
            sample_value: None,
        }],
        ..Default::default()
    };

    let (first, _) = import_metrics(&fixtures::catalog(), ImportSource::Records(vec![record("Drawn").into()]));
    let (second, outcome) = import_metrics(&first, ImportSource::Records(vec![record("Drawn (v2)").into()]));

    assert_eq!(outcome.updated, vec!["CUS-001".to_string()]);
    assert_eq!(second.get("CUS-001").unwrap().name(), "Drawn (v2)");
    assert_eq!(second.custom_metrics().len(), 1);
}

// =============================================================================
// Explain
// =============================================================================

#[test]
fn explain_desk_value_through_layer_alias() {
    let request = ExplainRequest {
        metric_id: "EXP-WAVG-PD".into(),
        dimension: "L3".into(),
    };
    let response = explain(&fixtures::catalog(), &request, QualityStatus::Green).unwrap();

    assert_eq!(response.identity.display_name, "Desk Weighted PD");

    let facility = response.lineage.dependency_tier().unwrap();
    assert_eq!(facility.steps.len(), 4);
    assert_eq!(facility.steps[0].step_type, StepType::Hybrid);

    let desk = response.lineage.current_tier().unwrap();
    assert_eq!(desk.steps.len(), 3);
    assert_eq!(desk.steps[0].table.as_deref(), Some("desk"));

    let json = serde_json::to_value(&response).unwrap();
    assert_eq!(json["dimension"], "desk");
    assert_eq!(json["quality"], "GREEN");
    assert_eq!(json["identity"]["displayName"], "Desk Weighted PD");
    assert_eq!(json["formula"]["origin"], "base");
}

#[test]
fn explain_rejects_disallowed_dimension() {
    let request = ExplainRequest {
        metric_id: "EXP-WAVG-PD".into(),
        dimension: "L1".into(),
    };
    let err = explain(&fixtures::catalog(), &request, QualityStatus::Green).unwrap_err();

    assert!(matches!(
        err,
        EngineError::Validation(ValidationError::UnsupportedDimension { .. })
    ));
    assert!(!err.is_environment());
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn change_rewrites_only_the_affected_layer_file() {
    let temp = TempDir::new().unwrap();
    let store = JsonDictionaryStore::new(temp.path().join("dictionary.json"));
    let sink = DirectoryDdlSink::new(temp.path().join("ddl"));
    let generator = DdlGenerator::default();

    store.save(&fixtures::dictionary()).unwrap();
    let dictionary = store.load().unwrap().unwrap();
    for layer in generator.generate(&dictionary).layers {
        assert_eq!(sink.apply(&layer).unwrap(), SinkStatus::Written);
    }

    let (next, outcome) = apply_change(
        &dictionary,
        SchemaChange::AddField {
            table: "facility".into(),
            field: Field::new("portfolio_id"),
        },
        &generator,
    )
    .unwrap();
    assert_eq!(
        outcome.statements,
        "ALTER TABLE l1.facility ADD COLUMN IF NOT EXISTS portfolio_id VARCHAR(64);\n"
    );
    assert_eq!(
        outcome.impacted_tables,
        vec!["facility_exposure_snapshot".to_string(), "facility_risk_snapshot".to_string()]
    );
    store.save(&next).unwrap();

    let statuses: Vec<SinkStatus> = generator
        .generate(&store.load().unwrap().unwrap())
        .layers
        .iter()
        .map(|layer| sink.apply(layer).unwrap())
        .collect();
    assert_eq!(statuses, vec![SinkStatus::Written, SinkStatus::Unchanged, SinkStatus::Unchanged]);
}
