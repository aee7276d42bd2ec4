//! Test fixtures for engine integration tests
//!
//! A small credit-risk dictionary (reference data, exposure snapshots and one
//! derived desk table) plus a metric catalog that reads from it.

use tierline_core::{MetricCatalog, MetricRecord, SchemaDictionary};

/// Dictionary document as a store would hold it
pub const DICTIONARY_JSON: &str = r#"{
    "L1": [
        {
            "name": "counterparty",
            "category": "reference",
            "fields": [
                {"name": "counterparty_id", "pk_fk": {"is_pk": true}},
                {"name": "counterparty_name"},
                {"name": "rating_code"}
            ]
        },
        {
            "name": "facility",
            "category": "reference",
            "fields": [
                {"name": "facility_id", "pk_fk": {"is_pk": true}},
                {"name": "counterparty_id"},
                {"name": "desk_id"}
            ]
        },
        {
            "name": "desk",
            "category": "reference",
            "fields": [
                {"name": "desk_id", "pk_fk": {"is_pk": true}},
                {"name": "desk_name"}
            ]
        }
    ],
    "L2": [
        {
            "name": "facility_exposure_snapshot",
            "category": "exposure",
            "fields": [
                {"name": "facility_id", "pk_fk": {"is_pk": true}},
                {"name": "as_of_date", "data_type": "DATE", "pk_fk": {"is_pk": true}},
                {"name": "drawn_amount"},
                {"name": "committed_amount"},
                {"name": "ead"}
            ]
        },
        {
            "name": "facility_risk_snapshot",
            "category": "risk",
            "fields": [
                {"name": "facility_id", "pk_fk": {"is_pk": true}},
                {"name": "as_of_date", "data_type": "DATE", "pk_fk": {"is_pk": true}},
                {"name": "pd", "data_type": "NUMERIC(10,6)"}
            ]
        }
    ],
    "L3": [
        {
            "name": "desk_exposure_summary",
            "category": "derived",
            "fields": [
                {"name": "desk_id", "pk_fk": {"is_pk": true}},
                {"name": "total_drawn_amount", "formula": "SUM(drawn_amount)", "source_fields": ["L2.facility_exposure_snapshot.drawn_amount"]}
            ]
        },
        {
            "name": "desk_utilization",
            "category": "derived",
            "fields": [
                {"name": "desk_id", "pk_fk": {"is_pk": true}},
                {"name": "utilization_pct"}
            ]
        }
    ],
    "relationships": [
        {"from_layer": "L1", "from_table": "facility", "from_field": "counterparty_id", "to_layer": "L1", "to_table": "counterparty", "to_field": "counterparty_id"},
        {"from_layer": "L1", "from_table": "facility", "from_field": "desk_id", "to_layer": "L1", "to_table": "desk", "to_field": "desk_id"},
        {"from_layer": "L2", "from_table": "facility_exposure_snapshot", "from_field": "facility_id", "to_layer": "L1", "to_table": "facility", "to_field": "facility_id"},
        {"from_layer": "L2", "from_table": "facility_risk_snapshot", "from_field": "facility_id", "to_layer": "L1", "to_table": "facility", "to_field": "facility_id"},
        {"from_layer": "L3", "from_table": "desk_exposure_summary", "from_field": "desk_id", "to_layer": "L1", "to_table": "desk", "to_field": "desk_id"}
    ],
    "derivation_dag": {
        "desk_utilization": ["desk_exposure_summary"]
    }
}"#;

pub fn dictionary() -> SchemaDictionary {
    serde_json::from_str(DICTIONARY_JSON).unwrap()
}

/// Built-in and custom metrics over the fixture dictionary
pub fn catalog() -> MetricCatalog {
    let builtins: Vec<MetricRecord> = serde_json::from_str(
        r#"[
            {
                "id": "EXP-WAVG-PD",
                "name": "Exposure-Weighted PD",
                "page": "Risk",
                "section": "Credit Quality",
                "metricType": "Ratio",
                "formula": "SUM(pd * ead) / SUM(ead)",
                "formulaSQL": "SELECT (SELECT SUM(r.pd * s.ead) FROM l2.facility_risk_snapshot r) / NULLIF(SUM(s.ead), 0) FROM l2.facility_exposure_snapshot s",
                "sourceFields": [
                    {"layer": "L2", "table": "facility_risk_snapshot", "field": "pd", "description": "Probability of default"},
                    {"layer": "L2", "table": "facility_exposure_snapshot", "field": "ead"}
                ],
                "allowedDimensions": ["facility", "counterparty", "desk"],
                "formulasByDimension": {
                    "counterparty": {"formula": "SUM(facility_pd * facility_ead) / SUM(facility_ead)"}
                },
                "displayNameByDimension": {"desk": "Desk Weighted PD"},
                "lineageByDimension": {
                    "facility": "[SOURCE] L2.facility_risk_snapshot.pd → Join: facility_id | [SOURCE] L2.facility_exposure_snapshot.ead | [TRANSFORM] PD × EAD → Formula: pd * ead | [OUTPUT] Facility weighted PD",
                    "desk": "[SOURCE] L1.desk.desk_id | [SOURCE] L2.facility_exposure_snapshot.ead | [TRANSFORM] Weighted average → Grouping: desk_id | [OUTPUT] Desk weighted PD"
                }
            }
        ]"#,
    )
    .unwrap();

    let builtins = builtins.into_iter().map(|r| r.try_into().unwrap()).collect();
    MetricCatalog::with_builtins(builtins)
}
