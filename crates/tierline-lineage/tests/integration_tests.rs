//! Integration tests for narrative parsing and cross-tier resolution

use pretty_assertions::assert_eq;
use tierline_core::{Dimension, Layer, Metric};
use tierline_lineage::{
    parse_narrative, resolve_cross_tier, resolve_formula, tier_inputs, NarrativeContext, StepTag, StepType,
};

fn metric() -> Metric {
    serde_json::from_str(
        r#"{
            "id": "EXP-WAVG-PD",
            "name": "Exposure-Weighted PD",
            "page": "Risk",
            "section": "Credit Quality",
            "metricType": "Ratio",
            "formula": "SUM(pd * ead) / SUM(ead)",
            "formulaSQL": "SELECT (SELECT SUM(r.pd * s.ead) FROM l2.facility_risk_snapshot r) / NULLIF(SUM(s.ead), 0) FROM l2.facility_exposure_snapshot s",
            "sourceFields": [
                {"layer": "L2", "table": "facility_risk_snapshot", "field": "pd", "description": "Probability of default", "sampleValue": "0.0125"},
                {"layer": "L2", "table": "facility_exposure_snapshot", "field": "ead"}
            ],
            "allowedDimensions": ["facility", "counterparty", "L3"],
            "formulasByDimension": {
                "counterparty": {"formula": "SUM(facility_pd * facility_ead) / SUM(facility_ead)"}
            },
            "lineageByDimension": {
                "facility": "[SOURCE] L2.facility_risk_snapshot.pd → Join: facility_id | [SOURCE] L2.facility_exposure_snapshot.ead | [TRANSFORM] Facility PD × EAD → Formula: pd * ead | [OUTPUT] Facility weighted PD",
                "counterparty": "[SOURCE] L2.facility_exposure_snapshot.ead | [SOURCE] L1.counterparty.counterparty_id | [TRANSFORM] Exposure-weighted average → Grouping: counterparty_id → Zero guard: SUM(ead) > 0 | [OUTPUT] Counterparty weighted PD"
            }
        }"#,
    )
    .unwrap()
}

#[test]
fn narrative_round_trip_preserves_order_tags_and_coordinates() {
    let segments = [
        (StepTag::Source, "L1", "facility", "facility_id"),
        (StepTag::Source, "L2", "facility_exposure_snapshot", "drawn_amount"),
        (StepTag::Transform, "", "", ""),
        (StepTag::Source, "L2", "collateral_snapshot", "collateral_value"),
        (StepTag::Output, "", "", ""),
    ];

    let narrative = segments
        .iter()
        .enumerate()
        .map(|(i, (tag, layer, table, field))| match tag {
            StepTag::Source => format!("[SOURCE] {}.{}.{}", layer, table, field),
            StepTag::Transform => format!("[TRANSFORM] step {}", i),
            StepTag::Output => format!("[OUTPUT] result {}", i),
        })
        .collect::<Vec<_>>()
        .join(" | ");

    let parsed = parse_narrative(&narrative, &NarrativeContext::default());
    assert_eq!(parsed.steps.len(), segments.len());

    for (step, (tag, layer, table, field)) in parsed.steps.iter().zip(segments.iter()) {
        assert_eq!(step.tag, *tag);
        if *tag == StepTag::Source {
            let expected_layer = Layer::from_tag(layer).unwrap();
            assert_eq!(step.coordinates(), Some((expected_layer, *table, *field)));
        }
    }
}

#[test]
fn counterparty_lineage_stitches_facility_tier() {
    let metric = metric();
    let inputs = tier_inputs(&metric);
    let lineage = resolve_cross_tier(metric.id(), Dimension::Counterparty, &inputs);

    let facility = lineage.dependency_tier().unwrap();
    assert_eq!(facility.steps.len(), 4);
    assert_eq!(facility.steps[0].step_type, StepType::Hybrid);
    assert_eq!(facility.steps[0].sample_value.as_deref(), Some("0.0125"));
    assert_eq!(facility.steps[0].description.as_deref(), Some("Probability of default"));

    let current = lineage.current_tier().unwrap();
    let tags: Vec<StepTag> = current.steps.iter().map(|s| s.tag).collect();
    assert_eq!(tags, vec![StepTag::Source, StepTag::Transform, StepTag::Output]);
    assert_eq!(current.steps[0].table.as_deref(), Some("counterparty"));
    assert_eq!(
        current.rollup_logic.as_deref(),
        Some("SUM(facility_pd * facility_ead) / SUM(facility_ead)")
    );

    let tables: Vec<&str> = lineage.all_source_tables.iter().map(|t| t.table.as_str()).collect();
    assert_eq!(tables, vec!["facility_risk_snapshot", "facility_exposure_snapshot", "counterparty"]);
}

#[test]
fn desk_alias_resolves_and_lob_is_rejected() {
    let metric = metric();
    let desk = Dimension::from_tag("L3").unwrap();

    let formula = resolve_formula(&metric, desk).unwrap();
    assert_eq!(formula.formula, "SUM(pd * ead) / SUM(ead)");

    assert!(resolve_formula(&metric, Dimension::Lob).is_err());

    let lineage = resolve_cross_tier(metric.id(), desk, &tier_inputs(&metric));
    assert!(!lineage.current_tier().unwrap().is_documented());
    assert!(lineage.dependency_tier().is_some());
}

#[test]
fn lineage_serializes_with_camel_case_keys() {
    let metric = metric();
    let lineage = resolve_cross_tier(metric.id(), Dimension::Counterparty, &tier_inputs(&metric));
    let json = serde_json::to_value(&lineage).unwrap();

    assert_eq!(json["dimension"], "counterparty");
    assert_eq!(json["tiers"][0]["isDependencyTier"], true);
    assert_eq!(json["tiers"][1]["isCurrentTier"], true);
    assert_eq!(json["tiers"][0]["steps"][0]["type"], "HYBRID");
    assert!(json["allSourceTables"].is_array());
}
