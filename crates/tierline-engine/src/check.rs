//! Consistency checks over a dictionary and metric catalog
//!
//! Every finding becomes a [`Diagnostic`]; nothing is repaired here.

use tierline_core::{
    Diagnostic, DiagnosticCode, Location, MetricCatalog, Report, SchemaDictionary, Severity, SeverityThreshold,
    ValidationError,
};
use tierline_lineage::{is_allowed, parse_narrative, NarrativeContext};
use tierline_schema::{DependencyGraph, ViolationKind};

/// Referential integrity, derivation cycles and empty tables
pub fn check_dictionary(dictionary: &SchemaDictionary) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let graph = DependencyGraph::from_dictionary(dictionary);

    for violation in graph.validate_referential_integrity() {
        let rel = &violation.relationship;
        let (code, message) = match violation.kind {
            ViolationKind::MissingTable => (
                DiagnosticCode::IntegrityMissingTable,
                format!("Relationship {} targets table '{}.{}', which does not exist", rel.describe(), rel.to_layer, rel.to_table),
            ),
            ViolationKind::MissingField => (
                DiagnosticCode::IntegrityMissingField,
                format!(
                    "Relationship {} targets field '{}' missing from '{}.{}'",
                    rel.describe(),
                    rel.to_field,
                    rel.to_layer,
                    rel.to_table
                ),
            ),
        };

        diagnostics.push(
            Diagnostic::new(code, Severity::Error, message)
                .with_location(Location::field(rel.from_layer, rel.from_table.clone(), rel.from_field.clone()))
                .with_impact(vec![rel.from_table.clone()]),
        );
    }

    if let Some(path) = dictionary.derivation().find_cycle() {
        diagnostics.push(
            Diagnostic::new(
                DiagnosticCode::DerivationCycle,
                Severity::Error,
                format!("Derivation DAG contains a cycle: {}", path.join(" -> ")),
            )
            .with_impact(path),
        );
    }

    for table in dictionary.tables().iter().filter(|t| t.fields().is_empty()) {
        diagnostics.push(
            Diagnostic::new(
                DiagnosticCode::DdlEmptyTable,
                Severity::Info,
                format!("Table '{}' has no fields; no CREATE TABLE will be generated", table.qualified_name()),
            )
            .with_location(Location::table(table.layer(), table.name())),
        );
    }

    diagnostics
}

/// Cross-checks between metrics and the dictionary
///
/// Metrics in a catalog are already structurally valid; this looks at how
/// they line up with the schema and their own dimension contracts.
pub fn check_metrics(catalog: &MetricCatalog, dictionary: Option<&SchemaDictionary>) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    for metric in catalog.metrics() {
        if let Some(dictionary) = dictionary {
            for source in metric.source_fields() {
                if dictionary.resolve(source.layer(), source.table(), source.field()).is_none() {
                    diagnostics.push(
                        Diagnostic::new(
                            DiagnosticCode::MetricUnresolvedSourceField,
                            Severity::Warn,
                            format!(
                                "Metric '{}' reads {}.{}.{}, which is not in the dictionary",
                                metric.id(),
                                source.layer(),
                                source.table(),
                                source.field()
                            ),
                        )
                        .with_location(Location::metric(metric.id())),
                    );
                }
            }
        }

        for (dimension, narrative) in metric.lineage_by_dimension() {
            if !is_allowed(metric, *dimension) {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticCode::MetricNarrativeOutsideAllowed,
                        Severity::Warn,
                        format!(
                            "Metric '{}' documents lineage for {}, which is not an allowed dimension",
                            metric.id(),
                            dimension
                        ),
                    )
                    .with_location(Location::metric(metric.id())),
                );
            }

            let context = NarrativeContext {
                source_fields: metric.source_fields(),
                formula_sql: metric.formula_sql(),
            };
            for segment in parse_narrative(narrative, &context).skipped_segments {
                diagnostics.push(
                    Diagnostic::new(
                        DiagnosticCode::LineageUnknownTag,
                        Severity::Info,
                        format!("Skipped narrative segment for {} at {}", metric.id(), dimension),
                    )
                    .with_location(Location::metric(metric.id()))
                    .with_comparison("[SOURCE] | [TRANSFORM] | [OUTPUT]", segment),
                );
            }
        }
    }

    diagnostics
}

/// Diagnostic for a metric validation failure
pub fn validation_diagnostic(metric_id: &str, error: &ValidationError) -> Diagnostic {
    let code = match error {
        ValidationError::EmptyName { .. } | ValidationError::EmptyId => DiagnosticCode::MetricMissingName,
        ValidationError::EmptyFormula { .. } => DiagnosticCode::MetricMissingFormula,
        ValidationError::NoSourceFields { .. } | ValidationError::IncompleteSourceField(_) => {
            DiagnosticCode::MetricMissingSourceFields
        }
        ValidationError::InvalidSourceLayer { .. } | ValidationError::UnknownLayer(_) => {
            DiagnosticCode::MetricInvalidSourceLayer
        }
        ValidationError::ReservedId(_) => DiagnosticCode::MetricReservedId,
        ValidationError::OverrideOutsideAllowed { .. } => DiagnosticCode::MetricOverrideOutsideAllowed,
        ValidationError::UnknownDimension(_) => DiagnosticCode::MetricUnknownDimension,
        ValidationError::DuplicateImportId(_) => DiagnosticCode::ImportDuplicateId,
        _ => DiagnosticCode::Warning,
    };

    Diagnostic::new(code, Severity::Error, error.to_string()).with_location(Location::metric(metric_id))
}

/// Full check report for a dictionary and catalog
pub fn build_report(
    dictionary: &SchemaDictionary,
    catalog: &MetricCatalog,
    thresholds: &SeverityThreshold,
) -> Report {
    let mut diagnostics = check_dictionary(dictionary);
    diagnostics.extend(check_metrics(catalog, Some(dictionary)));

    let mut report = Report::from_diagnostics(diagnostics);
    report.summary.tables_checked = dictionary.tables().len();
    report.summary.relationships_checked = dictionary.relationships().len();
    report.summary.metrics_checked = catalog.len();
    report.apply_thresholds(thresholds);

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use tierline_core::{Dimension, Field, Layer, MetricBuilder, Relationship, SourceField, Table};

    fn dictionary() -> SchemaDictionary {
        let mut dict = SchemaDictionary::new();
        dict.add_table(Table::new("facility", Layer::L1, "ref", vec![Field::new("facility_id")]).unwrap())
            .unwrap();
        dict.add_table(
            Table::new(
                "facility_exposure_snapshot",
                Layer::L2,
                "exposure",
                vec![Field::new("facility_id"), Field::new("drawn_amount")],
            )
            .unwrap(),
        )
        .unwrap();
        dict.add_relationship(Relationship::new(
            (Layer::L2, "facility_exposure_snapshot", "facility_id"),
            (Layer::L1, "facility", "facility_id"),
        ))
        .unwrap();
        dict
    }

    #[test]
    fn clean_dictionary_has_no_findings() {
        assert!(check_dictionary(&dictionary()).is_empty());
    }

    #[test]
    fn dangling_relationship_and_empty_table_reported() {
        let mut dict = dictionary();
        dict.remove_table("facility").unwrap();
        dict.add_table(Table::new("placeholder", Layer::L3, "derived", vec![]).unwrap()).unwrap();

        let diagnostics = check_dictionary(&dict);
        let codes: Vec<DiagnosticCode> = diagnostics.iter().map(|d| d.code).collect();
        assert_eq!(codes, vec![DiagnosticCode::IntegrityMissingTable, DiagnosticCode::DdlEmptyTable]);
        assert_eq!(diagnostics[0].impact, vec!["facility_exposure_snapshot".to_string()]);
    }

    #[test]
    fn metric_cross_checks() {
        let metric = MetricBuilder::new("EXP-001", "Drawn")
            .formula("SUM(drawn_amount)")
            .source_field(SourceField::new(Layer::L2, "facility_exposure_snapshot", "drawn_amount").unwrap())
            .source_field(SourceField::new(Layer::L2, "facility_exposure_snapshot", "undrawn_amount").unwrap())
            .allowed_dimensions([Dimension::Facility])
            .lineage_at(Dimension::Lob, "[NOTE] todo")
            .build()
            .unwrap();
        let mut catalog = MetricCatalog::new();
        catalog.upsert(metric).unwrap();

        let diagnostics = check_metrics(&catalog, Some(&dictionary()));
        let codes: Vec<DiagnosticCode> = diagnostics.iter().map(|d| d.code).collect();
        assert_eq!(
            codes,
            vec![
                DiagnosticCode::MetricUnresolvedSourceField,
                DiagnosticCode::MetricNarrativeOutsideAllowed,
                DiagnosticCode::LineageUnknownTag,
            ]
        );
    }

    #[test]
    fn report_counts_and_thresholds() {
        let mut thresholds = SeverityThreshold::default();
        thresholds.set_override(DiagnosticCode::DdlEmptyTable, Severity::Warn);

        let mut dict = dictionary();
        dict.add_table(Table::new("placeholder", Layer::L3, "derived", vec![]).unwrap()).unwrap();

        let report = build_report(&dict, &MetricCatalog::new(), &thresholds);
        assert_eq!(report.summary.tables_checked, 3);
        assert_eq!(report.summary.relationships_checked, 1);
        assert_eq!(report.summary.warnings, 1);
        assert!(!report.has_errors());
    }
}
