//! Metric import
//!
//! Two input shapes are accepted: structured metric records, or a tabular
//! extract of two sheets (metrics, and source fields keyed by metric id).
//! Every row is validated on its own. Valid rows are upserted; invalid rows
//! are reported with every problem found and never reach the catalog.

use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};

use tierline_core::{
    validate_record, Diagnostic, DiagnosticCode, Dimension, DimensionFormula, Location, Metric, MetricCatalog,
    MetricRecord, Severity, SourceFieldRecord, ValidationError,
};

use crate::check::validation_diagnostic;

/// A structured import row
///
/// Same shape as a stored metric record, but dimension tags stay plain
/// strings so an unknown tag rejects its own row instead of the document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricImportRow {
    pub id: String,
    pub name: String,
    pub page: String,
    pub section: String,
    pub metric_type: String,
    pub formula: String,
    #[serde(rename = "formulaSQL")]
    pub formula_sql: Option<String>,
    pub source_fields: Vec<SourceFieldRecord>,
    pub dimensions: Vec<String>,
    pub allowed_dimensions: Option<Vec<String>>,
    pub formulas_by_dimension: BTreeMap<String, DimensionFormula>,
    pub display_name_by_dimension: BTreeMap<String, String>,
    pub lineage_by_dimension: BTreeMap<String, String>,
    pub toggles: Vec<String>,
    pub notes: Option<String>,
}

fn translate(tag: &str, errors: &mut Vec<ValidationError>) -> Option<Dimension> {
    match Dimension::from_tag(tag) {
        Ok(dimension) => Some(dimension),
        Err(e) => {
            if !errors.contains(&e) {
                errors.push(e);
            }
            None
        }
    }
}

fn translate_keys<V>(map: BTreeMap<String, V>, errors: &mut Vec<ValidationError>) -> BTreeMap<Dimension, V> {
    map.into_iter()
        .filter_map(|(tag, value)| translate(&tag, errors).map(|d| (d, value)))
        .collect()
}

impl MetricImportRow {
    /// Translate dimension tags into a record, with one error per unknown tag
    pub fn into_record(self) -> (MetricRecord, Vec<ValidationError>) {
        let mut errors = Vec::new();

        let dimensions = self.dimensions.iter().filter_map(|t| translate(t, &mut errors)).collect();
        let allowed_dimensions = self
            .allowed_dimensions
            .map(|tags| tags.iter().filter_map(|t| translate(t, &mut errors)).collect());
        let formulas_by_dimension = translate_keys(self.formulas_by_dimension, &mut errors);
        let display_name_by_dimension = translate_keys(self.display_name_by_dimension, &mut errors);
        let lineage_by_dimension = translate_keys(self.lineage_by_dimension, &mut errors);

        let record = MetricRecord {
            id: self.id,
            name: self.name,
            page: self.page,
            section: self.section,
            metric_type: self.metric_type,
            formula: self.formula,
            formula_sql: self.formula_sql,
            source_fields: self.source_fields,
            dimensions,
            allowed_dimensions,
            formulas_by_dimension,
            display_name_by_dimension,
            lineage_by_dimension,
            toggles: self.toggles,
            notes: self.notes,
        };
        (record, errors)
    }
}

fn tags<'a>(dimensions: impl IntoIterator<Item = &'a Dimension>) -> Vec<String> {
    dimensions.into_iter().map(|d| d.as_str().to_string()).collect()
}

fn tag_keys<V>(map: BTreeMap<Dimension, V>) -> BTreeMap<String, V> {
    map.into_iter().map(|(d, v)| (d.as_str().to_string(), v)).collect()
}

impl From<MetricRecord> for MetricImportRow {
    fn from(record: MetricRecord) -> Self {
        Self {
            id: record.id,
            name: record.name,
            page: record.page,
            section: record.section,
            metric_type: record.metric_type,
            formula: record.formula,
            formula_sql: record.formula_sql,
            source_fields: record.source_fields,
            dimensions: tags(&record.dimensions),
            allowed_dimensions: record.allowed_dimensions.as_ref().map(tags),
            formulas_by_dimension: tag_keys(record.formulas_by_dimension),
            display_name_by_dimension: tag_keys(record.display_name_by_dimension),
            lineage_by_dimension: tag_keys(record.lineage_by_dimension),
            toggles: record.toggles,
            notes: record.notes,
        }
    }
}

/// Row of the metrics sheet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MetricSheetRow {
    pub id: String,
    pub name: String,
    pub page: String,
    pub section: String,
    pub metric_type: String,
    pub formula: String,
    #[serde(rename = "formulaSQL")]
    pub formula_sql: Option<String>,

    /// Comma separated dimension tags; blank means unrestricted
    pub allowed_dimensions: Option<String>,
    pub notes: Option<String>,
}

/// Row of the source fields sheet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceFieldSheetRow {
    pub metric_id: String,
    pub layer: String,
    pub table: String,
    pub field: String,
    pub description: Option<String>,
    pub sample_value: Option<String>,
}

/// A two-sheet tabular extract
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TabularExtract {
    pub metrics: Vec<MetricSheetRow>,
    pub source_fields: Vec<SourceFieldSheetRow>,
}

/// Source-field sheet row that joined no metrics row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanSourceField {
    /// Zero-based row index within the source fields sheet
    pub row: usize,
    pub metric_id: String,
    pub layer: String,
    pub table: String,
    pub field: String,
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl TabularExtract {
    /// Source-field rows whose metric id matches no metrics row
    pub fn orphan_source_fields(&self) -> Vec<OrphanSourceField> {
        let ids: BTreeSet<&str> = self.metrics.iter().map(|m| m.id.trim()).collect();
        self.source_fields
            .iter()
            .enumerate()
            .filter(|(_, f)| !ids.contains(f.metric_id.trim()))
            .map(|(row, f)| OrphanSourceField {
                row,
                metric_id: f.metric_id.clone(),
                layer: f.layer.clone(),
                table: f.table.clone(),
                field: f.field.clone(),
            })
            .collect()
    }

    /// Join the sheets into records, one per metrics row
    ///
    /// Dimension tags are translated here, so a row with an unknown tag
    /// carries that error alongside its record. Rows left over in the source
    /// fields sheet are dropped; see [`TabularExtract::orphan_source_fields`].
    pub fn into_records(self) -> Vec<(MetricRecord, Vec<ValidationError>)> {
        let mut fields_by_metric: BTreeMap<String, Vec<SourceFieldRecord>> = BTreeMap::new();
        for row in self.source_fields {
            fields_by_metric
                .entry(row.metric_id.trim().to_string())
                .or_default()
                .push(SourceFieldRecord {
                    layer: row.layer,
                    table: row.table,
                    field: row.field,
                    description: blank_to_none(row.description),
                    sample_value: blank_to_none(row.sample_value),
                });
        }

        self.metrics
            .into_iter()
            .map(|row| {
                let allowed_dimensions = blank_to_none(row.allowed_dimensions).map(|tags| {
                    tags.split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(str::to_string)
                        .collect()
                });

                MetricImportRow {
                    source_fields: fields_by_metric.remove(row.id.trim()).unwrap_or_default(),
                    id: row.id,
                    name: row.name,
                    page: row.page,
                    section: row.section,
                    metric_type: row.metric_type,
                    formula: row.formula,
                    formula_sql: blank_to_none(row.formula_sql),
                    allowed_dimensions,
                    notes: blank_to_none(row.notes),
                    ..Default::default()
                }
                .into_record()
            })
            .collect()
    }
}

/// Input to [`import_metrics`]
#[derive(Debug, Clone)]
pub enum ImportSource {
    Records(Vec<MetricImportRow>),
    Tabular(TabularExtract),
}

/// A row that failed validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportRejection {
    /// Zero-based row index within the import
    pub row: usize,
    pub id: String,
    #[serde(serialize_with = "error_messages")]
    pub errors: Vec<ValidationError>,
}

fn error_messages<S: Serializer>(errors: &[ValidationError], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(errors.iter().map(|e| e.to_string()))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportOutcome {
    /// Ids inserted for the first time
    pub created: Vec<String>,

    /// Ids that replaced an existing metric
    pub updated: Vec<String>,
    pub rejected: Vec<ImportRejection>,

    /// Tabular source-field rows that joined no metric
    pub orphaned_source_fields: Vec<OrphanSourceField>,
}

impl ImportOutcome {
    pub fn accepted(&self) -> usize {
        self.created.len() + self.updated.len()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let rejected = self
            .rejected
            .iter()
            .flat_map(|r| r.errors.iter().map(move |e| validation_diagnostic(&r.id, e)));
        let orphans = self.orphaned_source_fields.iter().map(|o| {
            Diagnostic::new(
                DiagnosticCode::ImportOrphanSourceField,
                Severity::Warn,
                format!(
                    "source field row {} ({}.{}.{}) names metric '{}', which is not in the metrics sheet",
                    o.row, o.layer, o.table, o.field, o.metric_id
                ),
            )
            .with_location(Location::metric(o.metric_id.clone()))
        });

        rejected.chain(orphans).collect()
    }
}

/// Validate and upsert every row of `source` into a copy of `catalog`
///
/// A metric id may be accepted once per import; later rows with the same id
/// are rejected.
pub fn import_metrics(catalog: &MetricCatalog, source: ImportSource) -> (MetricCatalog, ImportOutcome) {
    let mut outcome = ImportOutcome::default();

    let rows: Vec<(MetricRecord, Vec<ValidationError>)> = match source {
        ImportSource::Records(rows) => rows.into_iter().map(MetricImportRow::into_record).collect(),
        ImportSource::Tabular(extract) => {
            outcome.orphaned_source_fields = extract.orphan_source_fields();
            for orphan in &outcome.orphaned_source_fields {
                tracing::warn!(row = orphan.row, metric_id = %orphan.metric_id, "source field row joins no metric");
            }
            extract.into_records()
        }
    };

    let mut next = catalog.clone();
    let mut accepted_ids = BTreeSet::new();

    for (row, (record, mut errors)) in rows.into_iter().enumerate() {
        let id = record.id.trim().to_string();
        if next.is_reserved(&id) {
            errors.push(ValidationError::ReservedId(id.clone()));
        }
        if accepted_ids.contains(&id) {
            errors.push(ValidationError::DuplicateImportId(id.clone()));
        }
        errors.extend(validate_record(&record, 0));

        if !errors.is_empty() {
            tracing::warn!(row, id = %id, errors = errors.len(), "rejected metric row");
            outcome.rejected.push(ImportRejection { row, id, errors });
            continue;
        }

        let upserted = Metric::try_from(record).and_then(|metric| next.upsert(metric));
        match upserted {
            Ok(previous) => {
                accepted_ids.insert(id.clone());
                if previous.is_some() {
                    outcome.updated.push(id);
                } else {
                    outcome.created.push(id);
                }
            }
            Err(e) => outcome.rejected.push(ImportRejection {
                row,
                id,
                errors: vec![e],
            }),
        }
    }

    tracing::info!(
        accepted = outcome.accepted(),
        rejected = outcome.rejected.len(),
        orphaned = outcome.orphaned_source_fields.len(),
        "metric import finished"
    );

    (next, outcome)
}
