//! Metric catalog model
//!
//! A metric carries a base formula, optional per-dimension overrides, the
//! dimensions it is valid at, and the L1/L2 fields it is sourced from.
//! `Metric` and `SourceField` can only be obtained through validation:
//! [`MetricBuilder::build`] or deserializing a [`MetricRecord`].

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::dimension::Dimension;
use crate::error::ValidationError;
use crate::schema::Layer;

/// Unvalidated source field shape
///
/// Missing coordinates deserialize as empty and fail validation instead of decoding.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFieldRecord {
    #[serde(default)]
    pub layer: String,
    #[serde(default)]
    pub table: String,
    #[serde(default)]
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_value: Option<String>,
}

/// Provenance of a metric input: an L1/L2 field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SourceFieldRecord", into = "SourceFieldRecord")]
pub struct SourceField {
    layer: Layer,
    table: String,
    field: String,
    description: Option<String>,
    sample_value: Option<String>,
}

impl SourceField {
    /// Create a source field; only L1 and L2 are accepted
    pub fn new(layer: Layer, table: impl Into<String>, field: impl Into<String>) -> Result<Self, ValidationError> {
        let table = table.into();
        let field = field.into();

        if table.trim().is_empty() {
            return Err(ValidationError::IncompleteSourceField("table"));
        }
        if field.trim().is_empty() {
            return Err(ValidationError::IncompleteSourceField("field"));
        }
        if !layer.is_source_layer() {
            return Err(ValidationError::InvalidSourceLayer { layer, table, field });
        }

        Ok(Self {
            layer,
            table,
            field,
            description: None,
            sample_value: None,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_sample_value(mut self, sample_value: impl Into<String>) -> Self {
        self.sample_value = Some(sample_value.into());
        self
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn sample_value(&self) -> Option<&str> {
        self.sample_value.as_deref()
    }

    /// Whether this source field names the given coordinates
    pub fn matches(&self, layer: Layer, table: &str, field: &str) -> bool {
        self.layer == layer && self.table == table && self.field == field
    }
}

impl TryFrom<SourceFieldRecord> for SourceField {
    type Error = ValidationError;

    fn try_from(record: SourceFieldRecord) -> Result<Self, Self::Error> {
        let layer = Layer::from_tag(&record.layer)?;
        let mut field = SourceField::new(layer, record.table, record.field)?;
        field.description = record.description.filter(|d| !d.trim().is_empty());
        field.sample_value = record.sample_value.filter(|s| !s.trim().is_empty());
        Ok(field)
    }
}

impl From<SourceField> for SourceFieldRecord {
    fn from(field: SourceField) -> Self {
        Self {
            layer: field.layer.as_str().to_string(),
            table: field.table,
            field: field.field,
            description: field.description,
            sample_value: field.sample_value,
        }
    }
}

/// Formula override for one dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DimensionFormula {
    pub formula: String,

    #[serde(rename = "formulaSQL", default, skip_serializing_if = "Option::is_none")]
    pub formula_sql: Option<String>,
}

/// Unvalidated metric shape as stored and imported
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub page: String,
    #[serde(default)]
    pub section: String,
    #[serde(default)]
    pub metric_type: String,
    #[serde(default)]
    pub formula: String,
    #[serde(rename = "formulaSQL", default, skip_serializing_if = "Option::is_none")]
    pub formula_sql: Option<String>,
    #[serde(default)]
    pub source_fields: Vec<SourceFieldRecord>,
    #[serde(default)]
    pub dimensions: Vec<Dimension>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_dimensions: Option<Vec<Dimension>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub formulas_by_dimension: BTreeMap<Dimension, DimensionFormula>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub display_name_by_dimension: BTreeMap<Dimension, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub lineage_by_dimension: BTreeMap<Dimension, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub toggles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A validated catalog metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MetricRecord", into = "MetricRecord")]
pub struct Metric {
    id: String,
    name: String,
    page: String,
    section: String,
    metric_type: String,
    formula: String,
    formula_sql: Option<String>,
    source_fields: Vec<SourceField>,
    dimensions: Vec<Dimension>,
    allowed_dimensions: Option<BTreeSet<Dimension>>,
    formulas_by_dimension: BTreeMap<Dimension, DimensionFormula>,
    display_name_by_dimension: BTreeMap<Dimension, String>,
    lineage_by_dimension: BTreeMap<Dimension, String>,
    toggles: Vec<String>,
    notes: Option<String>,
}

impl Metric {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn page(&self) -> &str {
        &self.page
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn metric_type(&self) -> &str {
        &self.metric_type
    }

    pub fn formula(&self) -> &str {
        &self.formula
    }

    pub fn formula_sql(&self) -> Option<&str> {
        self.formula_sql.as_deref()
    }

    pub fn source_fields(&self) -> &[SourceField] {
        &self.source_fields
    }

    pub fn dimensions(&self) -> &[Dimension] {
        &self.dimensions
    }

    /// Explicitly allowed dimensions; `None` means all five
    pub fn allowed_dimensions(&self) -> Option<&BTreeSet<Dimension>> {
        self.allowed_dimensions.as_ref()
    }

    pub fn formulas_by_dimension(&self) -> &BTreeMap<Dimension, DimensionFormula> {
        &self.formulas_by_dimension
    }

    pub fn display_name_at(&self, dimension: Dimension) -> Option<&str> {
        self.display_name_by_dimension.get(&dimension).map(|s| s.as_str())
    }

    /// Lineage narrative documented for a dimension
    pub fn lineage_at(&self, dimension: Dimension) -> Option<&str> {
        self.lineage_by_dimension.get(&dimension).map(|s| s.as_str())
    }

    pub fn lineage_by_dimension(&self) -> &BTreeMap<Dimension, String> {
        &self.lineage_by_dimension
    }

    pub fn toggles(&self) -> &[String] {
        &self.toggles
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }
}

/// Validating builder for [`Metric`]
#[derive(Debug, Clone)]
pub struct MetricBuilder {
    record: MetricRecord,
    source_fields: Vec<SourceField>,
}

impl MetricBuilder {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            record: MetricRecord {
                id: id.into(),
                name: name.into(),
                ..Default::default()
            },
            source_fields: Vec::new(),
        }
    }

    pub fn page(mut self, page: impl Into<String>) -> Self {
        self.record.page = page.into();
        self
    }

    pub fn section(mut self, section: impl Into<String>) -> Self {
        self.record.section = section.into();
        self
    }

    pub fn metric_type(mut self, metric_type: impl Into<String>) -> Self {
        self.record.metric_type = metric_type.into();
        self
    }

    pub fn formula(mut self, formula: impl Into<String>) -> Self {
        self.record.formula = formula.into();
        self
    }

    pub fn formula_sql(mut self, sql: impl Into<String>) -> Self {
        self.record.formula_sql = Some(sql.into());
        self
    }

    pub fn source_field(mut self, field: SourceField) -> Self {
        self.source_fields.push(field);
        self
    }

    pub fn dimensions(mut self, dimensions: impl IntoIterator<Item = Dimension>) -> Self {
        self.record.dimensions = dimensions.into_iter().collect();
        self
    }

    pub fn allowed_dimensions(mut self, dimensions: impl IntoIterator<Item = Dimension>) -> Self {
        self.record.allowed_dimensions = Some(dimensions.into_iter().collect());
        self
    }

    pub fn formula_at(mut self, dimension: Dimension, formula: impl Into<String>, sql: Option<&str>) -> Self {
        self.record.formulas_by_dimension.insert(
            dimension,
            DimensionFormula {
                formula: formula.into(),
                formula_sql: sql.map(|s| s.to_string()),
            },
        );
        self
    }

    pub fn display_name_at(mut self, dimension: Dimension, name: impl Into<String>) -> Self {
        self.record.display_name_by_dimension.insert(dimension, name.into());
        self
    }

    pub fn lineage_at(mut self, dimension: Dimension, narrative: impl Into<String>) -> Self {
        self.record.lineage_by_dimension.insert(dimension, narrative.into());
        self
    }

    pub fn toggle(mut self, toggle: impl Into<String>) -> Self {
        self.record.toggles.push(toggle.into());
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.record.notes = Some(notes.into());
        self
    }

    /// Validate and build
    pub fn build(self) -> Result<Metric, ValidationError> {
        let errors = validate_record(&self.record, self.source_fields.len());
        if let Some(first) = errors.into_iter().next() {
            return Err(first);
        }
        Ok(assemble(self.record, self.source_fields))
    }
}

/// Every validation problem with a record, in a stable order
///
/// `extra_source_fields` counts already-validated source fields supplied
/// outside the record (the builder path).
pub fn validate_record(record: &MetricRecord, extra_source_fields: usize) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    let id = record.id.trim();

    if id.is_empty() {
        errors.push(ValidationError::EmptyId);
    }
    if record.name.trim().is_empty() {
        errors.push(ValidationError::EmptyName { id: id.to_string() });
    }
    if record.formula.trim().is_empty() {
        errors.push(ValidationError::EmptyFormula { id: id.to_string() });
    }
    if record.source_fields.len() + extra_source_fields == 0 {
        errors.push(ValidationError::NoSourceFields { id: id.to_string() });
    }
    for source in &record.source_fields {
        if let Err(e) = SourceField::try_from(source.clone()) {
            errors.push(e);
        }
    }
    if let Some(allowed) = &record.allowed_dimensions {
        for dimension in record.formulas_by_dimension.keys() {
            if !allowed.contains(dimension) {
                errors.push(ValidationError::OverrideOutsideAllowed {
                    metric_id: id.to_string(),
                    dimension: *dimension,
                });
            }
        }
    }

    errors
}

fn assemble(record: MetricRecord, mut source_fields: Vec<SourceField>) -> Metric {
    source_fields.extend(
        record
            .source_fields
            .into_iter()
            .filter_map(|s| SourceField::try_from(s).ok()),
    );

    Metric {
        id: record.id.trim().to_string(),
        name: record.name.trim().to_string(),
        page: record.page,
        section: record.section,
        metric_type: record.metric_type,
        formula: record.formula,
        formula_sql: record.formula_sql.filter(|s| !s.trim().is_empty()),
        source_fields,
        dimensions: record.dimensions,
        allowed_dimensions: record.allowed_dimensions.map(|d| d.into_iter().collect()),
        formulas_by_dimension: record.formulas_by_dimension,
        display_name_by_dimension: record.display_name_by_dimension,
        lineage_by_dimension: record.lineage_by_dimension,
        toggles: record.toggles,
        notes: record.notes,
    }
}

impl TryFrom<MetricRecord> for Metric {
    type Error = ValidationError;

    fn try_from(record: MetricRecord) -> Result<Self, Self::Error> {
        if let Some(first) = validate_record(&record, 0).into_iter().next() {
            return Err(first);
        }
        Ok(assemble(record, Vec::new()))
    }
}

impl From<Metric> for MetricRecord {
    fn from(metric: Metric) -> Self {
        Self {
            id: metric.id,
            name: metric.name,
            page: metric.page,
            section: metric.section,
            metric_type: metric.metric_type,
            formula: metric.formula,
            formula_sql: metric.formula_sql,
            source_fields: metric.source_fields.into_iter().map(SourceFieldRecord::from).collect(),
            dimensions: metric.dimensions,
            allowed_dimensions: metric.allowed_dimensions.map(|d| d.into_iter().collect()),
            formulas_by_dimension: metric.formulas_by_dimension,
            display_name_by_dimension: metric.display_name_by_dimension,
            lineage_by_dimension: metric.lineage_by_dimension,
            toggles: metric.toggles,
            notes: metric.notes,
        }
    }
}

/// The set of metrics plus the ids reserved for built-in metrics
#[derive(Debug, Clone, Default)]
pub struct MetricCatalog {
    metrics: Vec<Metric>,
    reserved_ids: BTreeSet<String>,
}

impl MetricCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a catalog whose metrics are all treated as built-in
    pub fn with_builtins(builtins: Vec<Metric>) -> Self {
        let reserved_ids = builtins.iter().map(|m| m.id.clone()).collect();
        Self {
            metrics: builtins,
            reserved_ids,
        }
    }

    /// Reserve additional ids
    pub fn reserve_ids<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved_ids.extend(ids.into_iter().map(Into::into));
    }

    pub fn is_reserved(&self, id: &str) -> bool {
        self.reserved_ids.contains(id)
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn get(&self, id: &str) -> Option<&Metric> {
        self.metrics.iter().find(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Insert or replace a non-reserved metric; returns the replaced one
    pub fn upsert(&mut self, metric: Metric) -> Result<Option<Metric>, ValidationError> {
        if self.is_reserved(&metric.id) {
            return Err(ValidationError::ReservedId(metric.id));
        }
        match self.metrics.iter_mut().find(|m| m.id == metric.id) {
            Some(slot) => Ok(Some(std::mem::replace(slot, metric))),
            None => {
                self.metrics.push(metric);
                Ok(None)
            }
        }
    }

    /// Remove a non-reserved metric
    pub fn remove(&mut self, id: &str) -> Result<Option<Metric>, ValidationError> {
        if self.is_reserved(id) {
            return Err(ValidationError::ReservedId(id.to_string()));
        }
        Ok(self
            .metrics
            .iter()
            .position(|m| m.id == id)
            .map(|i| self.metrics.remove(i)))
    }

    /// Metrics not reserved as built-ins, i.e. what a metric store persists
    pub fn custom_metrics(&self) -> Vec<&Metric> {
        self.metrics.iter().filter(|m| !self.is_reserved(&m.id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn drawn() -> SourceField {
        SourceField::new(Layer::L2, "facility_exposure_snapshot", "drawn_amount").unwrap()
    }

    #[test]
    fn builder_enforces_required_attributes() {
        assert_eq!(
            MetricBuilder::new("m1", "").formula("a").source_field(drawn()).build().unwrap_err(),
            ValidationError::EmptyName { id: "m1".into() }
        );
        assert_eq!(
            MetricBuilder::new("m1", "Drawn").source_field(drawn()).build().unwrap_err(),
            ValidationError::EmptyFormula { id: "m1".into() }
        );
        assert_eq!(
            MetricBuilder::new("m1", "Drawn").formula("SUM(drawn_amount)").build().unwrap_err(),
            ValidationError::NoSourceFields { id: "m1".into() }
        );
        assert!(MetricBuilder::new("m1", "Drawn")
            .formula("SUM(drawn_amount)")
            .source_field(drawn())
            .build()
            .is_ok());
    }

    #[test]
    fn l3_source_fields_rejected() {
        let err = SourceField::new(Layer::L3, "exposure_summary", "total").unwrap_err();
        assert!(matches!(err, ValidationError::InvalidSourceLayer { layer: Layer::L3, .. }));
    }

    #[test]
    fn record_json_uses_camel_case_and_validates() {
        let json = r#"{
            "id": "EXP-001",
            "name": "Drawn Exposure",
            "metricType": "Exposure",
            "formula": "SUM(drawn_amount)",
            "formulaSQL": "SELECT SUM(drawn_amount) FROM l2.facility_exposure_snapshot",
            "sourceFields": [{"layer": "L2", "table": "facility_exposure_snapshot", "field": "drawn_amount", "sampleValue": "1200000"}],
            "allowedDimensions": ["facility", "L3"]
        }"#;

        let metric: Metric = serde_json::from_str(json).unwrap();
        assert_eq!(metric.metric_type(), "Exposure");
        assert_eq!(metric.source_fields()[0].sample_value(), Some("1200000"));
        assert!(metric.allowed_dimensions().unwrap().contains(&Dimension::Desk));

        let bad = json.replace("\"formula\": \"SUM(drawn_amount)\"", "\"formula\": \"  \"");
        assert!(serde_json::from_str::<Metric>(&bad).is_err());
    }

    #[test]
    fn validate_record_collects_every_problem() {
        let record = MetricRecord {
            id: "X".into(),
            source_fields: vec![SourceFieldRecord {
                layer: "L3".into(),
                table: "t".into(),
                field: "f".into(),
                description: None,
                sample_value: None,
            }],
            ..Default::default()
        };

        let errors = validate_record(&record, 0);
        assert_eq!(errors.len(), 3);
        assert!(matches!(errors[2], ValidationError::InvalidSourceLayer { .. }));
    }

    #[test]
    fn override_must_be_allowed() {
        let err = MetricBuilder::new("m", "M")
            .formula("a")
            .source_field(drawn())
            .allowed_dimensions([Dimension::Facility])
            .formula_at(Dimension::Lob, "b", None)
            .build()
            .unwrap_err();
        assert!(matches!(err, ValidationError::OverrideOutsideAllowed { dimension: Dimension::Lob, .. }));
    }

    #[test]
    fn catalog_protects_reserved_ids() {
        let builtin = MetricBuilder::new("EXP-001", "Drawn")
            .formula("SUM(drawn_amount)")
            .source_field(drawn())
            .build()
            .unwrap();
        let mut catalog = MetricCatalog::with_builtins(vec![builtin.clone()]);

        assert_eq!(catalog.upsert(builtin).unwrap_err(), ValidationError::ReservedId("EXP-001".into()));

        let custom = MetricBuilder::new("C-1", "Custom")
            .formula("x")
            .source_field(drawn())
            .build()
            .unwrap();
        assert!(catalog.upsert(custom.clone()).unwrap().is_none());
        assert!(catalog.upsert(custom).unwrap().is_some());
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.custom_metrics().len(), 1);
    }
}
