//! Lineage step records
//!
//! Steps are derived per request from a metric's narrative and never
//! persisted.

use serde::Serialize;

use tierline_core::Layer;

/// Narrative tag a step was parsed from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepTag {
    Source,
    Transform,
    Output,
}

impl StepTag {
    /// Match a bracket tag such as `SOURCE`
    pub fn from_bracket(tag: &str) -> Option<Self> {
        match tag.trim().to_ascii_uppercase().as_str() {
            "SOURCE" => Some(Self::Source),
            "TRANSFORM" => Some(Self::Transform),
            "OUTPUT" => Some(Self::Output),
            _ => None,
        }
    }
}

/// How a step contributes to the value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepType {
    /// Flat passthrough of a source field
    Sourcing,

    /// Computation over earlier steps
    Calculation,

    /// Source field that is itself read through an embedded aggregate
    Hybrid,
}

/// One parsed lineage step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineageStep {
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub tag: StepTag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<Layer>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub join_conditions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grouping: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub null_guard: Option<String>,
}

impl LineageStep {
    pub(crate) fn new(step_type: StepType, tag: StepTag, label: impl Into<String>) -> Self {
        Self {
            step_type,
            tag,
            layer: None,
            table: None,
            field: None,
            label: label.into(),
            description: None,
            formula: None,
            join_conditions: Vec::new(),
            grouping: None,
            sample_value: None,
            null_guard: None,
        }
    }

    /// `(layer, table, field)` of a step that names a column
    pub fn coordinates(&self) -> Option<(Layer, &str, &str)> {
        match (self.layer, self.table.as_deref(), self.field.as_deref()) {
            (Some(layer), Some(table), Some(field)) => Some((layer, table, field)),
            _ => None,
        }
    }

    pub fn is_source(&self) -> bool {
        self.tag == StepTag::Source
    }
}

/// A table feeding a value, with the fields read from it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceTableSummary {
    pub layer: Layer,
    pub table: String,
    pub fields: Vec<String>,
}

/// Group SOURCE steps by layer and table, unioning fields
///
/// Tables and fields keep first-seen order.
pub fn collect_source_tables<'a, I>(steps: I, into: &mut Vec<SourceTableSummary>)
where
    I: IntoIterator<Item = &'a LineageStep>,
{
    for step in steps.into_iter().filter(|s| s.is_source()) {
        let Some((layer, table, field)) = step.coordinates() else {
            continue;
        };

        match into.iter_mut().find(|s| s.layer == layer && s.table == table) {
            Some(summary) => {
                if !summary.fields.iter().any(|f| f == field) {
                    summary.fields.push(field.to_string());
                }
            }
            None => into.push(SourceTableSummary {
                layer,
                table: table.to_string(),
                fields: vec![field.to_string()],
            }),
        }
    }
}
