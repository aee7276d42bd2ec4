//! Value explanation
//!
//! Answers "what is this number": identity, the formula applied at the
//! requested dimension, its lineage across tiers, and a data quality flag
//! supplied by the caller.

use serde::{Deserialize, Serialize};

use tierline_core::{Dimension, MetricCatalog};
use tierline_lineage::{display_name, resolve_cross_tier, resolve_formula, tier_inputs, CrossTierLineage, ResolvedFormula};

use crate::error::EngineError;

/// Data quality of the value being explained
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QualityStatus {
    #[default]
    Green,
    Amber,
    Red,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainRequest {
    pub metric_id: String,

    /// Any accepted dimension tag, including the L1/L2/L3 aliases
    pub dimension: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricIdentity {
    pub id: String,
    pub name: String,
    pub display_name: String,
    pub page: String,
    pub section: String,
    pub metric_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainResponse {
    pub identity: MetricIdentity,
    pub dimension: Dimension,
    pub value_context: String,
    pub formula: ResolvedFormula,
    pub lineage: CrossTierLineage,
    pub quality: QualityStatus,
}

/// Explain a metric value at a dimension
///
/// Fails on an unknown metric, an unknown dimension tag, or a dimension the
/// metric does not allow.
pub fn explain(
    catalog: &MetricCatalog,
    request: &ExplainRequest,
    quality: QualityStatus,
) -> Result<ExplainResponse, EngineError> {
    let metric = catalog
        .get(request.metric_id.trim())
        .ok_or_else(|| EngineError::MetricNotFound(request.metric_id.clone()))?;
    let dimension = Dimension::from_tag(&request.dimension)?;
    let formula = resolve_formula(metric, dimension)?;
    let display = display_name(metric, dimension);

    let mut value_context = format!("{} at {} level, computed as {}", display, dimension.label(), formula.formula);
    if dimension.is_above_facility() {
        value_context.push_str(", rolled up from facility values");
    }

    let lineage = resolve_cross_tier(metric.id(), dimension, &tier_inputs(metric));

    Ok(ExplainResponse {
        identity: MetricIdentity {
            id: metric.id().to_string(),
            name: metric.name().to_string(),
            display_name: display,
            page: metric.page().to_string(),
            section: metric.section().to_string(),
            metric_type: metric.metric_type().to_string(),
        },
        dimension,
        value_context,
        formula,
        lineage,
        quality,
    })
}
