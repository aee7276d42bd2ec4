//! Dimension resolution for metrics
//!
//! Answers which dimensions a metric may be evaluated at, and which formula
//! text applies at a given dimension.

use serde::Serialize;
use std::collections::BTreeSet;

use tierline_core::{Dimension, Metric, ValidationError};

/// Where a resolved formula came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormulaOrigin {
    /// `formulasByDimension` had an entry for the dimension
    DimensionOverride,

    /// Fell back to the metric's base formula
    Base,
}

/// Formula text that applies to a metric at one dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedFormula {
    pub dimension: Dimension,
    pub formula: String,
    pub formula_sql: Option<String>,
    pub origin: FormulaOrigin,
}

/// Dimensions the metric may be evaluated at
///
/// A metric without an explicit allowed set is valid at all five.
pub fn resolve_allowed_dimensions(metric: &Metric) -> BTreeSet<Dimension> {
    match metric.allowed_dimensions() {
        Some(allowed) => allowed.clone(),
        None => Dimension::ALL.into_iter().collect(),
    }
}

/// Whether `dimension` is allowed for `metric`
pub fn is_allowed(metric: &Metric, dimension: Dimension) -> bool {
    metric
        .allowed_dimensions()
        .map(|allowed| allowed.contains(&dimension))
        .unwrap_or(true)
}

/// Formula for `metric` at `dimension`
///
/// A dimension override is returned verbatim when present, otherwise the
/// base formula. Asking for a disallowed dimension is a caller error and
/// yields [`ValidationError::UnsupportedDimension`] rather than a fallback.
pub fn resolve_formula(metric: &Metric, dimension: Dimension) -> Result<ResolvedFormula, ValidationError> {
    if !is_allowed(metric, dimension) {
        return Err(ValidationError::UnsupportedDimension {
            metric_id: metric.id().to_string(),
            dimension,
        });
    }

    let resolved = match metric.formulas_by_dimension().get(&dimension) {
        Some(over) => ResolvedFormula {
            dimension,
            formula: over.formula.clone(),
            formula_sql: over.formula_sql.clone(),
            origin: FormulaOrigin::DimensionOverride,
        },
        None => ResolvedFormula {
            dimension,
            formula: metric.formula().to_string(),
            formula_sql: metric.formula_sql().map(|s| s.to_string()),
            origin: FormulaOrigin::Base,
        },
    };

    Ok(resolved)
}

/// Display name for `metric` at `dimension`, defaulting to the metric name
pub fn display_name(metric: &Metric, dimension: Dimension) -> String {
    metric
        .display_name_at(dimension)
        .unwrap_or_else(|| metric.name())
        .to_string()
}
