//! Cross-tier lineage resolution
//!
//! Stitches the facility step chain under the chain of a higher dimension.
//! SOURCE steps already explained at facility level are not repeated in the
//! target tier, while the end-to-end source table summary still lists them.

use serde::Serialize;
use std::collections::{BTreeMap, HashSet};

use tierline_core::{Dimension, Layer, Metric, SourceField};

use crate::dimension::{resolve_formula, FormulaOrigin};
use crate::narrative::{parse_narrative, NarrativeContext, ParsedNarrative};
use crate::step::{collect_source_tables, LineageStep, SourceTableSummary};

/// Narrative and metric facts for one dimension
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TierInput {
    pub narrative: Option<String>,
    pub source_fields: Vec<SourceField>,
    pub formula_sql: Option<String>,
    pub rollup_logic: Option<String>,
}

impl TierInput {
    fn parse(&self) -> Option<ParsedNarrative> {
        let narrative = self.narrative.as_deref().filter(|n| !n.trim().is_empty())?;
        let context = NarrativeContext {
            source_fields: &self.source_fields,
            formula_sql: self.formula_sql.as_deref(),
        };
        Some(parse_narrative(narrative, &context))
    }
}

/// Per-dimension inputs for every dimension of a metric
///
/// Formula SQL is the dimension-resolved SQL where the dimension is allowed,
/// and a dimension override doubles as that tier's rollup logic.
pub fn tier_inputs(metric: &Metric) -> BTreeMap<Dimension, TierInput> {
    Dimension::ALL
        .into_iter()
        .map(|dimension| {
            let resolved = resolve_formula(metric, dimension).ok();
            let formula_sql = resolved
                .as_ref()
                .and_then(|r| r.formula_sql.clone())
                .or_else(|| metric.formula_sql().map(|s| s.to_string()));
            let rollup_logic = resolved
                .filter(|r| r.origin == FormulaOrigin::DimensionOverride && dimension.is_above_facility())
                .map(|r| r.formula);

            let input = TierInput {
                narrative: metric.lineage_at(dimension).map(|s| s.to_string()),
                source_fields: metric.source_fields().to_vec(),
                formula_sql,
                rollup_logic,
            };
            (dimension, input)
        })
        .collect()
}

/// Steps explaining one hierarchy level
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierStepGroup {
    /// Hierarchy level, 0 = facility
    pub tier: u8,
    pub tier_label: String,
    pub dimension: Dimension,
    pub is_current_tier: bool,
    pub is_dependency_tier: bool,
    pub steps: Vec<LineageStep>,
    pub source_tables: Vec<SourceTableSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rollup_logic: Option<String>,
}

impl TierStepGroup {
    fn new(dimension: Dimension, current: bool, steps: Vec<LineageStep>, rollup_logic: Option<String>) -> Self {
        let mut source_tables = Vec::new();
        collect_source_tables(&steps, &mut source_tables);

        Self {
            tier: dimension.level(),
            tier_label: dimension.label().to_string(),
            dimension,
            is_current_tier: current,
            is_dependency_tier: !current,
            steps,
            source_tables,
            rollup_logic,
        }
    }

    /// Empty steps mean the lineage is not documented for this tier
    pub fn is_documented(&self) -> bool {
        !self.steps.is_empty()
    }
}

/// Resolved lineage for one metric at one dimension
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrossTierLineage {
    pub metric_id: String,
    pub dimension: Dimension,

    /// Dependency tier (if any) first, then the current tier
    pub tiers: Vec<TierStepGroup>,

    /// Every table feeding the value across all tiers
    pub all_source_tables: Vec<SourceTableSummary>,

    /// Narrative segments skipped for unrecognized tags
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_segments: Vec<String>,
}

impl CrossTierLineage {
    pub fn current_tier(&self) -> Option<&TierStepGroup> {
        self.tiers.iter().find(|t| t.is_current_tier)
    }

    pub fn dependency_tier(&self) -> Option<&TierStepGroup> {
        self.tiers.iter().find(|t| t.is_dependency_tier)
    }
}

type Coordinates = (Layer, String, String);

fn source_coordinates(steps: &[LineageStep]) -> HashSet<Coordinates> {
    steps
        .iter()
        .filter(|s| s.is_source())
        .filter_map(|s| s.coordinates())
        .map(|(l, t, f)| (l, t.to_string(), f.to_string()))
        .collect()
}

/// Resolve the lineage of `metric_id` at `target`
///
/// Missing narratives degrade to an empty current tier rather than an error.
pub fn resolve_cross_tier(
    metric_id: &str,
    target: Dimension,
    inputs: &BTreeMap<Dimension, TierInput>,
) -> CrossTierLineage {
    let mut tiers = Vec::new();
    let mut all_source_tables = Vec::new();
    let mut skipped_segments = Vec::new();
    let mut explained: HashSet<Coordinates> = HashSet::new();

    if target.is_above_facility() {
        let base = inputs.get(&Dimension::Facility);
        if let Some(parsed) = base.and_then(TierInput::parse) {
            collect_source_tables(&parsed.steps, &mut all_source_tables);
            explained = source_coordinates(&parsed.steps);
            skipped_segments.extend(parsed.skipped_segments);
            tiers.push(TierStepGroup::new(Dimension::Facility, false, parsed.steps, None));
        } else {
            tracing::debug!(metric_id, "no facility narrative, resolving without a dependency tier");
        }
    }

    let input = inputs.get(&target);
    let rollup_logic = input.and_then(|i| i.rollup_logic.clone());

    let current = match input.and_then(TierInput::parse) {
        Some(parsed) => {
            collect_source_tables(&parsed.steps, &mut all_source_tables);
            skipped_segments.extend(parsed.skipped_segments);

            let steps = parsed
                .steps
                .into_iter()
                .filter(|step| {
                    !step.is_source()
                        || step
                            .coordinates()
                            .map(|(l, t, f)| !explained.contains(&(l, t.to_string(), f.to_string())))
                            .unwrap_or(true)
                })
                .collect();
            TierStepGroup::new(target, true, steps, rollup_logic)
        }
        None => {
            tracing::debug!(metric_id, dimension = %target, "lineage not documented for dimension");
            TierStepGroup::new(target, true, Vec::new(), rollup_logic)
        }
    };
    tiers.push(current);

    CrossTierLineage {
        metric_id: metric_id.to_string(),
        dimension: target,
        tiers,
        all_source_tables,
        skipped_segments,
    }
}
