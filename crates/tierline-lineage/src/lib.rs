//! Metric lineage for tierline
//!
//! - Dimension resolution (allowed dimensions, per-dimension formulas)
//! - Lineage narrative parsing into SOURCE / TRANSFORM / OUTPUT steps
//! - Cross-tier stitching of facility and higher-tier step chains
//!
//! Everything here is a pure function of the metric and the inputs passed in.

pub mod dimension;
pub mod hybrid;
pub mod narrative;
pub mod resolver;
pub mod step;

pub use dimension::{display_name, is_allowed, resolve_allowed_dimensions, resolve_formula, FormulaOrigin, ResolvedFormula};
pub use hybrid::embeds_aggregate_of;
pub use narrative::{parse_narrative, NarrativeContext, ParsedNarrative};
pub use resolver::{resolve_cross_tier, tier_inputs, CrossTierLineage, TierInput, TierStepGroup};
pub use step::{LineageStep, SourceTableSummary, StepTag, StepType};
