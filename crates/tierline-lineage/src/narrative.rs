//! Lineage narrative parsing
//!
//! A narrative is a `|`-separated list of segments. Each segment starts with
//! a bracketed tag followed by arrow-separated clauses:
//!
//! ```text
//! [SOURCE] L2.facility_exposure_snapshot.drawn_amount (drawn balance) → Join: facility_id, as_of_date
//! | [TRANSFORM] Sum by counterparty → Formula: SUM(drawn_amount) → Grouping: counterparty_id
//! | [OUTPUT] Counterparty drawn exposure → reported in USD
//! ```
//!
//! Parsing is lenient: segments with an unknown tag are skipped and reported
//! back, never turned into an error.

use once_cell::sync::Lazy;
use regex::Regex;

use tierline_core::{Layer, SourceField};

use crate::hybrid::embeds_aggregate_of;
use crate::step::{LineageStep, StepTag, StepType};

static SEGMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\[\s*([A-Za-z_]+)\s*\]\s*(.*)$").expect("segment pattern is valid"));

static ARROW: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*(?:—>|→|->|=>)\s*").expect("arrow pattern is valid"));

static SOURCE_COLUMN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^((?i:L[12]))\s*\.\s*([A-Za-z0-9_]+)\s*\.\s*([A-Za-z0-9_]+)(.*)$").expect("source pattern is valid")
});

static OUTPUT_COLUMN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^((?i:L[123]))\s*\.\s*([A-Za-z0-9_]+)\s*\.\s*([A-Za-z0-9_]+)(.*)$").expect("output pattern is valid")
});

static JOIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bjoin\s*:\s*(.+)$").expect("join pattern is valid"));

static SAMPLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^sample\s*:\s*(.+)$").expect("sample pattern is valid"));

static FORMULA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bformula\s*:\s*(.+?)\s*;?\s*(?:\b(?:grouping|null guard|zero guard)\s*:|$)")
        .expect("formula pattern is valid")
});

static GROUPING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bgrouping\s*:\s*(.+?)\s*;?\s*(?:\b(?:formula|null guard|zero guard)\s*:|$)")
        .expect("grouping pattern is valid")
});

static GUARD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b((?:null|zero) guard\s*:\s*.+?)\s*;?\s*(?:\b(?:formula|grouping)\s*:|$)")
        .expect("guard pattern is valid")
});

/// Inline conditional guard, `... IF <condition> ...`
static IF_GUARD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bIF\s.*$").expect("IF pattern is valid"));

/// First annotation keyword in a clause, used to cut a label out of it
static ANNOTATION_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:formula|grouping|null guard|zero guard)\s*:").expect("annotation pattern is valid")
});

/// Metric facts the parser consults
#[derive(Debug, Clone, Copy, Default)]
pub struct NarrativeContext<'a> {
    /// Declared source fields, used to enrich SOURCE steps
    pub source_fields: &'a [SourceField],

    /// Formula SQL, used for HYBRID classification
    pub formula_sql: Option<&'a str>,
}

/// Result of parsing one narrative
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedNarrative {
    /// Steps in narrative order
    pub steps: Vec<LineageStep>,

    /// Segments skipped because their tag was not recognized
    pub skipped_segments: Vec<String>,
}

/// Parse a narrative into steps
pub fn parse_narrative(narrative: &str, context: &NarrativeContext<'_>) -> ParsedNarrative {
    let mut parsed = ParsedNarrative::default();

    for segment in narrative.split('|').map(str::trim).filter(|s| !s.is_empty()) {
        let Some(caps) = SEGMENT.captures(segment) else {
            tracing::debug!(segment, "narrative segment has no tag, skipping");
            parsed.skipped_segments.push(segment.to_string());
            continue;
        };

        let Some(tag) = StepTag::from_bracket(&caps[1]) else {
            tracing::debug!(tag = &caps[1], "unrecognized narrative tag, skipping");
            parsed.skipped_segments.push(segment.to_string());
            continue;
        };

        let clauses: Vec<&str> = ARROW
            .split(caps[2].trim())
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .collect();

        let step = match tag {
            StepTag::Source => parse_source(&clauses, context),
            StepTag::Transform => parse_transform(&clauses),
            StepTag::Output => parse_output(&clauses),
        };
        parsed.steps.push(step);
    }

    parsed
}

/// Strip separators around free text trailing a column reference
fn trailing_text(rest: &str) -> Option<String> {
    let text = rest
        .trim()
        .trim_start_matches(|c: char| matches!(c, ':' | '-' | '(' | ',') || c.is_whitespace())
        .trim_end_matches(')')
        .trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn join_description(parts: Vec<String>) -> Option<String> {
    (!parts.is_empty()).then(|| parts.join(" - "))
}

fn parse_layer(tag: &str) -> Option<Layer> {
    Layer::from_tag(tag).ok()
}

fn parse_source(clauses: &[&str], context: &NarrativeContext<'_>) -> LineageStep {
    let first = clauses.first().copied().unwrap_or_default();
    let mut description = Vec::new();

    let mut step = match SOURCE_COLUMN.captures(first) {
        Some(caps) => {
            let table = caps[2].to_string();
            let field = caps[3].to_string();
            let mut step = LineageStep::new(StepType::Sourcing, StepTag::Source, format!("{}.{}", table, field));
            step.layer = parse_layer(&caps[1]);
            if embeds_aggregate_of(context.formula_sql, &table) {
                step.step_type = StepType::Hybrid;
            }
            step.table = Some(table);
            step.field = Some(field);
            description.extend(trailing_text(&caps[4]));
            step
        }
        None => {
            tracing::debug!(clause = first, "SOURCE segment does not start with L1/L2.table.field");
            LineageStep::new(StepType::Sourcing, StepTag::Source, first)
        }
    };

    for clause in clauses.iter().skip(1) {
        if let Some(caps) = JOIN.captures(clause) {
            let lead = clause[..caps.get(0).map_or(0, |m| m.start())].trim();
            if !lead.is_empty() {
                description.push(lead.to_string());
            }
            step.join_conditions.extend(
                caps[1]
                    .split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string),
            );
        } else if let Some(caps) = SAMPLE.captures(clause) {
            step.sample_value = Some(caps[1].trim().to_string());
        } else {
            description.push(clause.to_string());
        }
    }
    step.description = join_description(description);

    enrich(&mut step, context.source_fields);
    step
}

/// Declared source field facts override what the narrative says
fn enrich(step: &mut LineageStep, source_fields: &[SourceField]) {
    let Some((layer, table, field)) = step.coordinates() else {
        return;
    };
    let Some(declared) = source_fields.iter().find(|s| s.matches(layer, table, field)) else {
        return;
    };

    if let Some(description) = declared.description() {
        step.description = Some(description.to_string());
    }
    if let Some(sample) = declared.sample_value() {
        step.sample_value = Some(sample.to_string());
    }
}

/// Annotations carried by one clause; a clause may carry several
struct Annotations {
    formula: Option<String>,
    grouping: Option<String>,
    guard: Option<String>,
}

impl Annotations {
    fn scan(clause: &str) -> Self {
        let guard = GUARD
            .captures(clause)
            .map(|c| c[1].trim().to_string())
            .or_else(|| IF_GUARD.find(clause).map(|m| m.as_str().trim().to_string()));

        Self {
            formula: FORMULA.captures(clause).map(|c| c[1].trim().to_string()),
            grouping: GROUPING.captures(clause).map(|c| c[1].trim().to_string()),
            guard,
        }
    }

    fn is_empty(&self) -> bool {
        self.formula.is_none() && self.grouping.is_none() && self.guard.is_none()
    }
}

fn parse_transform(clauses: &[&str]) -> LineageStep {
    let first = clauses.first().copied().unwrap_or_default();
    let cut = [ANNOTATION_START.find(first), IF_GUARD.find(first)]
        .into_iter()
        .flatten()
        .map(|m| m.start())
        .min();
    let label = match cut {
        Some(end) => first[..end].trim().trim_end_matches([';', ',', '-']).trim(),
        None => first,
    };
    let label = if label.is_empty() { "Calculation" } else { label };

    let mut step = LineageStep::new(StepType::Calculation, StepTag::Transform, label);
    let mut description = Vec::new();

    for (index, clause) in clauses.iter().enumerate() {
        let found = Annotations::scan(clause);
        if found.is_empty() {
            if index > 0 {
                description.push(clause.to_string());
            }
            continue;
        }

        if step.formula.is_none() {
            step.formula = found.formula;
        }
        if step.grouping.is_none() {
            step.grouping = found.grouping;
        }
        if step.null_guard.is_none() {
            step.null_guard = found.guard;
        }
    }
    step.description = join_description(description);

    step
}

fn parse_output(clauses: &[&str]) -> LineageStep {
    let first = clauses.first().copied().unwrap_or_default();

    let mut step = match OUTPUT_COLUMN.captures(first) {
        Some(caps) => {
            let table = caps[2].to_string();
            let field = caps[3].to_string();
            let label = trailing_text(&caps[4]).unwrap_or_else(|| format!("{}.{}", table, field));
            let mut step = LineageStep::new(StepType::Calculation, StepTag::Output, label);
            step.layer = parse_layer(&caps[1]);
            step.table = Some(table);
            step.field = Some(field);
            step
        }
        None => LineageStep::new(StepType::Calculation, StepTag::Output, first),
    };

    step.description = join_description(clauses.iter().skip(1).map(|c| c.to_string()).collect());
    step
}
