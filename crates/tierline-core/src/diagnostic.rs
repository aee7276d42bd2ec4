//! Diagnostic codes and finding reports
//!
//! IMPORTANT: Diagnostic codes are versioned and stable.
//! NEVER rename or remove codes - they are part of the public API.
//! Add new codes with new names only.

use serde::{Deserialize, Serialize};

use crate::schema::Layer;

/// Diagnostic code registry (v1)
///
/// These codes are STABLE and VERSIONED.
/// Do NOT rename or remove codes - only add new ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticCode {
    // Referential integrity (1xxx)
    /// Relationship target table no longer exists
    IntegrityMissingTable,

    /// Relationship target field no longer exists
    IntegrityMissingField,

    /// Derivation DAG contains a cycle
    DerivationCycle,

    // Metric contracts (2xxx)
    /// Metric has no name
    MetricMissingName,

    /// Metric has no formula
    MetricMissingFormula,

    /// Metric declares no source fields
    MetricMissingSourceFields,

    /// Metric source field is not on L1/L2
    MetricInvalidSourceLayer,

    /// Metric id collides with a built-in metric
    MetricReservedId,

    /// Formula override for a dimension the metric is not allowed at
    MetricOverrideOutsideAllowed,

    /// Metric source field does not resolve to a dictionary field
    MetricUnresolvedSourceField,

    /// Lineage narrative documented for a disallowed dimension
    MetricNarrativeOutsideAllowed,

    /// Metric names a dimension tag outside the hierarchy
    MetricUnknownDimension,

    // Import (4xxx)
    /// Metric id repeated within one import
    ImportDuplicateId,

    /// Source-field sheet row whose metric id matches no metrics row
    ImportOrphanSourceField,

    // Lineage and DDL (3xxx)
    /// Narrative segment with an unrecognized tag was skipped
    LineageUnknownTag,

    /// Table has no fields so no DDL statement was emitted
    DdlEmptyTable,

    // General warnings (9xxx)
    /// General informational message
    Info,

    /// General warning message
    Warning,
}

impl DiagnosticCode {
    /// Get the diagnostic code as a stable string identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IntegrityMissingTable => "INTEGRITY_MISSING_TABLE",
            Self::IntegrityMissingField => "INTEGRITY_MISSING_FIELD",
            Self::DerivationCycle => "DERIVATION_CYCLE",
            Self::MetricMissingName => "METRIC_MISSING_NAME",
            Self::MetricMissingFormula => "METRIC_MISSING_FORMULA",
            Self::MetricMissingSourceFields => "METRIC_MISSING_SOURCE_FIELDS",
            Self::MetricInvalidSourceLayer => "METRIC_INVALID_SOURCE_LAYER",
            Self::MetricReservedId => "METRIC_RESERVED_ID",
            Self::MetricOverrideOutsideAllowed => "METRIC_OVERRIDE_OUTSIDE_ALLOWED",
            Self::MetricUnresolvedSourceField => "METRIC_UNRESOLVED_SOURCE_FIELD",
            Self::MetricNarrativeOutsideAllowed => "METRIC_NARRATIVE_OUTSIDE_ALLOWED",
            Self::MetricUnknownDimension => "METRIC_UNKNOWN_DIMENSION",
            Self::ImportDuplicateId => "IMPORT_DUPLICATE_ID",
            Self::ImportOrphanSourceField => "IMPORT_ORPHAN_SOURCE_FIELD",
            Self::LineageUnknownTag => "LINEAGE_UNKNOWN_TAG",
            Self::DdlEmptyTable => "DDL_EMPTY_TABLE",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
        }
    }
}

impl std::fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Diagnostic severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Informational message
    Info,

    /// Warning - should be reviewed but not blocking
    Warn,

    /// Error - blocking issue
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warn => write!(f, "warn"),
            Self::Error => write!(f, "error"),
        }
    }
}

/// What a diagnostic is about
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layer: Option<Layer>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub metric_id: Option<String>,
}

impl Location {
    /// A table in a layer
    pub fn table(layer: Layer, table: impl Into<String>) -> Self {
        Self {
            layer: Some(layer),
            table: Some(table.into()),
            ..Default::default()
        }
    }

    /// A field of a table
    pub fn field(layer: Layer, table: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            ..Self::table(layer, table)
        }
    }

    /// A catalog metric
    pub fn metric(id: impl Into<String>) -> Self {
        Self {
            metric_id: Some(id.into()),
            ..Default::default()
        }
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if let Some(id) = &self.metric_id {
            parts.push(format!("metric {}", id));
        }
        let coords: Vec<String> = [
            self.layer.map(|l| l.to_string()),
            self.table.clone(),
            self.field.clone(),
        ]
        .into_iter()
        .flatten()
        .collect();
        if !coords.is_empty() {
            parts.push(coords.join("."));
        }
        write!(f, "{}", parts.join(" "))
    }
}

/// A diagnostic message with structured metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable diagnostic code
    pub code: DiagnosticCode,

    /// Severity level
    pub severity: Severity,

    /// Human-readable message
    pub message: String,

    /// Subject of the finding (best-effort)
    pub location: Option<Location>,

    /// Expected value (for comparison diagnostics)
    pub expected: Option<String>,

    /// Actual value (for comparison diagnostics)
    pub actual: Option<String>,

    /// Tables or metrics impacted by this issue
    pub impact: Vec<String>,
}

impl Diagnostic {
    /// Create a new diagnostic with minimal fields
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            location: None,
            expected: None,
            actual: None,
            impact: Vec::new(),
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }

    /// Set expected/actual values
    pub fn with_comparison(mut self, expected: impl Into<String>, actual: impl Into<String>) -> Self {
        self.expected = Some(expected.into());
        self.actual = Some(actual.into());
        self
    }

    /// Set impact
    pub fn with_impact(mut self, impact: Vec<String>) -> Self {
        self.impact = impact;
        self
    }
}
