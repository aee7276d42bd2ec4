//! Error taxonomy
//!
//! Four classes of failure cross the crate boundaries:
//! - validation errors (malformed records, bad dimension requests)
//! - referential errors (dangling relationships, derivation cycles)
//! - environment errors (missing configuration, drivers, I/O)
//!
//! Lenient-parse conditions (unknown narrative tags, missing narratives,
//! tables without fields) are not errors and never appear here.

use crate::dimension::Dimension;
use crate::schema::Layer;

/// A record or request failed validation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("metric '{id}' has an empty name")]
    EmptyName { id: String },

    #[error("metric '{id}' has an empty formula")]
    EmptyFormula { id: String },

    #[error("metric '{id}' must declare at least one source field")]
    NoSourceFields { id: String },

    #[error("source field {table}.{field} uses layer {layer}; only L1 and L2 may feed a metric")]
    InvalidSourceLayer {
        layer: Layer,
        table: String,
        field: String,
    },

    #[error("source field is missing its {0}")]
    IncompleteSourceField(&'static str),

    #[error("metric id '{0}' collides with a reserved built-in metric")]
    ReservedId(String),

    #[error("metric id must not be empty")]
    EmptyId,

    #[error("metric id '{0}' appears more than once in the import")]
    DuplicateImportId(String),

    #[error("table name must not be empty")]
    EmptyTableName,

    #[error("field name must not be empty in table '{table}'")]
    EmptyFieldName { table: String },

    #[error("table '{table}' declares field '{field}' more than once")]
    DuplicateField { table: String, field: String },

    #[error("table '{0}' already exists")]
    DuplicateTable(String),

    #[error("table '{0}' does not exist")]
    UnknownTable(String),

    #[error("table '{table}' lives in {actual}, not {requested}")]
    LayerMismatch {
        table: String,
        actual: Layer,
        requested: Layer,
    },

    #[error("unknown layer tag '{0}' (expected L1, L2 or L3)")]
    UnknownLayer(String),

    #[error("unknown dimension tag '{0}' (expected facility, counterparty, desk, portfolio, lob or L3/L2/L1)")]
    UnknownDimension(String),

    #[error("metric '{metric_id}' is not defined at the {dimension} dimension")]
    UnsupportedDimension {
        metric_id: String,
        dimension: Dimension,
    },

    #[error("metric '{metric_id}' overrides the formula for {dimension}, which is not an allowed dimension")]
    OverrideOutsideAllowed {
        metric_id: String,
        dimension: Dimension,
    },
}

/// A relationship or derivation edge does not resolve
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReferentialError {
    #[error("relationship {from} references missing table {layer}.{table}")]
    MissingTargetTable {
        from: String,
        layer: Layer,
        table: String,
    },

    #[error("relationship {from} references missing field {layer}.{table}.{field}")]
    MissingTargetField {
        from: String,
        layer: Layer,
        table: String,
        field: String,
    },

    #[error("derivation cycle: {}", path.join(" -> "))]
    DerivationCycle { path: Vec<String> },

    #[error("cannot remove {tables:?}: still referenced by {dependents:?}")]
    DependentsOutsideBatch {
        tables: Vec<String>,
        dependents: Vec<String>,
    },
}

/// Failure of an external collaborator or its configuration
///
/// Distinguished from validation errors so callers can decide whether a
/// retry after fixing the environment makes sense.
#[derive(Debug, thiserror::Error)]
pub enum EnvironmentError {
    #[error("missing configuration: {what}")]
    MissingConfiguration { what: String, hint: String },

    #[error("optional driver '{driver}' is not available")]
    MissingDriver { driver: String, hint: String },

    #[error("execution failed: {message}")]
    Execution { message: String },

    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    #[error("could not decode {path}: {message}")]
    Decode { path: String, message: String },
}

impl EnvironmentError {
    /// Remediation hint shown next to the error
    pub fn hint(&self) -> &str {
        match self {
            Self::MissingConfiguration { hint, .. } | Self::MissingDriver { hint, .. } => hint,
            Self::Execution { .. } => "inspect the generated DDL and the database logs",
            Self::Io { .. } => "check that the path exists and is writable",
            Self::Decode { .. } => "check that the file is a valid JSON document of the expected shape",
        }
    }
}
