//! Tierline Core
//!
//! Domain model shared by every tierline crate: the schema dictionary,
//! the metric catalog, rollup dimensions, diagnostics and configuration.
//! Never rename diagnostic codes - they are part of the public API.

pub mod config;
pub mod derivation;
pub mod diagnostic;
pub mod dimension;
pub mod error;
pub mod metric;
pub mod report;
pub mod schema;

pub use config::{Config, ConfigError, DdlConfig, SeverityThreshold};
pub use derivation::DerivationDag;
pub use diagnostic::{Diagnostic, DiagnosticCode, Location, Severity};
pub use dimension::Dimension;
pub use error::{EnvironmentError, ReferentialError, ValidationError};
pub use metric::{
    validate_record, DimensionFormula, Metric, MetricBuilder, MetricCatalog, MetricRecord, SourceField,
    SourceFieldRecord,
};
pub use report::{Report, ReportSummary, ReportVersion};
pub use schema::{Field, FkTarget, Layer, PkFk, Relationship, SchemaDictionary, Table, TableRecord};
