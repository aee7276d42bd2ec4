//! Tierline Engine
//!
//! Operations over dictionary and catalog snapshots: consistency checks,
//! schema changes with their DDL, metric import, value explanation, and
//! the store / sink seams used to persist results.

pub mod change;
pub mod check;
pub mod error;
pub mod explain;
pub mod import;
pub mod store;

pub use change::{apply_change, repair_referential_integrity, ChangeOutcome, SchemaChange};
pub use check::{build_report, check_dictionary, check_metrics, validation_diagnostic};
pub use error::EngineError;
pub use explain::{explain, ExplainRequest, ExplainResponse, MetricIdentity, QualityStatus};
pub use import::{
    import_metrics, ImportOutcome, ImportRejection, ImportSource, MetricImportRow, MetricSheetRow, OrphanSourceField,
    SourceFieldSheetRow, TabularExtract,
};
pub use store::{
    DatabaseDdlSink, DdlSink, DictionaryStore, DirectoryDdlSink, JsonDictionaryStore, JsonMetricStore, MetricStore,
    SinkStatus,
};
