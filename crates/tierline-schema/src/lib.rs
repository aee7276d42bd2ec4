//! Schema consistency for the tierline dictionary
//!
//! - Table dependency graph (impact, removal order, referential integrity)
//! - Storage type inference
//! - DDL text generation

pub mod ddl;
pub mod graph;
pub mod storage;

pub use ddl::{DdlBundle, DdlGenerator, LayerDdl};
pub use graph::{DependencyGraph, IntegrityViolation, TableImpact, ViolationKind};
pub use storage::{infer_storage_type, parse_data_type, InferenceRule, StorageType};
