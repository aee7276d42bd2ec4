//! Dictionary mutations
//!
//! A change is applied to a copy of the dictionary. On success the caller gets
//! the new snapshot plus the DDL needed to move a database from the old one to
//! it; on failure the original is untouched.

use serde::Serialize;
use std::collections::BTreeSet;

use tierline_core::{Field, Layer, ReferentialError, Relationship, SchemaDictionary, Table, ValidationError};
use tierline_schema::{infer_storage_type, DdlGenerator, DependencyGraph, IntegrityViolation, LayerDdl};

use crate::error::EngineError;

/// One edit to the schema dictionary
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaChange {
    AddTable(Table),
    /// Replace a table's fields and category; layer and name must match
    UpdateTable(Table),
    AddField { table: String, field: Field },
    /// Remove a batch of tables; refused while anything outside the batch depends on it
    RemoveTables(Vec<String>),
    AddRelationship(Relationship),
    RemoveRelationship(Relationship),
    SetDerivation { table: String, sources: Vec<String> },
}

impl SchemaChange {
    pub fn describe(&self) -> String {
        match self {
            Self::AddTable(t) => format!("add table {}", t.qualified_name()),
            Self::UpdateTable(t) => format!("update table {}", t.qualified_name()),
            Self::AddField { table, field } => format!("add field {}.{}", table, field.name),
            Self::RemoveTables(tables) => format!("remove tables {}", tables.join(", ")),
            Self::AddRelationship(r) => format!("add relationship {}", r.describe()),
            Self::RemoveRelationship(r) => format!("remove relationship {}", r.describe()),
            Self::SetDerivation { table, .. } => format!("set derivation of {}", table),
        }
    }
}

/// What a successful change produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChangeOutcome {
    /// Incremental statements (CREATE / ALTER / DROP) for this change only
    pub statements: String,

    /// Full DDL of every layer the change touched, regenerated from the new snapshot
    pub regenerated: Vec<LayerDdl>,

    /// Tables that reference a changed table
    pub impacted_tables: Vec<String>,

    /// Dangling relationships the change introduced
    pub new_violations: Vec<IntegrityViolation>,
}

fn key_names(table: &Table) -> Vec<&str> {
    table.primary_key().iter().map(|f| f.name.as_str()).collect()
}

/// Apply `change` to a copy of `dictionary`
///
/// For `UpdateTable`, `statements` covers added and dropped columns, columns
/// whose storage type changed, and a changed primary key.
pub fn apply_change(
    dictionary: &SchemaDictionary,
    change: SchemaChange,
    generator: &DdlGenerator,
) -> Result<(SchemaDictionary, ChangeOutcome), EngineError> {
    let description = change.describe();
    let before = DependencyGraph::from_dictionary(dictionary);
    let mut next = dictionary.clone();
    let mut layers = BTreeSet::new();
    let mut impacted = Vec::new();

    let statements = match change {
        SchemaChange::AddTable(table) => {
            layers.insert(table.layer());
            let sql = generator.create_table(&table);
            next.add_table(table)?;
            sql
        }
        SchemaChange::UpdateTable(table) => {
            let current = dictionary
                .table(table.name())
                .ok_or_else(|| ValidationError::UnknownTable(table.name().to_string()))?;
            if current.layer() != table.layer() {
                // Moving a table across layers is a remove followed by an add
                return Err(ValidationError::LayerMismatch {
                    table: table.name().to_string(),
                    actual: current.layer(),
                    requested: table.layer(),
                }
                .into());
            }

            let mut sql = String::new();
            for field in table.fields() {
                if current.field(&field.name).is_none() {
                    sql.push_str(&generator.add_column(&table, field));
                }
            }
            for field in table.fields() {
                let retyped = current
                    .field(&field.name)
                    .is_some_and(|existing| infer_storage_type(existing).0 != infer_storage_type(field).0);
                if retyped {
                    sql.push_str(&generator.alter_column_type(&table, field));
                }
            }
            if key_names(current) != key_names(&table) {
                sql.push_str(&generator.replace_primary_key(&table));
            }
            for field in current.fields() {
                if table.field(&field.name).is_none() {
                    sql.push_str(&generator.drop_column(&table, &field.name));
                }
            }

            layers.insert(table.layer());
            impacted = before.dependents(table.name());
            next.replace_table(table)?;
            sql
        }
        SchemaChange::AddField { table, field } => {
            let mut updated = dictionary
                .table(&table)
                .cloned()
                .ok_or_else(|| ValidationError::UnknownTable(table.clone()))?;
            updated.add_field(field.clone())?;

            layers.insert(updated.layer());
            impacted = before.dependents(&table);
            let sql = generator.add_column(&updated, &field);
            next.replace_table(updated)?;
            sql
        }
        SchemaChange::RemoveTables(tables) => {
            for name in &tables {
                let table = dictionary
                    .table(name)
                    .ok_or_else(|| ValidationError::UnknownTable(name.clone()))?;
                layers.insert(table.layer());
            }

            let batch: BTreeSet<&str> = tables.iter().map(|t| t.as_str()).collect();
            let mut outside: BTreeSet<String> = before
                .impacted_tables(&tables)
                .into_iter()
                .filter(|t| !batch.contains(t.as_str()))
                .collect();
            for name in &tables {
                outside.extend(
                    dictionary
                        .derivation()
                        .consumers_of(name)
                        .into_iter()
                        .filter(|t| !batch.contains(t))
                        .map(|t| t.to_string()),
                );
            }

            if !outside.is_empty() {
                return Err(ReferentialError::DependentsOutsideBatch {
                    tables,
                    dependents: outside.into_iter().collect(),
                }
                .into());
            }

            let order = before.suggested_removal_order(&tables);
            let sql = generator.drop_tables(dictionary, &order);
            for name in &order {
                next.remove_table(name)?;
            }
            sql
        }
        SchemaChange::AddRelationship(relationship) => {
            layers.insert(relationship.from_layer);
            impacted = vec![relationship.from_table.clone()];
            next.add_relationship(relationship)?;
            String::new()
        }
        SchemaChange::RemoveRelationship(relationship) => {
            if next.remove_relationship(&relationship) {
                layers.insert(relationship.from_layer);
                impacted = vec![relationship.from_table.clone()];
            } else {
                tracing::debug!(relationship = %relationship.describe(), "relationship not present, nothing to remove");
            }
            String::new()
        }
        SchemaChange::SetDerivation { table, sources } => {
            if dictionary.table(&table).is_none() {
                return Err(ValidationError::UnknownTable(table).into());
            }
            next.derivation_mut().insert(table, sources)?;
            String::new()
        }
    };

    let before_violations = before.validate_referential_integrity();
    let new_violations = DependencyGraph::from_dictionary(&next)
        .validate_referential_integrity()
        .into_iter()
        .filter(|v| !before_violations.contains(v))
        .collect::<Vec<_>>();

    let regenerated = layers
        .into_iter()
        .map(|layer: Layer| generator.layer_ddl(&next, layer))
        .collect();

    tracing::info!(change = %description, impacted = impacted.len(), "applied schema change");

    Ok((
        next,
        ChangeOutcome {
            statements,
            regenerated,
            impacted_tables: impacted,
            new_violations,
        },
    ))
}

/// Drop exactly the relationships whose target does not resolve
///
/// Returns the repaired copy and what was removed. Never called implicitly.
pub fn repair_referential_integrity(dictionary: &SchemaDictionary) -> (SchemaDictionary, Vec<IntegrityViolation>) {
    let violations = DependencyGraph::from_dictionary(dictionary).validate_referential_integrity();
    let mut repaired = dictionary.clone();

    for violation in &violations {
        repaired.remove_relationship(&violation.relationship);
    }

    if !violations.is_empty() {
        tracing::info!(removed = violations.len(), "removed dangling relationships");
    }

    (repaired, violations)
}
