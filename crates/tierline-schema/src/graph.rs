//! Table dependency graph construction and traversal
//!
//! Built from a dictionary snapshot's relationships. A relationship
//! `A.x -> B.y` means table A depends on table B: removing B breaks A.

use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use tierline_core::{Relationship, SchemaDictionary};

/// A relationship whose target does not resolve
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IntegrityViolation {
    pub relationship: Relationship,
    pub kind: ViolationKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    /// The target table (in the target layer) is gone
    MissingTable,

    /// The target table exists but lacks the target field
    MissingField,
}

/// Impact summary for a single table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableImpact {
    pub table: String,

    /// Tables that break if `table` is removed
    pub dependents: Vec<String>,

    /// Tables `table` relies on
    pub dependencies: Vec<String>,

    /// Relationships pointing at `table`
    pub incoming_edges: Vec<Relationship>,

    /// Relationships owned by `table`
    pub outgoing_edges: Vec<Relationship>,
}

/// Dependency graph with forward and reverse edge indexes
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    /// table -> relationships it owns (it references the target)
    outgoing: HashMap<String, Vec<Relationship>>,

    /// table -> relationships pointing at it
    incoming: HashMap<String, Vec<Relationship>>,

    /// (layer tag, table) -> field names, for integrity checks
    fields: HashMap<(String, String), HashSet<String>>,

    /// All table names known to the dictionary
    tables: BTreeSet<String>,
}

impl DependencyGraph {
    /// Build the graph from a dictionary snapshot
    pub fn from_dictionary(dictionary: &SchemaDictionary) -> Self {
        let mut outgoing: HashMap<String, Vec<Relationship>> = HashMap::new();
        let mut incoming: HashMap<String, Vec<Relationship>> = HashMap::new();

        for rel in dictionary.relationships() {
            outgoing
                .entry(rel.from_table.clone())
                .or_default()
                .push(rel.clone());
            incoming
                .entry(rel.to_table.clone())
                .or_default()
                .push(rel.clone());
        }

        let fields = dictionary
            .tables()
            .iter()
            .map(|t| {
                (
                    (t.layer().as_str().to_string(), t.name().to_string()),
                    t.fields().iter().map(|f| f.name.clone()).collect(),
                )
            })
            .collect();

        let tables = dictionary.tables().iter().map(|t| t.name().to_string()).collect();

        Self {
            outgoing,
            incoming,
            fields,
            tables,
        }
    }

    /// All tables known to the dictionary
    pub fn tables(&self) -> impl Iterator<Item = &String> {
        self.tables.iter()
    }

    /// Immediate dependents: tables referencing `table`
    pub fn dependents(&self, table: &str) -> Vec<String> {
        self.incoming
            .get(table)
            .map(|edges| {
                edges
                    .iter()
                    .map(|r| r.from_table.clone())
                    .filter(|t| t != table)
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Immediate dependencies: tables `table` references
    pub fn dependencies(&self, table: &str) -> Vec<String> {
        self.outgoing
            .get(table)
            .map(|edges| {
                edges
                    .iter()
                    .map(|r| r.to_table.clone())
                    .filter(|t| t != table)
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Dependents, dependencies and edges of a single table
    pub fn table_impact(&self, table: &str) -> TableImpact {
        TableImpact {
            table: table.to_string(),
            dependents: self.dependents(table),
            dependencies: self.dependencies(table),
            incoming_edges: self.incoming.get(table).cloned().unwrap_or_default(),
            outgoing_edges: self.outgoing.get(table).cloned().unwrap_or_default(),
        }
    }

    /// Union of the direct dependents of every table in a batch
    pub fn impacted_tables(&self, tables: &[String]) -> Vec<String> {
        let mut impacted = BTreeSet::new();
        for table in tables {
            impacted.extend(self.dependents(table));
        }
        impacted.into_iter().collect()
    }

    /// All transitive dependents (the blast radius of changing `table`)
    pub fn downstream(&self, table: &str) -> Vec<String> {
        self.closure(table, |t| self.dependents(t))
    }

    /// All transitive dependencies of `table`
    pub fn upstream(&self, table: &str) -> Vec<String> {
        self.closure(table, |t| self.dependencies(t))
    }

    fn closure<F>(&self, start: &str, next: F) -> Vec<String>
    where
        F: Fn(&str) -> Vec<String>,
    {
        let mut visited = HashSet::new();
        let mut queue: VecDeque<String> = next(start).into();
        let mut result = Vec::new();

        // BFS
        while let Some(current) = queue.pop_front() {
            if current == start || !visited.insert(current.clone()) {
                continue;
            }
            result.push(current.clone());

            for n in next(&current) {
                if !visited.contains(&n) {
                    queue.push_back(n);
                }
            }
        }

        result
    }

    /// Order in which a batch of tables can be removed safely
    ///
    /// Depth-first post-order over dependencies restricted to the batch,
    /// then reversed: a table always comes before anything in the batch it
    /// references. Terminates on cycles; the order is then unspecified.
    pub fn suggested_removal_order(&self, tables: &[String]) -> Vec<String> {
        let batch: HashSet<&str> = tables.iter().map(|t| t.as_str()).collect();
        let mut visited: HashSet<String> = HashSet::new();
        let mut order = Vec::new();

        for table in tables {
            self.visit_for_removal(table, &batch, &mut visited, &mut order);
        }

        order.reverse();
        order
    }

    fn visit_for_removal(
        &self,
        table: &str,
        batch: &HashSet<&str>,
        visited: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) {
        if !visited.insert(table.to_string()) {
            return;
        }

        for dependency in self.dependencies(table) {
            if batch.contains(dependency.as_str()) {
                self.visit_for_removal(&dependency, batch, visited, order);
            }
        }

        order.push(table.to_string());
    }

    /// Relationships whose target table or field no longer exists
    ///
    /// Detection only; repairing is a separate, explicit operation.
    pub fn validate_referential_integrity(&self) -> Vec<IntegrityViolation> {
        let mut violations = Vec::new();

        let mut owners: Vec<&String> = self.outgoing.keys().collect();
        owners.sort();

        for owner in owners {
            for rel in &self.outgoing[owner] {
                let key = (rel.to_layer.as_str().to_string(), rel.to_table.clone());
                let kind = match self.fields.get(&key) {
                    None => Some(ViolationKind::MissingTable),
                    Some(fields) if !fields.contains(&rel.to_field) => Some(ViolationKind::MissingField),
                    Some(_) => None,
                };

                if let Some(kind) = kind {
                    tracing::warn!(relationship = %rel.describe(), ?kind, "dangling relationship");
                    violations.push(IntegrityViolation {
                        relationship: rel.clone(),
                        kind,
                    });
                }
            }
        }

        violations
    }
}
