//! L3 derivation DAG
//!
//! Maps an L3 table to the L3 tables it reads from. Writes are checked for
//! cycles so topological consumers always terminate.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::error::ReferentialError;

/// Derivation edges: table -> tables it reads from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DerivationDag {
    edges: BTreeMap<String, Vec<String>>,
}

impl DerivationDag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables `table` reads from
    pub fn sources_of(&self, table: &str) -> &[String] {
        self.edges.get(table).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Tables that read from `table`
    pub fn consumers_of(&self, table: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(_, sources)| sources.iter().any(|s| s == table))
            .map(|(t, _)| t.as_str())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Set the sources of `table`, rejecting the write if it closes a cycle
    pub fn insert(&mut self, table: impl Into<String>, sources: Vec<String>) -> Result<(), ReferentialError> {
        let table = table.into();
        let previous = self.edges.insert(table.clone(), sources);

        if let Some(path) = self.find_cycle() {
            match previous {
                Some(old) => {
                    self.edges.insert(table, old);
                }
                None => {
                    self.edges.remove(&table);
                }
            }
            return Err(ReferentialError::DerivationCycle { path });
        }

        Ok(())
    }

    /// Drop a table's own entry
    pub fn remove(&mut self, table: &str) -> Option<Vec<String>> {
        self.edges.remove(table)
    }

    /// First cycle found, as a closed path (`a -> b -> a`)
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        let mut done: HashSet<&str> = HashSet::new();

        for start in self.edges.keys() {
            let mut stack: Vec<&str> = Vec::new();
            if let Some(path) = self.visit(start, &mut stack, &mut done) {
                return Some(path);
            }
        }

        None
    }

    fn visit<'a>(
        &'a self,
        node: &'a str,
        stack: &mut Vec<&'a str>,
        done: &mut HashSet<&'a str>,
    ) -> Option<Vec<String>> {
        if let Some(pos) = stack.iter().position(|n| *n == node) {
            let mut path: Vec<String> = stack[pos..].iter().map(|s| s.to_string()).collect();
            path.push(node.to_string());
            return Some(path);
        }
        if done.contains(node) {
            return None;
        }

        stack.push(node);
        for source in self.sources_of(node) {
            if let Some(path) = self.visit(source, stack, done) {
                return Some(path);
            }
        }
        stack.pop();
        done.insert(node);

        None
    }

    /// Build order: every table appears after the tables it reads from
    pub fn topological_order(&self) -> Result<Vec<String>, ReferentialError> {
        if let Some(path) = self.find_cycle() {
            return Err(ReferentialError::DerivationCycle { path });
        }

        let mut nodes: BTreeSet<&str> = BTreeSet::new();
        for (table, sources) in &self.edges {
            nodes.insert(table);
            nodes.extend(sources.iter().map(|s| s.as_str()));
        }

        let mut visited = HashSet::new();
        let mut order = Vec::new();
        for node in nodes {
            self.post_order(node, &mut visited, &mut order);
        }

        Ok(order)
    }

    fn post_order<'a>(&'a self, node: &'a str, visited: &mut HashSet<&'a str>, order: &mut Vec<String>) {
        if !visited.insert(node) {
            return;
        }
        for source in self.sources_of(node) {
            self.post_order(source, visited, order);
        }
        order.push(node.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_rejected_at_write_time() {
        let mut dag = DerivationDag::new();
        dag.insert("exposure_summary", vec!["exposure_detail".into()]).unwrap();
        dag.insert("exposure_detail", vec!["exposure_base".into()]).unwrap();

        let err = dag
            .insert("exposure_base", vec!["exposure_summary".into()])
            .unwrap_err();

        match err {
            ReferentialError::DerivationCycle { path } => {
                assert_eq!(path.first(), path.last());
                assert!(path.contains(&"exposure_base".to_string()));
            }
            other => panic!("unexpected error: {other:?}"),
        }

        // the rejected write must not stick
        assert!(dag.sources_of("exposure_base").is_empty());
        assert!(dag.find_cycle().is_none());
    }

    #[test]
    fn rejected_overwrite_restores_previous_sources() {
        let mut dag = DerivationDag::new();
        dag.insert("a", vec!["b".into()]).unwrap();
        dag.insert("b", vec!["c".into()]).unwrap();

        assert!(dag.insert("b", vec!["a".into()]).is_err());
        assert_eq!(dag.sources_of("b"), ["c".to_string()]);
    }

    #[test]
    fn topological_order_puts_sources_first() {
        let mut dag = DerivationDag::new();
        dag.insert("lob_rollup", vec!["desk_rollup".into()]).unwrap();
        dag.insert("desk_rollup", vec!["facility_metrics".into()]).unwrap();

        let order = dag.topological_order().unwrap();
        let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
        assert!(pos("facility_metrics") < pos("desk_rollup"));
        assert!(pos("desk_rollup") < pos("lob_rollup"));
    }

    #[test]
    fn loaded_cycle_is_detected() {
        let dag: DerivationDag = serde_json::from_str(r#"{"a": ["b"], "b": ["a"]}"#).unwrap();
        assert!(dag.find_cycle().is_some());
        assert!(dag.topological_order().is_err());
        assert_eq!(dag.consumers_of("a"), vec!["b"]);
    }
}
