//! The foreign-key relationship graph.
//!
//! Construction validates that no multi-table cycle exists; self-referential
//! foreign keys are permitted and resolved by the traversal's visited set.
//! All iteration orders are total functions of the schema, so error messages
//! and sort results are reproducible.

use std::collections::{BTreeMap, BTreeSet};

use crate::db::{ForeignKey, Metadata};
use crate::error::{Error, Result};

/// An immutable view over extracted metadata with graph algorithms on top.
#[derive(Debug)]
pub struct Graph {
    parents: BTreeMap<String, Vec<ForeignKey>>,
    children: BTreeMap<String, Vec<ForeignKey>>,
    primary_key: BTreeMap<String, Vec<String>>,
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Gray,
    Black,
}

impl Graph {
    /// Build a graph from metadata, failing when the schema contains a
    /// multi-table foreign-key cycle.
    pub fn build(metadata: Metadata) -> Result<Self> {
        let graph = Self {
            parents: metadata.parents,
            children: metadata.children,
            primary_key: metadata.primary_key,
        };
        graph.detect_multi_table_cycles()?;
        Ok(graph)
    }

    /// All foreign keys where `table` is the child. Empty when none.
    pub fn parents_of(&self, table: &str) -> &[ForeignKey] {
        self.parents.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// All foreign keys where `table` is the parent. Empty when none.
    pub fn children_of(&self, table: &str) -> &[ForeignKey] {
        self.children.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Primary-key columns of `table` in ordinal order. Empty when the
    /// table has no primary key; callers decide whether that is fatal.
    pub fn primary_key_columns(&self, table: &str) -> &[String] {
        self.primary_key.get(table).map(Vec::as_slice).unwrap_or(&[])
    }

    fn all_tables(&self) -> BTreeSet<String> {
        self.parents
            .keys()
            .chain(self.children.keys())
            .cloned()
            .collect()
    }

    /// Depth-first search with three-color node state over child edges.
    /// Rediscovering an in-progress node means a cycle; the path is rebuilt
    /// from parent pointers captured during descent so the error names every
    /// table on the cycle in traversal order.
    fn detect_multi_table_cycles(&self) -> Result<()> {
        let tables = self.all_tables();
        let mut color: BTreeMap<String, Color> =
            tables.iter().map(|t| (t.clone(), Color::White)).collect();
        let mut parent: BTreeMap<String, String> = BTreeMap::new();

        for table in &tables {
            if color[table] == Color::White {
                self.dfs(table, &mut color, &mut parent)?;
            }
        }

        Ok(())
    }

    fn dfs(
        &self,
        table: &str,
        color: &mut BTreeMap<String, Color>,
        parent: &mut BTreeMap<String, String>,
    ) -> Result<()> {
        color.insert(table.to_string(), Color::Gray);

        for fk in self.children_of(table) {
            let child = fk.child_table.as_str();

            if child == table {
                continue;
            }

            match color.get(child).copied().unwrap_or(Color::White) {
                Color::Gray => {
                    let mut cycle = vec![child.to_string()];
                    let mut current = table.to_string();
                    while current != child {
                        cycle.push(current.clone());
                        match parent.get(&current) {
                            Some(p) => current = p.clone(),
                            None => break,
                        }
                    }
                    cycle.push(child.to_string());
                    cycle.reverse();

                    return Err(Error::Schema(format!(
                        "cyclic foreign keys detected: {}; use --parents or --children to avoid cycles",
                        cycle.join(" -> ")
                    )));
                }
                Color::White => {
                    parent.insert(child.to_string(), table.to_string());
                    self.dfs(child, color, parent)?;
                }
                Color::Black => {}
            }
        }

        color.insert(table.to_string(), Color::Black);
        Ok(())
    }

    /// Kahn's algorithm over the subgraph induced by `tables`, restricted to
    /// edges whose endpoints are both in the set. Self-loops are dropped.
    /// The ready queue pops lexicographically, so the result is a total
    /// function of the input set and the graph.
    pub fn topological_sort(&self, tables: &[String]) -> Result<Vec<String>> {
        let table_set: BTreeSet<&str> = tables.iter().map(String::as_str).collect();
        let mut in_degree: BTreeMap<&str, usize> =
            table_set.iter().map(|t| (*t, 0)).collect();
        let mut adjacency: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for &table in &table_set {
            for fk in self.parents_of(table) {
                if fk.parent_table == table {
                    continue;
                }
                if let Some(&parent) = table_set.get(fk.parent_table.as_str()) {
                    adjacency.entry(parent).or_default().push(table);
                    *in_degree.entry(table).or_default() += 1;
                }
            }
        }

        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(table, _)| *table)
            .collect();

        let mut result = Vec::with_capacity(table_set.len());

        while let Some(current) = ready.iter().next().copied() {
            ready.remove(current);
            result.push(current.to_string());

            if let Some(children) = adjacency.get(current) {
                for &child in children {
                    if let Some(degree) = in_degree.get_mut(child) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.insert(child);
                        }
                    }
                }
            }
        }

        if result.len() != table_set.len() {
            let remaining: Vec<&str> = in_degree
                .iter()
                .filter(|(_, degree)| **degree > 0)
                .map(|(table, _)| *table)
                .collect();
            return Err(Error::Emit(format!(
                "cycle detected in table dependencies involving: {}",
                remaining.join(", ")
            )));
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fk(child: &str, child_col: &str, parent: &str, parent_col: &str) -> ForeignKey {
        ForeignKey {
            child_table: child.to_string(),
            child_column: child_col.to_string(),
            parent_table: parent.to_string(),
            parent_column: parent_col.to_string(),
        }
    }

    fn metadata(fks: &[ForeignKey]) -> Metadata {
        let mut metadata = Metadata::default();
        for fk in fks {
            metadata.insert_foreign_key(fk.clone());
        }
        metadata
    }

    #[test]
    fn test_build_accepts_acyclic_schema() {
        let graph = Graph::build(metadata(&[
            fk("tasks", "project_id", "projects", "id"),
            fk("projects", "org_id", "organizations", "id"),
        ]))
        .unwrap();

        assert_eq!(graph.parents_of("tasks").len(), 1);
        assert_eq!(graph.children_of("organizations").len(), 1);
        assert!(graph.parents_of("organizations").is_empty());
    }

    #[test]
    fn test_build_accepts_self_referential_fk() {
        assert!(Graph::build(metadata(&[fk("users", "manager_id", "users", "id")])).is_ok());
    }

    #[test]
    fn test_build_rejects_two_table_cycle() {
        let err = Graph::build(metadata(&[
            fk("a", "b_id", "b", "id"),
            fk("b", "a_id", "a", "id"),
        ]))
        .unwrap_err();

        let message = err.to_string();
        assert!(message.starts_with("schema: cyclic foreign keys detected"), "{message}");
        assert!(message.contains('a') && message.contains('b'));
    }

    #[test]
    fn test_topological_sort_parents_first() {
        let graph = Graph::build(metadata(&[
            fk("tasks", "project_id", "projects", "id"),
            fk("projects", "org_id", "organizations", "id"),
            fk("tasks", "assigned_to", "users", "id"),
            fk("users", "org_id", "organizations", "id"),
        ]))
        .unwrap();

        let tables: Vec<String> = ["organizations", "projects", "tasks", "users"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let sorted = graph.topological_sort(&tables).unwrap();

        let pos = |t: &str| sorted.iter().position(|s| s == t).unwrap();
        assert!(pos("organizations") < pos("projects"));
        assert!(pos("organizations") < pos("users"));
        assert!(pos("projects") < pos("tasks"));
        assert!(pos("users") < pos("tasks"));
    }

    #[test]
    fn test_topological_sort_restricted_to_subset() {
        let graph = Graph::build(metadata(&[
            fk("tasks", "project_id", "projects", "id"),
            fk("projects", "org_id", "organizations", "id"),
        ]))
        .unwrap();

        // projects' parent is outside the subset, so no edge constrains it.
        let tables: Vec<String> = ["projects", "tasks"].iter().map(|s| s.to_string()).collect();
        assert_eq!(graph.topological_sort(&tables).unwrap(), vec!["projects", "tasks"]);
    }

    #[test]
    fn test_topological_sort_ties_break_lexicographically() {
        let graph = Graph::build(metadata(&[
            fk("b", "root_id", "root", "id"),
            fk("a", "root_id", "root", "id"),
        ]))
        .unwrap();

        let tables: Vec<String> = ["a", "b", "root"].iter().map(|s| s.to_string()).collect();
        assert_eq!(graph.topological_sort(&tables).unwrap(), vec!["root", "a", "b"]);
    }

    #[test]
    fn test_topological_sort_self_loop_dropped() {
        let graph = Graph::build(metadata(&[fk("users", "manager_id", "users", "id")])).unwrap();
        let tables = vec!["users".to_string()];
        assert_eq!(graph.topological_sort(&tables).unwrap(), vec!["users"]);
    }
}
