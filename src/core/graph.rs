//! Field dependency graph
//!
//! Nodes are field names, edges point from a field to each field its formula
//! reads. Cycle detection is a DFS with a fully-visited memo and an on-path
//! set; ordering for bulk evaluation goes through petgraph's toposort.

use petgraph::algo::toposort;
use petgraph::graph::DiGraph;
use std::collections::{HashMap, HashSet};

use super::dependencies::base_names;
use crate::error::{FormulaError, FormulaResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DependencyGraph {
    edges: HashMap<String, Vec<String>>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(field name, formula text)` pairs. Related references are
    /// reduced to their entity label.
    pub fn from_formulas<'a, I>(formulas: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut graph = Self::new();
        for (name, expression) in formulas {
            graph.insert(name, base_names(expression));
        }
        graph
    }

    /// Set the dependency list of `field`, replacing any previous entry
    pub fn insert(&mut self, field: impl Into<String>, dependencies: Vec<String>) {
        self.edges.insert(field.into(), dependencies);
    }

    pub fn remove(&mut self, field: &str) -> Option<Vec<String>> {
        self.edges.remove(field)
    }

    pub fn dependencies_of(&self, field: &str) -> &[String] {
        self.edges.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, field: &str) -> bool {
        self.edges.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Whether a cycle is reachable from `start`, self-reference included
    pub fn has_cycle(&self, start: &str) -> bool {
        self.find_cycle(start).is_some()
    }

    /// The first cycle reachable from `start`, as a path whose first and
    /// last element are the same field (e.g. `A -> B -> A`).
    pub fn find_cycle(&self, start: &str) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut on_path = HashSet::new();
        let mut path = Vec::new();
        self.visit(start, &mut visited, &mut on_path, &mut path)
    }

    fn visit<'a>(
        &'a self,
        node: &'a str,
        visited: &mut HashSet<&'a str>,
        on_path: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        if on_path.contains(node) {
            let start = path.iter().position(|n| *n == node).unwrap_or(0);
            let mut cycle: Vec<String> = path[start..].iter().map(|n| n.to_string()).collect();
            cycle.push(node.to_string());
            return Some(cycle);
        }
        if visited.contains(node) {
            return None;
        }

        on_path.insert(node);
        path.push(node);
        for dependency in self.dependencies_of(node) {
            if let Some(cycle) = self.visit(dependency, visited, on_path, path) {
                return Some(cycle);
            }
        }
        path.pop();
        on_path.remove(node);
        visited.insert(node);
        None
    }

    /// Fields of this graph ordered so every field comes after the fields it
    /// depends on. Names that only appear as dependencies are not returned.
    pub fn calculation_order(&self) -> FormulaResult<Vec<String>> {
        let mut graph: DiGraph<&str, ()> = DiGraph::new();
        let mut node_indices = HashMap::new();

        let mut names: Vec<&str> = self.edges.keys().map(String::as_str).collect();
        names.sort_unstable();
        for name in &names {
            node_indices.insert(*name, graph.add_node(*name));
        }

        for name in &names {
            for dependency in self.dependencies_of(name) {
                let to_idx = node_indices[name];
                if let Some(&from_idx) = node_indices.get(dependency.as_str()) {
                    graph.add_edge(from_idx, to_idx, ());
                }
            }
        }

        let order = toposort(&graph, None).map_err(|cycle| {
            let field = graph[cycle.node_id()];
            let path = self
                .find_cycle(field)
                .map(|p| p.join(" -> "))
                .unwrap_or_else(|| field.to_string());
            FormulaError::CircularDependency(path)
        })?;

        Ok(order.into_iter().map(|idx| graph[idx].to_string()).collect())
    }
}

impl<K, V> FromIterator<(K, V)> for DependencyGraph
where
    K: Into<String>,
    V: IntoIterator,
    V::Item: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut graph = Self::new();
        for (field, deps) in iter {
            graph.insert(field, deps.into_iter().map(Into::into).collect());
        }
        graph
    }
}
