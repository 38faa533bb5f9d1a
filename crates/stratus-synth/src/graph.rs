//! Dependency graph management using `petgraph`.
//!
//! Builds a directed graph from the references and explicit dependencies
//! between resources (or between stacks) and resolves a deployment order.

use std::collections::{BTreeSet, HashMap};

use petgraph::graph::{DiGraph, NodeIndex};
use stratus_common::error::{Result, StratusError};

/// A dependency graph of named items.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    /// Internal petgraph representation.
    graph: DiGraph<String, ()>,
    /// Name to node lookup.
    indices: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Creates an empty dependency graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node, or returns the existing one with the same name.
    pub fn add_node(&mut self, name: impl Into<String>) -> NodeIndex {
        let name = name.into();
        if let Some(&idx) = self.indices.get(&name) {
            return idx;
        }
        let idx = self.graph.add_node(name.clone());
        let _ = self.indices.insert(name, idx);
        idx
    }

    /// Adds a dependency edge: `dependent` depends on `dependency`.
    ///
    /// The graph edge points from `dependency` to `dependent`
    /// so that topological sort yields dependencies first. Missing nodes
    /// are created; self-dependencies are ignored.
    pub fn add_dependency(&mut self, dependent: &str, dependency: &str) {
        if dependent == dependency {
            return;
        }
        let from = self.add_node(dependency);
        let to = self.add_node(dependent);
        if self.graph.find_edge(from, to).is_none() {
            let _ = self.graph.add_edge(from, to, ());
        }
    }

    /// Returns the names `name` directly depends on, sorted.
    #[must_use]
    pub fn dependencies_of(&self, name: &str) -> Vec<String> {
        let Some(&idx) = self.indices.get(name) else {
            return Vec::new();
        };
        let mut deps: Vec<String> = self
            .graph
            .neighbors_directed(idx, petgraph::Direction::Incoming)
            .filter_map(|n| self.graph.node_weight(n).cloned())
            .collect();
        deps.sort();
        deps
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns `true` if the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Returns a topological ordering of the nodes.
    ///
    /// Dependencies appear before the items that depend on them. Among
    /// items that are ready at the same time, the one added first comes
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`StratusError::CyclicDependency`] naming the members of a
    /// cycle if one exists.
    pub fn resolve_order(&self) -> Result<Vec<String>> {
        let mut in_degree: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| {
                self.graph
                    .neighbors_directed(idx, petgraph::Direction::Incoming)
                    .count()
            })
            .collect();
        let mut ready: BTreeSet<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|idx| in_degree[idx.index()] == 0)
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(idx) = ready.pop_first() {
            order.push(self.graph[idx].clone());
            for next in self.graph.neighbors_directed(idx, petgraph::Direction::Outgoing) {
                let degree = &mut in_degree[next.index()];
                *degree -= 1;
                if *degree == 0 {
                    let _ = ready.insert(next);
                }
            }
        }

        if order.len() == self.graph.node_count() {
            Ok(order)
        } else {
            Err(StratusError::CyclicDependency {
                members: self.cycle_members(),
            })
        }
    }

    fn cycle_members(&self) -> Vec<String> {
        let mut members: Vec<String> = petgraph::algo::tarjan_scc(&self.graph)
            .into_iter()
            .find(|scc| scc.len() > 1)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|idx| self.graph.node_weight(idx).cloned())
            .collect();
        members.sort();
        members
    }
}
