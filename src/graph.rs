// Copyright 2026 ModKit Contributors

//! Directed graph of named nodes with cycle detection and topological sort
//! (spec.md §4.4). Used both for the per-commit `LoadGraph` and the global
//! registry's `dep_graph`.

use std::collections::HashMap;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::error::{Error, Result};

/// A directed graph keyed by `String` node names, backed by `petgraph`.
///
/// Edges point from a node to its dependency ("imports"), matching spec.md's
/// `edges: NodeId -> NodeId (imports)`. `dedup_edges` controls whether
/// [`DependencyGraph::add_edge`] collapses repeat edges between the same
/// pair: the global `dep_graph` sets this `true` (spec.md §4.4: "For the
/// global graph, edges are deduped"), while a per-commit `LoadGraph` sets it
/// `false` ("a node may gain multiple edges to the same dependency without
/// behavioral impact").
#[derive(Debug)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    index_of: HashMap<String, NodeIndex>,
    dedup_edges: bool,
}

impl DependencyGraph {
    pub fn new(dedup_edges: bool) -> Self {
        DependencyGraph {
            graph: DiGraph::new(),
            index_of: HashMap::new(),
            dedup_edges,
        }
    }

    pub fn add_node(&mut self, name: impl Into<String>) -> NodeIndex {
        let name = name.into();
        if let Some(&idx) = self.index_of.get(&name) {
            return idx;
        }
        let idx = self.graph.add_node(name.clone());
        self.index_of.insert(name, idx);
        idx
    }

    pub fn node_index(&self, name: &str) -> Option<NodeIndex> {
        self.index_of.get(name).copied()
    }

    pub fn contains_node(&self, name: &str) -> bool {
        self.index_of.contains_key(name)
    }

    /// Add a directed edge `from -> to` ("from depends on to"). Refuses (and
    /// leaves the graph unchanged) if the edge would close a cycle, per
    /// spec.md §7's `CyclicDependency` policy.
    pub fn add_edge(&mut self, from: &str, to: &str) -> Result<()> {
        let from_idx = self.add_node(from);
        let to_idx = self.add_node(to);

        if self.dedup_edges && self.graph.find_edge(from_idx, to_idx).is_some() {
            return Ok(());
        }

        // Adding from->to would close a cycle iff `to` can already reach `from`.
        if self.path_exists_idx(to_idx, from_idx) {
            return Err(Error::CyclicDependency {
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        self.graph.add_edge(from_idx, to_idx, ());
        Ok(())
    }

    pub fn outgoing(&self, name: &str) -> Vec<&str> {
        let Some(&idx) = self.index_of.get(name) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| self.graph[e.target()].as_str())
            .collect()
    }

    pub fn incoming(&self, name: &str) -> Vec<&str> {
        let Some(&idx) = self.index_of.get(name) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| self.graph[e.source()].as_str())
            .collect()
    }

    pub fn path_exists(&self, from: &str, to: &str) -> bool {
        match (self.index_of.get(from), self.index_of.get(to)) {
            (Some(&f), Some(&t)) => self.path_exists_idx(f, t),
            _ => false,
        }
    }

    fn path_exists_idx(&self, from: NodeIndex, to: NodeIndex) -> bool {
        if from == to {
            return true;
        }
        petgraph::algo::has_path_connecting(&self.graph, from, to, None)
    }

    /// DFS-based cycle check with visited/on-stack marks (spec.md §4.4).
    pub fn is_cyclic(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }

    /// Topological sort, dependencies before dependents. Errors with
    /// [`Error::CyclicDependency`] if the graph is cyclic (should be
    /// unreachable given `add_edge` refuses cycle-closing edges, but this
    /// check is cheap insurance for graphs built by other means).
    pub fn sort_topological(&self) -> Result<Vec<&str>> {
        let sorted = petgraph::algo::toposort(&self.graph, None).map_err(|cycle| {
            let name = self.graph[cycle.node_id()].clone();
            Error::CyclicDependency {
                from: name.clone(),
                to: name,
            }
        })?;
        // toposort yields dependents-before-dependencies order (reverse
        // postorder on `from -> to = depends on`); reverse so dependencies
        // come first, matching spec.md's topological-order requirement.
        Ok(sorted
            .into_iter()
            .rev()
            .map(|idx| self.graph[idx].as_str())
            .collect())
    }

    pub fn remove_node(&mut self, name: &str) {
        if let Some(idx) = self.index_of.remove(name) {
            self.graph.remove_node(idx);
            // petgraph may reassign indices on removal; rebuild the map.
            self.index_of.clear();
            for idx in self.graph.node_indices() {
                self.index_of.insert(self.graph[idx].clone(), idx);
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.graph.node_indices().map(|idx| self.graph[idx].as_str())
    }
}
