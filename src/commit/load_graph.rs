// Copyright 2026 ModKit Contributors

//! Per-commit dependency graph (spec.md §3 `LoadGraph`, §4.4).
//!
//! The distilled spec models `LoadGraph` with explicit per-node waker state
//! and an `enqueue_count` that a commit's outer waker watches for zero. This
//! engine's `CommitOp` instead spawns one task per node via
//! [`crate::task::TaskSpawner`] and awaits all of them with
//! `futures::future::join_all` (see `commit_op.rs`), which is `enqueue_count`
//! reaching zero expressed as a native `async`/`await` barrier rather than a
//! hand-rolled waker count. `LoadGraph` itself is left as the thin node/edge
//! structure the rest of `LoadOp` needs: membership and dependency lookup.

use crate::error::Result;
use crate::graph::DependencyGraph;

/// DAG of modules being loaded in one commit. Dependencies-allowed-to-repeat
/// (spec.md §4.4: "a node may gain multiple edges to the same dependency
/// without behavioral impact"), unlike the deduped global `dep_graph`.
pub(crate) struct LoadGraph {
    graph: DependencyGraph,
}

impl LoadGraph {
    pub(crate) fn new() -> Self {
        LoadGraph {
            graph: DependencyGraph::new(false),
        }
    }

    pub(crate) fn add_node(&mut self, name: &str) {
        self.graph.add_node(name);
    }

    /// Add an edge `name -> dependency` ("name depends on dependency").
    /// Refuses (and leaves the graph unchanged) if it would close a cycle.
    pub(crate) fn add_edge(&mut self, name: &str, dependency: &str) -> Result<()> {
        self.graph.add_edge(name, dependency)
    }

    pub(crate) fn outgoing(&self, name: &str) -> Vec<String> {
        self.graph.outgoing(name).into_iter().map(String::from).collect()
    }
}
