// Copyright 2026 ModKit Contributors

//! Commit outer state machine (spec.md §4.5.1, §4.5.2, §4.5.4).

use std::sync::Arc;

use tokio::sync::Mutex as AsyncMutex;

use crate::commit::load_graph::LoadGraph;
use crate::commit::load_op::run_load_op;
use crate::error::Result;
use crate::loading_set::LoadingSet;
use crate::registry::GlobalRegistry;
use crate::symbol::SymbolKey;
use crate::task::TaskSpawner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommitState {
    AcquireSerialization,
    SpawnAndWait,
    Unwind,
}

/// Drives commits against a [`GlobalRegistry`], serialized so at most one
/// runs at a time (spec.md §4.5.1). The serialization itself is a plain
/// `tokio::sync::Mutex<()>`: contenders park on it in FIFO order and the
/// guard's drop on `Unwind` is "release serialization, wake the next queued
/// commit" (spec.md §4.5.4) expressed natively rather than via a hand-rolled
/// waker list.
pub struct CommitEngine {
    registry: Arc<GlobalRegistry>,
    spawner: Arc<dyn TaskSpawner>,
    serialization: AsyncMutex<()>,
}

impl CommitEngine {
    pub fn new(registry: Arc<GlobalRegistry>, spawner: Arc<dyn TaskSpawner>) -> Self {
        CommitEngine {
            registry,
            spawner,
            serialization: AsyncMutex::new(()),
        }
    }

    pub fn registry(&self) -> &Arc<GlobalRegistry> {
        &self.registry
    }

    /// spec.md §6 `commit() -> future<Fallible<()>>`. Resolves `Ok(())` once
    /// the commit itself has run to completion; individual modules may still
    /// have ended in `Err` (spec.md §7) — observe those via callbacks
    /// registered on `set` before calling this.
    pub async fn commit(&self, set: &LoadingSet) -> Result<()> {
        let mut state = CommitState::AcquireSerialization;
        tracing::trace!(?state, "commit: waiting for serialization");
        let _serialization = self.serialization.lock().await;

        state = CommitState::SpawnAndWait;
        tracing::trace!(?state, "commit: spawning missing tasks");
        let (graph, final_nodes) = spawn_missing_tasks(set, &self.registry).await;
        set.clear_dirty();

        let graph = Arc::new(graph);
        let mut handles = Vec::with_capacity(final_nodes.len());
        for name in final_nodes {
            let fut = run_load_op(name, set.clone(), self.registry.clone(), graph.clone());
            handles.push(self.spawner.spawn(Box::pin(fut)));
        }
        futures::future::join_all(handles).await;

        state = CommitState::Unwind;
        tracing::trace!(?state, "commit: unwind");
        Ok(())
    }
}

/// spec.md §4.5.2. Runs whenever the set is dirty. Validates every
/// still-`Unloaded` module against global and intra-set state, creates a
/// `LoadGraph` node for the ones that pass, then wires intra-set import
/// edges in a second pass. Returns the graph plus the names admitted for a
/// `LoadOp`; everything else has already been marked `Err` on `set`.
async fn spawn_missing_tasks(set: &LoadingSet, registry: &GlobalRegistry) -> (LoadGraph, Vec<String>) {
    let mut graph = LoadGraph::new();
    let candidates = set.unloaded_module_names();
    let mut admitted = Vec::new();

    for name in &candidates {
        let Some(handle) = set.handle_of(name) else { continue };
        let export = &handle.export;

        // Step 1: an instance with this name must not already be loaded globally.
        if registry.contains_instance(name) {
            tracing::debug!(module = %name, "spawn_missing_tasks: name already globally loaded");
            set.mark_err(name).await;
            continue;
        }

        // Step 2: every symbol_import needs an intra-set non-Err provider or
        // a compatible global symbol.
        let mut satisfiable = true;
        for imp in &export.symbol_imports {
            let key = SymbolKey::new(imp.name.clone(), imp.namespace.clone());
            let has_local = set.resolved_symbol(&key, &imp.version).is_some();
            let has_global = registry.resolved_symbol(&key, &imp.version).is_some();
            if !has_local && !has_global {
                satisfiable = false;
                break;
            }
        }
        if !satisfiable {
            tracing::debug!(module = %name, "spawn_missing_tasks: unsatisfiable import");
            set.mark_err(name).await;
            continue;
        }

        // Step 3: static and dynamic exports must not already be globally present.
        let already_exported = export
            .symbol_exports
            .iter()
            .map(|s| SymbolKey::new(s.name.clone(), s.namespace.clone()))
            .chain(
                export
                    .dynamic_symbol_exports
                    .iter()
                    .map(|s| SymbolKey::new(s.name.clone(), s.namespace.clone())),
            )
            .any(|key| registry.symbol_is_present(&key));
        if already_exported {
            tracing::debug!(module = %name, "spawn_missing_tasks: export already globally present");
            set.mark_err(name).await;
            continue;
        }

        // Step 4: create the node.
        graph.add_node(name);
        admitted.push(name.clone());
    }

    // Second pass: wire intra-set import edges. A node whose edge would
    // close a cycle is marked `Err` and excluded from the final node set;
    // its graph node is left in place so nodes that already hold an edge to
    // it can still observe its terminal status in `LoadOp` S0 (spec.md §4.5.3).
    let mut final_nodes = Vec::new();
    for name in &admitted {
        let Some(handle) = set.handle_of(name) else { continue };
        let mut ok = true;
        for imp in &handle.export.symbol_imports {
            let key = SymbolKey::new(imp.name.clone(), imp.namespace.clone());
            if let Some(sym_ref) = set.resolved_symbol(&key, &imp.version) {
                if graph.add_edge(name, &sym_ref.owner).is_err() {
                    ok = false;
                    break;
                }
            }
        }
        if ok {
            final_nodes.push(name.clone());
        } else {
            tracing::debug!(module = %name, "spawn_missing_tasks: import edge would close a cycle");
            set.mark_err(name).await;
        }
    }

    (graph, final_nodes)
}
