// Copyright 2026 ModKit Contributors

//! Per-node load state machine (spec.md §4.5.3).
//!
//! Expressed as a single `async fn` driven by an explicit [`State`] enum
//! matched in a loop, per the Design Notes (spec.md §9): suspension across
//! lock acquisitions is native `async`/`await`, not a hand-written
//! `Future::poll`. `State` exists purely so transitions can be logged with
//! the same names spec.md §4.5.3 uses.

use std::collections::HashMap;
use std::sync::Arc;

use crate::commit::load_graph::LoadGraph;
use crate::export::{ExportDescriptor, Modifier};
use crate::instance::{ConstructionContext, InstanceHandle};
use crate::loading_set::{LoadingSet, ModuleStatus};
use crate::registry::GlobalRegistry;
use crate::symbol::{SymbolKey, SymbolRef};
use crate::version::Version;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Verify,
    PrepareConstruct,
    AwaitConstruct,
    Start,
    AwaitStartRegister,
}

fn lookup_provider(name: &str, set: &LoadingSet, registry: &GlobalRegistry) -> Option<Arc<InstanceHandle>> {
    set.loaded_instance_of(name).or_else(|| registry.find_instance_by_name(name))
}

/// Resolve every `symbol_import` of `export` to a [`SymbolRef`], preferring
/// an intra-set provider over a globally-registered one (spec.md §4.5.2
/// step 2). Returns `None` if any import cannot be resolved, which should be
/// unreachable here since `spawn_missing_tasks` already verified
/// satisfiability before this node's `LoadOp` was spawned.
fn resolve_imports(export: &ExportDescriptor, set: &LoadingSet, registry: &GlobalRegistry) -> Option<HashMap<SymbolKey, SymbolRef>> {
    let mut resolved = HashMap::new();
    for imp in &export.symbol_imports {
        let key = SymbolKey::new(imp.name.clone(), imp.namespace.clone());
        let sym_ref = set
            .resolved_symbol(&key, &imp.version)
            .or_else(|| registry.resolved_symbol(&key, &imp.version))?;
        resolved.insert(key, sym_ref);
    }
    Some(resolved)
}

/// Run one module's `LoadOp` to a terminal state, registering it with
/// `registry` on success and marking it `Err` on `set` on any failure. Never
/// returns an `Err` itself: every outcome is expressed by mutating `set`
/// (spec.md §4.5.3's unwind hooks), matching "the commit future resolves
/// `Ok(())` if the commit itself completed; individual modules may still be
/// in `Err`" (spec.md §7).
pub(crate) async fn run_load_op(name: String, set: LoadingSet, registry: Arc<GlobalRegistry>, graph: Arc<LoadGraph>) {
    let mut state = State::Verify;
    tracing::trace!(module = %name, ?state, "load_op: entering");

    let Some(handle) = set.handle_of(&name) else {
        tracing::warn!(module = %name, "load_op: node has no module handle, marking Err");
        set.mark_err(&name).await;
        return;
    };
    let export = handle.export.clone();

    // S0 Verify: wait until every outgoing dependency has reached a
    // terminal state. A dependency that never got a `LoadOp` spawned for it
    // (because it was marked `Err` during `spawn_missing_tasks`) reads the
    // same as one whose "load future is absent" in spec.md's wording: both
    // fold into "treat as Err" here.
    loop {
        let mut all_loaded = true;
        for dep in graph.outgoing(&name) {
            match set.status_of(&dep) {
                Some(ModuleStatus::Loaded) => continue,
                Some(ModuleStatus::Unloaded) => {
                    all_loaded = false;
                    break;
                }
                Some(ModuleStatus::Err) | None => {
                    tracing::debug!(module = %name, dependency = %dep, "load_op: dependency errored, propagating");
                    set.mark_err(&name).await;
                    return;
                }
            }
        }
        if all_loaded {
            break;
        }
        tokio::task::yield_now().await;
    }

    // S1 Prepare & start construct.
    state = State::PrepareConstruct;
    tracing::trace!(module = %name, ?state);
    let Some(resolved_imports) = resolve_imports(&export, &set, &registry) else {
        tracing::warn!(module = %name, "load_op: an import could not be re-resolved at construct time");
        set.mark_err(&name).await;
        return;
    };

    let mut dependency_names: Vec<String> = resolved_imports.values().map(|r| r.owner.clone()).collect();
    for modifier in &export.modifiers {
        if let Modifier::Dependency { instance } = modifier {
            dependency_names.push(instance.clone());
        }
    }
    dependency_names.sort();
    dependency_names.dedup();

    let mut ref_provider_handles = Vec::new();
    for dep_name in &dependency_names {
        if let Some(provider) = lookup_provider(dep_name, &set, &registry) {
            provider.ref_dependent();
            ref_provider_handles.push(provider);
        }
    }

    let ctx = ConstructionContext {
        export: export.clone(),
        resolved_imports,
    };

    // S2 Await construct.
    state = State::AwaitConstruct;
    tracing::trace!(module = %name, ?state);
    let body = match handle.factory.construct(&ctx).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(module = %name, error = %e, "load_op: construct failed");
            for provider in &ref_provider_handles {
                provider.unref_dependent().await;
            }
            set.mark_err(&name).await;
            return;
        }
    };

    let instance = InstanceHandle::new(name.clone(), export.context_version.clone(), handle.clone());
    instance.set_body(body);
    for dep_name in &dependency_names {
        instance.record_dependency(dep_name.clone());
    }
    for sym in &export.symbol_exports {
        instance.record_exported_symbol(SymbolKey::new(sym.name.clone(), sym.namespace.clone()));
    }
    for sym in &export.dynamic_symbol_exports {
        instance.record_exported_symbol(SymbolKey::new(sym.name.clone(), sym.namespace.clone()));
    }

    // S3 Start.
    state = State::Start;
    tracing::trace!(module = %name, ?state);
    if let Err(e) = instance.start().await {
        tracing::warn!(module = %name, error = %e, "load_op: on_start failed, unwinding");
        instance.stop().await;
        instance.detach();
        for provider in &ref_provider_handles {
            provider.unref_dependent().await;
        }
        set.mark_err(&name).await;
        return;
    }

    // S4 Await start & register.
    state = State::AwaitStartRegister;
    tracing::trace!(module = %name, ?state);
    let imported_namespaces: Vec<String> = export.namespace_imports.iter().map(|ni| ni.namespace.clone()).collect();
    match registry.add_instance(instance.clone(), &imported_namespaces) {
        Ok(()) => {
            tracing::debug!(module = %name, "load_op: registered");
            set.mark_loaded(&name, instance).await;
        }
        Err(e) => {
            tracing::warn!(module = %name, error = %e, "load_op: global registration failed, unwinding");
            instance.stop().await;
            instance.detach();
            for provider in &ref_provider_handles {
                provider.unref_dependent().await;
            }
            set.mark_err(&name).await;
        }
    }
}
