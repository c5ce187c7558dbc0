// Copyright 2026 ModKit Contributors

//! Process-wide instance/namespace/symbol registry (spec.md §3 `GlobalRegistry`,
//! §4.5.5 `add_instance`, §4.5.6 `prune_instances`).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::export::ExportDescriptor;
use crate::graph::DependencyGraph;
use crate::instance::{InstanceHandle, InstanceState};
use crate::namespace::NamespaceRegistry;
use crate::symbol::{SymbolKey, SymbolTable};
use crate::version::Version;

fn exported_pairs(export: &ExportDescriptor) -> Vec<(SymbolKey, Version)> {
    let mut pairs: Vec<(SymbolKey, Version)> = export
        .symbol_exports
        .iter()
        .map(|s| (SymbolKey::new(s.name.clone(), s.namespace.clone()), s.version.clone()))
        .collect();
    pairs.extend(
        export
            .dynamic_symbol_exports
            .iter()
            .map(|s| (SymbolKey::new(s.name.clone(), s.namespace.clone()), s.version.clone())),
    );
    pairs
}

struct Inner {
    instances: HashMap<String, Arc<InstanceHandle>>,
    symbols: SymbolTable,
    namespaces: NamespaceRegistry,
    /// `dedup_edges = true`: spec.md §4.4 "for the global graph, edges are deduped".
    dep_graph: DependencyGraph,
    /// Namespaces ref-counted on behalf of each registered instance, so
    /// [`GlobalRegistry::remove_instance`] can undo step 3 of `add_instance`
    /// symmetrically (spec.md §4.5.5/§4.5.6).
    imported_namespaces: HashMap<String, Vec<String>>,
    root: Option<String>,
}

/// Process-wide registry of live instances, namespaces, and exported
/// symbols (spec.md §3). Every mutation happens under a single lock, the
/// first in the engine's lock-acquisition order (spec.md §5).
pub struct GlobalRegistry {
    inner: Mutex<Inner>,
}

impl GlobalRegistry {
    pub fn new() -> Self {
        GlobalRegistry {
            inner: Mutex::new(Inner {
                instances: HashMap::new(),
                symbols: SymbolTable::new(),
                namespaces: NamespaceRegistry::new(),
                dep_graph: DependencyGraph::new(true),
                imported_namespaces: HashMap::new(),
                root: None,
            }),
        }
    }

    /// Register the privileged bootstrap instance (spec.md GLOSSARY "Root
    /// instance"). Bypasses the normal export checks of `add_instance`: a
    /// root instance has no exports of its own and is exempt from pruning.
    pub fn register_root(&self, instance: Arc<InstanceHandle>) {
        let mut inner = self.inner.lock();
        inner.dep_graph.add_node(instance.name.clone());
        inner.root = Some(instance.name.clone());
        inner.instances.insert(instance.name.clone(), instance);
    }

    pub fn find_instance_by_name(&self, name: &str) -> Option<Arc<InstanceHandle>> {
        self.inner.lock().instances.get(name).cloned()
    }

    pub fn find_instance_by_symbol(&self, name: &str, ns: &str, requested: &Version) -> Option<Arc<InstanceHandle>> {
        let inner = self.inner.lock();
        let key = SymbolKey::new(name, ns);
        let owner = inner.symbols.get_compatible(&key, requested)?.owner.clone();
        inner.instances.get(&owner).cloned()
    }

    pub fn query_namespace(&self, name: &str) -> bool {
        self.inner.lock().namespaces.contains(name)
    }

    pub(crate) fn symbol_is_present(&self, key: &SymbolKey) -> bool {
        self.inner.lock().symbols.contains(key)
    }

    pub(crate) fn compatible_symbol_owner(&self, key: &SymbolKey, requested: &Version) -> Option<String> {
        self.inner
            .lock()
            .symbols
            .get_compatible(key, requested)
            .map(|r| r.owner.clone())
    }

    pub(crate) fn resolved_symbol(&self, key: &SymbolKey, requested: &Version) -> Option<crate::symbol::SymbolRef> {
        self.inner.lock().symbols.get_compatible(key, requested).cloned()
    }

    pub(crate) fn contains_instance(&self, name: &str) -> bool {
        self.inner.lock().instances.contains_key(name)
    }

    /// spec.md §4.5.5: the six-step atomic sequence. `imported_namespaces`
    /// are the non-empty namespaces `instance`'s export declares importing
    /// (the global namespace is implicit and never ref-counted).
    pub fn add_instance(&self, instance: Arc<InstanceHandle>, imported_namespaces: &[String]) -> Result<()> {
        let mut inner = self.inner.lock();
        let name = instance.name.clone();

        if inner.instances.contains_key(&name) {
            return Err(Error::duplicate_module(name));
        }

        let pairs = exported_pairs(&instance.module().export);

        // Step 2: exports not globally present; imported namespaces exist.
        for (key, _) in &pairs {
            if inner.symbols.contains(key) {
                return Err(Error::duplicate_symbol(key));
            }
        }
        for ns in imported_namespaces {
            if !inner.namespaces.contains(ns) {
                return Err(Error::NotFound(format!("namespace '{ns}'")));
            }
        }

        // Step 1: dep-graph node.
        inner.dep_graph.add_node(name.clone());

        // Step 3: acquire namespace import ref-counts (undoable).
        let mut refd = Vec::new();
        for ns in imported_namespaces {
            inner.symbols.ref_namespace(ns);
            refd.push(ns.clone());
        }

        // Step 4: edges for every dependency, rejecting an edge to a name
        // with no registered instance (spec.md §9's "different live
        // instance" case cannot arise here since names are the registry's
        // own identity key).
        let mut failure = None;
        for dep in instance.dependencies() {
            if !inner.instances.contains_key(&dep) {
                failure = Some(Error::NotFound(format!("dependency instance '{dep}'")));
                break;
            }
            if let Err(e) = inner.dep_graph.add_edge(&name, &dep) {
                failure = Some(e);
                break;
            }
        }

        if let Some(err) = failure {
            for ns in &refd {
                let _ = inner.symbols.unref_namespace(ns);
            }
            inner.dep_graph.remove_node(&name);
            return Err(err);
        }

        // Step 5: defensive global acyclicity check. `add_edge` above
        // already refuses any cycle-closing edge, so this can never trip
        // outside of a programming bug.
        debug_assert!(
            !inner.dep_graph.is_cyclic(),
            "global dep_graph became cyclic after add_instance('{name}')"
        );

        // Step 6: ensure namespaces exist, export symbols, record instance.
        for (key, version) in pairs {
            inner
                .symbols
                .add_symbol(key.clone(), name.clone(), version)
                .expect("step 2 already verified this key is globally absent");
            let count = inner.symbols.symbol_count_in(&key.namespace);
            let refs = inner.symbols.namespace_ref_count(&key.namespace);
            inner.namespaces.sync(&key.namespace, count, refs);
        }
        for ns in &refd {
            let count = inner.symbols.symbol_count_in(ns);
            let refs = inner.symbols.namespace_ref_count(ns);
            inner.namespaces.sync(ns, count, refs);
        }

        inner.imported_namespaces.insert(name.clone(), refd);
        inner.instances.insert(name, instance);
        Ok(())
    }

    /// Symmetric undo of `add_instance` (spec.md §4.5.6 "Removal is
    /// symmetric to add_instance"). Also undoes step 4's `ref_dependent()`
    /// (taken in `LoadOp` when this instance was constructed, `load_op.rs`)
    /// on every dependency still registered, so a provider's
    /// `dependents_count()` doesn't outlive the dependent that raised it.
    pub async fn remove_instance(&self, name: &str) -> Result<()> {
        let providers = {
            let mut inner = self.inner.lock();
            let instance = inner
                .instances
                .remove(name)
                .ok_or_else(|| Error::NotFound(format!("instance '{name}'")))?;

            for (key, _) in exported_pairs(&instance.module().export) {
                let _ = inner.symbols.remove_symbol(&key);
                let count = inner.symbols.symbol_count_in(&key.namespace);
                let refs = inner.symbols.namespace_ref_count(&key.namespace);
                inner.namespaces.sync(&key.namespace, count, refs);
            }

            if let Some(refd) = inner.imported_namespaces.remove(name) {
                for ns in refd {
                    let _ = inner.symbols.unref_namespace(&ns);
                    let count = inner.symbols.symbol_count_in(&ns);
                    let refs = inner.symbols.namespace_ref_count(&ns);
                    inner.namespaces.sync(&ns, count, refs);
                }
            }

            inner.dep_graph.remove_node(name);

            instance
                .dependencies()
                .iter()
                .filter_map(|dep| inner.instances.get(dep).cloned())
                .collect::<Vec<_>>()
        };

        for provider in providers {
            provider.unref_dependent().await;
        }

        Ok(())
    }

    /// spec.md §4.5.6: topologically sort by incoming edges (dependents
    /// first), then for each non-root instance either request unload or
    /// stop-and-remove it outright when both refcounts are already zero.
    pub async fn prune_instances(&self) -> Result<()> {
        let (order, root) = {
            let inner = self.inner.lock();
            let order: Vec<String> = inner.dep_graph.sort_topological()?.into_iter().map(String::from).collect();
            (order, inner.root.clone())
        };

        for name in order.into_iter().rev() {
            if Some(&name) == root.as_ref() {
                continue;
            }
            let instance = { self.inner.lock().instances.get(&name).cloned() };
            let Some(instance) = instance else {
                continue;
            };

            if instance.state() == InstanceState::Detached {
                let _ = self.remove_instance(&name).await;
                continue;
            }

            if instance.strong_count() == 0 && instance.dependents_count() == 0 {
                instance.enqueue_unload().await;
                let _ = self.remove_instance(&name).await;
            } else {
                instance.enqueue_unload().await;
            }
        }
        Ok(())
    }
}

impl Default for GlobalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::{Linkage, SymbolExport};
    use crate::instance::{ModuleHandle, NullBody, NullFactory};

    fn instance_with_export(name: &str, sym: &str, ns: &str, version: Version) -> Arc<InstanceHandle> {
        let mut export = ExportDescriptor::bare(name, Version::new(1, 0, 0));
        export.symbol_exports = vec![SymbolExport {
            name: sym.into(),
            namespace: ns.into(),
            version,
            linkage: Linkage::Global,
            symbol_ptr: 0,
        }];
        let module = ModuleHandle::new(Arc::new(export), Arc::new(NullFactory));
        let instance = InstanceHandle::new(name, Version::new(1, 0, 0), module);
        instance.set_body(Arc::new(NullBody));
        instance.record_exported_symbol(SymbolKey::new(sym, ns));
        instance
    }

    #[test]
    fn add_instance_then_find_by_name_and_symbol() {
        let registry = GlobalRegistry::new();
        let a = instance_with_export("A", "sym1", "nsA", Version::new(1, 0, 0));
        registry.add_instance(a, &[]).unwrap();

        assert!(registry.find_instance_by_name("A").is_some());
        assert_eq!(
            registry
                .find_instance_by_symbol("sym1", "nsA", &Version::new(1, 0, 0))
                .unwrap()
                .name,
            "A"
        );
        assert!(registry.query_namespace("nsA"));
    }

    #[test]
    fn add_instance_rejects_globally_duplicate_symbol() {
        let registry = GlobalRegistry::new();
        let a = instance_with_export("A", "sym1", "nsA", Version::new(1, 0, 0));
        registry.add_instance(a, &[]).unwrap();

        let b = instance_with_export("B", "sym1", "nsA", Version::new(1, 0, 0));
        let err = registry.add_instance(b, &[]).unwrap_err();
        assert!(matches!(err, Error::Duplicate { .. }));
        assert!(registry.find_instance_by_name("B").is_none());
    }

    #[tokio::test]
    async fn remove_instance_clears_namespace_when_last_symbol_goes() {
        let registry = GlobalRegistry::new();
        let a = instance_with_export("A", "sym1", "nsA", Version::new(1, 0, 0));
        registry.add_instance(a, &[]).unwrap();
        assert!(registry.query_namespace("nsA"));

        registry.remove_instance("A").await.unwrap();
        assert!(!registry.query_namespace("nsA"));
        assert!(registry.find_instance_by_name("A").is_none());
    }

    #[tokio::test]
    async fn remove_instance_unrefs_dependents_count_on_its_providers() {
        let registry = GlobalRegistry::new();
        let a = instance_with_export("A", "sym1", "nsA", Version::new(1, 0, 0));
        registry.add_instance(a.clone(), &[]).unwrap();

        let b = instance_with_export("B", "sym2", "nsB", Version::new(1, 0, 0));
        b.record_dependency("A");
        a.ref_dependent();
        registry.add_instance(b, &[]).unwrap();
        assert_eq!(a.dependents_count(), 1);

        registry.remove_instance("B").await.unwrap();
        assert_eq!(a.dependents_count(), 0);
    }

    #[tokio::test]
    async fn prune_skips_root_and_removes_idle_instances() {
        let registry = GlobalRegistry::new();
        let root = InstanceHandle::new(
            "__root",
            Version::new(1, 0, 0),
            ModuleHandle::new(Arc::new(ExportDescriptor::bare("__root", Version::new(1, 0, 0))), Arc::new(NullFactory)),
        );
        root.set_body(Arc::new(NullBody));
        registry.register_root(root);

        let a = instance_with_export("A", "sym1", "nsA", Version::new(1, 0, 0));
        registry.add_instance(a, &[]).unwrap();

        registry.prune_instances().await.unwrap();
        assert!(registry.find_instance_by_name("__root").is_some());
        assert!(registry.find_instance_by_name("A").is_none());
    }

    #[tokio::test]
    async fn prune_never_removes_instance_with_outstanding_strong_ref() {
        let registry = GlobalRegistry::new();
        let a = instance_with_export("A", "sym1", "nsA", Version::new(1, 0, 0));
        a.ref_strong();
        registry.add_instance(a, &[]).unwrap();

        registry.prune_instances().await.unwrap();
        assert!(registry.find_instance_by_name("A").is_some());
    }
}
