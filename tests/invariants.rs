// Copyright 2026 ModKit Contributors

//! Quantified invariants from spec.md §8, exercised against the public
//! [`Engine`] API.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use modkit_loader::{
    Engine, EngineConfig, Error, ExportDescriptor, FilterRequest, Linkage, ModuleHandle, ModuleStatus,
    NamespaceImport, NullFactory, PathLoader, Result, SymbolExport, SymbolImport, Version,
};

fn engine() -> Engine {
    Engine::new(EngineConfig::builder(Version::new(1, 0, 0)).build())
}

fn exporting(name: &str, sym: &str, ns: &str, version: Version) -> Arc<ModuleHandle> {
    let mut export = ExportDescriptor::bare(name, Version::new(1, 0, 0));
    export.symbol_exports = vec![SymbolExport {
        name: sym.into(),
        namespace: ns.into(),
        version,
        linkage: Linkage::Global,
        symbol_ptr: 0,
    }];
    ModuleHandle::new(Arc::new(export), Arc::new(NullFactory))
}

/// At most one `SymbolRef` exists globally per (name, namespace): a second
/// commit exporting the same pair never displaces or duplicates the first.
#[tokio::test]
async fn at_most_one_global_owner_per_symbol() {
    let engine = engine();

    let set_a = engine.new_loading_set();
    set_a.add_module(None, exporting("A", "sym1", "nsA", Version::new(1, 0, 0))).unwrap();
    engine.commit(&set_a).await.unwrap();

    let set_b = engine.new_loading_set();
    set_b.add_module(None, exporting("B", "sym1", "nsA", Version::new(1, 0, 0))).unwrap();
    engine.commit(&set_b).await.unwrap();

    assert_eq!(set_b.status_of("B"), Some(ModuleStatus::Err));
    assert_eq!(
        engine
            .find_instance_by_symbol("sym1", "nsA", &Version::new(1, 0, 0))
            .unwrap()
            .name,
        "A"
    );
}

/// A namespace with no remaining exported symbols is no longer reported
/// present, even though it was at some point during the process's life.
#[tokio::test]
async fn namespace_is_absent_once_idle() {
    let engine = engine();
    let set = engine.new_loading_set();
    set.add_module(None, exporting("A", "sym1", "nsA", Version::new(1, 0, 0))).unwrap();
    engine.commit(&set).await.unwrap();
    assert!(engine.query_namespace("nsA"));

    // Nothing holds a strong/dependent ref on A, so pruning removes it
    // outright and its exported namespace becomes idle again.
    engine.prune_instances().await.unwrap();
    assert!(!engine.query_namespace("nsA"));
}

/// Every queued callback fires exactly once, and only the branch matching
/// the module's terminal status.
#[tokio::test]
async fn callback_fires_exactly_once_for_its_terminal_branch() {
    let engine = engine();
    let set = engine.new_loading_set();
    set.add_module(None, exporting("A", "sym1", "nsA", Version::new(1, 0, 0))).unwrap();

    let success_calls = Arc::new(AtomicUsize::new(0));
    let error_calls = Arc::new(AtomicUsize::new(0));
    let s2 = success_calls.clone();
    let e2 = error_calls.clone();
    set.add_callback(
        "A",
        move |_instance| {
            s2.fetch_add(1, Ordering::SeqCst);
        },
        move |_export| {
            e2.fetch_add(1, Ordering::SeqCst);
        },
        None,
    )
    .unwrap();

    engine.commit(&set).await.unwrap();

    assert_eq!(success_calls.load(Ordering::SeqCst), 1);
    assert_eq!(error_calls.load(Ordering::SeqCst), 0);
}

/// A mis-versioned import's module gets its `on_error` fired exactly once,
/// never `on_success`.
#[tokio::test]
async fn callback_fires_error_branch_exactly_once_on_failure() {
    let engine = engine();
    let set = engine.new_loading_set();

    set.add_module(None, exporting("A", "sym1", "nsA", Version::new(1, 0, 0))).unwrap();

    let mut b = ExportDescriptor::bare("B", Version::new(1, 0, 0));
    b.namespace_imports = vec![NamespaceImport { namespace: "nsA".into() }];
    b.symbol_imports = vec![SymbolImport {
        name: "sym1".into(),
        namespace: "nsA".into(),
        version: Version::new(9, 0, 0),
    }];
    set.add_module(None, ModuleHandle::new(Arc::new(b), Arc::new(NullFactory))).unwrap();

    let success_calls = Arc::new(AtomicUsize::new(0));
    let error_calls = Arc::new(AtomicUsize::new(0));
    let s2 = success_calls.clone();
    let e2 = error_calls.clone();
    set.add_callback("B", move |_| { s2.fetch_add(1, Ordering::SeqCst); }, move |_| { e2.fetch_add(1, Ordering::SeqCst); }, None)
        .unwrap();

    engine.commit(&set).await.unwrap();

    assert_eq!(success_calls.load(Ordering::SeqCst), 0);
    assert_eq!(error_calls.load(Ordering::SeqCst), 1);
}

struct FixedLoader(Vec<&'static str>);

impl PathLoader for FixedLoader {
    fn load(&self, _path: &str) -> Result<Vec<Arc<ModuleHandle>>> {
        Ok(self.0.iter().map(|n| exporting(n, &format!("sym_{n}"), "ns", Version::new(1, 0, 0))).collect())
    }
}

/// Loading the same path twice into the same set leaves it in the same
/// final state as loading it once: the second pass's duplicates are
/// rejected, not appended.
#[tokio::test]
async fn add_modules_from_path_is_idempotent() {
    let engine = engine();
    let set = engine.new_loading_set();
    let loader = FixedLoader(vec!["A", "B"]);

    set.add_modules_from_path("dir", &loader, |_| FilterRequest::Load).unwrap();
    set.add_modules_from_path("dir", &loader, |_| FilterRequest::Load).unwrap();

    assert!(set.query_module("A"));
    assert!(set.query_module("B"));

    engine.commit(&set).await.unwrap();
    assert_eq!(set.status_of("A"), Some(ModuleStatus::Loaded));
    assert_eq!(set.status_of("B"), Some(ModuleStatus::Loaded));
    assert!(engine.find_instance_by_name("A").is_some());
    assert!(engine.find_instance_by_name("B").is_some());
}

/// `prune_instances` converges: a dependency chain with no outstanding refs
/// is fully torn down in one pass, dependents before their dependencies.
#[tokio::test]
async fn prune_instances_converges_on_an_idle_dependency_chain() {
    let engine = engine();
    let set = engine.new_loading_set();

    set.add_module(None, exporting("A", "sym1", "nsA", Version::new(1, 0, 0))).unwrap();

    let mut b = ExportDescriptor::bare("B", Version::new(1, 0, 0));
    b.namespace_imports = vec![NamespaceImport { namespace: "nsA".into() }];
    b.symbol_imports = vec![SymbolImport {
        name: "sym1".into(),
        namespace: "nsA".into(),
        version: Version::new(1, 0, 0),
    }];
    set.add_module(None, ModuleHandle::new(Arc::new(b), Arc::new(NullFactory))).unwrap();

    engine.commit(&set).await.unwrap();
    assert!(engine.find_instance_by_name("A").is_some());
    assert!(engine.find_instance_by_name("B").is_some());

    engine.prune_instances().await.unwrap();

    assert!(engine.find_instance_by_name("A").is_none());
    assert!(engine.find_instance_by_name("B").is_none());
}

/// The root instance is exempt from pruning no matter how many sweeps run.
#[tokio::test]
async fn root_instance_survives_repeated_pruning() {
    let engine = engine();
    engine.add_root_instance();

    engine.prune_instances().await.unwrap();
    engine.prune_instances().await.unwrap();

    assert!(engine.find_instance_by_name("__root").is_some());
}

/// A small `max_pending_commits` bound does not block commits that run to
/// completion one at a time: the bound only rejects overlapping commits.
#[tokio::test]
async fn sequential_commits_succeed_under_a_small_pending_bound() {
    let config = EngineConfig::builder(Version::new(1, 0, 0)).max_pending_commits(1).build();
    let engine = engine_with(config);

    let set1 = engine.new_loading_set();
    set1.add_module(None, exporting("A", "sym1", "nsA", Version::new(1, 0, 0))).unwrap();
    engine.commit(&set1).await.unwrap();

    let set2 = engine.new_loading_set();
    set2.add_module(None, exporting("B", "sym2", "nsB", Version::new(1, 0, 0))).unwrap();
    engine.commit(&set2).await.unwrap();

    assert!(engine.find_instance_by_name("A").is_some());
    assert!(engine.find_instance_by_name("B").is_some());
}

fn engine_with(config: EngineConfig) -> Engine {
    Engine::new(config)
}

#[test]
fn fallible_engine_call_records_last_error_for_the_calling_thread() {
    modkit_loader::clear_last_error();
    let engine = engine();
    let err = engine.read_parameter("nonexistent", "p");
    assert!(matches!(err, Err(Error::NotFound(_))));
    assert!(matches!(modkit_loader::last_error(), Some(Error::NotFound(_))));
}
