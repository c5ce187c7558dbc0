// Copyright 2026 ModKit Contributors

//! End-to-end commit scenarios against the public [`Engine`] API
//! (spec.md §8).

use std::sync::Arc;

use modkit_loader::{
    Engine, EngineConfig, ExportDescriptor, Linkage, ModuleHandle, ModuleStatus, NamespaceImport,
    NullFactory, SymbolExport, SymbolImport, Version,
};

fn engine() -> Engine {
    Engine::new(EngineConfig::builder(Version::new(1, 0, 0)).build())
}

fn bare(name: &str) -> Arc<ModuleHandle> {
    ModuleHandle::new(Arc::new(ExportDescriptor::bare(name, Version::new(1, 0, 0))), Arc::new(NullFactory))
}

#[tokio::test]
async fn single_module_no_imports_loads_and_is_globally_findable() {
    let engine = engine();
    let set = engine.new_loading_set();

    let mut export = ExportDescriptor::bare("A", Version::new(1, 0, 0));
    export.symbol_exports = vec![SymbolExport {
        name: "sym1".into(),
        namespace: "nsA".into(),
        version: Version::new(1, 0, 0),
        linkage: Linkage::Global,
        symbol_ptr: 0,
    }];
    set.add_module(None, ModuleHandle::new(Arc::new(export), Arc::new(NullFactory))).unwrap();

    engine.commit(&set).await.unwrap();

    assert_eq!(set.status_of("A"), Some(ModuleStatus::Loaded));
    assert!(engine.find_instance_by_name("A").is_some());
    assert!(engine.find_instance_by_symbol("sym1", "nsA", &Version::new(1, 0, 0)).is_some());
    assert!(engine.query_namespace("nsA"));
}

#[tokio::test]
async fn two_module_chain_resolves_dependency_first() {
    let engine = engine();
    let set = engine.new_loading_set();

    let mut a = ExportDescriptor::bare("A", Version::new(1, 0, 0));
    a.symbol_exports = vec![SymbolExport {
        name: "sym1".into(),
        namespace: "nsA".into(),
        version: Version::new(2, 3, 4),
        linkage: Linkage::Global,
        symbol_ptr: 0,
    }];
    set.add_module(None, ModuleHandle::new(Arc::new(a), Arc::new(NullFactory))).unwrap();

    let mut b = ExportDescriptor::bare("B", Version::new(1, 0, 0));
    b.namespace_imports = vec![NamespaceImport { namespace: "nsA".into() }];
    b.symbol_imports = vec![SymbolImport {
        name: "sym1".into(),
        namespace: "nsA".into(),
        version: Version::new(2, 3, 0),
    }];
    set.add_module(None, ModuleHandle::new(Arc::new(b), Arc::new(NullFactory))).unwrap();

    engine.commit(&set).await.unwrap();

    assert_eq!(set.status_of("A"), Some(ModuleStatus::Loaded));
    assert_eq!(set.status_of("B"), Some(ModuleStatus::Loaded));
    let b_instance = engine.find_instance_by_name("B").unwrap();
    assert_eq!(b_instance.dependencies(), vec!["A".to_string()]);
}

#[tokio::test]
async fn version_incompatible_import_errs_only_the_importer() {
    let engine = engine();
    let set = engine.new_loading_set();

    let mut a = ExportDescriptor::bare("A", Version::new(1, 0, 0));
    a.symbol_exports = vec![SymbolExport {
        name: "sym1".into(),
        namespace: "nsA".into(),
        version: Version::new(2, 0, 0),
        linkage: Linkage::Global,
        symbol_ptr: 0,
    }];
    set.add_module(None, ModuleHandle::new(Arc::new(a), Arc::new(NullFactory))).unwrap();

    let mut b = ExportDescriptor::bare("B", Version::new(1, 0, 0));
    b.namespace_imports = vec![NamespaceImport { namespace: "nsA".into() }];
    b.symbol_imports = vec![SymbolImport {
        name: "sym1".into(),
        namespace: "nsA".into(),
        // Requests a minor version ahead of what A exports: incompatible
        // under this engine's is_satisfied_by rule.
        version: Version::new(2, 1, 0),
    }];
    set.add_module(None, ModuleHandle::new(Arc::new(b), Arc::new(NullFactory))).unwrap();

    engine.commit(&set).await.unwrap();

    assert_eq!(set.status_of("A"), Some(ModuleStatus::Loaded));
    assert_eq!(set.status_of("B"), Some(ModuleStatus::Err));
    assert!(engine.find_instance_by_name("B").is_none());
}

#[tokio::test]
async fn mutual_import_cycle_errs_both_modules() {
    let engine = engine();
    let set = engine.new_loading_set();

    let mut a = ExportDescriptor::bare("A", Version::new(1, 0, 0));
    a.namespace_imports = vec![NamespaceImport { namespace: "nsB".into() }];
    a.symbol_imports = vec![SymbolImport {
        name: "symB".into(),
        namespace: "nsB".into(),
        version: Version::new(1, 0, 0),
    }];
    a.symbol_exports = vec![SymbolExport {
        name: "symA".into(),
        namespace: "nsA".into(),
        version: Version::new(1, 0, 0),
        linkage: Linkage::Global,
        symbol_ptr: 0,
    }];

    let mut b = ExportDescriptor::bare("B", Version::new(1, 0, 0));
    b.namespace_imports = vec![NamespaceImport { namespace: "nsA".into() }];
    b.symbol_imports = vec![SymbolImport {
        name: "symA".into(),
        namespace: "nsA".into(),
        version: Version::new(1, 0, 0),
    }];
    b.symbol_exports = vec![SymbolExport {
        name: "symB".into(),
        namespace: "nsB".into(),
        version: Version::new(1, 0, 0),
        linkage: Linkage::Global,
        symbol_ptr: 0,
    }];

    set.add_module(None, ModuleHandle::new(Arc::new(a), Arc::new(NullFactory))).unwrap();
    set.add_module(None, ModuleHandle::new(Arc::new(b), Arc::new(NullFactory))).unwrap();

    engine.commit(&set).await.unwrap();

    assert_eq!(set.status_of("A"), Some(ModuleStatus::Err));
    assert_eq!(set.status_of("B"), Some(ModuleStatus::Err));
    assert!(engine.find_instance_by_name("A").is_none());
    assert!(engine.find_instance_by_name("B").is_none());
}

#[tokio::test]
async fn duplicate_symbol_export_is_rejected_at_intake_not_commit() {
    let engine = engine();
    let set = engine.new_loading_set();

    let mut a = ExportDescriptor::bare("A", Version::new(1, 0, 0));
    a.symbol_exports = vec![SymbolExport {
        name: "sym1".into(),
        namespace: "nsA".into(),
        version: Version::new(1, 0, 0),
        linkage: Linkage::Global,
        symbol_ptr: 0,
    }];
    set.add_module(None, ModuleHandle::new(Arc::new(a), Arc::new(NullFactory))).unwrap();

    let mut b = ExportDescriptor::bare("B", Version::new(1, 0, 0));
    b.symbol_exports = vec![SymbolExport {
        name: "sym1".into(),
        namespace: "nsA".into(),
        version: Version::new(1, 0, 0),
        linkage: Linkage::Global,
        symbol_ptr: 0,
    }];
    let err = set.add_module(None, ModuleHandle::new(Arc::new(b), Arc::new(NullFactory))).unwrap_err();
    assert!(matches!(err, modkit_loader::Error::Duplicate { .. }));
    assert!(!set.query_module("B"));

    engine.commit(&set).await.unwrap();
    assert_eq!(set.status_of("A"), Some(ModuleStatus::Loaded));
}

#[tokio::test]
async fn concurrent_commits_against_the_same_engine_are_serialized_and_both_succeed() {
    let engine = Arc::new(engine());

    let set_a = engine.new_loading_set();
    set_a.add_module(None, bare("A")).unwrap();
    let set_b = engine.new_loading_set();
    set_b.add_module(None, bare("B")).unwrap();

    let ea = engine.clone();
    let ta = tokio::spawn(async move { ea.commit(&set_a).await });
    let eb = engine.clone();
    let tb = tokio::spawn(async move { eb.commit(&set_b).await });

    let (ra, rb) = tokio::join!(ta, tb);
    ra.unwrap().unwrap();
    rb.unwrap().unwrap();

    assert!(engine.find_instance_by_name("A").is_some());
    assert!(engine.find_instance_by_name("B").is_some());
}
