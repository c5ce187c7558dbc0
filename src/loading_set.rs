// Copyright 2026 ModKit Contributors

//! Staging area for pending module exports (spec.md §4.3).

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::arena::Arena;
use crate::error::{Error, Result};
use crate::export::ExportDescriptor;
use crate::instance::{InstanceHandle, ModuleHandle};
use crate::symbol::{SymbolKey, SymbolRef, SymbolTable};
use crate::validator::ExportValidator;
use crate::version::Version;

/// Result of a [`LoadingSet`] intake filter (spec.md §6 "Filter contract").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterRequest {
    Skip,
    Load,
}

/// Terminal/non-terminal status of a module within one set (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    Unloaded,
    Err,
    Loaded,
}

/// A validator/duplicate-check rejection recorded during intake. Surfaced,
/// not fatal to the batch (spec.md §4.2).
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub module: String,
    pub reason: String,
}

/// Turns a filesystem path into export descriptors for
/// [`LoadingSet::add_modules_from_path`]. Stands in for platform
/// shared-library loading, which is out of scope for this engine
/// (SPEC_FULL.md §10).
pub trait PathLoader: Send + Sync {
    fn load(&self, path: &str) -> Result<Vec<Arc<ModuleHandle>>>;
}

type SuccessCallback = Box<dyn FnOnce(Arc<InstanceHandle>) + Send>;
type ErrorCallback = Box<dyn FnOnce(Arc<ExportDescriptor>) + Send>;
type AbortCallback = Box<dyn FnOnce() + Send>;

struct PendingCallbacks {
    on_success: SuccessCallback,
    on_error: ErrorCallback,
    on_abort: Option<AbortCallback>,
}

struct ModuleEntry {
    status: ModuleStatus,
    handle: Arc<ModuleHandle>,
    owner: Option<Arc<InstanceHandle>>,
    loaded_instance: Option<Arc<InstanceHandle>>,
    callbacks: Vec<PendingCallbacks>,
}

struct Inner {
    modules: HashMap<String, ModuleEntry>,
    symbols: SymbolTable,
    arena: Arena,
    diagnostics: Vec<Diagnostic>,
    dirty: bool,
}

impl Drop for Inner {
    /// Fires every still-queued `on_abort` for a module that never reached a
    /// terminal status: the set (every clone of it) is going away without
    /// that module ever having been committed.
    fn drop(&mut self) {
        for entry in self.modules.values_mut() {
            if entry.status == ModuleStatus::Unloaded {
                for cb in std::mem::take(&mut entry.callbacks) {
                    if let Some(on_abort) = cb.on_abort {
                        on_abort();
                    }
                }
            }
        }
    }
}

/// Staging workspace collecting candidate modules for a single commit
/// (spec.md GLOSSARY, §4.3). Cheaply `Clone`able; clones share the same
/// underlying state, matching how a [`crate::commit::CommitOp`] and its
/// caller both need a handle to the same set.
#[derive(Clone)]
pub struct LoadingSet {
    inner: Arc<Mutex<Inner>>,
    validator: Arc<ExportValidator>,
}

impl LoadingSet {
    pub fn new(context_version: Version) -> Self {
        LoadingSet {
            inner: Arc::new(Mutex::new(Inner {
                modules: HashMap::new(),
                symbols: SymbolTable::new(),
                arena: Arena::new(),
                diagnostics: Vec::new(),
                dirty: false,
            })),
            validator: Arc::new(ExportValidator::new(context_version)),
        }
    }

    /// Validate, deduplicate, and tentatively register `handle`'s export.
    /// `owner`, if given, is strong-ref'd for the lifetime of the pending
    /// entry so it cannot unload out from under a commit that depends on it
    /// (spec.md §4.3 "Memory").
    pub fn add_module(&self, owner: Option<Arc<InstanceHandle>>, handle: Arc<ModuleHandle>) -> Result<()> {
        let export = &handle.export;
        if let Err(reason) = self.validator.validate(export) {
            let mut inner = self.inner.lock();
            inner.arena.intern(&export.name);
            inner.diagnostics.push(Diagnostic {
                module: export.name.clone(),
                reason: reason.clone(),
            });
            return Err(Error::InvalidExport {
                module: export.name.clone(),
                reason,
            });
        }

        let mut inner = self.inner.lock();
        inner.arena.intern(&export.name);

        if inner.modules.contains_key(&export.name) {
            return Err(Error::duplicate_module(export.name.clone()));
        }

        // Tentatively register this module's declared symbols, rolling
        // back atomically on the first collision (spec.md §4.3).
        let mut added_keys = Vec::new();
        let mut rollback_err = None;
        for sym in &export.symbol_exports {
            let key = SymbolKey::new(inner.arena.intern(&sym.name).to_string(), inner.arena.intern(&sym.namespace).to_string());
            match inner.symbols.add_symbol(key.clone(), export.name.clone(), sym.version.clone()) {
                Ok(()) => added_keys.push(key),
                Err(e) => {
                    rollback_err = Some(e);
                    break;
                }
            }
        }
        if rollback_err.is_none() {
            for sym in &export.dynamic_symbol_exports {
                let key = SymbolKey::new(inner.arena.intern(&sym.name).to_string(), inner.arena.intern(&sym.namespace).to_string());
                match inner.symbols.add_symbol(key.clone(), export.name.clone(), sym.version.clone()) {
                    Ok(()) => added_keys.push(key),
                    Err(e) => {
                        rollback_err = Some(e);
                        break;
                    }
                }
            }
        }

        if let Some(err) = rollback_err {
            for key in added_keys {
                let _ = inner.symbols.remove_symbol(&key);
            }
            inner.diagnostics.push(Diagnostic {
                module: export.name.clone(),
                reason: err.to_string(),
            });
            return Err(err);
        }

        if let Some(owner) = &owner {
            owner.ref_strong();
        }

        inner.modules.insert(
            export.name.clone(),
            ModuleEntry {
                status: ModuleStatus::Unloaded,
                handle: handle.clone(),
                owner,
                loaded_instance: None,
                callbacks: Vec::new(),
            },
        );
        inner.dirty = true;
        Ok(())
    }

    /// Iterate descriptors yielded by `loader` for `path`, running `filter`
    /// over each and calling [`LoadingSet::add_module`] for the ones it
    /// accepts. Per-descriptor validation/duplicate failures are recorded as
    /// diagnostics and do not abort the remaining iteration (spec.md §6).
    pub fn add_modules_from_path(
        &self,
        path: &str,
        loader: &dyn PathLoader,
        mut filter: impl FnMut(&ExportDescriptor) -> FilterRequest,
    ) -> Result<()> {
        for handle in loader.load(path)? {
            if filter(&handle.export) == FilterRequest::Skip {
                continue;
            }
            let _ = self.add_module(None, handle);
        }
        Ok(())
    }

    /// Like [`LoadingSet::add_modules_from_path`] but over an in-process
    /// iterator of already-built module handles, standing in for spec.md
    /// §6's `bin_ptr`-carrying local iterator.
    pub fn add_modules_from_local(
        &self,
        handles: impl IntoIterator<Item = Arc<ModuleHandle>>,
        mut filter: impl FnMut(&ExportDescriptor) -> FilterRequest,
    ) -> Result<()> {
        for handle in handles {
            if filter(&handle.export) == FilterRequest::Skip {
                continue;
            }
            let _ = self.add_module(None, handle);
        }
        Ok(())
    }

    /// Register callbacks for `module_name`. If the module has already
    /// reached a terminal status, the relevant callback fires synchronously;
    /// otherwise it is queued for delivery during `commit()` (spec.md §4.3).
    /// `on_abort`, if given, fires instead of `on_success`/`on_error` when
    /// the set is dropped while `module_name` is still `Unloaded` — the set
    /// was discarded (or the commit engine gave up on it) before the module
    /// ever reached a terminal status.
    pub fn add_callback(
        &self,
        module_name: &str,
        on_success: impl FnOnce(Arc<InstanceHandle>) + Send + 'static,
        on_error: impl FnOnce(Arc<ExportDescriptor>) + Send + 'static,
        on_abort: Option<Box<dyn FnOnce() + Send>>,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let entry = inner
            .modules
            .get_mut(module_name)
            .ok_or_else(|| Error::NotFound(format!("module '{module_name}'")))?;

        match entry.status {
            ModuleStatus::Loaded => {
                let instance = entry
                    .loaded_instance
                    .clone()
                    .expect("Loaded module always has a recorded instance");
                drop(inner);
                on_success(instance);
            }
            ModuleStatus::Err => {
                let export = entry.handle.export.clone();
                drop(inner);
                on_error(export);
            }
            ModuleStatus::Unloaded => {
                entry.callbacks.push(PendingCallbacks {
                    on_success: Box::new(on_success),
                    on_error: Box::new(on_error),
                    on_abort,
                });
            }
        }
        Ok(())
    }

    pub fn query_module(&self, name: &str) -> bool {
        self.inner.lock().modules.contains_key(name)
    }

    pub fn query_symbol(&self, name: &str, ns: &str, requested: &Version) -> bool {
        let inner = self.inner.lock();
        inner
            .symbols
            .get_compatible(&SymbolKey::new(name, ns), requested)
            .is_some()
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        self.inner.lock().diagnostics.clone()
    }

    pub fn status_of(&self, name: &str) -> Option<ModuleStatus> {
        self.inner.lock().modules.get(name).map(|e| e.status)
    }

    // ---- Internals used by crate::commit ----

    pub(crate) fn is_dirty(&self) -> bool {
        self.inner.lock().dirty
    }

    pub(crate) fn clear_dirty(&self) {
        self.inner.lock().dirty = false;
    }

    pub(crate) fn unloaded_module_names(&self) -> Vec<String> {
        self.inner
            .lock()
            .modules
            .iter()
            .filter(|(_, e)| e.status == ModuleStatus::Unloaded)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub(crate) fn handle_of(&self, name: &str) -> Option<Arc<ModuleHandle>> {
        self.inner.lock().modules.get(name).map(|e| e.handle.clone())
    }

    /// The instance built for an already-`Loaded` module in this set, if any.
    pub(crate) fn loaded_instance_of(&self, name: &str) -> Option<Arc<InstanceHandle>> {
        self.inner.lock().modules.get(name).and_then(|e| e.loaded_instance.clone())
    }

    /// A compatible symbol tentatively registered by this set, whose owning
    /// module entry (if present) is not itself `Err` (spec.md §4.5.2 step 2).
    pub(crate) fn resolved_symbol(&self, key: &SymbolKey, requested: &Version) -> Option<SymbolRef> {
        let inner = self.inner.lock();
        inner
            .symbols
            .get_compatible(key, requested)
            .filter(|sym_ref| {
                inner
                    .modules
                    .get(&sym_ref.owner)
                    .map(|m| m.status != ModuleStatus::Err)
                    .unwrap_or(true)
            })
            .cloned()
    }

    pub(crate) fn local_symbol_provider(&self, key: &SymbolKey, requested: &Version) -> Option<String> {
        let inner = self.inner.lock();
        inner
            .symbols
            .get_compatible(key, requested)
            .filter(|sym_ref| {
                // "not in Err" per spec.md §4.5.2 step 2: the owning
                // module's own entry (if any) must not itself be errored.
                inner
                    .modules
                    .get(&sym_ref.owner)
                    .map(|m| m.status != ModuleStatus::Err)
                    .unwrap_or(true)
            })
            .map(|sym_ref| sym_ref.owner.clone())
    }

    pub(crate) fn global_export_conflicts(&self, _name: &str) -> bool {
        // Whether a static/dynamic export is already present *globally* is
        // checked by the commit engine against the `GlobalRegistry`, not
        // here; this hook exists for symmetry with spec.md §4.5.2 step 3's
        // phrasing and is intentionally a pass-through.
        false
    }

    /// Mark `name` as errored; fires every queued `on_error` callback with
    /// the module's export descriptor and releases the owner strong ref, if
    /// any (spec.md §4.5.3's unwind action, §4.3's callback delivery rule).
    pub(crate) async fn mark_err(&self, name: &str) {
        let (export, owner, callbacks) = {
            let mut inner = self.inner.lock();
            let Some(entry) = inner.modules.get_mut(name) else {
                return;
            };
            if entry.status != ModuleStatus::Unloaded {
                return;
            }
            entry.status = ModuleStatus::Err;
            let callbacks = std::mem::take(&mut entry.callbacks);
            (entry.handle.export.clone(), entry.owner.take(), callbacks)
        };

        for cb in callbacks {
            (cb.on_error)(export.clone());
        }
        if let Some(owner) = owner {
            owner.unref_strong().await;
        }
    }

    /// Mark `name` as loaded with `instance`; fires every queued
    /// `on_success` callback and releases the owner strong ref, if any.
    pub(crate) async fn mark_loaded(&self, name: &str, instance: Arc<InstanceHandle>) {
        let (owner, callbacks) = {
            let mut inner = self.inner.lock();
            let Some(entry) = inner.modules.get_mut(name) else {
                return;
            };
            if entry.status != ModuleStatus::Unloaded {
                return;
            }
            entry.status = ModuleStatus::Loaded;
            entry.loaded_instance = Some(instance.clone());
            let callbacks = std::mem::take(&mut entry.callbacks);
            (entry.owner.take(), callbacks)
        };

        for cb in callbacks {
            (cb.on_success)(instance.clone());
        }
        if let Some(owner) = owner {
            owner.unref_strong().await;
        }
    }
}
