// Copyright 2026 ModKit Contributors

//! Per-instance state: refcounts, lifecycle, owned parameters/symbols/
//! dependencies, and the collaborator contract the instance layer must
//! satisfy (spec.md §3 Instance lifecycle, §4.6).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::export::{AccessGroup, ExportDescriptor, ParameterType, ParameterValue};
use crate::symbol::SymbolKey;
use crate::version::Version;

/// `Uninit -> Init -> Started -> (Stopping) -> Detached` (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Uninit,
    Init,
    Started,
    Stopping,
    Detached,
}

/// Construction/runtime hooks supplied by the instance layer.
///
/// This is the "collaborator contract" of spec.md §4.6: the engine drives
/// these calls from [`crate::commit`]'s `LoadOp`, but does not implement
/// what happens inside a module's own construction, start, or teardown
/// logic. A production embedder implements this against its own module ABI;
/// tests in this crate use [`NullBody`] for simple, in-process instances.
#[async_trait]
pub trait InstanceBody: Send + Sync {
    /// Invoked by `LoadOp` S3. Errors here are recorded and the node
    /// transitions to `Err` (spec.md §4.5.3 S3/S4).
    async fn on_start(&self) -> Result<()> {
        Ok(())
    }

    /// Invoked on teardown, whether from a normal `stop()`/`detach()` or
    /// from unwinding a failed start (spec.md §4.5.3 S4). Must be
    /// idempotent: the engine may call it more than once defensively during
    /// unwind paths.
    async fn on_stop(&self) {}
}

/// A no-op [`InstanceBody`] for bootstrap/root instances and tests that
/// don't need real construction behavior.
pub struct NullBody;

#[async_trait]
impl InstanceBody for NullBody {
    async fn on_start(&self) -> Result<()> {
        Ok(())
    }
    async fn on_stop(&self) {}
}

/// Builds the [`InstanceBody`] for a module during `LoadOp` S1/S2
/// (spec.md §4.6's `init_exported`). May suspend, e.g. while a dynamic
/// symbol's constructor runs.
#[async_trait]
pub trait InstanceFactory: Send + Sync {
    async fn construct(&self, ctx: &ConstructionContext) -> Result<Arc<dyn InstanceBody>>;
}

/// Everything `construct` needs: the export it's building, and the
/// globally-resolved symbol refs for each of its imports, keyed the same
/// way they appear in `export.symbol_imports`.
pub struct ConstructionContext {
    pub export: Arc<ExportDescriptor>,
    pub resolved_imports: HashMap<SymbolKey, crate::symbol::SymbolRef>,
}

/// A trivial [`InstanceFactory`] that always produces [`NullBody`].
pub struct NullFactory;

#[async_trait]
impl InstanceFactory for NullFactory {
    async fn construct(&self, _ctx: &ConstructionContext) -> Result<Arc<dyn InstanceBody>> {
        Ok(Arc::new(NullBody))
    }
}

/// A loaded module's binary/export handle. Reference-counted so the
/// [`crate::loading_set::LoadingSet`] that contributed it, and every
/// instance built from it, can share ownership without the set needing to
/// outlive them (spec.md §3 "Ownership").
pub struct ModuleHandle {
    pub export: Arc<ExportDescriptor>,
    pub factory: Arc<dyn InstanceFactory>,
}

impl ModuleHandle {
    pub fn new(export: Arc<ExportDescriptor>, factory: Arc<dyn InstanceFactory>) -> Arc<Self> {
        Arc::new(ModuleHandle { export, factory })
    }
}

struct ParameterSlot {
    ty: ParameterType,
    read_group: AccessGroup,
    write_group: AccessGroup,
    value: ParameterValue,
}

struct Inner {
    state: InstanceState,
    parameters: HashMap<String, ParameterSlot>,
    dependencies: Vec<String>,
    exported_symbols: Vec<SymbolKey>,
    body: Option<Arc<dyn InstanceBody>>,
    pending_unload: bool,
}

/// Per-instance state container: refcounts, lifecycle state, owned
/// parameters/symbols/dependencies. Locking within an instance always
/// happens last in the engine's lock order (spec.md §5).
pub struct InstanceHandle {
    pub name: String,
    pub context_version: Version,
    module: Arc<ModuleHandle>,
    strong: AtomicU32,
    dependents: AtomicU32,
    inner: Mutex<Inner>,
}

impl InstanceHandle {
    pub fn new(name: impl Into<String>, context_version: Version, module: Arc<ModuleHandle>) -> Arc<Self> {
        Arc::new(InstanceHandle {
            name: name.into(),
            context_version,
            module,
            strong: AtomicU32::new(0),
            dependents: AtomicU32::new(0),
            inner: Mutex::new(Inner {
                state: InstanceState::Uninit,
                parameters: HashMap::new(),
                dependencies: Vec::new(),
                exported_symbols: Vec::new(),
                body: None,
                pending_unload: false,
            }),
        })
    }

    pub fn module(&self) -> &Arc<ModuleHandle> {
        &self.module
    }

    pub fn state(&self) -> InstanceState {
        self.inner.lock().state
    }

    pub fn strong_count(&self) -> u32 {
        self.strong.load(Ordering::SeqCst)
    }

    pub fn dependents_count(&self) -> u32 {
        self.dependents.load(Ordering::SeqCst)
    }

    pub fn ref_strong(&self) {
        self.strong.fetch_add(1, Ordering::SeqCst);
    }

    /// Decrement the strong count; if it and `dependents` both reach zero
    /// and an unload was requested, run it. Returns whether the instance
    /// was unloaded as a result of this call.
    pub async fn unref_strong(&self) -> bool {
        let prev = self.strong.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "unref_strong underflow on '{}'", self.name);
        self.maybe_run_deferred_unload().await
    }

    pub fn ref_dependent(&self) {
        self.dependents.fetch_add(1, Ordering::SeqCst);
    }

    pub async fn unref_dependent(&self) -> bool {
        let prev = self.dependents.fetch_sub(1, Ordering::SeqCst);
        debug_assert!(prev > 0, "unref_dependent underflow on '{}'", self.name);
        self.maybe_run_deferred_unload().await
    }

    /// Request unload. Deferred until both refcounts reach zero
    /// (spec.md §3: "unload is requested-only, deferred until both counts
    /// reach zero").
    pub async fn enqueue_unload(&self) -> bool {
        {
            let mut inner = self.inner.lock();
            inner.pending_unload = true;
        }
        self.maybe_run_deferred_unload().await
    }

    async fn maybe_run_deferred_unload(&self) -> bool {
        let should_run = {
            let inner = self.inner.lock();
            inner.pending_unload
                && self.strong_count() == 0
                && self.dependents_count() == 0
                && inner.state != InstanceState::Detached
        };
        if should_run {
            self.stop().await;
            self.detach();
            true
        } else {
            false
        }
    }

    pub fn set_body(&self, body: Arc<dyn InstanceBody>) {
        let mut inner = self.inner.lock();
        inner.body = Some(body);
        inner.state = InstanceState::Init;
    }

    pub fn record_dependency(&self, dependency_name: impl Into<String>) {
        self.inner.lock().dependencies.push(dependency_name.into());
    }

    pub fn dependencies(&self) -> Vec<String> {
        self.inner.lock().dependencies.clone()
    }

    pub fn record_exported_symbol(&self, key: SymbolKey) {
        self.inner.lock().exported_symbols.push(key);
    }

    pub fn exported_symbols(&self) -> Vec<SymbolKey> {
        self.inner.lock().exported_symbols.clone()
    }

    pub fn declare_parameter(
        &self,
        name: impl Into<String>,
        ty: ParameterType,
        read_group: AccessGroup,
        write_group: AccessGroup,
        default: ParameterValue,
    ) {
        self.inner.lock().parameters.insert(
            name.into(),
            ParameterSlot {
                ty,
                read_group,
                write_group,
                value: default,
            },
        );
    }

    /// spec.md §6: `query_parameter(owner, param) -> {type, read_group, write_group}`.
    pub fn query_parameter(&self, param: &str) -> Result<(ParameterType, AccessGroup, AccessGroup)> {
        let inner = self.inner.lock();
        let slot = inner
            .parameters
            .get(param)
            .ok_or_else(|| Error::NotFound(format!("parameter '{param}' on '{}'", self.name)))?;
        Ok((slot.ty, slot.read_group, slot.write_group))
    }

    /// spec.md §6: reads are only permitted when the parameter's
    /// `read_group` is `Public` (or the caller is the owning instance,
    /// represented here by `caller_is_owner`).
    pub fn read_parameter(&self, param: &str, caller_is_owner: bool) -> Result<ParameterValue> {
        let inner = self.inner.lock();
        let slot = inner
            .parameters
            .get(param)
            .ok_or_else(|| Error::NotFound(format!("parameter '{param}' on '{}'", self.name)))?;
        if !caller_is_owner && slot.read_group != AccessGroup::Public {
            return Err(Error::NotPermitted(format!(
                "parameter '{param}' on '{}' is not publicly readable",
                self.name
            )));
        }
        Ok(slot.value)
    }

    pub fn write_parameter(
        &self,
        param: &str,
        value: ParameterValue,
        caller_is_owner: bool,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let slot = inner
            .parameters
            .get_mut(param)
            .ok_or_else(|| Error::NotFound(format!("parameter '{param}' on '{}'", self.name)))?;
        if !caller_is_owner && slot.write_group != AccessGroup::Public {
            return Err(Error::NotPermitted(format!(
                "parameter '{param}' on '{}' is not publicly writable",
                self.name
            )));
        }
        if slot.ty != value.ty() {
            return Err(Error::InvalidParameterType {
                param: param.to_string(),
                expected: slot.ty.name(),
                got: value.ty().name(),
            });
        }
        slot.value = value;
        Ok(())
    }

    /// spec.md §4.6 `start()`: invokes `on_start`, advancing `Init -> Started`.
    pub async fn start(&self) -> Result<()> {
        let body = {
            let inner = self.inner.lock();
            if inner.state != InstanceState::Init {
                return Ok(());
            }
            inner.body.clone()
        };
        let Some(body) = body else {
            return Err(Error::NotFound(format!("instance body for '{}'", self.name)));
        };
        body.on_start().await?;
        self.inner.lock().state = InstanceState::Started;
        Ok(())
    }

    /// spec.md §4.6 `stop()`: idempotently releases the instance. Always
    /// succeeds from the engine's point of view; failures inside the
    /// instance's own teardown are the instance layer's concern.
    pub async fn stop(&self) {
        let body = {
            let mut inner = self.inner.lock();
            if matches!(inner.state, InstanceState::Detached) {
                return;
            }
            inner.state = InstanceState::Stopping;
            inner.body.clone()
        };
        if let Some(body) = body {
            body.on_stop().await;
        }
    }

    /// spec.md §4.6 `detach()`: the public `Info` survives the instance's
    /// own destruction so late observers fail gracefully (spec.md GLOSSARY).
    pub fn detach(&self) {
        let mut inner = self.inner.lock();
        inner.body = None;
        inner.state = InstanceState::Detached;
    }

    /// spec.md §4.6 `deinit()`: idempotently release symbols, parameters,
    /// dependencies, and the held `ModuleHandle`'s reference. The
    /// `ModuleHandle` itself is an `Arc`, so "releasing" it is simply
    /// dropping the instance's handle, which this consumes.
    pub fn deinit(self: Arc<Self>) {
        let mut inner = self.inner.lock();
        inner.parameters.clear();
        inner.dependencies.clear();
        inner.exported_symbols.clear();
        inner.body = None;
        inner.state = InstanceState::Detached;
    }
}
