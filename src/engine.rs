// Copyright 2026 ModKit Contributors

//! Top-level engine API (spec.md §6 "Engine API") and its configuration
//! (SPEC_FULL.md §8, absent from the distilled spec).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::commit::CommitEngine;
use crate::error::{Error, Result};
use crate::export::{AccessGroup, ExportDescriptor, ParameterType, ParameterValue};
use crate::instance::{InstanceHandle, ModuleHandle, NullBody, NullFactory};
use crate::loading_set::LoadingSet;
use crate::registry::GlobalRegistry;
use crate::task::{TaskSpawner, TokioSpawner};
use crate::version::Version;

/// Reserved name for the bootstrap root instance (spec.md GLOSSARY).
const ROOT_INSTANCE_NAME: &str = "__root";

/// Engine-wide configuration (SPEC_FULL.md §8).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Context version every admitted `ExportDescriptor` is checked against
    /// (spec.md §4.2 rule 2).
    pub context_version: Version,
    /// Bounds how many commits may be outstanding (queued or running) at
    /// once. `commit()` returns [`Error::LoadingInProcess`] immediately once
    /// this is hit rather than parking indefinitely (spec.md §7's "park or
    /// fail per caller mode"). `None` means unbounded.
    pub max_pending_commits: Option<usize>,
}

impl EngineConfig {
    pub fn builder(context_version: Version) -> EngineConfigBuilder {
        EngineConfigBuilder {
            context_version,
            max_pending_commits: None,
        }
    }
}

/// Fluent builder for [`EngineConfig`], in the spirit of constructing a
/// configured engine through named steps rather than positional arguments.
pub struct EngineConfigBuilder {
    context_version: Version,
    max_pending_commits: Option<usize>,
}

impl EngineConfigBuilder {
    pub fn max_pending_commits(mut self, max: usize) -> Self {
        self.max_pending_commits = Some(max);
        self
    }

    pub fn build(self) -> EngineConfig {
        EngineConfig {
            context_version: self.context_version,
            max_pending_commits: self.max_pending_commits,
        }
    }
}

/// The module-loading & dependency-resolution engine (spec.md §2).
pub struct Engine {
    config: EngineConfig,
    registry: Arc<GlobalRegistry>,
    commit_engine: CommitEngine,
    root: OnceCell<Arc<InstanceHandle>>,
    pending_commits: AtomicUsize,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_spawner(config, Arc::new(TokioSpawner))
    }

    pub fn with_spawner(config: EngineConfig, spawner: Arc<dyn TaskSpawner>) -> Self {
        let registry = Arc::new(GlobalRegistry::new());
        Engine {
            config,
            commit_engine: CommitEngine::new(registry.clone(), spawner),
            registry,
            root: OnceCell::new(),
            pending_commits: AtomicUsize::new(0),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// A fresh [`LoadingSet`] pinned to this engine's configured context
    /// version.
    pub fn new_loading_set(&self) -> LoadingSet {
        LoadingSet::new(self.config.context_version.clone())
    }

    /// spec.md §6 `add_root_instance() -> &RootInstance`. Idempotent: the
    /// first call creates and registers the privileged bootstrap instance;
    /// later calls return the same handle.
    pub fn add_root_instance(&self) -> Arc<InstanceHandle> {
        self.root
            .get_or_init(|| {
                let module = ModuleHandle::new(
                    Arc::new(ExportDescriptor::bare(ROOT_INSTANCE_NAME, self.config.context_version.clone())),
                    Arc::new(NullFactory),
                );
                let root = InstanceHandle::new(ROOT_INSTANCE_NAME, self.config.context_version.clone(), module);
                root.set_body(Arc::new(NullBody));
                self.registry.register_root(root.clone());
                root
            })
            .clone()
    }

    pub fn find_instance_by_name(&self, name: &str) -> Option<Arc<InstanceHandle>> {
        self.registry.find_instance_by_name(name)
    }

    pub fn find_instance_by_symbol(&self, name: &str, ns: &str, version: &Version) -> Option<Arc<InstanceHandle>> {
        self.registry.find_instance_by_symbol(name, ns, version)
    }

    pub fn query_namespace(&self, name: &str) -> bool {
        self.registry.query_namespace(name)
    }

    /// spec.md §4.5.6.
    pub async fn prune_instances(&self) -> Result<()> {
        self.registry.prune_instances().await
    }

    pub fn query_parameter(&self, owner: &str, param: &str) -> Result<(ParameterType, AccessGroup, AccessGroup)> {
        crate::error::record((|| {
            let instance = self
                .registry
                .find_instance_by_name(owner)
                .ok_or_else(|| Error::NotFound(format!("instance '{owner}'")))?;
            instance.query_parameter(param)
        })())
    }

    /// spec.md §6: `read_parameter` is permitted from outside the owning
    /// instance only through the `Public` access group.
    pub fn read_parameter(&self, owner: &str, param: &str) -> Result<ParameterValue> {
        crate::error::record((|| {
            let instance = self
                .registry
                .find_instance_by_name(owner)
                .ok_or_else(|| Error::NotFound(format!("instance '{owner}'")))?;
            instance.read_parameter(param, false)
        })())
    }

    pub fn write_parameter(&self, owner: &str, param: &str, value: ParameterValue) -> Result<()> {
        crate::error::record((|| {
            let instance = self
                .registry
                .find_instance_by_name(owner)
                .ok_or_else(|| Error::NotFound(format!("instance '{owner}'")))?;
            instance.write_parameter(param, value, false)
        })())
    }

    /// spec.md §4.3/§4.5: run `set` through a commit. Bounded by
    /// [`EngineConfig::max_pending_commits`] (SPEC_FULL.md §8); beyond that
    /// bound this fails fast with [`Error::LoadingInProcess`] instead of
    /// parking the caller.
    pub async fn commit(&self, set: &LoadingSet) -> Result<()> {
        if let Some(max) = self.config.max_pending_commits {
            let prev = self.pending_commits.fetch_add(1, Ordering::SeqCst);
            if prev >= max {
                self.pending_commits.fetch_sub(1, Ordering::SeqCst);
                return crate::error::record(Err(Error::LoadingInProcess));
            }
        } else {
            self.pending_commits.fetch_add(1, Ordering::SeqCst);
        }

        let result = self.commit_engine.commit(set).await;
        self.pending_commits.fetch_sub(1, Ordering::SeqCst);
        crate::error::record(result)
    }
}
