// Copyright 2026 ModKit Contributors

//! A dynamic module-loading and dependency-resolution engine.
//!
//! Callers stage candidate modules in a [`LoadingSet`](loading_set::LoadingSet),
//! then run them through [`Engine::commit`](engine::Engine::commit), which
//! resolves versioned symbol imports against already-loaded modules (both
//! within the same commit and globally), orders construction by dependency,
//! and registers the resulting instances in a process-wide
//! [`GlobalRegistry`](registry::GlobalRegistry). Concurrent resource locking
//! and the actual module ABI (construction, start/stop hooks) are external
//! collaborators this crate only defines the contracts for —
//! [`InstanceFactory`](instance::InstanceFactory) and
//! [`InstanceBody`](instance::InstanceBody) — not implementations of.
//!
//! Commits are serialized: at most one runs at a time, queued in FIFO order
//! behind an async lock. Everything else — name/symbol/namespace lookups,
//! parameter reads within their access group — may run concurrently with an
//! in-flight commit.

mod arena;
mod commit;
mod engine;
mod error;
mod export;
mod graph;
mod instance;
mod loading_set;
#[cfg(feature = "manifest-loader")]
mod manifest_loader;
mod namespace;
mod registry;
mod symbol;
mod task;
mod validator;
mod version;

pub use commit::CommitEngine;
pub use engine::{Engine, EngineConfig, EngineConfigBuilder};
pub use error::{clear_last_error, last_error, Error, Result};
pub use export::{
    AccessGroup, DynamicSymbolExport, ExportDescriptor, Linkage, Modifier, NamespaceImport,
    ParameterDeclaration, ParameterType, ParameterValue, ResourceDeclaration, SymbolExport,
    SymbolImport,
};
pub use instance::{
    ConstructionContext, InstanceBody, InstanceFactory, InstanceHandle, InstanceState,
    ModuleHandle, NullBody, NullFactory,
};
pub use loading_set::{Diagnostic, FilterRequest, LoadingSet, ModuleStatus, PathLoader};
#[cfg(feature = "manifest-loader")]
pub use manifest_loader::ManifestDirLoader;
pub use registry::GlobalRegistry;
pub use symbol::{SymbolKey, SymbolRef, GLOBAL_NAMESPACE};
pub use task::{BoxFuture, TaskSpawner, TokioSpawner};
pub use version::{Version, VersionError};
