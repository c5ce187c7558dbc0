// Copyright 2026 ModKit Contributors

//! Error types for the module-loading & dependency-resolution engine.

use std::cell::RefCell;
use thiserror::Error;

use crate::symbol::SymbolKey;

/// Errors that can occur while loading, resolving, or querying modules.
#[derive(Debug, Error, Clone)]
pub enum Error {
    /// An [`crate::export::ExportDescriptor`] failed validator rules and was skipped.
    #[error("invalid export '{module}': {reason}")]
    InvalidExport { module: String, reason: String },

    /// A name or symbol collision in a set or globally.
    #[error("duplicate {kind} '{name}'")]
    Duplicate { kind: &'static str, name: String },

    /// A module, symbol, namespace, or parameter lookup found nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// An operation required a declared dependency edge that doesn't exist.
    #[error("'{from}' does not depend on '{to}'")]
    NotADependency { from: String, to: String },

    /// Operation forbidden by policy (static dependency removal, root unload,
    /// a non-public parameter access from outside its owner).
    #[error("not permitted: {0}")]
    NotPermitted(String),

    /// Adding this edge would close a cycle in a dependency graph.
    #[error("adding edge '{from}' -> '{to}' would create a cycle")]
    CyclicDependency { from: String, to: String },

    /// A concurrent commit or mutation is already in progress.
    #[error("loading already in process")]
    LoadingInProcess,

    /// A parameter read/write used a type that doesn't match the slot.
    #[error("parameter type mismatch for '{param}': expected {expected}, got {got}")]
    InvalidParameterType {
        param: String,
        expected: &'static str,
        got: &'static str,
    },

    /// Allocation failed inside the set's arena or a collection.
    #[error("out of memory: {0}")]
    OutOfMemory(String),
}

impl Error {
    pub(crate) fn duplicate_symbol(key: &SymbolKey) -> Self {
        Error::Duplicate {
            kind: "symbol",
            name: format!("{key}"),
        }
    }

    pub(crate) fn duplicate_module(name: impl Into<String>) -> Self {
        Error::Duplicate {
            kind: "module",
            name: name.into(),
        }
    }
}

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, Error>;

thread_local! {
    static LAST_ERROR: RefCell<Option<Error>> = const { RefCell::new(None) };
}

/// Record `err` (if any) in the calling thread's "last error" slot, then
/// return it unchanged. Every fallible public entry point routes its
/// `Result` through this so ABI-style callers can read the failure via
/// [`last_error`] instead of (or in addition to) the returned `Result`.
pub(crate) fn record<T>(result: Result<T>) -> Result<T> {
    match &result {
        Ok(_) => LAST_ERROR.with(|slot| *slot.borrow_mut() = None),
        Err(e) => LAST_ERROR.with(|slot| *slot.borrow_mut() = Some(e.clone())),
    }
    result
}

/// Read the calling thread's last recorded error, if any.
pub fn last_error() -> Option<Error> {
    LAST_ERROR.with(|slot| slot.borrow().clone())
}

/// Clear the calling thread's last recorded error.
pub fn clear_last_error() {
    LAST_ERROR.with(|slot| *slot.borrow_mut() = None);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_ok_clears_slot() {
        record::<()>(Err(Error::LoadingInProcess)).ok();
        assert!(last_error().is_some());
        record(Ok(())).ok();
        assert!(last_error().is_none());
    }

    #[test]
    fn record_err_populates_slot() {
        clear_last_error();
        let _ = record::<()>(Err(Error::NotFound("thing".into())));
        match last_error() {
            Some(Error::NotFound(msg)) => assert_eq!(msg, "thing"),
            other => panic!("unexpected last error: {other:?}"),
        }
    }

    #[test]
    fn display_messages_are_actionable() {
        let err = Error::CyclicDependency {
            from: "a".into(),
            to: "b".into(),
        };
        assert_eq!(
            err.to_string(),
            "adding edge 'a' -> 'b' would create a cycle"
        );
    }
}
