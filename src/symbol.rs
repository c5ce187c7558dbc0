// Copyright 2026 ModKit Contributors

//! Keyed symbol store: `(name, namespace) -> { owner, version }` (spec.md §4.1).

use std::collections::HashMap;
use std::fmt;

use crate::error::{Error, Result};
use crate::version::Version;

/// The empty string denotes the implicit global namespace, which always
/// "exists" but is never tracked in [`crate::namespace::NamespaceRegistry`].
pub const GLOBAL_NAMESPACE: &str = "";

/// `(name, namespace)` uniquely identifying a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymbolKey {
    pub name: String,
    pub namespace: String,
}

impl SymbolKey {
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        SymbolKey {
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn is_global(&self) -> bool {
        self.namespace.is_empty()
    }
}

impl fmt::Display for SymbolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_global() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}::{}", self.namespace, self.name)
        }
    }
}

/// A symbol's owner and the version it was exported at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolRef {
    pub owner: String,
    pub version: Version,
}

impl SymbolRef {
    pub fn new(owner: impl Into<String>, version: Version) -> Self {
        SymbolRef {
            owner: owner.into(),
            version,
        }
    }
}

/// Keyed store of symbols, plus a per-namespace import reference count.
///
/// A `SymbolTable` on its own does not enforce the global union-disjointness
/// invariant of spec.md §3 ("Global `symbols` union-disjoint across
/// instances at all times") — that's a property of
/// [`crate::registry::GlobalRegistry`], which owns one `SymbolTable` behind
/// its lock. A `SymbolTable` is also used, independently, inside each
/// [`crate::loading_set::LoadingSet`] to track tentative symbols for the
/// set alone.
#[derive(Debug, Default)]
pub struct SymbolTable {
    symbols: HashMap<SymbolKey, SymbolRef>,
    namespace_refs: HashMap<String, u64>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a symbol. Errors with [`Error::Duplicate`] if the key already exists.
    pub fn add_symbol(&mut self, key: SymbolKey, owner: impl Into<String>, version: Version) -> Result<()> {
        if self.symbols.contains_key(&key) {
            return Err(Error::duplicate_symbol(&key));
        }
        self.symbols.insert(key, SymbolRef::new(owner, version));
        Ok(())
    }

    /// Remove a symbol. Errors with [`Error::NotFound`] if absent.
    pub fn remove_symbol(&mut self, key: &SymbolKey) -> Result<SymbolRef> {
        self.symbols
            .remove(key)
            .ok_or_else(|| Error::NotFound(format!("symbol '{key}'")))
    }

    /// Exact lookup, ignoring version compatibility.
    pub fn get(&self, key: &SymbolKey) -> Option<&SymbolRef> {
        self.symbols.get(key)
    }

    /// Look up a symbol and check it satisfies `requested` (spec.md §3's
    /// version rule, via [`Version::is_satisfied_by`]).
    pub fn get_compatible(&self, key: &SymbolKey, requested: &Version) -> Option<&SymbolRef> {
        self.symbols
            .get(key)
            .filter(|sym_ref| requested.is_satisfied_by(&sym_ref.version))
    }

    pub fn contains(&self, key: &SymbolKey) -> bool {
        self.symbols.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SymbolKey, &SymbolRef)> {
        self.symbols.iter()
    }

    /// Number of symbols currently owned and exported under `namespace`.
    pub fn symbol_count_in(&self, namespace: &str) -> u64 {
        self.symbols
            .keys()
            .filter(|k| k.namespace == namespace)
            .count() as u64
    }

    /// Increment the import reference count for `ns`. The global namespace
    /// is never tracked, per spec.md §4.1.
    pub fn ref_namespace(&mut self, ns: &str) {
        if ns.is_empty() {
            return;
        }
        *self.namespace_refs.entry(ns.to_string()).or_insert(0) += 1;
    }

    /// Decrement the import reference count for `ns`. Errors with
    /// [`Error::NotFound`] if `ns` has no outstanding refs.
    pub fn unref_namespace(&mut self, ns: &str) -> Result<()> {
        if ns.is_empty() {
            return Ok(());
        }
        match self.namespace_refs.get_mut(ns) {
            Some(count) if *count > 0 => {
                *count -= 1;
                if *count == 0 {
                    self.namespace_refs.remove(ns);
                }
                Ok(())
            }
            _ => Err(Error::NotFound(format!("namespace ref '{ns}'"))),
        }
    }

    pub fn namespace_ref_count(&self, ns: &str) -> u64 {
        self.namespace_refs.get(ns).copied().unwrap_or(0)
    }
}
