// Copyright 2026 ModKit Contributors

//! Pure validation of a single [`ExportDescriptor`] (spec.md §4.2).
//!
//! Validation never touches a [`crate::loading_set::LoadingSet`] or the
//! global registry — it only looks at the descriptor and the engine's own
//! context version, the way `dashflow`'s `GraphValidation` inspects a
//! compiled graph in isolation before anything runs.

use std::collections::HashSet;

use crate::export::{ExportDescriptor, Linkage};
use crate::version::Version;

/// Reserved prefix for symbol/module names (spec.md §4.2 rule 3).
const RESERVED_PREFIX: &str = "__";

pub struct ExportValidator {
    context_version: Version,
}

impl ExportValidator {
    pub fn new(context_version: Version) -> Self {
        ExportValidator { context_version }
    }

    /// Validate `export` against all rules in spec.md §4.2. Returns the
    /// first violation found; a caller that wants every violation should
    /// call repeatedly is unnecessary here since a single string captures
    /// the actionable detail, matching how [`crate::error::Error::InvalidExport`]
    /// is reported (one reason per skip).
    pub fn validate(&self, export: &ExportDescriptor) -> Result<(), String> {
        // Rule 1: "next" pointer is null (reserved). There is no successor
        // field on `ExportDescriptor` in this engine's safe-Rust model, so
        // this rule is satisfied unconditionally; see export.rs.

        // Rule 2: context version compatible with the engine. The export's
        // `context_version` is the minimum it requires; the engine's is
        // what's actually provided.
        if !export.context_version.is_satisfied_by(&self.context_version) {
            return Err(format!(
                "context version {} is not compatible with engine context version {}",
                export.context_version, self.context_version
            ));
        }

        // Rule 3: name does not begin with the reserved prefix.
        if export.name.starts_with(RESERVED_PREFIX) {
            return Err(format!(
                "module name '{}' uses the reserved prefix '{RESERVED_PREFIX}'",
                export.name
            ));
        }

        // Rule 4: every imported namespace is non-empty and unique.
        let mut seen_ns = HashSet::new();
        for import in &export.namespace_imports {
            if import.namespace.is_empty() {
                return Err("namespace import must be non-empty".to_string());
            }
            if !seen_ns.insert(import.namespace.as_str()) {
                return Err(format!(
                    "namespace '{}' imported more than once",
                    import.namespace
                ));
            }
        }

        // Rule 5: every imported symbol's namespace is global or in the import set.
        for sym in &export.symbol_imports {
            if !sym.namespace.is_empty() && !seen_ns.contains(sym.namespace.as_str()) {
                return Err(format!(
                    "symbol import '{}' uses namespace '{}' which was not imported",
                    sym.name, sym.namespace
                ));
            }
        }

        // Rule 6: exported symbol names non-reserved, linkage global, not
        // also imported, no duplicate exports (static or dynamic).
        let imported_names: HashSet<(&str, &str)> = export
            .symbol_imports
            .iter()
            .map(|s| (s.name.as_str(), s.namespace.as_str()))
            .collect();

        let mut exported_names: HashSet<(&str, &str)> = HashSet::new();
        for sym in &export.symbol_exports {
            self.validate_export_name(&sym.name, &imported_names, (&sym.name, &sym.namespace), &mut exported_names)?;
            if sym.linkage != Linkage::Global {
                return Err(format!(
                    "exported symbol '{}' must use global linkage",
                    sym.name
                ));
            }
        }
        for sym in &export.dynamic_symbol_exports {
            self.validate_export_name(&sym.name, &imported_names, (&sym.name, &sym.namespace), &mut exported_names)?;
            if sym.linkage != Linkage::Global {
                return Err(format!(
                    "exported symbol '{}' must use global linkage",
                    sym.name
                ));
            }
        }

        // Rule 7: modifiers have known tags; the four singleton tags appear
        // at most once. `Dependency` modifiers (non-singleton) are exempt.
        let mut seen_tags = HashSet::new();
        for modifier in &export.modifiers {
            if modifier.is_singleton_tag() {
                let tag = match modifier {
                    crate::export::Modifier::DebugInfo => "debug_info",
                    crate::export::Modifier::InstanceState => "instance_state",
                    crate::export::Modifier::StartEvent => "start_event",
                    crate::export::Modifier::StopEvent => "stop_event",
                    crate::export::Modifier::Dependency { .. } => unreachable!(),
                };
                if !seen_tags.insert(tag) {
                    return Err(format!("modifier '{tag}' appears more than once"));
                }
            }
        }

        Ok(())
    }

    fn validate_export_name<'a>(
        &self,
        name: &str,
        imported_names: &HashSet<(&str, &str)>,
        key: (&'a str, &'a str),
        exported_names: &mut HashSet<(&'a str, &'a str)>,
    ) -> Result<(), String> {
        if name.starts_with(RESERVED_PREFIX) {
            return Err(format!(
                "exported symbol name '{name}' uses the reserved prefix '{RESERVED_PREFIX}'"
            ));
        }
        if imported_names.contains(&key) {
            return Err(format!(
                "symbol '{name}' is both imported and exported by the same module"
            ));
        }
        if !exported_names.insert(key) {
            return Err(format!("duplicate export of symbol '{name}'"));
        }
        Ok(())
    }
}
