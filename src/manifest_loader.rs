// Copyright 2026 ModKit Contributors

//! Reference [`PathLoader`] reading `*.module.json` manifests from a
//! directory (SPEC_FULL.md §10). Stands in for the platform shared-library
//! loader this engine deliberately leaves out of scope; every manifest is
//! deserialized straight into an [`ExportDescriptor`] and paired with a
//! [`NullFactory`], so modules loaded this way have no real construction
//! behavior beyond what their export declares.

use std::fs;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::export::ExportDescriptor;
use crate::instance::{ModuleHandle, NullFactory};
use crate::loading_set::PathLoader;

const MANIFEST_SUFFIX: &str = ".module.json";

/// Loads every `*.module.json` file directly inside `path` (non-recursive)
/// as an [`ExportDescriptor`], in directory-iteration order.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManifestDirLoader;

impl PathLoader for ManifestDirLoader {
    fn load(&self, path: &str) -> Result<Vec<Arc<ModuleHandle>>> {
        let entries = fs::read_dir(path).map_err(|e| Error::NotFound(format!("directory '{path}': {e}")))?;

        let mut handles = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::NotFound(format!("reading '{path}': {e}")))?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else { continue };
            if !file_name.ends_with(MANIFEST_SUFFIX) {
                continue;
            }

            let contents = fs::read_to_string(entry.path())
                .map_err(|e| Error::NotFound(format!("reading manifest '{file_name}': {e}")))?;
            let export: ExportDescriptor = serde_json::from_str(&contents)
                .map_err(|e| Error::InvalidExport {
                    module: file_name.to_string(),
                    reason: e.to_string(),
                })?;

            handles.push(ModuleHandle::new(Arc::new(export), Arc::new(NullFactory)));
        }
        Ok(handles)
    }
}
