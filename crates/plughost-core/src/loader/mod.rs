//! Module loaders.
//!
//! A [`ModuleLoader`] turns a file into a [`LoadedModule`]. The native
//! loader maps dynamic libraries; [`ResidentModules`] serves modules that
//! are already linked into the host.

pub mod native;
pub mod resident;

use std::path::Path;

pub use native::NativeModuleLoader;
pub use resident::ResidentModules;

use crate::error::Result;
use crate::module::LoadedModule;

/// Loads one module file.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<LoadedModule>;
}

/// Module name derived from a file path (e.g., `libmy_plugins.so` -> `my_plugins`).
pub fn module_name(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|n| n.to_str())
        .unwrap_or("unknown");
    match stem.strip_prefix("lib") {
        Some(rest) if !rest.is_empty() => rest.to_string(),
        _ => stem.to_string(),
    }
}

/// Check if a path has one of the given extensions (compared case-insensitively).
pub fn has_module_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}
