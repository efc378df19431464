//! Modules already linked into the host process.
//!
//! When a scanned file names a module that is resident here, the resident
//! copy is used instead of the freshly loaded library, so the host and its
//! plugins agree on one copy of shared code.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;

use plughost_sdk::{ModuleDeclaration, ABI_VERSION, SDK_VERSION};

use super::{module_name, ModuleLoader};
use crate::error::{panic_message, HostError, Result};
use crate::module::LoadedModule;

/// Table of in-process module declarations keyed by module name.
#[derive(Debug, Clone, Default)]
pub struct ResidentModules {
    modules: Arc<RwLock<HashMap<String, ModuleDeclaration>>>,
}

impl ResidentModules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_module(self, name: impl Into<String>, declaration: ModuleDeclaration) -> Self {
        self.register(name, declaration);
        self
    }

    /// Register a module under `name`, replacing any previous entry.
    pub fn register(&self, name: impl Into<String>, declaration: ModuleDeclaration) {
        self.modules.write().insert(name.into(), declaration);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.read().contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<ModuleDeclaration> {
        self.modules.read().get(name).copied()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.modules.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.modules.read().is_empty()
    }
}

impl ModuleLoader for ResidentModules {
    fn load(&self, path: &Path) -> Result<LoadedModule> {
        let name = module_name(path);
        let declaration = self
            .get(&name)
            .ok_or_else(|| HostError::load(path, format!("no resident module named '{}'", name)))?;

        if !declaration.is_compatible() {
            return Err(HostError::AbiMismatch {
                path: path.to_path_buf(),
                abi_version: declaration.abi_version,
                sdk_version: declaration.sdk_version.to_string(),
                host_abi: ABI_VERSION,
                host_sdk: SDK_VERSION.to_string(),
            });
        }

        let declarations = catch_unwind(AssertUnwindSafe(|| declaration.declarations()))
            .map_err(|payload| HostError::RegistrationPanicked {
                path: path.to_path_buf(),
                message: panic_message(payload.as_ref()),
            })?;

        Ok(LoadedModule::resident(name, path, declarations))
    }
}
