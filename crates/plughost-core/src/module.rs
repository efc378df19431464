//! Loaded modules and isolation contexts.
//!
//! A [`ModuleContext`] is the arena for one isolation unit (one
//! subdirectory of the plugin root). It exclusively owns the modules loaded
//! from that directory. Registry descriptors only hold weak references into
//! it; live plugin instances hold their own strong reference to the module
//! that created them, so a library stays mapped until the last instance
//! built from it is dropped.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use libloading::Library;
use parking_lot::RwLock;
use tracing::{debug, info};

use plughost_sdk::PluginDeclaration;

use crate::error::{HostError, Result};
use crate::loader::ModuleLoader;

/// Where a module's code comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleOrigin {
    /// Dynamically loaded from disk
    Native,
    /// Already resident in the host process
    Resident,
}

/// One module and the plugin classes it declared.
pub struct LoadedModule {
    name: String,
    path: PathBuf,
    origin: ModuleOrigin,
    declarations: Vec<PluginDeclaration>,
    loaded_at: DateTime<Utc>,
    // Dropped last: declarations point into the library
    library: Option<Library>,
}

impl LoadedModule {
    /// Module backed by a dynamically loaded library.
    pub fn native(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        library: Library,
        declarations: Vec<PluginDeclaration>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            origin: ModuleOrigin::Native,
            declarations,
            loaded_at: Utc::now(),
            library: Some(library),
        }
    }

    /// Module whose code is linked into the host.
    pub fn resident(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        declarations: Vec<PluginDeclaration>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            origin: ModuleOrigin::Resident,
            declarations,
            loaded_at: Utc::now(),
            library: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn origin(&self) -> ModuleOrigin {
        self.origin
    }

    pub fn declarations(&self) -> &[PluginDeclaration] {
        &self.declarations
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }

    pub fn has_library(&self) -> bool {
        self.library.is_some()
    }
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("origin", &self.origin)
            .field("declarations", &self.declarations.len())
            .finish()
    }
}

/// Isolation boundary for one plugin subdirectory.
pub struct ModuleContext {
    directory: PathBuf,
    modules: RwLock<HashMap<PathBuf, Arc<LoadedModule>>>,
    unloaded: AtomicBool,
    created_at: DateTime<Utc>,
}

impl ModuleContext {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            modules: RwLock::new(HashMap::new()),
            unloaded: AtomicBool::new(false),
            created_at: Utc::now(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_unloaded(&self) -> bool {
        self.unloaded.load(Ordering::Acquire)
    }

    /// Load `path` through `loader`, reusing the module if this context already holds it.
    pub fn load_with(&self, path: &Path, loader: &dyn ModuleLoader) -> Result<Arc<LoadedModule>> {
        if self.is_unloaded() {
            return Err(HostError::Unloaded(self.directory.clone()));
        }
        if let Some(module) = self.modules.read().get(path) {
            return Ok(module.clone());
        }

        let module = Arc::new(loader.load(path)?);
        let mut modules = self.modules.write();
        // Another scan may have raced us; keep the first one
        let module = modules.entry(path.to_path_buf()).or_insert(module).clone();
        debug!(
            category = "plugins",
            directory = %self.directory.display(),
            module = %module.name(),
            "Module loaded into context"
        );
        Ok(module)
    }

    /// Replace whatever is held for `path` with `module`.
    pub fn replace(&self, path: &Path, module: LoadedModule) -> Arc<LoadedModule> {
        let module = Arc::new(module);
        self.modules.write().insert(path.to_path_buf(), module.clone());
        module
    }

    /// Drop the module held for `path`, if any.
    pub fn evict(&self, path: &Path) -> bool {
        self.modules.write().remove(path).is_some()
    }

    pub fn module(&self, path: &Path) -> Option<Arc<LoadedModule>> {
        self.modules.read().get(path).cloned()
    }

    pub fn modules(&self) -> Vec<Arc<LoadedModule>> {
        self.modules.read().values().cloned().collect()
    }

    pub fn module_count(&self) -> usize {
        self.modules.read().len()
    }

    /// Mark the context unloaded and release its modules.
    ///
    /// Descriptors into this context stop producing instances immediately.
    /// Returns the number of modules released.
    pub fn unload(&self) -> usize {
        self.unloaded.store(true, Ordering::Release);
        let released: Vec<_> = self.modules.write().drain().collect();
        info!(
            category = "plugins",
            directory = %self.directory.display(),
            modules = released.len(),
            "Module context unloaded"
        );
        released.len()
    }
}

impl fmt::Debug for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleContext")
            .field("directory", &self.directory)
            .field("modules", &self.module_count())
            .field("unloaded", &self.is_unloaded())
            .finish()
    }
}
