//! Candidate scanner.
//!
//! Walks the plugin root, loads every module file into the module context
//! of its isolation unit and enumerates the plugin classes each module
//! declares. Failures are contained per file: a broken module is reported
//! through the event hub and the scan moves on.

use std::collections::HashSet;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tracing::{debug, info, warn};

use plughost_sdk::{PluginIdentity, PluginKey};

use crate::allow_list::AllowList;
use crate::descriptor::TypeDescriptor;
use crate::error::{panic_message, HostError, Result};
use crate::events::{EventHub, PluginEvent};
use crate::loader::{has_module_extension, ModuleLoader, NativeModuleLoader, ResidentModules};
use crate::module::{ModuleContext, ModuleOrigin};
use crate::security::{AllowAllGate, SecurityGate, ValidationResult};

/// A discovered plugin class.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub identity: PluginIdentity,
    pub descriptor: TypeDescriptor,
}

impl Candidate {
    pub fn description(&self) -> &str {
        self.descriptor.description()
    }
}

enum FileFailure {
    Rejected(ValidationResult),
    Failed(String),
}

impl From<HostError> for FileFailure {
    fn from(err: HostError) -> Self {
        FileFailure::Failed(err.to_string())
    }
}

/// Discovers plugin classes below a root directory.
pub struct CandidateScanner {
    root: PathBuf,
    extensions: Vec<String>,
    loader: Arc<dyn ModuleLoader>,
    resident: ResidentModules,
    gate: Arc<dyn SecurityGate>,
    events: EventHub,
    contexts: DashMap<PathBuf, Arc<ModuleContext>>,
    discovered: RwLock<HashSet<PluginKey>>,
}

impl CandidateScanner {
    /// Scanner using the native loader and a gate that accepts everything.
    pub fn new(root: impl Into<PathBuf>, extensions: Vec<String>, events: EventHub) -> Self {
        Self {
            root: root.into(),
            extensions,
            loader: Arc::new(NativeModuleLoader::new()),
            resident: ResidentModules::new(),
            gate: Arc::new(AllowAllGate),
            events,
            contexts: DashMap::new(),
            discovered: RwLock::new(HashSet::new()),
        }
    }

    pub fn with_loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn with_gate(mut self, gate: Arc<dyn SecurityGate>) -> Self {
        self.gate = gate;
        self
    }

    /// Modules that win over same-named files found on disk.
    pub fn with_resident_modules(mut self, resident: ResidentModules) -> Self {
        self.resident = resident;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scan every isolation unit and return all declared plugin classes.
    pub fn list_all_candidates(&self) -> Result<Vec<Candidate>> {
        let units = self.isolation_units()?;
        let mut candidates = Vec::new();
        for unit in &units {
            self.scan_unit(unit, &mut candidates);
        }

        *self.discovered.write() = candidates
            .iter()
            .map(|c| c.identity.key().clone())
            .collect();

        info!(
            category = "plugins",
            root = %self.root.display(),
            units = units.len(),
            candidates = candidates.len(),
            "Plugin scan complete"
        );
        Ok(candidates)
    }

    /// Scan, keeping only the candidates the allow-list admits.
    pub fn load_filtered(&self, allow: &AllowList) -> Result<Vec<Candidate>> {
        let candidates = self.list_all_candidates()?;
        Ok(candidates
            .into_iter()
            .filter(|c| allow.admits(&c.identity))
            .collect())
    }

    /// Keys found by the most recent scan.
    pub fn discovered(&self) -> HashSet<PluginKey> {
        self.discovered.read().clone()
    }

    pub fn is_discovered(&self, key: &PluginKey) -> bool {
        self.discovered.read().contains(key)
    }

    pub fn context(&self, directory: &Path) -> Option<Arc<ModuleContext>> {
        self.contexts.get(directory).map(|c| c.value().clone())
    }

    pub fn contexts(&self) -> Vec<Arc<ModuleContext>> {
        self.contexts.iter().map(|c| c.value().clone()).collect()
    }

    /// Unload the context of one isolation unit. Returns `false` if none was held.
    pub fn unload(&self, directory: &Path) -> bool {
        match self.contexts.remove(directory) {
            Some((_, ctx)) => {
                ctx.unload();
                true
            }
            None => false,
        }
    }

    fn isolation_units(&self) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(&self.root).map_err(|e| {
            HostError::Scan(format!("cannot read plugin root {}: {}", self.root.display(), e))
        })?;

        let mut units: Vec<PathBuf> = entries
            .flatten()
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        units.sort();
        Ok(units)
    }

    fn module_files(&self, dir: &Path, out: &mut Vec<PathBuf>) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(
                    category = "plugins",
                    directory = %dir.display(),
                    error = %e,
                    "Cannot read plugin directory"
                );
                return;
            }
        };

        let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        paths.sort();
        for path in paths {
            if path.is_dir() {
                self.module_files(&path, out);
            } else if has_module_extension(&path, &self.extensions) {
                out.push(path);
            }
        }
    }

    fn context_for(&self, directory: &Path) -> Arc<ModuleContext> {
        let mut entry = self
            .contexts
            .entry(directory.to_path_buf())
            .or_insert_with(|| Arc::new(ModuleContext::new(directory)));
        if entry.is_unloaded() {
            *entry = Arc::new(ModuleContext::new(directory));
        }
        entry.value().clone()
    }

    fn scan_unit(&self, directory: &Path, out: &mut Vec<Candidate>) {
        let ctx = self.context_for(directory);
        let mut files = Vec::new();
        self.module_files(directory, &mut files);

        for file in files {
            match self.scan_file(&ctx, &file) {
                Ok(mut found) => out.append(&mut found),
                Err(FileFailure::Rejected(result)) => {
                    warn!(
                        category = "plugins",
                        file = %file.display(),
                        reason = %result.summary(),
                        "Module rejected by security gate"
                    );
                    self.events.publish(&PluginEvent::SecurityValidationFailed {
                        file,
                        directory: directory.to_path_buf(),
                        result,
                    });
                }
                Err(FileFailure::Failed(cause)) => {
                    warn!(
                        category = "plugins",
                        file = %file.display(),
                        error = %cause,
                        "Module load failed"
                    );
                    self.events.publish(&PluginEvent::ModuleLoadFailed {
                        file,
                        directory: directory.to_path_buf(),
                        cause,
                    });
                }
            }
        }
    }

    fn scan_file(
        &self,
        ctx: &Arc<ModuleContext>,
        file: &Path,
    ) -> std::result::Result<Vec<Candidate>, FileFailure> {
        let path_check = self.gate.validate_path(file);
        self.log_warnings(file, &path_check);
        if path_check.is_rejected() {
            return Err(FileFailure::Rejected(path_check));
        }

        let result = catch_unwind(AssertUnwindSafe(|| self.load_candidates(ctx, file)))
            .unwrap_or_else(|payload| {
                Err(FileFailure::Failed(format!(
                    "panicked while loading: {}",
                    panic_message(payload.as_ref())
                )))
            });
        if result.is_err() {
            ctx.evict(file);
        }
        result
    }

    fn load_candidates(
        &self,
        ctx: &Arc<ModuleContext>,
        file: &Path,
    ) -> std::result::Result<Vec<Candidate>, FileFailure> {
        let mut module = ctx.load_with(file, self.loader.as_ref())?;

        if module.origin() == ModuleOrigin::Native && self.resident.contains(module.name()) {
            let resident = self.resident.load(file)?;
            module = ctx.replace(file, resident);
            debug!(
                category = "plugins",
                module = %module.name(),
                "Using resident copy of module"
            );
        }

        let module_check = self.gate.validate_module(&module);
        self.log_warnings(file, &module_check);
        if module_check.is_rejected() {
            return Err(FileFailure::Rejected(module_check));
        }

        let types_check = self.gate.validate_types(module.declarations());
        self.log_warnings(file, &types_check);
        if types_check.is_rejected() {
            return Err(FileFailure::Rejected(types_check));
        }

        let mut candidates = Vec::with_capacity(module.declarations().len());
        for declaration in module.declarations() {
            let descriptor = TypeDescriptor::new(declaration, &module, ctx)?;
            candidates.push(Candidate {
                identity: descriptor.identity().clone(),
                descriptor,
            });
        }
        Ok(candidates)
    }

    fn log_warnings(&self, file: &Path, result: &ValidationResult) {
        for warning in &result.warnings {
            warn!(
                category = "plugins",
                file = %file.display(),
                warning = %warning,
                "Security warning"
            );
        }
    }
}

impl fmt::Debug for CandidateScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandidateScanner")
            .field("root", &self.root)
            .field("extensions", &self.extensions)
            .field("contexts", &self.contexts.len())
            .finish_non_exhaustive()
    }
}
