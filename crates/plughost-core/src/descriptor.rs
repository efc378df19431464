//! Type descriptors and live plugin instances.
//!
//! A [`TypeDescriptor`] is the host's handle to one declared plugin class.
//! It references its module and context weakly; instantiating through an
//! unloaded context fails instead of touching unmapped code.

use std::fmt;
use std::ops::Deref;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

use serde::Serialize;

use plughost_sdk::{
    Contract, Plugin, PluginDeclaration, PluginError, PluginFactory, PluginIdentity,
    PluginMetadata,
};

use crate::error::{panic_message, HostError, Result};
use crate::module::{LoadedModule, ModuleContext};

/// Contract of a plugin class, owned by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractInfo {
    Text,
    Json { input: String, output: String },
}

impl ContractInfo {
    pub fn is_json(&self) -> bool {
        matches!(self, ContractInfo::Json { .. })
    }
}

impl From<&Contract> for ContractInfo {
    fn from(contract: &Contract) -> Self {
        match contract {
            Contract::Text => ContractInfo::Text,
            Contract::Json { input, output } => ContractInfo::Json {
                input: (*input).to_string(),
                output: (*output).to_string(),
            },
        }
    }
}

/// Handle to one declared plugin class inside a loaded module.
#[derive(Clone)]
pub struct TypeDescriptor {
    identity: PluginIdentity,
    metadata: PluginMetadata,
    contract: ContractInfo,
    factory: PluginFactory,
    module_path: PathBuf,
    module: Weak<LoadedModule>,
    context: Weak<ModuleContext>,
}

impl TypeDescriptor {
    /// Describe `declaration` as declared by `module` inside `context`.
    pub fn new(
        declaration: &PluginDeclaration,
        module: &Arc<LoadedModule>,
        context: &Arc<ModuleContext>,
    ) -> Result<Self> {
        let identity = declaration.metadata.identity()?;
        Ok(Self {
            identity,
            metadata: declaration.metadata.clone(),
            contract: ContractInfo::from(&declaration.contract),
            factory: declaration.factory,
            module_path: module.path().to_path_buf(),
            module: Arc::downgrade(module),
            context: Arc::downgrade(context),
        })
    }

    pub fn identity(&self) -> &PluginIdentity {
        &self.identity
    }

    pub fn metadata(&self) -> &PluginMetadata {
        &self.metadata
    }

    pub fn description(&self) -> &str {
        &self.metadata.description
    }

    pub fn contract(&self) -> &ContractInfo {
        &self.contract
    }

    pub fn module_path(&self) -> &Path {
        &self.module_path
    }

    /// Whether the owning context and module are still alive.
    pub fn is_live(&self) -> bool {
        let context_live = self
            .context
            .upgrade()
            .map(|ctx| !ctx.is_unloaded())
            .unwrap_or(false);
        context_live && self.module.strong_count() > 0
    }

    /// Build a fresh instance. Panics in the factory are returned as errors.
    pub fn instantiate(&self) -> Result<PluginInstance> {
        let context = self
            .context
            .upgrade()
            .filter(|ctx| !ctx.is_unloaded())
            .ok_or_else(|| HostError::Unloaded(self.module_path.clone()))?;
        let module = self
            .module
            .upgrade()
            .ok_or_else(|| HostError::Unloaded(self.module_path.clone()))?;
        drop(context);

        let plugin = catch_unwind(AssertUnwindSafe(|| (self.factory)()))
            .map_err(|payload| {
                PluginError::ConstructionFailed(format!(
                    "factory panicked: {}",
                    panic_message(payload.as_ref())
                ))
            })??;

        Ok(PluginInstance {
            plugin: Arc::from(plugin),
            identity: self.identity.clone(),
            description: self.metadata.description.clone(),
            contract: self.contract.clone(),
            _module: module,
        })
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("identity", &self.identity)
            .field("contract", &self.contract)
            .field("module_path", &self.module_path)
            .field("live", &self.is_live())
            .finish()
    }
}

/// A constructed plugin.
///
/// Keeps its module mapped for as long as any clone is alive.
#[derive(Clone)]
pub struct PluginInstance {
    // Declared before `_module` so the plugin is dropped first
    plugin: Arc<dyn Plugin>,
    identity: PluginIdentity,
    description: String,
    contract: ContractInfo,
    _module: Arc<LoadedModule>,
}

impl PluginInstance {
    pub fn identity(&self) -> &PluginIdentity {
        &self.identity
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn contract(&self) -> &ContractInfo {
        &self.contract
    }

    pub fn plugin(&self) -> &dyn Plugin {
        self.plugin.as_ref()
    }
}

impl Deref for PluginInstance {
    type Target = dyn Plugin;

    fn deref(&self) -> &Self::Target {
        self.plugin.as_ref()
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInstance")
            .field("identity", &self.identity)
            .field("contract", &self.contract)
            .finish_non_exhaustive()
    }
}
