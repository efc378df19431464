//! Shared fixtures: in-process plugin modules and an on-disk plugin root
//! whose files are resolved by name through `ResidentModules`.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use plughost_core::{
    AllowList, EventHub, HostConfig, PluginCatalogManager, PluginEvent, ResidentModules,
};
use plughost_sdk::prelude::*;
use plughost_sdk::{ModuleDeclaration, PluginDeclaration, PluginRegistrar};
use tempfile::TempDir;

pub struct AlphaV1;

impl PluginClass for AlphaV1 {
    fn metadata() -> PluginMetadata {
        PluginMetadata::new("Test", "Alpha", Version::new(1, 0, 0)).with_description("Alpha one")
    }

    fn construct() -> PluginResult<Self> {
        Ok(AlphaV1)
    }
}

impl Plugin for AlphaV1 {
    fn invoke(&self, _ctx: &ExecutionContext, input: &str) -> PluginResult<String> {
        Ok(format!("alpha-1.0.0:{}", input))
    }
}

pub struct AlphaV11;

impl PluginClass for AlphaV11 {
    fn metadata() -> PluginMetadata {
        PluginMetadata::new("Test", "Alpha", Version::new(1, 1, 0)).with_description("Alpha one-one")
    }

    fn construct() -> PluginResult<Self> {
        Ok(AlphaV11)
    }
}

impl Plugin for AlphaV11 {
    fn invoke(&self, _ctx: &ExecutionContext, input: &str) -> PluginResult<String> {
        Ok(format!("alpha-1.1.0:{}", input))
    }
}

pub struct BetaV2;

impl PluginClass for BetaV2 {
    fn metadata() -> PluginMetadata {
        PluginMetadata::new("Test", "Beta", Version::new(2, 0, 0)).with_description("Beta")
    }

    fn construct() -> PluginResult<Self> {
        Ok(BetaV2)
    }
}

impl Plugin for BetaV2 {
    fn invoke(&self, _ctx: &ExecutionContext, input: &str) -> PluginResult<String> {
        Ok(input.len().to_string())
    }
}

pub struct Broken;

impl PluginClass for Broken {
    fn metadata() -> PluginMetadata {
        PluginMetadata::new("Test", "Broken", Version::new(0, 1, 0))
    }

    fn construct() -> PluginResult<Self> {
        Err(PluginError::ConstructionFailed("missing resource".to_string()))
    }
}

impl Plugin for Broken {
    fn invoke(&self, _ctx: &ExecutionContext, _input: &str) -> PluginResult<String> {
        unreachable!("never constructed")
    }
}

fn register_alpha_beta(registrar: &mut dyn PluginRegistrar) {
    registrar.register(PluginDeclaration::basic::<AlphaV1>());
    registrar.register(PluginDeclaration::basic::<BetaV2>());
}

fn register_alpha_next(registrar: &mut dyn PluginRegistrar) {
    registrar.register(PluginDeclaration::basic::<AlphaV11>());
}

fn register_broken(registrar: &mut dyn PluginRegistrar) {
    registrar.register(PluginDeclaration::basic::<Broken>());
}

fn register_panicking(_: &mut dyn PluginRegistrar) {
    panic!("module registration failed");
}

/// Every fixture module, keyed by the file stem that selects it.
pub fn resident_modules() -> ResidentModules {
    ResidentModules::new()
        .with_module("alpha_beta", ModuleDeclaration::new(register_alpha_beta))
        .with_module("alpha_next", ModuleDeclaration::new(register_alpha_next))
        .with_module("broken", ModuleDeclaration::new(register_broken))
        .with_module("panicking", ModuleDeclaration::new(register_panicking))
        .with_module(
            "plughost_sample_plugins",
            plughost_sample_plugins::PLUGHOST_MODULE,
        )
}

/// Temporary plugin root with placeholder module files.
pub struct PluginRoot {
    dir: TempDir,
}

impl PluginRoot {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create plugin root"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Create `<root>/<unit>/<relative>` and return its path.
    pub fn add(&self, unit: &str, relative: &str) -> PathBuf {
        let path = self.dir.path().join(unit).join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"").unwrap();
        path
    }

    pub fn unit(&self, unit: &str) -> PathBuf {
        self.dir.path().join(unit)
    }

    pub fn config(&self) -> HostConfig {
        HostConfig::new(self.path()).with_module_extensions(["so"])
    }
}

/// Event hub that records every published event.
pub fn recording_hub() -> (EventHub, Arc<Mutex<Vec<PluginEvent>>>) {
    let hub = EventHub::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    hub.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
    (hub, seen)
}

/// Catalog that resolves files through the fixture modules.
pub fn catalog(config: HostConfig, allow: AllowList, events: EventHub) -> PluginCatalogManager {
    PluginCatalogManager::builder(config)
        .loader(Arc::new(resident_modules()))
        .allow_list(allow)
        .events(events)
        .build()
        .expect("build catalog")
}

pub fn kinds(events: &Mutex<Vec<PluginEvent>>) -> Vec<&'static str> {
    events.lock().unwrap().iter().map(PluginEvent::kind).collect()
}
