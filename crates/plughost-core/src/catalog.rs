//! Plugin catalog manager.
//!
//! Public entry point of the host: owns the allow-list, the scanner and
//! the versioned registry, and hands out plugin instances.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use semver::Version;
use serde::Serialize;
use tracing::{debug, info, warn};

use plughost_sdk::{ExecutionContext, PluginError, PluginIdentity, PluginKey};

use crate::allow_list::AllowList;
use crate::config::HostConfig;
use crate::descriptor::{PluginInstance, TypeDescriptor};
use crate::error::{panic_message, HostError, Result};
use crate::events::{EventHub, PluginEvent, SubscriptionId};
use crate::executor::{ExecutionFailure, ExecutionOutcome, ExecutionSandbox, Stopwatch};
use crate::loader::{ModuleLoader, NativeModuleLoader, ResidentModules};
use crate::logging::TracingLogger;
use crate::registry::{PluginSummary, VersionedPluginRegistry};
use crate::scanner::{Candidate, CandidateScanner};
use crate::security::{AllowAllGate, SecurityGate};

/// Result of [`PluginCatalogManager::refresh`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshReport {
    pub success: bool,
    /// Admitted candidates upserted by this refresh
    pub count: usize,
    pub error: Option<String>,
}

impl RefreshReport {
    fn ok(count: usize) -> Self {
        Self {
            success: true,
            count,
            error: None,
        }
    }

    fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            count: 0,
            error: Some(error.into()),
        }
    }
}

/// Lifecycle state of a logical plugin as seen by the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginStatus {
    /// Never discovered
    Unknown,
    /// Found by the last scan but not admitted
    Discovered,
    /// Admitted by the allow-list, not yet registered
    Admitted,
    /// At least one version is registered
    Registered,
    /// Every registered version was removed
    Evicted,
}

/// Builder for [`PluginCatalogManager`].
pub struct CatalogBuilder {
    config: HostConfig,
    loader: Arc<dyn ModuleLoader>,
    gate: Arc<dyn SecurityGate>,
    resident: ResidentModules,
    events: EventHub,
    allow_list: AllowList,
}

impl CatalogBuilder {
    pub fn loader(mut self, loader: Arc<dyn ModuleLoader>) -> Self {
        self.loader = loader;
        self
    }

    pub fn security_gate(mut self, gate: Arc<dyn SecurityGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn resident_modules(mut self, resident: ResidentModules) -> Self {
        self.resident = resident;
        self
    }

    pub fn events(mut self, events: EventHub) -> Self {
        self.events = events;
        self
    }

    pub fn allow_list(mut self, allow_list: AllowList) -> Self {
        self.allow_list = allow_list;
        self
    }

    /// Validate the configuration and build the catalog.
    pub fn build(self) -> Result<PluginCatalogManager> {
        self.config.validate()?;

        let scanner = CandidateScanner::new(
            self.config.plugin_root.clone(),
            self.config.normalized_extensions(),
            self.events.clone(),
        )
        .with_loader(self.loader)
        .with_gate(self.gate)
        .with_resident_modules(self.resident);

        info!(
            category = "plugins",
            root = %self.config.plugin_root.display(),
            max_versions = self.config.max_versions,
            "Plugin catalog created"
        );

        Ok(PluginCatalogManager {
            registry: VersionedPluginRegistry::new(self.config.max_versions),
            scanner: Arc::new(scanner),
            allow_list: RwLock::new(self.allow_list),
            sandbox: ExecutionSandbox::new(self.events.clone()),
            events: self.events,
            config: self.config,
        })
    }
}

/// Discovers, admits, registers and instantiates plugins.
pub struct PluginCatalogManager {
    config: HostConfig,
    scanner: Arc<CandidateScanner>,
    registry: VersionedPluginRegistry<TypeDescriptor>,
    allow_list: RwLock<AllowList>,
    events: EventHub,
    sandbox: ExecutionSandbox,
}

impl PluginCatalogManager {
    /// Catalog with the native loader and a gate that accepts everything.
    pub fn new(config: HostConfig) -> Result<Self> {
        Self::builder(config).build()
    }

    pub fn builder(config: HostConfig) -> CatalogBuilder {
        CatalogBuilder {
            config,
            loader: Arc::new(NativeModuleLoader::new()),
            gate: Arc::new(AllowAllGate),
            resident: ResidentModules::new(),
            events: EventHub::new(),
            allow_list: AllowList::new(),
        }
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    /// Shorthand for `events().subscribe(..)`.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&PluginEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(callback)
    }

    pub fn registry(&self) -> &VersionedPluginRegistry<TypeDescriptor> {
        &self.registry
    }

    pub fn sandbox(&self) -> &ExecutionSandbox {
        &self.sandbox
    }

    pub fn scanner(&self) -> &CandidateScanner {
        &self.scanner
    }

    // ------------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------------

    /// Add an identity to the allow-list. Takes effect on the next refresh.
    pub fn allow(&self, identity: PluginIdentity) -> bool {
        debug!(category = "plugins", plugin = %identity, "Allowed");
        self.allow_list.write().allow(identity)
    }

    /// Remove an identity from the allow-list and unregister that version now.
    pub fn disallow(&self, identity: &PluginIdentity) -> bool {
        let listed = self.allow_list.write().disallow(identity);
        let registered = self.registry.remove_version(identity);
        debug!(
            category = "plugins",
            plugin = %identity,
            listed,
            registered,
            "Disallowed"
        );
        listed || registered
    }

    /// Snapshot of the allow-list.
    pub fn allow_list(&self) -> AllowList {
        self.allow_list.read().clone()
    }

    // ------------------------------------------------------------------------
    // Discovery
    // ------------------------------------------------------------------------

    /// Rescan the plugin root and upsert every admitted candidate.
    pub async fn refresh(&self) -> RefreshReport {
        let scanner = self.scanner.clone();
        let allow = self.allow_list();
        let scanned = tokio::task::spawn_blocking(move || scanner.load_filtered(&allow)).await;

        match scanned {
            Ok(Ok(candidates)) => self.register_candidates(candidates),
            Ok(Err(err)) => self.refresh_failed(err.to_string()),
            Err(join_err) if join_err.is_panic() => self.refresh_failed(format!(
                "scan panicked: {}",
                panic_message(join_err.into_panic().as_ref())
            )),
            Err(join_err) => self.refresh_failed(join_err.to_string()),
        }
    }

    /// Blocking variant of [`refresh`](Self::refresh) for callers outside a runtime.
    pub fn refresh_blocking(&self) -> RefreshReport {
        let allow = self.allow_list();
        match catch_unwind(AssertUnwindSafe(|| self.scanner.load_filtered(&allow))) {
            Ok(Ok(candidates)) => self.register_candidates(candidates),
            Ok(Err(err)) => self.refresh_failed(err.to_string()),
            Err(payload) => {
                self.refresh_failed(format!("scan panicked: {}", panic_message(payload.as_ref())))
            }
        }
    }

    /// Upsert scanned candidates still admitted by the current allow-list.
    ///
    /// The read guard is held across the upserts so a concurrent `disallow`
    /// either lands before the admission check or removes the version after.
    fn register_candidates(&self, candidates: Vec<Candidate>) -> RefreshReport {
        let allow = self.allow_list.read();
        let mut count = 0;
        for candidate in candidates {
            if !allow.admits(&candidate.identity) {
                debug!(
                    category = "plugins",
                    plugin = %candidate.identity,
                    "Skipping candidate disallowed during scan"
                );
                continue;
            }
            let description = candidate.description().to_string();
            self.registry
                .upsert(&candidate.identity, &description, candidate.descriptor);
            count += 1;
        }
        drop(allow);
        info!(category = "plugins", registered = count, "Plugin catalog refreshed");
        RefreshReport::ok(count)
    }

    fn refresh_failed(&self, error: String) -> RefreshReport {
        warn!(category = "plugins", error = %error, "Plugin catalog refresh failed");
        RefreshReport::failed(error)
    }

    /// Every discovered candidate, ignoring the allow-list.
    pub fn possible_plugins(&self) -> Result<Vec<Candidate>> {
        self.scanner.list_all_candidates()
    }

    /// Registered plugins with their descriptions and retained versions.
    pub fn registered_plugins(&self) -> Vec<PluginSummary> {
        self.registry.list_all()
    }

    // ------------------------------------------------------------------------
    // Instances
    // ------------------------------------------------------------------------

    /// Fresh instance of the newest registered version.
    ///
    /// Returns `None` on a miss. Construction failures are published as
    /// [`PluginEvent::InstantiationFailed`] and also yield `None`.
    pub fn get_instance(&self, module: &str, name: &str) -> Option<PluginInstance> {
        let key = PluginKey::new(module, name).ok()?;
        let (_, descriptor) = self.registry.get_newest(&key)?;
        self.instantiate(&descriptor)
    }

    /// Fresh instance of one exact registered version.
    pub fn get_instance_version(
        &self,
        module: &str,
        name: &str,
        version: &Version,
    ) -> Option<PluginInstance> {
        let identity = PluginIdentity::new(module, name, version.clone()).ok()?;
        let descriptor = self.registry.try_get_version(&identity)?;
        self.instantiate(&descriptor)
    }

    fn instantiate(&self, descriptor: &TypeDescriptor) -> Option<PluginInstance> {
        let result = catch_unwind(AssertUnwindSafe(|| descriptor.instantiate()))
            .unwrap_or_else(|payload| {
                Err(HostError::Plugin(PluginError::ConstructionFailed(format!(
                    "instantiation panicked: {}",
                    panic_message(payload.as_ref())
                ))))
            });

        match result {
            Ok(instance) => Some(instance),
            Err(err) => {
                let identity = descriptor.identity();
                warn!(
                    category = "plugins",
                    plugin = %identity,
                    error = %err,
                    "Plugin instantiation failed"
                );
                self.events.publish(&PluginEvent::InstantiationFailed {
                    module: identity.module().to_string(),
                    name: identity.name().to_string(),
                    version: Some(identity.version().clone()),
                    cause: err.to_string(),
                });
                None
            }
        }
    }

    /// Resolve, instantiate and run a text plugin in the sandbox.
    ///
    /// `timeout` falls back to the configured default.
    pub fn execute(
        &self,
        module: &str,
        name: &str,
        version: Option<&Version>,
        input: &str,
        timeout: Option<Duration>,
    ) -> ExecutionOutcome<String> {
        let watch = Stopwatch::start();
        let instance = match version {
            Some(v) => self.get_instance_version(module, name, v),
            None => self.get_instance(module, name),
        };
        let Some(instance) = instance else {
            return ExecutionOutcome::failure(
                ExecutionFailure::NotFound(not_found_label(module, name, version)),
                &watch,
            );
        };

        let input = input.to_string();
        let identity = instance.identity();
        let logger = Arc::new(TracingLogger::new(identity.module(), identity.name()));
        self.sandbox.execute_safely(
            &instance,
            move |plugin, token| {
                let ctx = ExecutionContext::builder()
                    .logger(logger)
                    .cancellation(token.clone())
                    .build();
                plugin.invoke(&ctx, &input)
            },
            timeout.or_else(|| self.config.default_timeout()),
        )
    }

    // ------------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------------

    /// Where a logical plugin stands in the discover/admit/register cycle.
    pub fn status(&self, module: &str, name: &str) -> PluginStatus {
        let Ok(key) = PluginKey::new(module, name) else {
            return PluginStatus::Unknown;
        };
        if self.registry.contains_key(&key) {
            return if self.registry.is_retired(&key) {
                PluginStatus::Evicted
            } else {
                PluginStatus::Registered
            };
        }

        let allow = self.allow_list.read();
        let discovered = self.scanner.is_discovered(&key);
        if allow.lists_key(&key) || (discovered && allow.is_empty()) {
            PluginStatus::Admitted
        } else if discovered {
            PluginStatus::Discovered
        } else {
            PluginStatus::Unknown
        }
    }

    /// Unload one isolation unit and drop its registry entries.
    ///
    /// Instances already handed out keep working. Returns the number of
    /// versions removed from the registry.
    pub fn unload_directory(&self, directory: &Path) -> usize {
        if !self.scanner.unload(directory) {
            return 0;
        }
        let removed = self.compact();
        info!(
            category = "plugins",
            directory = %directory.display(),
            removed,
            "Isolation unit unloaded"
        );
        removed
    }

    /// Drop registry versions whose module context is gone.
    pub fn compact(&self) -> usize {
        self.registry.compact(TypeDescriptor::is_live)
    }
}

fn not_found_label(module: &str, name: &str, version: Option<&Version>) -> String {
    match version {
        Some(v) => format!("{}/{}@{}", module, name, v),
        None => format!("{}/{}", module, name),
    }
}

impl fmt::Debug for PluginCatalogManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginCatalogManager")
            .field("root", &self.config.plugin_root)
            .field("entries", &self.registry.len())
            .field("allowed", &self.allow_list.read().len())
            .finish()
    }
}
