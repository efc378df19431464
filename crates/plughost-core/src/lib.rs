//! # plughost-core
//!
//! Runtime plugin host. Discovers plugin classes inside native modules,
//! loads each plugin directory into its own module context, keeps a
//! bounded set of versions per logical plugin and runs plugins with their
//! failures contained.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use plughost_core::{HostConfig, PluginCatalogManager};
//!
//! # async fn run() -> plughost_core::Result<()> {
//! let config = HostConfig::new("/opt/app/plugins").with_env_overrides()?;
//! plughost_core::init_tracing(&config.logging)?;
//!
//! let catalog = PluginCatalogManager::new(config)?;
//! let report = catalog.refresh().await;
//! println!("registered {} plugins", report.count);
//!
//! let outcome = catalog.execute("Acme.Text", "Upper", None, "hello", None);
//! if let Some(text) = outcome.data() {
//!     println!("{}", text);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Layout
//!
//! - [`registry`]: versioned, retention-bounded store of type descriptors
//! - [`scanner`]: walks the plugin root, one [`ModuleContext`] per subdirectory
//! - [`catalog`]: allow-list, refresh, lookup and instantiation
//! - [`executor`]: sandboxed execution with timeouts and cancellation
//! - [`typed`]: JSON request/response execution over the catalog

pub mod allow_list;
pub mod catalog;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod events;
pub mod executor;
pub mod loader;
pub mod logging;
pub mod module;
pub mod registry;
pub mod scanner;
pub mod security;
pub mod typed;

pub use allow_list::AllowList;
pub use catalog::{CatalogBuilder, PluginCatalogManager, PluginStatus, RefreshReport};
pub use config::HostConfig;
pub use descriptor::{ContractInfo, PluginInstance, TypeDescriptor};
pub use error::{HostError, Result};
pub use events::{EventHub, PluginEvent, SubscriptionId};
pub use executor::{ExecutionFailure, ExecutionOutcome, ExecutionSandbox};
pub use loader::{ModuleLoader, NativeModuleLoader, ResidentModules};
pub use logging::{init_tracing, LoggingConfig, TracingLogger};
pub use module::{LoadedModule, ModuleContext, ModuleOrigin};
pub use registry::{PluginClassEntry, PluginSummary, VersionedPluginRegistry};
pub use scanner::{Candidate, CandidateScanner};
pub use security::{AllowAllGate, RiskLevel, SecurityFinding, SecurityGate, ValidationResult};
pub use typed::TypedExecutor;

pub use plughost_sdk::{
    ExecutionContext, PluginIdentity, PluginKey, PluginMetadata, Version,
};
