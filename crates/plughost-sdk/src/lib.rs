//! plughost Plugin SDK
//!
//! Everything a plugin module links against: the [`Plugin`] capability, the
//! typed contract, declarative identity metadata, the execution context and
//! the [`export_module!`] macro that exports the module's registration
//! entry point.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use plughost_sdk::prelude::*;
//!
//! #[derive(Default)]
//! struct Greeter;
//!
//! impl PluginClass for Greeter {
//!     fn metadata() -> PluginMetadata {
//!         PluginMetadata::new("Acme.Text", "Greeter", Version::new(1, 0, 0))
//!             .with_description("Says hello")
//!     }
//!
//!     fn construct() -> PluginResult<Self> {
//!         Ok(Greeter)
//!     }
//! }
//!
//! impl Plugin for Greeter {
//!     fn invoke(&self, _ctx: &ExecutionContext, input: &str) -> PluginResult<String> {
//!         Ok(format!("Hello, {}!", input))
//!     }
//! }
//!
//! export_module!(basic Greeter);
//! ```

pub mod context;
pub mod error;
#[macro_use]
pub mod macros;
pub mod typed;
pub mod types;

pub use context::{ExecutionContext, ExecutionContextBuilder, LogLevel, NullLogger, PluginLogger};
pub use error::{PluginError, PluginResult};
pub use typed::{Typed, TypedPlugin};
pub use types::{
    Contract, ModuleDeclaration, Plugin, PluginClass, PluginDeclaration, PluginFactory,
    PluginIdentity, PluginKey, PluginMetadata, PluginRegistrar, ABI_VERSION, MODULE_SYMBOL,
    SDK_VERSION,
};

pub use semver::Version;
pub use tokio_util::sync::CancellationToken;

/// Prelude module with common imports
pub mod prelude {
    pub use crate::context::{ExecutionContext, LogLevel, PluginLogger};
    pub use crate::error::{PluginError, PluginResult};
    pub use crate::typed::TypedPlugin;
    pub use crate::types::{Plugin, PluginClass, PluginMetadata};
    pub use crate::export_module;
    pub use semver::Version;
}
