//! Host error types.

use std::path::PathBuf;

use plughost_sdk::PluginError;

/// Errors raised by the plugin host.
///
/// Configuration errors are returned to the caller immediately. Load and
/// security errors are contained per file by the scanner and surfaced as
/// events instead.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    /// Invalid host configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Module file could not be loaded
    #[error("Failed to load module {path}: {reason}")]
    Load { path: PathBuf, reason: String },

    /// Module was built against another ABI or SDK
    #[error("ABI mismatch in {path}: module abi {abi_version} sdk {sdk_version}, host abi {host_abi} sdk {host_sdk}")]
    AbiMismatch {
        path: PathBuf,
        abi_version: u32,
        sdk_version: String,
        host_abi: u32,
        host_sdk: String,
    },

    /// Declaration symbol missing from the module
    #[error("Symbol not found in {path}: {symbol}")]
    SymbolNotFound { path: PathBuf, symbol: String },

    /// Module registration panicked
    #[error("Registration panicked in {path}: {message}")]
    RegistrationPanicked { path: PathBuf, message: String },

    /// Module context has been unloaded
    #[error("Module context unloaded: {0}")]
    Unloaded(PathBuf),

    /// Directory scan failed
    #[error("Scan failed: {0}")]
    Scan(String),

    /// Error raised by plugin code or the plugin contract
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HostError {
    /// Build a load error for a path.
    pub fn load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Load {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Host result type
pub type Result<T> = std::result::Result<T, HostError>;

/// Render a panic payload as text.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
