//! Plugin error types.

/// Errors raised by plugin code or by the plugin-side contract.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Identity fields failed normalization
    #[error("Invalid plugin identity: {0}")]
    InvalidIdentity(String),

    /// Construction of a plugin instance failed
    #[error("Construction failed: {0}")]
    ConstructionFailed(String),

    /// Input rejected by the plugin
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Plugin logic failed
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Plugin observed its cancellation token
    #[error("Operation cancelled")]
    Cancelled,

    /// JSON (de)serialization at the typed boundary failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Version string could not be parsed
    #[error("Invalid version: {0}")]
    Version(#[from] semver::Error),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl From<String> for PluginError {
    fn from(msg: String) -> Self {
        Self::Other(msg)
    }
}

impl From<&str> for PluginError {
    fn from(msg: &str) -> Self {
        Self::Other(msg.to_string())
    }
}

/// Plugin result type
pub type PluginResult<T> = Result<T, PluginError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PluginError::ConstructionFailed("missing key".to_string());
        assert_eq!(err.to_string(), "Construction failed: missing key");
        assert_eq!(PluginError::Cancelled.to_string(), "Operation cancelled");
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<u32>("not json").unwrap_err();
        let err: PluginError = json_err.into();
        assert!(matches!(err, PluginError::Serialization(_)));
    }
}
