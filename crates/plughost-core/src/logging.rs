//! Tracing bootstrap and the host-side plugin logger.

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, EnvFilter};

use plughost_sdk::{LogLevel, PluginLogger};

use crate::config::defaults;
use crate::error::{HostError, Result};

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info,plughost_core=debug`
    pub filter: String,
    /// Emit JSON lines instead of human readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: defaults::LOG_FILTER.to_string(),
            json: false,
        }
    }
}

/// Install a global tracing subscriber writing to stderr.
///
/// Fails if the filter is invalid or a global subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| HostError::Configuration(format!("invalid log filter '{}': {}", config.filter, e)))?;

    let builder = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let result = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| HostError::Configuration(format!("failed to install subscriber: {}", e)))
}

/// [`PluginLogger`] forwarding to `tracing`, tagged with the plugin identity.
#[derive(Debug, Clone)]
pub struct TracingLogger {
    module: String,
    name: String,
}

impl TracingLogger {
    pub fn new(module: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
        }
    }
}

impl PluginLogger for TracingLogger {
    fn log(&self, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => {
                tracing::debug!(category = "plugins", module = %self.module, plugin = %self.name, "{}", message)
            }
            LogLevel::Info => {
                tracing::info!(category = "plugins", module = %self.module, plugin = %self.name, "{}", message)
            }
            LogLevel::Warn => {
                tracing::warn!(category = "plugins", module = %self.module, plugin = %self.name, "{}", message)
            }
            LogLevel::Error => {
                tracing::error!(category = "plugins", module = %self.module, plugin = %self.name, "{}", message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_is_configuration_error() {
        let config = LoggingConfig {
            filter: "plughost_core=notalevel".to_string(),
            json: false,
        };
        assert!(matches!(init_tracing(&config), Err(HostError::Configuration(_))));
    }

    #[test]
    fn test_tracing_logger_does_not_panic_without_subscriber() {
        let logger = TracingLogger::new("Test", "Alpha");
        logger.info("hello");
        logger.warn("careful");
        logger.debug("details");
        logger.error("failure");
    }
}
