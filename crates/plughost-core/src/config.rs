//! Host configuration.
//!
//! Defaults live in [`defaults`], environment variable names in [`env_vars`].
//! A [`HostConfig`] can be deserialized from JSON, overridden from the
//! environment and must pass [`HostConfig::validate`] before a catalog is
//! built from it.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{HostError, Result};
use crate::logging::LoggingConfig;

/// Default values.
pub mod defaults {
    /// Versions kept per logical plugin
    pub const MAX_VERSIONS: usize = 3;
    /// Default tracing filter
    pub const LOG_FILTER: &str = "info";

    /// Native dynamic library extension of the build platform.
    pub fn module_extensions() -> Vec<String> {
        vec![std::env::consts::DLL_EXTENSION.to_string()]
    }
}

/// Environment variable names.
pub mod env_vars {
    pub const ROOT: &str = "PLUGHOST_ROOT";
    pub const MAX_VERSIONS: &str = "PLUGHOST_MAX_VERSIONS";
    /// Comma separated, e.g. `so,dylib`
    pub const EXTENSIONS: &str = "PLUGHOST_EXTENSIONS";
    pub const TIMEOUT_MS: &str = "PLUGHOST_TIMEOUT_MS";
    pub const LOG: &str = "PLUGHOST_LOG";
}

/// Configuration of one plugin host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Root directory; each immediate subdirectory is one isolation unit
    pub plugin_root: PathBuf,
    /// Retention count per logical plugin
    pub max_versions: usize,
    /// File extensions treated as loadable modules
    pub module_extensions: Vec<String>,
    /// Timeout applied by `execute` when the caller passes none
    pub default_timeout_ms: Option<u64>,
    pub logging: LoggingConfig,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            plugin_root: PathBuf::new(),
            max_versions: defaults::MAX_VERSIONS,
            module_extensions: defaults::module_extensions(),
            default_timeout_ms: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl HostConfig {
    /// Default configuration rooted at `plugin_root`.
    pub fn new(plugin_root: impl Into<PathBuf>) -> Self {
        Self {
            plugin_root: plugin_root.into(),
            ..Self::default()
        }
    }

    pub fn with_max_versions(mut self, max_versions: usize) -> Self {
        self.max_versions = max_versions;
        self
    }

    pub fn with_module_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.module_extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    /// Parse a JSON document; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Apply overrides from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary variable lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(env_vars::ROOT) {
            self.plugin_root = PathBuf::from(root);
        }
        if let Some(max) = lookup(env_vars::MAX_VERSIONS) {
            self.max_versions = max.trim().parse().map_err(|_| {
                HostError::Configuration(format!("{} is not a number: {}", env_vars::MAX_VERSIONS, max))
            })?;
        }
        if let Some(exts) = lookup(env_vars::EXTENSIONS) {
            self.module_extensions = exts
                .split(',')
                .map(str::trim)
                .filter(|e| !e.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(timeout) = lookup(env_vars::TIMEOUT_MS) {
            self.default_timeout_ms = Some(timeout.trim().parse().map_err(|_| {
                HostError::Configuration(format!("{} is not a number: {}", env_vars::TIMEOUT_MS, timeout))
            })?);
        }
        if let Some(filter) = lookup(env_vars::LOG) {
            self.logging.filter = filter;
        }
        Ok(self)
    }

    /// Check the configuration. The plugin root must be an existing absolute directory.
    pub fn validate(&self) -> Result<()> {
        if !self.plugin_root.is_absolute() {
            return Err(HostError::Configuration(format!(
                "plugin root must be an absolute path: {}",
                self.plugin_root.display()
            )));
        }
        if !self.plugin_root.is_dir() {
            return Err(HostError::Configuration(format!(
                "plugin root does not exist or is not a directory: {}",
                self.plugin_root.display()
            )));
        }
        if self.max_versions == 0 {
            return Err(HostError::Configuration(
                "max_versions must be at least 1".to_string(),
            ));
        }
        if self.module_extensions.is_empty() {
            return Err(HostError::Configuration(
                "module_extensions must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Extensions without a leading dot, lowercased.
    pub fn normalized_extensions(&self) -> Vec<String> {
        self.module_extensions
            .iter()
            .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect()
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_ms.map(Duration::from_millis)
    }
}
