//! Execution context handed to a plugin for one invocation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Log severity for [`PluginLogger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Logging capability injected by the host.
///
/// Plugins live in a separate binary with their own copy of any logging
/// globals, so they log through this handle instead.
pub trait PluginLogger: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);

    fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

/// Logger that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogger;

impl PluginLogger for NullLogger {
    fn log(&self, _level: LogLevel, _message: &str) {}
}

/// Immutable per-invocation context: logger, cancellation and properties.
#[derive(Clone)]
pub struct ExecutionContext {
    logger: Arc<dyn PluginLogger>,
    cancellation: CancellationToken,
    properties: Arc<HashMap<String, Value>>,
}

impl ExecutionContext {
    /// Create a context with the given logger, a fresh token and no properties.
    pub fn new(logger: Arc<dyn PluginLogger>) -> Self {
        Self {
            logger,
            cancellation: CancellationToken::new(),
            properties: Arc::new(HashMap::new()),
        }
    }

    /// Start building a context.
    pub fn builder() -> ExecutionContextBuilder {
        ExecutionContextBuilder::default()
    }

    pub fn logger(&self) -> &dyn PluginLogger {
        self.logger.as_ref()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Shorthand for `cancellation().is_cancelled()`.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Get a property as string
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key)?.as_str()
    }

    pub fn properties(&self) -> &HashMap<String, Value> {
        &self.properties
    }

    /// Same logger and properties, different cancellation token.
    pub fn with_cancellation(&self, cancellation: CancellationToken) -> Self {
        Self {
            logger: self.logger.clone(),
            cancellation,
            properties: self.properties.clone(),
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new(Arc::new(NullLogger))
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("properties", &self.properties)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ExecutionContext`].
#[derive(Default)]
pub struct ExecutionContextBuilder {
    logger: Option<Arc<dyn PluginLogger>>,
    cancellation: Option<CancellationToken>,
    properties: HashMap<String, Value>,
}

impl ExecutionContextBuilder {
    pub fn logger(mut self, logger: Arc<dyn PluginLogger>) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn build(self) -> ExecutionContext {
        ExecutionContext {
            logger: self.logger.unwrap_or_else(|| Arc::new(NullLogger)),
            cancellation: self.cancellation.unwrap_or_else(CancellationToken::new),
            properties: Arc::new(self.properties),
        }
    }
}
