//! Plugin lifecycle notifications.
//!
//! Every host component publishes to an [`EventHub`] it was handed at
//! construction. Hubs are plain values: two catalogs built with two hubs
//! never see each other's events.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use semver::Version;
use tracing::warn;

use crate::error::panic_message;
use crate::security::ValidationResult;

/// Events emitted by the plugin host.
#[derive(Debug, Clone)]
pub enum PluginEvent {
    /// A module file could not be loaded or registered
    ModuleLoadFailed {
        file: PathBuf,
        directory: PathBuf,
        cause: String,
    },

    /// The security gate rejected a file or module
    SecurityValidationFailed {
        file: PathBuf,
        directory: PathBuf,
        result: ValidationResult,
    },

    /// Constructing a plugin instance failed
    InstantiationFailed {
        module: String,
        name: String,
        version: Option<Version>,
        cause: String,
    },

    /// A sandboxed invocation did not succeed
    ExecutionFailed {
        module: String,
        name: String,
        version: Version,
        error: String,
        duration: Duration,
    },
}

impl PluginEvent {
    /// Short event type name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            PluginEvent::ModuleLoadFailed { .. } => "module_load_failed",
            PluginEvent::SecurityValidationFailed { .. } => "security_validation_failed",
            PluginEvent::InstantiationFailed { .. } => "instantiation_failed",
            PluginEvent::ExecutionFailed { .. } => "execution_failed",
        }
    }
}

/// Handle returned by [`EventHub::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Callback = Arc<dyn Fn(&PluginEvent) + Send + Sync>;

/// Subscriber list shared by clones of the same hub.
#[derive(Clone, Default)]
pub struct EventHub {
    subscribers: Arc<RwLock<Vec<(SubscriptionId, Callback)>>>,
    next_id: Arc<AtomicU64>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. It is invoked synchronously on the publishing thread.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&PluginEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, Arc::new(callback)));
        id
    }

    /// Remove a callback. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Deliver an event to every subscriber. Never panics.
    pub fn publish(&self, event: &PluginEvent) {
        // Snapshot so callbacks may (un)subscribe without deadlocking
        let subscribers: Vec<Callback> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, cb)| cb.clone())
            .collect();

        for callback in subscribers {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(event))) {
                warn!(
                    category = "plugins",
                    event = event.kind(),
                    panic = %panic_message(payload.as_ref()),
                    "Event subscriber panicked"
                );
            }
        }
    }
}

impl fmt::Debug for EventHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHub")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
