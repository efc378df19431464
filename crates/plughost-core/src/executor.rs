//! Sandboxed plugin execution.
//!
//! [`ExecutionSandbox`] runs an operation against a plugin instance and
//! turns every way it can go wrong (error, panic, timeout, cancellation)
//! into an [`ExecutionOutcome`]. It never lets a plugin failure escape to
//! the caller.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use plughost_sdk::{Plugin, PluginError, PluginResult};

use crate::descriptor::PluginInstance;
use crate::error::panic_message;
use crate::events::{EventHub, PluginEvent};

/// Why an execution did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ExecutionFailure {
    #[error("Execution timed out after {0:?}")]
    Timeout(Duration),

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Plugin panicked: {0}")]
    Panicked(String),

    #[error("Plugin error: {0}")]
    Plugin(String),

    #[error("Plugin not found: {0}")]
    NotFound(String),

    #[error("Contract mismatch: {0}")]
    Contract(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Execution failed: {0}")]
    Internal(String),
}

impl From<PluginError> for ExecutionFailure {
    fn from(err: PluginError) -> Self {
        match err {
            PluginError::Cancelled => ExecutionFailure::Cancelled,
            PluginError::Serialization(e) => ExecutionFailure::Serialization(e.to_string()),
            other => ExecutionFailure::Plugin(other.to_string()),
        }
    }
}

/// Wall-clock start plus a monotonic timer, so the end never precedes the start.
pub(crate) struct Stopwatch {
    started_at: DateTime<Utc>,
    start: Instant,
}

impl Stopwatch {
    pub(crate) fn start() -> Self {
        Self {
            started_at: Utc::now(),
            start: Instant::now(),
        }
    }

    fn finish(&self) -> (DateTime<Utc>, Duration) {
        let elapsed = self.start.elapsed();
        let finished_at = chrono::Duration::from_std(elapsed)
            .ok()
            .and_then(|d| self.started_at.checked_add_signed(d))
            .unwrap_or(self.started_at);
        (finished_at, elapsed)
    }
}

/// Result of one sandboxed execution.
#[derive(Debug, Clone)]
pub struct ExecutionOutcome<T> {
    data: Option<T>,
    cause: Option<ExecutionFailure>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    duration: Duration,
}

impl<T> ExecutionOutcome<T> {
    pub(crate) fn completed(result: Result<T, ExecutionFailure>, watch: &Stopwatch) -> Self {
        let (finished_at, duration) = watch.finish();
        let (data, cause) = match result {
            Ok(data) => (Some(data), None),
            Err(cause) => (None, Some(cause)),
        };
        Self {
            data,
            cause,
            started_at: watch.started_at,
            finished_at,
            duration,
        }
    }

    pub(crate) fn failure(cause: ExecutionFailure, watch: &Stopwatch) -> Self {
        Self::completed(Err(cause), watch)
    }

    pub fn success(&self) -> bool {
        self.cause.is_none()
    }

    pub fn data(&self) -> Option<&T> {
        self.data.as_ref()
    }

    pub fn into_data(self) -> Option<T> {
        self.data
    }

    /// Error message, if the execution failed.
    pub fn error(&self) -> Option<String> {
        self.cause.as_ref().map(ToString::to_string)
    }

    pub fn cause(&self) -> Option<&ExecutionFailure> {
        self.cause.as_ref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Convert the payload of a successful outcome, keeping its timing.
    pub fn and_then<U, F>(self, f: F) -> ExecutionOutcome<U>
    where
        F: FnOnce(T) -> Result<U, ExecutionFailure>,
    {
        let (data, cause) = match (self.data, self.cause) {
            (Some(data), None) => match f(data) {
                Ok(u) => (Some(u), None),
                Err(cause) => (None, Some(cause)),
            },
            (_, Some(cause)) => (None, Some(cause)),
            (None, None) => (None, Some(ExecutionFailure::Internal("no result".to_string()))),
        };
        ExecutionOutcome {
            data,
            cause,
            started_at: self.started_at,
            finished_at: self.finished_at,
            duration: self.duration,
        }
    }
}

fn run_contained<T, F>(plugin: &dyn Plugin, operation: F, token: &CancellationToken) -> Result<T, ExecutionFailure>
where
    F: FnOnce(&dyn Plugin, &CancellationToken) -> PluginResult<T>,
{
    match catch_unwind(AssertUnwindSafe(|| operation(plugin, token))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(err.into()),
        Err(payload) => Err(ExecutionFailure::Panicked(panic_message(payload.as_ref()))),
    }
}

/// Failure-containing executor for plugin operations.
///
/// Timed-out work is signalled through its cancellation token but cannot
/// be stopped forcibly; a plugin that ignores the token keeps its worker
/// thread until it returns.
#[derive(Clone, Default)]
pub struct ExecutionSandbox {
    events: EventHub,
}

impl ExecutionSandbox {
    pub fn new(events: EventHub) -> Self {
        Self { events }
    }

    pub fn events(&self) -> &EventHub {
        &self.events
    }

    /// Run `operation` against `instance`, blocking the calling thread.
    ///
    /// Without a timeout the operation runs inline. With one it runs on a
    /// dedicated thread and its token is cancelled when the deadline passes.
    pub fn execute_safely<T, F>(
        &self,
        instance: &PluginInstance,
        operation: F,
        timeout: Option<Duration>,
    ) -> ExecutionOutcome<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Plugin, &CancellationToken) -> PluginResult<T> + Send + 'static,
    {
        let watch = Stopwatch::start();
        let token = CancellationToken::new();
        let result = match timeout {
            None => run_contained(instance.plugin(), operation, &token),
            Some(limit) => Self::run_with_deadline(instance, operation, token, limit),
        };
        self.finish(instance, ExecutionOutcome::completed(result, &watch))
    }

    fn run_with_deadline<T, F>(
        instance: &PluginInstance,
        operation: F,
        token: CancellationToken,
        limit: Duration,
    ) -> Result<T, ExecutionFailure>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Plugin, &CancellationToken) -> PluginResult<T> + Send + 'static,
    {
        let (tx, rx) = mpsc::sync_channel(1);
        let worker = instance.clone();
        let worker_token = token.clone();
        std::thread::Builder::new()
            .name("plughost-exec".to_string())
            .spawn(move || {
                let result = run_contained(worker.plugin(), operation, &worker_token);
                let _ = tx.send(result);
            })
            .map_err(|e| ExecutionFailure::Internal(format!("cannot spawn worker: {}", e)))?;

        match rx.recv_timeout(limit) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                token.cancel();
                Err(ExecutionFailure::Timeout(limit))
            }
            Err(RecvTimeoutError::Disconnected) => Err(ExecutionFailure::Panicked(
                "worker exited without a result".to_string(),
            )),
        }
    }

    /// Run `operation` on the blocking pool.
    ///
    /// The operation's token is a child of `cancellation`; cancelling the
    /// caller's token or passing the deadline cancels it.
    pub async fn execute_safely_async<T, F>(
        &self,
        instance: &PluginInstance,
        operation: F,
        timeout: Option<Duration>,
        cancellation: Option<CancellationToken>,
    ) -> ExecutionOutcome<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn Plugin, &CancellationToken) -> PluginResult<T> + Send + 'static,
    {
        let watch = Stopwatch::start();
        let caller = cancellation.unwrap_or_else(CancellationToken::new);
        let token = caller.child_token();

        let worker = instance.clone();
        let worker_token = token.clone();
        let handle = tokio::task::spawn_blocking(move || {
            run_contained(worker.plugin(), operation, &worker_token)
        });

        let work = async move {
            match timeout {
                Some(limit) => tokio::time::timeout(limit, handle).await.ok(),
                None => Some(handle.await),
            }
        };

        let result = tokio::select! {
            biased;
            _ = caller.cancelled() => {
                token.cancel();
                Err(ExecutionFailure::Cancelled)
            }
            joined = work => match joined {
                Some(Ok(result)) => result,
                Some(Err(join_err)) if join_err.is_panic() => Err(ExecutionFailure::Panicked(
                    panic_message(join_err.into_panic().as_ref()),
                )),
                Some(Err(_)) => Err(ExecutionFailure::Cancelled),
                None => {
                    token.cancel();
                    Err(ExecutionFailure::Timeout(timeout.unwrap_or_default()))
                }
            },
        };

        self.finish(instance, ExecutionOutcome::completed(result, &watch))
    }

    fn finish<T>(&self, instance: &PluginInstance, outcome: ExecutionOutcome<T>) -> ExecutionOutcome<T> {
        let identity = instance.identity();
        match outcome.cause() {
            None => {
                debug!(
                    category = "plugins",
                    plugin = %identity,
                    duration_ms = outcome.duration().as_millis() as u64,
                    "Plugin execution succeeded"
                );
            }
            Some(cause) => {
                warn!(
                    category = "plugins",
                    plugin = %identity,
                    error = %cause,
                    duration_ms = outcome.duration().as_millis() as u64,
                    "Plugin execution failed"
                );
                self.events.publish(&PluginEvent::ExecutionFailed {
                    module: identity.module().to_string(),
                    name: identity.name().to_string(),
                    version: identity.version().clone(),
                    error: cause.to_string(),
                    duration: outcome.duration(),
                });
            }
        }
        outcome
    }
}
