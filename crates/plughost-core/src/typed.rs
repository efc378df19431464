//! Typed execution over the catalog.
//!
//! Callers pass and receive their own types. [`TypedExecutor`] resolves the
//! plugin, checks that it speaks the JSON contract, encodes the request,
//! runs it in the sandbox and decodes the response.

use std::sync::Arc;
use std::time::Duration;

use semver::Version;
use serde::de::DeserializeOwned;
use serde::Serialize;

use plughost_sdk::{ExecutionContext, PluginResult};

use crate::catalog::PluginCatalogManager;
use crate::descriptor::PluginInstance;
use crate::executor::{ExecutionFailure, ExecutionOutcome, Stopwatch};
use crate::logging::TracingLogger;

/// Decoded inside the sandbox so an undecodable response is a failed
/// execution like any other.
fn decode<O: DeserializeOwned>(raw: String) -> PluginResult<O> {
    Ok(serde_json::from_str(&raw)?)
}

fn default_context(instance: &PluginInstance) -> ExecutionContext {
    let identity = instance.identity();
    ExecutionContext::new(Arc::new(TracingLogger::new(identity.module(), identity.name())))
}

/// Strongly typed execution facade.
#[derive(Debug, Clone)]
pub struct TypedExecutor {
    catalog: Arc<PluginCatalogManager>,
}

impl TypedExecutor {
    pub fn new(catalog: Arc<PluginCatalogManager>) -> Self {
        Self { catalog }
    }

    pub fn catalog(&self) -> &Arc<PluginCatalogManager> {
        &self.catalog
    }

    /// Run the newest version of a plugin.
    pub fn execute_plugin<I, O>(
        &self,
        module: &str,
        name: &str,
        input: &I,
        context: Option<ExecutionContext>,
    ) -> ExecutionOutcome<O>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned + Send + 'static,
    {
        self.execute_blocking(module, name, None, input, context)
    }

    /// Run one exact version of a plugin.
    pub fn execute_plugin_version<I, O>(
        &self,
        module: &str,
        name: &str,
        version: &Version,
        input: &I,
        context: Option<ExecutionContext>,
    ) -> ExecutionOutcome<O>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned + Send + 'static,
    {
        self.execute_blocking(module, name, Some(version), input, context)
    }

    /// Run a plugin on the blocking pool.
    ///
    /// The plugin sees a token derived from the context's cancellation. It
    /// is cancelled when the caller cancels or `timeout` elapses.
    pub async fn execute_plugin_async<I, O>(
        &self,
        module: &str,
        name: &str,
        version: Option<&Version>,
        input: &I,
        context: Option<ExecutionContext>,
        timeout: Option<Duration>,
    ) -> ExecutionOutcome<O>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned + Send + 'static,
    {
        let watch = Stopwatch::start();
        let (instance, payload) = match self.prepare(module, name, version, input) {
            Ok(prepared) => prepared,
            Err(cause) => return ExecutionOutcome::failure(cause, &watch),
        };
        let ctx = context.unwrap_or_else(|| default_context(&instance));
        let caller = ctx.cancellation().clone();

        self.catalog
            .sandbox()
            .execute_safely_async(
                &instance,
                move |plugin, token| {
                    decode(plugin.invoke(&ctx.with_cancellation(token.clone()), &payload)?)
                },
                timeout,
                Some(caller),
            )
            .await
    }

    fn execute_blocking<I, O>(
        &self,
        module: &str,
        name: &str,
        version: Option<&Version>,
        input: &I,
        context: Option<ExecutionContext>,
    ) -> ExecutionOutcome<O>
    where
        I: Serialize + ?Sized,
        O: DeserializeOwned + Send + 'static,
    {
        let watch = Stopwatch::start();
        let (instance, payload) = match self.prepare(module, name, version, input) {
            Ok(prepared) => prepared,
            Err(cause) => return ExecutionOutcome::failure(cause, &watch),
        };
        let ctx = context.unwrap_or_else(|| default_context(&instance));

        self.catalog
            .sandbox()
            .execute_safely(
                &instance,
                move |plugin, _| decode(plugin.invoke(&ctx, &payload)?),
                None,
            )
    }

    fn prepare<I>(
        &self,
        module: &str,
        name: &str,
        version: Option<&Version>,
        input: &I,
    ) -> Result<(PluginInstance, String), ExecutionFailure>
    where
        I: Serialize + ?Sized,
    {
        let instance = match version {
            Some(v) => self.catalog.get_instance_version(module, name, v),
            None => self.catalog.get_instance(module, name),
        };
        let instance = instance.ok_or_else(|| {
            ExecutionFailure::NotFound(match version {
                Some(v) => format!("{}/{}@{}", module, name, v),
                None => format!("{}/{}", module, name),
            })
        })?;

        if !instance.contract().is_json() {
            return Err(ExecutionFailure::Contract(format!(
                "{} does not accept typed input",
                instance.identity()
            )));
        }

        let payload =
            serde_json::to_string(input).map_err(|e| ExecutionFailure::Serialization(e.to_string()))?;
        Ok((instance, payload))
    }
}
