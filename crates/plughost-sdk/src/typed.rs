//! Strongly-typed plugin contract.
//!
//! Typed plugins exchange JSON with the host. [`Typed`] adapts a
//! [`TypedPlugin`] to the text-based [`Plugin`] capability.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::context::ExecutionContext;
use crate::error::PluginResult;
use crate::types::{Contract, Plugin};

/// A plugin with a compile-time request/response shape.
pub trait TypedPlugin: Send + Sync + 'static {
    type Input: DeserializeOwned;
    type Output: Serialize;

    fn execute(&self, ctx: &ExecutionContext, input: Self::Input) -> PluginResult<Self::Output>;
}

/// Adapter exposing a [`TypedPlugin`] through the text contract.
pub struct Typed<T>(pub T);

impl<T: TypedPlugin> Typed<T> {
    /// Contract advertised by `Typed<T>`.
    pub fn contract_of() -> Contract {
        Contract::Json {
            input: std::any::type_name::<T::Input>(),
            output: std::any::type_name::<T::Output>(),
        }
    }
}

impl<T: TypedPlugin> Plugin for Typed<T> {
    fn invoke(&self, ctx: &ExecutionContext, input: &str) -> PluginResult<String> {
        let input: T::Input = serde_json::from_str(input)?;
        let output = self.0.execute(ctx, input)?;
        Ok(serde_json::to_string(&output)?)
    }

    fn contract(&self) -> Contract {
        Self::contract_of()
    }
}
