//! Core plugin contract types.
//!
//! A module exports a single [`ModuleDeclaration`] whose `register` function
//! pushes one [`PluginDeclaration`] per concrete plugin class. Identity
//! metadata is declared statically by each [`PluginClass`], so the host can
//! read it without constructing an instance.

use std::fmt;

use semver::Version;
use serde::Serialize;

use crate::context::ExecutionContext;
use crate::error::{PluginError, PluginResult};
use crate::typed::{Typed, TypedPlugin};

/// ABI version of the module declaration layout.
/// Incremented when breaking changes are made to the plugin interface.
pub const ABI_VERSION: u32 = 1;

/// Version of the SDK the module was built against.
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the exported declaration symbol (NUL terminated for symbol lookup).
pub const MODULE_SYMBOL: &[u8] = b"PLUGHOST_MODULE\0";

// ============================================================================
// Identity
// ============================================================================

fn normalize(field: &str, value: &str) -> PluginResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(PluginError::InvalidIdentity(format!("{} must not be empty", field)));
    }
    if trimmed.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(PluginError::InvalidIdentity(format!(
            "{} '{}' contains whitespace or control characters",
            field, trimmed
        )));
    }
    Ok(trimmed.to_string())
}

/// Logical plugin key: one plugin across all of its versions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PluginKey {
    module: String,
    name: String,
}

impl PluginKey {
    /// Create a normalized key.
    pub fn new(module: &str, name: &str) -> PluginResult<Self> {
        Ok(Self {
            module: normalize("module", module)?,
            name: normalize("name", name)?,
        })
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attach a version, producing a full identity.
    pub fn with_version(&self, version: Version) -> PluginIdentity {
        PluginIdentity {
            key: self.clone(),
            version,
        }
    }
}

impl fmt::Display for PluginKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.module, self.name)
    }
}

/// Identity of one loadable artifact: (module, name, version).
///
/// Ordering is by module, then name, then semantic-version precedence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PluginIdentity {
    key: PluginKey,
    version: Version,
}

impl PluginIdentity {
    /// Create a normalized identity.
    pub fn new(module: &str, name: &str, version: Version) -> PluginResult<Self> {
        Ok(PluginKey::new(module, name)?.with_version(version))
    }

    /// Create an identity from a version string such as `"1.2.0-beta.1"`.
    pub fn parse(module: &str, name: &str, version: &str) -> PluginResult<Self> {
        Self::new(module, name, Version::parse(version.trim())?)
    }

    pub fn key(&self) -> &PluginKey {
        &self.key
    }

    pub fn module(&self) -> &str {
        self.key.module()
    }

    pub fn name(&self) -> &str {
        self.key.name()
    }

    pub fn version(&self) -> &Version {
        &self.version
    }
}

impl fmt::Display for PluginIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.key, self.version)
    }
}

// ============================================================================
// Metadata
// ============================================================================

/// Self-declared plugin metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PluginMetadata {
    /// Module namespace (e.g., "Acme.Text")
    pub module: String,
    /// Plugin name, unique within its module namespace
    pub name: String,
    /// Plugin version
    pub version: Version,
    /// Free-text description
    pub description: String,
    /// Plugin author
    pub author: Option<String>,
}

impl PluginMetadata {
    /// Create new metadata with an empty description.
    pub fn new(module: impl Into<String>, name: impl Into<String>, version: Version) -> Self {
        Self {
            module: module.into(),
            name: name.into(),
            version,
            description: String::new(),
            author: None,
        }
    }

    /// Set the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the author
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Normalized identity of the declared plugin.
    pub fn identity(&self) -> PluginResult<PluginIdentity> {
        PluginIdentity::new(&self.module, &self.name, self.version.clone())
    }
}

// ============================================================================
// Capability contract
// ============================================================================

/// Shape of the input/output a plugin accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Contract {
    /// Free-form text in, text out
    Text,
    /// JSON-encoded typed request/response
    Json {
        input: &'static str,
        output: &'static str,
    },
}

/// Capability trait every plugin instance implements.
pub trait Plugin: Send + Sync {
    /// Run the plugin against an opaque input.
    fn invoke(&self, ctx: &ExecutionContext, input: &str) -> PluginResult<String>;

    /// Input/output contract of this plugin.
    fn contract(&self) -> Contract {
        Contract::Text
    }
}

/// A concrete plugin implementation that can be declared to the host.
///
/// `metadata` must be cheap and side-effect free: the host calls it while
/// scanning, before any admission decision.
pub trait PluginClass: Sized + Send + Sync + 'static {
    /// Static identity metadata.
    fn metadata() -> PluginMetadata;

    /// Build a fresh instance.
    fn construct() -> PluginResult<Self>;
}

/// Function that builds a boxed plugin instance.
pub type PluginFactory = fn() -> PluginResult<Box<dyn Plugin>>;

fn construct_basic<T: PluginClass + Plugin>() -> PluginResult<Box<dyn Plugin>> {
    Ok(Box::new(T::construct()?))
}

fn construct_typed<T: PluginClass + TypedPlugin>() -> PluginResult<Box<dyn Plugin>> {
    Ok(Box::new(Typed(T::construct()?)))
}

/// One plugin class declared by a module.
#[derive(Clone)]
pub struct PluginDeclaration {
    pub metadata: PluginMetadata,
    pub contract: Contract,
    pub factory: PluginFactory,
}

impl PluginDeclaration {
    /// Declare a plugin implementing the text contract.
    pub fn basic<T: PluginClass + Plugin>() -> Self {
        Self {
            metadata: T::metadata(),
            contract: Contract::Text,
            factory: construct_basic::<T>,
        }
    }

    /// Declare a plugin implementing the typed contract.
    pub fn typed<T: PluginClass + TypedPlugin>() -> Self {
        Self {
            metadata: T::metadata(),
            contract: Typed::<T>::contract_of(),
            factory: construct_typed::<T>,
        }
    }

    /// Build a declaration from parts.
    pub fn from_parts(metadata: PluginMetadata, contract: Contract, factory: PluginFactory) -> Self {
        Self {
            metadata,
            contract,
            factory,
        }
    }
}

impl fmt::Debug for PluginDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDeclaration")
            .field("metadata", &self.metadata)
            .field("contract", &self.contract)
            .finish_non_exhaustive()
    }
}

/// Sink for plugin declarations during module registration.
pub trait PluginRegistrar {
    fn register(&mut self, declaration: PluginDeclaration);
}

impl PluginRegistrar for Vec<PluginDeclaration> {
    fn register(&mut self, declaration: PluginDeclaration) {
        self.push(declaration);
    }
}

/// Version-stamped registration entry point exported by every module.
#[derive(Clone, Copy)]
pub struct ModuleDeclaration {
    pub abi_version: u32,
    pub sdk_version: &'static str,
    pub register: fn(&mut dyn PluginRegistrar),
}

impl ModuleDeclaration {
    /// Declaration stamped with this SDK's ABI and version.
    pub const fn new(register: fn(&mut dyn PluginRegistrar)) -> Self {
        Self {
            abi_version: ABI_VERSION,
            sdk_version: SDK_VERSION,
            register,
        }
    }

    /// Whether this declaration was built against the same ABI and SDK.
    pub fn is_compatible(&self) -> bool {
        self.abi_version == ABI_VERSION && self.sdk_version == SDK_VERSION
    }

    /// Run registration and collect the declared plugin classes.
    pub fn declarations(&self) -> Vec<PluginDeclaration> {
        let mut declarations = Vec::new();
        (self.register)(&mut declarations);
        declarations
    }
}

impl fmt::Debug for ModuleDeclaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleDeclaration")
            .field("abi_version", &self.abi_version)
            .field("sdk_version", &self.sdk_version)
            .finish_non_exhaustive()
    }
}
