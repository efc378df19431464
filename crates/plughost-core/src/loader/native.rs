//! Native module loader for .so/.dylib/.dll files.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use libloading::{Library, Symbol};
use tracing::debug;

use plughost_sdk::{ModuleDeclaration, ABI_VERSION, MODULE_SYMBOL, SDK_VERSION};

use super::{module_name, ModuleLoader};
use crate::error::{panic_message, HostError, Result};
use crate::module::LoadedModule;

/// Loader for native dynamic libraries exporting `PLUGHOST_MODULE`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeModuleLoader;

impl NativeModuleLoader {
    pub fn new() -> Self {
        Self
    }

    /// Read the declaration out of an opened library.
    fn read_declaration(library: &Library, path: &Path) -> Result<ModuleDeclaration> {
        let symbol_name = String::from_utf8_lossy(&MODULE_SYMBOL[..MODULE_SYMBOL.len() - 1]);

        // SAFETY: the symbol is a `static ModuleDeclaration` emitted by `export_module!`.
        // The ABI version is checked before any field whose layout may differ is read.
        unsafe {
            let symbol: Symbol<*const ModuleDeclaration> =
                library.get(MODULE_SYMBOL).map_err(|_| HostError::SymbolNotFound {
                    path: path.to_path_buf(),
                    symbol: symbol_name.to_string(),
                })?;
            let declaration = *symbol;
            if declaration.is_null() {
                return Err(HostError::SymbolNotFound {
                    path: path.to_path_buf(),
                    symbol: symbol_name.to_string(),
                });
            }

            let abi_version = std::ptr::addr_of!((*declaration).abi_version).read();
            if abi_version != ABI_VERSION {
                return Err(HostError::AbiMismatch {
                    path: path.to_path_buf(),
                    abi_version,
                    sdk_version: "unknown".to_string(),
                    host_abi: ABI_VERSION,
                    host_sdk: SDK_VERSION.to_string(),
                });
            }

            Ok(declaration.read())
        }
    }
}

impl ModuleLoader for NativeModuleLoader {
    fn load(&self, path: &Path) -> Result<LoadedModule> {
        if !path.is_file() {
            return Err(HostError::load(path, "file not found"));
        }

        // SAFETY: opening a library runs its initializers. Paths reach this
        // point only after the security gate accepted them.
        let library =
            unsafe { Library::new(path) }.map_err(|e| HostError::load(path, e.to_string()))?;

        let declaration = Self::read_declaration(&library, path)?;
        if !declaration.is_compatible() {
            return Err(HostError::AbiMismatch {
                path: path.to_path_buf(),
                abi_version: declaration.abi_version,
                sdk_version: declaration.sdk_version.to_string(),
                host_abi: ABI_VERSION,
                host_sdk: SDK_VERSION.to_string(),
            });
        }

        let declarations = catch_unwind(AssertUnwindSafe(|| declaration.declarations()))
            .map_err(|payload| HostError::RegistrationPanicked {
                path: path.to_path_buf(),
                message: panic_message(payload.as_ref()),
            })?;

        debug!(
            category = "plugins",
            path = %path.display(),
            plugins = declarations.len(),
            "Native module loaded"
        );

        Ok(LoadedModule::native(
            module_name(path),
            path,
            library,
            declarations,
        ))
    }
}
