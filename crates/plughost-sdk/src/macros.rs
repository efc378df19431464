//! Declarative macros for plugin modules.

/// Export the registration entry point of a plugin module.
///
/// Each entry is `basic Type` for a [`Plugin`](crate::Plugin) implementation
/// or `typed Type` for a [`TypedPlugin`](crate::TypedPlugin) implementation.
/// Both must also implement [`PluginClass`](crate::PluginClass).
/// Invoke once per module crate.
///
/// # Example
///
/// ```rust,ignore
/// use plughost_sdk::prelude::*;
///
/// export_module!(basic Greeter, typed WordCount);
/// ```
#[macro_export]
macro_rules! export_module {
    ($($kind:ident $ty:ty),+ $(,)?) => {
        #[doc(hidden)]
        fn __plughost_register(registrar: &mut dyn $crate::PluginRegistrar) {
            $(
                registrar.register($crate::PluginDeclaration::$kind::<$ty>());
            )+
        }

        #[no_mangle]
        pub static PLUGHOST_MODULE: $crate::ModuleDeclaration =
            $crate::ModuleDeclaration::new(__plughost_register);
    };
}
