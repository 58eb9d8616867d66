use std::sync::Arc;

use loom_core::platform::resolve_library_path;
use loom_core::{DynamicLibrary, ModuleParam, SymbolAddr};

use crate::component::{Component, ComponentHandle};
use crate::error::LoadError;
use crate::manifest::{ModuleEntry, ModuleKind};
use crate::native::initialize_native;
use crate::service::ServiceTable;

/// Plugin initializer: `fn(&ModuleParam) -> Result<(), String>`.
pub const PLUGIN_INIT_SYMBOL: &str = "loom_plugin_init";
/// Plugin service table: `fn() -> ServiceTable`.
pub const PLUGIN_SERVICES_SYMBOL: &str = "loom_plugin_services";
/// Optional plugin listener query: `fn() -> Option<String>`.
pub const PLUGIN_LISTEN_ADDR_SYMBOL: &str = "loom_plugin_listen_addr";
/// Optional plugin service loop: `fn()`.
pub const PLUGIN_RUN_SYMBOL: &str = "loom_plugin_run";

pub type PluginInitFn = fn(&ModuleParam) -> Result<(), String>;
pub type PluginServicesFn = fn() -> ServiceTable;
pub type PluginListenAddrFn = fn() -> Option<String>;
pub type PluginRunFn = fn();

/// A component's long-running service loop, started after registration.
pub type ServiceLoop = Box<dyn FnOnce() + Send + 'static>;

/// Result of loading one manifest entry.
pub struct LoadedModule {
    pub component: Component,
    /// Present when the entry asked to run.
    pub run: Option<ServiceLoop>,
}

/// Turns a manifest entry into a component.
///
/// Loading is synchronous; the host calls it while holding the registry's
/// exclusive lock.
pub trait ModuleLoader: Send + Sync {
    fn load(&self, entry: &ModuleEntry) -> Result<LoadedModule, LoadError>;
}

/// A host plugin's exported entry points.
///
/// Implemented by [`DynamicLibrary`]; tests substitute tables of functions
/// from the test binary. The run loop keeps its module alive.
pub trait PluginModule: Send + Sync {
    /// Human-readable origin, for logs and errors.
    fn describe(&self) -> String;

    fn symbol(&self, symbol: &str) -> Option<SymbolAddr>;
}

impl PluginModule for DynamicLibrary {
    fn describe(&self) -> String {
        self.path().display().to_string()
    }

    fn symbol(&self, symbol: &str) -> Option<SymbolAddr> {
        self.resolve(symbol).ok()
    }
}

/// Loads host-specific builds from disk with [`DynamicLibrary`].
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultModuleLoader;

impl ModuleLoader for DefaultModuleLoader {
    fn load(&self, entry: &ModuleEntry) -> Result<LoadedModule, LoadError> {
        let artifact = entry.artifact_path();
        let resolved = resolve_library_path(&artifact);
        if !resolved.exists() {
            return Err(LoadError::BuildNotFound {
                name: entry.name.clone(),
                path: artifact,
            });
        }

        tracing::info!(
            component = %entry.name,
            path = %resolved.display(),
            kind = ?entry.kind,
            "Opening component"
        );

        let library = DynamicLibrary::open(&resolved);
        library
            .ensure_loaded()
            .map_err(|e| LoadError::native(&entry.name, e))?;

        match entry.kind {
            ModuleKind::Native => initialize_native(Arc::new(library), entry),
            ModuleKind::Plugin => initialize_plugin(Arc::new(library), entry),
        }
    }
}

/// Initialize an opened host plugin and wrap it as a component.
///
/// Calls `loom_plugin_init` with the entry's parameters, takes the plugin's
/// service table and optional listen address, and, when the entry asks to
/// run, prepares `loom_plugin_run` for the caller to start.
pub fn initialize_plugin(
    library: Arc<dyn PluginModule>,
    entry: &ModuleEntry,
) -> Result<LoadedModule, LoadError> {
    let name = entry.name.as_str();

    // SAFETY (all lookups below): the artifact name pins the host's compiler
    // release, so the plugin's Rust-ABI signatures match the aliases above.
    let init: PluginInitFn =
        unsafe { required_symbol(library.as_ref(), name, PLUGIN_INIT_SYMBOL)? };
    init(&entry.param()).map_err(|reason| LoadError::InitRejected {
        name: name.to_string(),
        reason,
    })?;

    let services: PluginServicesFn =
        unsafe { required_symbol(library.as_ref(), name, PLUGIN_SERVICES_SYMBOL)? };
    let services = Arc::new(services());

    let listen_address = match unsafe {
        optional_symbol::<PluginListenAddrFn>(library.as_ref(), PLUGIN_LISTEN_ADDR_SYMBOL)
    } {
        Some(listen) => listen(),
        None => None,
    };

    let run = if entry.run {
        let run: PluginRunFn =
            unsafe { required_symbol(library.as_ref(), name, PLUGIN_RUN_SYMBOL)? };
        let keep_alive = Arc::clone(&library);
        let run: ServiceLoop = Box::new(move || {
            let _library = keep_alive;
            run();
        });
        Some(run)
    } else {
        None
    };

    tracing::debug!(component = name, services = ?services, "Plugin initialized");

    Ok(LoadedModule {
        component: Component::new(
            name,
            entry.service_key.clone(),
            listen_address,
            ComponentHandle::Plugin { services, library },
        ),
        run,
    })
}

/// # Safety
///
/// `F` must be a function pointer type matching the exported symbol.
unsafe fn required_symbol<F: Copy>(
    library: &dyn PluginModule,
    name: &str,
    symbol: &str,
) -> Result<F, LoadError> {
    unsafe { optional_symbol(library, symbol) }.ok_or_else(|| LoadError::MissingEntryPoint {
        name: name.to_string(),
        symbol: symbol.to_string(),
    })
}

/// # Safety
///
/// `F` must be a function pointer type matching the exported symbol.
unsafe fn optional_symbol<F: Copy>(library: &dyn PluginModule, symbol: &str) -> Option<F> {
    debug_assert_eq!(std::mem::size_of::<F>(), std::mem::size_of::<usize>());
    let addr = library.symbol(symbol)?.get();
    // SAFETY: guaranteed by the caller.
    Some(unsafe { std::mem::transmute_copy::<usize, F>(&addr) })
}

/// Export the plugin entry points from a `cdylib`/`dylib` crate.
///
/// ```rust,ignore
/// loom_runtime::export_plugin! {
///     init: my_plugin::init,
///     services: my_plugin::services,
///     run: my_plugin::serve,
/// }
/// ```
#[macro_export]
macro_rules! export_plugin {
    (
        init: $init:path,
        services: $services:path
        $(, listen_addr: $listen:path)?
        $(, run: $run:path)?
        $(,)?
    ) => {
        #[unsafe(no_mangle)]
        pub fn loom_plugin_init(
            param: &$crate::ModuleParam,
        ) -> ::std::result::Result<(), ::std::string::String> {
            $init(param)
        }

        #[unsafe(no_mangle)]
        pub fn loom_plugin_services() -> $crate::ServiceTable {
            $services()
        }

        $(
            #[unsafe(no_mangle)]
            pub fn loom_plugin_listen_addr() -> ::std::option::Option<::std::string::String> {
                $listen()
            }
        )?

        $(
            #[unsafe(no_mangle)]
            pub fn loom_plugin_run() {
                $run()
            }
        )?
    };
}
