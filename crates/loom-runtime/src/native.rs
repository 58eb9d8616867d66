//! Host side of the native entry-point contract.

use std::sync::Arc;

use loom_core::guest::{INIT_OK, INIT_SYMBOL, LISTEN_ADDR_SYMBOL, RUN_SYMBOL};
use loom_core::{CallResult, DynamicLibrary, NativeError};

use crate::component::{Component, ComponentHandle};
use crate::error::LoadError;
use crate::loader::{LoadedModule, ServiceLoop};
use crate::manifest::ModuleEntry;

/// Initial buffer handed to `ListenAddr`.
const LISTEN_ADDR_BUF: usize = 256;

/// A native module's exported entry points.
///
/// Implemented by [`DynamicLibrary`]; tests substitute symbol tables built
/// from functions in the test binary.
pub trait NativeModule: Send + Sync {
    /// Human-readable origin, for logs and errors.
    fn describe(&self) -> String;

    fn has_symbol(&self, symbol: &str) -> bool;

    /// # Safety
    ///
    /// Same contract as [`DynamicLibrary::call`].
    unsafe fn call(&self, symbol: &str, args: &[usize]) -> Result<CallResult, NativeError>;
}

impl NativeModule for DynamicLibrary {
    fn describe(&self) -> String {
        self.path().display().to_string()
    }

    fn has_symbol(&self, symbol: &str) -> bool {
        self.resolve(symbol).is_ok()
    }

    unsafe fn call(&self, symbol: &str, args: &[usize]) -> Result<CallResult, NativeError> {
        unsafe { DynamicLibrary::call(self, symbol, args) }
    }
}

/// Initialize an opened native module and wrap it as a component.
///
/// Runs `InitModule` with the entry's parameter blob, asks `ListenAddr` for
/// the component's listener, and, when the entry asks to run, prepares the
/// `RunModuleListen` loop for the caller to start.
pub fn initialize_native(
    module: Arc<dyn NativeModule>,
    entry: &ModuleEntry,
) -> Result<LoadedModule, LoadError> {
    let name = entry.name.as_str();
    let param = entry.param().to_json().map_err(|e| LoadError::native(name, e))?;

    // SAFETY: InitModule(json_ptr, json_len) -> status; `param` outlives the call.
    let status = unsafe { module.call(INIT_SYMBOL, &[param.as_ptr() as usize, param.len()]) }
        .map_err(|e| LoadError::native(name, e))?
        .low;
    if status != INIT_OK {
        return Err(LoadError::InitFailed {
            name: name.to_string(),
            status,
        });
    }

    let listen_address = query_listen_address(module.as_ref(), name)?;

    let run = if entry.run {
        if !module.has_symbol(RUN_SYMBOL) {
            return Err(LoadError::MissingEntryPoint {
                name: name.to_string(),
                symbol: RUN_SYMBOL.to_string(),
            });
        }
        let module = Arc::clone(&module);
        let component = name.to_string();
        let run: ServiceLoop = Box::new(move || {
            // SAFETY: RunModuleListen() takes no arguments.
            match unsafe { module.call(RUN_SYMBOL, &[]) } {
                Ok(result) => tracing::info!(
                    component = %component,
                    status = result.low,
                    "Service loop returned"
                ),
                Err(e) => {
                    tracing::error!(component = %component, error = %e, "Service loop failed")
                }
            }
        });
        Some(run)
    } else {
        None
    };

    Ok(LoadedModule {
        component: Component::new(
            name,
            entry.service_key.clone(),
            listen_address,
            ComponentHandle::Native(module),
        ),
        run,
    })
}

fn query_listen_address(
    module: &dyn NativeModule,
    name: &str,
) -> Result<Option<String>, LoadError> {
    if !module.has_symbol(LISTEN_ADDR_SYMBOL) {
        return Ok(None);
    }

    let mut buf = vec![0u8; LISTEN_ADDR_BUF];
    for _ in 0..2 {
        // SAFETY: ListenAddr(buf_ptr, buf_cap) -> len writes at most `cap` bytes.
        let len = unsafe {
            module.call(LISTEN_ADDR_SYMBOL, &[buf.as_mut_ptr() as usize, buf.len()])
        }
        .map_err(|e| LoadError::native(name, e))?
        .low;

        if len == 0 {
            return Ok(None);
        }
        if len <= buf.len() {
            buf.truncate(len);
            let address = String::from_utf8(buf).map_err(|e| LoadError::ListenAddr {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
            return Ok(Some(address));
        }
        buf = vec![0u8; len];
    }

    Err(LoadError::ListenAddr {
        name: name.to_string(),
        reason: "address length changed between calls".into(),
    })
}
