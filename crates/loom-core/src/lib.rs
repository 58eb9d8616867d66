//! Native layer for loom.
//!
//! [`DynamicLibrary`] opens a platform shared library with global symbol
//! visibility and resolves exported symbols. Calls go through a
//! [`CallDiscipline`]: directly against the resolved address, or through the
//! library's own [`TRAMPOLINE_SYMBOL`] when it exports one.
//!
//! ```rust,no_run
//! use loom_core::DynamicLibrary;
//!
//! # fn run() -> Result<(), loom_core::NativeError> {
//! let lib = DynamicLibrary::open("components/orders_linux_x86_64.so");
//! lib.ensure_loaded()?;
//! // SAFETY: `RunModuleListen` takes no arguments.
//! let status = unsafe { lib.call("RunModuleListen", &[])? };
//! println!("exited with {}", status.low);
//! # Ok(())
//! # }
//! ```

pub mod dispatch;
pub mod error;
pub mod guest;
pub mod library;
pub mod platform;

pub use dispatch::{CallDiscipline, CallResult, MAX_ARGS, SymbolAddr};
pub use error::NativeError;
pub use guest::ModuleParam;
pub use library::{DynamicLibrary, TRAMPOLINE_SYMBOL};
pub use platform::{BuildFlavor, RUSTC_VERSION, artifact_path};
