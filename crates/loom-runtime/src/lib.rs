//! Component registry and lifecycle host for loom.
//!
//! A [`Manifest`] lists the components a host may load. [`ModuleHost`] loads
//! the eager ones at startup and the lazy ones on first reference, registering
//! each in the shared [`ComponentRegistry`] under its name and service key.
//! Components are native C-ABI libraries, Rust plugins exposing a
//! [`ServiceTable`], or local service tables compiled into the host.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use loom_runtime::{ComponentRegistry, Manifest, ModuleHost};
//!
//! # async fn run() -> Result<(), loom_runtime::LoadError> {
//! let manifest = Manifest::load(None)?;
//! let registry = Arc::new(ComponentRegistry::new());
//! let host = ModuleHost::new(Arc::clone(&registry), manifest);
//!
//! // Eager entries; the first failure aborts startup.
//! host.init().await?;
//!
//! // Lazy entries load here on first reference.
//! let orders = host.resolve_component("orders").await?;
//! println!("orders listens on {:?}", orders.listen_address());
//! # Ok(())
//! # }
//! ```

pub mod component;
pub mod error;
pub mod lifecycle;
pub mod loader;
pub mod manifest;
pub mod native;
pub mod registry;
pub mod service;
pub mod supervisor;

pub use component::{Component, ComponentHandle, ComponentKind};
pub use error::LoadError;
pub use lifecycle::ModuleHost;
pub use loader::{
    DefaultModuleLoader, LoadedModule, ModuleLoader, PluginModule, ServiceLoop, initialize_plugin,
};
pub use loom_core::ModuleParam;
pub use manifest::{Manifest, ModuleEntry, ModuleKind};
pub use native::{NativeModule, initialize_native};
pub use registry::ComponentRegistry;
pub use service::{CallContext, Code, DispatchError, ServiceTable, Status};
pub use supervisor::ServiceLoops;
