//! Call routing for loom components.
//!
//! [`ComponentChannel`] wraps an RPC client connection and serves calls whose
//! method path names a registered component in-process. [`dial_override`]
//! points a client's connections at a same-host component's listener when one
//! is registered for its service key.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use loom_proxy::{ClientConn, ComponentChannel, dial_override};
//! use loom_runtime::{ComponentRegistry, Manifest, ModuleHost};
//!
//! # async fn run(network: Arc<dyn ClientConn>) -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(ComponentRegistry::new());
//! let host = Arc::new(ModuleHost::new(Arc::clone(&registry), Manifest::load(None)?));
//! host.init().await?;
//!
//! let channel = ComponentChannel::new(network, Arc::clone(&host));
//! let dial = dial_override(registry, "orders.v1");
//! let _stream = dial("orders.internal:443".to_string()).await?;
//! # let _ = channel;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod dial;
pub mod method;

pub use channel::{ClientConn, ComponentChannel, InvokeFuture, RouteError};
pub use dial::{DialFn, DialFuture, dial_override};
pub use method::MethodPath;
