use std::future::Future;
use std::io;
use std::net::Ipv4Addr;
use std::pin::Pin;
use std::sync::Arc;

use loom_runtime::{Component, ComponentRegistry};
use tokio::net::TcpStream;

pub type DialFuture = Pin<Box<dyn Future<Output = io::Result<TcpStream>> + Send>>;

/// Connection factory for an RPC client: takes the configured target
/// address and returns a connected stream.
pub type DialFn = Arc<dyn Fn(String) -> DialFuture + Send + Sync>;

/// Build a dial function for clients of `service_key`.
///
/// Each dial looks the key up in the registry. When a component carrying it
/// reported a listen address, the connection goes to that port on loopback
/// whatever address the client asked for; otherwise the requested address
/// is dialed unchanged.
pub fn dial_override(registry: Arc<ComponentRegistry>, service_key: impl Into<String>) -> DialFn {
    let service_key: Arc<str> = Arc::from(service_key.into());
    Arc::new(move |addr: String| {
        let registry = Arc::clone(&registry);
        let service_key = Arc::clone(&service_key);
        Box::pin(async move {
            let local = registry.lookup_by_service_key(&service_key).await;
            let Some(component) = local.filter(|c| c.listen_address().is_some()) else {
                tracing::trace!(
                    service_key = %service_key,
                    addr = %addr,
                    "Dialing requested address"
                );
                return TcpStream::connect(addr.as_str()).await;
            };

            let port = listen_port(&component).inspect_err(|e| {
                tracing::error!(service_key = %service_key, error = %e, "Unusable listen address");
            })?;
            tracing::debug!(
                service_key = %service_key,
                requested = %addr,
                port,
                "Dialing local component"
            );
            TcpStream::connect((Ipv4Addr::LOCALHOST, port)).await
        }) as DialFuture
    })
}

/// Loaded components are checked at load time; directly registered ones
/// are only caught here.
fn listen_port(component: &Component) -> io::Result<u16> {
    component.listen_port().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "listen address {:?} of {} has no port",
                component.listen_address().unwrap_or_default(),
                component.name()
            ),
        )
    })
}
