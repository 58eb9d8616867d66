use std::fmt;
use std::sync::Arc;

use crate::loader::PluginModule;
use crate::native::NativeModule;
use crate::service::ServiceTable;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// C-ABI shared library driven through its exported entry points.
    NativeLibrary,
    /// Rust-ABI plugin exposing a service table.
    HostPlugin,
    /// Compiled into the host and registered directly.
    Local,
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentKind::NativeLibrary => write!(f, "native"),
            ComponentKind::HostPlugin => write!(f, "plugin"),
            ComponentKind::Local => write!(f, "local"),
        }
    }
}

/// What a registered component owns.
#[derive(Clone)]
pub enum ComponentHandle {
    Native(Arc<dyn NativeModule>),
    Plugin {
        // Declared before `library`: the table's handlers live in the
        // library's code and must drop first.
        services: Arc<ServiceTable>,
        library: Arc<dyn PluginModule>,
    },
    Local(Arc<ServiceTable>),
}

impl ComponentHandle {
    pub fn kind(&self) -> ComponentKind {
        match self {
            ComponentHandle::Native(_) => ComponentKind::NativeLibrary,
            ComponentHandle::Plugin { .. } => ComponentKind::HostPlugin,
            ComponentHandle::Local(_) => ComponentKind::Local,
        }
    }

    /// Methods callable in-process, if the component exposes any.
    pub fn services(&self) -> Option<&Arc<ServiceTable>> {
        match self {
            ComponentHandle::Native(_) => None,
            ComponentHandle::Plugin { services, .. } | ComponentHandle::Local(services) => {
                Some(services)
            }
        }
    }
}

impl PartialEq for ComponentHandle {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ComponentHandle::Native(a), ComponentHandle::Native(b)) => {
                std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
            }
            (
                ComponentHandle::Plugin {
                    services: sa,
                    library: la,
                },
                ComponentHandle::Plugin {
                    services: sb,
                    library: lb,
                },
            ) => {
                Arc::ptr_eq(sa, sb) && std::ptr::addr_eq(Arc::as_ptr(la), Arc::as_ptr(lb))
            }
            (ComponentHandle::Local(a), ComponentHandle::Local(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentHandle::Native(module) => {
                f.debug_tuple("Native").field(&module.describe()).finish()
            }
            ComponentHandle::Plugin { services, library } => f
                .debug_struct("Plugin")
                .field("services", services)
                .field("library", &library.describe())
                .finish(),
            ComponentHandle::Local(services) => f.debug_tuple("Local").field(services).finish(),
        }
    }
}

/// A loaded unit registered under a unique name.
///
/// Immutable once built; the registry shares it behind an `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    name: String,
    service_key: String,
    listen_address: Option<String>,
    handle: ComponentHandle,
}

impl Component {
    pub fn new(
        name: impl Into<String>,
        service_key: impl Into<String>,
        listen_address: Option<String>,
        handle: ComponentHandle,
    ) -> Self {
        Self {
            name: name.into(),
            service_key: service_key.into(),
            listen_address: listen_address.filter(|a| !a.is_empty()),
            handle,
        }
    }

    /// A component compiled into the host.
    pub fn local(
        name: impl Into<String>,
        service_key: impl Into<String>,
        services: ServiceTable,
    ) -> Self {
        Self::new(
            name,
            service_key,
            None,
            ComponentHandle::Local(Arc::new(services)),
        )
    }

    pub fn with_listen_address(mut self, address: impl Into<String>) -> Self {
        let address = address.into();
        self.listen_address = (!address.is_empty()).then_some(address);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn service_key(&self) -> &str {
        &self.service_key
    }

    pub fn kind(&self) -> ComponentKind {
        self.handle.kind()
    }

    /// Address the component's own network listener reported, if any.
    pub fn listen_address(&self) -> Option<&str> {
        self.listen_address.as_deref()
    }

    /// Port of the listen address: `host:port`, `[::1]:port` or `:port`.
    pub fn listen_port(&self) -> Option<u16> {
        self.listen_address().and_then(parse_port)
    }

    pub fn handle(&self) -> &ComponentHandle {
        &self.handle
    }

    pub fn services(&self) -> Option<&Arc<ServiceTable>> {
        self.handle.services()
    }
}

fn parse_port(address: &str) -> Option<u16> {
    address
        .rsplit_once(':')
        .and_then(|(_, port)| port.parse::<u16>().ok())
        .filter(|port| *port != 0)
}
