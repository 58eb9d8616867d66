use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use loom_runtime::{
    CallContext, Code, Component, ComponentRegistry, DispatchError, LoadError, ModuleHost, Status,
};
use thiserror::Error;

use crate::method::MethodPath;

pub type InvokeFuture<'a> = Pin<Box<dyn Future<Output = Result<(), Status>> + Send + 'a>>;

/// A unary RPC client connection.
///
/// `request` is the caller's message; `reply` points at a pre-allocated
/// response that a successful call overwrites.
pub trait ClientConn: Send + Sync {
    fn invoke<'a>(
        &'a self,
        ctx: CallContext,
        method: &'a str,
        request: &'a (dyn Any + Send + Sync),
        reply: &'a mut (dyn Any + Send),
    ) -> InvokeFuture<'a>;
}

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("component not found: {0}")]
    ComponentNotFound(String),

    #[error("malformed method path: {0:?}")]
    MalformedMethodPath(String),

    #[error("component {0} serves no in-process methods")]
    NoServices(String),

    #[error("service {service} has no method {method}")]
    MethodNotFound { service: String, method: String },

    #[error("{method}: message type mismatch, handler expects {expected}")]
    TypeMismatch {
        method: String,
        expected: &'static str,
    },

    #[error(transparent)]
    Status(#[from] Status),

    #[error(transparent)]
    Load(#[from] LoadError),
}

impl From<DispatchError> for RouteError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::MethodNotFound { service, method } => {
                RouteError::MethodNotFound { service, method }
            }
            DispatchError::RequestType { method, expected }
            | DispatchError::ReplyType { method, expected } => {
                RouteError::TypeMismatch { method, expected }
            }
            DispatchError::Status(status) => RouteError::Status(status),
        }
    }
}

impl RouteError {
    pub fn code(&self) -> Code {
        match self {
            RouteError::Status(status) => status.code,
            RouteError::ComponentNotFound(_) => Code::NotFound,
            RouteError::MalformedMethodPath(_) => Code::InvalidArgument,
            RouteError::NoServices(_) | RouteError::MethodNotFound { .. } => Code::Unimplemented,
            RouteError::TypeMismatch { .. } => Code::Internal,
            RouteError::Load(_) => Code::Unavailable,
        }
    }

    /// The status a caller behind the [`ClientConn`] boundary sees.
    pub fn into_status(self) -> Status {
        match self {
            RouteError::Status(status) => status,
            other => Status::new(other.code(), other.to_string()),
        }
    }
}

/// Client connection that serves calls from in-process components.
///
/// Wraps the network connection a generated client would use. Calls whose
/// method path names a registered component are dispatched to that
/// component's [`ServiceTable`](loom_runtime::ServiceTable) without touching
/// the network; in remote mode every call is forwarded unchanged.
#[derive(Clone)]
pub struct ComponentChannel {
    conn: Arc<dyn ClientConn>,
    host: Arc<ModuleHost>,
}

impl ComponentChannel {
    pub fn new(conn: Arc<dyn ClientConn>, host: Arc<ModuleHost>) -> Self {
        Self { conn, host }
    }

    /// The wrapped network connection.
    pub fn conn(&self) -> &Arc<dyn ClientConn> {
        &self.conn
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        self.host.registry()
    }

    /// Route one unary call.
    ///
    /// Only components already registered are served locally; a miss is
    /// [`RouteError::ComponentNotFound`] and never triggers a lazy load.
    pub async fn invoke(
        &self,
        ctx: CallContext,
        method: &str,
        request: &(dyn Any + Send + Sync),
        reply: &mut (dyn Any + Send),
    ) -> Result<(), RouteError> {
        let registry = self.host.registry();
        if registry.is_remote().await {
            tracing::trace!(method, "Remote mode, forwarding");
            return Ok(self.conn.invoke(ctx, method, request, reply).await?);
        }

        let path = MethodPath::parse(method)
            .ok_or_else(|| RouteError::MalformedMethodPath(method.to_string()))?;
        let name = path.component();
        let component = registry.lookup_by_name(name).await.ok_or_else(|| {
            tracing::debug!(method, component = name, "No local component for call");
            RouteError::ComponentNotFound(name.to_string())
        })?;

        tracing::trace!(method, component = name, "Dispatching in-process");
        dispatch(&component, ctx, path.method, request, reply).await
    }

    /// Return the named component, loading it from the manifest on first
    /// reference.
    pub async fn resolve_component(&self, name: &str) -> Result<Arc<Component>, RouteError> {
        Ok(self.host.resolve_component(name).await?)
    }

    /// Call `method` on the named component outside the method-path
    /// convention, loading the component first if needed.
    pub async fn call_component<Req, Resp>(
        &self,
        ctx: CallContext,
        name: &str,
        method: &str,
        request: Req,
    ) -> Result<Resp, RouteError>
    where
        Req: Send + Sync + 'static,
        Resp: Default + Send + 'static,
    {
        let component = self.resolve_component(name).await?;
        let mut reply = Resp::default();
        dispatch(&component, ctx, method, &request, &mut reply).await?;
        Ok(reply)
    }
}

async fn dispatch(
    component: &Component,
    ctx: CallContext,
    method: &str,
    request: &(dyn Any + Send + Sync),
    reply: &mut (dyn Any + Send),
) -> Result<(), RouteError> {
    let services = component
        .services()
        .ok_or_else(|| RouteError::NoServices(component.name().to_string()))?;
    services.dispatch(ctx, method, request, reply).await?;
    Ok(())
}

impl ClientConn for ComponentChannel {
    fn invoke<'a>(
        &'a self,
        ctx: CallContext,
        method: &'a str,
        request: &'a (dyn Any + Send + Sync),
        reply: &'a mut (dyn Any + Send),
    ) -> InvokeFuture<'a> {
        Box::pin(async move {
            ComponentChannel::invoke(self, ctx, method, request, reply)
                .await
                .map_err(RouteError::into_status)
        })
    }
}
