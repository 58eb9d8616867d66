//! Typed method tables for in-process dispatch.
//!
//! A component that serves calls in-process exposes a [`ServiceTable`]: the
//! methods of one RPC service, each bound to a handler taking a
//! [`CallContext`] and a typed request. Requests and replies travel through
//! the router as `dyn Any` and are downcast to the handler's types; a type
//! that does not match is reported as a [`DispatchError`].

use std::any::{Any, type_name};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use thiserror::Error;

/// Per-call metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    pub metadata: BTreeMap<String, String>,
    pub deadline: Option<Instant>,
}

impl CallContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Outcome classes for a failed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Code {
    Unknown,
    InvalidArgument,
    NotFound,
    Unimplemented,
    Internal,
    Unavailable,
}

/// Error value returned by a service method.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code:?}: {message}")]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("service {service} has no method {method}")]
    MethodNotFound { service: String, method: String },

    #[error("{method}: request is not a {expected}")]
    RequestType {
        method: String,
        expected: &'static str,
    },

    #[error("{method}: reply slot is not a {expected}")]
    ReplyType {
        method: String,
        expected: &'static str,
    },

    #[error(transparent)]
    Status(#[from] Status),
}

type Message = Box<dyn Any + Send>;
type HandlerFuture = Pin<Box<dyn Future<Output = Result<Message, Status>> + Send>>;
type Handler = Box<
    dyn Fn(CallContext, &(dyn Any + Send + Sync)) -> Result<HandlerFuture, DispatchError>
        + Send
        + Sync,
>;
type ReplyCheck = fn(&(dyn Any + Send)) -> bool;
type ReplyWriter = fn(Message, &mut (dyn Any + Send)) -> Result<(), &'static str>;

struct MethodEntry {
    handler: Handler,
    reply_type: &'static str,
    accepts_reply: ReplyCheck,
    write_reply: ReplyWriter,
}

/// The in-process methods of one service.
pub struct ServiceTable {
    service: String,
    methods: HashMap<String, MethodEntry>,
}

impl ServiceTable {
    /// `service` is the fully-qualified name, e.g. `orders.OrderService`.
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            methods: HashMap::new(),
        }
    }

    /// Bind `name` to an async handler.
    pub fn method<Req, Resp, F, Fut>(mut self, name: &str, handler: F) -> Self
    where
        Req: Clone + Send + Sync + 'static,
        Resp: Send + 'static,
        F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
    {
        let method = name.to_string();
        let handler: Handler = Box::new(
            move |ctx: CallContext,
                  request: &(dyn Any + Send + Sync)|
                  -> Result<HandlerFuture, DispatchError> {
                let request = request.downcast_ref::<Req>().cloned().ok_or_else(|| {
                    DispatchError::RequestType {
                        method: method.clone(),
                        expected: type_name::<Req>(),
                    }
                })?;
                let fut = handler(ctx, request);
                let boxed: HandlerFuture =
                    Box::pin(async move { fut.await.map(|resp| Box::new(resp) as Message) });
                Ok(boxed)
            },
        );

        self.methods.insert(
            name.to_string(),
            MethodEntry {
                handler,
                reply_type: type_name::<Resp>(),
                accepts_reply: accepts_reply::<Resp>,
                write_reply: write_reply::<Resp>,
            },
        );
        self
    }

    pub fn service_name(&self) -> &str {
        &self.service
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    /// Run `method` and overwrite `reply` with its response.
    ///
    /// A reply slot of the wrong type is rejected before the handler runs.
    pub async fn dispatch(
        &self,
        ctx: CallContext,
        method: &str,
        request: &(dyn Any + Send + Sync),
        reply: &mut (dyn Any + Send),
    ) -> Result<(), DispatchError> {
        let entry = self
            .methods
            .get(method)
            .ok_or_else(|| DispatchError::MethodNotFound {
                service: self.service.clone(),
                method: method.to_string(),
            })?;
        if !(entry.accepts_reply)(reply) {
            return Err(DispatchError::ReplyType {
                method: method.to_string(),
                expected: entry.reply_type,
            });
        }

        let response = (entry.handler)(ctx, request)?.await?;
        (entry.write_reply)(response, reply).map_err(|expected| DispatchError::ReplyType {
            method: method.to_string(),
            expected,
        })
    }

    /// Typed call for callers that hold the concrete message types.
    pub async fn call<Req, Resp>(
        &self,
        ctx: CallContext,
        method: &str,
        request: Req,
    ) -> Result<Resp, DispatchError>
    where
        Req: Send + Sync + 'static,
        Resp: Default + Send + 'static,
    {
        let mut reply = Resp::default();
        self.dispatch(ctx, method, &request, &mut reply).await?;
        Ok(reply)
    }
}

impl fmt::Debug for ServiceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self.method_names().collect();
        methods.sort_unstable();
        f.debug_struct("ServiceTable")
            .field("service", &self.service)
            .field("methods", &methods)
            .finish()
    }
}

fn accepts_reply<Resp: 'static>(reply: &(dyn Any + Send)) -> bool {
    reply.is::<Resp>()
}

fn write_reply<Resp: Send + 'static>(
    response: Message,
    reply: &mut (dyn Any + Send),
) -> Result<(), &'static str> {
    let expected = type_name::<Resp>();
    let slot = reply.downcast_mut::<Resp>().ok_or(expected)?;
    let response = response.downcast::<Resp>().map_err(|_| expected)?;
    *slot = *response;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Echo {
        text: String,
    }

    fn echo_table() -> ServiceTable {
        ServiceTable::new("echo.EchoService")
            .method("Say", |_ctx, req: Echo| async move {
                Ok(Echo {
                    text: format!("echo: {}", req.text),
                })
            })
            .method("Fail", |_ctx, _req: Echo| async move {
                Err::<Echo, _>(Status::invalid_argument("no"))
            })
    }

    #[tokio::test]
    async fn dispatch_overwrites_the_reply() {
        let table = echo_table();
        let request = Echo { text: "hi".into() };
        let mut reply = Echo { text: "stale".into() };

        table
            .dispatch(CallContext::new(), "Say", &request, &mut reply)
            .await
            .unwrap();
        assert_eq!(reply.text, "echo: hi");
    }

    #[tokio::test]
    async fn handler_status_is_propagated() {
        let table = echo_table();
        let err = table
            .call::<Echo, Echo>(CallContext::new(), "Fail", Echo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::Status(s) if s.code == Code::InvalidArgument));
    }

    #[tokio::test]
    async fn unknown_method_is_a_mismatch() {
        let err = echo_table()
            .call::<Echo, Echo>(CallContext::new(), "Shout", Echo::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::MethodNotFound { method, .. } if method == "Shout"));
    }

    #[tokio::test]
    async fn wrong_request_type_is_a_mismatch() {
        let err = echo_table()
            .call::<u32, Echo>(CallContext::new(), "Say", 7u32)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::RequestType { .. }));
    }

    #[tokio::test]
    async fn wrong_reply_type_is_a_mismatch() {
        let charges = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&charges);
        let table = ServiceTable::new("billing.BillingService").method(
            "Charge",
            move |_ctx, cents: u64| {
                counted.fetch_add(1, Ordering::SeqCst);
                async move { Ok(cents) }
            },
        );

        let mut reply = String::new();
        let err = table
            .dispatch(CallContext::new(), "Charge", &250u64, &mut reply)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::ReplyType { ref expected, .. } if *expected == "u64"));
        assert_eq!(charges.load(Ordering::SeqCst), 0, "handler must not run");
        assert!(reply.is_empty());

        let charged: u64 = table.call(CallContext::new(), "Charge", 250u64).await.unwrap();
        assert_eq!(charged, 250);
        assert_eq!(charges.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn lists_methods() {
        let table = echo_table();
        assert_eq!(table.service_name(), "echo.EchoService");
        assert!(table.has_method("Say"));
        assert!(!table.has_method("say"));
        assert_eq!(table.method_names().count(), 2);
    }
}
