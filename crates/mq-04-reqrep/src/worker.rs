//! # Worker Definition
//!
//! Request dispatch table: message-type identifier → handler, plus an
//! optional fallback for unmatched types. Built once at configuration time
//! and shared read-only by every serving task.
//!
//! ## Failure policy
//!
//! | Situation                         | Reply                              |
//! |-----------------------------------|------------------------------------|
//! | No handler and no fallback        | `Error` frame, "no handler ..."    |
//! | Request payload cannot be decoded | `Error` frame with decode reason   |
//! | Handler returns `Err`             | `Error` frame with handler reason  |
//! | Handler panics                    | `Error` frame, "handler panicked"  |
//! | Response cannot be encoded        | `Error` frame with encode reason   |
//!
//! Failures never close the connection or touch other connections.

use async_trait::async_trait;
use mq_02_serialization::{Message, SerializationRegistry, TypedMessage};
use mq_telemetry::metrics::HANDLER_INVOCATIONS;
use shared_types::{Frame, MessageTypeId};
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, warn};

/// Produces a response for one request.
#[async_trait]
pub trait RequestHandler: Send + Sync {
    /// Handle `request`. An `Err` is reported to the requester as a remote
    /// failure.
    async fn handle(&self, request: Arc<dyn Message>) -> anyhow::Result<Arc<dyn Message>>;
}

#[async_trait]
impl<F> RequestHandler for F
where
    F: Fn(Arc<dyn Message>) -> anyhow::Result<Arc<dyn Message>> + Send + Sync,
{
    async fn handle(&self, request: Arc<dyn Message>) -> anyhow::Result<Arc<dyn Message>> {
        self(request)
    }
}

/// Adapts a typed closure `Fn(&Req) -> Result<Resp>`.
struct TypedHandler<Req, Resp, F> {
    handler: F,
    _types: PhantomData<fn(&Req) -> Resp>,
}

#[async_trait]
impl<Req, Resp, F> RequestHandler for TypedHandler<Req, Resp, F>
where
    Req: TypedMessage,
    Resp: TypedMessage,
    F: Fn(&Req) -> anyhow::Result<Resp> + Send + Sync,
{
    async fn handle(&self, request: Arc<dyn Message>) -> anyhow::Result<Arc<dyn Message>> {
        let typed = request.downcast_ref::<Req>().ok_or_else(|| {
            anyhow::anyhow!(
                "request is message type {}, expected {}",
                request.message_type(),
                Req::MESSAGE_TYPE
            )
        })?;
        let response = (self.handler)(typed)?;
        Ok(Arc::new(response))
    }
}

/// Mapping from request type to handler.
#[derive(Clone, Default)]
pub struct WorkerDefinition {
    handlers: HashMap<MessageTypeId, Arc<dyn RequestHandler>>,
    fallback: Option<Arc<dyn RequestHandler>>,
}

impl WorkerDefinition {
    /// Empty definition; every request is unhandled until routes are added.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Route `Req` requests to a typed closure.
    ///
    /// A later route for the same type replaces the earlier one.
    #[must_use]
    pub fn route<Req, Resp, F>(self, handler: F) -> Self
    where
        Req: TypedMessage,
        Resp: TypedMessage,
        F: Fn(&Req) -> anyhow::Result<Resp> + Send + Sync + 'static,
    {
        self.handler(
            Req::MESSAGE_TYPE,
            TypedHandler {
                handler,
                _types: PhantomData,
            },
        )
    }

    /// Route `message_type` requests to `handler`.
    #[must_use]
    pub fn handler<H>(mut self, message_type: MessageTypeId, handler: H) -> Self
    where
        H: RequestHandler + 'static,
    {
        self.handlers.insert(message_type, Arc::new(handler));
        self
    }

    /// Handler for request types without a route.
    #[must_use]
    pub fn fallback<H>(mut self, handler: H) -> Self
    where
        H: RequestHandler + 'static,
    {
        self.fallback = Some(Arc::new(handler));
        self
    }

    /// Whether a request of `message_type` would reach a handler.
    #[must_use]
    pub fn handles(&self, message_type: MessageTypeId) -> bool {
        self.handlers.contains_key(&message_type) || self.fallback.is_some()
    }

    /// Routed request types, sorted.
    #[must_use]
    pub fn routes(&self) -> Vec<MessageTypeId> {
        let mut routes: Vec<_> = self.handlers.keys().copied().collect();
        routes.sort();
        routes
    }

    fn lookup(&self, message_type: MessageTypeId) -> Option<Arc<dyn RequestHandler>> {
        self.handlers
            .get(&message_type)
            .or(self.fallback.as_ref())
            .cloned()
    }

    /// Answer one `Request` frame with a `Response` or `Error` frame
    /// carrying the same correlation identifier.
    pub async fn process(&self, registry: &SerializationRegistry, request: &Frame) -> Frame {
        let correlation_id = request.correlation_id;
        let message_type = request.message_type;

        let Some(handler) = self.lookup(message_type) else {
            HANDLER_INVOCATIONS.with_label_values(&["unhandled"]).inc();
            debug!(%message_type, correlation_id, "No handler for request");
            return Frame::error(
                correlation_id,
                &format!("no handler for message type {message_type}"),
            );
        };

        let decoded = match registry.deserialize_frame(request) {
            Ok(decoded) => decoded,
            Err(e) => {
                HANDLER_INVOCATIONS.with_label_values(&["error"]).inc();
                return Frame::error(correlation_id, &e.to_string());
            }
        };

        // Run on its own task so a panicking handler is contained.
        let outcome = tokio::spawn(async move { handler.handle(decoded).await }).await;
        let response = match outcome {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                HANDLER_INVOCATIONS.with_label_values(&["error"]).inc();
                debug!(%message_type, correlation_id, error = %e, "Handler failed");
                return Frame::error(correlation_id, &format!("{e:#}"));
            }
            Err(e) => {
                HANDLER_INVOCATIONS.with_label_values(&["panic"]).inc();
                warn!(%message_type, correlation_id, error = %e, "Handler panicked");
                return Frame::error(correlation_id, "handler panicked");
            }
        };

        match registry.serialize(response.as_ref()) {
            Ok(payload) => {
                HANDLER_INVOCATIONS.with_label_values(&["ok"]).inc();
                Frame::response(response.message_type(), correlation_id, payload)
            }
            Err(e) => {
                HANDLER_INVOCATIONS.with_label_values(&["error"]).inc();
                Frame::error(correlation_id, &e.to_string())
            }
        }
    }
}

impl fmt::Debug for WorkerDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerDefinition")
            .field("routes", &self.routes())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}
