//! Handler trait, type erasure, and what a handler returns.
//!
//! ```text
//! async fn get_user(call: Call) -> Result<Reply, HandlerError>   ← user writes this
//!        ↓ RouteMeta::new(Method::GET, "/users/{id}", get_user)
//! get_user.into_boxed_handler()                                  ← blanket impl
//!        ↓ stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(call) on an execution pool worker                 ← one vtable dispatch
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use serde::Serialize;

use crate::binding::binder::BoundArgs;
use crate::dispatch::context::RequestContext;
use crate::error::HandlerError;

pub type HandlerResult = Result<Reply, HandlerError>;

/// Heap-allocated handler future.
pub type BoxFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send + 'static>>;

/// Everything a handler is invoked with.
#[derive(Debug)]
pub struct Call {
    pub request: RequestContext,
    /// Bound parameters, in declaration order.
    pub args: BoundArgs,
}

#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, call: Call) -> BoxFuture;
}

pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every `Fn(Call) -> impl Future<Output = HandlerResult>`.
pub trait Handler: Send + Sync + 'static {
    fn into_boxed_handler(self) -> BoxedHandler;
}

impl<F, Fut> Handler for F
where
    F: Fn(Call) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

struct FnHandler<F>(F);

impl<F, Fut> ErasedHandler for FnHandler<F>
where
    F: Fn(Call) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, call: Call) -> BoxFuture {
        Box::pin((self.0)(call))
    }
}

/// A value the dispatcher can serialise in any negotiated format.
pub trait Payload: Send + 'static {
    fn to_json(&self) -> Result<Vec<u8>, serde_json::Error>;
    fn to_xml(&self) -> Result<String, String>;
    /// Strings render bare; anything else renders as its JSON text.
    fn to_text(&self) -> Result<String, serde_json::Error>;
}

impl<T> Payload for T
where
    T: Serialize + Send + 'static,
{
    fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    fn to_xml(&self) -> Result<String, String> {
        quick_xml::se::to_string(self)
            .or_else(|_| quick_xml::se::to_string_with_root("response", self))
            .map_err(|e| e.to_string())
    }

    fn to_text(&self) -> Result<String, serde_json::Error> {
        match serde_json::to_value(self)? {
            serde_json::Value::String(s) => Ok(s),
            other => Ok(other.to_string()),
        }
    }
}

/// Reply body.
pub enum ReplyBody {
    Empty,
    /// Passed through untouched whatever the content type.
    Raw(String),
    Value(Box<dyn Payload>),
}

impl std::fmt::Debug for ReplyBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReplyBody::Empty => f.write_str("Empty"),
            ReplyBody::Raw(s) => f.debug_tuple("Raw").field(s).finish(),
            ReplyBody::Value(_) => f.write_str("Value(..)"),
        }
    }
}

/// What a successful handler returns. Explicit status, content type and
/// headers win over anything the dispatcher would pick.
#[derive(Debug)]
pub struct Reply {
    pub(crate) status: Option<StatusCode>,
    pub(crate) content_type: Option<String>,
    pub(crate) headers: HeaderMap,
    pub(crate) body: ReplyBody,
}

impl Reply {
    fn with_body(body: ReplyBody) -> Self {
        Self {
            status: None,
            content_type: None,
            headers: HeaderMap::new(),
            body,
        }
    }

    /// No body; 204 unless a status is set.
    pub fn empty() -> Self {
        Self::with_body(ReplyBody::Empty)
    }

    pub fn raw(text: impl Into<String>) -> Self {
        Self::with_body(ReplyBody::Raw(text.into()))
    }

    pub fn value<T: Serialize + Send + 'static>(value: T) -> Self {
        Self::with_body(ReplyBody::Value(Box::new(value)))
    }

    pub fn status(mut self, status: StatusCode) -> Self {
        self.status = Some(status);
        self
    }

    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Point {
        x: i32,
        y: i32,
    }

    #[test]
    fn test_payload_formats() {
        let p = Point { x: 1, y: 2 };
        assert_eq!(p.to_json().unwrap(), br#"{"x":1,"y":2}"#.to_vec());
        assert_eq!(p.to_xml().unwrap(), "<Point><x>1</x><y>2</y></Point>");
        assert_eq!("plain".to_string().to_text().unwrap(), "plain");
        assert_eq!(7u32.to_text().unwrap(), "7");
    }

    #[test]
    fn test_reply_builder() {
        let reply = Reply::raw("ok")
            .status(StatusCode::CREATED)
            .content_type("text/csv")
            .header(HeaderName::from_static("x-authtoken"), HeaderValue::from_static("t"));
        assert_eq!(reply.status, Some(StatusCode::CREATED));
        assert_eq!(reply.content_type.as_deref(), Some("text/csv"));
        assert!(reply.headers.contains_key("x-authtoken"));
    }
}
