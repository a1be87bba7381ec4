//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! RequestContext (from the network layer)
//!     → dispatcher.rs
//!         Resolving    RouteRegistry::resolve        → 404
//!         Authorizing  Authenticator + access policy → 401 / 403
//!         Binding      consumed type, ParameterBinder → 415 / 400
//!         Invoking     handler.rs on an execution pool worker → 503 if rejected
//!         Serializing  negotiate.rs picks the media type and encodes the Reply
//!         Done
//!     → ResponseContext (status, headers, body, errors, timestamps)
//! ```
//!
//! # Design Decisions
//! - Handlers are plain async functions `Call → Result<Reply, HandlerError>`
//!   stored behind one trait object; no reflection, no per-route codegen
//! - Every failure ends in a well-formed `ResponseContext`; the network
//!   layer never sees an error type

pub mod context;
pub mod dispatcher;
pub mod handler;
pub mod negotiate;

pub use context::{RequestContext, ResponseContext};
pub use dispatcher::{Dispatcher, Stage};
pub use handler::{BoxedHandler, Call, Handler, HandlerResult, Payload, Reply, ReplyBody};
pub use negotiate::{APPLICATION_JSON, APPLICATION_XML, TEXT_PLAIN};
