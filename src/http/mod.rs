//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, timeout, body limit)
//!     → /ping answered here
//!     → everything else: RequestContext → Dispatcher → ResponseContext
//!     → Send to client
//! ```

pub mod server;

pub use server::{AppState, HttpServer, X_REQUEST_ID};
