//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Resolved request:
//!     → auth.rs (headers → Option<Caller> via the Authenticator)
//!     → access.rs (route Access policy + caller → allow / 401 / 403)
//!     → Pass to binding
//! ```
//!
//! # Design Decisions
//! - Fail closed: no caller means 401 unless the route permits everyone
//! - Role checks are OR: one matching role suffices
//! - Authentication happens once per request, after routing, so unknown
//!   paths answer 404 without touching the token store

pub mod access;
pub mod auth;

pub use access::authorize;
pub use auth::{AuthError, Authenticator, Caller, TokenAuthenticator};
