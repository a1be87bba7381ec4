//! Administrative surface.
//!
//! # Data Flow
//! ```text
//! admin_routes(role, loadtest, deps)
//!     → Vec<RouteMeta>  (GET /version, GET /inspection, PUT /status,
//!                        POST /j_security_check, DELETE /logout,
//!                        loadtest echo when enabled)
//!     → registered next to the application's routes
//!     → dispatched, authorized and bound like any other route
//! ```
//!
//! # Design Decisions
//! - No side door: admin endpoints are ordinary routes behind the same
//!   authorization and binding pipeline
//! - `/ping` is the exception and lives in the HTTP adapter

pub mod handlers;

pub use handlers::{admin_routes, AdminDeps, InspectionReport};
