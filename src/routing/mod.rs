//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Route Compilation (at startup):
//!     RouteMeta[]
//!     → matcher.rs (template → exact key | anchored regex)
//!     → router.rs (exact map + per-method ordered pattern list)
//!     → Freeze as immutable RouteRegistry
//!
//! Incoming Request (method, path)
//!     → router.rs (exact lookup, then ordered pattern scan)
//!     → Return: Resolved { route, path/matrix params } or no-match
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - A bad template or duplicate route aborts startup, never a request
//! - Deterministic: same input always matches same route
//! - First registered pattern wins

pub mod error;
pub mod matcher;
pub mod meta;
pub mod router;

pub use error::{RegistryError, RouteError};
pub use matcher::{MatrixParamMeta, PathMatch, PathMatcher, PathParamMeta};
pub use meta::{Access, EnumCase, ParamSpec, RouteMeta, Source, TargetType};
pub use router::{RegistryBuilder, Resolved, Route, RouteRegistry};
