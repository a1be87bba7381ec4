//! Parameter binding subsystem.
//!
//! # Data Flow
//! ```text
//! RequestContext + matched route
//!     → binder.rs: for each ParamSpec in declared order
//!         → source lookup (path / matrix / query / form / header / cookie / body)
//!         → required / default policy
//!         → validation pattern (full match)
//!         → coerce.rs: text → Value        | body.rs: bytes → Box<dyn Any>
//!     → BoundArgs (one slot per ParamSpec)
//!     → errors accumulated on ResponseContext
//! ```
//!
//! # Design Decisions
//! - Binding never short-circuits; one round-trip reports every problem
//! - Bodies are decoded by monomorphised functions chosen at registration,
//!   so no type information is looked up per request

pub mod binder;
pub mod body;
pub mod coerce;
pub mod cookie;

pub use binder::{Bound, BoundArgs, ParameterBinder};
pub use body::{BodyType, Validate, Violation};
pub use coerce::Value;
pub use cookie::Cookie;
