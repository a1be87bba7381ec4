//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Request fails with an I/O-class error (dispatcher):
//!     → monitor.rs trigger (single flight)
//!     → inspector.rs deep ping until it reports no errors
//!     → monitor back to Idle
//!
//! /ping (network layer):
//!     status.rs paused? or monitor unhealthy? → 503, else 200
//!
//! /inspection (admin route):
//!     inspector.rs deep ping → 200 or 500 with the error list
//! ```
//!
//! # Design Decisions
//! - Probing is reactive: nothing runs until a request observes a failure
//! - Pause is an operator switch, separate from measured health

pub mod inspector;
pub mod monitor;
pub mod status;

pub use inspector::{HealthInspector, HttpProbeInspector};
pub use monitor::{HealthMonitor, MonitorState};
pub use status::ServerStatus;
