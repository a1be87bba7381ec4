//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Dispatcher, pool, health monitor
//!     → logging.rs (tracing events; one completion event per request at
//!                   the level the response carries)
//!     → metrics.rs (request counters and latency, pool gauges, probe counts)
//!
//! Consumers:
//!     → stdout, pretty or JSON lines
//!     → Prometheus scrape listener (when enabled)
//! ```
//!
//! # Design Decisions
//! - Every event carries the request ID set by the HTTP layer
//! - Metrics macros are no-ops until an exporter is installed, so tests
//!   need no setup

pub mod logging;
pub mod metrics;
