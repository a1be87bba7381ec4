//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Validate config → Pool → Auth → Health → Routes → Dispatcher → Bind
//!
//! Shutdown (shutdown.rs):
//!     Trigger → Stop accepting → Stop monitor and watcher → Drain pool → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then core, then listeners
//! - Ordered shutdown: stop accept, drain, close
//! - A route conflict is a startup error, never a runtime one

pub mod shutdown;
pub mod signals;
pub mod startup;

pub use shutdown::Shutdown;
pub use startup::{Engine, EngineBuilder, StartupError};
