//! Execution subsystem: where handlers actually run.
//!
//! # Data Flow
//! ```text
//! Dispatcher (network task)
//!     → handle.rs: load current pool
//!     → pool.rs: try_send into bounded queue
//!         ├── queued → a worker picks it up
//!         ├── queue full, below max → new worker runs it directly
//!         └── queue full, at max → Rejected(PoolState) → 503
//!
//! Reconfigure (config reload):
//!     build new pool → swap into handle → old pool drains and stops
//! ```
//!
//! # Design Decisions
//! - Backpressure is the load-shedding mechanism: nothing queues unbounded
//!   and no network task ever waits on a full queue
//! - Occupancy counters are atomics, read without locking for telemetry

pub mod handle;
pub mod pool;

pub use handle::PoolHandle;
pub use pool::{ExecutionPool, Job, PoolError, PoolSizes, PoolState, SubmitError};
