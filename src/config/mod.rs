//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EngineConfig (validated, immutable)
//!     → handed to startup, which sizes the pool and builds the routes
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → execution section applied via PoolHandle::reconfigure
//!     → other changed sections logged as needing a restart
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only pool sizing is applied live
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AdminConfig, EngineConfig, ExecutionConfig, HealthConfig, ListenerConfig, LogFormat, ObservabilityConfig,
    SecurityConfig, ThreadingMode, TimeoutConfig, UserConfig,
};
