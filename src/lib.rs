//! Switchyard: declarative HTTP request dispatch.
//!
//! Routes are described as data (`RouteMeta` + `ParamSpec`), compiled into a
//! registry at startup, and served through one pipeline: resolve, authorize,
//! bind, invoke on a bounded execution pool, negotiate, serialize.

pub mod admin;
pub mod binding;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod execution;
pub mod health;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod routing;
pub mod security;

pub use config::schema::EngineConfig;
pub use dispatch::{Call, Dispatcher, HandlerResult, Reply};
pub use error::{ErrorEntry, HandlerError};
pub use http::HttpServer;
pub use lifecycle::{Engine, EngineBuilder, Shutdown};
pub use routing::{ParamSpec, RouteMeta, TargetType};
