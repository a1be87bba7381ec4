//! Structured logging.
//!
//! # Responsibilities
//! - Initialize logging subsystem
//! - Emit the per-request completion event at the request's own level
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - JSON format for production, pretty format for development
//! - Log level configurable via config; `RUST_LOG` wins when set
//! - `Fatal` has no tracing level of its own: it logs at ERROR with
//!   `alert = true` so alerting can key on the field

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, ObservabilityConfig};
use crate::dispatch::context::{RequestContext, ResponseContext};
use crate::error::LogLevel;

/// Install the global subscriber. Safe to call twice; the second call is
/// ignored.
pub fn init_logging(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("switchyard={0},tower_http={0}", config.log_level)));

    let registry = tracing_subscriber::registry().with(filter);
    let result = match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).try_init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };
    if let Err(e) = result {
        eprintln!("logging already initialised: {}", e);
    }
}

/// One event per finished request.
pub fn log_completion(request: &RequestContext, route: Option<&str>, response: &ResponseContext) {
    let total_ms = response
        .between("received", "serialized")
        .unwrap_or_else(|| response.received_at().elapsed())
        .as_secs_f64()
        * 1000.0;
    let business_ms = response
        .between("business_logic_begin", "business_logic_end")
        .map(|d| d.as_secs_f64() * 1000.0);
    let route = route.unwrap_or("-");
    let status = response.status.as_u16();
    let errors = response.errors.len();

    macro_rules! emit {
        ($level:ident $(, $extra:ident = $value:expr)*) => {
            tracing::$level!(
                request_id = %request.request_id,
                method = %request.method,
                path = %request.path,
                route,
                status,
                errors,
                total_ms,
                business_ms = ?business_ms,
                $($extra = $value,)*
                "Request completed"
            )
        };
    }

    match response.log_level {
        LogLevel::Debug => emit!(debug),
        LogLevel::Info => emit!(info),
        LogLevel::Warn => emit!(warn),
        LogLevel::Error => emit!(error),
        LogLevel::Fatal => emit!(error, alert = true),
    }
}
