//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (sizes > 0, timeouts > 0, addresses parse)
//! - Check mixed-mode pool sizing (max >= core)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: EngineConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::{EngineConfig, ThreadingMode};

/// One semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &EngineConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("`{}` is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.max_body_bytes == 0 {
        errors.push(ValidationError::new("listener.max_body_bytes", "must be greater than 0"));
    }

    let execution = &config.execution;
    if execution.mode == ThreadingMode::Mixed {
        if execution.core_size == 0 {
            errors.push(ValidationError::new("execution.core_size", "must be at least 1 in mixed mode"));
        }
        if execution.max_size < execution.core_size {
            errors.push(ValidationError::new(
                "execution.max_size",
                format!(
                    "must be >= core_size ({} < {})",
                    execution.max_size, execution.core_size
                ),
            ));
        }
    }
    if execution.queue_capacity == 0 {
        errors.push(ValidationError::new("execution.queue_capacity", "must be greater than 0"));
    }

    if config.health.interval_ms == 0 {
        errors.push(ValidationError::new("health.interval_ms", "must be greater than 0"));
    }
    if config.health.timeout_ms == 0 {
        errors.push(ValidationError::new("health.timeout_ms", "must be greater than 0"));
    }
    for probe in &config.health.probe_urls {
        if url::Url::parse(probe).is_err() {
            errors.push(ValidationError::new("health.probe_urls", format!("`{}` is not a URL", probe)));
        }
    }

    if config.security.token_header.trim().is_empty() {
        errors.push(ValidationError::new("security.token_header", "must not be empty"));
    }
    if config.security.token_ttl_secs == 0 {
        errors.push(ValidationError::new("security.token_ttl_secs", "must be greater than 0"));
    }
    let mut seen = HashSet::new();
    for user in &config.security.users {
        if user.username.is_empty() {
            errors.push(ValidationError::new("security.users", "username must not be empty"));
        } else if !seen.insert(user.username.as_str()) {
            errors.push(ValidationError::new(
                "security.users",
                format!("duplicate user `{}`", user.username),
            ));
        }
    }

    if config.admin.role.trim().is_empty() {
        errors.push(ValidationError::new("admin.role", "must not be empty"));
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("`{}` is not a socket address", config.observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
