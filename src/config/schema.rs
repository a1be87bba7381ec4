//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the engine.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the dispatch engine.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Listener configuration (bind address, body limit).
    pub listener: ListenerConfig,

    /// Worker pool sizing.
    pub execution: ExecutionConfig,

    /// Health probe settings.
    pub health: HealthConfig,

    /// Users and token header.
    pub security: SecurityConfig,

    /// Administrative routes.
    pub admin: AdminConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Largest request body accepted, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            max_body_bytes: 2 * 1024 * 1024,
        }
    }
}

/// Declared workload shape the pool is sized for.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThreadingMode {
    /// core = max = parallelism + 1.
    Cpu,
    /// core = max = parallelism * 2 + 1.
    #[default]
    Io,
    /// core and max taken from the config.
    Mixed,
}

/// Execution pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ExecutionConfig {
    pub mode: ThreadingMode,

    /// Worker count kept alive. Only read in mixed mode.
    pub core_size: usize,

    /// Worker ceiling. Only read in mixed mode.
    pub max_size: usize,

    /// Jobs that may wait for a worker before submissions are rejected.
    pub queue_capacity: usize,

    /// Idle time after which a worker above core size exits, in milliseconds.
    pub keep_alive_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            mode: ThreadingMode::Io,
            core_size: 8,
            max_size: 16,
            queue_capacity: 1024,
            keep_alive_ms: 60_000,
        }
    }
}

impl ExecutionConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.keep_alive_ms)
    }
}

/// Health probe configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct HealthConfig {
    /// Pause between failed probes in milliseconds.
    pub interval_ms: u64,

    /// Timeout for a single probe request in milliseconds.
    pub timeout_ms: u64,

    /// Downstream URLs a deep probe must reach.
    pub probe_urls: Vec<String>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_ms: 5_000,
            timeout_ms: 2_000,
            probe_urls: Vec::new(),
        }
    }
}

impl HealthConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Security configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SecurityConfig {
    /// Header carrying the issued token.
    pub token_header: String,

    /// Lifetime of an issued token.
    pub token_ttl_secs: u64,

    pub users: Vec<UserConfig>,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            token_header: "X-AuthToken".to_string(),
            token_ttl_secs: 3_600,
            users: Vec::new(),
        }
    }
}

impl SecurityConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

/// A user the token authenticator accepts.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct UserConfig {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
}

/// Administrative route configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AdminConfig {
    /// Role a caller needs for the admin routes.
    pub role: String,

    /// Register the loadtest echo routes.
    pub loadtest_enabled: bool,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            role: "admin".to_string(),
            loadtest_enabled: false,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { request_secs: 30 }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: EngineConfig = toml::from_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.security.token_header, "X-AuthToken");
        assert_eq!(config.admin.role, "admin");
    }

    #[test]
    fn test_sections_parse() {
        let config: EngineConfig = toml::from_str(
            r#"
            [execution]
            mode = "mixed"
            core_size = 2
            max_size = 4
            queue_capacity = 10

            [observability]
            log_format = "json"

            [[security.users]]
            username = "ana"
            password = "pw"
            roles = ["admin"]
            "#,
        )
        .unwrap();
        assert_eq!(config.execution.mode, ThreadingMode::Mixed);
        assert_eq!(config.execution.queue_capacity, 10);
        assert_eq!(config.execution.keep_alive_ms, 60_000);
        assert_eq!(config.observability.log_format, LogFormat::Json);
        assert_eq!(config.security.users[0].roles, vec!["admin"]);
        assert!(config.security.users[0].groups.is_empty());
    }
}
