//! Error taxonomy shared by the dispatch pipeline.
//!
//! # Responsibilities
//! - Define the wire shape of a reported error (`ErrorEntry`)
//! - Define what handlers may fail with (`HandlerError`)
//! - Classify handler failures into status, log level, and health impact
//!
//! # Design Decisions
//! - Every entry carries the HTTP status it implies; the response status is the
//!   most severe entry
//! - Binding and authorization failures never become `HandlerError`s; they are
//!   recorded directly on the response

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// One reported problem: `{code, field, message}` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// HTTP status implied by this entry.
    pub code: u16,
    /// Offending parameter or field, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl ErrorEntry {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code: status.as_u16(),
            field: None,
            message: message.into(),
        }
    }

    pub fn for_field(status: StatusCode, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: status.as_u16(),
            field: Some(field.into()),
            message: message.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

/// Severity attached to a finished request. Drives the completion log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    /// Logged at ERROR with `alert = true`.
    Fatal,
}

/// Failures a handler may return.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Directory (LDAP-style) lookup failed.
    #[error("directory service failure: {0}")]
    DirectoryService(String),

    #[error("persistence failure: {0}")]
    Persistence(String),

    /// A downstream connection could not be established in time.
    #[error("connect timeout: {0}")]
    ConnectTimeout(String),

    /// A downstream call connected but did not answer in time. Retryable.
    #[error("response timeout: {0}")]
    ResponseTimeout(String),

    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("interrupted: {0}")]
    Interrupted(String),

    /// The handler rejects the request itself (validation beyond binding, 404 on a
    /// missing entity, ...).
    #[error("client error {status}")]
    Client {
        status: StatusCode,
        entries: Vec<ErrorEntry>,
    },

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Outcome of classifying a handler failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub status: StatusCode,
    pub level: LogLevel,
    /// Whether the failure should wake the health monitor.
    pub probe_health: bool,
}

impl HandlerError {
    /// Convenience for handler code: a single client-class entry.
    pub fn client(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Client {
            status,
            entries: vec![ErrorEntry::new(status, message)],
        }
    }

    pub fn other(message: impl Into<String>) -> Self {
        let message: String = message.into();
        Self::Other(message.into())
    }

    pub fn classify(&self) -> Classification {
        let (status, level, probe_health) = match self {
            HandlerError::DirectoryService(_) | HandlerError::Persistence(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, LogLevel::Fatal, false)
            }
            HandlerError::ConnectTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, LogLevel::Warn, false),
            HandlerError::ResponseTimeout(_) => (StatusCode::GATEWAY_TIMEOUT, LogLevel::Warn, false),
            HandlerError::Io(_) => (StatusCode::SERVICE_UNAVAILABLE, LogLevel::Error, true),
            HandlerError::Interrupted(_) => (StatusCode::INTERNAL_SERVER_ERROR, LogLevel::Fatal, false),
            HandlerError::Client { status, .. } => (*status, LogLevel::Info, false),
            HandlerError::Other(_) => (StatusCode::INTERNAL_SERVER_ERROR, LogLevel::Fatal, false),
        };
        Classification {
            status,
            level,
            probe_health,
        }
    }

    /// Entries reported to the client. Internal detail stays in the logs.
    pub fn entries(&self) -> Vec<ErrorEntry> {
        let status = self.classify().status;
        match self {
            HandlerError::Client { entries, .. } => entries.clone(),
            HandlerError::ConnectTimeout(_) => {
                vec![ErrorEntry::new(status, "downstream connect timed out")]
            }
            HandlerError::ResponseTimeout(_) => {
                vec![ErrorEntry::new(status, "downstream response timed out, retry later")]
            }
            HandlerError::Io(_) => vec![ErrorEntry::new(status, "service temporarily unavailable")],
            _ => vec![ErrorEntry::new(status, "internal server error")],
        }
    }
}

/// Pick the most severe status among `entries`, or `fallback` when empty.
pub fn most_severe(entries: &[ErrorEntry], fallback: StatusCode) -> StatusCode {
    entries
        .iter()
        .map(ErrorEntry::status)
        .max_by_key(|s| s.as_u16())
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_table() {
        let io = HandlerError::Io(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"));
        assert_eq!(io.classify().status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(io.classify().probe_health);

        let ct = HandlerError::ConnectTimeout("db".into());
        assert_eq!(ct.classify().status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(ct.classify().level, LogLevel::Warn);

        let p = HandlerError::Persistence("constraint".into());
        assert_eq!(p.classify().status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(p.classify().level, LogLevel::Fatal);

        let other = HandlerError::other("boom");
        assert_eq!(other.classify().level, LogLevel::Fatal);
        assert!(!other.classify().probe_health);
    }

    #[test]
    fn test_internal_detail_not_exposed() {
        let err = HandlerError::Persistence("password=hunter2".into());
        let entries = err.entries();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].message.contains("hunter2"));
    }

    #[test]
    fn test_most_severe() {
        let entries = vec![
            ErrorEntry::new(StatusCode::BAD_REQUEST, "a"),
            ErrorEntry::new(StatusCode::FORBIDDEN, "b"),
        ];
        assert_eq!(most_severe(&entries, StatusCode::OK), StatusCode::FORBIDDEN);
        assert_eq!(most_severe(&[], StatusCode::OK), StatusCode::OK);
    }

    #[test]
    fn test_entry_wire_shape() {
        let e = ErrorEntry::for_field(StatusCode::BAD_REQUEST, "id", "missing required field");
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["code"], 400);
        assert_eq!(json["field"], "id");
    }
}
