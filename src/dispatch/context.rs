//! Per-request state: what came in and what goes out.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, Method, StatusCode};

use crate::error::{most_severe, ErrorEntry, LogLevel};
use crate::routing::matcher::PathMatch;
use crate::security::auth::Caller;

const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// The inbound request as the network layer handed it over, plus what routing
/// and authentication learned about it.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    /// Decoded `application/x-www-form-urlencoded` body fields.
    pub form: Vec<(String, String)>,
    pub body: Bytes,
    pub path_params: HashMap<String, String>,
    pub matrix_params: HashMap<String, String>,
    pub caller: Option<Caller>,
}

impl RequestContext {
    /// `target` is the request target: path plus optional `?query`.
    pub fn new(method: Method, target: &str, headers: HeaderMap, body: Bytes) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (target, None),
        };
        let query = query
            .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
            .unwrap_or_default();

        let is_form = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.to_ascii_lowercase().starts_with(FORM_URLENCODED))
            .unwrap_or(false);
        let form = if is_form {
            url::form_urlencoded::parse(&body).into_owned().collect()
        } else {
            Vec::new()
        };

        Self {
            request_id: String::new(),
            method,
            path: path.to_string(),
            headers,
            query,
            form,
            body,
            path_params: HashMap::new(),
            matrix_params: HashMap::new(),
            caller: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn apply_match(&mut self, matched: PathMatch) {
        self.path_params = matched.path_params;
        self.matrix_params = matched.matrix_params;
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok())
    }

    pub fn query_values(&self, key: &str) -> Vec<&str> {
        self.query
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn form_values(&self, key: &str) -> Vec<&str> {
        self.form
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }
}

/// The response under construction.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    pub status: StatusCode,
    /// Explicit content type. `None` until the handler or negotiation sets it.
    pub content_type: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub errors: Vec<ErrorEntry>,
    pub log_level: LogLevel,
    timestamps: Vec<(&'static str, Instant)>,
}

impl ResponseContext {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(received: Instant) -> Self {
        Self {
            status: StatusCode::OK,
            content_type: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            errors: Vec::new(),
            log_level: LogLevel::Info,
            timestamps: vec![("received", received)],
        }
    }

    /// Record a named checkpoint.
    pub fn mark(&mut self, name: &'static str) {
        self.timestamps.push((name, Instant::now()));
    }

    pub fn timestamp(&self, name: &str) -> Option<Instant> {
        self.timestamps.iter().find(|(n, _)| *n == name).map(|(_, t)| *t)
    }

    pub fn timestamps(&self) -> &[(&'static str, Instant)] {
        &self.timestamps
    }

    pub fn between(&self, from: &str, to: &str) -> Option<Duration> {
        Some(self.timestamp(to)?.saturating_duration_since(self.timestamp(from)?))
    }

    pub fn received_at(&self) -> Instant {
        self.timestamps.first().map(|(_, t)| *t).unwrap_or_else(Instant::now)
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Record client-class binding errors. Status becomes 400 unless a more
    /// severe status is already set.
    pub fn reject(&mut self, entries: impl IntoIterator<Item = ErrorEntry>) {
        self.errors.extend(entries);
        let severest = most_severe(&self.errors, StatusCode::BAD_REQUEST);
        if self.status.is_success() || severest.as_u16() > self.status.as_u16() {
            self.status = severest;
        }
    }

    /// Terminal failure: status, entries and log level in one go.
    pub fn fail(&mut self, status: StatusCode, entries: Vec<ErrorEntry>, level: LogLevel) {
        self.status = status;
        self.errors.extend(entries);
        self.log_level = self.log_level.max(level);
    }

    /// Serialise the error list into the body as JSON.
    pub fn render_errors(&mut self) {
        match serde_json::to_vec(&self.errors) {
            Ok(body) => {
                self.body = Bytes::from(body);
                self.content_type = Some(crate::dispatch::negotiate::APPLICATION_JSON.to_string());
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialise error list");
                self.body = Bytes::new();
            }
        }
    }
}

impl Default for ResponseContext {
    fn default() -> Self {
        Self::new()
    }
}
