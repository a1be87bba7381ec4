//! Caller identity and token authentication.
//!
//! # Responsibilities
//! - Turn request headers into an optional `Caller`
//! - Issue tokens on login, forget them on logout or once they expire
//!
//! # Design Decisions
//! - The dispatcher only sees the `Authenticator` trait; the in-memory
//!   token store is one implementation
//! - Tokens are UUID v4 strings held in a `DashMap`, so lookups never block
//!   other requests
//! - Expired tokens are refused on lookup and swept on every login, so the
//!   map holds at most the tokens issued within one TTL

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use axum::http::header::AUTHORIZATION;
use axum::http::HeaderMap;
use dashmap::DashMap;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{SecurityConfig, UserConfig};

/// An authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Caller {
    pub id: String,
    pub roles: BTreeSet<String>,
    pub groups: BTreeSet<String>,
}

impl Caller {
    pub fn new<I, S>(id: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            roles: roles.into_iter().map(Into::into).collect(),
            groups: BTreeSet::new(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid credentials for `{0}`")]
    InvalidCredentials(String),
    #[error("missing credentials")]
    MissingCredentials,
}

/// Identity source consulted once per request.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, headers: &HeaderMap) -> Option<Caller>;

    /// Verify credentials and issue a token.
    fn login(&self, username: &str, password: &str) -> Result<String, AuthError>;

    /// Forget whatever token the headers carry.
    fn logout(&self, headers: &HeaderMap);

    /// Header the issued token travels in.
    fn token_header(&self) -> &str;
}

struct Session {
    caller: Caller,
    issued: Instant,
}

/// Configured users plus an in-memory token cache.
pub struct TokenAuthenticator {
    header: String,
    users: Vec<UserConfig>,
    ttl: Duration,
    tokens: DashMap<String, Session>,
}

impl TokenAuthenticator {
    pub fn new(config: &SecurityConfig) -> Self {
        Self {
            header: config.token_header.to_ascii_lowercase(),
            users: config.users.clone(),
            ttl: config.token_ttl(),
            tokens: DashMap::new(),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    fn sweep_expired(&self) {
        let before = self.tokens.len();
        self.tokens.retain(|_, session| session.issued.elapsed() < self.ttl);
        let swept = before.saturating_sub(self.tokens.len());
        if swept > 0 {
            tracing::debug!(swept, "Expired tokens removed");
        }
    }

    /// Token from the configured header, or from `Authorization: Bearer`.
    fn presented_token<'h>(&self, headers: &'h HeaderMap) -> Option<&'h str> {
        if let Some(token) = headers.get(self.header.as_str()).and_then(|v| v.to_str().ok()) {
            return Some(token.trim());
        }
        headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
    }

    pub fn active_tokens(&self) -> usize {
        self.tokens.len()
    }
}

impl Authenticator for TokenAuthenticator {
    fn authenticate(&self, headers: &HeaderMap) -> Option<Caller> {
        let token = self.presented_token(headers)?;
        let caller = {
            let session = self.tokens.get(token)?;
            (session.issued.elapsed() < self.ttl).then(|| session.caller.clone())
        };
        if caller.is_none() {
            self.tokens.remove_if(token, |_, session| session.issued.elapsed() >= self.ttl);
        }
        caller
    }

    fn login(&self, username: &str, password: &str) -> Result<String, AuthError> {
        if username.is_empty() || password.is_empty() {
            return Err(AuthError::MissingCredentials);
        }
        let user = self
            .users
            .iter()
            .find(|u| u.username == username && u.password == password)
            .ok_or_else(|| AuthError::InvalidCredentials(username.to_string()))?;

        self.sweep_expired();
        let token = Uuid::new_v4().to_string();
        let caller = Caller {
            id: user.username.clone(),
            roles: user.roles.iter().cloned().collect(),
            groups: user.groups.iter().cloned().collect(),
        };
        self.tokens.insert(
            token.clone(),
            Session {
                caller,
                issued: Instant::now(),
            },
        );
        tracing::info!(user = %username, "Token issued");
        Ok(token)
    }

    fn logout(&self, headers: &HeaderMap) {
        if let Some(token) = self.presented_token(headers) {
            if let Some((_, session)) = self.tokens.remove(token) {
                tracing::info!(user = %session.caller.id, "Token revoked");
            }
        }
    }

    fn token_header(&self) -> &str {
        &self.header
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config() -> SecurityConfig {
        SecurityConfig {
            token_header: "X-AuthToken".into(),
            token_ttl_secs: 3_600,
            users: vec![UserConfig {
                username: "ana".into(),
                password: "pw".into(),
                roles: vec!["admin".into(), "ops".into()],
                groups: vec!["infra".into()],
            }],
        }
    }

    #[test]
    fn test_login_authenticate_logout() {
        let auth = TokenAuthenticator::new(&config());
        let token = auth.login("ana", "pw").unwrap();

        let mut headers = HeaderMap::new();
        headers.insert("x-authtoken", HeaderValue::from_str(&token).unwrap());
        let caller = auth.authenticate(&headers).unwrap();
        assert_eq!(caller.id, "ana");
        assert!(caller.has_role("ops"));
        assert!(caller.groups.contains("infra"));

        auth.logout(&headers);
        assert!(auth.authenticate(&headers).is_none());
        assert_eq!(auth.active_tokens(), 0);
    }

    #[test]
    fn test_bearer_token_accepted() {
        let auth = TokenAuthenticator::new(&config());
        let token = auth.login("ana", "pw").unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", token)).unwrap());
        assert!(auth.authenticate(&headers).is_some());
    }

    #[test]
    fn test_expired_tokens_refused_and_swept() {
        let auth = TokenAuthenticator::new(&config()).with_ttl(Duration::from_millis(30));
        let first = auth.login("ana", "pw").unwrap();
        let second = auth.login("ana", "pw").unwrap();
        assert_eq!(auth.active_tokens(), 2);
        std::thread::sleep(Duration::from_millis(60));

        let mut headers = HeaderMap::new();
        headers.insert("x-authtoken", HeaderValue::from_str(&first).unwrap());
        assert!(auth.authenticate(&headers).is_none());
        assert_eq!(auth.active_tokens(), 1);

        let fresh = auth.login("ana", "pw").unwrap();
        assert_eq!(auth.active_tokens(), 1);
        headers.insert("x-authtoken", HeaderValue::from_str(&second).unwrap());
        assert!(auth.authenticate(&headers).is_none());
        headers.insert("x-authtoken", HeaderValue::from_str(&fresh).unwrap());
        assert!(auth.authenticate(&headers).is_some());
    }

    #[test]
    fn test_bad_credentials() {
        let auth = TokenAuthenticator::new(&config());
        assert_eq!(auth.login("ana", "nope"), Err(AuthError::InvalidCredentials("ana".into())));
        assert_eq!(auth.login("", ""), Err(AuthError::MissingCredentials));
        assert!(auth.authenticate(&HeaderMap::new()).is_none());
    }
}
