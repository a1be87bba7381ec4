//! Registration-time routing errors.

use std::fmt;

use thiserror::Error;

/// A single problem found while compiling a route.
#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid path template `{template}`: {reason}")]
    InvalidTemplate { template: String, reason: String },

    #[error("invalid placeholder regex in `{template}`: {source}")]
    InvalidPattern {
        template: String,
        #[source]
        source: regex::Error,
    },

    #[error("duplicate route {method} {template}")]
    Conflict { method: String, template: String },

    #[error("route {method} {template}: parameter `{param}`: {reason}")]
    InvalidParam {
        method: String,
        template: String,
        param: String,
        reason: String,
    },
}

/// Every problem found while building a registry. Registration is
/// all-or-nothing: one of these means no route is served.
#[derive(Debug)]
pub struct RegistryError(pub Vec<RouteError>);

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "route registration failed: ")?;
        for (i, err) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for RegistryError {}
