//! Health inspection.
//!
//! # Responsibilities
//! - Answer "is anything wrong?" as a list of error entries
//! - Shallow ping: only the pause switch
//! - Deep ping: also reach every configured downstream URL
//!
//! # Design Decisions
//! - The monitor and `/inspection` only know the `HealthInspector` trait
//! - Probes run sequentially, each under its own timeout

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use futures_util::future::BoxFuture;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tokio::time;

use crate::config::HealthConfig;
use crate::error::ErrorEntry;
use crate::health::status::ServerStatus;

pub trait HealthInspector: Send + Sync {
    /// Every problem found. Empty means healthy.
    fn ping(&self, deep: bool) -> BoxFuture<'_, Vec<ErrorEntry>>;
}

/// Probes downstream URLs over HTTP.
pub struct HttpProbeInspector {
    client: Client<HttpConnector, Body>,
    probe_urls: Vec<String>,
    timeout: Duration,
    status: Arc<ServerStatus>,
}

impl HttpProbeInspector {
    pub fn new(config: &HealthConfig, status: Arc<ServerStatus>) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            probe_urls: config.probe_urls.clone(),
            timeout: config.timeout(),
            status,
        }
    }

    async fn probe(&self, url: &str) -> Option<ErrorEntry> {
        let unavailable = |message: String| Some(ErrorEntry::for_field(StatusCode::SERVICE_UNAVAILABLE, url, message));

        let request = match Request::builder()
            .method("GET")
            .uri(url)
            .header("user-agent", "switchyard-health-probe")
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => return unavailable(format!("invalid probe request: {}", e)),
        };

        match time::timeout(self.timeout, self.client.request(request)).await {
            Ok(Ok(response)) if response.status().is_success() => None,
            Ok(Ok(response)) => {
                tracing::warn!(url, status = %response.status(), "Health probe failed: non-success status");
                unavailable(format!("probe returned {}", response.status()))
            }
            Ok(Err(e)) => {
                tracing::warn!(url, error = %e, "Health probe failed: connection error");
                unavailable(format!("connection error: {}", e))
            }
            Err(_) => {
                tracing::warn!(url, "Health probe failed: timeout");
                unavailable(format!("no response within {:?}", self.timeout))
            }
        }
    }
}

impl HealthInspector for HttpProbeInspector {
    fn ping(&self, deep: bool) -> BoxFuture<'_, Vec<ErrorEntry>> {
        Box::pin(async move {
            let mut errors = Vec::new();
            if self.status.is_paused() {
                errors.push(ErrorEntry::new(StatusCode::SERVICE_UNAVAILABLE, "server is paused"));
            }
            if deep {
                for url in &self.probe_urls {
                    errors.extend(self.probe(url).await);
                }
            }
            errors
        })
    }
}
