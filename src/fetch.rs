//! # Content Fetching Through Proxies
//!
//! The upstream tide, weather and sea-state pages are reached through one of a
//! small list of public pass-through proxies. Proxies come and go, so each refresh
//! cycle first probes them in order and keeps the first that answers a known-good
//! request.
//!
//! ## Proxy Styles
//! - **Prefix**: the target URL is percent-encoded and appended to the proxy base;
//!   the response body is the upstream body
//! - **JsonEnvelope**: same request shape, but the upstream body comes back wrapped
//!   as `{"contents": "..."}`
//!
//! ## Retry Policy
//! Probing is bounded by [`ProbePolicy`]: at most `max_attempts` proxies are tried,
//! each under its own timeout. Running out of proxies is reported as
//! [`FetchError::NoSourceAvailable`] and the cycle ends without touching cached
//! values.
//!
//! The raw transport sits behind [`ContentFetcher`] so the whole pipeline can be
//! exercised against canned responses.

use crate::config::SourceConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur while fetching upstream content.
#[derive(Error, Debug)]
pub enum FetchError {
    /// HTTP request failed (network, TLS, or protocol error)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// JSON-envelope proxy returned something other than `{"contents": ...}`
    #[error("bad proxy envelope: {0}")]
    Envelope(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("no data source available after {attempts} proxy attempts")]
    NoSourceAvailable { attempts: usize },
}

/// Returns the raw body of `url` as text.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;
}

/// Production transport backed by `reqwest`.
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("sail-check/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(HttpFetcher { client })
    }
}

#[async_trait]
impl ContentFetcher for HttpFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(resp.text().await?)
    }
}

/// How a proxy expects to be called and how it returns the body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyStyle {
    Prefix,
    JsonEnvelope,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    pub base: String,
    pub style: ProxyStyle,
}

#[derive(Deserialize)]
struct Envelope {
    contents: Option<String>,
}

impl ProxyEndpoint {
    pub fn new(base: impl Into<String>, style: ProxyStyle) -> Self {
        ProxyEndpoint {
            base: base.into(),
            style,
        }
    }

    pub fn wrap_url(&self, target: &str) -> String {
        format!("{}{}", self.base, urlencoding::encode(target))
    }

    pub fn unwrap_body(&self, body: String) -> Result<String, FetchError> {
        match self.style {
            ProxyStyle::Prefix => Ok(body),
            ProxyStyle::JsonEnvelope => {
                let envelope: Envelope = serde_json::from_str(&body)
                    .map_err(|e| FetchError::Envelope(e.to_string()))?;
                envelope
                    .contents
                    .ok_or_else(|| FetchError::Envelope("missing contents".to_string()))
            }
        }
    }
}

/// Bounds on proxy probing and on every fetch made through the chosen proxy.
#[derive(Clone, Copy, Debug)]
pub struct ProbePolicy {
    pub attempt_timeout: Duration,
    pub max_attempts: usize,
}

impl ProbePolicy {
    pub fn from_sources(sources: &SourceConfig) -> Self {
        ProbePolicy {
            attempt_timeout: Duration::from_secs(sources.attempt_timeout_secs),
            max_attempts: sources.max_proxy_attempts,
        }
    }
}

/// A transport bound to one working proxy.
#[derive(Clone)]
pub struct ProxyChannel {
    transport: Arc<dyn ContentFetcher>,
    endpoint: ProxyEndpoint,
    timeout: Duration,
}

impl ProxyChannel {
    pub fn new(
        transport: Arc<dyn ContentFetcher>,
        endpoint: ProxyEndpoint,
        timeout: Duration,
    ) -> Self {
        ProxyChannel {
            transport,
            endpoint,
            timeout,
        }
    }

    pub fn endpoint(&self) -> &ProxyEndpoint {
        &self.endpoint
    }
}

#[async_trait]
impl ContentFetcher for ProxyChannel {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let wrapped = self.endpoint.wrap_url(url);
        debug!(url, proxy = %self.endpoint.base, "fetching");
        let body = tokio::time::timeout(self.timeout, self.transport.fetch_text(&wrapped))
            .await
            .map_err(|_| FetchError::Timeout(self.timeout))??;
        self.endpoint.unwrap_body(body)
    }
}

/// Probe `proxies` in order and return a channel through the first one that
/// successfully fetches `probe_url`.
pub async fn acquire_channel(
    transport: Arc<dyn ContentFetcher>,
    proxies: &[ProxyEndpoint],
    probe_url: &str,
    policy: &ProbePolicy,
) -> Result<ProxyChannel, FetchError> {
    let mut attempts = 0;

    for endpoint in proxies.iter().take(policy.max_attempts) {
        attempts += 1;
        let channel =
            ProxyChannel::new(transport.clone(), endpoint.clone(), policy.attempt_timeout);
        match channel.fetch_text(probe_url).await {
            Ok(_) => {
                info!(proxy = %endpoint.base, "using proxy");
                return Ok(channel);
            }
            Err(e) => {
                debug!(proxy = %endpoint.base, error = %e, "proxy probe failed");
            }
        }
    }

    warn!(attempts, "no working proxy found");
    Err(FetchError::NoSourceAvailable { attempts })
}
