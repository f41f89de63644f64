//! Outbound HTTP client used by the relay.
//!
//! # Responsibilities
//! - Issue the single GET the relay performs per call
//! - Re-apply the SSRF guard to every redirect hop
//! - Read at most a bounded prefix of the response body
//!
//! # Design Decisions
//! - The deadline is owned by the caller (`tokio::time::timeout`), not the
//!   client, so every `Upstream` implementation gets the same 30s ceiling
//! - A body that cannot be read is not an error: the status alone is enough
//!   to build an outcome

use std::future::Future;

use reqwest::header::HeaderMap;
use reqwest::redirect::Policy;
use thiserror::Error;
use url::Url;

use crate::relay::types::MAX_MESSAGE_CHARS;
use crate::security::ssrf;

/// Redirect hops followed before giving up.
pub const MAX_REDIRECTS: usize = 10;

/// Bytes of body read from upstream; enough for any 1000-character prefix.
pub const MAX_BODY_BYTES: usize = MAX_MESSAGE_CHARS * 4;

/// What the relay needs from an upstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamResponse {
    pub status: u16,
    /// `None` when the body could not be read.
    pub body: Option<String>,
}

/// Errors from the outbound client.
#[derive(Debug, Error)]
pub enum UpstreamError {
    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// TLS, protocol or redirect failure.
    #[error("upstream request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// No connection could be established.
    #[error("upstream unreachable: {0}")]
    Unreachable(String),
}

/// Performs the relay's outbound GET.
pub trait Upstream: Send + Sync + 'static {
    fn get(
        &self,
        url: Url,
        headers: HeaderMap,
    ) -> impl Future<Output = Result<UpstreamResponse, UpstreamError>> + Send;
}

/// `reqwest`-backed upstream.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new() -> Result<Self, UpstreamError> {
        Self::from_builder(reqwest::Client::builder())
    }

    /// Finish `builder` with the guarded redirect policy and user agent.
    pub fn from_builder(builder: reqwest::ClientBuilder) -> Result<Self, UpstreamError> {
        let client = builder
            .redirect(guarded_redirects())
            .user_agent(concat!("preview-cron/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(UpstreamError::Client)?;
        Ok(Self { client })
    }
}

impl Upstream for HttpUpstream {
    async fn get(&self, url: Url, headers: HeaderMap) -> Result<UpstreamResponse, UpstreamError> {
        let response = self
            .client
            .get(url)
            .headers(headers)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    UpstreamError::Unreachable(e.to_string())
                } else {
                    UpstreamError::Request(e)
                }
            })?;
        let status = response.status().as_u16();
        let body = read_bounded_body(response, MAX_BODY_BYTES).await;

        Ok(UpstreamResponse { status, body })
    }
}

/// Read at most `max_bytes` of the body, decoded lossily. `None` when the
/// body could not be read.
pub async fn read_bounded_body(
    mut response: reqwest::Response,
    max_bytes: usize,
) -> Option<String> {
    let status = response.status().as_u16();
    let mut buf: Vec<u8> = Vec::new();
    while buf.len() < max_bytes {
        match response.chunk().await {
            Ok(Some(chunk)) => buf.extend_from_slice(&chunk),
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(status, error = %e, "Failed to read response body");
                return None;
            }
        }
    }
    buf.truncate(max_bytes);
    Some(String::from_utf8_lossy(&buf).into_owned())
}

/// Follow redirects only while every hop passes the SSRF guard. A blocked
/// hop stops following and the 3xx response is returned as-is.
fn guarded_redirects() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        match ssrf::check_parsed(attempt.url()) {
            Ok(()) => attempt.follow(),
            Err(reason) => {
                tracing::warn!(
                    target_host = attempt.url().host_str().unwrap_or_default(),
                    reason = %reason,
                    "Refusing redirect to blocked target"
                );
                attempt.stop()
            }
        }
    })
}
