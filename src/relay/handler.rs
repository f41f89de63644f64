//! The relay endpoint.
//!
//! ```text
//! received → rate-checked → validated → dispatched → completed
//!                 │              │            └────→ timed-out (408)
//!                 └→ 429         └→ 400
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use http_body_util::LengthLimitError;
use serde_json::Value;
use thiserror::Error;

use crate::http::request::{client_identity, request_id};
use crate::observability::metrics;
use crate::relay::types::Outcome;
use crate::relay::upstream::{HttpUpstream, Upstream, UpstreamError};
use crate::security::{self, BlockedTarget, ClientRateLimiter, InMemoryRateLimiter};

/// Hard ceiling on the outbound call, whatever the caller asks for.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);

/// Shared state for the relay handler.
pub struct RelayState<U = HttpUpstream> {
    pub limiter: Arc<dyn ClientRateLimiter>,
    pub upstream: U,
    pub upstream_timeout: Duration,
}

impl<U: Upstream> RelayState<U> {
    /// Relay state with the in-memory limiter and the 30s deadline.
    pub fn new(upstream: U) -> Self {
        Self {
            limiter: Arc::new(InMemoryRateLimiter::new()),
            upstream,
            upstream_timeout: UPSTREAM_TIMEOUT,
        }
    }

    pub fn with_limiter(mut self, limiter: Arc<dyn ClientRateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }
}

/// Terminal failures of a relay call. Each maps to a status code and a
/// bounded, generic outcome message (see `http::response`).
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("rate limit exceeded")]
    RateLimited,

    #[error("request body could not be read")]
    Body,

    #[error("request body exceeds the configured limit")]
    TooLarge,

    #[error("request body is not valid JSON")]
    InvalidJson,

    #[error("missing or non-string url")]
    MissingUrl,

    #[error("blocked target: {0}")]
    Blocked(#[from] BlockedTarget),

    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

impl RelayError {
    /// Label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RelayError::RateLimited => "rate_limited",
            RelayError::Body | RelayError::InvalidJson | RelayError::MissingUrl => "bad_request",
            RelayError::TooLarge => "too_large",
            RelayError::Blocked(_) => "blocked",
            RelayError::Timeout(_) => "timeout",
            RelayError::Upstream(_) => "upstream_error",
        }
    }
}

/// Parsed relay request body. Header values that are not strings are dropped.
#[derive(Debug)]
struct RelayPayload {
    url: String,
    headers: Vec<(String, String)>,
}

fn parse_payload(bytes: &[u8]) -> Result<RelayPayload, RelayError> {
    let value: Value = serde_json::from_slice(bytes).map_err(|_| RelayError::InvalidJson)?;

    let url = match value.get("url") {
        Some(Value::String(url)) if !url.is_empty() => url.clone(),
        _ => return Err(RelayError::MissingUrl),
    };

    let headers = match value.get("headers") {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
            .collect(),
        _ => Vec::new(),
    };

    Ok(RelayPayload { url, headers })
}

fn exceeds_length_limit(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<LengthLimitError>() {
            return true;
        }
        current = e.source();
    }
    false
}

/// `POST` handler for the relay endpoint.
pub async fn relay_handler<U: Upstream>(
    State(state): State<Arc<RelayState<U>>>,
    request: Request<Body>,
) -> Response {
    let start = Instant::now();
    let client = client_identity(&request);
    let request_id = request_id(&request);

    match relay(&state, &client, &request_id, request).await {
        Ok(outcome) => {
            metrics::record_relay("completed", outcome.status_code(), start);
            (StatusCode::OK, Json(outcome)).into_response()
        }
        Err(err) => {
            let kind = err.kind();
            let response = err.into_response();
            metrics::record_relay(kind, response.status().as_u16(), start);
            response
        }
    }
}

async fn relay<U: Upstream>(
    state: &RelayState<U>,
    client: &str,
    request_id: &str,
    request: Request<Body>,
) -> Result<Outcome, RelayError> {
    if !state.limiter.try_acquire(client) {
        tracing::warn!(request_id, client, "Rate limit exceeded");
        metrics::record_rate_limited();
        return Err(RelayError::RateLimited);
    }

    // Bodies without Content-Length are cut off by the limit layer mid-read.
    let bytes = axum::body::to_bytes(request.into_body(), usize::MAX)
        .await
        .map_err(|e| {
            if exceeds_length_limit(&e) {
                RelayError::TooLarge
            } else {
                RelayError::Body
            }
        })?;
    let payload = parse_payload(&bytes).inspect_err(|e| {
        tracing::debug!(request_id, client, error = %e, "Rejecting relay request");
    })?;

    let target = security::check_public_target(&payload.url).map_err(|reason| {
        tracing::warn!(request_id, client, reason = %reason, "Blocked relay target");
        metrics::record_blocked_target(&reason);
        RelayError::Blocked(reason)
    })?;

    let headers = security::sanitize(payload.headers).to_header_map();
    let host = target.host_str().unwrap_or_default().to_string();

    tracing::info!(request_id, client, host = %host, headers = headers.len(), "Relaying request");

    let upstream_start = Instant::now();
    let response = tokio::time::timeout(state.upstream_timeout, state.upstream.get(target, headers))
        .await
        .map_err(|_| {
            tracing::warn!(request_id, host = %host, "Upstream request timed out");
            RelayError::Timeout(state.upstream_timeout)
        })?
        .inspect_err(|e| {
            tracing::error!(request_id, host = %host, error = %e, "Upstream request failed");
        })?;
    metrics::record_upstream_duration(upstream_start);

    let body = response
        .body
        .unwrap_or_else(|| format!("Response received with status {}", response.status));

    tracing::info!(
        request_id,
        host = %host,
        status = response.status,
        elapsed_ms = upstream_start.elapsed().as_millis() as u64,
        "Upstream responded"
    );

    Ok(Outcome::from_response(response.status, &body))
}
