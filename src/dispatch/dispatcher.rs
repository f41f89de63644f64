//! Caller-side dispatcher.
//!
//! # Responsibilities
//! - Build the target request: preview URL + job path, custom headers,
//!   bypass token
//! - Call local targets directly, everything else through the relay
//! - Turn every result into an `Outcome`; never return a transport error
//! - Keep one in-flight request per job slot
//!
//! # Design Decisions
//! - Non-2xx relay statuses keep their code so a 429 stays visible
//! - Raw client errors are logged, the outcome carries a fixed message

use std::time::Duration;

use thiserror::Error;
use url::Url;

use crate::config::{CronJob, PanelConfig};
use crate::dispatch::abort::{abort_pair, AbortSignal};
use crate::dispatch::classify::{route_for, Route};
use crate::dispatch::custom_headers::{parse_custom_headers, HeaderLineError, ParsedHeaders};
use crate::dispatch::slots::{JobRun, JobSlots};
use crate::http::response::{timeout_message, UPSTREAM_FAILED_MESSAGE};
use crate::relay::types::is_success_status;
use crate::relay::{
    read_bounded_body, Outcome, RelayRequest, MAX_BODY_BYTES, UPSTREAM_TIMEOUT,
};
use crate::security::HeaderSet;

/// Header carrying the deployment-protection bypass secret.
pub const BYPASS_HEADER: &str = "x-vercel-protection-bypass";

pub const DEFAULT_RELAY_URL: &str = "http://localhost:3000/api/trigger-cron";

/// Default deadline for a direct target call.
pub const DEFAULT_TARGET_TIMEOUT: Duration = Duration::from_secs(30);

/// Slack on top of the relay's own deadline, so the relay answers first.
const RELAY_GRACE: Duration = Duration::from_secs(5);

pub const INVALID_RESPONSE_MESSAGE: &str = "Invalid response format from API";

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("invalid relay URL {url}: {source}")]
    RelayUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Invalid target URL: {0}")]
    InvalidTarget(String),
}

/// One prepared call to a job endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetRequest {
    pub url: String,
    pub headers: HeaderSet,
    pub timeout: Duration,
    pub route: Route,
}

enum RelayReply {
    Outcome(Outcome),
    Status(u16),
    Malformed,
}

pub struct Dispatcher {
    client: reqwest::Client,
    panel: PanelConfig,
    custom: ParsedHeaders,
    relay_url: Url,
    timeout: Duration,
    slots: JobSlots,
}

impl Dispatcher {
    pub fn new(panel: PanelConfig, relay_url: &str) -> Result<Self, DispatchError> {
        let relay_url = Url::parse(relay_url).map_err(|source| DispatchError::RelayUrl {
            url: relay_url.to_string(),
            source,
        })?;

        // Local targets must not leave through a system proxy.
        let client = reqwest::Client::builder()
            .no_proxy()
            .user_agent(concat!("preview-cron/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(DispatchError::Client)?;

        let custom = parse_custom_headers(panel.custom_headers.as_deref().unwrap_or_default());
        for rejected in &custom.rejected {
            tracing::warn!(error = %rejected, "Ignoring custom header line");
        }

        Ok(Self {
            client,
            panel,
            custom,
            relay_url,
            timeout: DEFAULT_TARGET_TIMEOUT,
            slots: JobSlots::new(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn rejected_headers(&self) -> &[HeaderLineError] {
        &self.custom.rejected
    }

    pub fn slots(&self) -> &JobSlots {
        &self.slots
    }

    pub fn prepare(&self, path: &str) -> Result<TargetRequest, DispatchError> {
        let url = format!("{}{}", self.panel.preview_url, path);
        match Url::parse(&url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => return Err(DispatchError::InvalidTarget(url)),
        }

        let mut headers = self.custom.headers.clone();
        if let Some(token) = self
            .panel
            .deploy_protection_token
            .as_deref()
            .filter(|t| !t.is_empty())
        {
            headers.insert(BYPASS_HEADER, token);
        }

        Ok(TargetRequest {
            route: route_for(&url),
            url,
            headers,
            timeout: self.timeout,
        })
    }

    /// Run `path` outside of any job slot.
    pub async fn dispatch(&self, path: &str) -> Outcome {
        let (_handle, signal) = abort_pair();
        match self.prepare(path) {
            Ok(target) => self
                .execute(target, &signal)
                .await
                .unwrap_or_else(|| Outcome::failure(499, "Request aborted")),
            Err(e) => Self::invalid_target(e),
        }
    }

    /// Run a job in its slot, superseding any run already in flight there.
    /// `None` when this run was itself aborted or superseded.
    pub async fn run_job(&self, job: &CronJob) -> Option<JobRun> {
        let ticket = self.slots.begin(&job.id);

        let outcome = match self.prepare(&job.path) {
            Ok(target) => self.execute(target, ticket.signal()).await?,
            Err(e) => Self::invalid_target(e),
        };

        let run = self.slots.finish(&ticket, outcome);
        if run.is_none() {
            tracing::debug!(job_id = %job.id, "Discarding superseded result");
        }
        run
    }

    fn invalid_target(err: DispatchError) -> Outcome {
        tracing::warn!(error = %err, "Not dispatching");
        Outcome::failure(400, err.to_string())
    }

    async fn execute(&self, target: TargetRequest, signal: &AbortSignal) -> Option<Outcome> {
        tracing::info!(url = %target.url, route = ?target.route, "Dispatching");

        let call = async {
            match target.route {
                Route::Direct => self.call_direct(&target).await,
                Route::Relay => self.call_relay(&target).await,
            }
        };

        tokio::select! {
            _ = signal.aborted() => {
                tracing::debug!(url = %target.url, "Request aborted");
                None
            }
            outcome = call => Some(outcome),
        }
    }

    async fn call_direct(&self, target: &TargetRequest) -> Outcome {
        let request = self
            .client
            .get(&target.url)
            .headers(target.headers.to_header_map());

        let exchange = async {
            let response = request.send().await?;
            let status = response.status().as_u16();
            let body = read_bounded_body(response, MAX_BODY_BYTES)
                .await
                .unwrap_or_else(|| format!("Response received with status {status}"));
            Ok::<_, reqwest::Error>((status, body))
        };

        match tokio::time::timeout(target.timeout, exchange).await {
            Ok(Ok((status, body))) => {
                tracing::info!(url = %target.url, status, "Target responded");
                Outcome::from_response(status, &body)
            }
            Ok(Err(e)) => {
                tracing::warn!(url = %target.url, error = %e, "Direct request failed");
                Outcome::failure(502, UPSTREAM_FAILED_MESSAGE)
            }
            Err(_) => {
                tracing::warn!(url = %target.url, "Direct request timed out");
                Outcome::failure(408, timeout_message(target.timeout.as_secs()))
            }
        }
    }

    async fn call_relay(&self, target: &TargetRequest) -> Outcome {
        let body = RelayRequest {
            url: target.url.clone(),
            headers: target.headers.clone(),
        };
        let deadline = target.timeout.max(UPSTREAM_TIMEOUT) + RELAY_GRACE;

        match tokio::time::timeout(deadline, self.post_relay(&body)).await {
            Ok(Ok(RelayReply::Outcome(outcome))) => outcome,
            Ok(Ok(RelayReply::Status(status))) => {
                tracing::warn!(relay = %self.relay_url, status, "Relay rejected request");
                Outcome::failure(status, format!("API request failed: {status}"))
            }
            Ok(Ok(RelayReply::Malformed)) => {
                tracing::warn!(relay = %self.relay_url, "Relay answered with malformed body");
                Outcome::failure(502, INVALID_RESPONSE_MESSAGE)
            }
            Ok(Err(e)) => {
                tracing::warn!(relay = %self.relay_url, error = %e, "Relay request failed");
                Outcome::failure(502, UPSTREAM_FAILED_MESSAGE)
            }
            Err(_) => {
                tracing::warn!(relay = %self.relay_url, "Relay request timed out");
                Outcome::failure(408, timeout_message(deadline.as_secs()))
            }
        }
    }

    async fn post_relay(&self, body: &RelayRequest) -> Result<RelayReply, reqwest::Error> {
        let response = self
            .client
            .post(self.relay_url.clone())
            .json(body)
            .send()
            .await?;

        let status = response.status().as_u16();
        if !is_success_status(status) {
            return Ok(RelayReply::Status(status));
        }

        let bytes = response.bytes().await?;
        Ok(match serde_json::from_slice::<Outcome>(&bytes) {
            Ok(outcome) => RelayReply::Outcome(outcome),
            Err(_) => RelayReply::Malformed,
        })
    }
}
