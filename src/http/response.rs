//! Relay error responses.
//!
//! # Responsibilities
//! - Map relay failures to HTTP status codes
//! - Render every failure as an `Outcome` body so callers parse one shape
//!
//! # Design Decisions
//! - Messages are fixed strings: no upstream error text, no hint of which
//!   guard rule matched
//! - 429 is distinct from 400 so callers can tell "later" from "wrong"

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

use crate::relay::{Outcome, RelayError};

pub const RATE_LIMITED_MESSAGE: &str = "Rate limit exceeded. Please try again later.";
pub const MISSING_URL_MESSAGE: &str = "URL is required";
pub const INVALID_JSON_MESSAGE: &str = "Invalid JSON body";
pub const INVALID_BODY_MESSAGE: &str = "Invalid request body";
pub const BODY_TOO_LARGE_MESSAGE: &str = "Request body too large";
pub const BLOCKED_URL_MESSAGE: &str =
    "Invalid or blocked URL. Only public HTTP/HTTPS URLs are allowed.";
pub const UPSTREAM_FAILED_MESSAGE: &str = "Failed to trigger cron job";

impl RelayError {
    pub fn status(&self) -> StatusCode {
        match self {
            RelayError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            RelayError::Body
            | RelayError::InvalidJson
            | RelayError::MissingUrl
            | RelayError::Blocked(_) => StatusCode::BAD_REQUEST,
            RelayError::TooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            RelayError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
            RelayError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The outcome reported to the caller.
    pub fn outcome(&self) -> Outcome {
        let message = match self {
            RelayError::RateLimited => RATE_LIMITED_MESSAGE.to_string(),
            RelayError::Body => INVALID_BODY_MESSAGE.to_string(),
            RelayError::TooLarge => BODY_TOO_LARGE_MESSAGE.to_string(),
            RelayError::InvalidJson => INVALID_JSON_MESSAGE.to_string(),
            RelayError::MissingUrl => MISSING_URL_MESSAGE.to_string(),
            RelayError::Blocked(_) => BLOCKED_URL_MESSAGE.to_string(),
            RelayError::Timeout(limit) => timeout_message(limit.as_secs()),
            RelayError::Upstream(_) => UPSTREAM_FAILED_MESSAGE.to_string(),
        };
        Outcome::failure(self.status().as_u16(), message)
    }
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.outcome())).into_response()
    }
}

pub fn timeout_message(secs: u64) -> String {
    format!("Request timeout ({secs}s)")
}
