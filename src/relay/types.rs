//! Wire types shared by the relay and its callers.

use serde::{Deserialize, Serialize};

use crate::security::HeaderSet;

/// Longest message an [`Outcome`] carries, in characters.
pub const MAX_MESSAGE_CHARS: usize = 1000;

/// Normalized result of one target request.
///
/// Serialized as `{ "success", "message", "statusCode" }`. The message is
/// truncated to [`MAX_MESSAGE_CHARS`] on construction, deserialization
/// included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawOutcome")]
pub struct Outcome {
    success: bool,
    message: String,
    status_code: u16,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawOutcome {
    success: bool,
    message: String,
    status_code: u16,
}

impl From<RawOutcome> for Outcome {
    fn from(raw: RawOutcome) -> Self {
        Outcome::new(raw.success, raw.message, raw.status_code)
    }
}

impl Outcome {
    pub fn new(success: bool, message: impl Into<String>, status_code: u16) -> Self {
        let mut message = message.into();
        if let Some((idx, _)) = message.char_indices().nth(MAX_MESSAGE_CHARS) {
            message.truncate(idx);
        }
        Self {
            success,
            message,
            status_code,
        }
    }

    /// Outcome for an upstream response: success iff the status is 2xx,
    /// message is the prefixed, truncated body.
    pub fn from_response(status_code: u16, body: &str) -> Self {
        let success = is_success_status(status_code);
        let body = truncate_chars(body, MAX_MESSAGE_CHARS);
        let message = if success {
            format!("Success: {body}")
        } else {
            format!("Error: {body}")
        };
        Self::new(success, message, status_code)
    }

    /// Non-success outcome with a fixed message.
    pub fn failure(status_code: u16, message: impl Into<String>) -> Self {
        Self::new(false, message, status_code)
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status_code(&self) -> u16 {
        self.status_code
    }
}

/// Body the caller posts to the relay endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayRequest {
    pub url: String,
    #[serde(default, skip_serializing_if = "HeaderSet::is_empty")]
    pub headers: HeaderSet,
}

pub fn is_success_status(status_code: u16) -> bool {
    (200..300).contains(&status_code)
}

/// Prefix of `s` holding at most `max` characters.
pub fn truncate_chars(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
