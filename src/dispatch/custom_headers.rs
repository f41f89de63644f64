//! Parsing of the free-text custom header block.
//!
//! One `Name: value` per line. This is the caller's own filter; the relay
//! runs its stricter sanitizer again on whatever gets forwarded.

use thiserror::Error;

use crate::security::headers::{is_valid_header_name, HeaderSet};

/// Name prefixes the caller refuses to send.
pub const CALLER_BLOCKED_PREFIXES: &[&str] = &["host", "connection", "content-length"];

/// Why a custom header line was discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderLineError {
    #[error("line {line}: expected `Name: value`")]
    MissingColon { line: usize },

    #[error("line {line}: empty header name")]
    EmptyName { line: usize },

    #[error("line {line}: empty value for {name}")]
    EmptyValue { line: usize, name: String },

    #[error("line {line}: invalid header name {name:?}")]
    InvalidName { line: usize, name: String },

    #[error("line {line}: header {name} is not allowed")]
    Blocked { line: usize, name: String },
}

/// Accepted headers plus the lines that were dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedHeaders {
    pub headers: HeaderSet,
    pub rejected: Vec<HeaderLineError>,
}

/// Parse a custom header block. Blank lines are skipped; bad lines are
/// reported in `rejected` and never abort parsing.
pub fn parse_custom_headers(text: &str) -> ParsedHeaders {
    let mut parsed = ParsedHeaders::default();

    for (idx, raw) in text.lines().enumerate() {
        let line = idx + 1;
        if raw.trim().is_empty() {
            continue;
        }
        match parse_line(line, raw) {
            Ok((name, value)) => parsed.headers.insert(name, value),
            Err(e) => parsed.rejected.push(e),
        }
    }

    parsed
}

fn parse_line(line: usize, raw: &str) -> Result<(String, String), HeaderLineError> {
    let (name, value) = raw
        .split_once(':')
        .ok_or(HeaderLineError::MissingColon { line })?;
    let (name, value) = (name.trim(), value.trim());

    if name.is_empty() {
        return Err(HeaderLineError::EmptyName { line });
    }
    if value.is_empty() {
        return Err(HeaderLineError::EmptyValue {
            line,
            name: name.to_string(),
        });
    }
    if !is_valid_header_name(name) {
        return Err(HeaderLineError::InvalidName {
            line,
            name: name.to_string(),
        });
    }

    let lower = name.to_ascii_lowercase();
    if CALLER_BLOCKED_PREFIXES.iter().any(|p| lower.starts_with(p)) {
        return Err(HeaderLineError::Blocked {
            line,
            name: name.to_string(),
        });
    }

    Ok((name.to_string(), value.to_string()))
}
