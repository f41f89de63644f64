//! Header sets and relay-side header sanitization.
//!
//! # Responsibilities
//! - Case-insensitive, unique header mapping shared by caller and relay
//! - Strip headers that could break transport framing or smuggle
//!   hop-by-hop directives before the relay forwards them
//! - Convert the surviving set into an outbound `HeaderMap`
//!
//! # Design Decisions
//! - Prefix matching on the lowercased name: `proxy-authorization`,
//!   `sec-fetch-site` and `hostname-override` are all dropped
//! - Names and values otherwise pass through untouched, key case included
//! - Dropped entries are silent; the caller learns nothing about which rule
//!   fired

use std::collections::BTreeMap;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};

/// Name prefixes the relay never forwards.
pub const BLOCKED_HEADER_PREFIXES: &[&str] = &[
    "host",
    "connection",
    "content-length",
    "transfer-encoding",
    "upgrade",
    "proxy-",
    "sec-",
];

/// Longest header value (in characters) the relay forwards.
pub const MAX_HEADER_VALUE_CHARS: usize = 1000;

/// `^[A-Za-z0-9_-]+$`
pub fn is_valid_header_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// A mapping of header name to value with case-insensitive unique keys.
///
/// The most recent insert wins and its spelling of the name is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct HeaderSet {
    /// lowercased name -> (original name, value)
    entries: BTreeMap<String, (String, String)>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a header, matching existing names case-insensitively.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.entries
            .insert(name.to_ascii_lowercase(), (name, value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate `(name, value)` pairs using the names as inserted.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Build an outbound header map. Entries that are not legal HTTP header
    /// names or values are skipped.
    pub fn to_header_map(&self) -> HeaderMap {
        let mut map = HeaderMap::with_capacity(self.entries.len());
        for (name, value) in self.iter() {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    map.insert(name, value);
                }
                _ => {
                    tracing::debug!(header = %name, "Skipping header with illegal name or value");
                }
            }
        }
        map
    }
}

impl From<BTreeMap<String, String>> for HeaderSet {
    fn from(map: BTreeMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl From<HeaderSet> for BTreeMap<String, String> {
    fn from(set: HeaderSet) -> Self {
        set.entries.into_values().collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for HeaderSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = HeaderSet::new();
        for (k, v) in iter {
            set.insert(k, v);
        }
        set
    }
}

/// Return the subset of `headers` that is safe for the relay to forward.
pub fn sanitize<I, K, V>(headers: I) -> HeaderSet
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut validated = HeaderSet::new();

    for (key, value) in headers {
        let (key, value) = (key.as_ref(), value.as_ref());
        let lower = key.to_ascii_lowercase();

        if BLOCKED_HEADER_PREFIXES.iter().any(|p| lower.starts_with(p)) {
            continue;
        }
        if !is_valid_header_name(key) {
            continue;
        }
        if value.chars().count() > MAX_HEADER_VALUE_CHARS {
            continue;
        }

        validated.insert(key, value);
    }

    validated
}
