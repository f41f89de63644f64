//! Destination validation for the relay (SSRF guard).
//!
//! # Responsibilities
//! - Accept only absolute `http`/`https` URLs
//! - Refuse loopback, unspecified, private and link-local destinations
//! - Refuse every IPv4 literal, public or private
//!
//! # Design Decisions
//! - Pure function of the URL string; no DNS resolution is performed
//! - Named public hosts only: IPv4 literals are blocked outright, which also
//!   closes the numeric-encoding tricks (`2130706433`, `0x7f.1`) because the
//!   URL parser normalizes them to dotted quads first
//! - The rejection reason is kept for logs and never sent back to the caller

use std::net::{Ipv4Addr, Ipv6Addr};

use thiserror::Error;
use url::{Host, Url};

/// Why a target was refused. Internal detail, logged only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockedTarget {
    #[error("not an absolute URL")]
    Unparsable,

    #[error("scheme {0:?} is not http or https")]
    Scheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("loopback or unspecified host {0}")]
    Loopback(String),

    #[error("IPv4 literal {0} (only named hosts are allowed)")]
    Ipv4Literal(String),

    #[error("private or link-local address {0}")]
    PrivateRange(String),
}

/// Returns `true` when the relay may send a request to `url`.
pub fn is_allowed_public_target(url: &str) -> bool {
    check_public_target(url).is_ok()
}

/// Validate `url` and return it parsed, or the rule that rejected it.
pub fn check_public_target(url: &str) -> Result<Url, BlockedTarget> {
    let parsed = Url::parse(url).map_err(|_| BlockedTarget::Unparsable)?;
    check_parsed(&parsed)?;
    Ok(parsed)
}

/// Same checks as [`check_public_target`] on an already parsed URL.
///
/// Used for redirect hops, where the client hands us a `Url`.
pub fn check_parsed(url: &Url) -> Result<(), BlockedTarget> {
    match url.scheme() {
        "http" | "https" => {}
        other => return Err(BlockedTarget::Scheme(other.to_string())),
    }

    let raw_host = url.host_str().ok_or(BlockedTarget::MissingHost)?;
    let hostname = raw_host.to_ascii_lowercase();
    let hostname = hostname.strip_suffix('.').unwrap_or(&hostname);

    if hostname == "localhost"
        || hostname == "0.0.0.0"
        || hostname.starts_with("127.")
        || hostname == "[::1]"
        || hostname == "[::]"
    {
        return Err(BlockedTarget::Loopback(hostname.to_string()));
    }

    if is_dotted_quad(hostname) || matches!(url.host(), Some(Host::Ipv4(_))) {
        return Err(BlockedTarget::Ipv4Literal(hostname.to_string()));
    }

    if is_private_pattern(hostname) {
        return Err(BlockedTarget::PrivateRange(hostname.to_string()));
    }

    if let Some(Host::Ipv6(addr)) = url.host() {
        if is_internal_ipv6(addr) {
            return Err(BlockedTarget::PrivateRange(hostname.to_string()));
        }
    }

    Ok(())
}

/// `^(\d{1,3}\.){3}\d{1,3}$`
fn is_dotted_quad(host: &str) -> bool {
    let octets: Vec<&str> = host.split('.').collect();
    octets.len() == 4
        && octets
            .iter()
            .all(|o| (1..=3).contains(&o.len()) && o.bytes().all(|b| b.is_ascii_digit()))
}

/// Textual private-range patterns. Redundant with the IPv4-literal rule for
/// dotted quads, kept for hosts that slip past it.
fn is_private_pattern(host: &str) -> bool {
    if host.starts_with("127.")
        || host.starts_with("10.")
        || host.starts_with("192.168.")
        || host.starts_with("169.254.")
    {
        return true;
    }

    if let Some(rest) = host.strip_prefix("172.") {
        let second: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
        if rest[second.len()..].starts_with('.') {
            if let Ok(n) = second.parse::<u8>() {
                if (16..=31).contains(&n) {
                    return true;
                }
            }
        }
    }

    let unbracketed = host.trim_start_matches('[').trim_end_matches(']');
    unbracketed == "::1" || unbracketed.starts_with("fc00:") || unbracketed.starts_with("fe80:")
}

/// Loopback, unspecified, unique-local (fc00::/7), link-local (fe80::/10)
/// and IPv4-mapped/compatible addresses.
fn is_internal_ipv6(addr: Ipv6Addr) -> bool {
    let first = addr.segments()[0];
    addr.is_loopback()
        || addr.is_unspecified()
        || (first & 0xfe00) == 0xfc00
        || (first & 0xffc0) == 0xfe80
        || addr.to_ipv4_mapped().is_some()
        || is_ipv4_compatible(addr)
}

fn is_ipv4_compatible(addr: Ipv6Addr) -> bool {
    let s = addr.segments();
    s[..6].iter().all(|&seg| seg == 0) && Ipv4Addr::from(u128::from(addr) as u32) != Ipv4Addr::UNSPECIFIED
}
