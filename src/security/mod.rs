//! Security subsystem for the relay.
//!
//! # Data Flow
//! ```text
//! Incoming relay call:
//!     → rate_limit.rs (per-client window check)
//!     → ssrf.rs (destination must be a named public http(s) host)
//!     → headers.rs (strip framing / hop-by-hop / malformed headers)
//!     → Outbound request
//! ```
//!
//! # Design Decisions
//! - Defense in depth: the caller filters headers too, the relay filters again
//! - Fail closed: reject on any check failure
//! - Rejections never say which rule matched

pub mod headers;
pub mod rate_limit;
pub mod ssrf;

pub use headers::{sanitize, HeaderSet};
pub use rate_limit::{ClientRateLimiter, InMemoryRateLimiter};
pub use ssrf::{check_public_target, is_allowed_public_target, BlockedTarget};
