//! Relay subsystem: the server-side endpoint that calls public preview hosts
//! on the caller's behalf.
//!
//! # Data Flow
//! ```text
//! POST {url, headers}
//!     → handler.rs (client identity, rate limit, parse)
//!     → security::ssrf (destination check)
//!     → security::headers (sanitize)
//!     → upstream.rs (GET with a 30s deadline)
//!     → types.rs (Outcome)
//! ```

pub mod handler;
pub mod types;
pub mod upstream;

pub use handler::{relay_handler, RelayError, RelayState, UPSTREAM_TIMEOUT};
pub use types::{Outcome, RelayRequest, MAX_MESSAGE_CHARS};
pub use upstream::{
    read_bounded_body, HttpUpstream, Upstream, UpstreamError, UpstreamResponse, MAX_BODY_BYTES,
};
