//! Preview cron trigger.
//!
//! Runs the cron endpoints listed in a `vercel.json` against a preview
//! deployment, on demand.
//!
//! ```text
//!   caller (dispatch)                        relay server (http + relay)
//!  ┌──────────────────┐                     ┌───────────────────────────┐
//!  │ vercel.json jobs │  local target       │ rate limit → SSRF guard   │
//!  │  + panel config  │──────────▶ GET      │ → header sanitizer        │
//!  │                  │                     │ → GET target (30s)        │
//!  │                  │  public target      │ → Outcome                 │
//!  │                  │──── POST {url} ────▶│                           │
//!  └──────────────────┘                     └───────────────────────────┘
//! ```

pub mod config;
pub mod dispatch;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod relay;
pub mod security;

pub use config::schema::RelayConfig;
pub use dispatch::Dispatcher;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use relay::Outcome;
