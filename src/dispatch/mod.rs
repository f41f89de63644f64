//! Dispatch subsystem: the caller side that triggers cron endpoints.
//!
//! # Data Flow
//! ```text
//! CronJob + PanelConfig
//!     → custom_headers.rs (parse free-text header block)
//!     → classify.rs (local or public target)
//!     → dispatcher.rs (direct GET | POST to relay)
//!     → slots.rs (one in-flight run per job, stale results dropped)
//! ```

pub mod abort;
pub mod classify;
pub mod custom_headers;
pub mod dispatcher;
pub mod slots;

pub use classify::{is_local_target, route_for, Route};
pub use custom_headers::{parse_custom_headers, HeaderLineError, ParsedHeaders};
pub use dispatcher::{
    DispatchError, Dispatcher, TargetRequest, BYPASS_HEADER, DEFAULT_RELAY_URL,
    DEFAULT_TARGET_TIMEOUT,
};
pub use slots::{JobRun, JobSlots, JobState, Ticket};
