//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Relay and caller produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through every relay log line
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
