//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain in-flight relay calls → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then logging/metrics, then listener
//! - In-flight relay calls are bounded by the request timeout, so draining
//!   finishes within it

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
