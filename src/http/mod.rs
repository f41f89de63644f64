//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (request ID, client identity)
//!     → relay::handler (rate limit, guard, outbound call)
//!     → response.rs (errors → status + Outcome body)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{client_identity, X_REQUEST_ID};
pub use server::HttpServer;
