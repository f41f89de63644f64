//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! Relay server:
//!     preview-cron.toml
//!         → loader.rs (parse & deserialize)
//!         → validation.rs (semantic checks)
//!         → RelayConfig (validated, immutable)
//!
//! Caller:
//!     vercel.json + CLI flags
//!         → panel.rs (cron list, preview URL, token, custom headers)
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod panel;
pub mod schema;
pub mod validation;

pub use loader::{load_config, ConfigError};
pub use panel::{load_vercel_json, parse_vercel_json, CronJob, PanelConfig, PanelError};
pub use schema::{ListenerConfig, ObservabilityConfig, RelayConfig, RelayEndpointConfig, TimeoutConfig};
