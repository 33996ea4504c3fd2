//! Hype Runtime - composition root for Hype bots.
//!
//! This crate provides:
//! - Layered configuration (`hype.toml`, `HYPE_*` variables) with validation
//! - Logging setup over `tracing-subscriber`
//! - Per-room ordered routing of inbound messages
//! - Static role assignment from config
//! - [`HypeRuntime`], wiring plugins, channels, storage and the proxy together
//!   and running until Ctrl+C or SIGTERM
//!
//! ```rust,ignore
//! use hype_runtime::HypeRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     HypeRuntime::builder()
//!         .channel(ConsoleChannel::stdio())
//!         .plugin(Help)
//!         .build()?
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log lines
//! - `http-client`: the `reqwest` transport behind the proxy

pub mod config;
pub mod error;
pub mod logging;
pub mod roles;
pub mod router;
pub mod runtime;

pub use config::{ConfigError, ConfigLoader, ConfigResult, HypeConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use roles::StaticRoles;
pub use router::Router;
pub use runtime::{HypeRuntime, RuntimeBuilder, RuntimeHandle};

pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
///
/// Provides the logging macros (`trace!` .. `error!`), `span!`, `event!`,
/// the `instrument` attribute and `Level`.
pub mod prelude {
    pub use tracing::{Level, debug, error, event, info, instrument, span, trace, warn};
}
