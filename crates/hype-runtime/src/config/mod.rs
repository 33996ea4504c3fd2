//! Configuration for the Hype runtime.
//!
//! Layered loading through figment, a serde schema with defaults for every
//! field, and cross-field validation.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, ENV_PREFIX, Profile, load_config, load_config_from_file};
pub use schema::{
    BotConfig, DestinationConfig, DispatchConfig, HypeConfig, LogFormat, LogLevel, LogOutput,
    LogRotation, LoggingConfig, PermissionsConfig, ProxyConfig, RateLimitConfig, RetryConfig,
    SchedulerConfig, SpanEventConfig, StorageConfig, StorageEngine,
};
pub use validation::validate_config;
