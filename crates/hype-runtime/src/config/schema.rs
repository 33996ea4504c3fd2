//! Configuration schema definitions.
//!
//! ```toml
//! [bot]
//! name = "hype"
//! prefix = "!"
//!
//! [dispatch]
//! handler_timeout_secs = 20
//!
//! [permissions]
//! owners = ["console:root"]
//! admins = ["alice"]
//!
//! [commands.reset]
//! permission = "owner"
//! cooldown_secs = 120
//!
//! [scheduler]
//! utc_offset_minutes = -300
//!
//! [storage]
//! engine = "file"
//! path = "data/hype.json"
//!
//! [proxy.destinations.quotes]
//! base_url = "https://quotes.example.com"
//! rate_limit = { kind = "token_bucket", capacity = 5, refill_every_ms = 1000 }
//! cache_ttl_secs = 60
//!
//! [logging]
//! level = "debug"
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::FixedOffset;
use hype_framework::{CommandOverride, DispatcherConfig};
use hype_transport::{Endpoint, RateLimitPolicy, RetryPolicy};
use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HypeConfig {
    /// Bot identity and prefixes.
    #[serde(default)]
    pub bot: BotConfig,

    /// Dispatcher behaviour and notices.
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Static role assignments.
    #[serde(default)]
    pub permissions: PermissionsConfig,

    /// Per-command overrides, keyed by canonical name.
    #[serde(default)]
    pub commands: BTreeMap<String, CommandOverride>,

    /// Job scheduling.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Key/value storage.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Outbound-call proxy.
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// =============================================================================
// Bot & dispatch
// =============================================================================

/// Bot identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Name used in logs and help output.
    #[serde(default = "default_bot_name")]
    pub name: String,

    /// Command prefix.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Command prefix in development mode.
    #[serde(default = "default_dev_prefix")]
    pub dev_prefix: String,

    /// Development mode.
    #[serde(default)]
    pub dev: bool,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_bot_name(),
            prefix: default_prefix(),
            dev_prefix: default_dev_prefix(),
            dev: false,
        }
    }
}

fn default_bot_name() -> String {
    "hype".to_string()
}

fn default_prefix() -> String {
    "!".to_string()
}

fn default_dev_prefix() -> String {
    "%".to_string()
}

/// Dispatcher settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Accept commands without prefix in private rooms.
    #[serde(default = "default_true")]
    pub private_prefix_optional: bool,

    /// Enforce cooldowns in private rooms.
    #[serde(default)]
    pub cooldown_in_private: bool,

    /// Default handler timeout in seconds.
    #[serde(default = "default_handler_timeout_secs")]
    pub handler_timeout_secs: u64,

    /// Reply to unknown commands. Unset means silence.
    #[serde(default)]
    pub unknown_notice: Option<String>,

    /// Reply when permission is denied.
    #[serde(default)]
    pub denied_notice: Option<String>,

    /// Reply when a handler fails.
    #[serde(default)]
    pub failure_notice: Option<String>,

    /// Private notice while on cooldown.
    #[serde(default)]
    pub cooldown_notice: Option<String>,

    /// Do not notify users about cooldowns at all.
    #[serde(default)]
    pub silent_cooldowns: bool,

    /// Reply listing ambiguous candidates.
    #[serde(default)]
    pub ambiguous_notice: Option<String>,

    /// Room notice when a long reply is sent privately.
    #[serde(default)]
    pub long_reply_notice: Option<String>,

    /// Seconds a room worker stays alive without messages.
    #[serde(default = "default_room_idle_secs")]
    pub room_idle_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            private_prefix_optional: true,
            cooldown_in_private: false,
            handler_timeout_secs: default_handler_timeout_secs(),
            unknown_notice: None,
            denied_notice: None,
            failure_notice: None,
            cooldown_notice: None,
            silent_cooldowns: false,
            ambiguous_notice: None,
            long_reply_notice: None,
            room_idle_secs: default_room_idle_secs(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_handler_timeout_secs() -> u64 {
    30
}

fn default_room_idle_secs() -> u64 {
    300
}

impl HypeConfig {
    /// Builds the dispatcher settings from the `bot` and `dispatch` sections.
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        let defaults = DispatcherConfig::default();
        let dispatch = &self.dispatch;
        DispatcherConfig {
            prefix: self.bot.prefix.clone(),
            dev_prefix: self.bot.dev_prefix.clone(),
            dev: self.bot.dev,
            private_prefix_optional: dispatch.private_prefix_optional,
            unknown_notice: dispatch.unknown_notice.clone(),
            denied_notice: dispatch.denied_notice.clone().unwrap_or(defaults.denied_notice),
            failure_notice: dispatch.failure_notice.clone().unwrap_or(defaults.failure_notice),
            cooldown_notice: if dispatch.silent_cooldowns {
                None
            } else {
                dispatch.cooldown_notice.clone().or(defaults.cooldown_notice)
            },
            ambiguous_notice: dispatch
                .ambiguous_notice
                .clone()
                .unwrap_or(defaults.ambiguous_notice),
            long_reply_notice: dispatch
                .long_reply_notice
                .clone()
                .unwrap_or(defaults.long_reply_notice),
            cooldown_in_private: dispatch.cooldown_in_private,
            default_timeout: Duration::from_secs(dispatch.handler_timeout_secs),
        }
    }
}

// =============================================================================
// Permissions
// =============================================================================

/// Static role assignments.
///
/// Entries are either a bare user id, matching on every backend, or
/// `channel:user_id`, matching on one backend only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PermissionsConfig {
    /// Users with the owner role.
    #[serde(default)]
    pub owners: Vec<String>,

    /// Users with the admin role.
    #[serde(default)]
    pub admins: Vec<String>,

    /// Users with the trusted role.
    #[serde(default)]
    pub trusted: Vec<String>,
}

// =============================================================================
// Scheduler
// =============================================================================

/// Scheduler settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// UTC offset, in minutes, used by daily triggers.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl SchedulerConfig {
    /// Offset for daily triggers. `None` if out of range.
    pub fn offset(&self) -> Option<FixedOffset> {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
    }
}

// =============================================================================
// Storage
// =============================================================================

/// Storage engine selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageEngine {
    /// Volatile in-memory tables.
    #[default]
    Memory,
    /// A JSON file, rewritten on every change.
    File,
}

/// Storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Engine.
    #[serde(default)]
    pub engine: StorageEngine,

    /// Data file for the `file` engine.
    #[serde(default = "default_storage_path")]
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            engine: StorageEngine::default(),
            path: default_storage_path(),
        }
    }
}

fn default_storage_path() -> PathBuf {
    PathBuf::from("hype-data.json")
}

// =============================================================================
// Proxy
// =============================================================================

/// Proxy settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Maximum cached responses.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Request timeout in milliseconds for destinations without their own.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Retry policy for destinations without their own.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Named destinations.
    #[serde(default)]
    pub destinations: BTreeMap<String, DestinationConfig>,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            cache_capacity: default_cache_capacity(),
            timeout_ms: default_timeout_ms(),
            retry: RetryConfig::default(),
            destinations: BTreeMap::new(),
        }
    }
}

fn default_cache_capacity() -> usize {
    1024
}

fn default_timeout_ms() -> u64 {
    10000
}

impl ProxyConfig {
    /// Endpoints for every configured destination.
    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.destinations
            .iter()
            .map(|(name, dest)| {
                let mut endpoint = Endpoint::new(name, &dest.base_url)
                    .timeout(Duration::from_millis(dest.timeout_ms.unwrap_or(self.timeout_ms)))
                    .rate_limit(dest.rate_limit.to_policy(), Duration::from_millis(dest.max_wait_ms))
                    .retry(dest.retry.as_ref().unwrap_or(&self.retry).to_policy());
                for (header, value) in &dest.headers {
                    endpoint = endpoint.header(header, value.clone());
                }
                endpoint
            })
            .collect()
    }
}

/// One external service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DestinationConfig {
    /// Base URL; request paths are appended.
    pub base_url: String,

    /// Headers sent with every request.
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    /// Request timeout in milliseconds.
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Rate limit shared by all callers.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// How long a call may wait for a rate-limit permit, in milliseconds.
    #[serde(default)]
    pub max_wait_ms: u64,

    /// Retry policy override.
    #[serde(default)]
    pub retry: Option<RetryConfig>,

    /// Suggested cache TTL in seconds, read by plugins building requests.
    #[serde(default)]
    pub cache_ttl_secs: Option<u64>,
}

/// Rate-limit policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RateLimitConfig {
    /// No limit.
    #[default]
    Unlimited,
    /// Burst of `capacity`, one token regained every `refill_every_ms`.
    TokenBucket { capacity: u32, refill_every_ms: u64 },
    /// `max_requests` per `window_secs`.
    FixedWindow { max_requests: u32, window_secs: u64 },
}

impl RateLimitConfig {
    /// Converts to the transport policy.
    pub fn to_policy(self) -> RateLimitPolicy {
        match self {
            Self::Unlimited => RateLimitPolicy::Unlimited,
            Self::TokenBucket {
                capacity,
                refill_every_ms,
            } => RateLimitPolicy::TokenBucket {
                capacity,
                refill_every: Duration::from_millis(refill_every_ms),
            },
            Self::FixedWindow {
                max_requests,
                window_secs,
            } => RateLimitPolicy::FixedWindow {
                max_requests,
                window: Duration::from_secs(window_secs),
            },
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retry attempts.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial delay between retries in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,

    /// Maximum delay between retries in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryConfig {
    /// Converts to the transport retry policy.
    pub fn to_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.backoff_multiplier,
        }
    }
}

fn default_max_retries() -> u32 {
    2
}

fn default_initial_delay_ms() -> u64 {
    200
}

fn default_max_delay_ms() -> u64 {
    5000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Lower-case name, as used in filter directives.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Converts to a `tracing` level.
    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Log line format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One short line per event.
    #[default]
    Compact,
    /// The default `tracing-subscriber` format.
    Full,
    /// Multi-line, human oriented.
    Pretty,
    /// Newline-delimited JSON (requires the `json-log` feature).
    Json,
}

/// Log destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Log file rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// Logging settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Base level, overridden by `RUST_LOG`.
    #[serde(default)]
    pub level: LogLevel,

    /// Line format.
    #[serde(default)]
    pub format: LogFormat,

    /// Destination.
    #[serde(default)]
    pub output: LogOutput,

    /// Log file for `output = "file"`.
    #[serde(default)]
    pub file_path: Option<PathBuf>,

    /// Log file rotation.
    #[serde(default)]
    pub rotation: LogRotation,

    /// Span lifecycle events.
    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line.
    #[serde(default)]
    pub file_location: bool,

    /// Per-module levels, e.g. `hype_transport = "debug"`.
    #[serde(default)]
    pub filters: BTreeMap<String, LogLevel>,
}
