//! # Hype
//!
//! A chat-bot platform: messages arrive from chat backends, are matched
//! against the commands plugins registered, and the handlers' replies go
//! back out through the same or another backend.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌────────┐     ┌────────────┐     ┌──────────────┐
//! │   Channel   │────▶│ Router │────▶│ Dispatcher │────▶│   Handler    │──▶ Store / Proxy
//! │  (backend)  │     │ (room) │     │ (registry) │     │ (plugin fn)  │
//! └─────────────┘     └────────┘     └────────────┘     └──────┬───────┘
//!        ▲                                                      │ Reply
//!        └──────────────────────── Courier ◀────────────────────┘
//! ```
//!
//! - **Runtime**: loads config, composes plugins and runs the bot
//! - **Channels**: chat backends behind the [`Channel`](hype_core::Channel) trait
//! - **Plugins**: bundles of commands and scheduled jobs
//! - **Handlers**: async functions from a context to a reply
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hype::prelude::*;
//!
//! async fn ping(_ctx: RequestContext) -> HandlerResult {
//!     Ok(Reply::text("pong"))
//! }
//!
//! struct Basics;
//!
//! impl Plugin for Basics {
//!     fn name(&self) -> &str { "basics" }
//!
//!     fn register(&self, r: &mut Registrar) -> RegistryResult<()> {
//!         r.command(Command::new("ping", ping).alias("p"))?;
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     HypeRuntime::builder()
//!         .channel(my_backend)
//!         .plugin(Basics)
//!         .build()?
//!         .run()
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: TOML configuration files
//! - `yaml-config`: YAML configuration files
//! - `json-log`: JSON log lines
//! - `http-client` *(default)*: `reqwest` transport for the proxy

pub use hype_core as core;
pub use hype_framework as framework;
pub use hype_runtime as runtime;
pub use hype_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use hype::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use hype_runtime::{HypeConfig, HypeRuntime, RuntimeError, RuntimeResult};

    // Plugins and commands
    pub use hype_framework::{
        Audience, Command, CooldownScope, HandlerError, HandlerResult, JobContext, Plugin,
        Registrar, RegistryResult, RequestContext, Role, ScheduledJob, Trigger,
    };

    // Messages and channels
    pub use hype_core::{
        Ack, Channel, ChannelId, Content, Destination, Embed, Inbound, Inbox, Reply, Room,
        SendError, SendResult, Target, User,
    };

    // Storage
    pub use hype_core::{Store, StoreExt};

    // Outbound calls
    pub use hype_transport::{Method, ProxyError, ProxyRequest, ProxyResponse};

    // Logging macros
    pub use hype_runtime::prelude::*;
}
