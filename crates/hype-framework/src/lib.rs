//! # Hype Framework
//!
//! Command dispatch and plugin composition for Hype bots.
//!
//! This layer provides:
//! - [`Command`] definitions with aliases, permissions, cooldowns and
//!   reply policies, frozen into a [`Registry`]
//! - the [`Dispatcher`], taking a message from parsing to delivery
//! - the [`Scheduler`] for interval, daily and one-shot jobs
//! - the [`Courier`], routing replies to chat backends
//! - [`Plugin`] / [`Registrar`] for bundling commands and jobs
//!
//! Handlers are plain async functions over a [`RequestContext`]:
//!
//! ```rust,ignore
//! async fn ping(_ctx: RequestContext) -> HandlerResult {
//!     Ok(Reply::text("pong"))
//! }
//!
//! registrar.command(Command::new("ping", ping).alias("p"))?;
//! ```

pub mod command;
pub mod context;
pub mod cooldown;
pub mod delivery;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod plugin;
pub mod registry;
pub mod roles;
pub mod scheduler;

pub use command::{
    Audience, Command, CommandOverride, Cooldown, CooldownScope, Invocation, parse_invocation,
    shell_split,
};
pub use context::{RequestContext, Services, SharedClock};
pub use cooldown::{CooldownPermit, CooldownTracker};
pub use delivery::{Courier, Origin};
pub use dispatcher::{Dispatcher, DispatcherConfig, Outcome};
pub use error::{
    DispatchError, HandlerError, HandlerResult, RegistryError, RegistryResult, SchedulerError,
};
pub use handler::{BoxedHandler, BoxedJobHandler, Handler, JobHandler};
pub use plugin::{Plugin, Registrar};
pub use registry::{RegisteredCommand, Registry, RegistryBuilder};
pub use roles::{EveryoneRoles, Role, RoleResolver};
pub use scheduler::{
    JobContext, JobInfo, JobStatus, ScheduledJob, Scheduler, SchedulerHandle, Trigger,
    next_occurrence,
};
