//! Plugin composition.
//!
//! A [`Plugin`] contributes commands and jobs through a [`Registrar`] once,
//! while the runtime is being composed. Registration errors (duplicate
//! names, colliding aliases) abort startup.
//!
//! ```rust,ignore
//! struct Coins;
//!
//! impl Plugin for Coins {
//!     fn name(&self) -> &str { "coins" }
//!
//!     fn register(&self, r: &mut Registrar) -> RegistryResult<()> {
//!         r.command(Command::new("coins", balance).alias("c"))?;
//!         r.job(ScheduledJob::new("allowance", Trigger::daily(0, 0).unwrap(), allowance))?;
//!         Ok(())
//!     }
//! }
//! ```

use std::collections::BTreeSet;

use tracing::debug;

use crate::command::Command;
use crate::error::{RegistryError, RegistryResult};
use crate::registry::RegistryBuilder;
use crate::scheduler::ScheduledJob;

/// A bundle of commands and jobs.
pub trait Plugin: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Registers the plugin's commands and jobs.
    fn register(&self, registrar: &mut Registrar) -> RegistryResult<()>;
}

/// Collects registrations from plugins.
#[derive(Debug, Default)]
pub struct Registrar {
    commands: RegistryBuilder,
    jobs: Vec<ScheduledJob>,
    job_names: BTreeSet<String>,
}

impl Registrar {
    /// Creates an empty registrar.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a command.
    pub fn command(&mut self, command: Command) -> RegistryResult<&mut Self> {
        debug!(command = %command.name(), "Registering command");
        self.commands.command(command)?;
        Ok(self)
    }

    /// Registers a scheduled job.
    pub fn job(&mut self, job: ScheduledJob) -> RegistryResult<&mut Self> {
        if !self.job_names.insert(job.name().to_string()) {
            return Err(RegistryError::DuplicateJob(job.name().to_string()));
        }
        debug!(job = %job.name(), trigger = %job.trigger(), "Registering job");
        self.jobs.push(job);
        Ok(self)
    }

    /// Runs a plugin's registration.
    pub fn plugin(&mut self, plugin: &dyn Plugin) -> RegistryResult<&mut Self> {
        debug!(plugin = %plugin.name(), "Registering plugin");
        plugin.register(self)?;
        Ok(self)
    }

    /// Splits into the command builder and the job list.
    pub fn into_parts(self) -> (RegistryBuilder, Vec<ScheduledJob>) {
        (self.commands, self.jobs)
    }
}
