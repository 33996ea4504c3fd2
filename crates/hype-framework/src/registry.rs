//! Command registry.
//!
//! Commands are collected by a [`RegistryBuilder`] during composition, have
//! their configuration overrides applied, and are frozen into an immutable
//! [`Registry`] shared behind an `Arc`. The only state that changes
//! afterwards is each command's enabled flag.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use hype_core::{NameIndex, ResolveError, ResolveMode};
use tracing::{debug, info};

use crate::command::{Command, CommandOverride};
use crate::error::{DispatchError, RegistryError, RegistryResult};

/// A command together with its runtime switch.
#[derive(Debug)]
pub struct RegisteredCommand {
    command: Command,
    enabled: AtomicBool,
}

impl RegisteredCommand {
    /// Command definition.
    pub fn command(&self) -> &Command {
        &self.command
    }

    /// Canonical name.
    pub fn name(&self) -> &str {
        self.command.name()
    }

    /// Whether the command currently answers.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }
}

// ─── Builder ──────────────────────────────────────────────────────────────────

/// Collects commands before the registry is frozen.
#[derive(Debug, Default)]
pub struct RegistryBuilder {
    commands: Vec<Command>,
    overrides: BTreeMap<String, CommandOverride>,
}

impl RegistryBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a command. Canonical names must be unique.
    pub fn command(&mut self, command: Command) -> RegistryResult<&mut Self> {
        if self.commands.iter().any(|c| c.name == command.name) {
            return Err(RegistryError::DuplicateCommand(command.name));
        }
        self.commands.push(command);
        Ok(self)
    }

    /// Sets the per-command overrides applied at [`build`](Self::build).
    pub fn overrides<I>(&mut self, overrides: I) -> &mut Self
    where
        I: IntoIterator<Item = (String, CommandOverride)>,
    {
        self.overrides.extend(overrides);
        self
    }

    /// Number of commands added so far.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns `true` if no command was added.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Applies overrides, indexes every name and alias, and freezes.
    ///
    /// Fails on alias collisions and on overrides naming unknown commands.
    pub fn build(self) -> RegistryResult<Arc<Registry>> {
        let Self {
            mut commands,
            overrides,
        } = self;

        for (name, overrides) in &overrides {
            let command = commands
                .iter_mut()
                .find(|c| &c.name == name)
                .ok_or_else(|| RegistryError::UnknownCommand(name.clone()))?;
            command.apply(overrides);
            debug!(command = %name, "Applied configuration override");
        }

        let mut index = NameIndex::new();
        let mut entries = HashMap::with_capacity(commands.len());
        for command in commands {
            index.register(&command.name, &command.aliases)?;
            let enabled = AtomicBool::new(command.enabled);
            entries.insert(
                command.name.clone(),
                Arc::new(RegisteredCommand { command, enabled }),
            );
        }

        info!(commands = entries.len(), "Command registry frozen");
        Ok(Arc::new(Registry { index, entries }))
    }
}

// ─── Registry ─────────────────────────────────────────────────────────────────

/// Frozen set of commands.
#[derive(Debug)]
pub struct Registry {
    index: NameIndex,
    entries: HashMap<String, Arc<RegisteredCommand>>,
}

impl Registry {
    /// Resolves a typed token to an enabled command.
    ///
    /// Exact names and aliases win; otherwise unique prefixes resolve, and
    /// among several prefix matches a strictly shortest one is picked.
    /// Disabled commands are invisible, so an exact key of a disabled
    /// command still completes to an enabled longer one.
    pub fn resolve(&self, query: &str) -> Result<Arc<RegisteredCommand>, DispatchError> {
        let not_found = || DispatchError::NotFound {
            query: query.to_string(),
        };

        if let Some(entry) = self.resolve_exact(query) {
            return Ok(entry);
        }

        let candidates: Vec<&Arc<RegisteredCommand>> = self
            .index
            .candidates(query)
            .into_iter()
            .filter_map(|name| self.entries.get(name))
            .filter(|entry| entry.is_enabled())
            .collect();

        match candidates.as_slice() {
            [] => Err(not_found()),
            [only] => Ok(Arc::clone(*only)),
            [first, second, ..] if first.name().chars().count() < second.name().chars().count() => {
                Ok(Arc::clone(*first))
            }
            _ => Err(DispatchError::Ambiguous {
                query: query.to_string(),
                candidates: candidates.iter().map(|e| e.name().to_string()).collect(),
            }),
        }
    }

    /// Resolves only an exact name or alias of an enabled command.
    pub fn resolve_exact(&self, query: &str) -> Option<Arc<RegisteredCommand>> {
        if !self.index.contains(query) {
            return None;
        }
        self.index
            .resolve(query, ResolveMode::Strict)
            .ok()
            .and_then(|name| self.entries.get(name))
            .filter(|entry| entry.is_enabled())
            .cloned()
    }

    /// Resolves without auto-picking, as used by help listings.
    pub fn resolve_strict(&self, query: &str) -> Result<&str, ResolveError> {
        self.index.resolve(query, ResolveMode::Strict)
    }

    /// Looks up a command by canonical name, enabled or not.
    pub fn get(&self, name: &str) -> Option<&Arc<RegisteredCommand>> {
        self.entries.get(name)
    }

    /// Enables a command. Returns its previous state.
    pub fn enable(&self, name: &str) -> RegistryResult<bool> {
        self.set_enabled(name, true)
    }

    /// Disables a command. Its cooldown history is kept.
    pub fn disable(&self, name: &str) -> RegistryResult<bool> {
        self.set_enabled(name, false)
    }

    fn set_enabled(&self, name: &str, enabled: bool) -> RegistryResult<bool> {
        let entry = self
            .entries
            .get(name)
            .ok_or_else(|| RegistryError::UnknownCommand(name.to_string()))?;
        let previous = entry.enabled.swap(enabled, Ordering::AcqRel);
        if previous != enabled {
            info!(command = %name, enabled, "Command toggled");
        }
        Ok(previous)
    }

    /// All commands, in registration order.
    pub fn commands(&self) -> impl Iterator<Item = &Arc<RegisteredCommand>> {
        self.index.names().filter_map(|name| self.entries.get(name))
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
