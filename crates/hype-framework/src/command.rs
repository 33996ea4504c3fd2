//! Command definitions and message parsing.
//!
//! A [`Command`] couples a canonical name and its aliases with the policy the
//! dispatcher enforces (permission, cooldown, audience, reply size, timeout)
//! and the handler that runs it.
//!
//! ```rust,ignore
//! let reset = Command::new("reset", reset_handler)
//!     .alias("r")
//!     .describe("Resets the daily leaderboard")
//!     .permission(Role::Admin)
//!     .cooldown(Duration::from_secs(60), CooldownScope::User);
//! ```

use std::fmt;
use std::time::Duration;

use hype_core::Room;
use serde::{Deserialize, Serialize};

use crate::handler::{BoxedHandler, Handler};
use crate::roles::Role;

// ─── Policy types ─────────────────────────────────────────────────────────────

/// Which invocations share a cooldown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CooldownScope {
    /// Each user has their own cooldown, per room.
    #[default]
    User,
    /// Everyone in a room shares one cooldown.
    Room,
    /// One cooldown across all rooms and backends.
    Global,
}

/// Minimum interval between two runs of a command within a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cooldown {
    /// Minimum interval.
    pub duration: Duration,
    /// Sharing scope.
    pub scope: CooldownScope,
    /// Only charge the cooldown when the handler produced a reply.
    pub charge_on_reply_only: bool,
}

impl Cooldown {
    /// Creates a cooldown charged on every successful run.
    pub fn new(duration: Duration, scope: CooldownScope) -> Self {
        Self {
            duration,
            scope,
            charge_on_reply_only: false,
        }
    }
}

/// Rooms a command answers in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    /// Public and private rooms.
    #[default]
    Any,
    /// Shared rooms only.
    Public,
    /// Direct conversations only.
    Private,
}

impl Audience {
    /// Whether a message from `room` may trigger the command.
    pub fn admits(&self, room: &Room) -> bool {
        match self {
            Self::Any => true,
            Self::Public => !room.is_private(),
            Self::Private => room.is_private(),
        }
    }
}

// ─── Command ──────────────────────────────────────────────────────────────────

/// A registered chat command.
#[derive(Clone)]
pub struct Command {
    pub(crate) name: String,
    pub(crate) aliases: Vec<String>,
    pub(crate) description: String,
    pub(crate) usage: Option<String>,
    pub(crate) permission: Role,
    pub(crate) cooldown: Option<Cooldown>,
    pub(crate) audience: Audience,
    pub(crate) max_public_lines: Option<usize>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) enabled: bool,
    pub(crate) handler: BoxedHandler,
}

impl Command {
    /// Creates a command open to everyone, without cooldown.
    pub fn new(name: impl Into<String>, handler: impl Handler) -> Self {
        Self {
            name: name.into(),
            aliases: Vec::new(),
            description: String::new(),
            usage: None,
            permission: Role::Everyone,
            cooldown: None,
            audience: Audience::Any,
            max_public_lines: None,
            timeout: None,
            enabled: true,
            handler: std::sync::Arc::new(handler),
        }
    }

    /// Adds an alias.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }

    /// Adds several aliases.
    pub fn aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases.extend(aliases.into_iter().map(Into::into));
        self
    }

    /// Sets the help text.
    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the argument synopsis shown in help, e.g. `"<symbol>"`.
    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    /// Sets the minimum role.
    pub fn permission(mut self, role: Role) -> Self {
        self.permission = role;
        self
    }

    /// Sets a cooldown charged on every successful run.
    pub fn cooldown(mut self, duration: Duration, scope: CooldownScope) -> Self {
        self.cooldown = Some(Cooldown::new(duration, scope));
        self
    }

    /// Sets a cooldown charged only when the handler replies.
    pub fn cooldown_on_reply(mut self, duration: Duration, scope: CooldownScope) -> Self {
        self.cooldown = Some(Cooldown {
            charge_on_reply_only: true,
            ..Cooldown::new(duration, scope)
        });
        self
    }

    /// Restricts the rooms the command answers in.
    pub fn audience(mut self, audience: Audience) -> Self {
        self.audience = audience;
        self
    }

    /// Re-routes public replies longer than `lines` to the invoker.
    pub fn max_public_lines(mut self, lines: usize) -> Self {
        self.max_public_lines = Some(lines);
        self
    }

    /// Abandons the handler after `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Registers the command disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Canonical name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Aliases.
    pub fn alias_list(&self) -> &[String] {
        &self.aliases
    }

    /// Help text.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Argument synopsis.
    pub fn usage_text(&self) -> Option<&str> {
        self.usage.as_deref()
    }

    /// Minimum role.
    pub fn required_role(&self) -> Role {
        self.permission
    }

    /// Cooldown policy.
    pub fn cooldown_policy(&self) -> Option<Cooldown> {
        self.cooldown
    }

    /// Rooms the command answers in.
    pub fn audience_policy(&self) -> Audience {
        self.audience
    }

    /// Public reply size limit.
    pub fn public_line_limit(&self) -> Option<usize> {
        self.max_public_lines
    }

    /// Handler timeout.
    pub fn handler_timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Applies a configuration override.
    pub fn apply(&mut self, overrides: &CommandOverride) {
        if let Some(enabled) = overrides.enabled {
            self.enabled = enabled;
        }
        if let Some(role) = overrides.permission {
            self.permission = role;
        }
        self.aliases.extend(overrides.aliases.iter().cloned());
        match overrides.cooldown_secs {
            Some(0) => self.cooldown = None,
            Some(secs) => {
                let base = self.cooldown.unwrap_or(Cooldown::new(Duration::ZERO, CooldownScope::User));
                self.cooldown = Some(Cooldown {
                    duration: Duration::from_secs(secs),
                    ..base
                });
            }
            None => {}
        }
        if let (Some(scope), Some(cooldown)) = (overrides.cooldown_scope, self.cooldown.as_mut()) {
            cooldown.scope = scope;
        }
        if let Some(limit) = overrides.max_public_lines {
            self.max_public_lines = Some(limit);
        }
        if let Some(secs) = overrides.timeout_secs {
            self.timeout = Some(Duration::from_secs(secs));
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Command")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .field("permission", &self.permission)
            .field("cooldown", &self.cooldown)
            .field("audience", &self.audience)
            .finish_non_exhaustive()
    }
}

/// Per-command settings read from configuration, applied at registration.
///
/// ```toml
/// [commands.reset]
/// permission = "owner"
/// cooldown_secs = 120
/// aliases = ["wipe"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandOverride {
    /// Enables or disables the command.
    pub enabled: Option<bool>,
    /// Replaces the minimum role.
    pub permission: Option<Role>,
    /// Extra aliases.
    pub aliases: Vec<String>,
    /// Replaces the cooldown duration; `0` removes the cooldown.
    pub cooldown_secs: Option<u64>,
    /// Replaces the cooldown scope.
    pub cooldown_scope: Option<CooldownScope>,
    /// Replaces the public line limit.
    pub max_public_lines: Option<usize>,
    /// Replaces the handler timeout.
    pub timeout_secs: Option<u64>,
}

// ─── Parsing ──────────────────────────────────────────────────────────────────

/// A message recognised as a command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Command token as typed (without prefix).
    pub name: String,
    /// Argument tokens.
    pub args: Vec<String>,
    /// Raw text after the command token, trimmed.
    pub arg_text: String,
}

/// Parses `text` as a command invocation.
///
/// The prefix is mandatory unless `prefix_optional` is set (used for private
/// rooms). Returns `None` for non-commands.
pub fn parse_invocation(text: &str, prefix: &str, prefix_optional: bool) -> Option<Invocation> {
    let text = text.trim();
    let body = match text.strip_prefix(prefix) {
        Some(body) if !prefix.is_empty() => body,
        _ if prefix.is_empty() || prefix_optional => text,
        _ => return None,
    };
    if body.starts_with(char::is_whitespace) {
        return None;
    }

    let (name, rest) = match body.find(char::is_whitespace) {
        Some(at) => (&body[..at], body[at..].trim()),
        None => (body, ""),
    };
    if name.is_empty() {
        return None;
    }
    Some(Invocation {
        name: name.to_string(),
        args: shell_split(rest),
        arg_text: rest.to_string(),
    })
}

/// Shell-like argument splitting.
///
/// Handles whitespace separation, single and double quotes, and backslash
/// escapes inside double quotes. An unterminated quote runs to the end.
pub fn shell_split(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut escape_next = false;

    for ch in input.chars() {
        if escape_next {
            current.push(ch);
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if in_double_quote => {
                escape_next = true;
            }
            '\'' if !in_double_quote => {
                in_single_quote = !in_single_quote;
                in_token = true;
            }
            '"' if !in_single_quote => {
                in_double_quote = !in_double_quote;
                in_token = true;
            }
            c if c.is_whitespace() && !in_single_quote && !in_double_quote => {
                if in_token {
                    args.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            _ => {
                current.push(ch);
                in_token = true;
            }
        }
    }

    if in_token {
        args.push(current);
    }

    args
}
