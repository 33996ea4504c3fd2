//! Roles assigned in the `permissions` config section.

use std::collections::HashMap;

use hype_core::{ChannelId, User};
use hype_framework::{Role, RoleResolver};

use crate::config::PermissionsConfig;

/// Resolves roles from a fixed table.
///
/// An entry `channel:user` applies to one backend and wins over a bare
/// `user` entry, which applies to all of them.
#[derive(Debug, Clone, Default)]
pub struct StaticRoles {
    scoped: HashMap<(String, String), Role>,
    global: HashMap<String, Role>,
}

impl StaticRoles {
    /// Creates an empty table; everyone is [`Role::Everyone`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the table from config.
    pub fn from_config(config: &PermissionsConfig) -> Self {
        let mut roles = Self::new();
        for (role, users) in [
            (Role::Trusted, &config.trusted),
            (Role::Admin, &config.admins),
            (Role::Owner, &config.owners),
        ] {
            for user in users {
                roles.grant(user, role);
            }
        }
        roles
    }

    /// Grants `role` to `entry` (`user` or `channel:user`), keeping the
    /// higher role if one is already assigned.
    pub fn grant(&mut self, entry: &str, role: Role) -> &mut Self {
        let slot = match entry.split_once(':') {
            Some((channel, user)) => self
                .scoped
                .entry((channel.to_string(), user.to_string()))
                .or_default(),
            None => self.global.entry(entry.to_string()).or_default(),
        };
        *slot = (*slot).max(role);
        self
    }
}

impl RoleResolver for StaticRoles {
    fn role_of(&self, channel: &ChannelId, user: &User) -> Role {
        self.scoped
            .get(&(channel.as_str().to_string(), user.id.clone()))
            .or_else(|| self.global.get(&user.id))
            .copied()
            .unwrap_or_default()
    }
}
