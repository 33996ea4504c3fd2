//! Permission levels.

use std::fmt;

use hype_core::{ChannelId, User};
use serde::{Deserialize, Serialize};

/// Permission level of a user, ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Anyone who can talk to the bot.
    #[default]
    Everyone,
    /// Known regulars.
    Trusted,
    /// Bot administrators.
    Admin,
    /// Bot owners.
    Owner,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Everyone => "everyone",
            Self::Trusted => "trusted",
            Self::Admin => "admin",
            Self::Owner => "owner",
        })
    }
}

/// Determines the role of an invoking user.
pub trait RoleResolver: Send + Sync {
    /// Role of `user` on the given backend.
    fn role_of(&self, channel: &ChannelId, user: &User) -> Role;
}

/// Grants [`Role::Everyone`] to every user.
#[derive(Debug, Clone, Copy, Default)]
pub struct EveryoneRoles;

impl RoleResolver for EveryoneRoles {
    fn role_of(&self, _channel: &ChannelId, _user: &User) -> Role {
        Role::Everyone
    }
}

impl<F> RoleResolver for F
where
    F: Fn(&ChannelId, &User) -> Role + Send + Sync,
{
    fn role_of(&self, channel: &ChannelId, user: &User) -> Role {
        self(channel, user)
    }
}
