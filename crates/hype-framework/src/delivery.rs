//! Outbound delivery.
//!
//! The [`Courier`] owns the table of started backends and turns each
//! [`Outbound`] of a [`Reply`] into a concrete [`Destination`] before handing
//! it to the backend that owns it. Messages are sent in reply order; a failed
//! send is logged and does not stop the remaining messages.
//!
//! | Target                  | With an origin                     | Without (jobs) |
//! |-------------------------|------------------------------------|----------------|
//! | `Origin`                | origin room                        | skipped        |
//! | `Invoker`               | direct message, origin backend     | skipped        |
//! | `User(u)`               | direct message to `u`, same backend| skipped        |
//! | `Destination(d)`        | `d`                                | `d`            |

use std::collections::HashMap;
use std::sync::Arc;

use hype_core::{
    Ack, BoxedChannel, ChannelId, Content, Destination, Reply, Room, SendError, SendResult,
    Target, User,
};
use parking_lot::RwLock;
use tracing::{debug, warn};

/// Where a reply originates: the room and user of the triggering message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Origin {
    /// Room the command was sent in.
    pub room: Room,
    /// Invoking user.
    pub user: User,
}

impl Origin {
    /// Creates an origin.
    pub fn new(room: Room, user: User) -> Self {
        Self { room, user }
    }

    /// Resolves a target relative to this origin.
    pub fn resolve(&self, target: &Target) -> Destination {
        match target {
            Target::Origin => Destination::Room(self.room.clone()),
            Target::Invoker => Destination::User {
                channel: self.room.channel.clone(),
                user: self.user.clone(),
            },
            Target::User(user) => Destination::User {
                channel: self.room.channel.clone(),
                user: user.clone(),
            },
            Target::Destination(destination) => destination.clone(),
        }
    }
}

/// Routes outbound messages to registered backends.
#[derive(Clone, Default)]
pub struct Courier {
    channels: Arc<RwLock<HashMap<ChannelId, BoxedChannel>>>,
}

impl Courier {
    /// Creates an empty courier.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a backend under its own id, replacing any previous one.
    pub fn register(&self, channel: BoxedChannel) {
        let id = channel.id();
        debug!(channel = %id, "Registered channel");
        self.channels.write().insert(id, channel);
    }

    /// Looks up a backend.
    pub fn channel(&self, id: &ChannelId) -> Option<BoxedChannel> {
        self.channels.read().get(id).cloned()
    }

    /// All registered backends.
    pub fn channels(&self) -> Vec<BoxedChannel> {
        self.channels.read().values().cloned().collect()
    }

    /// Sends one piece of content.
    pub async fn send(&self, to: &Destination, content: &Content) -> SendResult<Ack> {
        let channel = self
            .channel(to.channel())
            .ok_or_else(|| SendError::UnknownChannel(to.channel().clone()))?;
        channel.send(to, content).await
    }

    /// Delivers every message of a reply, in order.
    ///
    /// Returns the number of messages that were sent successfully.
    pub async fn deliver(&self, origin: Option<&Origin>, reply: Reply) -> usize {
        let mut delivered = 0;
        for outbound in reply {
            let destination = match (origin, &outbound.target) {
                (_, Target::Destination(destination)) => destination.clone(),
                (Some(origin), target) => origin.resolve(target),
                (None, target) => {
                    warn!(target = ?target, "Dropping message without an origin to resolve against");
                    continue;
                }
            };
            match self.send(&destination, &outbound.content).await {
                Ok(_) => delivered += 1,
                Err(e) => warn!(destination = %destination, error = %e, "Failed to deliver message"),
            }
        }
        delivered
    }
}

impl std::fmt::Debug for Courier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.channels.read().keys().map(ToString::to_string).collect();
        ids.sort();
        f.debug_struct("Courier").field("channels", &ids).finish()
    }
}
