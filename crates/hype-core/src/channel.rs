//! Channel abstraction.
//!
//! A [`Channel`] is a chat backend (an IRC network, a Discord bot account, a
//! console) identified by a [`ChannelId`]. Backends own their connection and
//! expose exactly two things to the core:
//!
//! - pushing inbound messages into an [`Inbox`] once started, and
//! - delivering [`Content`] to a [`Destination`] (a [`Room`] or a direct
//!   message to a [`User`]).
//!
//! The core never parses protocol-specific wire formats.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{SendError, SendResult};
use crate::message::Content;

// ─── Identities ───────────────────────────────────────────────────────────────

/// Identity of a channel backend, e.g. `"discord"` or `"console"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(Arc<str>);

impl ChannelId {
    /// Creates a channel identity.
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(Arc::from(id.as_ref()))
    }

    /// Returns the identity as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ChannelId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Whether a room is shared or a one-to-one conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    /// Shared room visible to many users.
    #[default]
    Public,
    /// Direct conversation between the bot and one user.
    Private,
}

/// An addressable room on a backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Room {
    /// Backend the room lives on.
    pub channel: ChannelId,
    /// Backend-specific room identifier.
    pub id: String,
    /// Public room or private conversation.
    pub visibility: Visibility,
}

impl Room {
    /// Creates a public room.
    pub fn public(channel: impl Into<ChannelId>, id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            id: id.into(),
            visibility: Visibility::Public,
        }
    }

    /// Creates a private (direct) room.
    pub fn private(channel: impl Into<ChannelId>, id: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            id: id.into(),
            visibility: Visibility::Private,
        }
    }

    /// Returns `true` for direct conversations.
    pub fn is_private(&self) -> bool {
        self.visibility == Visibility::Private
    }

    /// Stable key identifying this room across backends.
    pub fn key(&self) -> String {
        format!("{}:{}", self.channel, self.id)
    }
}

impl fmt::Display for Room {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.channel, self.id)
    }
}

/// A chat user as seen by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct User {
    /// Backend-specific stable identifier.
    pub id: String,
    /// Display name, used in replies.
    pub name: String,
}

impl User {
    /// Creates a user whose display name equals its id.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
        }
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Where a backend should deliver content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// A room on the backend.
    Room(Room),
    /// A direct message to a user on the backend.
    User {
        /// Backend to deliver through.
        channel: ChannelId,
        /// Recipient.
        user: User,
    },
}

impl Destination {
    /// Backend that must deliver to this destination.
    pub fn channel(&self) -> &ChannelId {
        match self {
            Self::Room(room) => &room.channel,
            Self::User { channel, .. } => channel,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Room(room) => write!(f, "{room}"),
            Self::User { channel, user } => write!(f, "{channel}:@{}", user.id),
        }
    }
}

/// Acknowledgement returned by a backend after a successful send.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ack {
    /// Backend message identifier, when the protocol provides one.
    pub message_id: Option<String>,
}

// ─── Inbound side ─────────────────────────────────────────────────────────────

/// A raw message received by a backend.
#[derive(Debug, Clone)]
pub struct Inbound {
    /// Room the message arrived in.
    pub room: Room,
    /// Author of the message.
    pub user: User,
    /// Message text, untouched.
    pub text: String,
}

impl Inbound {
    /// Creates an inbound message.
    pub fn new(room: Room, user: User, text: impl Into<String>) -> Self {
        Self {
            room,
            user,
            text: text.into(),
        }
    }
}

/// Sending half through which backends feed inbound messages to the runtime.
///
/// Unbounded so that a handler re-entering the dispatcher can never block on
/// its own room's queue.
#[derive(Debug, Clone)]
pub struct Inbox {
    tx: mpsc::UnboundedSender<Inbound>,
}

impl Inbox {
    /// Creates an inbox and the receiver the runtime drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Inbound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Pushes a message to the runtime.
    pub fn push(&self, inbound: Inbound) -> SendResult<()> {
        self.tx.send(inbound).map_err(|_| SendError::Closed)
    }

    /// Returns `true` once the runtime stopped receiving.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ─── Channel trait ────────────────────────────────────────────────────────────

/// A chat backend.
///
/// Implementations own the underlying connection. The runtime calls
/// [`start`](Channel::start) once with an [`Inbox`], then uses
/// [`send`](Channel::send) for every outbound message addressed to this
/// backend.
///
/// # Example
///
/// ```rust,ignore
/// struct IrcChannel { /* socket, nick, ... */ }
///
/// #[async_trait]
/// impl Channel for IrcChannel {
///     fn id(&self) -> ChannelId { ChannelId::new("irc") }
///
///     async fn start(&self, inbox: Inbox) -> SendResult<()> {
///         // spawn a reader task that pushes PRIVMSGs into `inbox`
///         Ok(())
///     }
///
///     async fn send(&self, to: &Destination, content: &Content) -> SendResult<Ack> {
///         // write PRIVMSG lines
///         Ok(Ack::default())
///     }
/// }
/// ```
#[async_trait]
pub trait Channel: Send + Sync {
    /// Identity of this backend; used for routing and cooldown scoping.
    fn id(&self) -> ChannelId;

    /// Starts receiving. Inbound messages must be pushed into `inbox`.
    async fn start(&self, inbox: Inbox) -> SendResult<()>;

    /// Delivers content to a destination on this backend.
    async fn send(&self, to: &Destination, content: &Content) -> SendResult<Ack>;

    /// Releases the connection. Called once during shutdown.
    async fn stop(&self) {}
}

/// A shared channel trait object.
pub type BoxedChannel = Arc<dyn Channel>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_key_and_visibility() {
        let room = Room::public("irc", "#hype");
        assert_eq!(room.key(), "irc:#hype");
        assert!(!room.is_private());
        assert!(Room::private("irc", "alice").is_private());
    }

    #[test]
    fn test_destination_channel() {
        let dest = Destination::User {
            channel: ChannelId::new("discord"),
            user: User::new("42").with_name("alice"),
        };
        assert_eq!(dest.channel().as_str(), "discord");
        assert_eq!(dest.to_string(), "discord:@42");
    }

    #[tokio::test]
    async fn test_inbox_push_and_close() {
        let (inbox, mut rx) = Inbox::channel();
        inbox
            .push(Inbound::new(Room::public("c", "r"), User::new("u"), "!help"))
            .unwrap();
        assert_eq!(rx.recv().await.unwrap().text, "!help");

        drop(rx);
        assert!(inbox.is_closed());
        assert!(matches!(
            inbox.push(Inbound::new(Room::public("c", "r"), User::new("u"), "x")),
            Err(SendError::Closed)
        ));
    }
}
