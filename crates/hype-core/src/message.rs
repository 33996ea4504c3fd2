//! Outbound message content.
//!
//! Handlers and scheduled jobs answer with a [`Reply`]: an ordered list of
//! [`Outbound`] messages. Each message carries [`Content`] (plain text, a
//! structured [`Embed`], or a reaction) and a [`Target`] that the delivery
//! layer resolves into a concrete [`Destination`].

use std::fmt::Write as _;

use crate::channel::{Destination, User};

/// A field inside an [`Embed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbedField {
    /// Field label.
    pub name: String,
    /// Field body.
    pub value: String,
    /// Whether backends may render the field side by side with others.
    pub inline: bool,
}

/// Structured rich content, rendered natively by backends that support it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Embed {
    /// Headline.
    pub title: String,
    /// Main body.
    pub description: Option<String>,
    /// Link attached to the title.
    pub url: Option<String>,
    /// Key/value fields.
    pub fields: Vec<EmbedField>,
    /// Small trailing text.
    pub footer: Option<String>,
}

impl Embed {
    /// Creates an embed with a title.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }

    /// Sets the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the title link.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Appends a field.
    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    /// Sets the footer.
    pub fn footer(mut self, footer: impl Into<String>) -> Self {
        self.footer = Some(footer.into());
        self
    }

    /// Renders the embed as plain text for text-only backends.
    pub fn to_plain_text(&self) -> String {
        let mut out = self.title.clone();
        if let Some(url) = &self.url {
            let _ = write!(out, " <{url}>");
        }
        if let Some(description) = &self.description {
            let _ = write!(out, "\n{description}");
        }
        for field in &self.fields {
            let _ = write!(out, "\n{}: {}", field.name, field.value);
        }
        if let Some(footer) = &self.footer {
            let _ = write!(out, "\n{footer}");
        }
        out
    }
}

/// What a backend is asked to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    /// Plain text, possibly spanning several lines.
    Text(String),
    /// Structured content.
    Embed(Embed),
    /// A reaction (emoji) on the triggering message.
    Reaction(String),
}

impl Content {
    /// Returns the text for [`Content::Text`].
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Number of lines this content occupies in a room.
    pub fn line_count(&self) -> usize {
        match self {
            Self::Text(text) => text.lines().count().max(1),
            Self::Embed(embed) => embed.to_plain_text().lines().count(),
            Self::Reaction(_) => 0,
        }
    }

    /// Plain-text rendering, for logs and text-only backends.
    pub fn to_plain_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Embed(embed) => embed.to_plain_text(),
            Self::Reaction(emoji) => emoji.clone(),
        }
    }
}

impl From<String> for Content {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Content {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Embed> for Content {
    fn from(value: Embed) -> Self {
        Self::Embed(value)
    }
}

/// Where an outbound message should go, before resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// The room the triggering message came from.
    Origin,
    /// A direct message to the user who triggered the command.
    Invoker,
    /// Another user, privately, on the origin's backend.
    User(User),
    /// An explicit destination on any backend.
    Destination(Destination),
}

/// One message to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    /// Where to send it.
    pub target: Target,
    /// What to send.
    pub content: Content,
}

impl Outbound {
    /// Creates an outbound message.
    pub fn new(target: Target, content: impl Into<Content>) -> Self {
        Self {
            target,
            content: content.into(),
        }
    }
}

/// The ordered set of messages produced by one handler or job run.
///
/// # Example
///
/// ```rust,ignore
/// Reply::text("pong")
///     .and(Target::Invoker, "psst, you have 3 hypecoins")
///     .react("👍")
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    messages: Vec<Outbound>,
}

impl Reply {
    /// A reply that sends nothing.
    pub fn none() -> Self {
        Self::default()
    }

    /// A single text message to the origin room.
    pub fn text(text: impl Into<String>) -> Self {
        Self::none().and_text(text)
    }

    /// A single embed to the origin room.
    pub fn embed(embed: Embed) -> Self {
        Self::none().and(Target::Origin, embed)
    }

    /// A single message to an explicit destination.
    pub fn to(destination: Destination, content: impl Into<Content>) -> Self {
        Self::none().and(Target::Destination(destination), content)
    }

    /// Appends a text message to the origin room.
    pub fn and_text(self, text: impl Into<String>) -> Self {
        self.and(Target::Origin, Content::Text(text.into()))
    }

    /// Appends a message with an explicit target.
    pub fn and(mut self, target: Target, content: impl Into<Content>) -> Self {
        self.messages.push(Outbound::new(target, content));
        self
    }

    /// Appends a reaction to the triggering message.
    pub fn react(self, emoji: impl Into<String>) -> Self {
        self.and(Target::Origin, Content::Reaction(emoji.into()))
    }

    /// Appends an outbound message.
    pub fn push(&mut self, outbound: Outbound) {
        self.messages.push(outbound);
    }

    /// Returns `true` if nothing will be sent.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Iterates over the messages in order.
    pub fn iter(&self) -> impl Iterator<Item = &Outbound> {
        self.messages.iter()
    }

    /// Consumes the reply into its messages.
    pub fn into_messages(self) -> Vec<Outbound> {
        self.messages
    }
}

impl From<String> for Reply {
    fn from(value: String) -> Self {
        Self::text(value)
    }
}

impl From<&str> for Reply {
    fn from(value: &str) -> Self {
        Self::text(value)
    }
}

impl From<Option<String>> for Reply {
    fn from(value: Option<String>) -> Self {
        value.map(Self::text).unwrap_or_default()
    }
}

impl From<Vec<Outbound>> for Reply {
    fn from(messages: Vec<Outbound>) -> Self {
        Self { messages }
    }
}

impl IntoIterator for Reply {
    type Item = Outbound;
    type IntoIter = std::vec::IntoIter<Outbound>;

    fn into_iter(self) -> Self::IntoIter {
        self.messages.into_iter()
    }
}
