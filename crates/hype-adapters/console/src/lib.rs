//! # Hype Console Adapter
//!
//! A [`Channel`] that reads messages from a terminal and prints replies.
//!
//! Every line typed is a message from the current user in the current room.
//! Lines starting with `/` change who is talking and where:
//!
//! | Line | Effect |
//! |------|--------|
//! | `/as <user>` | speak as `<user>` |
//! | `/join <room>` | move to public room `<room>` |
//! | `/dm` | talk to the bot privately |
//! | `/quit` | stop reading |
//!
//! Replies are printed as `[#room] text` for rooms and `[@user] text` for
//! direct messages.
//!
//! ```rust,ignore
//! use hype_adapter_console::ConsoleChannel;
//!
//! HypeRuntime::builder()
//!     .channel(ConsoleChannel::stdio())
//!     .build()?
//!     .run()
//!     .await?;
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use hype_core::{
    Ack, Channel, ChannelId, Content, Destination, Inbound, Inbox, Room, SendError, SendResult,
    User,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type BoxedReader = Box<dyn AsyncBufRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Initial identity of the console session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Channel id used for routing and role entries (`console:<user>`).
    pub channel: String,
    /// Public room the session starts in.
    pub room: String,
    /// User the session starts as.
    pub user: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            channel: "console".to_string(),
            room: "#console".to_string(),
            user: "you".to_string(),
        }
    }
}

/// Terminal backend.
pub struct ConsoleChannel {
    config: ConsoleConfig,
    id: ChannelId,
    input: Mutex<Option<BoxedReader>>,
    output: Arc<tokio::sync::Mutex<BoxedWriter>>,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl ConsoleChannel {
    /// Reads stdin and writes stdout.
    pub fn stdio() -> Self {
        Self::new(
            ConsoleConfig::default(),
            BufReader::new(tokio::io::stdin()),
            tokio::io::stdout(),
        )
    }

    /// Creates a console over arbitrary streams.
    pub fn new(
        config: ConsoleConfig,
        input: impl AsyncBufRead + Send + Unpin + 'static,
        output: impl AsyncWrite + Send + Unpin + 'static,
    ) -> Self {
        Self {
            id: ChannelId::new(&config.channel),
            config,
            input: Mutex::new(Some(Box::new(input))),
            output: Arc::new(tokio::sync::Mutex::new(Box::new(output))),
            reader: Mutex::new(None),
        }
    }

    /// Session configuration.
    pub fn config(&self) -> &ConsoleConfig {
        &self.config
    }
}

impl std::fmt::Debug for ConsoleChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleChannel")
            .field("config", &self.config)
            .field("running", &self.reader.lock().is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Channel for ConsoleChannel {
    fn id(&self) -> ChannelId {
        self.id.clone()
    }

    async fn start(&self, inbox: Inbox) -> SendResult<()> {
        let input = self
            .input
            .lock()
            .take()
            .ok_or_else(|| SendError::Unsupported("console can only be started once".into()))?;
        let session = Session {
            channel: self.id.clone(),
            room: Room::public(self.id.clone(), &self.config.room),
            user: User::new(&self.config.user),
        };
        info!(channel = %self.id, room = %session.room, user = %session.user.id, "Console ready");
        *self.reader.lock() = Some(tokio::spawn(read_lines(input, session, inbox)));
        Ok(())
    }

    async fn send(&self, to: &Destination, content: &Content) -> SendResult<Ack> {
        let label = match to {
            Destination::Room(room) => room.id.clone(),
            Destination::User { user, .. } => format!("@{}", user.id),
        };
        let mut rendered = String::new();
        for line in content.to_plain_text().lines() {
            rendered.push_str(&format!("[{label}] {line}\n"));
        }

        let mut output = self.output.lock().await;
        output
            .write_all(rendered.as_bytes())
            .await
            .map_err(|e| SendError::Io(e.to_string()))?;
        output.flush().await.map_err(|e| SendError::Io(e.to_string()))?;
        Ok(Ack::default())
    }

    async fn stop(&self) {
        if let Some(reader) = self.reader.lock().take() {
            reader.abort();
        }
        if let Err(e) = self.output.lock().await.flush().await {
            warn!(error = %e, "Failed to flush console output");
        }
    }
}

/// Who is talking, and where.
struct Session {
    channel: ChannelId,
    room: Room,
    user: User,
}

impl Session {
    /// Applies a `/` directive. Returns `false` on `/quit`.
    fn apply(&mut self, directive: &str) -> bool {
        let (command, arg) = directive
            .split_once(char::is_whitespace)
            .map(|(c, a)| (c, a.trim()))
            .unwrap_or((directive, ""));
        match (command, arg) {
            ("quit", _) => return false,
            ("as", user) if !user.is_empty() => {
                self.user = User::new(user);
                if self.room.is_private() {
                    self.room = Room::private(self.channel.clone(), user);
                }
            }
            ("join", room) if !room.is_empty() => {
                self.room = Room::public(self.channel.clone(), room);
            }
            ("dm", _) => {
                self.room = Room::private(self.channel.clone(), &self.user.id);
            }
            _ => {
                warn!(directive, "Unknown console directive");
                return true;
            }
        }
        debug!(room = %self.room, user = %self.user.id, "Console session changed");
        true
    }
}

async fn read_lines(mut input: BoxedReader, mut session: Session, inbox: Inbox) {
    let mut line = String::new();
    loop {
        line.clear();
        match input.read_line(&mut line).await {
            Ok(0) => {
                info!("Console input closed");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                warn!(error = %e, "Failed to read console input");
                break;
            }
        }

        let text = line.trim_end_matches(['\r', '\n']);
        if text.trim().is_empty() {
            continue;
        }
        if let Some(directive) = text.strip_prefix('/') {
            if !session.apply(directive.trim()) {
                break;
            }
            continue;
        }

        let inbound = Inbound::new(session.room.clone(), session.user.clone(), text);
        if inbox.push(inbound).is_err() {
            debug!("Runtime stopped receiving, closing console");
            break;
        }
    }
}
