//! Per-invocation context handed to command handlers.
//!
//! A [`RequestContext`] is built by the dispatcher for exactly one command
//! run and moved into the handler future. Shared subsystems are reached
//! through [`Services`], a cheap-to-clone bundle of handles.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use hype_core::{Content, Destination, Inbound, Inbox, Room, SendError, Store, User};
use hype_transport::Proxy;
use mockable::{Clock, DefaultClock};

use crate::delivery::Courier;
use crate::error::HandlerError;
use crate::scheduler::SchedulerHandle;

/// Shared wall clock.
pub type SharedClock = Arc<dyn Clock + Send + Sync>;

// ─── Services ─────────────────────────────────────────────────────────────────

/// Handles to the subsystems shared by every handler and job.
#[derive(Clone)]
pub struct Services {
    store: Arc<dyn Store>,
    proxy: Option<Arc<Proxy>>,
    courier: Courier,
    scheduler: SchedulerHandle,
    inbox: Option<Inbox>,
    clock: SharedClock,
}

impl Services {
    /// Bundles the mandatory subsystems.
    pub fn new(store: Arc<dyn Store>, courier: Courier, scheduler: SchedulerHandle) -> Self {
        Self {
            store,
            proxy: None,
            courier,
            scheduler,
            inbox: None,
            clock: Arc::new(DefaultClock),
        }
    }

    /// Makes the outbound-call proxy available.
    pub fn with_proxy(mut self, proxy: Arc<Proxy>) -> Self {
        self.proxy = Some(proxy);
        self
    }

    /// Enables re-entrant dispatch through the runtime inbox.
    pub fn with_inbox(mut self, inbox: Inbox) -> Self {
        self.inbox = Some(inbox);
        self
    }

    /// Replaces the wall clock.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Key/value storage.
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Outbound-call proxy.
    ///
    /// Fails when the runtime was composed without one.
    pub fn proxy(&self) -> Result<&Arc<Proxy>, HandlerError> {
        self.proxy
            .as_ref()
            .ok_or_else(|| HandlerError::new("no proxy is configured"))
    }

    /// Message courier, for follow-ups sent after the handler returned.
    pub fn courier(&self) -> &Courier {
        &self.courier
    }

    /// Scheduler handle.
    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    /// Wall clock.
    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Current UTC time according to the shared clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.utc()
    }

    /// Sends content to a destination right away.
    pub async fn send(&self, to: &Destination, content: impl Into<Content>) -> Result<(), SendError> {
        self.courier.send(to, &content.into()).await.map(|_| ())
    }

    /// Feeds a synthetic message back into the runtime.
    ///
    /// The message is queued behind the current one and dispatched as a fresh
    /// top-level message, so a handler may trigger other commands (even in
    /// its own room) without waiting on itself.
    pub fn reenter(&self, room: Room, user: User, text: impl Into<String>) -> Result<(), HandlerError> {
        let inbox = self
            .inbox
            .as_ref()
            .ok_or_else(|| HandlerError::new("re-entrant dispatch is not available"))?;
        inbox
            .push(Inbound::new(room, user, text))
            .map_err(|e| HandlerError::new(e.to_string()))
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("store", &self.store.engine())
            .field("proxy", &self.proxy.is_some())
            .field("reentrant", &self.inbox.is_some())
            .finish_non_exhaustive()
    }
}

// ─── RequestContext ───────────────────────────────────────────────────────────

/// Everything a command handler knows about its invocation.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub(crate) room: Room,
    pub(crate) user: User,
    pub(crate) text: String,
    pub(crate) command: String,
    pub(crate) args: Vec<String>,
    pub(crate) arg_text: String,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) services: Services,
}

impl RequestContext {
    /// Room the command was sent in.
    pub fn room(&self) -> &Room {
        &self.room
    }

    /// Invoking user.
    pub fn user(&self) -> &User {
        &self.user
    }

    /// Full message text, untouched.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Canonical name of the resolved command.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Argument tokens.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Argument token at `index`.
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    /// Raw text after the command token.
    pub fn arg_text(&self) -> &str {
        &self.arg_text
    }

    /// When the dispatcher accepted the message.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Shared subsystems.
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Key/value storage.
    pub fn store(&self) -> &Arc<dyn Store> {
        self.services.store()
    }

    /// Outbound-call proxy.
    pub fn proxy(&self) -> Result<&Arc<Proxy>, HandlerError> {
        self.services.proxy()
    }

    /// Scheduler handle.
    pub fn scheduler(&self) -> &SchedulerHandle {
        self.services.scheduler()
    }

    /// Destination for the room the command came from.
    pub fn origin(&self) -> Destination {
        Destination::Room(self.room.clone())
    }

    /// Destination for a direct message to the invoker.
    pub fn invoker(&self) -> Destination {
        Destination::User {
            channel: self.room.channel.clone(),
            user: self.user.clone(),
        }
    }

    /// Dispatches `text` as if the invoker had sent it in the same room.
    pub fn reenter(&self, text: impl Into<String>) -> Result<(), HandlerError> {
        self.services
            .reenter(self.room.clone(), self.user.clone(), text)
    }

    /// User-facing usage error, e.g. `"Usage: stock <symbol>"`.
    pub fn usage_error(&self, usage: &str) -> HandlerError {
        HandlerError::user(format!("Usage: {} {usage}", self.command))
    }
}
