//! Command dispatch.
//!
//! [`Dispatcher::dispatch`] takes one inbound message through the full
//! pipeline:
//!
//! ```text
//! parse ─▶ resolve ─▶ audience ─▶ cooldown ─▶ permission ─▶ handler ─▶ deliver
//!   │         │                      │            │            │
//!   ▼         ▼                      ▼            ▼            ▼
//! ignore   NotFound /            Cooldown    PermissionDenied  Handler /
//!          Ambiguous                                           HandlerTimeout
//! ```
//!
//! Every rejection is answered locally (or ignored) and reported as an
//! [`Outcome`]; nothing escalates past the dispatcher. Replies are delivered
//! only once the handler future has completed, so an abandoned handler can
//! never send anything.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use hype_core::{Content, Inbound, Reply, StoreResult, Target};
use tracing::{debug, info, instrument, warn};

use crate::command::parse_invocation;
use crate::context::{RequestContext, Services};
use crate::cooldown::{CooldownTracker, cooldown_key};
use crate::delivery::Origin;
use crate::error::{DispatchError, HandlerError};
use crate::registry::Registry;
use crate::roles::{EveryoneRoles, RoleResolver};

// ─── Configuration ────────────────────────────────────────────────────────────

/// Dispatcher behaviour and user-facing notices.
///
/// Templates may use `{command}`, `{remaining}` (whole seconds, rounded up)
/// and `{candidates}` (comma-separated).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherConfig {
    /// Command prefix.
    pub prefix: String,
    /// Prefix used instead when `dev` is set.
    pub dev_prefix: String,
    /// Development mode.
    pub dev: bool,
    /// Accept commands without prefix in private rooms.
    pub private_prefix_optional: bool,
    /// Reply to unknown commands; `None` ignores them.
    pub unknown_notice: Option<String>,
    /// Reply when the user's role is too low.
    pub denied_notice: String,
    /// Reply when a handler fails without a notice of its own.
    pub failure_notice: String,
    /// Private notice while on cooldown; `None` stays silent.
    pub cooldown_notice: Option<String>,
    /// Reply listing the candidates of an ambiguous token.
    pub ambiguous_notice: String,
    /// Room notice left when a long reply is sent privately.
    pub long_reply_notice: String,
    /// Enforce cooldowns in private rooms too.
    pub cooldown_in_private: bool,
    /// Handler timeout for commands without their own.
    pub default_timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            prefix: "!".into(),
            dev_prefix: "%".into(),
            dev: false,
            private_prefix_optional: true,
            unknown_notice: None,
            denied_notice: "You don't have permission to use that command.".into(),
            failure_notice: "Something went wrong while running {command}.".into(),
            cooldown_notice: Some("{command} is on cooldown, try again in {remaining}s.".into()),
            ambiguous_notice: "Did you mean: {candidates}?".into(),
            long_reply_notice: "It's long so I sent it privately.".into(),
            cooldown_in_private: false,
            default_timeout: Duration::from_secs(30),
        }
    }
}

impl DispatcherConfig {
    /// Prefix in effect for the current mode.
    pub fn active_prefix(&self) -> &str {
        if self.dev { &self.dev_prefix } else { &self.prefix }
    }
}

fn render(template: &str, command: &str) -> String {
    template.replace("{command}", command)
}

fn whole_seconds(remaining: Duration) -> u64 {
    remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0)
}

// ─── Outcome ──────────────────────────────────────────────────────────────────

/// What became of one inbound message.
#[derive(Debug)]
pub enum Outcome {
    /// Not addressed to the bot.
    NotCommand,
    /// The handler ran and its reply was delivered.
    Completed {
        /// Canonical command name.
        command: String,
        /// Messages delivered.
        delivered: usize,
    },
    /// The command did not run to completion; the user was answered.
    Rejected(DispatchError),
}

impl Outcome {
    /// Returns `true` if the handler completed successfully.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

// ─── Dispatcher ───────────────────────────────────────────────────────────────

/// Routes command messages to their handlers.
pub struct Dispatcher {
    registry: Arc<Registry>,
    services: Services,
    roles: Arc<dyn RoleResolver>,
    cooldowns: CooldownTracker,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Creates a dispatcher with default settings, granting everyone
    /// [`Role::Everyone`](crate::roles::Role::Everyone).
    pub fn new(registry: Arc<Registry>, services: Services) -> Self {
        Self {
            cooldowns: CooldownTracker::new(services.clock().clone()),
            registry,
            services,
            roles: Arc::new(EveryoneRoles),
            config: DispatcherConfig::default(),
        }
    }

    /// Replaces the settings.
    pub fn with_config(mut self, config: DispatcherConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the role resolver.
    pub fn with_roles(mut self, roles: Arc<dyn RoleResolver>) -> Self {
        self.roles = roles;
        self
    }

    /// Command registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Cooldown table.
    pub fn cooldowns(&self) -> &CooldownTracker {
        &self.cooldowns
    }

    /// Settings.
    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Shared subsystems.
    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Loads persisted cooldowns from the store.
    pub async fn restore_cooldowns(&self) -> StoreResult<usize> {
        self.cooldowns.restore(self.services.store().as_ref()).await
    }

    /// Processes one inbound message.
    #[instrument(
        name = "dispatch",
        skip_all,
        fields(room = %inbound.room, user = %inbound.user.id)
    )]
    pub async fn dispatch(&self, inbound: Inbound) -> Outcome {
        let Inbound { room, user, text } = inbound;
        let prefix = self.config.active_prefix();
        let prefix_optional = room.is_private() && self.config.private_prefix_optional;
        let Some(invocation) = parse_invocation(&text, prefix, prefix_optional) else {
            return Outcome::NotCommand;
        };
        let explicit = text.trim_start().starts_with(prefix);
        let origin = Origin::new(room, user);

        // Without the prefix only an exact name or alias counts as a command.
        let resolved = if explicit {
            self.registry.resolve(&invocation.name)
        } else {
            self.registry
                .resolve_exact(&invocation.name)
                .ok_or_else(|| DispatchError::NotFound {
                    query: invocation.name.clone(),
                })
        };
        let entry = match resolved {
            Ok(entry) => entry,
            Err(e @ DispatchError::NotFound { .. }) => {
                if !explicit {
                    return Outcome::NotCommand;
                }
                debug!(query = %invocation.name, "Unknown command");
                if let Some(notice) = &self.config.unknown_notice {
                    self.notify(&origin, Target::Origin, render(notice, &invocation.name))
                        .await;
                }
                return Outcome::Rejected(e);
            }
            Err(e) => {
                if let DispatchError::Ambiguous { candidates, .. } = &e {
                    let notice = self
                        .config
                        .ambiguous_notice
                        .replace("{candidates}", &candidates.join(", "));
                    self.notify(&origin, Target::Origin, render(&notice, &invocation.name))
                        .await;
                }
                return Outcome::Rejected(e);
            }
        };
        let command = entry.command();
        let name = command.name().to_string();

        if !command.audience_policy().admits(&origin.room) {
            debug!(command = %name, "Command not offered in this room");
            return Outcome::NotCommand;
        }

        let permit = match command.cooldown_policy() {
            Some(cooldown) if !origin.room.is_private() || self.config.cooldown_in_private => {
                let key = cooldown_key(&name, cooldown.scope, &origin.room, &origin.user);
                match self.cooldowns.try_acquire(&key, cooldown.duration) {
                    Ok(permit) => Some((permit, cooldown.charge_on_reply_only)),
                    Err(remaining) => {
                        debug!(command = %name, remaining = ?remaining, "On cooldown");
                        if let Some(notice) = &self.config.cooldown_notice {
                            let notice = notice
                                .replace("{remaining}", &whole_seconds(remaining).to_string());
                            self.notify(&origin, Target::Invoker, render(&notice, &name))
                                .await;
                        }
                        return Outcome::Rejected(DispatchError::Cooldown {
                            command: name,
                            remaining,
                        });
                    }
                }
            }
            _ => None,
        };

        let required = command.required_role();
        if self.roles.role_of(&origin.room.channel, &origin.user) < required {
            info!(command = %name, required = %required, "Permission denied");
            self.notify(&origin, Target::Origin, render(&self.config.denied_notice, &name))
                .await;
            return Outcome::Rejected(DispatchError::PermissionDenied {
                command: name,
                required,
            });
        }

        let ctx = RequestContext {
            room: origin.room.clone(),
            user: origin.user.clone(),
            text,
            command: name.clone(),
            args: invocation.args,
            arg_text: invocation.arg_text,
            timestamp: self.services.now(),
            services: self.services.clone(),
        };
        let timeout = command.handler_timeout().unwrap_or(self.config.default_timeout);
        let call = AssertUnwindSafe(command.handler.call(ctx)).catch_unwind();

        let failure = match tokio::time::timeout(timeout, call).await {
            Ok(Ok(Ok(reply))) => {
                if let Some((permit, charge_on_reply_only)) = permit {
                    if !(charge_on_reply_only && reply.is_empty()) {
                        let key = permit.key().to_string();
                        let at = permit.commit();
                        let store = self.services.store();
                        if let Err(e) = CooldownTracker::persist(store.as_ref(), &key, at).await {
                            warn!(key = %key, error = %e, "Failed to persist cooldown");
                        }
                    }
                }
                let reply = self.reroute_long_reply(command.public_line_limit(), &origin, reply);
                let delivered = self.services.courier().deliver(Some(&origin), reply).await;
                debug!(command = %name, delivered, "Command completed");
                return Outcome::Completed {
                    command: name,
                    delivered,
                };
            }
            Ok(Ok(Err(source))) => DispatchError::Handler {
                command: name.clone(),
                source,
            },
            Ok(Err(_)) => DispatchError::Handler {
                command: name.clone(),
                source: HandlerError::new("handler panicked"),
            },
            Err(_) => DispatchError::HandlerTimeout {
                command: name.clone(),
                timeout,
            },
        };

        warn!(command = %name, error = %failure, "Command failed");
        let notice = match &failure {
            DispatchError::Handler { source, .. } => source.notice().map(str::to_string),
            _ => None,
        }
        .unwrap_or_else(|| render(&self.config.failure_notice, &name));
        self.notify(&origin, Target::Origin, notice).await;
        Outcome::Rejected(failure)
    }

    async fn notify(&self, origin: &Origin, target: Target, text: String) {
        let reply = Reply::none().and(target, Content::Text(text));
        self.services.courier().deliver(Some(origin), reply).await;
    }

    /// Sends an oversized public reply to the invoker instead, leaving a
    /// short notice in the room.
    fn reroute_long_reply(&self, limit: Option<usize>, origin: &Origin, reply: Reply) -> Reply {
        let Some(limit) = limit else {
            return reply;
        };
        if origin.room.is_private() {
            return reply;
        }
        let public_lines: usize = reply
            .iter()
            .filter(|m| m.target == Target::Origin)
            .map(|m| m.content.line_count())
            .sum();
        if public_lines <= limit {
            return reply;
        }

        debug!(lines = public_lines, limit, "Re-routing long reply privately");
        let mut rerouted: Reply = reply
            .into_iter()
            .map(|mut m| {
                if m.target == Target::Origin && !matches!(m.content, Content::Reaction(_)) {
                    m.target = Target::Invoker;
                }
                m
            })
            .collect::<Vec<_>>()
            .into();
        rerouted.push(hype_core::Outbound::new(
            Target::Origin,
            self.config.long_reply_notice.as_str(),
        ));
        rerouted
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("commands", &self.registry.len())
            .field("prefix", &self.config.active_prefix())
            .field("cooldowns", &self.cooldowns)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{DateTime, FixedOffset};
    use hype_core::{ChannelId, Destination, MemoryStore, Room, Store, User};
    use mockable::Clock;

    use super::*;
    use crate::command::{Audience, Command, CooldownScope};
    use crate::cooldown::testing::ManualClock;
    use crate::delivery::Courier;
    use crate::delivery::testing::RecordingChannel;
    use crate::handler::HandlerResult;
    use crate::registry::RegistryBuilder;
    use crate::roles::Role;
    use crate::scheduler::Scheduler;

    struct Harness {
        dispatcher: Arc<Dispatcher>,
        backend: Arc<RecordingChannel>,
        clock: Arc<ManualClock>,
        store: Arc<MemoryStore>,
    }

    fn harness(commands: Vec<Command>) -> Harness {
        let clock = ManualClock::new(DateTime::from_timestamp(1_700_000_000, 0).unwrap());
        let backend = RecordingChannel::new("test");
        let courier = Courier::new();
        courier.register(backend.clone());
        let store = Arc::new(MemoryStore::new());
        let scheduler = Scheduler::new(clock.clone(), FixedOffset::east_opt(0).unwrap());
        let services = Services::new(store.clone(), courier, scheduler.handle())
            .with_clock(clock.clone());

        let mut builder = RegistryBuilder::new();
        for command in commands {
            builder.command(command).unwrap();
        }
        let roles = |_: &ChannelId, user: &User| match user.id.as_str() {
            "admin" => Role::Admin,
            _ => Role::Everyone,
        };
        let dispatcher = Dispatcher::new(builder.build().unwrap(), services).with_roles(Arc::new(roles));
        Harness {
            dispatcher: Arc::new(dispatcher),
            backend,
            clock,
            store,
        }
    }

    fn public(user: &str, text: &str) -> Inbound {
        Inbound::new(Room::public("test", "#hype"), User::new(user), text)
    }

    fn counting(counter: &Arc<AtomicUsize>, reply: &'static str) -> impl crate::handler::Handler {
        let counter = counter.clone();
        move |_ctx: RequestContext| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, HandlerError>(reply.to_string())
            }
        }
    }

    async fn help(_ctx: RequestContext) -> HandlerResult {
        Ok(Reply::text("Commands: help, hype"))
    }

    #[tokio::test]
    async fn test_help_alias_scenario() {
        let h = harness(vec![Command::new("help", help).alias("h")]);
        let outcome = h.dispatcher.dispatch(public("u", "!h")).await;
        assert!(matches!(outcome, Outcome::Completed { ref command, delivered: 1 } if command == "help"));

        let sent = h.backend.take();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, Destination::Room(Room::public("test", "#hype")));
        assert_eq!(sent[0].1, Content::from("Commands: help, hype"));
    }

    #[tokio::test]
    async fn test_non_commands_are_ignored() {
        let h = harness(vec![Command::new("help", help)]);
        assert!(matches!(h.dispatcher.dispatch(public("u", "help me")).await, Outcome::NotCommand));
        assert!(matches!(h.dispatcher.dispatch(public("u", "%help")).await, Outcome::NotCommand));

        let dm = Inbound::new(Room::private("test", "u"), User::new("u"), "hello there");
        assert!(matches!(h.dispatcher.dispatch(dm).await, Outcome::NotCommand));
        assert!(h.backend.texts().is_empty());

        let dm = Inbound::new(Room::private("test", "u"), User::new("u"), "help");
        assert!(h.dispatcher.dispatch(dm).await.is_completed());
    }

    #[tokio::test]
    async fn test_prefixless_dm_needs_exact_name() {
        let runs = Arc::new(AtomicUsize::new(0));
        let h = harness(vec![
            Command::new("reset", counting(&runs, "done")).alias("wipe"),
            Command::new("stats", help),
            Command::new("stock", help),
        ]);
        let dm = |text: &str| Inbound::new(Room::private("test", "u"), User::new("u"), text);

        for chat in ["r", "res", "st", "wip"] {
            assert!(matches!(h.dispatcher.dispatch(dm(chat)).await, Outcome::NotCommand), "{chat}");
        }
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(h.backend.texts().is_empty());

        assert!(h.dispatcher.dispatch(dm("reset")).await.is_completed());
        assert!(h.dispatcher.dispatch(dm("wipe")).await.is_completed());
        assert!(h.dispatcher.dispatch(dm("!r")).await.is_completed());
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_unknown_command_is_silent_by_default() {
        let h = harness(vec![Command::new("help", help)]);
        let outcome = h.dispatcher.dispatch(public("u", "!nope")).await;
        assert!(matches!(outcome, Outcome::Rejected(DispatchError::NotFound { .. })));
        assert!(h.backend.texts().is_empty());
    }

    #[tokio::test]
    async fn test_reset_cooldown_scenario() {
        let runs = Arc::new(AtomicUsize::new(0));
        let h = harness(vec![
            Command::new("reset", counting(&runs, "Leaderboard reset."))
                .permission(Role::Admin)
                .cooldown(Duration::from_secs(60), CooldownScope::User),
        ]);

        assert!(h.dispatcher.dispatch(public("admin", "!reset")).await.is_completed());
        h.clock.advance(Duration::from_secs(5));
        let outcome = h.dispatcher.dispatch(public("admin", "!reset")).await;

        match outcome {
            Outcome::Rejected(DispatchError::Cooldown { command, remaining }) => {
                assert_eq!(command, "reset");
                assert_eq!(remaining, Duration::from_secs(55));
            }
            other => panic!("expected cooldown, got {other:?}"),
        }
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        let sent = h.backend.take();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].1, Content::from("Leaderboard reset."));
        assert_eq!(sent[1].0.to_string(), "test:@admin");
        assert_eq!(sent[1].1, Content::from("reset is on cooldown, try again in 55s."));

        let persisted = h.store.subkey_entries("cooldown").await.unwrap();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].0, "reset@test:#hype/admin");
    }

    #[tokio::test]
    async fn test_cooldown_expires_and_scopes_apart() {
        let runs = Arc::new(AtomicUsize::new(0));
        let h = harness(vec![
            Command::new("roll", counting(&runs, "4"))
                .cooldown(Duration::from_secs(10), CooldownScope::User),
        ]);

        assert!(h.dispatcher.dispatch(public("alice", "!roll")).await.is_completed());
        assert!(h.dispatcher.dispatch(public("bob", "!roll")).await.is_completed());
        assert!(!h.dispatcher.dispatch(public("alice", "!roll")).await.is_completed());

        h.clock.advance(Duration::from_secs(10));
        assert!(h.dispatcher.dispatch(public("alice", "!roll")).await.is_completed());
        assert_eq!(runs.load(Ordering::SeqCst), 3);

        // Private rooms skip cooldowns.
        let dm = Inbound::new(Room::private("test", "alice"), User::new("alice"), "!roll");
        assert!(h.dispatcher.dispatch(dm).await.is_completed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_invocations_run_once() {
        let runs = Arc::new(AtomicUsize::new(0));
        let slow = {
            let runs = runs.clone();
            move |_ctx: RequestContext| {
                let runs = runs.clone();
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, HandlerError>("done")
                }
            }
        };
        let h = harness(vec![
            Command::new("slow", slow).cooldown(Duration::from_secs(60), CooldownScope::User),
        ]);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let dispatcher = h.dispatcher.clone();
                tokio::spawn(async move { dispatcher.dispatch(public("alice", "!slow")).await })
            })
            .collect();
        let mut completed = 0;
        for task in tasks {
            if task.await.unwrap().is_completed() {
                completed += 1;
            }
        }
        assert_eq!(completed, 1);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_permission_denied_is_not_charged() {
        let runs = Arc::new(AtomicUsize::new(0));
        let h = harness(vec![
            Command::new("reset", counting(&runs, "ok"))
                .permission(Role::Admin)
                .cooldown(Duration::from_secs(60), CooldownScope::Room),
        ]);

        let outcome = h.dispatcher.dispatch(public("alice", "!reset")).await;
        assert!(matches!(
            outcome,
            Outcome::Rejected(DispatchError::PermissionDenied { required: Role::Admin, .. })
        ));
        assert_eq!(h.backend.texts(), vec!["You don't have permission to use that command."]);

        assert!(h.dispatcher.dispatch(public("admin", "!reset")).await.is_completed());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ambiguous_token_lists_candidates() {
        let h = harness(vec![Command::new("stock", help), Command::new("stats", help)]);
        let outcome = h.dispatcher.dispatch(public("u", "!st")).await;
        assert!(matches!(outcome, Outcome::Rejected(DispatchError::Ambiguous { .. })));
        assert_eq!(h.backend.texts(), vec!["Did you mean: stats, stock?"]);
    }

    #[tokio::test]
    async fn test_handler_failure_is_reported() {
        let h = harness(vec![
            Command::new("boom", |_ctx: RequestContext| async {
                Err::<Reply, _>(HandlerError::new("database exploded"))
            }),
            Command::new("usage", |ctx: RequestContext| async move {
                Err::<Reply, _>(ctx.usage_error("<symbol>"))
            }),
            Command::new("panic", |_ctx: RequestContext| async {
                if true {
                    panic!("handler bug");
                }
                Ok::<_, HandlerError>(Reply::none())
            }),
        ]);

        let outcome = h.dispatcher.dispatch(public("u", "!boom")).await;
        assert!(matches!(outcome, Outcome::Rejected(DispatchError::Handler { .. })));
        h.dispatcher.dispatch(public("u", "!usage")).await;
        let outcome = h.dispatcher.dispatch(public("u", "!panic")).await;
        assert!(matches!(outcome, Outcome::Rejected(DispatchError::Handler { .. })));

        assert_eq!(
            h.backend.texts(),
            vec![
                "Something went wrong while running boom.",
                "Usage: usage <symbol>",
                "Something went wrong while running panic.",
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_timeout_sends_nothing_from_handler() {
        let runs = Arc::new(AtomicUsize::new(0));
        let h = harness(vec![
            Command::new("hang", |_ctx: RequestContext| async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok::<_, HandlerError>("too late")
            })
            .timeout(Duration::from_secs(2))
            .cooldown(Duration::from_secs(60), CooldownScope::User),
            Command::new("ok", counting(&runs, "fine")),
        ]);

        let outcome = h.dispatcher.dispatch(public("u", "!hang")).await;
        assert!(matches!(
            outcome,
            Outcome::Rejected(DispatchError::HandlerTimeout { timeout, .. }) if timeout == Duration::from_secs(2)
        ));
        assert_eq!(h.backend.texts(), vec!["Something went wrong while running hang."]);

        // A timed-out run is not charged.
        h.backend.take();
        let outcome = h.dispatcher.dispatch(public("u", "!hang")).await;
        assert!(matches!(outcome, Outcome::Rejected(DispatchError::HandlerTimeout { .. })));
    }

    #[tokio::test]
    async fn test_charge_on_reply_only() {
        let h = harness(vec![
            Command::new("maybe", |ctx: RequestContext| async move {
                Ok::<_, HandlerError>(ctx.arg(0).map(str::to_string))
            })
            .cooldown_on_reply(Duration::from_secs(60), CooldownScope::User),
        ]);

        assert!(h.dispatcher.dispatch(public("u", "!maybe")).await.is_completed());
        assert!(h.dispatcher.dispatch(public("u", "!maybe yes")).await.is_completed());
        assert!(!h.dispatcher.dispatch(public("u", "!maybe again")).await.is_completed());
    }

    #[tokio::test]
    async fn test_long_public_reply_goes_private() {
        let h = harness(vec![
            Command::new("list", |_ctx: RequestContext| async {
                Ok::<_, HandlerError>("one\ntwo\nthree\nfour")
            })
            .max_public_lines(3),
        ]);

        h.dispatcher.dispatch(public("alice", "!list")).await;
        let sent = h.backend.take();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0.to_string(), "test:@alice");
        assert_eq!(sent[1].0, Destination::Room(Room::public("test", "#hype")));
        assert_eq!(sent[1].1, Content::from("It's long so I sent it privately."));
    }

    #[tokio::test]
    async fn test_audience_and_disabled_commands() {
        let h = harness(vec![
            Command::new("secret", help).audience(Audience::Private),
            Command::new("old", help),
        ]);
        assert!(matches!(h.dispatcher.dispatch(public("u", "!secret")).await, Outcome::NotCommand));

        h.dispatcher.registry().disable("old").unwrap();
        assert!(matches!(
            h.dispatcher.dispatch(public("u", "!old")).await,
            Outcome::Rejected(DispatchError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_dev_prefix() {
        let h = harness(vec![Command::new("help", help)]);
        let dispatcher = Dispatcher::new(h.dispatcher.registry().clone(), h.dispatcher.services().clone())
            .with_config(DispatcherConfig {
                dev: true,
                ..Default::default()
            });
        assert!(dispatcher.dispatch(public("u", "%help")).await.is_completed());
        assert!(matches!(dispatcher.dispatch(public("u", "!help")).await, Outcome::NotCommand));
    }

    #[tokio::test]
    async fn test_restore_cooldowns_from_store() {
        let h = harness(vec![
            Command::new("reset", help).cooldown(Duration::from_secs(60), CooldownScope::User),
        ]);
        let at = h.clock.utc().timestamp_millis();
        h.store
            .set_value("reset@test:#hype/u", "cooldown", &at.to_string())
            .await
            .unwrap();

        assert_eq!(h.dispatcher.restore_cooldowns().await.unwrap(), 1);
        assert!(!h.dispatcher.dispatch(public("u", "!reset")).await.is_completed());
    }
}
