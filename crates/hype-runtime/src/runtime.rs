//! Composition root.
//!
//! [`HypeRuntime`] wires configuration, plugins, channels, storage and the
//! proxy into a running bot:
//!
//! ```text
//!  Channel::start ──▶ Inbox ──▶ Router ──▶ room worker ──▶ Dispatcher ──▶ Courier ──▶ Channel::send
//!                                                                           ▲
//!                                    Scheduler ──▶ job task ────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use hype_runtime::HypeRuntime;
//!
//! HypeRuntime::builder()
//!     .config_file("hype.toml")
//!     .channel(ConsoleChannel::new())
//!     .plugin(Coins)
//!     .build()?
//!     .run()
//!     .await?;
//! ```

use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use hype_core::{BoxedChannel, Channel, FileStore, Inbox, MemoryStore, Store};
use hype_framework::{
    Courier, Dispatcher, Plugin, Registrar, Registry, Scheduler, SchedulerHandle, Services,
    SharedClock,
};
use hype_transport::{Proxy, Transport};
use tokio::signal;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigError, ConfigLoader, HypeConfig, StorageEngine, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;
use crate::roles::StaticRoles;
use crate::router::Router;

/// A composed, not yet started bot.
pub struct HypeRuntime {
    config: HypeConfig,
    channels: Vec<BoxedChannel>,
    plugins: Vec<Arc<dyn Plugin>>,
    store: Option<Arc<dyn Store>>,
    transport: Option<Arc<dyn Transport>>,
    clock: SharedClock,
}

impl HypeRuntime {
    /// Creates a runtime builder.
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// The loaded configuration.
    pub fn config(&self) -> &HypeConfig {
        &self.config
    }

    /// Runs until Ctrl+C or SIGTERM.
    pub async fn run(self) -> RuntimeResult<()> {
        let handle = self.start().await?;
        info!("Hype is running. Press Ctrl+C to stop.");
        wait_for_shutdown().await;
        handle.shutdown().await;
        Ok(())
    }

    /// Runs until `shutdown` completes.
    pub async fn run_until<F>(self, shutdown: F) -> RuntimeResult<()>
    where
        F: Future<Output = ()>,
    {
        let handle = self.start().await?;
        shutdown.await;
        handle.shutdown().await;
        Ok(())
    }

    /// Composes every subsystem, starts the channels and spawns the router
    /// and scheduler tasks.
    pub async fn start(self) -> RuntimeResult<RuntimeHandle> {
        let Self {
            config,
            channels,
            plugins,
            store,
            transport,
            clock,
        } = self;

        let offset = config.scheduler.offset().ok_or_else(|| {
            ConfigError::validation(format!(
                "UTC offset of {} minutes is out of range",
                config.scheduler.utc_offset_minutes
            ))
        })?;
        let scheduler = Scheduler::new(clock.clone(), offset);

        let registry = register_plugins(&config, &plugins, &scheduler)?;

        let courier = Courier::new();
        let mut seen = HashSet::new();
        for channel in &channels {
            let id = channel.id();
            if !seen.insert(id.clone()) {
                return Err(RuntimeError::DuplicateChannel(id.to_string()));
            }
            courier.register(Arc::clone(channel));
        }

        let store = match store {
            Some(store) => store,
            None => open_store(&config).await?,
        };

        let (inbox, inbound) = Inbox::channel();
        let mut services = Services::new(store, courier.clone(), scheduler.handle())
            .with_inbox(inbox.clone())
            .with_clock(clock);
        if let Some(proxy) = build_proxy(&config, transport)? {
            services = services.with_proxy(Arc::new(proxy));
        }

        let dispatcher = Dispatcher::new(registry, services.clone())
            .with_config(config.dispatcher_config())
            .with_roles(Arc::new(StaticRoles::from_config(&config.permissions)));
        match dispatcher.restore_cooldowns().await {
            Ok(0) => {}
            Ok(restored) => info!(restored, "Restored cooldowns"),
            Err(e) => warn!(error = %e, "Failed to restore cooldowns"),
        }
        let dispatcher = Arc::new(dispatcher);

        start_channels(&channels, &inbox).await?;

        let shutdown = CancellationToken::new();
        let scheduler_handle = scheduler.handle();
        let scheduler_task = tokio::spawn(scheduler.run(services, shutdown.child_token()));
        let router = Router::new(Arc::clone(&dispatcher))
            .idle_timeout(Duration::from_secs(config.dispatch.room_idle_secs));
        let router_task = tokio::spawn(router.run(inbound, shutdown.child_token()));

        info!(
            bot = %config.bot.name,
            prefix = %config.dispatcher_config().active_prefix(),
            channels = channels.len(),
            commands = dispatcher.registry().len(),
            jobs = scheduler_handle.jobs().len(),
            "Runtime started"
        );

        Ok(RuntimeHandle {
            dispatcher,
            scheduler: scheduler_handle,
            courier,
            inbox,
            channels,
            shutdown,
            tasks: vec![("router", router_task), ("scheduler", scheduler_task)],
        })
    }
}

impl std::fmt::Debug for HypeRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HypeRuntime")
            .field("bot", &self.config.bot.name)
            .field("channels", &self.channels.len())
            .field("plugins", &self.plugins.len())
            .finish_non_exhaustive()
    }
}

fn register_plugins(
    config: &HypeConfig,
    plugins: &[Arc<dyn Plugin>],
    scheduler: &Scheduler,
) -> RuntimeResult<Arc<Registry>> {
    let mut registrar = Registrar::new();
    for plugin in plugins {
        registrar.plugin(plugin.as_ref())?;
    }
    let (mut commands, jobs) = registrar.into_parts();
    commands.overrides(config.commands.clone());
    let registry = commands.build()?;
    for job in jobs {
        scheduler.add_job(job)?;
    }
    Ok(registry)
}

async fn open_store(config: &HypeConfig) -> RuntimeResult<Arc<dyn Store>> {
    let store: Arc<dyn Store> = match config.storage.engine {
        StorageEngine::Memory => Arc::new(MemoryStore::new()),
        StorageEngine::File => {
            debug!(path = %config.storage.path.display(), "Opening file store");
            Arc::new(FileStore::open(&config.storage.path).await?)
        }
    };
    Ok(store)
}

/// Builds the proxy when destinations are configured.
fn build_proxy(
    config: &HypeConfig,
    transport: Option<Arc<dyn Transport>>,
) -> RuntimeResult<Option<Proxy>> {
    if config.proxy.destinations.is_empty() {
        return Ok(None);
    }
    let mut builder = Proxy::builder().cache_capacity(config.proxy.cache_capacity);
    if let Some(transport) = transport {
        builder = builder.transport(transport);
    }
    for endpoint in config.proxy.endpoints() {
        builder = builder.endpoint(endpoint);
    }
    Ok(Some(builder.build()?))
}

/// Starts every channel; on failure stops the ones already started.
async fn start_channels(channels: &[BoxedChannel], inbox: &Inbox) -> RuntimeResult<()> {
    for (started, channel) in channels.iter().enumerate() {
        if let Err(source) = channel.start(inbox.clone()).await {
            error!(channel = %channel.id(), error = %source, "Failed to start channel");
            for running in &channels[..started] {
                running.stop().await;
            }
            return Err(RuntimeError::Channel {
                channel: channel.id().to_string(),
                source,
            });
        }
        info!(channel = %channel.id(), "Channel started");
    }
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM.
async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = signal::ctrl_c() => info!("Received Ctrl+C, shutting down"),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
                if let Err(e) = signal::ctrl_c().await {
                    error!(error = %e, "Failed to listen for Ctrl+C");
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
        }
        info!("Received Ctrl+C, shutting down");
    }
}

// =============================================================================
// RuntimeHandle
// =============================================================================

/// A started bot.
pub struct RuntimeHandle {
    dispatcher: Arc<Dispatcher>,
    scheduler: SchedulerHandle,
    courier: Courier,
    inbox: Inbox,
    channels: Vec<BoxedChannel>,
    shutdown: CancellationToken,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl RuntimeHandle {
    /// The dispatcher; commands can be toggled through its registry.
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Handle for listing and toggling jobs.
    pub fn scheduler(&self) -> &SchedulerHandle {
        &self.scheduler
    }

    /// Courier for sending outside of a handler.
    pub fn courier(&self) -> &Courier {
        &self.courier
    }

    /// Inbox feeding the router, for injecting messages.
    pub fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    /// Stops the router and scheduler, waits for in-flight messages, then
    /// stops the channels.
    pub async fn shutdown(self) {
        info!("Stopping Hype runtime");
        self.shutdown.cancel();
        for (name, task) in self.tasks {
            if let Err(e) = task.await {
                error!(task = name, error = %e, "Runtime task failed");
            }
        }
        for channel in &self.channels {
            channel.stop().await;
            debug!(channel = %channel.id(), "Channel stopped");
        }
        info!("Runtime stopped");
    }
}

impl std::fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("channels", &self.channels.len())
            .field("stopped", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for [`HypeRuntime`].
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<HypeConfig>,
    channels: Vec<BoxedChannel>,
    plugins: Vec<Arc<dyn Plugin>>,
    store: Option<Arc<dyn Store>>,
    transport: Option<Arc<dyn Transport>>,
    clock: Option<SharedClock>,
    init_logging: bool,
}

impl RuntimeBuilder {
    /// Creates a builder that loads configuration from the default locations.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            config: None,
            channels: Vec::new(),
            plugins: Vec::new(),
            store: None,
            transport: None,
            clock: None,
            init_logging: true,
        }
    }

    /// Uses `config` as is instead of loading one.
    pub fn config(mut self, config: HypeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile.
    pub fn profile(mut self, profile: impl AsRef<str>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges configuration over every loaded source.
    pub fn merge(mut self, config: HypeConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Adds a chat backend.
    pub fn channel(self, channel: impl Channel + 'static) -> Self {
        self.shared_channel(Arc::new(channel))
    }

    /// Adds a shared chat backend.
    pub fn shared_channel(mut self, channel: BoxedChannel) -> Self {
        self.channels.push(channel);
        self
    }

    /// Adds a plugin.
    pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.plugins.push(Arc::new(plugin));
        self
    }

    /// Uses `store` instead of the configured engine.
    pub fn store(mut self, store: Arc<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the wire transport behind the proxy.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Sets the clock used for cooldowns and scheduling.
    pub fn clock(mut self, clock: SharedClock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Skips installing the global log subscriber.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    /// Loads configuration and builds the runtime.
    pub fn build(self) -> RuntimeResult<HypeRuntime> {
        let config = match self.config {
            Some(config) => {
                validate_config(&config)?;
                config
            }
            None => self.config_loader.load()?,
        };
        if self.init_logging {
            logging::init_from_config(&config.logging);
        }
        info!(
            bot = %config.bot.name,
            log_level = %config.logging.level,
            storage = ?config.storage.engine,
            "Runtime configured"
        );

        Ok(HypeRuntime {
            config,
            channels: self.channels,
            plugins: self.plugins,
            store: self.store,
            transport: self.transport,
            clock: self.clock.unwrap_or_else(|| Arc::new(mockable::DefaultClock)),
        })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RuntimeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeBuilder")
            .field("config_loader", &self.config_loader)
            .field("channels", &self.channels.len())
            .field("plugins", &self.plugins.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;
    use hype_core::{
        Ack, ChannelId, Content, Destination, Inbound, Reply, Room, SendError, SendResult, User,
    };
    use hype_framework::{
        Command, CommandOverride, HandlerResult, JobContext, RegistryError, RegistryResult,
        RequestContext, Role, ScheduledJob, Trigger,
    };
    use parking_lot::Mutex;
    use tokio::sync::Notify;

    use super::*;

    struct TestChannel {
        id: &'static str,
        fail_start: bool,
        inbox: Mutex<Option<Inbox>>,
        sent: Mutex<Vec<(Destination, String)>>,
        delivered: Notify,
        stopped: AtomicBool,
    }

    impl TestChannel {
        fn new(id: &'static str) -> Arc<Self> {
            Self::with_start(id, false)
        }

        fn failing(id: &'static str) -> Arc<Self> {
            Self::with_start(id, true)
        }

        fn with_start(id: &'static str, fail_start: bool) -> Arc<Self> {
            Arc::new(Self {
                id,
                fail_start,
                inbox: Mutex::new(None),
                sent: Mutex::new(Vec::new()),
                delivered: Notify::new(),
                stopped: AtomicBool::new(false),
            })
        }

        fn say(&self, room: Room, user: &str, text: &str) {
            let inbox = self.inbox.lock().clone().unwrap();
            inbox.push(Inbound::new(room, User::new(user), text)).unwrap();
        }

        async fn next_reply(&self) -> (Destination, String) {
            loop {
                let notified = self.delivered.notified();
                if let Some(reply) = {
                    let mut sent = self.sent.lock();
                    (!sent.is_empty()).then(|| sent.remove(0))
                } {
                    return reply;
                }
                tokio::time::timeout(Duration::from_secs(5), notified)
                    .await
                    .expect("no reply delivered");
            }
        }
    }

    #[async_trait]
    impl Channel for TestChannel {
        fn id(&self) -> ChannelId {
            ChannelId::new(self.id)
        }

        async fn start(&self, inbox: Inbox) -> SendResult<()> {
            if self.fail_start {
                return Err(SendError::Rejected("connection refused".into()));
            }
            *self.inbox.lock() = Some(inbox);
            Ok(())
        }

        async fn send(&self, to: &Destination, content: &Content) -> SendResult<Ack> {
            self.sent.lock().push((to.clone(), content.to_plain_text()));
            self.delivered.notify_one();
            Ok(Ack::default())
        }

        async fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
        }
    }

    async fn ping(_ctx: RequestContext) -> HandlerResult {
        Ok(Reply::text("pong"))
    }

    async fn secret(_ctx: RequestContext) -> HandlerResult {
        Ok(Reply::text("the cake is a lie"))
    }

    async fn announce(_ctx: JobContext) -> HandlerResult {
        Ok(Reply::to(
            Destination::Room(Room::public("test", "#news")),
            "news!",
        ))
    }

    struct Basics;

    impl Plugin for Basics {
        fn name(&self) -> &str {
            "basics"
        }

        fn register(&self, r: &mut Registrar) -> RegistryResult<()> {
            r.command(Command::new("ping", ping))?
                .command(Command::new("secret", secret))?;
            r.job(ScheduledJob::new(
                "announce",
                Trigger::Interval(Duration::from_secs(3600)),
                announce,
            ))?;
            Ok(())
        }
    }

    fn config() -> HypeConfig {
        let mut config = HypeConfig::default();
        config.permissions.owners = vec!["test:root".into()];
        config.commands.insert(
            "secret".into(),
            CommandOverride {
                permission: Some(Role::Owner),
                aliases: vec!["s".into()],
                ..Default::default()
            },
        );
        config
    }

    fn runtime(channel: &Arc<TestChannel>) -> HypeRuntime {
        HypeRuntime::builder()
            .config(config())
            .without_logging()
            .shared_channel(channel.clone())
            .plugin(Basics)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_end_to_end_dispatch() {
        let channel = TestChannel::new("test");
        let handle = runtime(&channel).start().await.unwrap();
        let room = Room::public("test", "#hype");

        channel.say(room.clone(), "alice", "!pi");
        let (to, text) = channel.next_reply().await;
        assert_eq!(to, Destination::Room(room.clone()));
        assert_eq!(text, "pong");

        channel.say(room.clone(), "alice", "!s");
        let (_, text) = channel.next_reply().await;
        assert_eq!(text, "You don't have permission to use that command.");

        channel.say(room.clone(), "root", "!s");
        let (_, text) = channel.next_reply().await;
        assert_eq!(text, "the cake is a lie");

        assert_eq!(handle.scheduler().jobs().len(), 1);
        handle.shutdown().await;
        assert!(channel.stopped.load(Ordering::SeqCst));
    }

    async fn relay(ctx: RequestContext) -> HandlerResult {
        ctx.reenter("!ping")?;
        Ok(Reply::text("relayed"))
    }

    struct Relay;

    impl Plugin for Relay {
        fn name(&self) -> &str {
            "relay"
        }

        fn register(&self, r: &mut Registrar) -> RegistryResult<()> {
            r.command(Command::new("relay", relay))?;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_handler_can_trigger_command_in_own_room() {
        let channel = TestChannel::new("test");
        let handle = HypeRuntime::builder()
            .config(config())
            .without_logging()
            .shared_channel(channel.clone())
            .plugin(Basics)
            .plugin(Relay)
            .build()
            .unwrap()
            .start()
            .await
            .unwrap();
        let room = Room::public("test", "#hype");

        channel.say(room.clone(), "alice", "!relay");
        assert_eq!(channel.next_reply().await, (Destination::Room(room.clone()), "relayed".into()));
        assert_eq!(channel.next_reply().await, (Destination::Room(room.clone()), "pong".into()));

        // The room worker is free again afterwards.
        channel.say(room.clone(), "alice", "!ping");
        assert_eq!(channel.next_reply().await.1, "pong");
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_cooldowns_survive_restart() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config();
        config.storage.engine = StorageEngine::File;
        config.storage.path = dir.path().join("data.json");
        config.commands.insert(
            "ping".into(),
            CommandOverride {
                cooldown_secs: Some(120),
                ..Default::default()
            },
        );
        let room = Room::public("test", "#hype");

        for expected in ["pong", "ping is on cooldown"] {
            let channel = TestChannel::new("test");
            let handle = HypeRuntime::builder()
                .config(config.clone())
                .without_logging()
                .shared_channel(channel.clone())
                .plugin(Basics)
                .build()
                .unwrap()
                .start()
                .await
                .unwrap();

            channel.say(room.clone(), "alice", "!ping");
            let (_, text) = channel.next_reply().await;
            assert!(text.starts_with(expected), "unexpected reply: {text}");
            handle.shutdown().await;
        }
    }

    #[tokio::test]
    async fn test_run_until_stops_channels() {
        let channel = TestChannel::new("test");
        runtime(&channel).run_until(async {}).await.unwrap();
        assert!(channel.stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_failed_channel_start_stops_others() {
        let good = TestChannel::new("good");
        let bad = TestChannel::failing("bad");
        let err = HypeRuntime::builder()
            .config(HypeConfig::default())
            .without_logging()
            .shared_channel(good.clone())
            .shared_channel(bad.clone())
            .build()
            .unwrap()
            .start()
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Channel { ref channel, .. } if channel == "bad"));
        assert!(good.stopped.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_duplicate_channels_and_commands() {
        let channel = TestChannel::new("test");
        let err = HypeRuntime::builder()
            .config(HypeConfig::default())
            .without_logging()
            .shared_channel(channel.clone())
            .shared_channel(channel.clone())
            .build()
            .unwrap()
            .start()
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::DuplicateChannel(_)));

        let err = HypeRuntime::builder()
            .config(HypeConfig::default())
            .without_logging()
            .plugin(Basics)
            .plugin(Basics)
            .build()
            .unwrap()
            .start()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Registry(RegistryError::DuplicateCommand(_))
        ));
    }

    #[tokio::test]
    async fn test_override_for_unknown_command_fails() {
        let mut config = HypeConfig::default();
        config
            .commands
            .insert("nope".into(), CommandOverride::default());
        let err = HypeRuntime::builder()
            .config(config)
            .without_logging()
            .plugin(Basics)
            .build()
            .unwrap()
            .start()
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Registry(RegistryError::UnknownCommand(_))));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = HypeConfig::default();
        config.bot.prefix = String::new();
        let err = HypeRuntime::builder()
            .config(config)
            .without_logging()
            .build()
            .unwrap_err();
        assert!(matches!(err, RuntimeError::Config(_)));
    }
}
