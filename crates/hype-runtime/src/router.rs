//! Per-room message routing.
//!
//! Every room gets its own worker task with its own queue, so messages of a
//! room are dispatched one at a time and in arrival order, while different
//! rooms proceed concurrently. A worker that has been idle for the configured
//! period exits; the next message for its room starts a fresh one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use hype_core::Inbound;
use hype_framework::{Dispatcher, Outcome};
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, trace};

/// Routes inbound messages to per-room workers.
pub struct Router {
    dispatcher: Arc<Dispatcher>,
    idle_timeout: Duration,
}

impl Router {
    /// Creates a router with a five minute idle timeout.
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            idle_timeout: Duration::from_secs(300),
        }
    }

    /// Sets how long an idle room worker is kept.
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Drains `inbound` until it closes or `shutdown` is cancelled, then
    /// waits for in-flight dispatches to finish.
    pub async fn run(self, mut inbound: mpsc::UnboundedReceiver<Inbound>, shutdown: CancellationToken) {
        let mut rooms: HashMap<String, mpsc::UnboundedSender<Inbound>> = HashMap::new();
        let mut workers = JoinSet::new();
        info!("Router started");

        loop {
            let message = tokio::select! {
                _ = shutdown.cancelled() => break,
                message = inbound.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            let key = message.room.key();
            let message = match rooms.get(&key) {
                Some(tx) => match tx.send(message) {
                    Ok(()) => continue,
                    // The worker timed out between our lookup and the send.
                    Err(mpsc::error::SendError(message)) => message,
                },
                None => message,
            };

            rooms.retain(|_, tx| !tx.is_closed());
            let (tx, rx) = mpsc::unbounded_channel();
            // A fresh receiver cannot be closed yet.
            let _ = tx.send(message);
            debug!(room = %key, active = rooms.len() + 1, "Starting room worker");
            let span = info_span!("room", room = %key);
            workers.spawn(
                room_worker(
                    Arc::clone(&self.dispatcher),
                    rx,
                    self.idle_timeout,
                    shutdown.clone(),
                )
                .instrument(span),
            );
            rooms.insert(key, tx);

            while let Some(result) = workers.try_join_next() {
                log_worker_result(result);
            }
        }

        drop(rooms);
        while let Some(result) = workers.join_next().await {
            log_worker_result(result);
        }
        info!("Router stopped");
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("idle_timeout", &self.idle_timeout)
            .finish_non_exhaustive()
    }
}

async fn room_worker(
    dispatcher: Arc<Dispatcher>,
    mut rx: mpsc::UnboundedReceiver<Inbound>,
    idle_timeout: Duration,
    shutdown: CancellationToken,
) {
    loop {
        let message = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                rx.close();
                return;
            }
            message = tokio::time::timeout(idle_timeout, rx.recv()) => match message {
                Ok(Some(message)) => message,
                Ok(None) => break,
                Err(_) => {
                    trace!("Room worker idle, exiting");
                    break;
                }
            },
        };
        dispatch(&dispatcher, message).await;
    }
    retire(&dispatcher, rx).await;
}

/// Closes the queue so the router sees a closed sender, then dispatches
/// whatever was sent before the close.
async fn retire(dispatcher: &Dispatcher, mut rx: mpsc::UnboundedReceiver<Inbound>) {
    rx.close();
    while let Ok(message) = rx.try_recv() {
        dispatch(dispatcher, message).await;
    }
}

async fn dispatch(dispatcher: &Dispatcher, message: Inbound) {
    match dispatcher.dispatch(message).await {
        Outcome::Completed { command, delivered } => {
            trace!(%command, delivered, "Message dispatched");
        }
        Outcome::Rejected(reason) => debug!(%reason, "Message rejected"),
        Outcome::NotCommand => {}
    }
}

fn log_worker_result(result: Result<(), JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "Room worker failed");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::FixedOffset;
    use hype_core::{
        Ack, Channel, ChannelId, Content, Destination, Inbox, MemoryStore, Reply, Room, SendResult,
        User,
    };
    use hype_framework::{
        Command, Courier, HandlerError, RegistryBuilder, RequestContext, Scheduler, Services,
    };
    use parking_lot::Mutex;
    use tokio::sync::Notify;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(Destination, String)>>,
    }

    #[async_trait]
    impl Channel for Recorder {
        fn id(&self) -> ChannelId {
            ChannelId::new("test")
        }

        async fn start(&self, _inbox: Inbox) -> SendResult<()> {
            Ok(())
        }

        async fn send(&self, to: &Destination, content: &Content) -> SendResult<Ack> {
            self.sent.lock().push((to.clone(), content.to_plain_text()));
            Ok(Ack::default())
        }
    }

    fn dispatcher(commands: Vec<Command>) -> (Arc<Dispatcher>, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let courier = Courier::new();
        courier.register(recorder.clone());
        let scheduler = Scheduler::new(
            Arc::new(mockable::DefaultClock),
            FixedOffset::east_opt(0).unwrap(),
        );
        let services = Services::new(Arc::new(MemoryStore::new()), courier, scheduler.handle());
        let mut builder = RegistryBuilder::new();
        for command in commands {
            builder.command(command).unwrap();
        }
        (
            Arc::new(Dispatcher::new(builder.build().unwrap(), services)),
            recorder,
        )
    }

    fn message(room: &str, text: &str) -> Inbound {
        Inbound::new(Room::public("test", room), User::new("u"), text)
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_in_a_room_stay_ordered() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = {
            let seen = seen.clone();
            move |ctx: RequestContext| {
                let seen = seen.clone();
                async move {
                    let n: u64 = ctx.arg(0).unwrap_or("0").parse().unwrap_or(0);
                    // Later messages finish sooner if run concurrently.
                    tokio::time::sleep(Duration::from_millis(100 - n * 10)).await;
                    seen.lock().push(n);
                    Ok::<_, HandlerError>(Reply::none())
                }
            }
        };
        let (dispatcher, _) = dispatcher(vec![Command::new("record", record)]);

        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let router = tokio::spawn(Router::new(dispatcher).run(rx, shutdown.clone()));

        for n in 1..=5 {
            tx.send(message("#a", &format!("!record {n}"))).unwrap();
        }
        drop(tx);
        router.await.unwrap();

        assert_eq!(*seen.lock(), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_slow_room_does_not_block_others() {
        let gate = Arc::new(Notify::new());
        let slow = {
            let gate = gate.clone();
            move |_ctx: RequestContext| {
                let gate = gate.clone();
                async move {
                    gate.notified().await;
                    Ok::<_, HandlerError>("slow done")
                }
            }
        };
        let fast_done = Arc::new(Notify::new());
        let fast = {
            let fast_done = fast_done.clone();
            move |_ctx: RequestContext| {
                let fast_done = fast_done.clone();
                async move {
                    fast_done.notify_one();
                    Ok::<_, HandlerError>("fast done")
                }
            }
        };
        let (dispatcher, recorder) =
            dispatcher(vec![Command::new("slow", slow), Command::new("fast", fast)]);

        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let router = tokio::spawn(Router::new(dispatcher).run(rx, shutdown.clone()));

        tx.send(message("#a", "!slow")).unwrap();
        tx.send(message("#b", "!fast")).unwrap();
        tokio::time::timeout(Duration::from_secs(5), fast_done.notified())
            .await
            .expect("fast room was blocked");

        gate.notify_one();
        drop(tx);
        router.await.unwrap();

        let texts: Vec<String> = recorder.sent.lock().iter().map(|(_, t)| t.clone()).collect();
        assert!(texts.contains(&"fast done".to_string()));
        assert!(texts.contains(&"slow done".to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_worker_is_replaced() {
        let calls = Arc::new(AtomicUsize::new(0));
        let count = {
            let calls = calls.clone();
            move |_ctx: RequestContext| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, HandlerError>(Reply::none())
                }
            }
        };
        let (dispatcher, _) = dispatcher(vec![Command::new("count", count)]);

        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let router = tokio::spawn(
            Router::new(dispatcher)
                .idle_timeout(Duration::from_secs(1))
                .run(rx, shutdown.clone()),
        );

        tx.send(message("#a", "!count")).unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        tx.send(message("#a", "!count")).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        shutdown.cancel();
        router.await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_retiring_worker_dispatches_queued_messages() {
        let calls = Arc::new(AtomicUsize::new(0));
        let count = {
            let calls = calls.clone();
            move |_ctx: RequestContext| {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, HandlerError>(Reply::none())
                }
            }
        };
        let (dispatcher, _) = dispatcher(vec![Command::new("count", count)]);

        // Sends that land after the idle timeout but before the close.
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(message("#a", "!count")).unwrap();
        tx.send(message("#a", "!count")).unwrap();
        retire(&dispatcher, rx).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(tx.is_closed());
        assert!(tx.send(message("#a", "!count")).is_err());
    }
}
