//! The sync engine.
//!
//! Composition root for the synchronization machinery: owns the
//! subscription manager, change router, pending-write queue, connection
//! monitor, and status publisher, and runs the loops that connect them.
//! The engine is an explicit object with constructor-injected configuration
//! and adapters; the composing application instantiates and owns it.

use crate::bus::{PeerBus, PeerPayload};
use crate::cache::LocalCache;
use crate::config::EngineConfig;
use crate::error::SyncResult;
use crate::monitor::{ConnectionMonitor, ConnectionState};
use crate::queue::{FlushReport, PendingWriteQueue};
use crate::queue_store::QueueStore;
use crate::remote::{ChangeFeed, RemoteWriter};
use crate::router::ChangeRouter;
use crate::status::{StatusPublisher, SyncStatus};
use crate::subscriptions::SubscriptionManager;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use syncline_types::{ChangeEvent, InstanceId, PendingWrite};
use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Buffered capacity for the feed event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The real-time, multi-device synchronization engine.
pub struct SyncEngine {
    instance: InstanceId,
    subscriptions: Arc<SubscriptionManager>,
    router: Arc<ChangeRouter>,
    queue: Arc<PendingWriteQueue>,
    monitor: Arc<ConnectionMonitor>,
    publisher: Arc<StatusPublisher>,
    bus: Arc<dyn PeerBus>,
    events_rx: Arc<Mutex<mpsc::Receiver<ChangeEvent>>>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    running: AtomicBool,
}

impl SyncEngine {
    /// Creates an engine over the given adapters.
    ///
    /// Configuration problems (empty tracked collections, zero intervals)
    /// are the only errors surfaced synchronously; everything after
    /// `start` is retried or reported through the status publisher.
    pub fn new(
        config: EngineConfig,
        cache: Arc<dyn LocalCache>,
        feed: Arc<dyn ChangeFeed>,
        writer: Arc<dyn RemoteWriter>,
        bus: Arc<dyn PeerBus>,
    ) -> SyncResult<Self> {
        config.validate()?;

        let instance = InstanceId::new();
        let store = QueueStore::open(&config.queue_storage)?;
        let queue = Arc::new(PendingWriteQueue::new(
            store,
            writer,
            config.max_write_attempts,
        ));
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let subscriptions = Arc::new(SubscriptionManager::new(
            feed.clone(),
            config.tracked_collections.clone(),
            events_tx,
        ));
        let router = Arc::new(ChangeRouter::new(
            cache,
            bus.clone(),
            queue.clone(),
            instance,
        ));
        let monitor = Arc::new(ConnectionMonitor::new(
            feed,
            subscriptions.clone(),
            queue.clone(),
            &config,
        ));
        let publisher = Arc::new(StatusPublisher::new(
            monitor.clone(),
            queue.clone(),
            bus.clone(),
            instance,
        ));
        let (shutdown, _) = watch::channel(true);

        Ok(Self {
            instance,
            subscriptions,
            router,
            queue,
            monitor,
            publisher,
            bus,
            events_rx: Arc::new(Mutex::new(events_rx)),
            shutdown,
            tasks: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
        })
    }

    /// The id of this engine instance.
    pub fn instance_id(&self) -> InstanceId {
        self.instance
    }

    /// Starts the engine for the given identity: opens one subscription per
    /// tracked collection and begins monitoring and replay. Calling start
    /// on a running engine is a no-op.
    pub async fn start(&self, identity: &str) -> SyncResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("sync engine already running");
            return Ok(());
        }
        info!(identity, instance = %self.instance, "starting sync engine");

        self.queue.resume();
        self.shutdown.send_replace(false);
        self.subscriptions.start(identity).await;

        let mut tasks = self.tasks.lock().await;
        tasks.push(self.spawn_apply_loop());
        tasks.push(self.spawn_bus_loop());
        tasks.push(self.spawn_status_loop());
        tasks.push(self.spawn_monitor());
        drop(tasks);

        self.publisher.refresh().await;
        Ok(())
    }

    /// Stops the engine: cancels subscriptions, the monitor, and any
    /// in-flight flush before returning. Safe to call from any state.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!(instance = %self.instance, "stopping sync engine");

        self.queue.cancel();
        self.shutdown.send_replace(true);
        self.monitor.hint_online(); // wake any sleeping loop so it can exit

        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().await.drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }

        self.subscriptions.stop().await;
        self.monitor.reset();
        self.publisher.mark_offline();
    }

    /// Subscribes to locally applied data changes. Dropping the receiver
    /// unsubscribes.
    pub fn on_data_change(&self) -> broadcast::Receiver<ChangeEvent> {
        self.router.subscribe()
    }

    /// Subscribes to status transitions. Dropping the receiver
    /// unsubscribes.
    pub fn on_status_change(&self) -> broadcast::Receiver<SyncStatus> {
        self.publisher.subscribe()
    }

    /// The currently displayed sync status.
    pub fn status(&self) -> SyncStatus {
        self.publisher.current()
    }

    /// The monitor's current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.monitor.state()
    }

    /// Queues a local write for replay against the remote store. If the
    /// engine is currently connected the queue is drained immediately.
    pub async fn queue_write(&self, write: PendingWrite) -> SyncResult<()> {
        self.queue.enqueue(write).await?;
        self.publisher.refresh().await;
        if self.monitor.state() == ConnectionState::Connected {
            if let Err(e) = self.queue.flush().await {
                warn!(error = %e, "immediate flush after queue_write failed");
            }
            self.publisher.refresh().await;
        }
        Ok(())
    }

    /// Nudges the monitor awake and, when connected, drains the queue now.
    pub async fn force_sync(&self) -> SyncResult<FlushReport> {
        self.monitor.hint_online();
        let report = match self.monitor.state() {
            ConnectionState::Connected | ConnectionState::Degraded => self.queue.flush().await?,
            _ => FlushReport::default(),
        };
        self.publisher.refresh().await;
        Ok(report)
    }

    /// Signals that the runtime believes connectivity is back (e.g. the
    /// hosting process regained foreground visibility).
    pub fn hint_online(&self) {
        self.monitor.hint_online();
    }

    /// Number of writes awaiting replay.
    pub async fn pending_write_count(&self) -> SyncResult<usize> {
        self.queue.pending_count().await
    }

    /// Writes that exhausted their replay attempts.
    pub async fn failed_writes(&self) -> SyncResult<Vec<PendingWrite>> {
        self.queue.failed_writes().await
    }

    fn spawn_apply_loop(&self) -> JoinHandle<()> {
        let events_rx = self.events_rx.clone();
        let router = self.router.clone();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            let mut rx = events_rx.lock().await;
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    event = rx.recv() => match event {
                        Some(event) => {
                            if let Err(e) = router.apply(event).await {
                                // translation/cache failures drop the event,
                                // never the loop
                                warn!(error = %e, "dropping unappliable feed event");
                            }
                        }
                        None => break,
                    }
                }
            }
        })
    }

    fn spawn_bus_loop(&self) -> JoinHandle<()> {
        let mut rx = self.bus.subscribe();
        let router = self.router.clone();
        let publisher = self.publisher.clone();
        let instance = self.instance;
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    message = rx.recv() => match message {
                        Ok(message) => {
                            if message.sender == instance {
                                continue;
                            }
                            match message.payload {
                                PeerPayload::Change(event) => {
                                    if let Err(e) = router.apply(event).await {
                                        warn!(error = %e, "dropping unappliable peer change");
                                    }
                                }
                                PeerPayload::Status(status) => {
                                    publisher.note_peer_status(status);
                                }
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(missed)) => {
                            // best-effort delivery: the feed re-converges us
                            warn!(missed, "peer bus lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        })
    }

    fn spawn_status_loop(&self) -> JoinHandle<()> {
        let publisher = self.publisher.clone();
        let queue = self.queue.clone();
        let mut state_rx = self.monitor.watch();
        let mut shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    }
                    changed = state_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        publisher.refresh().await;
                    }
                    _ = queue.changed().notified() => {
                        publisher.refresh().await;
                    }
                }
            }
        })
    }

    fn spawn_monitor(&self) -> JoinHandle<()> {
        let monitor = self.monitor.clone();
        let shutdown = self.shutdown.subscribe();
        tokio::spawn(async move {
            monitor.run(shutdown).await;
        })
    }
}
