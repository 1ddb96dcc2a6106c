use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use syncline_engine::remote::mock::MockRemote;
use syncline_engine::{
    ConnectionMonitor, EngineConfig, InProcessBus, PeerBus, PeerMessage, PendingWriteQueue,
    QueueStore, StatusPublisher, SubscriptionManager, SyncStatus,
};
use syncline_types::InstanceId;
use tokio::sync::{broadcast, mpsc};

struct CountingBus {
    inner: InProcessBus,
    published: AtomicUsize,
}

impl CountingBus {
    fn new() -> Self {
        Self {
            inner: InProcessBus::new(),
            published: AtomicUsize::new(0),
        }
    }

    fn published(&self) -> usize {
        self.published.load(Ordering::SeqCst)
    }
}

impl PeerBus for CountingBus {
    fn publish(&self, message: PeerMessage) {
        self.published.fetch_add(1, Ordering::SeqCst);
        self.inner.publish(message);
    }

    fn subscribe(&self) -> broadcast::Receiver<PeerMessage> {
        self.inner.subscribe()
    }
}

fn publisher() -> (StatusPublisher, Arc<CountingBus>) {
    let remote = Arc::new(MockRemote::new());
    let (events_tx, _events_rx) = mpsc::channel(16);
    let subscriptions = Arc::new(SubscriptionManager::new(
        remote.clone(),
        vec!["companies".into()],
        events_tx,
    ));
    let queue = Arc::new(PendingWriteQueue::new(
        QueueStore::open_in_memory().unwrap(),
        remote.clone(),
        5,
    ));
    let config = EngineConfig {
        tracked_collections: vec!["companies".into()],
        ..Default::default()
    };
    let monitor = Arc::new(ConnectionMonitor::new(remote, subscriptions, queue.clone(), &config));
    let bus = Arc::new(CountingBus::new());
    let publisher = StatusPublisher::new(monitor, queue, bus.clone(), InstanceId::new());
    (publisher, bus)
}

// ── Defaults and local computation ───────────────────────────────

#[tokio::test]
async fn starts_offline() {
    let (publisher, _) = publisher();
    assert_eq!(publisher.current(), SyncStatus::Offline);
}

#[tokio::test]
async fn refresh_on_a_disconnected_monitor_stays_offline_without_emitting() {
    let (publisher, bus) = publisher();
    let mut rx = publisher.subscribe();

    publisher.refresh().await;

    assert_eq!(publisher.current(), SyncStatus::Offline);
    // no transition, so no emission and no announcement
    assert!(rx.try_recv().is_err());
    assert_eq!(bus.published(), 0);
}

// ── Transitions ──────────────────────────────────────────────────

#[tokio::test]
async fn transitions_are_emitted_and_announced() {
    let (publisher, bus) = publisher();
    let mut rx = publisher.subscribe();

    publisher.note_peer_status(SyncStatus::Connected); // move off Offline first
    assert_eq!(rx.recv().await.unwrap(), SyncStatus::Connected);

    publisher.refresh().await; // monitor is Disconnected -> back to Offline
    assert_eq!(rx.recv().await.unwrap(), SyncStatus::Offline);
    // refresh announces; the peer adoption above did not
    assert_eq!(bus.published(), 1);
}

#[tokio::test]
async fn duplicate_status_is_not_re_emitted() {
    let (publisher, bus) = publisher();
    let mut rx = publisher.subscribe();

    publisher.note_peer_status(SyncStatus::Degraded);
    publisher.note_peer_status(SyncStatus::Degraded);

    assert_eq!(rx.recv().await.unwrap(), SyncStatus::Degraded);
    assert!(rx.try_recv().is_err());
    assert_eq!(bus.published(), 0);
}

// ── Peer convergence ─────────────────────────────────────────────

#[tokio::test]
async fn peer_announcements_are_adopted_without_re_announcing() {
    let (publisher, bus) = publisher();

    publisher.note_peer_status(SyncStatus::Syncing);

    assert_eq!(publisher.current(), SyncStatus::Syncing);
    // adopting a sibling's status must not bounce it back onto the bus
    assert_eq!(bus.published(), 0);
}

// ── Shutdown reporting ───────────────────────────────────────────

#[tokio::test]
async fn mark_offline_reports_locally_without_announcing() {
    let (publisher, bus) = publisher();
    publisher.note_peer_status(SyncStatus::Connected);

    publisher.mark_offline();

    assert_eq!(publisher.current(), SyncStatus::Offline);
    assert_eq!(bus.published(), 0);
}
