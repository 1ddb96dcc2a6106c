use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use syncline_engine::remote::mock::MockRemote;
use syncline_engine::{
    ChangeRouter, InProcessBus, LocalCache, MemoryCache, PeerBus, PeerMessage, PeerPayload,
    PendingWriteQueue, QueueStore, SyncError,
};
use syncline_types::{ChangeEvent, InstanceId, Origin, PendingWrite, Record};
use tokio::sync::broadcast;

fn record(id: &str, name: &str) -> Record {
    Record::from_value(json!({ "id": id, "owner": "user-1", "name": name })).unwrap()
}

/// Bus wrapper that counts publishes, for relay-amplification assertions.
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

struct Fixture {
    cache: Arc<MemoryCache>,
    bus: Arc<CountingBus>,
    queue: Arc<PendingWriteQueue>,
    router: ChangeRouter,
}

fn fixture() -> Fixture {
    let cache = Arc::new(MemoryCache::new());
    let bus = Arc::new(CountingBus::new());
    let queue = Arc::new(PendingWriteQueue::new(
        QueueStore::open_in_memory().unwrap(),
        Arc::new(MockRemote::new()),
        5,
    ));
    let router = ChangeRouter::new(cache.clone(), bus.clone(), queue.clone(), InstanceId::new());
    Fixture {
        cache,
        bus,
        queue,
        router,
    }
}

// ── Cache translation ────────────────────────────────────────────

#[tokio::test]
async fn insert_becomes_an_upsert_keyed_by_id() {
    let f = fixture();
    let event = ChangeEvent::insert("companies", record("c1", "Acme"), Origin::Remote);

    f.router.apply(event).await.unwrap();

    let stored = f.cache.get("companies", "c1").await.unwrap().unwrap();
    assert_eq!(stored.get("name"), Some(&json!("Acme")));
}

#[tokio::test]
async fn update_overwrites_by_id() {
    let f = fixture();
    f.router
        .apply(ChangeEvent::insert("companies", record("c1", "Acme"), Origin::Remote))
        .await
        .unwrap();
    f.router
        .apply(ChangeEvent::update(
            "companies",
            record("c1", "Acme GmbH"),
            Some(record("c1", "Acme")),
            Origin::Remote,
        ))
        .await
        .unwrap();

    let stored = f.cache.get("companies", "c1").await.unwrap().unwrap();
    assert_eq!(stored.get("name"), Some(&json!("Acme GmbH")));
    assert_eq!(f.cache.len(), 1);
}

#[tokio::test]
async fn delete_removes_by_id() {
    let f = fixture();
    f.router
        .apply(ChangeEvent::insert("companies", record("c1", "Acme"), Origin::Remote))
        .await
        .unwrap();
    f.router
        .apply(ChangeEvent::delete("companies", record("c1", "Acme"), Origin::Remote))
        .await
        .unwrap();

    assert!(f.cache.get("companies", "c1").await.unwrap().is_none());
}

// ── Idempotence ──────────────────────────────────────────────────

#[tokio::test]
async fn applying_the_same_event_twice_is_idempotent() {
    let f = fixture();
    let event = ChangeEvent::insert("companies", record("c1", "Acme"), Origin::Remote);

    f.router.apply(event.clone()).await.unwrap();
    f.router.apply(event).await.unwrap();

    assert_eq!(f.cache.len(), 1);
    let stored = f.cache.get("companies", "c1").await.unwrap().unwrap();
    assert_eq!(stored.get("name"), Some(&json!("Acme")));
}

#[tokio::test]
async fn duplicate_delete_is_idempotent() {
    let f = fixture();
    let event = ChangeEvent::delete("companies", record("c1", "Acme"), Origin::Remote);

    f.router.apply(event.clone()).await.unwrap();
    f.router.apply(event).await.unwrap();

    assert!(f.cache.get("companies", "c1").await.unwrap().is_none());
}

// ── Echo guard ───────────────────────────────────────────────────

#[tokio::test]
async fn remote_applies_never_propagate_upstream() {
    let f = fixture();
    f.router
        .apply(ChangeEvent::insert("companies", record("c1", "Acme"), Origin::Remote))
        .await
        .unwrap();
    f.router
        .apply(ChangeEvent::delete("companies", record("c1", "Acme"), Origin::Peer))
        .await
        .unwrap();

    assert!(f.cache.unguarded_writes().is_empty());
}

// ── Rebroadcast gating ───────────────────────────────────────────

#[tokio::test]
async fn remote_event_is_rebroadcast_with_peer_origin() {
    let f = fixture();
    let mut rx = f.bus.subscribe();

    f.router
        .apply(ChangeEvent::insert("companies", record("c1", "Acme"), Origin::Remote))
        .await
        .unwrap();

    assert_eq!(f.bus.published(), 1);
    let message = rx.recv().await.unwrap();
    match message.payload {
        PeerPayload::Change(event) => assert_eq!(event.origin, Origin::Peer),
        other => panic!("expected change payload, got {other:?}"),
    }
}

#[tokio::test]
async fn peer_event_is_never_rebroadcast() {
    let f = fixture();
    let event = ChangeEvent::insert("companies", record("c1", "Acme"), Origin::Peer);

    // repeated peer delivery must not amplify
    for _ in 0..10 {
        f.router.apply(event.clone()).await.unwrap();
    }

    assert_eq!(f.bus.published(), 0);
}

// ── Listener notification ────────────────────────────────────────

#[tokio::test]
async fn listeners_see_applied_changes() {
    let f = fixture();
    let mut rx = f.router.subscribe();

    let event = ChangeEvent::insert("companies", record("c1", "Acme"), Origin::Remote);
    f.router.apply(event.clone()).await.unwrap();

    let seen = rx.recv().await.unwrap();
    assert_eq!(seen.collection, "companies");
    assert_eq!(seen.record_id(), Some("c1"));
}

#[tokio::test]
async fn dropped_receiver_unsubscribes() {
    let f = fixture();
    let rx = f.router.subscribe();
    drop(rx);

    // apply succeeds with nobody listening
    f.router
        .apply(ChangeEvent::insert("companies", record("c1", "Acme"), Origin::Remote))
        .await
        .unwrap();
}

// ── Translation failures ─────────────────────────────────────────

#[tokio::test]
async fn event_without_record_id_is_rejected() {
    let f = fixture();
    let no_id = Record::from_value(json!({ "name": "nameless" })).unwrap();
    let event = ChangeEvent::insert("companies", no_id, Origin::Remote);

    let err = f.router.apply(event).await.unwrap_err();
    assert!(matches!(err, SyncError::Translation(_)));
    assert_eq!(f.cache.len(), 0);
    assert_eq!(f.bus.published(), 0);
}

#[tokio::test]
async fn local_origin_events_are_rejected() {
    let f = fixture();
    let event = ChangeEvent::insert("companies", record("c1", "Acme"), Origin::Local);

    let err = f.router.apply(event).await.unwrap_err();
    assert!(matches!(err, SyncError::Translation(_)));
}

#[tokio::test]
async fn bad_event_does_not_block_subsequent_events() {
    let f = fixture();
    let no_id = Record::from_value(json!({ "name": "nameless" })).unwrap();
    let _ = f
        .router
        .apply(ChangeEvent::insert("companies", no_id, Origin::Remote))
        .await;

    f.router
        .apply(ChangeEvent::insert("companies", record("c2", "Beta"), Origin::Remote))
        .await
        .unwrap();
    assert_eq!(f.cache.len(), 1);
}

// ── Last-write-wins against pending writes ───────────────────────

#[tokio::test]
async fn newer_pending_write_survives_older_remote_change() {
    let f = fixture();
    f.queue
        .enqueue(PendingWrite::upsert("companies", record("c1", "local edit")))
        .await
        .unwrap();

    let stale = ChangeEvent::insert("companies", record("c1", "remote"), Origin::Remote)
        .with_observed_at(Utc::now() - ChronoDuration::seconds(60));
    f.router.apply(stale).await.unwrap();

    // remote change skipped: cache untouched, pending write intact
    assert!(f.cache.get("companies", "c1").await.unwrap().is_none());
    assert_eq!(f.queue.pending_count().await.unwrap(), 1);
    assert_eq!(f.bus.published(), 0);
}

#[tokio::test]
async fn newer_remote_change_drops_superseded_pending_writes() {
    let f = fixture();
    f.queue
        .enqueue(PendingWrite {
            enqueued_at: Utc::now() - ChronoDuration::seconds(60),
            ..PendingWrite::upsert("companies", record("c1", "stale local edit"))
        })
        .await
        .unwrap();

    let fresh = ChangeEvent::insert("companies", record("c1", "remote"), Origin::Remote);
    f.router.apply(fresh).await.unwrap();

    let stored = f.cache.get("companies", "c1").await.unwrap().unwrap();
    assert_eq!(stored.get("name"), Some(&json!("remote")));
    assert_eq!(f.queue.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn pending_writes_for_other_records_are_untouched() {
    let f = fixture();
    f.queue
        .enqueue(PendingWrite {
            enqueued_at: Utc::now() - ChronoDuration::seconds(60),
            ..PendingWrite::upsert("companies", record("c2", "other"))
        })
        .await
        .unwrap();

    f.router
        .apply(ChangeEvent::insert("companies", record("c1", "remote"), Origin::Remote))
        .await
        .unwrap();

    assert_eq!(f.queue.pending_count().await.unwrap(), 1);
}
