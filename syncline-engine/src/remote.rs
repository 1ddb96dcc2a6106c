//! Remote store boundaries.
//!
//! Two consumed interfaces: the change-notification feed (subscriptions and
//! heartbeats) and the write path used only by queue flushes. The engine
//! works against these traits; the hosting application supplies the real
//! SDK-backed implementations.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use syncline_types::{ChangeEvent, Record};
use tokio::sync::mpsc;

/// Handle to one open feed subscription.
#[derive(Debug)]
pub struct FeedSubscription {
    /// The collection the subscription covers.
    pub collection: String,
    /// Feed-assigned identifier, opaque to the engine.
    pub id: u64,
}

/// The remote change-notification feed.
#[async_trait]
pub trait ChangeFeed: Send + Sync {
    /// Opens a subscription for one collection, filtered to records owned
    /// by `owner_filter`. Delivered events are pushed into `events`.
    async fn subscribe(
        &self,
        collection: &str,
        owner_filter: &str,
        events: mpsc::Sender<ChangeEvent>,
    ) -> SyncResult<FeedSubscription>;

    /// Closes a subscription.
    async fn unsubscribe(&self, subscription: FeedSubscription) -> SyncResult<()>;

    /// Probes the remote endpoint. `Err(SyncError::Timeout)` means no
    /// definitive answer; `Err(SyncError::Rejected)` means the endpoint
    /// answered and refused.
    async fn health_check(&self) -> SyncResult<()>;
}

/// The remote write path, used only when flushing queued writes.
#[async_trait]
pub trait RemoteWriter: Send + Sync {
    /// Inserts or replaces a record keyed by its id.
    async fn upsert(&self, collection: &str, record: &Record) -> SyncResult<()>;

    /// Removes a record.
    async fn delete(&self, collection: &str, id: &str) -> SyncResult<()>;
}

/// A scriptable remote for testing.
pub mod mock {
    use super::*;
    use std::collections::{HashMap, HashSet, VecDeque};
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex;

    /// Mock implementation of both remote interfaces.
    ///
    /// Subscriptions record their sender so tests can push events through
    /// `emit`. Health checks and writes can be scripted to fail.
    #[derive(Default)]
    pub struct MockRemote {
        next_sub_id: AtomicU64,
        subs: Mutex<HashMap<u64, (String, mpsc::Sender<ChangeEvent>)>>,
        failing_collections: Mutex<HashSet<String>>,
        healthy: AtomicBool,
        reject_health: AtomicBool,
        write_failures: Mutex<VecDeque<SyncError>>,
        upserts: Mutex<Vec<(String, Record)>>,
        deletes: Mutex<Vec<(String, String)>>,
    }

    impl MockRemote {
        /// Creates a healthy mock with no scripted failures.
        pub fn new() -> Self {
            let remote = Self::default();
            remote.healthy.store(true, Ordering::SeqCst);
            remote
        }

        /// Makes health checks time out (or recover).
        pub fn set_healthy(&self, healthy: bool) {
            self.healthy.store(healthy, Ordering::SeqCst);
        }

        /// Makes health checks fail with an explicit rejection instead of
        /// a timeout.
        pub fn set_reject_health(&self, reject: bool) {
            self.reject_health.store(reject, Ordering::SeqCst);
            if reject {
                self.healthy.store(false, Ordering::SeqCst);
            }
        }

        /// Makes subscribe calls for `collection` fail until cleared.
        pub fn fail_subscribes_for(&self, collection: &str) {
            self.failing_collections
                .lock()
                .unwrap()
                .insert(collection.to_string());
        }

        /// Clears all scripted subscribe failures.
        pub fn clear_subscribe_failures(&self) {
            self.failing_collections.lock().unwrap().clear();
        }

        /// Scripts the next write (upsert or delete) to fail with `error`.
        pub fn push_write_failure(&self, error: SyncError) {
            self.write_failures.lock().unwrap().push_back(error);
        }

        /// Delivers an event to the matching subscription, if any.
        /// Returns whether a subscriber received it.
        pub async fn emit(&self, event: ChangeEvent) -> bool {
            let sender = {
                let subs = self.subs.lock().unwrap();
                subs.values()
                    .find(|(collection, _)| *collection == event.collection)
                    .map(|(_, tx)| tx.clone())
            };
            match sender {
                Some(tx) => tx.send(event).await.is_ok(),
                None => false,
            }
        }

        /// Number of currently open subscriptions.
        pub fn subscription_count(&self) -> usize {
            self.subs.lock().unwrap().len()
        }

        /// Collections with an open subscription.
        pub fn subscribed_collections(&self) -> HashSet<String> {
            self.subs
                .lock()
                .unwrap()
                .values()
                .map(|(collection, _)| collection.clone())
                .collect()
        }

        /// Successful upserts, in call order.
        pub fn upserts(&self) -> Vec<(String, Record)> {
            self.upserts.lock().unwrap().clone()
        }

        /// Successful deletes, in call order.
        pub fn deletes(&self) -> Vec<(String, String)> {
            self.deletes.lock().unwrap().clone()
        }

        fn take_write_failure(&self) -> Option<SyncError> {
            self.write_failures.lock().unwrap().pop_front()
        }
    }

    #[async_trait]
    impl ChangeFeed for MockRemote {
        async fn subscribe(
            &self,
            collection: &str,
            _owner_filter: &str,
            events: mpsc::Sender<ChangeEvent>,
        ) -> SyncResult<FeedSubscription> {
            if self.failing_collections.lock().unwrap().contains(collection) {
                return Err(SyncError::Subscribe(format!(
                    "scripted failure for {collection}"
                )));
            }
            let id = self.next_sub_id.fetch_add(1, Ordering::SeqCst);
            self.subs
                .lock()
                .unwrap()
                .insert(id, (collection.to_string(), events));
            Ok(FeedSubscription {
                collection: collection.to_string(),
                id,
            })
        }

        async fn unsubscribe(&self, subscription: FeedSubscription) -> SyncResult<()> {
            self.subs.lock().unwrap().remove(&subscription.id);
            Ok(())
        }

        async fn health_check(&self) -> SyncResult<()> {
            if self.reject_health.load(Ordering::SeqCst) {
                return Err(SyncError::Rejected("scripted rejection".into()));
            }
            if !self.healthy.load(Ordering::SeqCst) {
                return Err(SyncError::Timeout);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl RemoteWriter for MockRemote {
        async fn upsert(&self, collection: &str, record: &Record) -> SyncResult<()> {
            if let Some(err) = self.take_write_failure() {
                return Err(err);
            }
            self.upserts
                .lock()
                .unwrap()
                .push((collection.to_string(), record.clone()));
            Ok(())
        }

        async fn delete(&self, collection: &str, id: &str) -> SyncResult<()> {
            if let Some(err) = self.take_write_failure() {
                return Err(err);
            }
            self.deletes
                .lock()
                .unwrap()
                .push((collection.to_string(), id.to_string()));
            Ok(())
        }
    }
}
