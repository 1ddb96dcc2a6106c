//! Subscription lifecycle management.
//!
//! One logical feed channel per tracked collection, scoped to the current
//! identity. Resubscribing is idempotent so reconnection storms can call it
//! repeatedly without duplicating channels, and one collection's failure
//! never blocks the others.

use crate::remote::{ChangeFeed, FeedSubscription};
use std::collections::HashMap;
use std::sync::Arc;
use syncline_types::ChangeEvent;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

/// Opens and maintains feed subscriptions for the tracked collections.
pub struct SubscriptionManager {
    feed: Arc<dyn ChangeFeed>,
    collections: Vec<String>,
    events: mpsc::Sender<ChangeEvent>,
    open: Mutex<HashMap<String, FeedSubscription>>,
    identity: std::sync::Mutex<Option<String>>,
}

impl SubscriptionManager {
    /// Creates a manager for the given collections. Delivered events are
    /// pushed into `events`.
    pub fn new(
        feed: Arc<dyn ChangeFeed>,
        collections: Vec<String>,
        events: mpsc::Sender<ChangeEvent>,
    ) -> Self {
        Self {
            feed,
            collections,
            events,
            open: Mutex::new(HashMap::new()),
            identity: std::sync::Mutex::new(None),
        }
    }

    /// Number of tracked collections.
    pub fn collection_count(&self) -> usize {
        self.collections.len()
    }

    /// Binds the manager to an identity and opens all subscriptions.
    /// Returns how many channels are open afterwards.
    pub async fn start(&self, identity: &str) -> usize {
        {
            let mut current = self.identity.lock().expect("identity lock poisoned");
            *current = Some(identity.to_string());
        }
        info!(identity, "starting subscriptions");
        self.resubscribe_all().await
    }

    /// Closes all subscriptions and clears the bound identity.
    pub async fn stop(&self) {
        {
            let mut current = self.identity.lock().expect("identity lock poisoned");
            *current = None;
        }
        self.close_all().await;
    }

    /// Opens any subscription that is not already open. Idempotent: an
    /// already-open collection is left untouched, so this is safe to call
    /// on every reconnect attempt. Returns how many channels are open.
    pub async fn resubscribe_all(&self) -> usize {
        let Some(identity) = self.current_identity() else {
            return 0;
        };

        let mut open = self.open.lock().await;
        for collection in &self.collections {
            if open.contains_key(collection) {
                continue;
            }
            match self
                .feed
                .subscribe(collection, &identity, self.events.clone())
                .await
            {
                Ok(sub) => {
                    debug!(collection = %collection, "subscription opened");
                    open.insert(collection.clone(), sub);
                }
                Err(e) => {
                    // isolated: the other collections still get their channel
                    warn!(collection = %collection, error = %e, "subscribe failed, will retry");
                }
            }
        }
        open.len()
    }

    /// Drops all subscription handles without clearing the identity, used
    /// when the connection is known dead and every channel must be
    /// re-established from scratch.
    pub async fn invalidate_all(&self) {
        self.close_all().await;
    }

    /// Number of currently open subscriptions.
    pub async fn open_count(&self) -> usize {
        self.open.lock().await.len()
    }

    /// Whether every tracked collection has an open subscription.
    pub async fn is_fully_subscribed(&self) -> bool {
        self.open.lock().await.len() == self.collections.len()
    }

    fn current_identity(&self) -> Option<String> {
        self.identity.lock().expect("identity lock poisoned").clone()
    }

    async fn close_all(&self) {
        let subs: Vec<FeedSubscription> = {
            let mut open = self.open.lock().await;
            let keys: Vec<String> = open.keys().cloned().collect();
            keys.into_iter().filter_map(|k| open.remove(&k)).collect()
        };
        for sub in subs {
            let collection = sub.collection.clone();
            if let Err(e) = self.feed.unsubscribe(sub).await {
                warn!(collection = %collection, error = %e, "unsubscribe failed");
            }
        }
    }
}
