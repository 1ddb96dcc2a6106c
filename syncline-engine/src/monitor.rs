//! Connection health monitoring and recovery.
//!
//! Heartbeats the remote endpoint while connected, demotes to `Degraded`
//! on a missed beat and to `Disconnected` after a configured run of
//! consecutive misses, then drives reconnection with exponential backoff up
//! to a ceiling. Exceeding the attempt cap parks the monitor in an
//! `Offline`-reporting state that still retries at the ceiling delay; the
//! monitor never stops on its own, only on engine shutdown.
//!
//! Every `Disconnected → Connecting` transition resubscribes all channels,
//! and reaching `Connected` flushes the pending-write queue. Timing runs on
//! `tokio::time`, so tests drive the whole state machine under the paused
//! test clock.

use crate::config::EngineConfig;
use crate::error::SyncError;
use crate::queue::PendingWriteQueue;
use crate::remote::ChangeFeed;
use crate::subscriptions::SubscriptionManager;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{debug, info, warn};

/// Connection health as tracked by the monitor. Owned here exclusively;
/// everyone else observes through the watch channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection; a reconnect attempt is scheduled.
    Disconnected,
    /// A reconnect attempt is in flight.
    Connecting,
    /// Channels open, heartbeats answered.
    Connected,
    /// At least one heartbeat missed, channels still held.
    Degraded,
    /// Reconnect attempts exhausted; retrying at the ceiling delay but
    /// reported distinctly so the UI can stop implying "about to
    /// reconnect".
    Offline,
}

/// Heartbeats the endpoint and drives reconnection.
pub struct ConnectionMonitor {
    feed: Arc<dyn ChangeFeed>,
    subscriptions: Arc<SubscriptionManager>,
    queue: Arc<PendingWriteQueue>,
    heartbeat_interval: Duration,
    base_delay: Duration,
    max_delay: Duration,
    max_attempts: u32,
    max_missed: u32,
    state_tx: watch::Sender<ConnectionState>,
    nudge: Notify,
    last_rejected: AtomicBool,
    connect_cycles: AtomicU32,
}

impl ConnectionMonitor {
    /// Creates a monitor in the `Disconnected` state.
    pub fn new(
        feed: Arc<dyn ChangeFeed>,
        subscriptions: Arc<SubscriptionManager>,
        queue: Arc<PendingWriteQueue>,
        config: &EngineConfig,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            feed,
            subscriptions,
            queue,
            heartbeat_interval: config.heartbeat_interval,
            base_delay: config.reconnect_base_delay,
            max_delay: config.reconnect_max_delay,
            max_attempts: config.max_reconnect_attempts,
            max_missed: config.max_missed_heartbeats,
            state_tx,
            nudge: Notify::new(),
            last_rejected: AtomicBool::new(false),
            connect_cycles: AtomicU32::new(0),
        }
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    /// Observes state transitions.
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Wakes the monitor out of any backoff or heartbeat sleep. Covers the
    /// runtime "back online" signal, foreground visibility, and forced
    /// syncs.
    pub fn hint_online(&self) {
        self.nudge.notify_one();
    }

    /// Whether the most recent failed health check was an explicit
    /// rejection rather than a timeout.
    pub fn last_check_rejected(&self) -> bool {
        self.last_rejected.load(Ordering::SeqCst)
    }

    /// How many `Disconnected → Connecting` transitions have happened.
    pub fn connect_cycles(&self) -> u32 {
        self.connect_cycles.load(Ordering::SeqCst)
    }

    /// Resets to `Disconnected`, for engine shutdown.
    pub fn reset(&self) {
        self.set_state(ConnectionState::Disconnected);
        self.last_rejected.store(false, Ordering::SeqCst);
    }

    /// Reconnect delay for the given attempt count: base doubled per
    /// attempt, capped at the configured ceiling.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Runs the monitor until `shutdown` flips to true.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut attempt: u32 = 0;
        let mut missed: u32 = 0;

        while !*shutdown.borrow() {
            match self.state() {
                ConnectionState::Disconnected
                | ConnectionState::Connecting
                | ConnectionState::Offline => {
                    self.connect_cycles.fetch_add(1, Ordering::SeqCst);
                    self.set_state(ConnectionState::Connecting);
                    let opened = self.subscriptions.resubscribe_all().await;
                    if opened > 0 {
                        attempt = 0;
                        missed = 0;
                        self.last_rejected.store(false, Ordering::SeqCst);
                        self.set_state(ConnectionState::Connected);
                        if let Err(e) = self.queue.flush().await {
                            warn!(error = %e, "post-reconnect flush failed");
                        }
                    } else {
                        attempt = attempt.saturating_add(1);
                        if attempt >= self.max_attempts {
                            self.set_state(ConnectionState::Offline);
                        } else {
                            self.set_state(ConnectionState::Disconnected);
                        }
                        let delay = self.backoff_delay(attempt);
                        debug!(attempt, delay_ms = delay.as_millis() as u64, "reconnect failed, backing off");
                        self.wait(delay, &mut shutdown).await;
                    }
                }
                ConnectionState::Connected | ConnectionState::Degraded => {
                    self.wait(self.heartbeat_interval, &mut shutdown).await;
                    if *shutdown.borrow() {
                        break;
                    }
                    match self.feed.health_check().await {
                        Ok(()) => {
                            missed = 0;
                            self.last_rejected.store(false, Ordering::SeqCst);
                            self.set_state(ConnectionState::Connected);
                            // repair any channel that failed to open earlier
                            if !self.subscriptions.is_fully_subscribed().await {
                                self.subscriptions.resubscribe_all().await;
                            }
                            if let Ok(n) = self.queue.pending_count().await {
                                if n > 0 {
                                    if let Err(e) = self.queue.flush().await {
                                        warn!(error = %e, "heartbeat flush failed");
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            self.last_rejected.store(
                                matches!(e, SyncError::Rejected(_)),
                                Ordering::SeqCst,
                            );
                            missed = missed.saturating_add(1);
                            warn!(missed, error = %e, "heartbeat missed");
                            if missed >= self.max_missed {
                                // channels are dead; force a full re-subscribe
                                self.subscriptions.invalidate_all().await;
                                self.set_state(ConnectionState::Disconnected);
                            } else {
                                self.set_state(ConnectionState::Degraded);
                            }
                        }
                    }
                }
            }
        }
    }

    fn set_state(&self, next: ConnectionState) {
        let prev = *self.state_tx.borrow();
        if prev == next {
            return;
        }
        info!(from = ?prev, to = ?next, "connection state changed");
        self.state_tx.send_replace(next);
    }

    async fn wait(&self, duration: Duration, shutdown: &mut watch::Receiver<bool>) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.nudge.notified() => {
                debug!("monitor nudged awake");
            }
            _ = shutdown.changed() => {}
        }
    }
}
