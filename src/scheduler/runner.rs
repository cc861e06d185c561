//! Broadcast scheduler runner.
//!
//! The scheduler follows a small state machine:
//! 1. Idle until `run` is called.
//! 2. Armed: the first broadcast fires immediately, then once per interval.
//! 3. A `Rearm` message restarts the countdown with the new interval; the
//!    next broadcast is one full new interval after the message.
//! 4. A `Shutdown` message (or all senders dropped) stops the loop.
//!
//! Each tick reads the current policy snapshot, so edits to the broadcast
//! text or target chat apply from the next tick on.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

use super::SchedulerState;
use crate::config::{ConfigStore, Policy};
use crate::transport::{ChatTransport, OutboundAction};

/// Messages that can be sent to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerMessage {
    /// Restart the countdown with a new interval.
    Rearm(Duration),
    /// Stop the scheduler.
    Shutdown,
}

/// The broadcast for the current policy, or `None` when no target chat
/// is configured.
#[must_use]
pub fn broadcast_action(policy: &Policy) -> Option<OutboundAction> {
    if policy.chat_id.trim().is_empty() {
        return None;
    }
    Some(OutboundAction::send_text(
        policy.chat_id.trim(),
        policy.scheduled_text.clone(),
    ))
}

/// Periodic broadcaster.
pub struct BroadcastScheduler {
    /// Policy source, read on every tick.
    store: Arc<ConfigStore>,

    /// Where broadcasts are delivered.
    transport: Arc<dyn ChatTransport>,

    /// Scheduler state, shared with `/status`.
    state: Arc<RwLock<SchedulerState>>,
}

impl BroadcastScheduler {
    /// Creates a new broadcast scheduler.
    #[must_use]
    pub fn new(
        store: Arc<ConfigStore>,
        transport: Arc<dyn ChatTransport>,
        state: Arc<RwLock<SchedulerState>>,
    ) -> Self {
        Self {
            store,
            transport,
            state,
        }
    }

    /// Runs the scheduler loop until shut down.
    pub async fn run(&self, mut rx: mpsc::Receiver<SchedulerMessage>) {
        let interval = Duration::from_secs(self.store.get().await.schedule_interval_secs);
        let mut ticker = self.arm(interval, Instant::now()).await;
        info!("Broadcast scheduler started (every {}s)", interval.as_secs());

        loop {
            tokio::select! {
                // A pending shutdown wins over a due tick.
                biased;

                msg = rx.recv() => {
                    match msg {
                        Some(SchedulerMessage::Rearm(interval)) => {
                            ticker = self.arm(interval, Instant::now() + interval).await;
                            info!("Broadcast scheduler re-armed (every {}s)", interval.as_secs());
                        }
                        Some(SchedulerMessage::Shutdown) | None => {
                            info!("Scheduler shutting down");
                            break;
                        }
                    }
                }
                fired_at = ticker.tick() => {
                    self.tick(fired_at).await;
                }
            }
        }

        self.state.write().await.stop();
    }

    async fn arm(&self, interval: Duration, first_due: Instant) -> Interval {
        // Interval panics on a zero period; the store never holds one.
        let interval = interval.max(Duration::from_secs(1));
        let mut ticker = interval_at(first_due, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.state.write().await.arm(interval, first_due);
        ticker
    }

    /// Single tick of the scheduler.
    async fn tick(&self, fired_at: Instant) {
        let policy = self.store.get().await;

        let Some(action) = broadcast_action(&policy) else {
            warn!("No broadcast chat configured (CHAT_ID is empty), skipping scheduled message");
            self.state.write().await.record_skip(fired_at);
            return;
        };

        debug!("Sending scheduled broadcast");
        let delivered = match self.transport.execute(&action).await {
            Ok(()) => {
                info!("Scheduled broadcast sent to {}", policy.chat_id);
                true
            }
            Err(e) => {
                warn!("Failed to deliver scheduled broadcast: {}", e);
                false
            }
        };

        self.state.write().await.record_tick(delivered, fired_at);
    }
}

impl std::fmt::Debug for BroadcastScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadcastScheduler")
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Owner of a running scheduler task.
#[derive(Debug)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<SchedulerMessage>,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Spawns the scheduler loop; the first broadcast goes out right away.
    #[must_use]
    pub fn spawn(scheduler: BroadcastScheduler) -> Self {
        let (tx, rx) = mpsc::channel::<SchedulerMessage>(32);
        let task = tokio::spawn(async move {
            scheduler.run(rx).await;
        });
        Self { tx, task }
    }

    /// A sender for other components (e.g. the event router).
    #[must_use]
    pub fn sender(&self) -> mpsc::Sender<SchedulerMessage> {
        self.tx.clone()
    }

    /// Restarts the countdown with `interval`.
    pub async fn rearm(&self, interval: Duration) {
        if self.tx.send(SchedulerMessage::Rearm(interval)).await.is_err() {
            warn!("Scheduler is not running, cannot re-arm");
        }
    }

    /// Stops the scheduler and waits for it to finish. No broadcast is
    /// sent after this returns.
    pub async fn shutdown(self) {
        let _ = self.tx.send(SchedulerMessage::Shutdown).await;
        if let Err(e) = self.task.await {
            error!("Scheduler task failed: {}", e);
        }
    }
}
