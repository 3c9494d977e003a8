use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use super::audio::AlarmPlayer;
use super::queue::{QueuedAlert, RetryQueue};
use super::transport::{Destination, NotificationPayload, NotificationTransport};
use crate::detector::AlertEvent;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

pub const DEFAULT_REPLAY_DELAY: Duration = Duration::from_millis(500);

/// What one `dispatch` call did with each destination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub sent: usize,
    pub queued: usize,
    pub rejected: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayOutcome {
    pub delivered: usize,
    pub failed: usize,
}

/// Routes alert events to their destinations, deferring them while offline.
pub struct AlertDispatcher {
    transport: Arc<dyn NotificationTransport>,
    queue: Arc<RetryQueue>,
    alarm: AlarmPlayer,
    replay_delay: Duration,
    replay_guard: Mutex<()>,
}

impl AlertDispatcher {
    pub fn new(transport: Arc<dyn NotificationTransport>) -> Self {
        Self {
            transport,
            queue: Arc::new(RetryQueue::new()),
            alarm: AlarmPlayer::new(),
            replay_delay: DEFAULT_REPLAY_DELAY,
            replay_guard: Mutex::new(()),
        }
    }

    pub fn with_replay_delay(mut self, delay: Duration) -> Self {
        self.replay_delay = delay;
        self
    }

    pub fn queue(&self) -> &Arc<RetryQueue> {
        &self.queue
    }

    /// Deliver `event` to every destination.
    ///
    /// Online, each delivery runs as its own task and failures are only
    /// logged. Offline, nothing is sent and each rendered request is queued
    /// once for the next connectivity-restored replay.
    pub async fn dispatch(
        &self,
        event: &AlertEvent,
        destinations: &[Destination],
        connectivity: bool,
    ) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        for destination in destinations {
            let payload = match destination.payload(event) {
                Ok(payload) => payload,
                Err(err) => {
                    log_error!("skipping {:?} destination: {err}", destination.kind());
                    outcome.rejected += 1;
                    continue;
                }
            };

            if connectivity {
                self.spawn_delivery(payload);
                outcome.sent += 1;
            } else {
                log_info!("offline, queueing {:?} notification", payload.kind);
                self.queue.push(QueuedAlert::new(payload, Utc::now())).await;
                outcome.queued += 1;
            }
        }

        outcome
    }

    pub fn sound_alarm(&self) {
        if let Err(err) = self.alarm.play() {
            log_warn!("local alarm failed: {err}");
        }
    }

    pub fn silence_alarm(&self) {
        if let Err(err) = self.alarm.stop() {
            log_warn!("failed to silence local alarm: {err}");
        }
    }

    /// Drain the retry queue in FIFO order. Returns `None` when another
    /// replay is already running. Failed items are dropped, not requeued.
    pub async fn replay_queue(&self) -> Option<ReplayOutcome> {
        let Ok(_guard) = self.replay_guard.try_lock() else {
            log_debug!("replay already in progress, ignoring restore signal");
            return None;
        };

        let pending = self.queue.take_all().await;
        let mut outcome = ReplayOutcome::default();
        if pending.is_empty() {
            return Some(outcome);
        }
        log_info!("connectivity restored, replaying {} queued notification(s)", pending.len());

        for (index, item) in pending.iter().enumerate() {
            if index > 0 {
                tokio::time::sleep(self.replay_delay).await;
            }
            match self.transport.deliver(&item.payload).await {
                Ok(()) => outcome.delivered += 1,
                Err(err) => {
                    outcome.failed += 1;
                    log_error!(
                        "replay of {:?} notification {} (queued {}) failed: {err}",
                        item.payload.kind,
                        item.id,
                        item.enqueued_at
                    );
                }
            }
        }

        log_info!(
            "replay finished: {} delivered, {} failed",
            outcome.delivered,
            outcome.failed
        );
        Some(outcome)
    }

    fn spawn_delivery(&self, payload: NotificationPayload) {
        let transport = Arc::clone(&self.transport);
        tokio::spawn(async move {
            if let Err(err) = transport.deliver(&payload).await {
                log_error!("{:?} notification to {} failed: {err}", payload.kind, payload.url);
            }
        });
    }
}
