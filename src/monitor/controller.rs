use std::sync::Arc;

use anyhow::{bail, Context, Result};
use log::{debug, info};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::alerts::AlertDispatcher;
use crate::detector::AlertLogicState;

use super::loop_worker::{poll_loop, PollContext};

/// Starts and stops one monitoring session: the poll loop plus the task that
/// replays queued alerts when connectivity comes back.
pub struct MonitorController {
    ctx: Arc<PollContext>,
    handles: Vec<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
    state_rx: Option<watch::Receiver<AlertLogicState>>,
}

impl MonitorController {
    pub fn new(ctx: Arc<PollContext>) -> Self {
        Self {
            ctx,
            handles: Vec::new(),
            cancel_token: None,
            state_rx: None,
        }
    }

    pub fn context(&self) -> &Arc<PollContext> {
        &self.ctx
    }

    pub fn is_running(&self) -> bool {
        self.cancel_token.is_some()
    }

    /// Detector state as of the last completed tick.
    pub fn detector_state(&self) -> AlertLogicState {
        self.state_rx
            .as_ref()
            .map(|rx| rx.borrow().clone())
            .unwrap_or_default()
    }

    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            bail!("monitoring already active");
        }

        info!("starting disconnect monitoring");
        let cancel_token = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(AlertLogicState::new());

        let poll = tokio::spawn(poll_loop(
            Arc::clone(&self.ctx),
            cancel_token.clone(),
            Some(state_tx),
        ));
        let replay = tokio::spawn(replay_watcher(
            Arc::clone(&self.ctx.dispatcher),
            self.ctx.connectivity.subscribe(),
            cancel_token.clone(),
        ));

        self.handles = vec![poll, replay];
        self.cancel_token = Some(cancel_token);
        self.state_rx = Some(state_rx);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.ctx.dispatcher.silence_alarm();

        for handle in self.handles.drain(..) {
            handle.await.context("monitor task failed to join")?;
        }
        info!("disconnect monitoring stopped");
        Ok(())
    }
}

/// Replay the retry queue on every offline to online edge.
pub async fn replay_watcher(
    dispatcher: Arc<AlertDispatcher>,
    mut online_rx: watch::Receiver<bool>,
    cancel_token: CancellationToken,
) {
    let mut was_online = *online_rx.borrow_and_update();

    loop {
        tokio::select! {
            changed = online_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let online = *online_rx.borrow_and_update();
                if online && !was_online {
                    let dispatcher = Arc::clone(&dispatcher);
                    tokio::spawn(async move {
                        if dispatcher.replay_queue().await.is_none() {
                            debug!("restore signal coalesced into running replay");
                        }
                    });
                }
                was_online = online;
            }
            _ = cancel_token.cancelled() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::dispatcher::tests::RecordingTransport;
    use crate::analyzer::DetectionResult;
    use crate::monitor::loop_worker::tests::{context, ScriptedAnalyzer, StaticCapture};
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn second_start_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let (transport, _rx) = RecordingTransport::new();
        let ctx = context(
            dir.path(),
            Arc::new(StaticCapture { fail: false }),
            Arc::new(ScriptedAnalyzer::repeating(DetectionResult::connected(0.9, "clear"))),
            transport,
        );
        let mut controller = MonitorController::new(ctx);

        controller.start().unwrap();
        assert!(controller.start().is_err());
        controller.stop().await.unwrap();
        assert!(!controller.is_running());

        controller.start().unwrap();
        controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn restart_resets_detector_state() {
        let dir = tempfile::tempdir().unwrap();
        let (transport, _rx) = RecordingTransport::new();
        let ctx = context(
            dir.path(),
            Arc::new(StaticCapture { fail: false }),
            Arc::new(ScriptedAnalyzer::repeating(DetectionResult::disconnected(0.9, "hit"))),
            transport,
        );
        let mut controller = MonitorController::new(ctx);

        controller.start().unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(!controller.detector_state().is_connected());
        controller.stop().await.unwrap();

        controller.start().unwrap();
        assert!(controller.detector_state().is_connected());
        controller.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn restored_connectivity_replays_queue() {
        let dir = tempfile::tempdir().unwrap();
        let (transport, mut rx) = RecordingTransport::new();
        let ctx = context(
            dir.path(),
            Arc::new(StaticCapture { fail: false }),
            Arc::new(ScriptedAnalyzer::repeating(DetectionResult::disconnected(0.9, "hit"))),
            transport.clone(),
        );
        ctx.connectivity.set_online(false);
        let mut controller = MonitorController::new(Arc::clone(&ctx));
        controller.start().unwrap();

        // t=0 suspects, t=15 alerts while offline.
        tokio::time::sleep(Duration::from_secs(16)).await;
        assert_eq!(ctx.dispatcher.queue().len().await, 1);
        assert_eq!(transport.attempts(), 0);

        ctx.connectivity.set_online(true);
        let payload = rx.recv().await.unwrap();
        assert_eq!(payload.url, "https://hooks.example/dc");
        assert!(ctx.dispatcher.queue().is_empty().await);

        controller.stop().await.unwrap();
    }
}
