use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time::error::Elapsed;
use tokio::time::{Duration, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::alerts::AlertDispatcher;
use crate::analyzer::{AnalysisStatus, AnalyzeOptions, DetectionResult, FrameAnalyzer};
use crate::capture::CaptureSource;
use crate::connectivity::ConnectivityMonitor;
use crate::detector::{AlertLogicState, DetectorEvent, DisconnectDetector};
use crate::metrics::{MetricsCollector, TickMetrics};
use crate::settings::{MonitorSettings, SettingsStore};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const MIN_TICK_TIMEOUT_SECS: u64 = 10;

/// Everything one monitoring session needs, shared by the loop and its
/// controller.
pub struct PollContext {
    pub capture: Arc<dyn CaptureSource>,
    pub analyzer: Arc<dyn FrameAnalyzer>,
    pub dispatcher: Arc<AlertDispatcher>,
    pub connectivity: ConnectivityMonitor,
    pub settings: Arc<SettingsStore>,
    pub metrics: MetricsCollector,
    pub debug_dir: Option<PathBuf>,
}

/// Result of one completed tick.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub status: AnalysisStatus,
    pub is_disconnected: bool,
    pub confidence: f32,
    pub event: Option<DetectorEvent>,
}

/// Wall-clock timestamps derived from the runtime's monotonic clock, so the
/// detector never sees time go backwards.
struct TickClock {
    wall_origin: DateTime<Utc>,
    origin: Instant,
}

impl TickClock {
    fn start() -> Self {
        Self {
            wall_origin: Utc::now(),
            origin: Instant::now(),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed())
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.wall_origin + elapsed
    }
}

/// Tick forever until cancelled.
///
/// Ticks run strictly one after another in this task. A tick that overruns
/// its period makes the ticker skip the due slots instead of queueing them.
/// The detector state lives on this task's stack and is only touched between
/// awaits that cancellation can interrupt, so nothing mutates it after stop.
pub async fn poll_loop(
    ctx: Arc<PollContext>,
    cancel_token: CancellationToken,
    phase_tx: Option<watch::Sender<AlertLogicState>>,
) {
    let clock = TickClock::start();
    let mut settings = ctx.settings.snapshot();
    let mut detector = DisconnectDetector::new(settings.alert_timing);
    let mut state = AlertLogicState::new();
    let mut period = tick_period(&settings);
    let mut ticker = new_ticker(period, Instant::now());

    log_info!(
        "poll loop started: every {}s, sensitivity {:.2}, analyzer {}, capture {}",
        period.as_secs(),
        settings.sensitivity_threshold,
        ctx.analyzer.name(),
        ctx.capture.describe()
    );

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = cancel_token.cancelled() => {
                log_info!("poll loop shutting down");
                break;
            }
        }

        settings = reload_settings(&ctx.settings, settings);
        detector.set_timing(settings.alert_timing);

        let started = Instant::now();
        let now = clock.now();
        let outcome = tokio::select! {
            outcome = run_tick(&ctx, &detector, &mut state, &settings, now) => outcome,
            _ = cancel_token.cancelled() => {
                log_info!("poll loop cancelled mid-tick; result discarded");
                break;
            }
        };

        match outcome {
            Ok(_report) => {
                if let Some(tx) = &phase_tx {
                    tx.send_replace(state.clone());
                }
            }
            Err(err) if err.downcast_ref::<Elapsed>().is_some() => {
                log_warn!("tick abandoned without a verdict: {err:#}");
                ctx.metrics.record_skipped_tick().await;
            }
            Err(err) => log_warn!("tick skipped: {err:#}"),
        }

        let elapsed = started.elapsed();
        let overrun = (elapsed.as_millis() / period.as_millis().max(1)) as u64;
        for _ in 0..overrun {
            ctx.metrics.record_skipped_tick().await;
        }
        if overrun > 0 {
            log_warn!(
                "tick took {}ms, skipping {} overdue tick(s)",
                elapsed.as_millis(),
                overrun
            );
        }

        let next_period = tick_period(&settings);
        if next_period != period {
            log_info!(
                "check interval changed from {}s to {}s",
                period.as_secs(),
                next_period.as_secs()
            );
            period = next_period;
            ticker = new_ticker(period, Instant::now() + period);
        }
    }
}

/// capture → analyze → detect → dispatch for a single tick.
///
/// Capture and analysis share one timeout. A capture failure or a timeout is
/// returned as an error before anything touches `state`; a timeout error
/// downcasts to [`Elapsed`].
pub async fn run_tick(
    ctx: &PollContext,
    detector: &DisconnectDetector,
    state: &mut AlertLogicState,
    settings: &MonitorSettings,
    now: DateTime<Utc>,
) -> Result<TickReport> {
    let tick_start = Instant::now();
    let limit = tick_timeout(tick_period(settings));

    let (result, capture_ms, analyze_ms) = tokio::time::timeout(limit, sense(ctx, settings))
        .await
        .with_context(|| format!("no verdict within {}s", limit.as_secs()))??;

    match result.status {
        AnalysisStatus::Failed => log_warn!("analysis failed this tick: {}", result.reason),
        AnalysisStatus::InitError => log_error!("analyzer unavailable: {}", result.reason),
        AnalysisStatus::Warming | AnalysisStatus::Complete => log_debug!(
            "verdict: disconnected={} confidence={:.2} ({})",
            result.is_disconnected,
            result.confidence,
            result.reason
        ),
    }

    let event = detector.observe(state, &result, settings.sensitivity_threshold, now);

    let alerted = match event.as_ref().and_then(DetectorEvent::as_alert) {
        Some(alert) => {
            let outcome = ctx
                .dispatcher
                .dispatch(alert, &settings.destinations(), ctx.connectivity.is_online())
                .await;
            log_debug!(
                "alert dispatched: {} sent, {} queued, {} rejected",
                outcome.sent,
                outcome.queued,
                outcome.rejected
            );
            if settings.local_audio_enabled {
                ctx.dispatcher.sound_alarm();
            }
            true
        }
        None => false,
    };

    if result.is_disconnected {
        if let Some(dir) = &ctx.debug_dir {
            if let Err(err) = dump_debug(dir, &result, now).await {
                log_warn!("debug dump failed: {err:#}");
            }
        }
    }

    let (cpu_percent, memory_mb) = ctx.metrics.sample_system_metrics().await;
    let total_ms = tick_start.elapsed().as_millis() as u64;
    ctx.metrics
        .record_tick(TickMetrics {
            timestamp: now,
            capture_ms,
            analyze_ms,
            total_ms,
            status: result.status,
            is_disconnected: result.is_disconnected,
            confidence: result.confidence,
            phase: state.phase(now, detector.timing()),
            alerted,
            cpu_percent,
            memory_mb,
        })
        .await;
    log_debug!("tick: capture={capture_ms}ms analyze={analyze_ms}ms total={total_ms}ms");

    Ok(TickReport {
        status: result.status,
        is_disconnected: result.is_disconnected,
        confidence: result.confidence,
        event,
    })
}

/// Capture a frame and analyze it. Returns the verdict with capture and
/// analysis times in milliseconds.
async fn sense(ctx: &PollContext, settings: &MonitorSettings) -> Result<(DetectionResult, u64, u64)> {
    let capture_start = Instant::now();
    let frame = match ctx.capture.capture().await {
        Ok(frame) => frame,
        Err(err) => {
            ctx.metrics.record_capture_failure().await;
            return Err(err.context("capture failed"));
        }
    };
    let capture_ms = capture_start.elapsed().as_millis() as u64;

    let analyze_start = Instant::now();
    let options = AnalyzeOptions {
        focus_mode: settings.focus_mode,
    };
    let result = ctx.analyzer.analyze(frame, options).await;
    let analyze_ms = analyze_start.elapsed().as_millis() as u64;
    Ok((result, capture_ms, analyze_ms))
}

fn reload_settings(store: &SettingsStore, current: MonitorSettings) -> MonitorSettings {
    match store.refresh() {
        Ok(true) => {
            let next = store.snapshot();
            log_info!("settings reloaded");
            next
        }
        Ok(false) => current,
        Err(err) => {
            log_warn!("keeping previous settings: {err:#}");
            current
        }
    }
}

fn tick_period(settings: &MonitorSettings) -> Duration {
    Duration::from_secs(settings.check_interval_seconds.max(1))
}

fn tick_timeout(period: Duration) -> Duration {
    (period * 2).max(Duration::from_secs(MIN_TICK_TIMEOUT_SECS))
}

fn new_ticker(period: Duration, first: Instant) -> Interval {
    let mut ticker = tokio::time::interval_at(first, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

async fn dump_debug(dir: &Path, result: &DetectionResult, now: DateTime<Utc>) -> Result<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let stem = now.format("%Y%m%dT%H%M%S%.3fZ").to_string();

    if let Some(frame) = &result.processed_image {
        let ext = frame.format().extensions_str().first().copied().unwrap_or("bin");
        let path = dir.join(format!("{stem}-processed.{ext}"));
        tokio::fs::write(&path, frame.encoded())
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let text = format!(
        "confidence: {:.3}\nreason: {}\n\n{}\n",
        result.confidence,
        result.reason,
        result.debug_text.as_deref().unwrap_or("")
    );
    let path = dir.join(format!("{stem}-text.txt"));
    tokio::fs::write(&path, text)
        .await
        .with_context(|| format!("Failed to write {}", path.display()))
}
