//! Watches a screen feed for "disconnected" dialogs and raises rate-limited
//! alerts.
//!
//! One tick per check interval: a [`capture::CaptureSource`] supplies a
//! [`frame::Frame`], a [`analyzer::FrameAnalyzer`] turns it into a
//! [`analyzer::DetectionResult`], the [`detector::DisconnectDetector`] applies
//! hysteresis and the [`alerts::AlertDispatcher`] delivers or queues alerts.

pub mod alerts;
pub mod analyzer;
pub mod capture;
pub mod connectivity;
pub mod detector;
pub mod error;
pub mod frame;
pub mod metrics;
pub mod monitor;
pub mod preprocess;
pub mod settings;
mod utils;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use alerts::{AlertDispatcher, HttpTransport};
use analyzer::{
    AnalyzerProfile, FrameAnalyzer, LocalAnalyzer, RemoteAnalyzer, TesseractRecognizer,
};
use capture::{CaptureSource, DirectoryCaptureSource, FileCaptureSource};
use connectivity::ConnectivityMonitor;
use metrics::MetricsCollector;
use monitor::{MonitorController, PollContext};
use settings::SettingsStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerKind {
    Local,
    Remote,
}

#[derive(Debug, Clone)]
pub enum CaptureConfig {
    File(PathBuf),
    Directory(PathBuf),
}

/// Everything the binary collects from its command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub settings_path: PathBuf,
    pub capture: CaptureConfig,
    pub analyzer: AnalyzerKind,
    pub remote_url: Option<String>,
    pub profile_path: Option<PathBuf>,
    pub tesseract_bin: PathBuf,
    pub languages: String,
    pub probe_addr: SocketAddr,
    pub probe_interval: Duration,
    pub debug_dir: Option<PathBuf>,
}

fn build_analyzer(options: &RunOptions, profile: AnalyzerProfile) -> Result<Arc<dyn FrameAnalyzer>> {
    match options.analyzer {
        AnalyzerKind::Local => {
            let recognizer = Arc::new(TesseractRecognizer::new(
                options.tesseract_bin.clone(),
                options.languages.clone(),
            ));
            let local = Arc::new(LocalAnalyzer::new(recognizer, Arc::new(profile))?);
            let warming = Arc::clone(&local);
            tokio::spawn(async move { warming.initialize().await });
            Ok(local)
        }
        AnalyzerKind::Remote => {
            let url = options
                .remote_url
                .clone()
                .context("--remote-url is required with --analyzer remote")?;
            Ok(Arc::new(RemoteAnalyzer::new(url, profile.remote_prompt)))
        }
    }
}

fn build_capture(config: &CaptureConfig) -> Arc<dyn CaptureSource> {
    match config {
        CaptureConfig::File(path) => Arc::new(FileCaptureSource::new(path.clone())),
        CaptureConfig::Directory(dir) => Arc::new(DirectoryCaptureSource::new(dir.clone())),
    }
}

/// Run the monitor until Ctrl-C.
pub async fn run(options: RunOptions) -> Result<()> {
    let settings = Arc::new(
        SettingsStore::new(options.settings_path.clone()).context("Failed to load settings")?,
    );

    let profile = match &options.profile_path {
        Some(path) => AnalyzerProfile::load(path)?,
        None => AnalyzerProfile::default(),
    };
    info!(
        "analyzer profile v{} with {} keyword pattern(s)",
        profile.version,
        profile.keywords.len()
    );

    let analyzer = build_analyzer(&options, profile)?;
    let capture = build_capture(&options.capture);

    let online = connectivity::probe_once(options.probe_addr).await;
    if !online {
        warn!("{} unreachable at start-up; alerts will be queued", options.probe_addr);
    }
    let connectivity = ConnectivityMonitor::new(online);

    let ctx = Arc::new(PollContext {
        capture,
        analyzer,
        dispatcher: Arc::new(AlertDispatcher::new(Arc::new(HttpTransport::new()))),
        connectivity: connectivity.clone(),
        settings,
        metrics: MetricsCollector::new(),
        debug_dir: options.debug_dir.clone(),
    });

    let probe_token = CancellationToken::new();
    let probe = tokio::spawn(connectivity::probe_loop(
        connectivity,
        options.probe_addr,
        options.probe_interval,
        probe_token.clone(),
    ));

    let mut controller = MonitorController::new(Arc::clone(&ctx));
    controller.start()?;

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Ctrl-C received, shutting down");

    controller.stop().await?;
    probe_token.cancel();
    probe.await.context("connectivity probe failed to join")?;

    let snapshot = ctx.metrics.get_snapshot().await;
    let pending = ctx.dispatcher.queue().len().await;
    info!(
        "ran {} tick(s): {} alert(s), {} skipped, {} capture failure(s), {} alert(s) still queued",
        snapshot.tick_count,
        snapshot.alert_count,
        snapshot.skipped_tick_count,
        snapshot.capture_failure_count,
        pending
    );
    Ok(())
}
