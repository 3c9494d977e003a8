use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{ArgGroup, Parser, ValueEnum};

use disconnect_monitor::analyzer::tesseract::DEFAULT_LANGUAGES;
use disconnect_monitor::connectivity::{DEFAULT_PROBE_ADDR, DEFAULT_PROBE_INTERVAL_SECS};
use disconnect_monitor::{AnalyzerKind, CaptureConfig, RunOptions};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum AnalyzerArg {
    /// Tesseract OCR plus keyword matching
    Local,
    /// Vision-model HTTP service
    Remote,
}

#[derive(Parser, Debug)]
#[command(
    name = "disconnect-monitor",
    about = "Watch screenshots for disconnect dialogs and send alerts",
    group(ArgGroup::new("source").required(true).args(["capture_file", "capture_dir"]))
)]
struct Cli {
    /// Settings JSON (created on first update, defaults when missing)
    #[arg(long, env = "DCMON_SETTINGS", default_value = "monitor-settings.json")]
    settings: PathBuf,

    /// Screenshot file re-read every tick
    #[arg(long)]
    capture_file: Option<PathBuf>,

    /// Directory whose newest image is used every tick
    #[arg(long)]
    capture_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = AnalyzerArg::Local)]
    analyzer: AnalyzerArg,

    #[arg(long, env = "DCMON_REMOTE_URL")]
    remote_url: Option<String>,

    /// Analyzer profile JSON (keywords, preprocessing presets, prompt)
    #[arg(long)]
    profile: Option<PathBuf>,

    #[arg(long, default_value = "tesseract")]
    tesseract_bin: PathBuf,

    #[arg(long, default_value = DEFAULT_LANGUAGES)]
    languages: String,

    /// TCP address probed to decide whether alerts can be sent
    #[arg(long, default_value = DEFAULT_PROBE_ADDR)]
    probe_addr: SocketAddr,

    #[arg(long, default_value_t = DEFAULT_PROBE_INTERVAL_SECS)]
    probe_interval_secs: u64,

    /// Write processed frames and recognized text of disconnect verdicts here
    #[arg(long)]
    debug_dir: Option<PathBuf>,
}

impl Cli {
    fn into_options(self) -> RunOptions {
        let capture = match (self.capture_file, self.capture_dir) {
            (Some(file), _) => CaptureConfig::File(file),
            (None, Some(dir)) => CaptureConfig::Directory(dir),
            // clap's required group guarantees one of the two.
            (None, None) => CaptureConfig::Directory(PathBuf::from(".")),
        };
        RunOptions {
            settings_path: self.settings,
            capture,
            analyzer: match self.analyzer {
                AnalyzerArg::Local => AnalyzerKind::Local,
                AnalyzerArg::Remote => AnalyzerKind::Remote,
            },
            remote_url: self.remote_url,
            profile_path: self.profile,
            tesseract_bin: self.tesseract_bin,
            languages: self.languages,
            probe_addr: self.probe_addr,
            probe_interval: Duration::from_secs(self.probe_interval_secs.max(1)),
            debug_dir: self.debug_dir,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();
    log::info!("disconnect monitor starting up...");
    disconnect_monitor::run(cli.into_options()).await
}
