use std::sync::Arc;

use async_trait::async_trait;
use log::{error, info, warn};
use tokio::sync::watch;

use super::keywords::{evaluate_text, KeywordSet};
use super::profile::AnalyzerProfile;
use super::{AnalyzeOptions, DetectionResult, FrameAnalyzer};
use crate::error::AnalysisError;
use crate::frame::Frame;
use crate::preprocess::{preprocess, PreprocessPreset};

/// Raw output of a text-recognition backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedText {
    pub text: String,
    /// Backend confidence, 0-100.
    pub confidence: f32,
}

/// Text-recognition backend used by [`LocalAnalyzer`].
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// One-time start-up (model loading, language data checks). An error here
    /// is permanent.
    async fn initialize(&self) -> Result<(), AnalysisError>;

    async fn recognize(&self, frame: &Frame) -> Result<RecognizedText, AnalysisError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    Loading,
    Ready,
    Failed(String),
}

/// Preprocess, recognize, then keyword-match.
pub struct LocalAnalyzer {
    recognizer: Arc<dyn TextRecognizer>,
    profile: Arc<AnalyzerProfile>,
    keywords: KeywordSet,
    readiness: watch::Sender<Readiness>,
}

impl LocalAnalyzer {
    pub fn new(recognizer: Arc<dyn TextRecognizer>, profile: Arc<AnalyzerProfile>) -> anyhow::Result<Self> {
        let keywords = profile.keyword_set()?;
        let (readiness, _) = watch::channel(Readiness::Loading);
        Ok(Self {
            recognizer,
            profile,
            keywords,
            readiness,
        })
    }

    /// Bring the backend up. Call once, typically from a spawned task; until it
    /// finishes, `analyze` answers with a warming placeholder.
    pub async fn initialize(&self) {
        if *self.readiness.borrow() != Readiness::Loading {
            return;
        }

        info!("initializing {} text recognizer", self.recognizer.name());
        let next = match self.recognizer.initialize().await {
            Ok(()) => {
                info!("{} text recognizer ready", self.recognizer.name());
                Readiness::Ready
            }
            Err(err) => {
                error!("{} text recognizer unavailable: {err}", self.recognizer.name());
                Readiness::Failed(err.to_string())
            }
        };
        self.readiness.send_replace(next);
    }

    /// Resolves once initialization has finished, successfully or not.
    pub async fn wait_initialized(&self) -> Readiness {
        let mut rx = self.readiness.subscribe();
        let readiness = match rx.wait_for(|state| *state != Readiness::Loading).await {
            Ok(state) => (*state).clone(),
            Err(_) => self.readiness.borrow().clone(),
        };
        readiness
    }
}

#[async_trait]
impl FrameAnalyzer for LocalAnalyzer {
    fn name(&self) -> &'static str {
        "local"
    }

    fn readiness(&self) -> Readiness {
        self.readiness.borrow().clone()
    }

    async fn analyze(&self, frame: Frame, options: AnalyzeOptions) -> DetectionResult {
        match self.readiness() {
            Readiness::Ready => {}
            Readiness::Loading => {
                return DetectionResult::warming("text recognizer still loading");
            }
            Readiness::Failed(cause) => {
                return DetectionResult::init_error(format!("init error: {cause}"));
            }
        }

        let config = *self
            .profile
            .preset(PreprocessPreset::from_focus_mode(options.focus_mode));
        let processed = match tokio::task::spawn_blocking(move || preprocess(&frame, &config)).await {
            Ok(processed) => processed,
            Err(err) => {
                warn!("preprocess worker join failed: {err}");
                return DetectionResult::failure(format!("failed: preprocess worker: {err}"));
            }
        };

        match self.recognizer.recognize(&processed).await {
            Ok(recognized) => evaluate_text(&self.keywords, &recognized.text, recognized.confidence)
                .with_processed_image(processed),
            Err(err) => {
                warn!("{} recognition failed: {err}", self.recognizer.name());
                DetectionResult::failure(format!("failed: {err}"))
            }
        }
    }
}
