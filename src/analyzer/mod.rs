//! Frame analyzers: "is this a disconnect/error screen?"
//!
//! Two implementations sit behind [`FrameAnalyzer`]:
//! - [`LocalAnalyzer`] preprocesses the frame, runs a [`TextRecognizer`] and
//!   matches the recognized text against the profile's keyword list.
//! - [`RemoteAnalyzer`] ships the raw frame to a vision-model service.
//!
//! Neither returns errors across the trait boundary. Failures become a
//! non-disconnected [`DetectionResult`] whose [`AnalysisStatus`] tells the
//! detector whether the verdict is real.

pub mod keywords;
pub mod local;
pub mod profile;
pub mod remote;
pub mod tesseract;

pub use keywords::{evaluate_text, normalize_text, KeywordMatch, KeywordPattern, KeywordSet};
pub use local::{LocalAnalyzer, Readiness, RecognizedText, TextRecognizer};
pub use profile::AnalyzerProfile;
pub use remote::RemoteAnalyzer;
pub use tesseract::TesseractRecognizer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::frame::Frame;

/// Keyword hits are never reported below this confidence.
pub const KEYWORD_CONFIDENCE_FLOOR: f32 = 0.85;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalyzeOptions {
    /// Use the tighter crop / stronger upscale preset.
    pub focus_mode: bool,
}

/// How a [`DetectionResult`] came to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnalysisStatus {
    /// The analyzer looked at the frame and reached a verdict.
    Complete,
    /// The backend is still starting up; counts as a connected verdict.
    Warming,
    /// This tick's analysis failed; the verdict carries no information.
    Failed,
    /// The backend can never start; every call short-circuits here.
    InitError,
}

#[derive(Debug, Clone)]
pub struct DetectionResult {
    pub is_disconnected: bool,
    /// In `[0, 1]`.
    pub confidence: f32,
    pub reason: String,
    pub debug_text: Option<String>,
    pub processed_image: Option<Frame>,
    pub status: AnalysisStatus,
}

impl DetectionResult {
    pub fn disconnected(confidence: f32, reason: impl Into<String>) -> Self {
        Self::verdict(true, confidence, reason)
    }

    pub fn connected(confidence: f32, reason: impl Into<String>) -> Self {
        Self::verdict(false, confidence, reason)
    }

    fn verdict(is_disconnected: bool, confidence: f32, reason: impl Into<String>) -> Self {
        Self {
            is_disconnected,
            confidence: clamp_confidence(confidence),
            reason: reason.into(),
            debug_text: None,
            processed_image: None,
            status: AnalysisStatus::Complete,
        }
    }

    pub fn warming(reason: impl Into<String>) -> Self {
        Self {
            status: AnalysisStatus::Warming,
            ..Self::connected(0.0, reason)
        }
    }

    /// `{false, 0, reason}` for a failed tick.
    pub fn failure(reason: impl Into<String>) -> Self {
        Self {
            status: AnalysisStatus::Failed,
            ..Self::connected(0.0, reason)
        }
    }

    pub fn init_error(reason: impl Into<String>) -> Self {
        Self {
            status: AnalysisStatus::InitError,
            ..Self::connected(0.0, reason)
        }
    }

    pub fn with_debug_text(mut self, text: impl Into<String>) -> Self {
        self.debug_text = Some(text.into());
        self
    }

    pub fn with_processed_image(mut self, frame: Frame) -> Self {
        self.processed_image = Some(frame);
        self
    }

    /// True when the verdict reflects the frame (complete or warming).
    pub fn is_informative(&self) -> bool {
        matches!(self.status, AnalysisStatus::Complete | AnalysisStatus::Warming)
    }
}

pub(crate) fn clamp_confidence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// A pluggable "is this a disconnect screen?" capability.
#[async_trait]
pub trait FrameAnalyzer: Send + Sync {
    /// Analyzer identifier, used in logs.
    fn name(&self) -> &'static str;

    /// Backend readiness. Analyzers without start-up work are always ready.
    fn readiness(&self) -> Readiness {
        Readiness::Ready
    }

    /// Analyze one frame. Must not panic or error; see module docs.
    async fn analyze(&self, frame: Frame, options: AnalyzeOptions) -> DetectionResult;
}
