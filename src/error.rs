// Disconnect monitor error types

use thiserror::Error;

/// Failures inside a frame analyzer.
///
/// These never cross the `FrameAnalyzer` boundary; analyzers fold them into a
/// `DetectionResult` so the detector always has a defined next state.
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("recognizer initialization failed: {0}")]
    Initialization(String),

    #[error("recognition failed: {0}")]
    Recognition(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures while handing a notification to its transport.
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("destination answered with HTTP {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("invalid destination: {0}")]
    InvalidDestination(String),
}

impl From<ureq::Error> for DeliveryError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::Status(code, _) => DeliveryError::Status(code),
            ureq::Error::Transport(transport) => DeliveryError::Transport(transport.to_string()),
        }
    }
}

impl From<url::ParseError> for DeliveryError {
    fn from(err: url::ParseError) -> Self {
        DeliveryError::InvalidDestination(err.to_string())
    }
}
