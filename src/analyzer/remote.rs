use std::time::Duration;

use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};

use super::{AnalyzeOptions, DetectionResult, FrameAnalyzer};
use crate::error::AnalysisError;
use crate::frame::Frame;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RemoteRequest<'a> {
    base64_image: String,
    prompt: &'a str,
    focus_mode: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RemoteVerdict {
    is_disconnected: bool,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    reason: String,
}

/// Delegates the decision to a vision-model service over HTTP.
///
/// The raw, unprocessed frame is sent; the service is expected to answer with
/// `{isDisconnected, confidence, reason}` JSON, possibly wrapped in a markdown
/// code fence.
pub struct RemoteAnalyzer {
    endpoint: String,
    prompt: String,
    agent: ureq::Agent,
}

impl RemoteAnalyzer {
    pub fn new(endpoint: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self::with_timeout(endpoint, prompt, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        endpoint: impl Into<String>,
        prompt: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            prompt: prompt.into(),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    async fn request(&self, frame: &Frame, options: AnalyzeOptions) -> Result<DetectionResult, AnalysisError> {
        let body = serde_json::to_string(&RemoteRequest {
            base64_image: frame.to_base64(),
            prompt: &self.prompt,
            focus_mode: options.focus_mode,
        })
        .map_err(|err| AnalysisError::InvalidResponse(format!("request encoding: {err}")))?;

        let agent = self.agent.clone();
        let endpoint = self.endpoint.clone();
        let text = tokio::task::spawn_blocking(move || post_json(&agent, &endpoint, &body))
            .await
            .map_err(|err| AnalysisError::Transport(format!("request worker join failed: {err}")))??;

        parse_verdict(&text)
    }
}

#[async_trait]
impl FrameAnalyzer for RemoteAnalyzer {
    fn name(&self) -> &'static str {
        "remote"
    }

    async fn analyze(&self, frame: Frame, options: AnalyzeOptions) -> DetectionResult {
        match self.request(&frame, options).await {
            Ok(result) => result,
            Err(err) => {
                warn!("remote analysis via {} failed: {err}", self.endpoint);
                DetectionResult::failure(format!("failed: {err}"))
            }
        }
    }
}

fn post_json(agent: &ureq::Agent, endpoint: &str, body: &str) -> Result<String, AnalysisError> {
    let response = agent
        .post(endpoint)
        .set("Content-Type", "application/json")
        .set("Accept", "application/json")
        .send_string(body)
        .map_err(|err| match err {
            ureq::Error::Status(code, _) => AnalysisError::Transport(format!("HTTP {code}")),
            ureq::Error::Transport(transport) => AnalysisError::Transport(transport.to_string()),
        })?;

    let status = response.status();
    if !(200..300).contains(&status) {
        return Err(AnalysisError::Transport(format!("HTTP {status}")));
    }

    let content_type = response.content_type().to_ascii_lowercase();
    if !content_type.contains("json") {
        return Err(AnalysisError::InvalidResponse(format!(
            "unexpected content type {content_type}"
        )));
    }

    response
        .into_string()
        .map_err(|err| AnalysisError::Transport(format!("reading body: {err}")))
}

/// Parse a service answer into a verdict, tolerating markdown fences and a
/// JSON-encoded string body.
fn parse_verdict(body: &str) -> Result<DetectionResult, AnalysisError> {
    let cleaned = strip_markdown_fence(body);
    let verdict = match serde_json::from_str::<RemoteVerdict>(cleaned) {
        Ok(verdict) => verdict,
        Err(err) => {
            let inner: String = serde_json::from_str(cleaned)
                .map_err(|_| AnalysisError::InvalidResponse(err.to_string()))?;
            serde_json::from_str(strip_markdown_fence(&inner))
                .map_err(|err| AnalysisError::InvalidResponse(err.to_string()))?
        }
    };

    let reason = if verdict.reason.trim().is_empty() {
        "remote analyzer gave no reason".to_string()
    } else {
        verdict.reason
    };

    Ok(if verdict.is_disconnected {
        DetectionResult::disconnected(verdict.confidence, reason)
    } else {
        DetectionResult::connected(verdict.confidence, reason)
    })
}

/// Remove a surrounding ```` ``` ```` / ```` ```json ```` fence, if any.
pub fn strip_markdown_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = match rest.find('\n') {
        Some(pos) => &rest[pos + 1..],
        None => rest.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    let rest = rest.trim_end();
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
