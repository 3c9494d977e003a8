use std::time::Duration;

use async_trait::async_trait;
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::detector::AlertEvent;
use crate::error::DeliveryError;

const DEFAULT_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DestinationKind {
    /// Pixel-style GET with the alert encoded in the query string.
    Trigger,
    /// JSON POST.
    Webhook,
}

/// A configured notification endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Trigger { url: String, id: String },
    Webhook { url: String },
}

impl Destination {
    pub fn kind(&self) -> DestinationKind {
        match self {
            Destination::Trigger { .. } => DestinationKind::Trigger,
            Destination::Webhook { .. } => DestinationKind::Webhook,
        }
    }

    /// Render the request this destination expects for `event`.
    pub fn payload(&self, event: &AlertEvent) -> Result<NotificationPayload, DeliveryError> {
        match self {
            Destination::Trigger { url, id } => {
                let text = trigger_text(event);
                let url = Url::parse_with_params(
                    url,
                    &[("id", id.as_str()), ("text", text.as_str()), ("type", "disconnect")],
                )?;
                Ok(NotificationPayload {
                    kind: DestinationKind::Trigger,
                    method: HttpMethod::Get,
                    url: url.into(),
                    body: None,
                })
            }
            Destination::Webhook { url } => {
                let url = Url::parse(url)?;
                let body = serde_json::to_string(&WebhookBody {
                    event: "disconnect",
                    reason: &event.reason,
                    duration: event.duration_seconds,
                    timestamp: event.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
                })
                .map_err(|err| DeliveryError::InvalidDestination(err.to_string()))?;
                Ok(NotificationPayload {
                    kind: DestinationKind::Webhook,
                    method: HttpMethod::Post,
                    url: url.into(),
                    body: Some(body),
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A fully rendered request, independent of when it is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub kind: DestinationKind,
    pub method: HttpMethod,
    pub url: String,
    pub body: Option<String>,
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    event: &'static str,
    reason: &'a str,
    duration: u64,
    timestamp: String,
}

fn trigger_text(event: &AlertEvent) -> String {
    format!("Disconnected for {}s: {}", event.duration_seconds, event.reason)
}

#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn deliver(&self, payload: &NotificationPayload) -> Result<(), DeliveryError>;
}

pub struct HttpTransport {
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::with_timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationTransport for HttpTransport {
    async fn deliver(&self, payload: &NotificationPayload) -> Result<(), DeliveryError> {
        let agent = self.agent.clone();
        let payload = payload.clone();
        tokio::task::spawn_blocking(move || send(&agent, &payload))
            .await
            .map_err(|err| DeliveryError::Transport(format!("delivery worker join failed: {err}")))?
    }
}

fn send(agent: &ureq::Agent, payload: &NotificationPayload) -> Result<(), DeliveryError> {
    let response = match (payload.method, payload.body.as_deref()) {
        (HttpMethod::Get, _) => agent.get(&payload.url).call()?,
        (HttpMethod::Post, body) => agent
            .post(&payload.url)
            .set("Content-Type", "application/json")
            .send_string(body.unwrap_or("{}"))?,
    };

    let status = response.status();
    if (200..300).contains(&status) {
        Ok(())
    } else {
        Err(DeliveryError::Status(status))
    }
}
