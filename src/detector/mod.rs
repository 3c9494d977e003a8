//! Hysteresis between noisy per-frame verdicts and external alerts.
//!
//! The detector itself is stateless configuration. The poll loop owns one
//! [`AlertLogicState`] per monitoring session and lends it to
//! [`DisconnectDetector::observe`] on every tick.

pub mod config;
pub mod state;

pub use config::AlertTiming;
pub use state::{AlertLogicState, DetectorPhase};

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Serialize;

use crate::analyzer::DetectionResult;

/// A confirmed disconnect worth telling someone about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertEvent {
    pub reason: String,
    pub duration_seconds: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectorEvent {
    /// First accepted disconnect verdict. Log only.
    Suspected { reason: String, at: DateTime<Utc> },
    Alert(AlertEvent),
    /// A connected verdict ended the outage. Log only.
    Restored { outage_seconds: u64, at: DateTime<Utc> },
}

impl DetectorEvent {
    pub fn as_alert(&self) -> Option<&AlertEvent> {
        match self {
            DetectorEvent::Alert(alert) => Some(alert),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct DisconnectDetector {
    timing: AlertTiming,
}

impl DisconnectDetector {
    pub fn new(timing: AlertTiming) -> Self {
        Self { timing }
    }

    pub fn timing(&self) -> &AlertTiming {
        &self.timing
    }

    pub fn set_timing(&mut self, timing: AlertTiming) {
        self.timing = timing;
    }

    /// Apply one tick's verdict.
    ///
    /// Failed analyses (transient or init) hold the current state: they carry
    /// no information about the screen.
    pub fn observe(
        &self,
        state: &mut AlertLogicState,
        result: &DetectionResult,
        sensitivity: f32,
        now: DateTime<Utc>,
    ) -> Option<DetectorEvent> {
        if !result.is_informative() {
            debug!("analysis unavailable ({}), holding detector state", result.reason);
            return None;
        }

        let accepted = result.is_disconnected && result.confidence >= sensitivity;

        match (accepted, state.disconnect_start_time) {
            (true, None) => {
                state.disconnect_start_time = Some(now);
                info!(
                    "disconnect suspected (confidence {:.2}): {}",
                    result.confidence, result.reason
                );
                Some(DetectorEvent::Suspected {
                    reason: result.reason.clone(),
                    at: now,
                })
            }
            (true, Some(start)) => {
                let elapsed = now - start;
                if elapsed >= self.timing.alert_ceiling() {
                    debug!(
                        "disconnect ongoing for {}s, past alert ceiling; not alerting",
                        elapsed.num_seconds()
                    );
                    return None;
                }

                let confirmed = elapsed >= self.timing.confirmation_window();
                let spaced = state
                    .last_alert_time
                    .map_or(true, |last| now - last >= self.timing.repeat_interval());
                if !(confirmed && spaced) {
                    return None;
                }

                state.last_alert_time = Some(now);
                let alert = AlertEvent {
                    reason: result.reason.clone(),
                    duration_seconds: elapsed.num_seconds().max(0) as u64,
                    timestamp: now,
                };
                warn!(
                    "disconnect confirmed for {}s: {}",
                    alert.duration_seconds, alert.reason
                );
                Some(DetectorEvent::Alert(alert))
            }
            (false, Some(start)) => {
                let outage_seconds = (now - start).num_seconds().max(0) as u64;
                state.reset();
                info!("connection restored after {outage_seconds}s");
                Some(DetectorEvent::Restored {
                    outage_seconds,
                    at: now,
                })
            }
            (false, None) => None,
        }
    }
}
