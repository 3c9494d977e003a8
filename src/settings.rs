use anyhow::{Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
    time::SystemTime,
};

use crate::alerts::Destination;
use crate::detector::AlertTiming;

pub const MIN_INTERVAL_SECS: u64 = 5;
pub const MAX_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerSettings {
    pub url: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookSettings {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitorSettings {
    pub check_interval_seconds: u64,
    pub sensitivity_threshold: f32,
    pub focus_mode: bool,
    pub local_audio_enabled: bool,
    pub trigger: Option<TriggerSettings>,
    pub webhook: Option<WebhookSettings>,
    pub alert_timing: AlertTiming,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            check_interval_seconds: 5,
            sensitivity_threshold: 0.7,
            focus_mode: false,
            local_audio_enabled: false,
            trigger: None,
            webhook: None,
            alert_timing: AlertTiming::default(),
        }
    }
}

impl MonitorSettings {
    /// Clamp numeric fields into their supported ranges.
    pub fn normalized(mut self) -> Self {
        self.check_interval_seconds = self
            .check_interval_seconds
            .clamp(MIN_INTERVAL_SECS, MAX_INTERVAL_SECS);
        self.sensitivity_threshold = if self.sensitivity_threshold.is_nan() {
            MonitorSettings::default().sensitivity_threshold
        } else {
            self.sensitivity_threshold.clamp(0.0, 1.0)
        };
        if let Err(msg) = self.alert_timing.validate() {
            warn!("ignoring alert timing ({msg}); using defaults");
            self.alert_timing = AlertTiming::default();
        }
        self
    }

    pub fn destinations(&self) -> Vec<Destination> {
        let mut destinations = Vec::new();
        if let Some(trigger) = &self.trigger {
            destinations.push(Destination::Trigger {
                url: trigger.url.clone(),
                id: trigger.id.clone(),
            });
        }
        if let Some(webhook) = &self.webhook {
            destinations.push(Destination::Webhook {
                url: webhook.url.clone(),
            });
        }
        destinations
    }

    fn apply_env(&mut self) {
        if let Ok(value) = std::env::var("DCMON_INTERVAL_SECS") {
            match value.trim().parse() {
                Ok(secs) => self.check_interval_seconds = secs,
                Err(_) => warn!("DCMON_INTERVAL_SECS must be an integer number of seconds"),
            }
        }
        if let Ok(value) = std::env::var("DCMON_SENSITIVITY") {
            match value.trim().parse() {
                Ok(threshold) => self.sensitivity_threshold = threshold,
                Err(_) => warn!("DCMON_SENSITIVITY must be a number between 0 and 1"),
            }
        }
        if let Ok(url) = std::env::var("DCMON_WEBHOOK_URL") {
            if !url.trim().is_empty() {
                self.webhook = Some(WebhookSettings { url });
            }
        }
    }
}

struct StoreState {
    settings: MonitorSettings,
    modified: Option<SystemTime>,
}

/// JSON-backed settings, read by the poll loop at tick boundaries.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<StoreState>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let (settings, modified) = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            let parsed = serde_json::from_str(&contents).unwrap_or_else(|err| {
                warn!("invalid settings in {}: {err}; using defaults", path.display());
                MonitorSettings::default()
            });
            (parsed, modified_time(&path))
        } else {
            (MonitorSettings::default(), None)
        };

        Ok(Self {
            path,
            data: RwLock::new(StoreState {
                settings: finalize(settings),
                modified,
            }),
        })
    }

    pub fn snapshot(&self) -> MonitorSettings {
        self.read().settings.clone()
    }

    pub fn update(&self, settings: MonitorSettings) -> Result<MonitorSettings> {
        let settings = settings.normalized();
        let mut guard = self.write();
        self.persist(&settings)?;
        guard.settings = settings.clone();
        guard.modified = modified_time(&self.path);
        Ok(settings)
    }

    /// Reload the file when its modification time moved. Returns true when
    /// new settings were applied. A malformed file keeps the previous values.
    pub fn refresh(&self) -> Result<bool> {
        let modified = modified_time(&self.path);
        if modified.is_none() || modified == self.read().modified {
            return Ok(false);
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let mut guard = self.write();
        guard.modified = modified;
        let parsed: MonitorSettings = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid settings in {}", self.path.display()))?;
        guard.settings = finalize(parsed);
        Ok(true)
    }

    fn persist(&self, data: &MonitorSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }

    fn read(&self) -> RwLockReadGuard<'_, StoreState> {
        self.data.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, StoreState> {
        self.data.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn finalize(mut settings: MonitorSettings) -> MonitorSettings {
    settings.apply_env();
    settings.normalized()
}

fn modified_time(path: &PathBuf) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalization_clamps_ranges() {
        let settings = MonitorSettings {
            check_interval_seconds: 1,
            sensitivity_threshold: 1.5,
            ..MonitorSettings::default()
        }
        .normalized();
        assert_eq!(settings.check_interval_seconds, MIN_INTERVAL_SECS);
        assert_eq!(settings.sensitivity_threshold, 1.0);

        let settings = MonitorSettings {
            check_interval_seconds: 3600,
            sensitivity_threshold: -0.3,
            ..MonitorSettings::default()
        }
        .normalized();
        assert_eq!(settings.check_interval_seconds, MAX_INTERVAL_SECS);
        assert_eq!(settings.sensitivity_threshold, 0.0);
    }

    #[test]
    fn invalid_timing_falls_back_to_defaults() {
        let settings = MonitorSettings {
            alert_timing: AlertTiming {
                confirmation_window_secs: 0,
                repeat_interval_secs: 60,
                alert_ceiling_secs: 600,
            },
            ..MonitorSettings::default()
        }
        .normalized();
        assert_eq!(settings.alert_timing, AlertTiming::default());
    }

    #[test]
    fn oversized_timing_falls_back_to_defaults() {
        let settings: MonitorSettings = serde_json::from_str(
            r#"{"alertTiming": {"confirmationWindowSecs": 10000000000000000, "alertCeilingSecs": 20000000000000000}}"#,
        )
        .unwrap();
        let settings = settings.normalized();
        assert_eq!(settings.alert_timing, AlertTiming::default());

        // The detector keeps working with whatever timing survived.
        let detector = crate::detector::DisconnectDetector::new(settings.alert_timing);
        let mut state = crate::detector::AlertLogicState::new();
        let verdict = crate::analyzer::DetectionResult::disconnected(0.9, "connection lost");
        let t0 = chrono::Utc::now();
        detector.observe(&mut state, &verdict, 0.7, t0);
        let event = detector.observe(&mut state, &verdict, 0.7, t0 + chrono::Duration::seconds(15));
        assert!(event.and_then(|e| e.as_alert().cloned()).is_some());
    }

    #[test]
    fn destinations_follow_configured_credentials() {
        let mut settings = MonitorSettings::default();
        assert!(settings.destinations().is_empty());

        settings.trigger = Some(TriggerSettings {
            url: "https://notify.example/push".into(),
            id: "abc".into(),
        });
        settings.webhook = Some(WebhookSettings {
            url: "https://hooks.example/dc".into(),
        });
        let destinations = settings.destinations();
        assert_eq!(destinations.len(), 2);
        assert!(matches!(destinations[0], Destination::Trigger { .. }));
        assert!(matches!(destinations[1], Destination::Webhook { .. }));
    }
}
