use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::AlertTiming;

/// Phase of the alert state machine, derived from [`AlertLogicState`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum DetectorPhase {
    Connected,
    /// Disconnect seen, confirmation window not yet elapsed.
    Suspected,
    Alerting,
    /// Past the alert ceiling; detection continues, alerts are suppressed.
    Ceased,
}

impl Default for DetectorPhase {
    fn default() -> Self {
        DetectorPhase::Connected
    }
}

/// The only state the detector carries between polls.
///
/// `disconnect_start_time` is set iff the latest informative verdict was an
/// accepted disconnect and no connected verdict has been seen since.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertLogicState {
    pub disconnect_start_time: Option<DateTime<Utc>>,
    pub last_alert_time: Option<DateTime<Utc>>,
}

impl AlertLogicState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_connected(&self) -> bool {
        self.disconnect_start_time.is_none()
    }

    pub fn phase(&self, now: DateTime<Utc>, timing: &AlertTiming) -> DetectorPhase {
        let Some(start) = self.disconnect_start_time else {
            return DetectorPhase::Connected;
        };
        let elapsed = now - start;
        if elapsed >= timing.alert_ceiling() {
            DetectorPhase::Ceased
        } else if elapsed >= timing.confirmation_window() {
            DetectorPhase::Alerting
        } else {
            DetectorPhase::Suspected
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn phase_follows_elapsed_time() {
        let timing = AlertTiming::default();
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let mut state = AlertLogicState::new();
        assert_eq!(state.phase(t0, &timing), DetectorPhase::Connected);

        state.disconnect_start_time = Some(t0);
        assert_eq!(state.phase(t0 + Duration::seconds(14), &timing), DetectorPhase::Suspected);
        assert_eq!(state.phase(t0 + Duration::seconds(15), &timing), DetectorPhase::Alerting);
        assert_eq!(state.phase(t0 + Duration::seconds(599), &timing), DetectorPhase::Alerting);
        assert_eq!(state.phase(t0 + Duration::seconds(600), &timing), DetectorPhase::Ceased);

        state.reset();
        assert!(state.is_connected());
        assert_eq!(state.last_alert_time, None);
    }
}
