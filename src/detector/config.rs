use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Upper bound for every timing field. Keeps the conversions to `Duration`
/// well inside chrono's range.
pub const MAX_TIMING_SECS: u64 = 86_400;

/// Timing parameters of the alert state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertTiming {
    /// Continuous accepted detection required before the first alert
    pub confirmation_window_secs: u64,

    /// Minimum spacing between alerts for one outage
    pub repeat_interval_secs: u64,

    /// Outage age after which alerts stop
    pub alert_ceiling_secs: u64,
}

impl Default for AlertTiming {
    fn default() -> Self {
        Self {
            confirmation_window_secs: 15,
            repeat_interval_secs: 60,
            alert_ceiling_secs: 600,
        }
    }
}

impl AlertTiming {
    pub fn confirmation_window(&self) -> Duration {
        seconds(self.confirmation_window_secs)
    }

    pub fn repeat_interval(&self) -> Duration {
        seconds(self.repeat_interval_secs)
    }

    pub fn alert_ceiling(&self) -> Duration {
        seconds(self.alert_ceiling_secs)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.confirmation_window_secs == 0 {
            return Err("confirmation window must be greater than zero".into());
        }
        if self.alert_ceiling_secs > MAX_TIMING_SECS {
            return Err(format!(
                "alert ceiling ({}s) exceeds the {MAX_TIMING_SECS}s limit",
                self.alert_ceiling_secs
            ));
        }
        if self.repeat_interval_secs > self.alert_ceiling_secs {
            return Err(format!(
                "repeat interval ({}s) must not exceed the alert ceiling ({}s)",
                self.repeat_interval_secs, self.alert_ceiling_secs
            ));
        }
        if self.alert_ceiling_secs <= self.confirmation_window_secs {
            return Err(format!(
                "alert ceiling ({}s) must exceed the confirmation window ({}s)",
                self.alert_ceiling_secs, self.confirmation_window_secs
            ));
        }
        Ok(())
    }
}

fn seconds(secs: u64) -> Duration {
    Duration::seconds(secs.min(MAX_TIMING_SECS) as i64)
}
