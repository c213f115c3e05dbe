//! Session countdown shown next to the reset control.

use serde::Serialize;

use super::SessionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CountdownBand {
    Healthy,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SessionCountdown {
    pub remaining_ms: i64,
    pub timeout_ms: u64,
    pub percentage: f64,
}

impl SessionCountdown {
    /// Remaining time at `now_ms`. Zero when locked.
    pub fn new(status: &SessionStatus, now_ms: i64) -> Self {
        let remaining_ms = status
            .unlocked_till
            .map(|till| (till - now_ms).max(0))
            .unwrap_or(0);
        let percentage = if status.timeout_ms == 0 {
            0.0
        } else {
            (remaining_ms as f64 / status.timeout_ms as f64 * 100.0).clamp(0.0, 100.0)
        };
        Self {
            remaining_ms,
            timeout_ms: status.timeout_ms,
            percentage,
        }
    }

    /// `mm:ss`, rounding to the nearest second.
    pub fn formatted(&self) -> String {
        let total = (self.remaining_ms.max(0) as f64 / 1000.0).round() as i64;
        format!("{:02}:{:02}", total / 60, total % 60)
    }

    pub fn band(&self) -> CountdownBand {
        if self.percentage > 50.0 {
            CountdownBand::Healthy
        } else if self.percentage > 20.0 {
            CountdownBand::Warning
        } else {
            CountdownBand::Critical
        }
    }

    pub fn is_expired(&self) -> bool {
        self.remaining_ms == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionState;

    fn unlocked(till: i64) -> SessionStatus {
        SessionStatus {
            state: SessionState::Unlocked,
            is_locked: false,
            has_setup_password: true,
            unlocked_till: Some(till),
            timeout_ms: 300_000,
        }
    }

    #[test]
    fn full_window() {
        let c = SessionCountdown::new(&unlocked(300_000), 0);
        assert_eq!(c.formatted(), "05:00");
        assert_eq!(c.percentage, 100.0);
        assert_eq!(c.band(), CountdownBand::Healthy);
    }

    #[test]
    fn bands() {
        assert_eq!(SessionCountdown::new(&unlocked(150_000), 0).band(), CountdownBand::Warning);
        assert_eq!(SessionCountdown::new(&unlocked(60_001), 0).band(), CountdownBand::Warning);
        assert_eq!(SessionCountdown::new(&unlocked(60_000), 0).band(), CountdownBand::Critical);
    }

    #[test]
    fn rounds_to_nearest_second() {
        assert_eq!(SessionCountdown::new(&unlocked(61_499), 0).formatted(), "01:01");
        assert_eq!(SessionCountdown::new(&unlocked(61_500), 0).formatted(), "01:02");
    }

    #[test]
    fn locked_or_past_deadline_is_zero() {
        let locked = SessionStatus {
            state: SessionState::Locked,
            is_locked: true,
            has_setup_password: true,
            unlocked_till: None,
            timeout_ms: 300_000,
        };
        let c = SessionCountdown::new(&locked, 0);
        assert_eq!(c.formatted(), "00:00");
        assert_eq!(c.band(), CountdownBand::Critical);
        assert!(c.is_expired());

        let c = SessionCountdown::new(&unlocked(1_000), 5_000);
        assert_eq!(c.remaining_ms, 0);
        assert_eq!(c.percentage, 0.0);
    }
}
