//! DMS configuration

use alerting::AlertConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::DmsError;

/// Eye-openness thresholds for the per-frame verdict.
///
/// All values are detector probabilities in [0, 1]; lower means more closed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierThresholds {
    /// Both eyes below this: eyes closed (strong signal)
    pub both_closed: f32,
    /// Both eyes below this: partially closed (weaker signal)
    pub both_partial: f32,
    /// One eye below this while the other is above `other_open`: squint/wink
    pub one_closed: f32,
    /// Openness the other eye must exceed for the one-eye signal
    pub other_open: f32,
}

impl Default for ClassifierThresholds {
    fn default() -> Self {
        Self {
            both_closed: 0.25,
            both_partial: 0.30,
            one_closed: 0.20,
            other_open: 0.40,
        }
    }
}

impl ClassifierThresholds {
    /// Flags closure earlier (fast detector mode produces lower-confidence probabilities)
    pub fn strict() -> Self {
        Self {
            both_closed: 0.30,
            both_partial: 0.35,
            one_closed: 0.25,
            other_open: 0.45,
        }
    }

    /// Requires deeper closure
    pub fn lenient() -> Self {
        Self {
            both_closed: 0.20,
            both_partial: 0.25,
            one_closed: 0.15,
            other_open: 0.35,
        }
    }

    pub fn validate(&self) -> Result<(), DmsError> {
        let in_range = |v: f32| v > 0.0 && v <= 1.0;
        if ![self.both_closed, self.both_partial, self.one_closed, self.other_open]
            .into_iter()
            .all(in_range)
        {
            return Err(DmsError::Config(format!(
                "thresholds must be in (0, 1]: {:?}",
                self
            )));
        }
        if self.both_closed > self.both_partial {
            return Err(DmsError::Config(
                "both_closed must not exceed both_partial".into(),
            ));
        }
        if self.one_closed >= self.other_open {
            return Err(DmsError::Config(
                "one_closed must be below other_open".into(),
            ));
        }
        Ok(())
    }
}

/// Temporal debouncing of per-frame verdicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebounceConfig {
    /// Consecutive drowsy frames before the drowsy warning is shown
    pub drowsy_streak: u32,
    /// Consecutive awake frames before the awake confirmation is shown
    pub awake_streak: u32,
    /// Continuous both-eyes-closed time before the alert fires (milliseconds)
    pub closure_alert_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            drowsy_streak: 3,
            awake_streak: 5,
            closure_alert_ms: 2000,
        }
    }
}

impl DebounceConfig {
    pub fn closure_alert(&self) -> Duration {
        Duration::from_millis(self.closure_alert_ms)
    }
}

/// DMS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmsConfig {
    /// Per-frame classification thresholds
    pub thresholds: ClassifierThresholds,
    /// Streak lengths and closure timer
    pub debounce: DebounceConfig,
    /// Alert suppression window
    pub alert: AlertConfig,
    /// Upper bound on a single detector call (milliseconds); `None` waits indefinitely
    pub detector_timeout_ms: Option<u64>,
    /// How often the session checks for an expired alert cooldown (milliseconds)
    pub cooldown_tick_ms: u64,
}

impl Default for DmsConfig {
    fn default() -> Self {
        Self {
            thresholds: ClassifierThresholds::default(),
            debounce: DebounceConfig::default(),
            alert: AlertConfig::default(),
            detector_timeout_ms: None,
            cooldown_tick_ms: 100,
        }
    }
}

impl DmsConfig {
    /// Create strict config (earlier closure detection, shorter timer)
    pub fn strict() -> Self {
        Self {
            thresholds: ClassifierThresholds::strict(),
            debounce: DebounceConfig {
                closure_alert_ms: 1500,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Create lenient config (deeper closure required, longer timer)
    pub fn lenient() -> Self {
        Self {
            thresholds: ClassifierThresholds::lenient(),
            debounce: DebounceConfig {
                closure_alert_ms: 2500,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn detector_timeout(&self) -> Option<Duration> {
        self.detector_timeout_ms.map(Duration::from_millis)
    }

    pub fn cooldown_tick(&self) -> Duration {
        Duration::from_millis(self.cooldown_tick_ms.max(1))
    }

    pub fn validate(&self) -> Result<(), DmsError> {
        self.thresholds.validate()?;
        if self.debounce.drowsy_streak == 0 || self.debounce.awake_streak == 0 {
            return Err(DmsError::Config("streak lengths must be positive".into()));
        }
        if self.detector_timeout_ms == Some(0) {
            return Err(DmsError::Config("detector_timeout_ms must be positive".into()));
        }
        self.alert
            .validate()
            .map_err(|e| DmsError::Config(e.to_string()))
    }
}
