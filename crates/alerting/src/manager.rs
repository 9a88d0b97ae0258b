//! Alert Manager Implementation

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::AlertError;

/// Alert configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Suppression window after each dispatch (milliseconds)
    pub cooldown_ms: u64,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self { cooldown_ms: 6000 }
    }
}

impl AlertConfig {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub fn validate(&self) -> Result<(), AlertError> {
        if self.cooldown_ms == 0 {
            return Err(AlertError::Config("cooldown_ms must be positive".into()));
        }
        Ok(())
    }
}

/// Dispatch lifecycle: Idle → Triggered → Cooldown → Idle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlertState {
    /// Next request will be honored
    #[default]
    Idle,
    /// Request honored, dispatch in progress
    Triggered { at: Instant },
    /// Dispatch done, further requests suppressed until `until`
    Cooldown { until: Instant },
}

/// A single honored alert dispatch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertTrigger {
    /// Dispatch number within the session (1-based)
    pub sequence: u64,
    /// How long both eyes had been closed when the alert fired (ms)
    pub closed_for_ms: u64,
    /// Frame that triggered the alert
    pub frame_sequence: u64,
}

/// Rate limiter for alert dispatches
pub struct AlertManager {
    /// Configuration
    config: AlertConfig,
    /// Current window state
    state: AlertState,
    /// Dispatches honored so far
    dispatch_count: u64,
}

impl AlertManager {
    /// Create a new alert manager
    pub fn new(config: AlertConfig) -> Self {
        info!("Creating alert manager with config: {:?}", config);
        Self {
            config,
            state: AlertState::Idle,
            dispatch_count: 0,
        }
    }

    /// Ask to dispatch an alert at `now`. Honored only outside a suppression window.
    pub fn request(&mut self, now: Instant) -> bool {
        self.release_expired(now);

        match self.state {
            AlertState::Idle => {
                self.state = AlertState::Triggered { at: now };
                self.dispatch_count += 1;
                true
            }
            AlertState::Triggered { .. } => {
                debug!("Alert suppressed: dispatch already in progress");
                false
            }
            AlertState::Cooldown { until } => {
                debug!(
                    "Alert suppressed: in cooldown for another {}ms",
                    until.saturating_duration_since(now).as_millis()
                );
                false
            }
        }
    }

    /// Close the dispatch started by `request` and open the suppression window
    pub fn commit(&mut self) {
        if let AlertState::Triggered { at } = self.state {
            self.state = AlertState::Cooldown {
                until: at + self.config.cooldown(),
            };
        }
    }

    /// Time-driven release of an expired window; returns true if the state changed
    pub fn release_expired(&mut self, now: Instant) -> bool {
        match self.state {
            AlertState::Cooldown { until } if now >= until => {
                debug!("Alert cooldown released");
                self.state = AlertState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Current window state
    pub fn state(&self) -> AlertState {
        self.state
    }

    /// Number of honored dispatches
    pub fn dispatch_count(&self) -> u64 {
        self.dispatch_count
    }
}

impl Default for AlertManager {
    fn default() -> Self {
        Self::new(AlertConfig::default())
    }
}
