//! Alerting System
//!
//! Provides the alert cooldown window (one dispatch per suppression window)
//! and the fire-and-forget sinks that carry an alert to the driver or to an
//! external actuator.

mod manager;
mod sink;

pub use manager::{AlertConfig, AlertManager, AlertState, AlertTrigger};
pub use sink::{AlertSink, ChannelAlertSink, FanoutSink, LogAlertSink};

use thiserror::Error;

/// Alerting error types
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("Invalid alert configuration: {0}")]
    Config(String),
}
