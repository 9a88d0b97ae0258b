//! Drowsiness Monitor
//!
//! Wires the synthetic cabin camera into a monitoring session and reports
//! status changes and alerts through tracing.

pub mod config;

pub use crate::config::{AppConfig, DemoConfig, LogConfig};

use alerting::LogAlertSink;
use camera_capture::{CameraError, FrameSource, SyntheticCamera};
use dms::{DmsError, MonitorSession, SessionSummary, StateEvent};
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Monitor error types
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("DMS error: {0}")]
    Dms(#[from] DmsError),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

/// Initialize logging. `RUST_LOG` wins over the configured level.
pub fn init_logging(log: &LogConfig) -> Result<(), MonitorError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.level));
    let builder = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true);

    let result = if log.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.map_err(|e| MonitorError::Logging(e.to_string()))
}

/// Run the pipeline until Ctrl-C or the configured demo duration
pub async fn run(config: AppConfig) -> Result<SessionSummary, MonitorError> {
    config.validate()?;

    let handle = MonitorSession::spawn(config.dms.clone(), config.demo.detector(), LogAlertSink)?;
    let mut events = handle.subscribe();

    let mut camera = SyntheticCamera::new(config.camera.clone())?;
    let feed = handle.feed();
    camera.start(Box::new(move |frame| feed.offer(frame)))?;

    let stop = async {
        match config.demo.duration() {
            Some(duration) => tokio::time::sleep(duration).await,
            None => {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Ctrl-C handler unavailable: {}", e);
                    std::future::pending::<()>().await;
                }
                info!("Ctrl-C received, shutting down");
            }
        }
    };
    tokio::pin!(stop);

    loop {
        tokio::select! {
            _ = &mut stop => break,
            event = events.recv() => match event {
                Ok(StateEvent::StatusChanged(status)) => info!("Status: {}", status),
                Ok(StateEvent::AlertDialogShown { closed_for_ms }) => {
                    warn!("Eyes closed for {} ms, showing alert", closed_for_ms)
                }
                Ok(other) => debug!("State event: {:?}", other),
                Err(RecvError::Lagged(missed)) => warn!("Missed {} state events", missed),
                Err(RecvError::Closed) => break,
            },
        }
    }

    camera.stop();
    let summary = handle.shutdown().await?;
    info!("Monitoring stopped: {:?}", summary);
    Ok(summary)
}
