//! Driver Monitoring System (DMS)
//!
//! Real-time drowsiness detection from the driver-facing camera:
//! - Frame admission (one frame in flight, the rest dropped)
//! - Eye openness classification per frame
//! - Debounced status messages and a continuous-closure timer
//! - Rate-limited alert dispatch

pub mod analysis;
pub mod classifier;
pub mod config;
pub mod detector;
pub mod gate;
pub mod session;
pub mod state;

pub use analysis::FrameAnalysis;
pub use classifier::{EyeStateClassifier, FrameVerdict};
pub use config::{ClassifierThresholds, DebounceConfig, DmsConfig};
pub use detector::{FaceDetector, FaceObservation, ScriptStep, ScriptedDetector};
pub use gate::{GateOutcome, GatePermit, ProcessedFrame, ProcessingGate};
pub use session::{FrameFeed, MonitorHandle, MonitorSession, SessionSummary};
pub use state::{DebounceState, DrowsinessStateMachine, StateEvent, StatusMessage};

use camera_capture::ConversionError;
use thiserror::Error;

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Detector invocation failed: {0}")]
    Detector(String),

    #[error("Detector timed out after {0}ms")]
    DetectorTimeout(u64),

    #[error("Frame conversion failed: {0}")]
    Conversion(#[from] ConversionError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Monitoring session closed")]
    SessionClosed,

    #[error("Monitoring session failed: {0}")]
    Session(String),
}
