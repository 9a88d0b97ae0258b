//! Per-frame analysis snapshot published to the UI

use camera_capture::{LensFacing, Rotation};
use serde::{Deserialize, Serialize};

use crate::classifier::OPEN_PERCENT;
use crate::detector::FaceObservation;
use crate::gate::ProcessedFrame;
use crate::state::{DebounceState, StatusMessage};

/// Complete per-frame result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameAnalysis {
    /// Source frame sequence number
    pub sequence: u64,

    /// Faces reported by the detector
    pub faces: Vec<FaceObservation>,

    /// Frame-local drowsiness verdict
    pub is_drowsy: bool,

    /// Both eyes below the closure threshold
    pub both_eyes_closed: bool,

    /// Image size for overlay scaling
    pub image_width: u32,
    pub image_height: u32,

    /// Sensor orientation and lens, for overlay mirroring/rotation
    pub rotation: Rotation,
    pub lens_facing: LensFacing,

    /// Eye openness for display, 0-100
    pub left_eye_percent: f32,
    pub right_eye_percent: f32,

    /// Debounced status line
    pub status: StatusMessage,

    /// Alert dialog shown
    pub alert_dialog_visible: bool,
}

impl Default for FrameAnalysis {
    fn default() -> Self {
        Self {
            sequence: 0,
            faces: Vec::new(),
            is_drowsy: false,
            both_eyes_closed: false,
            image_width: 0,
            image_height: 0,
            rotation: Rotation::Deg0,
            lens_facing: LensFacing::Front,
            left_eye_percent: OPEN_PERCENT,
            right_eye_percent: OPEN_PERCENT,
            status: StatusMessage::Awake,
            alert_dialog_visible: false,
        }
    }
}

impl FrameAnalysis {
    /// Combine a processed frame with the state machine's view after it
    pub fn new(frame: ProcessedFrame, state: &DebounceState) -> Self {
        Self {
            sequence: frame.sequence,
            is_drowsy: frame.verdict.is_drowsy,
            both_eyes_closed: frame.verdict.both_eyes_closed,
            left_eye_percent: frame.verdict.left_percent,
            right_eye_percent: frame.verdict.right_percent,
            faces: frame.faces,
            image_width: frame.width,
            image_height: frame.height,
            rotation: frame.rotation,
            lens_facing: frame.lens_facing,
            status: state.status,
            alert_dialog_visible: state.alert_dialog_visible,
        }
    }

    /// Check if a face was seen
    pub fn face_detected(&self) -> bool {
        !self.faces.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_shows_open_eyes() {
        let analysis = FrameAnalysis::default();
        assert!(!analysis.face_detected());
        assert_eq!(analysis.left_eye_percent, 100.0);
        assert_eq!(analysis.status, StatusMessage::Awake);
    }

    #[test]
    fn test_serializes_for_ui() {
        let analysis = FrameAnalysis {
            faces: vec![FaceObservation::with_eyes(0.1, 0.2)],
            status: StatusMessage::EyesClosed { seconds: 2 },
            alert_dialog_visible: true,
            ..Default::default()
        };
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json["alert_dialog_visible"], true);
        assert_eq!(json["status"]["EyesClosed"]["seconds"], 2);
        assert_eq!(json["faces"].as_array().unwrap().len(), 1);
    }
}
