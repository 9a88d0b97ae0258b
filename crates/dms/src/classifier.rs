//! Per-frame eye state classification
//!
//! Frame-local only: no smoothing happens here, the state machine owns time.

use serde::{Deserialize, Serialize};

use crate::config::ClassifierThresholds;
use crate::detector::FaceObservation;

/// Percentage shown for an eye with no usable measurement
pub const OPEN_PERCENT: f32 = 100.0;

/// Verdict for a single frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameVerdict {
    /// Any closure signal present
    pub is_drowsy: bool,
    /// Both eyes below the strict closure threshold
    pub both_eyes_closed: bool,
    /// Both eyes below the partial closure threshold
    pub both_partially_closed: bool,
    /// One eye closed while the other stays open (squint/wink)
    pub one_eye_closed: bool,
    /// A face was observed in this frame
    pub face_present: bool,
    /// Left eye openness, 0-100
    pub left_percent: f32,
    /// Right eye openness, 0-100
    pub right_percent: f32,
}

impl FrameVerdict {
    /// Verdict for a frame without a face: not drowsy, eyes shown open
    pub fn no_face() -> Self {
        Self {
            is_drowsy: false,
            both_eyes_closed: false,
            both_partially_closed: false,
            one_eye_closed: false,
            face_present: false,
            left_percent: OPEN_PERCENT,
            right_percent: OPEN_PERCENT,
        }
    }
}

impl Default for FrameVerdict {
    fn default() -> Self {
        Self::no_face()
    }
}

/// Maps detector observations to a frame verdict
#[derive(Debug, Clone, Default)]
pub struct EyeStateClassifier {
    thresholds: ClassifierThresholds,
}

impl EyeStateClassifier {
    pub fn new(thresholds: ClassifierThresholds) -> Self {
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &ClassifierThresholds {
        &self.thresholds
    }

    /// Classify the primary (first) face; other faces are ignored
    pub fn classify(&self, faces: &[FaceObservation]) -> FrameVerdict {
        let Some(face) = faces.first() else {
            return FrameVerdict::no_face();
        };

        // A missing probability is substituted with fully open
        let l = face.left_openness_or_default();
        let r = face.right_openness_or_default();
        let t = &self.thresholds;

        let both_eyes_closed = l < t.both_closed && r < t.both_closed;
        let both_partially_closed = l < t.both_partial && r < t.both_partial;
        let one_eye_closed =
            (l < t.one_closed && r > t.other_open) || (r < t.one_closed && l > t.other_open);

        FrameVerdict {
            is_drowsy: both_eyes_closed || both_partially_closed || one_eye_closed,
            both_eyes_closed,
            both_partially_closed,
            one_eye_closed,
            face_present: true,
            left_percent: to_percent(l),
            right_percent: to_percent(r),
        }
    }
}

fn to_percent(openness: f32) -> f32 {
    100.0 * openness.clamp(0.0, 1.0)
}
