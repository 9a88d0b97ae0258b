//! Face/eye detector interface and observation model
//!
//! The detector itself is an external collaborator. It receives a normalized
//! NV21 frame and answers with zero or more face observations.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use camera_capture::NormalizedFrame;
use serde::{Deserialize, Serialize};

use crate::DmsError;

/// Face bounding box in frame pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Facial landmark kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LandmarkKind {
    LeftEye,
    RightEye,
    LeftEar,
    RightEar,
    LeftCheek,
    RightCheek,
    NoseBase,
    MouthLeft,
    MouthRight,
    MouthBottom,
}

/// Single facial landmark
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub kind: LandmarkKind,
    pub x: f32,
    pub y: f32,
}

/// Contour kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContourKind {
    Face,
    LeftEye,
    RightEye,
    LeftEyebrow,
    RightEyebrow,
    UpperLip,
    LowerLip,
    NoseBridge,
}

/// Contour point set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    pub kind: ContourKind,
    pub points: Vec<(f32, f32)>,
}

/// One detected face
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceObservation {
    pub bounds: BoundingBox,
    /// Probability the left eye is open, if the detector produced one
    pub left_eye_open: Option<f32>,
    /// Probability the right eye is open, if the detector produced one
    pub right_eye_open: Option<f32>,
    pub landmarks: Vec<Landmark>,
    pub contours: Vec<Contour>,
    pub tracking_id: Option<u32>,
}

impl FaceObservation {
    /// Openness substituted for a missing probability: fully open
    pub const DEFAULT_OPENNESS: f32 = 1.0;

    /// Face with both eye probabilities set
    pub fn with_eyes(left: f32, right: f32) -> Self {
        Self {
            bounds: BoundingBox {
                x: 0.3,
                y: 0.2,
                width: 0.4,
                height: 0.5,
            },
            left_eye_open: Some(left),
            right_eye_open: Some(right),
            ..Default::default()
        }
    }

    /// Left-eye probability clamped to [0, 1]; `None` when absent or NaN
    pub fn left_openness(&self) -> Option<f32> {
        sanitize(self.left_eye_open)
    }

    /// Right-eye probability clamped to [0, 1]; `None` when absent or NaN
    pub fn right_openness(&self) -> Option<f32> {
        sanitize(self.right_eye_open)
    }

    pub fn left_openness_or_default(&self) -> f32 {
        self.left_openness().unwrap_or(Self::DEFAULT_OPENNESS)
    }

    pub fn right_openness_or_default(&self) -> f32 {
        self.right_openness().unwrap_or(Self::DEFAULT_OPENNESS)
    }
}

fn sanitize(probability: Option<f32>) -> Option<f32> {
    probability
        .filter(|p| !p.is_nan())
        .map(|p| p.clamp(0.0, 1.0))
}

/// External face/eye detector
pub trait FaceDetector: Send + Sync {
    /// Detect faces in a normalized frame
    fn detect(
        &self,
        frame: &NormalizedFrame,
    ) -> impl Future<Output = Result<Vec<FaceObservation>, DmsError>> + Send;
}

impl<D: FaceDetector> FaceDetector for Arc<D> {
    fn detect(
        &self,
        frame: &NormalizedFrame,
    ) -> impl Future<Output = Result<Vec<FaceObservation>, DmsError>> + Send {
        (**self).detect(frame)
    }
}

/// One scripted detector answer
#[derive(Debug, Clone)]
pub enum ScriptStep {
    Faces(Vec<FaceObservation>),
    Fail(String),
}

impl ScriptStep {
    pub fn eyes(left: f32, right: f32) -> Self {
        ScriptStep::Faces(vec![FaceObservation::with_eyes(left, right)])
    }

    pub fn no_face() -> Self {
        ScriptStep::Faces(Vec::new())
    }

    pub fn fail(reason: &str) -> Self {
        ScriptStep::Fail(reason.to_string())
    }
}

/// Mock detector replaying a script of answers.
///
/// Without `cycling()` the last step repeats once the script is exhausted.
pub struct ScriptedDetector {
    steps: Mutex<VecDeque<ScriptStep>>,
    last: Mutex<Option<ScriptStep>>,
    cycle: bool,
    latency: Duration,
    calls: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedDetector {
    pub fn new(steps: impl IntoIterator<Item = ScriptStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            last: Mutex::new(None),
            cycle: false,
            latency: Duration::ZERO,
            calls: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Always reports the same eye openness
    pub fn constant(left: f32, right: f32) -> Self {
        Self::new([ScriptStep::eyes(left, right)])
    }

    /// Replay the script from the start when exhausted
    pub fn cycling(mut self) -> Self {
        self.cycle = true;
        self
    }

    /// Simulated inference time per call
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Number of `detect` calls so far
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping `detect` calls observed
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> ScriptStep {
        let mut steps = self.steps.lock().unwrap_or_else(|e| e.into_inner());
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        match steps.pop_front() {
            Some(step) => {
                if self.cycle {
                    steps.push_back(step.clone());
                }
                *last = Some(step.clone());
                step
            }
            None => last.clone().unwrap_or_else(ScriptStep::no_face),
        }
    }
}

impl FaceDetector for ScriptedDetector {
    async fn detect(&self, _frame: &NormalizedFrame) -> Result<Vec<FaceObservation>, DmsError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let step = self.next_step();
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        match step {
            ScriptStep::Faces(faces) => Ok(faces),
            ScriptStep::Fail(reason) => Err(DmsError::Detector(reason)),
        }
    }
}
