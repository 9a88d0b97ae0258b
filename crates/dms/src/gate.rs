//! Single-flight frame processing
//!
//! At most one frame is in the pipeline. A frame arriving while another is
//! being processed is dropped, never queued, so throughput follows detector
//! latency and memory stays bounded.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use camera_capture::{ConversionError, FrameNormalizer, LensFacing, RawFrame, Rotation};
use tracing::{debug, warn};

use crate::classifier::{EyeStateClassifier, FrameVerdict};
use crate::config::DmsConfig;
use crate::detector::{FaceDetector, FaceObservation};
use crate::DmsError;

#[derive(Debug, Default)]
struct GateFlags {
    busy: AtomicBool,
    admitted: AtomicU64,
    dropped: AtomicU64,
}

/// Proof of admission; the gate reopens when it is dropped
#[derive(Debug)]
pub struct GatePermit {
    flags: Arc<GateFlags>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.flags.busy.store(false, Ordering::Release);
    }
}

/// Result of running one frame through the gate
#[derive(Debug, Clone)]
pub struct ProcessedFrame {
    pub sequence: u64,
    pub verdict: FrameVerdict,
    pub faces: Vec<FaceObservation>,
    pub width: u32,
    pub height: u32,
    pub rotation: Rotation,
    pub lens_facing: LensFacing,
    /// The detector failed or timed out; `faces` is empty
    pub detector_failed: bool,
}

/// Outcome of offering a frame
#[derive(Debug)]
pub enum GateOutcome {
    /// Another frame was in flight
    Dropped,
    /// Frame could not be converted; no verdict
    Skipped(ConversionError),
    Processed(ProcessedFrame),
}

/// Normalizer → detector → classifier, one frame at a time
#[derive(Debug, Clone)]
pub struct ProcessingGate {
    flags: Arc<GateFlags>,
    normalizer: FrameNormalizer,
    classifier: EyeStateClassifier,
    detector_timeout: Option<Duration>,
}

impl ProcessingGate {
    pub fn new(config: &DmsConfig) -> Self {
        Self {
            flags: Arc::new(GateFlags::default()),
            normalizer: FrameNormalizer::new(),
            classifier: EyeStateClassifier::new(config.thresholds),
            detector_timeout: config.detector_timeout(),
        }
    }

    /// Admit a frame if idle; otherwise count it as dropped
    pub fn try_acquire(&self) -> Option<GatePermit> {
        if self
            .flags
            .busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.flags.admitted.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("dms_frames_admitted_total").increment(1);
            Some(GatePermit {
                flags: self.flags.clone(),
            })
        } else {
            self.flags.dropped.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("dms_frames_dropped_total").increment(1);
            None
        }
    }

    pub fn is_busy(&self) -> bool {
        self.flags.busy.load(Ordering::Acquire)
    }

    /// Frames admitted so far
    pub fn admitted(&self) -> u64 {
        self.flags.admitted.load(Ordering::Relaxed)
    }

    /// Frames dropped because the gate was busy
    pub fn dropped(&self) -> u64 {
        self.flags.dropped.load(Ordering::Relaxed)
    }

    /// Acquire, run, release
    pub async fn process<D: FaceDetector>(&self, frame: &RawFrame, detector: &D) -> GateOutcome {
        match self.try_acquire() {
            Some(permit) => {
                let outcome = self.run(&permit, frame, detector).await;
                drop(permit);
                outcome
            }
            None => {
                debug!("Frame {} dropped: pipeline busy", frame.sequence);
                GateOutcome::Dropped
            }
        }
    }

    /// Run the pipeline for an admitted frame. The caller keeps the permit
    /// until it is done with the result.
    pub async fn run<D: FaceDetector>(
        &self,
        _permit: &GatePermit,
        frame: &RawFrame,
        detector: &D,
    ) -> GateOutcome {
        let normalized = match self.normalizer.normalize(frame) {
            Ok(n) => n,
            Err(e) => {
                warn!("Frame {} skipped: {}", frame.sequence, e);
                metrics::counter!("dms_frames_skipped_total").increment(1);
                return GateOutcome::Skipped(e);
            }
        };

        let detection = match self.detector_timeout {
            Some(limit) => tokio::time::timeout(limit, detector.detect(&normalized))
                .await
                .unwrap_or_else(|_| Err(DmsError::DetectorTimeout(limit.as_millis() as u64))),
            None => detector.detect(&normalized).await,
        };

        let (faces, detector_failed) = match detection {
            Ok(faces) => (faces, false),
            Err(e) => {
                warn!("Detector failed on frame {}: {}", frame.sequence, e);
                metrics::counter!("dms_detector_failures_total").increment(1);
                (Vec::new(), true)
            }
        };

        let verdict = self.classifier.classify(&faces);
        debug!(
            "Frame {}: {} face(s), drowsy={}, closed={}, L={:.0}% R={:.0}%",
            frame.sequence,
            faces.len(),
            verdict.is_drowsy,
            verdict.both_eyes_closed,
            verdict.left_percent,
            verdict.right_percent
        );

        GateOutcome::Processed(ProcessedFrame {
            sequence: frame.sequence,
            verdict,
            faces,
            width: normalized.width,
            height: normalized.height,
            rotation: frame.rotation,
            lens_facing: frame.lens_facing,
            detector_failed,
        })
    }
}
