//! Frame sources
//!
//! The camera hardware is an external collaborator: it pushes frames at its
//! own pace and the consumer decides what to keep. `SyntheticCamera` stands
//! in for it in demos and tests, producing frames laid out the way mobile
//! sensors deliver them (padded luma rows, U/V planes sharing one interleaved
//! buffer with pixel stride 2).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::frame::{Plane, RawFrame};
use crate::{CameraConfig, CameraError, LensFacing, Rotation};

/// Delivery callback; returns whether the consumer admitted the frame
pub type FrameCallback = Box<dyn FnMut(RawFrame) -> bool + Send + 'static>;

/// A push-based video source
pub trait FrameSource {
    /// Start streaming frames into `deliver`
    fn start(&mut self, deliver: FrameCallback) -> Result<(), CameraError>;

    /// Stop streaming
    fn stop(&mut self);

    /// Check if streaming
    fn is_streaming(&self) -> bool;

    /// Sensor rotation
    fn rotation(&self) -> Rotation;

    /// Lens facing
    fn lens_facing(&self) -> LensFacing;
}

/// Highest frame rate the timer-driven source accepts
pub const MAX_FPS: u32 = 1000;

/// Delivery counters shared with the streaming task
#[derive(Debug, Default)]
pub struct SourceStats {
    pub delivered: AtomicU64,
    pub rejected: AtomicU64,
}

/// Timer-driven fake cabin camera
pub struct SyntheticCamera {
    config: CameraConfig,
    rotation: Rotation,
    running: Arc<AtomicBool>,
    stats: Arc<SourceStats>,
    task: Option<JoinHandle<()>>,
}

impl SyntheticCamera {
    pub fn new(config: CameraConfig) -> Result<Self, CameraError> {
        if config.width < 2 || config.height < 2 {
            return Err(CameraError::Format(format!(
                "{}x{} is too small for 4:2:0",
                config.width, config.height
            )));
        }
        if config.fps == 0 || config.fps > MAX_FPS {
            return Err(CameraError::Format(format!(
                "fps must be in 1..={}, got {}",
                MAX_FPS, config.fps
            )));
        }
        let rotation = config.rotation()?;
        Ok(Self {
            config,
            rotation,
            running: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(SourceStats::default()),
            task: None,
        })
    }

    /// Delivery counters
    pub fn stats(&self) -> Arc<SourceStats> {
        self.stats.clone()
    }

    /// Build one synthetic frame
    pub fn frame(config: &CameraConfig, rotation: Rotation, sequence: u64) -> RawFrame {
        let width = config.width as usize;
        let height = config.height as usize;
        let y_stride = width + config.row_padding;

        let shift = (sequence % 256) as usize;
        let mut y = vec![0u8; y_stride * height];
        for row in 0..height {
            for col in 0..width {
                y[row * y_stride + col] = ((row + col + shift) % 256) as u8;
            }
        }

        // U and V are views into one interleaved buffer; each view stops at
        // its own last sample, so it is one byte shorter than the full rows
        let cw = width / 2;
        let ch = height / 2;
        let c_stride = width;
        let mut vu = vec![0u8; ch * c_stride];
        for row in 0..ch {
            for col in 0..cw {
                vu[row * c_stride + col * 2] = 160;
                vu[row * c_stride + col * 2 + 1] = 96;
            }
        }
        // frames narrower or shorter than 2 pixels carry no chroma
        let (v, u) = if cw == 0 || ch == 0 {
            (Vec::new(), Vec::new())
        } else {
            let view_len = (ch - 1) * c_stride + (cw - 1) * 2 + 1;
            (vu[..view_len].to_vec(), vu[1..=view_len].to_vec())
        };

        RawFrame::new(
            vec![
                Plane::new(y, y_stride, 1),
                Plane::new(u, c_stride, 2),
                Plane::new(v, c_stride, 2),
            ],
            config.width,
            config.height,
        )
        .with_rotation(rotation)
        .with_lens_facing(config.lens_facing)
        .with_sequence(
            sequence,
            sequence.saturating_mul(1_000_000_000) / config.fps.max(1) as u64,
        )
    }
}

impl FrameSource for SyntheticCamera {
    fn start(&mut self, mut deliver: FrameCallback) -> Result<(), CameraError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(CameraError::AlreadyStreaming);
        }
        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(CameraError::Stream(e.to_string()));
            }
        };

        info!(
            "Starting synthetic camera: {}x{} @ {}fps, rotation {}°",
            self.config.width,
            self.config.height,
            self.config.fps,
            self.rotation.degrees()
        );

        let config = self.config.clone();
        let rotation = self.rotation;
        let running = self.running.clone();
        let stats = self.stats.clone();
        let period = Duration::from_micros(1_000_000 / config.fps as u64);

        self.task = Some(handle.spawn(async move {
            let mut interval = tokio::time::interval(period);
            let mut sequence = 0u64;
            while running.load(Ordering::SeqCst) {
                interval.tick().await;
                let frame = SyntheticCamera::frame(&config, rotation, sequence);
                if deliver(frame) {
                    stats.delivered.fetch_add(1, Ordering::Relaxed);
                } else {
                    stats.rejected.fetch_add(1, Ordering::Relaxed);
                }
                sequence += 1;
            }
            debug!("Synthetic camera stopped after {} frames", sequence);
        }));
        Ok(())
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn is_streaming(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn rotation(&self) -> Rotation {
        self.rotation
    }

    fn lens_facing(&self) -> LensFacing {
        self.config.lens_facing
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        self.stop();
    }
}
