//! Camera Capture Library for the Drowsiness Monitor
//!
//! Provides the raw sensor frame model and its conversion into the single
//! buffer layout the face/eye detector consumes.
//! Supports:
//! - Planar / semi-planar YUV 4:2:0 frames with padded rows and interleaved chroma
//! - NV21 (Y followed by interleaved V/U) output
//! - A synthetic cabin camera for demos and tests

pub mod frame;
pub mod normalizer;
pub mod source;

pub use frame::{NormalizedFrame, PixelFormat, Plane, RawFrame};
pub use normalizer::{ConversionError, FrameNormalizer};
pub use source::{FrameSource, SyntheticCamera};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Streaming error: {0}")]
    Stream(String),

    #[error("Camera already streaming")]
    AlreadyStreaming,
}

/// Sensor orientation relative to the display's natural orientation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg90,
    Deg180,
    Deg270,
}

impl Rotation {
    /// Build from raw degrees as reported by the sensor
    pub fn from_degrees(degrees: i32) -> Result<Self, CameraError> {
        match degrees.rem_euclid(360) {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            _ => Err(CameraError::Format(format!(
                "rotation must be a multiple of 90, got {}",
                degrees
            ))),
        }
    }

    /// Rotation in degrees
    pub fn degrees(&self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

/// Which way the lens faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LensFacing {
    /// Facing the driver (cabin camera)
    #[default]
    Front,
    /// Facing away from the driver
    Back,
    /// USB or otherwise external camera
    External,
}

/// Camera configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Capture width
    pub width: u32,
    /// Capture height
    pub height: u32,
    /// Target FPS
    pub fps: u32,
    /// Sensor rotation in degrees
    pub rotation_degrees: i32,
    /// Lens facing
    pub lens_facing: LensFacing,
    /// Extra bytes at the end of each luma row (driver alignment padding)
    pub row_padding: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 15,
            rotation_degrees: 270,
            lens_facing: LensFacing::Front,
            row_padding: 0,
        }
    }
}

impl CameraConfig {
    /// Create cabin camera config (driver-facing, padded rows like most mobile sensors)
    pub fn cabin() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
            rotation_degrees: 270,
            lens_facing: LensFacing::Front,
            row_padding: 64,
        }
    }

    /// Resolved sensor rotation
    pub fn rotation(&self) -> Result<Rotation, CameraError> {
        Rotation::from_degrees(self.rotation_degrees)
    }
}
