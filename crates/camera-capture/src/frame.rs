//! Video frame types

use serde::{Deserialize, Serialize};

use crate::{LensFacing, Rotation};

/// Pixel format tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// Y plane followed by interleaved V/U pairs
    Nv21,
}

/// One image plane as delivered by the sensor
#[derive(Debug, Clone)]
pub struct Plane {
    /// Plane bytes (may include row padding)
    pub data: Vec<u8>,
    /// Distance in bytes between the starts of two consecutive rows
    pub row_stride: usize,
    /// Distance in bytes between two consecutive samples of one row
    pub pixel_stride: usize,
}

impl Plane {
    pub fn new(data: Vec<u8>, row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }

    /// Tightly packed plane (`row_stride == width`, `pixel_stride == 1`)
    pub fn packed(data: Vec<u8>, width: usize) -> Self {
        Self::new(data, width, 1)
    }

    /// Byte offset of sample (row, col); `None` if it overflows `usize`
    #[inline]
    pub fn offset(&self, row: usize, col: usize) -> Option<usize> {
        row.checked_mul(self.row_stride)?
            .checked_add(col.checked_mul(self.pixel_stride)?)
    }

    /// Sample at (row, col), `None` when the offset falls outside the buffer
    #[inline]
    pub fn sample(&self, row: usize, col: usize) -> Option<u8> {
        self.data.get(self.offset(row, col)?).copied()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Raw sensor frame, produced once per hardware callback
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Y, then U and V (or a single interleaved VU plane)
    pub planes: Vec<Plane>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Sensor rotation
    pub rotation: Rotation,
    /// Lens facing
    pub lens_facing: LensFacing,
    /// Capture timestamp (nanoseconds)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u64,
}

impl RawFrame {
    /// Create a new raw frame from sensor planes
    pub fn new(planes: Vec<Plane>, width: u32, height: u32) -> Self {
        Self {
            planes,
            width,
            height,
            rotation: Rotation::Deg0,
            lens_facing: LensFacing::Front,
            timestamp_ns: 0,
            sequence: 0,
        }
    }

    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_lens_facing(mut self, lens_facing: LensFacing) -> Self {
        self.lens_facing = lens_facing;
        self
    }

    pub fn with_sequence(mut self, sequence: u64, timestamp_ns: u64) -> Self {
        self.sequence = sequence;
        self.timestamp_ns = timestamp_ns;
        self
    }
}

/// Detector-ready NV21 frame
#[derive(Debug, Clone)]
pub struct NormalizedFrame {
    /// Luma followed by interleaved V/U samples
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Sensor rotation, passed through for the detector and renderer
    pub rotation: Rotation,
    /// Always `PixelFormat::Nv21`
    pub format: PixelFormat,
    /// Bytes per luma row
    pub bytes_per_row: u32,
    /// Source frame sequence number
    pub sequence: u64,
}

impl NormalizedFrame {
    /// Buffer length for a 4:2:0 frame: w·h luma plus 2·⌊w/2⌋·⌊h/2⌋ chroma
    pub fn expected_len(width: u32, height: u32) -> usize {
        Self::luma_len(width, height) + Self::chroma_len(width, height)
    }

    pub fn luma_len(width: u32, height: u32) -> usize {
        width as usize * height as usize
    }

    pub fn chroma_len(width: u32, height: u32) -> usize {
        2 * (width as usize / 2) * (height as usize / 2)
    }

    /// Luma region
    pub fn luma(&self) -> &[u8] {
        &self.data[..Self::luma_len(self.width, self.height)]
    }

    /// Interleaved V/U region
    pub fn chroma(&self) -> &[u8] {
        &self.data[Self::luma_len(self.width, self.height)..]
    }

    /// Luma at (x, y)
    pub fn luma_at(&self, x: u32, y: u32) -> Option<u8> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y as usize * self.width as usize + x as usize;
        self.data.get(idx).copied()
    }

    /// (V, U) pair covering pixel (x, y)
    pub fn chroma_at(&self, x: u32, y: u32) -> Option<(u8, u8)> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let (cw, ch) = (self.width as usize / 2, self.height as usize / 2);
        let (cx, cy) = (x as usize / 2, y as usize / 2);
        if cx >= cw || cy >= ch {
            return None;
        }
        let idx = (cy * cw + cx) * 2;
        let chroma = self.chroma();
        Some((*chroma.get(idx)?, *chroma.get(idx + 1)?))
    }

    /// Luma plane as a grayscale image (overlay rendering, debug dumps)
    pub fn luma_image(&self) -> Option<image::GrayImage> {
        image::GrayImage::from_raw(self.width, self.height, self.luma().to_vec())
    }
}
