//! Planar YUV 4:2:0 → NV21 normalization
//!
//! Sensors hand over up to three planes whose rows may be padded
//! (`row_stride > width`) and whose samples may be interleaved with another
//! channel (`pixel_stride > 1`). The detector wants one contiguous buffer:
//! luma row-major, then V/U pairs at half resolution in both directions.

use thiserror::Error;
use tracing::debug;

use crate::frame::{NormalizedFrame, PixelFormat, Plane, RawFrame};

/// Neutral chroma value used where a chroma sample could not be read
const NEUTRAL_CHROMA: u8 = 128;

/// Errors during frame conversion
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("Frame has no planes")]
    NoPlanes,

    #[error("Frame has {0} planes, expected 1 to 3")]
    TooManyPlanes(usize),

    #[error("Frame has zero width or height")]
    EmptyFrame,

    #[error("Luma row stride {row_stride} / pixel stride {pixel_stride} cannot hold a row")]
    InvalidStride {
        row_stride: usize,
        pixel_stride: usize,
    },

    #[error("Luma offset {offset} out of bounds for plane of {len} bytes")]
    LumaOutOfBounds { offset: usize, len: usize },
}

/// Converts raw sensor frames into detector-ready NV21 buffers
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameNormalizer;

impl FrameNormalizer {
    pub fn new() -> Self {
        Self
    }

    /// Normalize a raw frame.
    ///
    /// Luma that cannot be read rejects the whole frame. Unreadable chroma
    /// samples are left neutral and the frame is still produced.
    pub fn normalize(&self, frame: &RawFrame) -> Result<NormalizedFrame, ConversionError> {
        if frame.width == 0 || frame.height == 0 {
            return Err(ConversionError::EmptyFrame);
        }
        let luma_plane = match frame.planes.len() {
            0 => return Err(ConversionError::NoPlanes),
            1..=3 => &frame.planes[0],
            n => return Err(ConversionError::TooManyPlanes(n)),
        };

        let width = frame.width as usize;
        let height = frame.height as usize;

        // Nothing is allocated until the luma plane is known to cover the header
        check_luma_extent(luma_plane, width, height)?;

        let total = NormalizedFrame::expected_len(frame.width, frame.height);
        let mut out = Vec::with_capacity(total);
        copy_luma(luma_plane, width, height, &mut out)?;

        let chroma_start = out.len();
        out.resize(total, NEUTRAL_CHROMA);
        let chroma = &mut out[chroma_start..];

        let skipped = match frame.planes.as_slice() {
            [_, u, v] => interleave_vu(u, v, width / 2, height / 2, chroma),
            [_, vu] => copy_interleaved(vu, width / 2, height / 2, chroma),
            _ => 0,
        };
        if skipped > 0 {
            debug!(
                "Frame {}: {} chroma samples out of bounds, left neutral",
                frame.sequence, skipped
            );
        }

        Ok(NormalizedFrame {
            data: out,
            width: frame.width,
            height: frame.height,
            rotation: frame.rotation,
            format: PixelFormat::Nv21,
            bytes_per_row: frame.width,
            sequence: frame.sequence,
        })
    }
}

/// Check that every luma sample of a `width` x `height` frame lies inside
/// `plane`. With non-overlapping strides the last sample is the farthest
/// one, so the plane then holds at least `width * height` bytes.
fn check_luma_extent(plane: &Plane, width: usize, height: usize) -> Result<(), ConversionError> {
    let row_span = (width - 1)
        .checked_mul(plane.pixel_stride)
        .and_then(|span| span.checked_add(1));
    let rows_fit = height == 1 || row_span.is_some_and(|span| plane.row_stride >= span);
    if plane.pixel_stride == 0 || !rows_fit {
        return Err(ConversionError::InvalidStride {
            row_stride: plane.row_stride,
            pixel_stride: plane.pixel_stride,
        });
    }

    let len = plane.len();
    match plane.offset(height - 1, width - 1) {
        Some(last) if last < len => Ok(()),
        Some(last) => Err(ConversionError::LumaOutOfBounds { offset: last, len }),
        None => Err(ConversionError::LumaOutOfBounds {
            offset: usize::MAX,
            len,
        }),
    }
}

fn luma_out_of_bounds(offset: Option<usize>, plane: &Plane) -> ConversionError {
    ConversionError::LumaOutOfBounds {
        offset: offset.unwrap_or(usize::MAX),
        len: plane.len(),
    }
}

/// Append `height` rows of `width` luma samples to `out`
fn copy_luma(
    plane: &Plane,
    width: usize,
    height: usize,
    out: &mut Vec<u8>,
) -> Result<(), ConversionError> {
    // Tightly packed: one bulk copy
    if plane.row_stride == width && plane.pixel_stride == 1 {
        let needed = width.checked_mul(height);
        let bulk = needed.and_then(|n| plane.data.get(..n));
        let Some(bulk) = bulk else {
            return Err(luma_out_of_bounds(needed.map(|n| n - 1), plane));
        };
        out.extend_from_slice(bulk);
        return Ok(());
    }

    // Padded rows, contiguous samples: one copy per row
    if plane.pixel_stride == 1 {
        for row in 0..height {
            let start = plane.offset(row, 0);
            let end = start.and_then(|s| s.checked_add(width));
            let Some(samples) = start.zip(end).and_then(|(s, e)| plane.data.get(s..e)) else {
                return Err(luma_out_of_bounds(end.map(|e| e - 1), plane));
            };
            out.extend_from_slice(samples);
        }
        return Ok(());
    }

    for row in 0..height {
        for col in 0..width {
            match plane.sample(row, col) {
                Some(y) => out.push(y),
                None => return Err(luma_out_of_bounds(plane.offset(row, col), plane)),
            }
        }
    }
    Ok(())
}

/// Write V/U pairs from separate U and V planes; returns skipped sample count
fn interleave_vu(u: &Plane, v: &Plane, cw: usize, ch: usize, chroma: &mut [u8]) -> usize {
    let mut skipped = 0;
    for row in 0..ch {
        for col in 0..cw {
            let idx = (row * cw + col) * 2;
            match v.sample(row, col) {
                Some(s) => chroma[idx] = s,
                None => skipped += 1,
            }
            match u.sample(row, col) {
                Some(s) => chroma[idx + 1] = s,
                None => skipped += 1,
            }
        }
    }
    skipped
}

/// Copy an already interleaved VU plane row by row; returns skipped sample count
fn copy_interleaved(vu: &Plane, cw: usize, ch: usize, chroma: &mut [u8]) -> usize {
    let row_bytes = cw * 2;
    if vu.row_stride == row_bytes && vu.len() >= chroma.len() {
        chroma.copy_from_slice(&vu.data[..chroma.len()]);
        return 0;
    }

    let mut skipped = 0;
    for row in 0..ch {
        let dst = &mut chroma[row * row_bytes..(row + 1) * row_bytes];
        // an overflowing row start reads nothing
        let start = row
            .checked_mul(vu.row_stride)
            .map_or(vu.len(), |s| s.min(vu.len()));
        let available = (vu.len() - start).min(row_bytes);
        dst[..available].copy_from_slice(&vu.data[start..start + available]);
        skipped += row_bytes - available;
    }
    skipped
}
