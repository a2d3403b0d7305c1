// ============================================================================
// Pixel buffers — RGBA8, row-major, no padding
// ============================================================================
//
// Three owned buffer types travel through the pipeline:
//   ImageBuffer  — source pixels captured for one job (immutable)
//   MaskBuffer   — painted strokes, same layout; binary once thresholded
//   ResultBuffer — reconstructed pixels coming back from the worker
//
// None of them is `Clone`: handing a buffer to the worker is a move, so the
// sending side cannot touch the pixels after the transfer.

use std::fmt;

use image::RgbaImage;

use crate::error::{EraseError, Result};

/// Bytes per RGBA8 pixel.
pub const BYTES_PER_PIXEL: usize = 4;

/// Native pixel dimensions of an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Dims {
    pub width: u32,
    pub height: u32,
}

impl Dims {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Expected RGBA8 byte length.
    pub fn byte_len(&self) -> usize {
        self.pixel_count() * BYTES_PER_PIXEL
    }

    /// Fails unless both sides are positive and `len` matches `W×H×4`.
    pub fn check_len(&self, len: usize) -> Result<()> {
        if self.is_empty() {
            return Err(EraseError::InvalidBuffer(format!(
                "dimensions must be positive, got {}",
                self
            )));
        }
        if len != self.byte_len() {
            return Err(EraseError::InvalidBuffer(format!(
                "{} RGBA8 needs {} bytes, got {}",
                self,
                self.byte_len(),
                len
            )));
        }
        Ok(())
    }
}

impl fmt::Display for Dims {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

// -- Image ------------------------------------------------------------------

/// Source pixels snapshotted for a single job.
#[derive(Debug, PartialEq)]
pub struct ImageBuffer {
    dims: Dims,
    data: Vec<u8>,
}

impl ImageBuffer {
    pub fn from_raw(dims: Dims, data: Vec<u8>) -> Result<Self> {
        dims.check_len(data.len())?;
        Ok(Self { dims, data })
    }

    /// Takes over the decoded image's storage without copying.
    pub fn from_rgba(img: RgbaImage) -> Result<Self> {
        let dims = Dims::new(img.width(), img.height());
        Self::from_raw(dims, img.into_raw())
    }

    /// Copies pixels out of a displayed image (the snapshot a job works on).
    pub fn snapshot_of(img: &RgbaImage) -> Result<Self> {
        let dims = Dims::new(img.width(), img.height());
        Self::from_raw(dims, img.as_raw().clone())
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }
}

// -- Mask -------------------------------------------------------------------

/// RGBA8 stroke raster. A fresh mask is all-"keep" (every byte zero).
#[derive(Debug, PartialEq)]
pub struct MaskBuffer {
    dims: Dims,
    data: Vec<u8>,
}

impl MaskBuffer {
    /// All-"keep" mask of the given size.
    pub fn new(dims: Dims) -> Self {
        Self {
            dims,
            data: vec![0; dims.byte_len()],
        }
    }

    pub fn from_raw(dims: Dims, data: Vec<u8>) -> Result<Self> {
        dims.check_len(data.len())?;
        Ok(Self { dims, data })
    }

    pub fn from_rgba(img: RgbaImage) -> Result<Self> {
        let dims = Dims::new(img.width(), img.height());
        Self::from_raw(dims, img.into_raw())
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// True when no pixel carries any paint at all.
    pub fn is_blank(&self) -> bool {
        self.data.iter().all(|&b| b == 0)
    }

    pub fn clear(&mut self) {
        self.data.fill(0);
    }

    /// Coverage (0–255) stored at `(x, y)`; out-of-range reads as "keep".
    pub fn coverage_at(&self, x: u32, y: u32) -> u8 {
        if x >= self.dims.width || y >= self.dims.height {
            return 0;
        }
        let off = (y as usize * self.dims.width as usize + x as usize) * BYTES_PER_PIXEL;
        self.data[off + 3]
    }
}

// -- Result -----------------------------------------------------------------

/// Reconstructed pixels returned by the worker.
#[derive(Debug, PartialEq)]
pub struct ResultBuffer {
    dims: Dims,
    data: Vec<u8>,
}

impl ResultBuffer {
    pub fn from_raw(dims: Dims, data: Vec<u8>) -> Result<Self> {
        dims.check_len(data.len())?;
        Ok(Self { dims, data })
    }

    pub fn dims(&self) -> Dims {
        self.dims
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_raw(self) -> Vec<u8> {
        self.data
    }

    /// RGBA of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let off = (y as usize * self.dims.width as usize + x as usize) * BYTES_PER_PIXEL;
        [
            self.data[off],
            self.data[off + 1],
            self.data[off + 2],
            self.data[off + 3],
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_buffers() {
        let err = ImageBuffer::from_raw(Dims::new(2, 2), vec![0; 15]).unwrap_err();
        assert!(matches!(err, EraseError::InvalidBuffer(_)));
    }

    #[test]
    fn rejects_zero_dimensions() {
        assert!(MaskBuffer::from_raw(Dims::new(0, 4), Vec::new()).is_err());
        assert!(ResultBuffer::from_raw(Dims::new(4, 0), Vec::new()).is_err());
    }

    #[test]
    fn fresh_mask_is_blank() {
        let mask = MaskBuffer::new(Dims::new(7, 3));
        assert_eq!(mask.as_bytes().len(), 7 * 3 * 4);
        assert!(mask.is_blank());
        assert_eq!(mask.coverage_at(100, 100), 0);
    }

    #[test]
    fn from_rgba_keeps_layout() {
        let img = RgbaImage::from_pixel(3, 2, image::Rgba([1, 2, 3, 4]));
        let buf = ImageBuffer::from_rgba(img).unwrap();
        assert_eq!(buf.dims(), Dims::new(3, 2));
        assert_eq!(&buf.as_bytes()[..4], &[1, 2, 3, 4]);
    }
}
