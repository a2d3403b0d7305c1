// ============================================================================
// Result renderer — worker output → displayable image / exported PNG
// ============================================================================

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use image::RgbaImage;
use tracing::info;

use crate::buffer::{Dims, ResultBuffer};
use crate::error::{EraseError, Result};
use crate::io;

/// Prefix of every exported file.
pub const EXPORT_PREFIX: &str = "watermark_removed_";

/// A finished result, ready to show or export. The raw buffer is consumed.
#[derive(Clone, Debug, PartialEq)]
pub struct ResultImage {
    image: RgbaImage,
}

impl ResultImage {
    pub fn from_buffer(buffer: ResultBuffer) -> Result<Self> {
        let dims = buffer.dims();
        let image = RgbaImage::from_raw(dims.width, dims.height, buffer.into_raw()).ok_or_else(
            || EraseError::InvalidBuffer(format!("result does not fill {}", dims)),
        )?;
        Ok(Self { image })
    }

    pub fn dims(&self) -> Dims {
        Dims::new(self.image.width(), self.image.height())
    }

    pub fn as_rgba(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_rgba(self) -> RgbaImage {
        self.image
    }

    /// PNG bytes of the result.
    pub fn encode_png(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        io::encode_png(&self.image, &mut out)?;
        Ok(out)
    }

    pub fn save_png(&self, path: &Path) -> Result<()> {
        io::write_png(path, &self.image)?;
        info!(path = %path.display(), "result exported");
        Ok(())
    }

    /// Writes into `dir` under a timestamped name and returns the path.
    pub fn export_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(export_file_name(SystemTime::now()));
        self.save_png(&path)?;
        Ok(path)
    }
}

/// `watermark_removed_<unix-millis>.png`
pub fn export_file_name(at: SystemTime) -> String {
    let millis = at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("{}{}.png", EXPORT_PREFIX, millis)
}
