use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder, RgbaImage};
use tracing::debug;

use crate::buffer::{Dims, MaskBuffer};
use crate::error::{EraseError, Result};

/// File extensions the decoder is built with.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "bmp"];

pub fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Decodes any supported file to RGBA8.
pub fn load_image(path: &Path) -> Result<RgbaImage> {
    let img = image::open(path)?.to_rgba8();
    if img.width() == 0 || img.height() == 0 {
        return Err(EraseError::InvalidBuffer(format!(
            "{} has no pixels",
            path.display()
        )));
    }
    debug!(path = %path.display(), width = img.width(), height = img.height(), "image decoded");
    Ok(img)
}

/// Loads a painted mask file; it must match the image it belongs to.
pub fn load_mask(path: &Path, expected: Dims) -> Result<MaskBuffer> {
    let img = image::open(path)?.to_rgba8();
    let dims = Dims::new(img.width(), img.height());
    if dims != expected {
        return Err(EraseError::DimensionMismatch {
            image: expected,
            mask: dims,
        });
    }
    MaskBuffer::from_rgba(img)
}

/// PNG-encodes an RGBA8 image into `writer`.
pub fn encode_png<W: Write>(image: &RgbaImage, writer: W) -> Result<()> {
    PngEncoder::new(writer).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::Rgba8,
    )?;
    Ok(())
}

pub fn write_png(path: &Path, image: &RgbaImage) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(path)?);
    encode_png(image, &mut writer)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_filter() {
        assert!(is_supported(Path::new("a/b/photo.JPG")));
        assert!(is_supported(Path::new("x.webp")));
        assert!(!is_supported(Path::new("notes.txt")));
        assert!(!is_supported(Path::new("noext")));
    }

    #[test]
    fn png_survives_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("out.png");
        let img = RgbaImage::from_fn(5, 3, |x, y| image::Rgba([x as u8 * 40, y as u8 * 60, 9, 128]));
        write_png(&path, &img).unwrap();
        assert_eq!(load_image(&path).unwrap(), img);
    }

    #[test]
    fn mask_size_is_checked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mask.png");
        write_png(&path, &RgbaImage::new(4, 4)).unwrap();
        assert!(load_mask(&path, Dims::new(4, 4)).is_ok());
        assert!(matches!(
            load_mask(&path, Dims::new(5, 4)),
            Err(EraseError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_image(Path::new("/definitely/not/here.png")).is_err());
    }
}
