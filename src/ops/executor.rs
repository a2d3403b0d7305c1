// ============================================================================
// Inpainting executor — runs on the worker thread for every process request
// ============================================================================
//
//   1. RGBA image  → RGB (alpha dropped)
//   2. RGBA mask   → luma → binary hole mask (luma > MASK_THRESHOLD)
//   3. backend reconstruction on the RGB image
//   4. RGB result  → RGBA: hole pixels become opaque, every other pixel is the
//      untouched input byte-for-byte
//
// The input image vector is reused as the output buffer, so pixels outside
// the hole are never rewritten at all.

use image::{GrayImage, RgbImage};
use rayon::prelude::*;

use crate::backend::Reconstructor;
use crate::buffer::{BYTES_PER_PIXEL, Dims};
use crate::protocol::{ProcessRequest, ProcessResponse, ProcessedPixels};

/// Mask luma above this is "erase"; it strips anti-aliased stroke fringes.
pub const MASK_THRESHOLD: u8 = 10;

/// BT.601 luma in integer arithmetic.
#[inline]
pub fn luma(px: &[u8]) -> u8 {
    ((299 * px[0] as u32 + 587 * px[1] as u32 + 114 * px[2] as u32 + 500) / 1000) as u8
}

/// Binarizes an RGBA8 mask into 0 / 255 per pixel.
pub fn binarize_mask(mask_rgba: &[u8]) -> Vec<u8> {
    mask_rgba
        .par_chunks_exact(BYTES_PER_PIXEL)
        .map(|px| if luma(px) > MASK_THRESHOLD { 255 } else { 0 })
        .collect()
}

/// Runs one job to completion. Never panics on bad input; every failure is
/// reported through the response.
pub fn execute(backend: &dyn Reconstructor, req: ProcessRequest) -> ProcessResponse {
    let job = req.job;
    ProcessResponse {
        job,
        result: run(backend, req),
    }
}

fn run(backend: &dyn Reconstructor, req: ProcessRequest) -> Result<ProcessedPixels, String> {
    let ProcessRequest {
        image_pixels,
        mask_pixels,
        width,
        height,
        params,
        ..
    } = req;
    let dims = Dims::new(width, height);
    dims.check_len(image_pixels.len())
        .map_err(|e| format!("image: {}", e))?;
    dims.check_len(mask_pixels.len())
        .map_err(|e| format!("mask: {}", e))?;

    let hole = binarize_mask(&mask_pixels);
    drop(mask_pixels);
    let erase = hole.iter().filter(|&&m| m > 0).count();
    if erase == 0 {
        // nothing painted: hand the input straight back
        return Ok(ProcessedPixels {
            pixels: image_pixels,
            width,
            height,
        });
    }
    if erase == dims.pixel_count() {
        return Err("mask covers the whole image; nothing left to sample from".to_string());
    }

    let mut rgb = Vec::new();
    rgb.try_reserve_exact(dims.pixel_count() * 3)
        .map_err(|e| format!("allocation failed: {}", e))?;
    rgb.extend(
        image_pixels
            .chunks_exact(BYTES_PER_PIXEL)
            .flat_map(|px| [px[0], px[1], px[2]]),
    );
    let color = RgbImage::from_raw(width, height, rgb)
        .ok_or_else(|| "colour buffer does not match dimensions".to_string())?;
    let hole_img = GrayImage::from_raw(width, height, hole)
        .ok_or_else(|| "hole buffer does not match dimensions".to_string())?;

    let filled = backend.reconstruct(&color, &hole_img, &params)?;
    if filled.dimensions() != (width, height) {
        return Err(format!(
            "backend returned {}x{} for a {} image",
            filled.width(),
            filled.height(),
            dims
        ));
    }

    let mut pixels = image_pixels;
    pixels
        .par_chunks_exact_mut(BYTES_PER_PIXEL)
        .zip(filled.as_raw().par_chunks_exact(3))
        .zip(hole_img.as_raw().par_iter())
        .for_each(|((dst, src), &m)| {
            if m > 0 {
                dst[..3].copy_from_slice(src);
                dst[3] = 255;
            }
        });

    Ok(ProcessedPixels {
        pixels,
        width,
        height,
    })
}
