// ============================================================================
// Capture surface — rasterizes brush strokes into a native-resolution mask
// ============================================================================
//
// Runs entirely on the interactive thread. Points arrive already mapped to
// native space (see `coords`), so on-screen zoom never changes what lands in
// the mask. Coverage is anti-aliased and stored as (c, c, c, c); the executor
// thresholds it later, which strips the faint fringe.

use crate::buffer::{BYTES_PER_PIXEL, Dims, MaskBuffer};
use crate::coords::Point;

/// Smallest brush the UI offers, in native pixels.
pub const BRUSH_MIN: f32 = 5.0;
/// Largest brush the UI offers, in native pixels.
pub const BRUSH_MAX: f32 = 50.0;
pub const BRUSH_DEFAULT: f32 = 20.0;

pub fn clamp_brush(diameter: f32) -> f32 {
    if diameter.is_nan() {
        return BRUSH_DEFAULT;
    }
    diameter.clamp(BRUSH_MIN, BRUSH_MAX)
}

/// A recorded stroke: native-space points plus one diameter.
#[derive(Clone, Debug, PartialEq)]
pub struct BrushStroke {
    pub points: Vec<Point>,
    pub diameter: f32,
}

impl BrushStroke {
    pub fn new(diameter: f32) -> Self {
        Self {
            points: Vec::new(),
            diameter,
        }
    }

    /// Replays the stroke as begin / extend… / end.
    pub fn replay(&self, surface: &mut CaptureSurface) {
        let mut pts = self.points.iter();
        let Some(&first) = pts.next() else { return };
        if !surface.begin_stroke(first, self.diameter) {
            return;
        }
        for &p in pts {
            surface.extend_stroke(p);
        }
        surface.end_stroke();
    }
}

#[derive(Clone, Copy, Debug)]
struct OpenStroke {
    last: Point,
    diameter: f32,
}

/// Owns the live mask until a job snapshots it.
#[derive(Debug)]
pub struct CaptureSurface {
    mask: MaskBuffer,
    stroke: Option<OpenStroke>,
    /// Bumped on every visible change so overlays know when to re-upload.
    revision: u64,
}

impl CaptureSurface {
    pub fn new(dims: Dims) -> Self {
        Self {
            mask: MaskBuffer::new(dims),
            stroke: None,
            revision: 0,
        }
    }

    pub fn dims(&self) -> Dims {
        self.mask.dims()
    }

    pub fn mask(&self) -> &MaskBuffer {
        &self.mask
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_stroking(&self) -> bool {
        self.stroke.is_some()
    }

    /// Stamps a filled circle and opens a stroke. Returns `false` (nothing
    /// drawn) for a non-finite point or a non-positive diameter.
    pub fn begin_stroke(&mut self, p: Point, diameter: f32) -> bool {
        if !p.x.is_finite() || !p.y.is_finite() || !diameter.is_finite() || diameter <= 0.0 {
            return false;
        }
        stamp_capsule(&mut self.mask, p, p, diameter * 0.5);
        self.stroke = Some(OpenStroke { last: p, diameter });
        self.revision += 1;
        true
    }

    /// Draws a capsule from the last point to `p`. Returns `false` when no
    /// stroke is open.
    pub fn extend_stroke(&mut self, p: Point) -> bool {
        if !p.x.is_finite() || !p.y.is_finite() {
            return false;
        }
        let Some(stroke) = self.stroke.as_mut() else {
            return false;
        };
        stamp_capsule(&mut self.mask, stroke.last, p, stroke.diameter * 0.5);
        stroke.last = p;
        self.revision += 1;
        true
    }

    pub fn end_stroke(&mut self) {
        self.stroke = None;
    }

    /// Back to all-"keep".
    pub fn clear(&mut self) {
        self.mask.clear();
        self.stroke = None;
        self.revision += 1;
    }

    /// Hands the live mask over and starts again from a fresh one.
    pub fn snapshot(&mut self) -> MaskBuffer {
        let dims = self.mask.dims();
        self.stroke = None;
        self.revision += 1;
        std::mem::replace(&mut self.mask, MaskBuffer::new(dims))
    }

    /// Puts back a snapshot that was never consumed (e.g. a refused job).
    /// Strokes painted since the snapshot are merged in. Returns `false` and
    /// drops `mask` when its size does not match.
    pub fn restore(&mut self, mask: MaskBuffer) -> bool {
        if mask.dims() != self.mask.dims() {
            return false;
        }
        for (live, old) in self
            .mask
            .as_bytes_mut()
            .chunks_exact_mut(BYTES_PER_PIXEL)
            .zip(mask.as_bytes().chunks_exact(BYTES_PER_PIXEL))
        {
            if old[3] > live[3] {
                live.copy_from_slice(old);
            }
        }
        self.revision += 1;
        true
    }
}

/// Distance from `p` to the segment `a`–`b`.
fn segment_distance(p: Point, a: Point, b: Point) -> f32 {
    let (abx, aby) = (b.x - a.x, b.y - a.y);
    let len2 = abx * abx + aby * aby;
    let t = if len2 < 1e-12 {
        0.0
    } else {
        (((p.x - a.x) * abx + (p.y - a.y) * aby) / len2).clamp(0.0, 1.0)
    };
    let (cx, cy) = (a.x + abx * t, a.y + aby * t);
    ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt()
}

/// Rasterizes a thick line with round caps (a circle when `a == b`).
/// Coverage only ever grows; overlapping stamps never thin a pixel out.
fn stamp_capsule(mask: &mut MaskBuffer, a: Point, b: Point, radius: f32) {
    let Dims { width, height } = mask.dims();
    let pad = radius + 1.0;

    let min_x = (a.x.min(b.x) - pad).floor().max(0.0);
    let min_y = (a.y.min(b.y) - pad).floor().max(0.0);
    let max_x = (a.x.max(b.x) + pad).ceil().min(width as f32 - 1.0);
    let max_y = (a.y.max(b.y) + pad).ceil().min(height as f32 - 1.0);
    if min_x > max_x || min_y > max_y {
        return;
    }

    let stride = width as usize;
    let data = mask.as_bytes_mut();
    for y in min_y as u32..=max_y as u32 {
        for x in min_x as u32..=max_x as u32 {
            let center = Point::new(x as f32 + 0.5, y as f32 + 0.5);
            let cov = (radius + 0.5 - segment_distance(center, a, b)).clamp(0.0, 1.0);
            if cov <= 0.0 {
                continue;
            }
            let c = (cov * 255.0).round() as u8;
            let off = (y as usize * stride + x as usize) * BYTES_PER_PIXEL;
            if c > data[off + 3] {
                data[off..off + BYTES_PER_PIXEL].fill(c);
            }
        }
    }
}
