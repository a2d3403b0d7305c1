// ============================================================================
// Inpainting algorithms — fast marching (Telea) and PatchMatch exemplar fill
// ============================================================================
//
// Both functions take a 3-channel colour image and a hole mask (>0 = fill)
// and return a new image of the same size. Pixels outside the hole are never
// written.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use image::{GrayImage, Luma, RgbImage};

/// Largest neighbourhood radius accepted anywhere in the pipeline.
pub const MAX_RADIUS: u32 = 16;

// -- Fast marching --------------------------------------------------------

const KNOWN: u8 = 0;
const BAND: u8 = 1;
const INSIDE: u8 = 2;
const T_INSIDE: f32 = 1.0e6;

#[derive(Clone, Copy, Debug)]
struct Tap {
    dx: i32,
    dy: i32,
    /// 1 / |r|³ — the geometric distance factor.
    dst: f32,
}

/// Precomputed neighbourhood offsets for one radius.
#[derive(Clone, Debug)]
pub struct TeleaKernel {
    radius: u32,
    taps: Vec<Tap>,
}

impl TeleaKernel {
    pub fn new(radius: u32) -> Self {
        let radius = radius.clamp(1, MAX_RADIUS);
        let r = radius as i32;
        let mut taps = Vec::with_capacity(((2 * r + 1) * (2 * r + 1)) as usize);
        for dy in -r..=r {
            for dx in -r..=r {
                let r2 = dx * dx + dy * dy;
                if r2 == 0 || r2 > r * r {
                    continue;
                }
                let r2 = r2 as f32;
                taps.push(Tap {
                    dx,
                    dy,
                    dst: 1.0 / (r2 * r2.sqrt()),
                });
            }
        }
        Self { radius, taps }
    }

    pub fn radius(&self) -> u32 {
        self.radius
    }
}

/// Min-heap entry on arrival time.
#[derive(Clone, Copy, Debug)]
struct Front {
    t: f32,
    idx: usize,
}

impl PartialEq for Front {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
impl Eq for Front {}
impl PartialOrd for Front {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Front {
    fn cmp(&self, other: &Self) -> Ordering {
        // reversed: BinaryHeap is a max-heap
        other
            .t
            .total_cmp(&self.t)
            .then_with(|| other.idx.cmp(&self.idx))
    }
}

struct Field {
    w: i64,
    h: i64,
    flags: Vec<u8>,
    t: Vec<f32>,
}

impl Field {
    #[inline]
    fn probe(&self, x: i64, y: i64) -> (u8, f32) {
        if x < 0 || y < 0 || x >= self.w || y >= self.h {
            return (INSIDE, T_INSIDE);
        }
        let i = (y * self.w + x) as usize;
        (self.flags[i], self.t[i])
    }

    /// One quadrant of the eikonal update |∇T| = 1.
    fn solve(&self, x1: i64, y1: i64, x2: i64, y2: i64) -> f32 {
        let (f1, a11) = self.probe(x1, y1);
        let (f2, a22) = self.probe(x2, y2);
        match (f1 != INSIDE, f2 != INSIDE) {
            (true, true) => {
                let d = a11 - a22;
                if d.abs() >= 1.0 {
                    1.0 + a11.min(a22)
                } else {
                    (a11 + a22 + (2.0 - d * d).sqrt()) * 0.5
                }
            }
            (true, false) => 1.0 + a11,
            (false, true) => 1.0 + a22,
            (false, false) => 1.0 + a11.min(a22),
        }
    }

    fn arrival(&self, x: i64, y: i64) -> f32 {
        self.solve(x - 1, y, x, y - 1)
            .min(self.solve(x + 1, y, x, y - 1))
            .min(self.solve(x - 1, y, x, y + 1))
            .min(self.solve(x + 1, y, x, y + 1))
    }

    /// Gradient of T along one axis from whichever neighbours are usable.
    fn grad_axis(&self, here: f32, prev: (u8, f32), next: (u8, f32)) -> f32 {
        match (prev.0 != INSIDE, next.0 != INSIDE) {
            (true, true) => (next.1 - prev.1) * 0.5,
            (false, true) => next.1 - here,
            (true, false) => here - prev.1,
            (false, false) => 0.0,
        }
    }
}

/// Fills every hole pixel reachable from known pixels by marching inward.
///
/// Each newly reached pixel becomes a weighted average of the already-known
/// pixels within the kernel radius. Weights favour close pixels, pixels on
/// the same level set, and pixels along the marching direction.
pub fn fill_telea(color: &RgbImage, hole: &GrayImage, kernel: &TeleaKernel) -> RgbImage {
    let (w, h) = color.dimensions();
    let mut out = color.clone();
    let n = w as usize * h as usize;

    let flags: Vec<u8> = hole
        .as_raw()
        .iter()
        .map(|&m| if m > 0 { INSIDE } else { KNOWN })
        .collect();
    let t: Vec<f32> = flags
        .iter()
        .map(|&f| if f == INSIDE { T_INSIDE } else { 0.0 })
        .collect();
    debug_assert_eq!(flags.len(), n);
    let mut field = Field {
        w: w as i64,
        h: h as i64,
        flags,
        t,
    };

    // Initial narrow band: known pixels touching the hole.
    let mut heap = BinaryHeap::new();
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let i = (y * field.w + x) as usize;
            if field.flags[i] != KNOWN {
                continue;
            }
            let touches = [(-1, 0), (1, 0), (0, -1), (0, 1)].iter().any(|&(dx, dy)| {
                let (nx, ny) = (x + dx, y + dy);
                nx >= 0 && ny >= 0 && nx < field.w && ny < field.h && field.probe(nx, ny).0 == INSIDE
            });
            if touches {
                field.flags[i] = BAND;
                heap.push(Front { t: 0.0, idx: i });
            }
        }
    }

    while let Some(Front { idx, .. }) = heap.pop() {
        if field.flags[idx] == KNOWN {
            continue;
        }
        field.flags[idx] = KNOWN;
        let (x, y) = ((idx as i64) % field.w, (idx as i64) / field.w);

        for (dx, dy) in [(-1i64, 0i64), (1, 0), (0, -1), (0, 1)] {
            let (nx, ny) = (x + dx, y + dy);
            if nx < 0 || ny < 0 || nx >= field.w || ny >= field.h {
                continue;
            }
            let ni = (ny * field.w + nx) as usize;
            if field.flags[ni] != INSIDE {
                continue;
            }
            let t = field.arrival(nx, ny);
            field.t[ni] = t;
            let px = telea_pixel(&field, &out, kernel, nx, ny);
            out.put_pixel(nx as u32, ny as u32, px);
            field.flags[ni] = BAND;
            heap.push(Front { t, idx: ni });
        }
    }

    out
}

fn telea_pixel(field: &Field, img: &RgbImage, kernel: &TeleaKernel, x: i64, y: i64) -> image::Rgb<u8> {
    let here = field.t[(y * field.w + x) as usize];
    let gx = field.grad_axis(here, field.probe(x - 1, y), field.probe(x + 1, y));
    let gy = field.grad_axis(here, field.probe(x, y - 1), field.probe(x, y + 1));

    let mut acc = [0.0f32; 3];
    let mut total = 0.0f32;
    for tap in &kernel.taps {
        let (nx, ny) = (x + tap.dx as i64, y + tap.dy as i64);
        let (flag, nt) = field.probe(nx, ny);
        if flag == INSIDE {
            continue;
        }
        // r points from the neighbour to the pixel being filled
        let (rx, ry) = (-tap.dx as f32, -tap.dy as f32);
        let mut dir = rx * gx + ry * gy;
        if dir.abs() <= 0.01 {
            dir = 1.0e-6;
        }
        let lev = 1.0 / (1.0 + (nt - here).abs());
        let wgt = (tap.dst * lev * dir).abs();
        let p = img.get_pixel(nx as u32, ny as u32).0;
        for c in 0..3 {
            acc[c] += wgt * p[c] as f32;
        }
        total += wgt;
    }

    if total <= 0.0 {
        return *img.get_pixel(x as u32, y as u32);
    }
    image::Rgb([
        (acc[0] / total).round().clamp(0.0, 255.0) as u8,
        (acc[1] / total).round().clamp(0.0, 255.0) as u8,
        (acc[2] / total).round().clamp(0.0, 255.0) as u8,
    ])
}

// -- PatchMatch exemplar fill ---------------------------------------------
//
// Onion peeling: each pass fills the current boundary layer of the hole by
// copying the centre of the best-matching patch found with PatchMatch, then
// shrinks the hole. Patch distances only count pixels that are known on
// both sides, so the fill matches the surrounding context and never the
// content being removed.

#[derive(Clone, Copy, Debug)]
struct Match {
    ox: i32,
    oy: i32,
    cost: f32,
}

const LCG_RANGE: f32 = (1u64 << 31) as f32;

const NO_MATCH: Match = Match {
    ox: 0,
    oy: 0,
    cost: f32::INFINITY,
};

struct Exemplar<'a> {
    img: &'a RgbImage,
    live: &'a [bool],
    w: i32,
    h: i32,
    half: i32,
    min_valid: usize,
}

impl Exemplar<'_> {
    #[inline]
    fn is_live(&self, x: i32, y: i32) -> bool {
        self.live[(y * self.w + x) as usize]
    }

    #[inline]
    fn in_bounds(&self, x: i32, y: i32) -> bool {
        x >= 0 && y >= 0 && x < self.w && y < self.h
    }

    /// Mean squared colour distance over pixels known around both centres.
    fn cost(&self, ax: i32, ay: i32, bx: i32, by: i32) -> f32 {
        let mut ssd = 0.0f32;
        let mut count = 0usize;
        for dy in -self.half..=self.half {
            for dx in -self.half..=self.half {
                let (pax, pay, pbx, pby) = (ax + dx, ay + dy, bx + dx, by + dy);
                if !self.in_bounds(pax, pay) || !self.in_bounds(pbx, pby) {
                    continue;
                }
                if self.is_live(pax, pay) || self.is_live(pbx, pby) {
                    continue;
                }
                let pa = self.img.get_pixel(pax as u32, pay as u32).0;
                let pb = self.img.get_pixel(pbx as u32, pby as u32).0;
                for c in 0..3 {
                    let d = pa[c] as f32 - pb[c] as f32;
                    ssd += d * d;
                }
                count += 1;
            }
        }
        if count < self.min_valid {
            f32::INFINITY
        } else {
            ssd / count as f32
        }
    }

    fn try_candidate(&self, x: i32, y: i32, cx: i32, cy: i32, best: &mut Match) {
        if !self.in_bounds(cx, cy) || self.is_live(cx, cy) {
            return;
        }
        let cost = self.cost(x, y, cx, cy);
        if cost < best.cost {
            *best = Match {
                ox: cx - x,
                oy: cy - y,
                cost,
            };
        }
    }
}

/// 31-bit output of a 64-bit LCG.
#[inline]
fn lcg(state: &mut u64) -> u64 {
    *state = state
        .wrapping_mul(6364136223846793005)
        .wrapping_add(1442695040888963407);
    *state >> 33
}

/// Exemplar fill. Pixels the search cannot match are finished with
/// [`fill_telea`] using `fallback`.
pub fn fill_patchmatch(
    color: &RgbImage,
    hole: &GrayImage,
    patch_size: u32,
    iterations: usize,
    fallback: &TeleaKernel,
) -> RgbImage {
    let (w, h) = color.dimensions();
    let n = w as usize * h as usize;
    let half = (patch_size.clamp(3, 11) / 2) as i32;
    let side = (2 * half + 1) as usize;
    let min_valid = (side * side / 4).max(4);
    let max_radius = w.max(h) as f32;

    let mut out = color.clone();
    // `pending`: still to be peeled. `live`: excluded from matching, which
    // also covers pixels the search gave up on.
    let mut pending: Vec<bool> = hole.as_raw().iter().map(|&m| m > 0).collect();
    let mut live = pending.clone();
    let mut unfilled = vec![false; n];
    let mut sources: Vec<usize> = (0..n).filter(|&i| !live[i]).collect();
    if sources.is_empty() {
        return out;
    }
    let mut nnf = vec![NO_MATCH; n];
    let passes = iterations.max(1);

    let max_peels = (w.max(h) as usize + 1) * 2;
    for _ in 0..max_peels {
        let boundary: Vec<usize> = (0..n)
            .filter(|&i| {
                if !pending[i] {
                    return false;
                }
                let (x, y) = ((i % w as usize) as i32, (i / w as usize) as i32);
                [(-1, 0), (1, 0), (0, -1), (0, 1)].iter().any(|&(dx, dy)| {
                    let (nx, ny) = (x + dx, y + dy);
                    nx >= 0
                        && ny >= 0
                        && nx < w as i32
                        && ny < h as i32
                        && !pending[(ny * w as i32 + nx) as usize]
                })
            })
            .collect();
        if boundary.is_empty() {
            break;
        }

        let ex = Exemplar {
            img: &out,
            live: &live,
            w: w as i32,
            h: h as i32,
            half,
            min_valid,
        };

        // Seed every boundary pixel with a handful of random sources.
        for &i in &boundary {
            let (x, y) = ((i % w as usize) as i32, (i / w as usize) as i32);
            let mut rng = (x as u64)
                .wrapping_mul(1234567891)
                .wrapping_add((y as u64).wrapping_mul(987654321));
            let mut best = NO_MATCH;
            for _ in 0..5 {
                let s = sources[lcg(&mut rng) as usize % sources.len()];
                let (sx, sy) = ((s % w as usize) as i32, (s / w as usize) as i32);
                ex.try_candidate(x, y, sx, sy, &mut best);
            }
            nnf[i] = best;
        }

        for pass in 0..passes {
            let forward = pass % 2 == 0;
            let order: Box<dyn Iterator<Item = &usize>> = if forward {
                Box::new(boundary.iter())
            } else {
                Box::new(boundary.iter().rev())
            };
            for &i in order {
                let (x, y) = ((i % w as usize) as i32, (i / w as usize) as i32);
                let mut best = nnf[i];

                // Propagation from the already-visited neighbours.
                let step = if forward { -1 } else { 1 };
                for (nx, ny) in [(x + step, y), (x, y + step)] {
                    if !ex.in_bounds(nx, ny) {
                        continue;
                    }
                    let m = nnf[(ny * w as i32 + nx) as usize];
                    if m.cost.is_finite() {
                        ex.try_candidate(x, y, x + m.ox, y + m.oy, &mut best);
                    }
                }

                // Random search around the current best, halving the radius.
                let mut rng = (x as u64)
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add((y as u64).wrapping_mul(982451653))
                    .wrapping_add(pass as u64 * 1234567891);
                let mut radius = max_radius;
                while radius >= 1.0 {
                    let ra = lcg(&mut rng) as f32 / LCG_RANGE;
                    let rb = lcg(&mut rng) as f32 / LCG_RANGE;
                    let cx = (x as f32 + best.ox as f32 + (ra * 2.0 - 1.0) * radius).round() as i32;
                    let cy = (y as f32 + best.oy as f32 + (rb * 2.0 - 1.0) * radius).round() as i32;
                    ex.try_candidate(x, y, cx, cy, &mut best);
                    radius *= 0.5;
                }
                nnf[i] = best;
            }
        }

        // Copy matched centres; collect first, `out` is still borrowed.
        let fills: Vec<(usize, Option<image::Rgb<u8>>)> = boundary
            .iter()
            .map(|&i| {
                let m = nnf[i];
                if !m.cost.is_finite() {
                    return (i, None);
                }
                let (x, y) = ((i % w as usize) as i32, (i / w as usize) as i32);
                let (sx, sy) = (x + m.ox, y + m.oy);
                if !ex.in_bounds(sx, sy) || ex.is_live(sx, sy) {
                    return (i, None);
                }
                (i, Some(*out.get_pixel(sx as u32, sy as u32)))
            })
            .collect();

        for (i, px) in fills {
            pending[i] = false;
            match px {
                Some(px) => {
                    out.put_pixel((i % w as usize) as u32, (i / w as usize) as u32, px);
                    live[i] = false;
                    sources.push(i);
                }
                None => unfilled[i] = true,
            }
        }
    }

    // Anything still pending (peel budget exhausted) also needs the fallback.
    for (u, p) in unfilled.iter_mut().zip(&pending) {
        *u |= *p;
    }
    if unfilled.iter().any(|&u| u) {
        let rest = GrayImage::from_fn(w, h, |x, y| {
            Luma([if unfilled[(y * w + x) as usize] { 255 } else { 0 }])
        });
        out = fill_telea(&out, &rest, fallback);
    }

    out
}
