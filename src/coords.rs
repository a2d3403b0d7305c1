//! Display-space ↔ native-space mapping.
//!
//! Display space is whatever the image is rendered at on screen (zoomed,
//! letterboxed, HiDPI-scaled); native space is the image's own pixel grid.
//! Every function here is pure. A display size that has not been measured yet
//! (zero, negative, NaN) makes the mapping fail closed with `None`, so no
//! stroke is ever recorded against a degenerate scale.

/// A 2-D point in either space.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Width/height of a surface in either space.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Positive and finite on both axes.
    pub fn is_measured(&self) -> bool {
        self.width.is_finite() && self.height.is_finite() && self.width > 0.0 && self.height > 0.0
    }
}

impl From<crate::buffer::Dims> for Size {
    fn from(d: crate::buffer::Dims) -> Self {
        Size::new(d.width as f32, d.height as f32)
    }
}

/// Per-axis native→display ratio, or `None` while either size is unmeasured.
fn axis_scales(display: Size, native: Size) -> Option<(f32, f32)> {
    if !display.is_measured() || !native.is_measured() {
        return None;
    }
    Some((display.width / native.width, display.height / native.height))
}

/// Pointer position (relative to the image's top-left on screen) → native pixels.
pub fn to_native(p: Point, display: Size, native: Size) -> Option<Point> {
    if !p.x.is_finite() || !p.y.is_finite() {
        return None;
    }
    let (sx, sy) = axis_scales(display, native)?;
    Some(Point::new(p.x / sx, p.y / sy))
}

/// Native pixel position → on-screen position.
pub fn to_display(p: Point, display: Size, native: Size) -> Option<Point> {
    if !p.x.is_finite() || !p.y.is_finite() {
        return None;
    }
    let (sx, sy) = axis_scales(display, native)?;
    Some(Point::new(p.x * sx, p.y * sy))
}

/// Horizontal display/native ratio. Images are laid out aspect-preserving, so
/// one factor is enough to size things like the brush cursor.
pub fn scale_factor(display: Size, native: Size) -> Option<f32> {
    axis_scales(display, native).map(|(sx, _)| sx)
}

/// On-screen diameter of a brush whose size is given in native pixels.
pub fn cursor_diameter(brush_native: f32, display: Size, native: Size) -> Option<f32> {
    if !brush_native.is_finite() || brush_native <= 0.0 {
        return None;
    }
    scale_factor(display, native).map(|s| brush_native * s)
}

/// Maps an absolute pointer position inside a laid-out image rect.
///
/// `origin` is the rect's top-left in the same absolute space as `pointer`.
pub fn pointer_to_native(pointer: Point, origin: Point, display: Size, native: Size) -> Option<Point> {
    to_native(
        Point::new(pointer.x - origin.x, pointer.y - origin.y),
        display,
        native,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn half_size_display_doubles_coordinates() {
        let p = to_native(Point::new(10.0, 20.0), Size::new(50.0, 50.0), Size::new(100.0, 100.0));
        assert_eq!(p, Some(Point::new(20.0, 40.0)));
    }

    #[test]
    fn unmeasured_display_fails_closed() {
        let native = Size::new(640.0, 480.0);
        assert_eq!(to_native(Point::new(1.0, 1.0), Size::default(), native), None);
        assert_eq!(to_native(Point::new(1.0, 1.0), Size::new(f32::NAN, 10.0), native), None);
        assert_eq!(scale_factor(Size::new(0.0, 480.0), native), None);
        assert_eq!(cursor_diameter(20.0, Size::new(-1.0, 5.0), native), None);
    }

    #[test]
    fn cursor_tracks_zoom() {
        let d = cursor_diameter(20.0, Size::new(320.0, 240.0), Size::new(640.0, 480.0));
        assert_eq!(d, Some(10.0));
    }

    #[test]
    fn pointer_offset_is_removed() {
        let p = pointer_to_native(
            Point::new(110.0, 60.0),
            Point::new(100.0, 50.0),
            Size::new(200.0, 100.0),
            Size::new(400.0, 200.0),
        );
        assert_eq!(p, Some(Point::new(20.0, 20.0)));
    }

    proptest! {
        #[test]
        fn display_native_round_trip(
            px in 0.0f32..4096.0,
            py in 0.0f32..4096.0,
            dw in 1.0f32..4096.0,
            dh in 1.0f32..4096.0,
            nw in 1.0f32..8192.0,
            nh in 1.0f32..8192.0,
        ) {
            let display = Size::new(dw, dh);
            let native = Size::new(nw, nh);
            let n = to_native(Point::new(px, py), display, native).unwrap();
            let back = to_display(n, display, native).unwrap();
            let tol_x = 1e-3 * px.abs().max(1.0);
            let tol_y = 1e-3 * py.abs().max(1.0);
            prop_assert!((back.x - px).abs() <= tol_x, "x: {} vs {}", back.x, px);
            prop_assert!((back.y - py).abs() <= tol_y, "y: {} vs {}", back.y, py);
        }
    }
}
