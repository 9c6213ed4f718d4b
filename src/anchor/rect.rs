//! Box representations and the pairwise geometry used for label assignment.
//!
//! All coordinates are `(y, x)` ordered: rows first, columns second.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Axis-aligned box given by its `[start, end)` extent along each axis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    /// Top edge
    pub y_start: f64,
    /// Bottom edge
    pub y_end: f64,
    /// Left edge
    pub x_start: f64,
    /// Right edge
    pub x_end: f64,
}

impl Extent {
    /// Create an extent from `(y_start, y_end)` and `(x_start, x_end)` pairs.
    #[inline]
    pub fn new(y: (f64, f64), x: (f64, f64)) -> Self {
        Self {
            y_start: y.0,
            y_end: y.1,
            x_start: x.0,
            x_end: x.1,
        }
    }

    #[inline]
    pub fn height(&self) -> f64 {
        self.y_end - self.y_start
    }

    #[inline]
    pub fn width(&self) -> f64 {
        self.x_end - self.x_start
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.height() * self.width()
    }

    /// Convert to centre-size form.
    #[inline]
    pub fn to_centre_box(&self) -> CentreBox {
        CentreBox {
            cy: (self.y_start + self.y_end) * 0.5,
            cx: (self.x_start + self.x_end) * 0.5,
            h: self.height(),
            w: self.width(),
        }
    }

    /// Intersection over union with another extent.
    #[inline]
    pub fn iou(&self, other: &Extent) -> f64 {
        iou(self, other)
    }
}

/// Box given by its centre and size: `(centre_y, centre_x, height, width)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CentreBox {
    /// Centre y coordinate
    pub cy: f64,
    /// Centre x coordinate
    pub cx: f64,
    /// Height of the box
    pub h: f64,
    /// Width of the box
    pub w: f64,
}

impl CentreBox {
    #[inline]
    pub fn new(cy: f64, cx: f64, h: f64, w: f64) -> Self {
        Self { cy, cx, h, w }
    }

    /// Create from a `[centre_y, centre_x, height, width]` array.
    #[inline]
    pub fn from_cycxhw(cycxhw: [f64; 4]) -> Self {
        let [cy, cx, h, w] = cycxhw;
        Self { cy, cx, h, w }
    }

    #[inline]
    pub fn to_cycxhw(&self) -> [f64; 4] {
        [self.cy, self.cx, self.h, self.w]
    }

    /// Top-left corner `(y, x)`.
    #[inline]
    pub fn lower(&self) -> [f64; 2] {
        [self.cy - self.h * 0.5, self.cx - self.w * 0.5]
    }

    /// Bottom-right corner `(y, x)`.
    #[inline]
    pub fn upper(&self) -> [f64; 2] {
        [self.cy + self.h * 0.5, self.cx + self.w * 0.5]
    }

    #[inline]
    pub fn size(&self) -> [f64; 2] {
        [self.h, self.w]
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.h * self.w
    }

    #[inline]
    pub fn to_extent(&self) -> Extent {
        let [y_start, x_start] = self.lower();
        let [y_end, x_end] = self.upper();
        Extent {
            y_start,
            y_end,
            x_start,
            x_end,
        }
    }
}

/// Intersection area over union area of two axis-aligned boxes.
///
/// Disjoint boxes give `0.0`. Both boxes must have positive area; a pair of
/// degenerate boxes yields `NaN`.
pub fn iou(a: &Extent, b: &Extent) -> f64 {
    let inter_h = (a.y_end.min(b.y_end) - a.y_start.max(b.y_start)).max(0.0);
    let inter_w = (a.x_end.min(b.x_end) - a.x_start.max(b.x_start)).max(0.0);
    let inter_area = inter_h * inter_w;

    inter_area / (a.area() + b.area() - inter_area)
}

/// Calculate the IoU matrix between two sets of boxes.
///
/// Returns a matrix of shape (M, N) where M is the length of `boxes_a`
/// and N is the length of `boxes_b`.
pub fn iou_batch(boxes_a: &[Extent], boxes_b: &[Extent]) -> Array2<f64> {
    Array2::from_shape_fn((boxes_a.len(), boxes_b.len()), |(i, j)| {
        iou(&boxes_a[i], &boxes_b[j])
    })
}

/// Centre offset normalised so that `±1` lies on the anchor's edges.
#[inline]
pub(crate) fn centre_offset(target: f64, anchor: f64, anchor_size: f64) -> f64 {
    (target - anchor) * 2.0 / anchor_size
}

/// Encode `target` relative to `anchor`.
///
/// Returns `[rel_centre_y, rel_centre_x, log_height_ratio, log_width_ratio]`.
/// The relative centre lies in `[-1, 1]` whenever the target centre falls
/// inside the anchor box.
pub fn relative_box(target: &CentreBox, anchor: &CentreBox) -> [f64; 4] {
    [
        centre_offset(target.cy, anchor.cy, anchor.h),
        centre_offset(target.cx, anchor.cx, anchor.w),
        (target.h / anchor.h).ln(),
        (target.w / anchor.w).ln(),
    ]
}

/// Decode a regression target produced by [`relative_box`] back into an
/// absolute box.
pub fn apply_relative_box(rel_box: [f64; 4], anchor: &CentreBox) -> CentreBox {
    let [rel_cy, rel_cx, log_h, log_w] = rel_box;
    CentreBox {
        cy: anchor.cy + rel_cy * anchor.h * 0.5,
        cx: anchor.cx + rel_cx * anchor.w * 0.5,
        h: anchor.h * log_h.exp(),
        w: anchor.w * log_w.exp(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_box_conversions() {
        let b = CentreBox::new(20.0, 30.0, 16.0, 8.0);
        let extent = b.to_extent();
        assert_eq!(extent, Extent::new((12.0, 28.0), (26.0, 34.0)));
        assert_eq!(extent.to_centre_box(), b);
        assert_eq!(b.lower(), [12.0, 26.0]);
        assert_eq!(b.upper(), [28.0, 34.0]);
        assert_eq!(b.area(), extent.area());
    }

    #[test]
    fn test_iou() {
        let a = Extent::new((0.0, 10.0), (0.0, 10.0));
        let b = Extent::new((5.0, 15.0), (5.0, 15.0));

        // Intersection: 5x5 = 25
        // Union: 100 + 100 - 25 = 175
        assert_abs_diff_eq!(iou(&a, &b), 25.0 / 175.0, epsilon = 1e-12);
        assert_eq!(iou(&a, &b), iou(&b, &a));
    }

    #[test]
    fn test_iou_no_overlap() {
        let a = Extent::new((0.0, 10.0), (0.0, 10.0));
        let b = Extent::new((20.0, 30.0), (20.0, 30.0));
        assert_eq!(a.iou(&b), 0.0);

        // Touching edges do not overlap
        let c = Extent::new((10.0, 20.0), (0.0, 10.0));
        assert_eq!(a.iou(&c), 0.0);

        // Overlapping along one axis only
        let d = Extent::new((2.0, 8.0), (40.0, 50.0));
        assert_eq!(a.iou(&d), 0.0);
    }

    #[test]
    fn test_iou_same_box() {
        let a = Extent::new((1.5, 7.25), (-3.0, 9.0));
        assert_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn test_iou_contained() {
        let outer = Extent::new((0.0, 10.0), (0.0, 10.0));
        let inner = Extent::new((2.0, 4.0), (2.0, 7.0));
        assert_abs_diff_eq!(outer.iou(&inner), 10.0 / 100.0, epsilon = 1e-12);
    }

    #[test]
    fn test_iou_batch_symmetry_and_bounds() {
        let boxes: Vec<Extent> = [
            (0.0, 4.0, 0.0, 4.0),
            (1.0, 6.0, 2.0, 3.5),
            (-2.0, 1.0, 3.0, 9.0),
            (10.0, 11.0, 10.0, 11.0),
        ]
        .iter()
        .map(|&(y0, y1, x0, x1)| Extent::new((y0, y1), (x0, x1)))
        .collect();

        let m = iou_batch(&boxes, &boxes);
        assert_eq!(m.dim(), (4, 4));
        for i in 0..4 {
            assert_eq!(m[[i, i]], 1.0);
            for j in 0..4 {
                assert_eq!(m[[i, j]], m[[j, i]]);
                assert!((0.0..=1.0).contains(&m[[i, j]]));
            }
        }
        assert_eq!(m[[0, 3]], 0.0);
    }

    #[test]
    fn test_relative_box() {
        let target = CentreBox::new(20.0, 30.0, 15.0, 18.0);
        let anchor = CentreBox::new(24.0, 24.0, 16.0, 8.0);
        let rel = relative_box(&target, &anchor);
        assert_eq!(rel[0], -0.5);
        assert_eq!(rel[1], 1.5);
        assert_abs_diff_eq!(rel[2], (15.0f64 / 16.0).ln());
        assert_abs_diff_eq!(rel[3], (18.0f64 / 8.0).ln());
    }

    #[test]
    fn test_relative_box_identity() {
        let anchor = CentreBox::new(24.0, 24.0, 16.0, 16.0);
        assert_eq!(relative_box(&anchor, &anchor), [0.0, 0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_log_ratio_is_antisymmetric() {
        let a = CentreBox::new(0.0, 0.0, 8.0, 12.0);
        let b = CentreBox::new(0.0, 0.0, 16.0, 3.0);
        let ab = relative_box(&a, &b);
        let ba = relative_box(&b, &a);
        assert_abs_diff_eq!(ab[2], -ba[2], epsilon = 1e-12);
        assert_abs_diff_eq!(ab[3], -ba[3], epsilon = 1e-12);
    }

    #[test]
    fn test_apply_relative_box_inverts_encoding() {
        let target = CentreBox::new(200.0, 300.0, 8.0, 12.0);
        let anchor = CentreBox::new(200.0, 296.0, 16.0, 8.0);
        let decoded = apply_relative_box(relative_box(&target, &anchor), &anchor);
        assert_abs_diff_eq!(decoded.cy, target.cy, epsilon = 1e-9);
        assert_abs_diff_eq!(decoded.cx, target.cx, epsilon = 1e-9);
        assert_abs_diff_eq!(decoded.h, target.h, epsilon = 1e-9);
        assert_abs_diff_eq!(decoded.w, target.w, epsilon = 1e-9);
    }
}
