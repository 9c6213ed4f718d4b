//! Builder for creating ground-truth boxes from various annotation formats.

use crate::anchor::CentreBox;

/// Builder for creating ground-truth [`CentreBox`] values from various input
/// formats. All formats are `(y, x)` ordered.
#[derive(Debug, Clone, Default)]
pub struct GroundTruthBuilder {
    top: f64,
    left: f64,
    bottom: f64,
    right: f64,
}

impl GroundTruthBuilder {
    /// Create a new ground-truth builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the box from its corners (top, left, bottom, right).
    pub fn tlbr(mut self, t: f64, l: f64, b: f64, r: f64) -> Self {
        self.top = t;
        self.left = l;
        self.bottom = b;
        self.right = r;
        self
    }

    /// Set the box from its top-left corner and size (top, left, height, width).
    pub fn tlhw(mut self, t: f64, l: f64, h: f64, w: f64) -> Self {
        self.top = t;
        self.left = l;
        self.bottom = t + h;
        self.right = l + w;
        self
    }

    /// Set the box from its centre and size (centre_y, centre_x, height, width).
    pub fn cycxhw(mut self, cy: f64, cx: f64, h: f64, w: f64) -> Self {
        self.top = cy - h * 0.5;
        self.left = cx - w * 0.5;
        self.bottom = cy + h * 0.5;
        self.right = cx + w * 0.5;
        self
    }

    /// Scale every coordinate, e.g. to map annotations made on the original
    /// image onto a downsampled copy.
    pub fn scale(mut self, sy: f64, sx: f64) -> Self {
        self.top *= sy;
        self.bottom *= sy;
        self.left *= sx;
        self.right *= sx;
        self
    }

    /// Build the final centre-size box.
    pub fn build(self) -> CentreBox {
        CentreBox {
            cy: (self.top + self.bottom) * 0.5,
            cx: (self.left + self.right) * 0.5,
            h: self.bottom - self.top,
            w: self.right - self.left,
        }
    }
}
