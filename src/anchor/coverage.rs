//! Vectorised IoU between one ground-truth box and a rectangular block of
//! same-sized anchors.

use ndarray::{Array1, Array2, Axis};

use crate::anchor::grid::{AnchorGrid, AxisRange, GridRange};

/// IoU between the ground-truth box `[gt_lower, gt_upper)` and every anchor
/// of size `box_size` whose grid cell lies in `range`.
///
/// Returns a `(range rows, range cols)` matrix. Each entry is identical to
/// [`iou`](crate::anchor::iou) evaluated on the corresponding anchor extent.
pub fn coverage(
    grid: &AnchorGrid,
    range: &GridRange,
    box_size: [f64; 2],
    gt_lower: [f64; 2],
    gt_upper: [f64; 2],
    gt_area: f64,
) -> Array2<f64> {
    let [h, w] = box_size;
    let inter_y = axis_overlap(grid, 0, &range.y, h, gt_lower[0], gt_upper[0]);
    let inter_x = axis_overlap(grid, 1, &range.x, w, gt_lower[1], gt_upper[1]);

    let inter_area = &inter_y.insert_axis(Axis(1)) * &inter_x.insert_axis(Axis(0));
    let anchor_area = h * w;
    inter_area.mapv_into(|area| area / (anchor_area + gt_area - area))
}

/// Length of the overlap between `[lower, upper)` and each anchor along one axis.
fn axis_overlap(
    grid: &AnchorGrid,
    axis: usize,
    range: &AxisRange,
    anchor_size: f64,
    lower: f64,
    upper: f64,
) -> Array1<f64> {
    range
        .indices()
        .map(|index| {
            let centre = grid.centre_along(axis, index);
            let anchor_lower = centre - anchor_size * 0.5;
            let anchor_upper = centre + anchor_size * 0.5;
            (anchor_upper.min(upper) - anchor_lower.max(lower)).max(0.0)
        })
        .collect()
}
