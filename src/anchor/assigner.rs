//! Per-anchor training targets from ground-truth boxes.

use std::ops::Range;

use ndarray::{
    Array1, Array3, Array4, ArrayView2, ArrayView3, ArrayViewD, Axis, Ix2, Zip, aview1, s,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::anchor::coverage::coverage;
use crate::anchor::grid::{AnchorGrid, GridRange};
use crate::anchor::rect::{CentreBox, centre_offset};
use crate::error::{AnchorError, Result, ensure_positive};

/// Coverage thresholds that turn the best IoU of each anchor into labels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignerConfig {
    /// Anchors whose coverage is below this are trained as background.
    pub lower_threshold: f64,
    /// Anchors whose coverage is above this are trained as objects.
    pub upper_threshold: f64,
}

impl Default for AssignerConfig {
    fn default() -> Self {
        Self {
            lower_threshold: 0.3,
            upper_threshold: 0.7,
        }
    }
}

impl AssignerConfig {
    pub fn new(lower_threshold: f64, upper_threshold: f64) -> Result<Self> {
        let config = Self {
            lower_threshold,
            upper_threshold,
        };
        config.validate()?;
        Ok(config)
    }

    /// Both thresholds must lie in `[0, 1]` with `lower <= upper`.
    /// Equal thresholds are allowed and leave no grey zone.
    pub fn validate(&self) -> Result<()> {
        let (lower, upper) = (self.lower_threshold, self.upper_threshold);
        if (0.0..=1.0).contains(&lower) && (0.0..=1.0).contains(&upper) && lower <= upper {
            Ok(())
        } else {
            Err(AnchorError::InvalidThresholds { lower, upper })
        }
    }
}

/// Training targets for every anchor, indexed by `(row, col, size_index)`.
///
/// Serialisable so that targets can be precomputed and cached with a dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelTargets {
    /// 1 where the anchor is treated as containing an object.
    pub objectness: Array3<u8>,
    /// Target box relative to the anchor:
    /// `(rel_centre_y, rel_centre_x, log_height_ratio, log_width_ratio)`.
    /// Only meaningful where a ground-truth box has been assigned.
    pub rel_box: Array4<f64>,
    /// Channel 0: use the objectness prediction in the loss.
    /// Channel 1: use the box regression in the loss.
    pub mask: Array4<u8>,
}

impl LabelTargets {
    /// `(rows, cols, n_sizes)`
    pub fn shape(&self) -> (usize, usize, usize) {
        self.objectness.dim()
    }

    /// Anchors trained on box regression, in row-major order.
    pub fn positive_anchors(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        self.mask
            .indexed_iter()
            .filter(|&((.., channel), &flag)| channel == 1 && flag == 1)
            .map(|((row, col, size_index, _), _)| (row, col, size_index))
    }

    /// Number of anchors trained on box regression.
    pub fn num_positive(&self) -> usize {
        count_set(self.mask.index_axis(Axis(3), 1))
    }

    /// Number of anchors contributing to the objectness loss.
    pub fn num_trained(&self) -> usize {
        count_set(self.mask.index_axis(Axis(3), 0))
    }
}

fn count_set(flags: ArrayView3<'_, u8>) -> usize {
    flags.iter().filter(|&&flag| flag == 1).count()
}

/// Running maximum of coverage per anchor, carrying the regression target of
/// the ground-truth box that achieved it.
///
/// A proposal only replaces the stored target when its coverage is strictly
/// greater, so on ties the earliest proposal wins.
#[derive(Debug, Clone)]
pub struct CoverageAccumulator {
    coverage: Array3<f64>,
    rel_box: Array4<f64>,
}

impl CoverageAccumulator {
    /// Zero coverage everywhere for a `(rows, cols, n_sizes)` grid.
    pub fn new(shape: (usize, usize, usize)) -> Self {
        let (rows, cols, n_sizes) = shape;
        Self {
            coverage: Array3::zeros(shape),
            rel_box: Array4::zeros((rows, cols, n_sizes, 4)),
        }
    }

    pub fn coverage(&self) -> ArrayView3<'_, f64> {
        self.coverage.view()
    }

    /// Offer `candidate_coverage` for the block `rows x cols` of anchors of
    /// one size. `candidate_box(i, j)` gives the regression target for the
    /// block-relative cell `(i, j)` and is only evaluated where it wins.
    ///
    /// Returns the number of anchors whose best match changed.
    pub fn propose<F>(
        &mut self,
        size_index: usize,
        rows: Range<usize>,
        cols: Range<usize>,
        candidate_coverage: ArrayView2<'_, f64>,
        candidate_box: F,
    ) -> usize
    where
        F: Fn(usize, usize) -> [f64; 4],
    {
        let mut best = self
            .coverage
            .slice_mut(s![rows.clone(), cols.clone(), size_index]);
        let mut boxes = self.rel_box.slice_mut(s![rows, cols, size_index, ..]);

        let mut improved = 0;
        Zip::indexed(&mut best)
            .and(&candidate_coverage)
            .and(boxes.lanes_mut(Axis(2)))
            .for_each(|(i, j), best, &candidate, mut rel_box| {
                if candidate > *best {
                    *best = candidate;
                    rel_box.assign(&aview1(&candidate_box(i, j)));
                    improved += 1;
                }
            });
        improved
    }

    /// Threshold the accumulated coverage into final targets.
    ///
    /// Only anchors inside `in_bounds` (one clamped range per anchor size)
    /// get loss mask bits; anchors crossing the image border stay masked out.
    pub fn into_targets(self, in_bounds: &[GridRange], config: &AssignerConfig) -> LabelTargets {
        let AssignerConfig {
            lower_threshold,
            upper_threshold,
        } = *config;
        let (rows, cols, n_sizes) = self.coverage.dim();

        let objectness = self.coverage.mapv(|c| u8::from(c > upper_threshold));

        let mut mask = Array4::zeros((rows, cols, n_sizes, 2));
        for (size_index, range) in in_bounds.iter().enumerate().take(n_sizes) {
            if range.is_empty() {
                continue;
            }
            let (ys, xs) = (range.y.to_index_range(), range.x.to_index_range());
            let coverage = self.coverage.slice(s![ys.clone(), xs.clone(), size_index]);
            let mut flags = mask.slice_mut(s![ys, xs, size_index, ..]);

            Zip::from(&coverage)
                .and(flags.lanes_mut(Axis(2)))
                .for_each(|&c, mut flags| {
                    let positive = c > upper_threshold;
                    flags[0] = u8::from(positive || c < lower_threshold);
                    flags[1] = u8::from(positive);
                });
        }

        LabelTargets {
            objectness,
            rel_box: self.rel_box,
            mask,
        }
    }
}

/// Assigns ground-truth boxes to the anchors of a grid.
#[derive(Debug, Clone, Default)]
pub struct LabelAssigner {
    config: AssignerConfig,
}

impl LabelAssigner {
    pub fn new(config: AssignerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &AssignerConfig {
        &self.config
    }

    /// Compute objectness, regression targets and loss masks for the anchors
    /// of `grid` over an image of `image_shape` `(height, width)`.
    ///
    /// Ground-truth boxes are processed in order; an anchor keeps the box
    /// with the highest IoU, the earlier box on ties. Anchors that are not
    /// fully inside the image are never assigned and never trained.
    pub fn assign(
        &self,
        grid: &AnchorGrid,
        image_shape: [f64; 2],
        ground_truth: &[CentreBox],
    ) -> Result<LabelTargets> {
        ensure_positive("image_shape", &[image_shape])?;
        for gt in ground_truth {
            if !(gt.cy.is_finite() && gt.cx.is_finite()) {
                return Err(AnchorError::invalid_argument(
                    "ground_truth_boxes",
                    "finite box centres",
                    format!("{:?}", gt.to_cycxhw()),
                ));
            }
        }
        let sizes: Vec<[f64; 2]> = ground_truth.iter().map(CentreBox::size).collect();
        ensure_positive("ground_truth_boxes", &sizes)?;

        let in_bounds: Vec<GridRange> = grid
            .in_bounds_range(image_shape)
            .iter()
            .map(|range| range.clamp_to_shape(grid.shape()))
            .collect();

        let mut accumulator = CoverageAccumulator::new(grid.label_shape());
        for (gt_index, gt) in ground_truth.iter().enumerate() {
            let (lower, upper, area) = (gt.lower(), gt.upper(), gt.area());
            let mut best = 0.0f64;

            let overlapping = grid.overlapping_range(gt);
            for (size_index, (overlap, valid)) in overlapping.iter().zip(&in_bounds).enumerate() {
                let range = overlap.intersect(valid);
                if range.is_empty() {
                    trace!(gt_index, size_index, "no in-bounds anchors overlap box");
                    continue;
                }

                let box_size = grid.box_sizes()[size_index];
                let cvg = coverage(grid, &range, box_size, lower, upper, area);
                best = cvg.fold(best, |acc, &c| acc.max(c));

                let [h, w] = box_size;
                let rel_y: Array1<f64> = range
                    .y
                    .indices()
                    .map(|row| centre_offset(gt.cy, grid.centre_along(0, row), h))
                    .collect();
                let rel_x: Array1<f64> = range
                    .x
                    .indices()
                    .map(|col| centre_offset(gt.cx, grid.centre_along(1, col), w))
                    .collect();
                let log_h = (gt.h / h).ln();
                let log_w = (gt.w / w).ln();

                accumulator.propose(
                    size_index,
                    range.y.to_index_range(),
                    range.x.to_index_range(),
                    cvg.view(),
                    |i, j| [rel_y[i], rel_x[j], log_h, log_w],
                );
            }

            if best <= self.config.upper_threshold {
                warn!(
                    gt_index,
                    best_coverage = best,
                    "ground-truth box has no anchor above the upper coverage threshold"
                );
            }
        }

        let targets = accumulator.into_targets(&in_bounds, &self.config);
        debug!(
            rows = grid.shape().0,
            cols = grid.shape().1,
            n_sizes = grid.n_sizes(),
            n_boxes = ground_truth.len(),
            positive = targets.num_positive(),
            trained = targets.num_trained(),
            "assigned anchor targets"
        );
        Ok(targets)
    }
}

fn shape_str(shape: &[usize]) -> String {
    match shape {
        [n] => format!("({n},)"),
        _ => format!(
            "({})",
            shape
                .iter()
                .map(usize::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ),
    }
}

fn pair(param: &'static str, array: &ArrayViewD<'_, f64>) -> Result<[f64; 2]> {
    if array.shape() != [2] {
        return Err(AnchorError::invalid_argument(
            param,
            "shape (2,)",
            format!("shape {}", shape_str(array.shape())),
        ));
    }
    let values: Vec<f64> = array.iter().copied().collect();
    Ok([values[0], values[1]])
}

fn rows_of<const N: usize>(
    param: &'static str,
    array: &ArrayViewD<'_, f64>,
) -> Result<Vec<[f64; N]>> {
    if array.ndim() != 2 {
        return Err(AnchorError::invalid_argument(
            param,
            "2 dimensions",
            format!("{} dimensions", array.ndim()),
        ));
    }
    if array.shape()[1] != N {
        return Err(AnchorError::invalid_argument(
            param,
            format!("shape (N, {N})"),
            format!("shape {}", shape_str(array.shape())),
        ));
    }
    let matrix = array
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|err| AnchorError::invalid_argument(param, "2 dimensions", err.to_string()))?;
    Ok(matrix
        .outer_iter()
        .map(|row| std::array::from_fn(|k| row[k]))
        .collect())
}

/// Compute label targets from raw arrays, validating every shape first.
///
/// * `anchor_grid_origin`, `anchor_grid_cell_size`, `image_shape` - shape `(2,)`
/// * `anchor_grid_shape` - exactly two entries `(rows, cols)`
/// * `anchor_box_sizes` - shape `(N, 2)` of `(height, width)`
/// * `ground_truth_boxes` - shape `(M, 4)` of `(centre_y, centre_x, height, width)`
#[allow(clippy::too_many_arguments)]
pub fn ground_truth_boxes_to_targets(
    anchor_grid_origin: ArrayViewD<'_, f64>,
    anchor_grid_cell_size: ArrayViewD<'_, f64>,
    anchor_grid_shape: &[usize],
    anchor_box_sizes: ArrayViewD<'_, f64>,
    image_shape: ArrayViewD<'_, f64>,
    ground_truth_boxes: ArrayViewD<'_, f64>,
    coverage_lower_threshold: f64,
    coverage_upper_threshold: f64,
) -> Result<LabelTargets> {
    let origin = pair("anchor_grid_origin", &anchor_grid_origin)?;
    let cell_size = pair("anchor_grid_cell_size", &anchor_grid_cell_size)?;
    let shape = match *anchor_grid_shape {
        [rows, cols] => (rows, cols),
        _ => {
            return Err(AnchorError::invalid_argument(
                "anchor_grid_shape",
                "length 2",
                format!("length {}", anchor_grid_shape.len()),
            ));
        }
    };
    let box_sizes = rows_of::<2>("anchor_box_sizes", &anchor_box_sizes)?;
    let image_shape = pair("image_shape", &image_shape)?;
    let ground_truth: Vec<CentreBox> = rows_of::<4>("ground_truth_boxes", &ground_truth_boxes)?
        .into_iter()
        .map(CentreBox::from_cycxhw)
        .collect();

    let grid = AnchorGrid::new(origin, cell_size, shape, box_sizes)?;
    let config = AssignerConfig::new(coverage_lower_threshold, coverage_upper_threshold)?;
    LabelAssigner::new(config)?.assign(&grid, image_shape, &ground_truth)
}
