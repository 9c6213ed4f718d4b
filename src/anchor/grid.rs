//! Anchor grid addressing and the range finder that restricts assignment
//! work to the grid cells a box can actually touch.

use std::ops::Range;

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

use crate::anchor::rect::CentreBox;
use crate::error::{AnchorError, Result, ensure_positive};

/// Dense grid of anchor boxes.
///
/// The anchor at `(row, col, size_index)` is centred on
/// `origin + (row, col) * cell_size` and has the extent
/// `box_sizes[size_index]`. The grid is never materialised; it is an
/// addressing scheme over `rows x cols x box_sizes.len()` anchors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GridConfig")]
pub struct AnchorGrid {
    origin: Vector2<f64>,
    cell_size: Vector2<f64>,
    shape: (usize, usize),
    box_sizes: Vec<[f64; 2]>,
}

#[derive(Deserialize)]
struct GridConfig {
    origin: [f64; 2],
    cell_size: [f64; 2],
    shape: (usize, usize),
    box_sizes: Vec<[f64; 2]>,
}

impl TryFrom<GridConfig> for AnchorGrid {
    type Error = AnchorError;

    fn try_from(config: GridConfig) -> Result<Self> {
        Self::new(
            config.origin,
            config.cell_size,
            config.shape,
            config.box_sizes,
        )
    }
}

impl AnchorGrid {
    /// Create a grid.
    ///
    /// * `origin` - centre `(y, x)` of the anchors at grid cell `(0, 0)`
    /// * `cell_size` - offset `(dy, dx)` between neighbouring anchor centres
    /// * `shape` - number of `(rows, cols)`
    /// * `box_sizes` - anchor `(height, width)` pairs applied at every cell
    pub fn new(
        origin: [f64; 2],
        cell_size: [f64; 2],
        shape: (usize, usize),
        box_sizes: Vec<[f64; 2]>,
    ) -> Result<Self> {
        if origin.iter().any(|v| !v.is_finite()) {
            return Err(AnchorError::invalid_argument(
                "anchor_grid_origin",
                "finite coordinates",
                format!("{origin:?}"),
            ));
        }
        ensure_positive("anchor_grid_cell_size", &[cell_size])?;
        ensure_positive("anchor_box_sizes", &box_sizes)?;

        Ok(Self {
            origin: Vector2::from(origin),
            cell_size: Vector2::from(cell_size),
            shape,
            box_sizes,
        })
    }

    /// Grid aligned with the output of a network that downsamples the input
    /// image by `stride`.
    ///
    /// One anchor centre sits in the middle of every `stride`-sized block of
    /// the image; partial blocks at the bottom and right edges get no anchors.
    pub fn for_feature_map(
        image_shape: [f64; 2],
        stride: [f64; 2],
        box_sizes: Vec<[f64; 2]>,
    ) -> Result<Self> {
        ensure_positive("image_shape", &[image_shape])?;
        ensure_positive("stride", &[stride])?;

        let rows = (image_shape[0] / stride[0]).floor() as usize;
        let cols = (image_shape[1] / stride[1]).floor() as usize;
        Self::new(
            [stride[0] * 0.5, stride[1] * 0.5],
            stride,
            (rows, cols),
            box_sizes,
        )
    }

    pub fn origin(&self) -> [f64; 2] {
        self.origin.into()
    }

    pub fn cell_size(&self) -> [f64; 2] {
        self.cell_size.into()
    }

    /// Number of `(rows, cols)`.
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn box_sizes(&self) -> &[[f64; 2]] {
        &self.box_sizes
    }

    pub fn n_sizes(&self) -> usize {
        self.box_sizes.len()
    }

    /// Shape of the per-anchor label tensors: `(rows, cols, n_sizes)`.
    pub fn label_shape(&self) -> (usize, usize, usize) {
        (self.shape.0, self.shape.1, self.box_sizes.len())
    }

    /// Anchor centre coordinate along `axis` (0 = y, 1 = x) at grid `index`.
    #[inline]
    pub(crate) fn centre_along(&self, axis: usize, index: i64) -> f64 {
        self.origin[axis] + index as f64 * self.cell_size[axis]
    }

    /// Centre `(y, x)` of the anchors at a grid cell.
    pub fn anchor_centre(&self, row: usize, col: usize) -> [f64; 2] {
        [
            self.centre_along(0, row as i64),
            self.centre_along(1, col as i64),
        ]
    }

    /// The anchor box at `(row, col, size_index)`, or `None` if `size_index`
    /// is not one of the grid's anchor sizes.
    pub fn anchor_box(&self, row: usize, col: usize, size_index: usize) -> Option<CentreBox> {
        let [h, w] = *self.box_sizes.get(size_index)?;
        let [cy, cx] = self.anchor_centre(row, col);
        Some(CentreBox { cy, cx, h, w })
    }

    /// For each anchor size, the grid cells whose anchor could intersect `query`.
    ///
    /// The range is a tight superset: no anchor outside it has positive
    /// overlap with `query`, but some inside may have none. Ranges are not
    /// clamped to the grid shape.
    pub fn overlapping_range(&self, query: &CentreBox) -> Vec<GridRange> {
        let offset = Vector2::new(query.cy, query.cx) - self.origin;
        let query_size = Vector2::new(query.h, query.w);

        self.box_sizes
            .iter()
            .map(|&size| {
                // maximum centre-to-centre distance at which the boxes still touch
                let bound = (Vector2::from(size) + query_size) * 0.5;
                self.grid_range(&offset, &bound)
            })
            .collect()
    }

    /// For each anchor size, the grid cells whose anchor lies entirely inside
    /// the image rectangle `[0, 0] -> image_shape`.
    ///
    /// Anchor sizes larger than the image yield an empty range. Ranges are
    /// not clamped to the grid shape.
    pub fn in_bounds_range(&self, image_shape: [f64; 2]) -> Vec<GridRange> {
        let image = Vector2::from(image_shape);
        let offset = image * 0.5 - self.origin;

        self.box_sizes
            .iter()
            .map(|&size| {
                let bound = (image - Vector2::from(size)) * 0.5;
                self.grid_range(&offset, &bound)
            })
            .collect()
    }

    fn grid_range(&self, offset: &Vector2<f64>, bound: &Vector2<f64>) -> GridRange {
        let start = (offset - bound)
            .component_div(&self.cell_size)
            .map(|v| grid_index(v.ceil()));
        let end = (offset + bound)
            .component_div(&self.cell_size)
            .map(|v| grid_index(v.floor()) + 1);
        GridRange {
            y: AxisRange::new(start[0], end[0]),
            x: AxisRange::new(start[1], end[1]),
        }
    }
}

/// Largest grid index magnitude a range bound is clamped to.
const MAX_GRID_INDEX: f64 = (1u64 << 52) as f64;

/// Convert an already rounded grid coordinate to an index.
///
/// Far-away boxes and tiny cell sizes produce quotients beyond `i64`, or
/// infinities; they are clamped so that `end + 1` and range lengths cannot
/// overflow.
#[inline]
fn grid_index(v: f64) -> i64 {
    v.clamp(-MAX_GRID_INDEX, MAX_GRID_INDEX) as i64
}

/// Half-open range `[start, end)` of grid indices along one axis.
///
/// Indices may be negative or exceed the grid; the range is empty whenever
/// `start >= end`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct AxisRange {
    /// First grid index in the range
    pub start: i64,
    /// One past the last grid index
    pub end: i64,
}

impl AxisRange {
    #[inline]
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    #[inline]
    pub fn len(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.end.abs_diff(self.start) as usize
        }
    }

    /// Raise `start` and lower `end` to the tighter of the two ranges.
    #[inline]
    pub fn intersect(&self, other: &AxisRange) -> AxisRange {
        AxisRange {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        }
    }

    /// Intersect with `[0, len)`.
    #[inline]
    pub fn clamp_to(&self, len: usize) -> AxisRange {
        self.intersect(&AxisRange::new(0, len as i64))
    }

    /// Grid indices covered by the range.
    #[inline]
    pub fn indices(&self) -> Range<i64> {
        self.start..self.end.max(self.start)
    }

    /// Array indices of a range already clamped to `[0, len)`.
    #[inline]
    pub(crate) fn to_index_range(self) -> Range<usize> {
        let start = self.start.max(0) as usize;
        start..start + self.len()
    }
}

/// Rectangular range of grid cells.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct GridRange {
    /// Range of grid rows
    pub y: AxisRange,
    /// Range of grid columns
    pub x: AxisRange,
}

impl GridRange {
    #[inline]
    pub fn new(y: AxisRange, x: AxisRange) -> Self {
        Self { y, x }
    }

    /// True when the range is empty along either axis.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.y.is_empty() || self.x.is_empty()
    }

    #[inline]
    pub fn intersect(&self, other: &GridRange) -> GridRange {
        GridRange {
            y: self.y.intersect(&other.y),
            x: self.x.intersect(&other.x),
        }
    }

    /// Intersect with the full grid of `(rows, cols)` cells.
    #[inline]
    pub fn clamp_to_shape(&self, shape: (usize, usize)) -> GridRange {
        GridRange {
            y: self.y.clamp_to(shape.0),
            x: self.x.clamp_to(shape.1),
        }
    }

    /// Number of `(rows, cols)` in the range.
    #[inline]
    pub fn dim(&self) -> (usize, usize) {
        (self.y.len(), self.x.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn range(y: (i64, i64), x: (i64, i64)) -> GridRange {
        GridRange::new(AxisRange::new(y.0, y.1), AxisRange::new(x.0, x.1))
    }

    fn small_grid() -> AnchorGrid {
        AnchorGrid::new([2.0, 7.0], [4.0, 8.0], (3, 3), vec![[2.0, 2.0], [1.0, 1.0]]).unwrap()
    }

    #[test]
    fn test_overlapping_range_between_centres() {
        // Query box sits between anchor centres, too small to reach any anchor
        let grid = small_grid();
        let ranges = grid.overlapping_range(&CentreBox::new(4.0, 12.0, 1.0, 1.0));
        assert_eq!(ranges, vec![range((1, 1), (1, 1)); 2]);
        assert!(ranges.iter().all(GridRange::is_empty));
    }

    #[test]
    fn test_overlapping_range_single_cell() {
        let grid = small_grid();
        let ranges = grid.overlapping_range(&CentreBox::new(6.0, 15.0, 2.0, 2.0));
        assert_eq!(ranges, vec![range((1, 2), (1, 2)); 2]);
    }

    #[test]
    fn test_overlapping_range_depends_on_anchor_size() {
        let grid = small_grid();
        let ranges = grid.overlapping_range(&CentreBox::new(6.0, 15.0, 6.0, 14.0));
        assert_eq!(ranges, vec![range((0, 3), (0, 3)), range((1, 2), (1, 2))]);
    }

    #[test]
    fn test_overlapping_range_full_grid() {
        let grid = small_grid();
        let ranges = grid.overlapping_range(&CentreBox::new(6.0, 15.0, 8.0, 16.0));
        assert_eq!(ranges, vec![range((0, 3), (0, 3)); 2]);
    }

    #[test]
    fn test_overlapping_range_far_away_is_empty() {
        let grid = small_grid();
        let ranges = grid.overlapping_range(&CentreBox::new(500.0, -500.0, 4.0, 4.0));
        for r in &ranges {
            assert!(r.x.start >= r.x.end || r.x.end <= 0);
            assert!(r.clamp_to_shape(grid.shape()).is_empty());
        }
    }

    #[test]
    fn test_in_bounds_range() {
        let grid = AnchorGrid::new(
            [2.0, 2.0],
            [2.0, 2.0],
            (20, 20),
            vec![[8.0, 16.0], [4.0, 4.0], [1.0, 1.0]],
        )
        .unwrap();
        let ranges = grid.in_bounds_range([42.0, 42.0]);
        assert_eq!(
            ranges,
            vec![
                range((1, 19), (3, 17)),
                range((0, 20), (0, 20)),
                range((0, 20), (0, 20)),
            ]
        );
    }

    #[test]
    fn test_in_bounds_range_anchor_larger_than_image() {
        let grid = AnchorGrid::new([4.0, 4.0], [8.0, 8.0], (2, 2), vec![[32.0, 8.0]]).unwrap();
        let ranges = grid.in_bounds_range([16.0, 16.0]);
        assert!(ranges[0].y.is_empty());
        assert!(!ranges[0].x.is_empty());
        assert!(ranges[0].is_empty());
    }

    #[test]
    fn test_axis_range_ops() {
        let a = AxisRange::new(-3, 5);
        assert_eq!(a.len(), 8);
        assert_eq!(a.clamp_to(4), AxisRange::new(0, 4));
        assert_eq!(a.clamp_to(4).to_index_range(), 0..4);
        assert_eq!(a.intersect(&AxisRange::new(2, 9)), AxisRange::new(2, 5));

        let empty = AxisRange::new(6, 2);
        assert!(empty.is_empty());
        assert_eq!(empty.len(), 0);
        assert_eq!(empty.indices().count(), 0);
    }

    #[test]
    fn test_anchor_box() {
        let grid = AnchorGrid::new([8.0, 8.0], [16.0, 16.0], (30, 40), vec![[16.0, 8.0]]).unwrap();
        assert_eq!(grid.anchor_centre(12, 18), [200.0, 296.0]);
        assert_eq!(
            grid.anchor_box(1, 1, 0),
            Some(CentreBox::new(24.0, 24.0, 16.0, 8.0))
        );
        assert_eq!(grid.anchor_box(1, 1, 1), None);
    }

    #[test]
    fn test_for_feature_map() {
        let grid = AnchorGrid::for_feature_map([480.0, 650.0], [16.0, 16.0], vec![[16.0, 16.0]])
            .unwrap();
        assert_eq!(grid.origin(), [8.0, 8.0]);
        assert_eq!(grid.cell_size(), [16.0, 16.0]);
        assert_eq!(grid.shape(), (30, 40));
    }

    #[test]
    fn test_rejects_non_positive_sizes() {
        assert_eq!(
            AnchorGrid::new([0.0, 0.0], [16.0, 0.0], (1, 1), vec![[1.0, 1.0]]),
            Err(AnchorError::NonPositiveSize {
                param: "anchor_grid_cell_size",
                index: 0,
                field: "width",
                value: 0.0
            })
        );
        assert_eq!(
            AnchorGrid::new([0.0, 0.0], [1.0, 1.0], (1, 1), vec![[1.0, 1.0], [4.0, -2.0]]),
            Err(AnchorError::NonPositiveSize {
                param: "anchor_box_sizes",
                index: 1,
                field: "width",
                value: -2.0
            })
        );
    }

    #[test]
    fn test_far_away_box_gives_bounded_ranges() {
        let grid = small_grid();
        for cy in [1e300, -1e300, f64::MAX] {
            let ranges = grid.overlapping_range(&CentreBox::new(cy, 15.0, 8.0, 8.0));
            for r in &ranges {
                assert!(r.y.start.abs() <= 1 << 52);
                assert!(r.y.end.abs() <= (1 << 52) + 1);
                assert!(r.clamp_to_shape(grid.shape()).is_empty());
            }
        }
    }

    #[test]
    fn test_tiny_cell_size_gives_bounded_ranges() {
        let grid = AnchorGrid::new([0.0, 0.0], [1e-17, 1e-17], (2, 2), vec![[1.0, 1.0]]).unwrap();
        let ranges = grid.in_bounds_range([480.0, 640.0]);
        assert_eq!(ranges.len(), 1);
        assert!(ranges[0].y.len() <= 1 << 52);
        assert!(ranges[0].clamp_to_shape(grid.shape()).is_empty());

        let wide = AxisRange::new(i64::MIN, i64::MAX);
        assert_eq!(wide.len(), u64::MAX as usize);
    }

    #[test]
    fn test_deserialize_validates() {
        let json = r#"{"origin":[8,8],"cell_size":[16,16],"shape":[30,40],"box_sizes":[[16,16],[8,8]]}"#;
        let grid: AnchorGrid = serde_json::from_str(json).unwrap();
        assert_eq!(grid.label_shape(), (30, 40, 2));

        let bad = r#"{"origin":[8,8],"cell_size":[16,16],"shape":[30,40],"box_sizes":[[0,16]]}"#;
        assert!(serde_json::from_str::<AnchorGrid>(bad).is_err());
    }
}
