mod assigner;
mod coverage;
mod grid;
mod rect;

pub use assigner::{
    AssignerConfig, CoverageAccumulator, LabelAssigner, LabelTargets,
    ground_truth_boxes_to_targets,
};
pub use coverage::coverage;
pub use grid::{AnchorGrid, AxisRange, GridRange};
pub use rect::{CentreBox, Extent, apply_relative_box, iou, iou_batch, relative_box};
