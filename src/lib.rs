//! Anchor-box label assignment for region-proposal detectors.
//!
//! Given a dense grid of anchor boxes and the ground-truth boxes of an image,
//! [`LabelAssigner`] computes per-anchor objectness flags, box regression
//! targets and loss masks.

pub mod anchor;
pub mod error;
pub mod integration;

pub use anchor::{
    AnchorGrid, AssignerConfig, AxisRange, CentreBox, CoverageAccumulator, Extent, GridRange,
    LabelAssigner, LabelTargets, ground_truth_boxes_to_targets,
};
pub use error::{AnchorError, Result};
pub use integration::{
    Annotation, AnnotationSource, GroundTruthBuilder, IntoGroundTruth, TargetPipeline,
};
