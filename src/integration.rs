//! Integration module for feeding annotated images through label assignment.
//!
//! This module provides traits and utilities for pulling ground-truth
//! annotations from a dataset and turning them into training targets, plus an
//! optional conversion of those targets into Burn tensors.

mod builder;
mod pipeline;
mod source;

pub use builder::GroundTruthBuilder;
pub use pipeline::{PipelineError, TargetPipeline};
pub use source::{Annotation, AnnotationSource, IntoGroundTruth};

#[cfg(feature = "burn-backend")]
mod burn_backend;

#[cfg(feature = "burn-backend")]
pub use burn_backend::{BurnTargetBatch, BurnTargets};
