//! Burn tensors for anchor training targets.
//!
//! This module converts [`LabelTargets`] into tensors on a Burn device so
//! that they can be consumed directly by a region-proposal loss.
//!
//! # Example
//!
//! ```ignore
//! use anchor_targets::integration::BurnTargets;
//! use burn::backend::NdArray;
//!
//! let targets = assigner.assign(&grid, [480.0, 640.0], &boxes)?;
//! let device = Default::default();
//! let tensors = BurnTargets::<NdArray>::from_targets(&targets, &device);
//! ```

use burn::prelude::*;
use burn::tensor::TensorData;

use crate::anchor::LabelTargets;
use crate::error::{AnchorError, Result};

/// Training targets of one image as Burn tensors.
#[derive(Debug, Clone)]
pub struct BurnTargets<B: Backend> {
    /// `[rows, cols, n_sizes]`
    pub objectness: Tensor<B, 3, Int>,
    /// `[rows, cols, n_sizes, 4]`
    pub rel_box: Tensor<B, 4>,
    /// `[rows, cols, n_sizes, 2]`
    pub mask: Tensor<B, 4, Int>,
}

/// Training targets of several images stacked along a leading batch axis.
#[derive(Debug, Clone)]
pub struct BurnTargetBatch<B: Backend> {
    /// `[batch, rows, cols, n_sizes]`
    pub objectness: Tensor<B, 4, Int>,
    /// `[batch, rows, cols, n_sizes, 4]`
    pub rel_box: Tensor<B, 5>,
    /// `[batch, rows, cols, n_sizes, 2]`
    pub mask: Tensor<B, 5, Int>,
}

impl<B: Backend> BurnTargets<B> {
    /// Copy the targets onto `device`.
    pub fn from_targets(targets: &LabelTargets, device: &B::Device) -> Self {
        let objectness: Vec<i32> = targets.objectness.iter().map(|&v| i32::from(v)).collect();
        let rel_box: Vec<f32> = targets.rel_box.iter().map(|&v| v as f32).collect();
        let mask: Vec<i32> = targets.mask.iter().map(|&v| i32::from(v)).collect();

        Self {
            objectness: Tensor::from_data(
                TensorData::new(objectness, targets.objectness.shape().to_vec()),
                device,
            ),
            rel_box: Tensor::from_data(
                TensorData::new(rel_box, targets.rel_box.shape().to_vec()),
                device,
            ),
            mask: Tensor::from_data(
                TensorData::new(mask, targets.mask.shape().to_vec()),
                device,
            ),
        }
    }

    /// Stack the targets of several images, which must all share one grid.
    pub fn batch(targets: &[LabelTargets], device: &B::Device) -> Result<BurnTargetBatch<B>> {
        let Some(first) = targets.first() else {
            return Err(AnchorError::invalid_argument(
                "targets",
                "at least one image",
                "an empty batch",
            ));
        };
        if let Some(other) = targets.iter().find(|t| t.shape() != first.shape()) {
            return Err(AnchorError::invalid_argument(
                "targets",
                format!("label shape {:?}", first.shape()),
                format!("label shape {:?}", other.shape()),
            ));
        }

        let (objectness, (rel_box, mask)): (Vec<_>, (Vec<_>, Vec<_>)) = targets
            .iter()
            .map(|t| {
                let BurnTargets {
                    objectness,
                    rel_box,
                    mask,
                } = Self::from_targets(t, device);
                (objectness, (rel_box, mask))
            })
            .unzip();

        Ok(BurnTargetBatch {
            objectness: Tensor::stack(objectness, 0),
            rel_box: Tensor::stack(rel_box, 0),
            mask: Tensor::stack(mask, 0),
        })
    }
}
