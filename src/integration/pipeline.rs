//! TargetPipeline for combining an annotation source with label assignment.

use thiserror::Error;

use crate::anchor::{AnchorGrid, AssignerConfig, LabelAssigner, LabelTargets};
use crate::error::AnchorError;

use super::AnnotationSource;

/// Failure while producing the targets of one image.
#[derive(Debug, Error)]
pub enum PipelineError<E: std::error::Error + 'static> {
    #[error("failed to load annotation {index}")]
    Source {
        index: usize,
        #[source]
        source: E,
    },
    #[error("failed to assign targets for annotation {index}")]
    Assign {
        index: usize,
        #[source]
        source: AnchorError,
    },
}

/// A combined pipeline that bundles an annotation source with a fixed anchor
/// grid and [`LabelAssigner`].
///
/// This struct provides a convenient way to produce detector training
/// targets for every image of a dataset.
pub struct TargetPipeline<S: AnnotationSource> {
    source: S,
    grid: AnchorGrid,
    assigner: LabelAssigner,
}

impl<S: AnnotationSource> TargetPipeline<S> {
    /// Create a new pipeline with the given source, anchor grid and thresholds.
    pub fn new(source: S, grid: AnchorGrid, config: AssignerConfig) -> Result<Self, AnchorError> {
        Ok(Self {
            source,
            grid,
            assigner: LabelAssigner::new(config)?,
        })
    }

    /// Create a new pipeline with the default coverage thresholds.
    pub fn with_default_config(source: S, grid: AnchorGrid) -> Self {
        Self {
            source,
            grid,
            assigner: LabelAssigner::default(),
        }
    }

    /// Load annotation `index` and compute its training targets.
    pub fn process(&mut self, index: usize) -> Result<LabelTargets, PipelineError<S::Error>> {
        let annotation = self
            .source
            .annotation(index)
            .map_err(|source| PipelineError::Source { index, source })?;

        self.assigner
            .assign(&self.grid, annotation.image_shape, &annotation.boxes)
            .map_err(|source| PipelineError::Assign { index, source })
    }

    /// Compute the training targets of every image, in index order.
    pub fn process_all(
        &mut self,
    ) -> impl Iterator<Item = Result<LabelTargets, PipelineError<S::Error>>> + '_ {
        (0..self.source.len()).map(move |index| self.process(index))
    }

    /// Get a reference to the underlying annotation source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Get a mutable reference to the underlying annotation source.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Get a reference to the anchor grid.
    pub fn grid(&self) -> &AnchorGrid {
        &self.grid
    }

    /// Get a reference to the label assigner.
    pub fn assigner(&self) -> &LabelAssigner {
        &self.assigner
    }
}
