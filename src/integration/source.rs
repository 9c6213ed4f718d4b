//! Trait for datasets that provide ground-truth annotations.

use crate::anchor::{CentreBox, Extent};

/// Ground truth for a single image.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Annotation {
    /// Image `(height, width)` in pixels, after any resizing applied before
    /// the image is fed to the network.
    pub image_shape: [f64; 2],
    pub boxes: Vec<CentreBox>,
}

impl Annotation {
    pub fn new(image_shape: [f64; 2], boxes: impl IntoGroundTruth) -> Self {
        Self {
            image_shape,
            boxes: boxes.into_ground_truth(),
        }
    }
}

/// Trait for annotation providers.
///
/// Implement this trait to connect any dataset to a [`TargetPipeline`].
///
/// # Example
///
/// ```ignore
/// use anchor_targets::{Annotation, AnnotationSource};
///
/// struct MyDataset {
///     // Your labels here
/// }
///
/// impl AnnotationSource for MyDataset {
///     type Error = std::io::Error;
///
///     fn len(&self) -> usize {
///         0
///     }
///
///     fn annotation(&mut self, index: usize) -> Result<Annotation, Self::Error> {
///         // Read and return the ground truth for image `index`
///         Ok(Annotation::default())
///     }
/// }
/// ```
///
/// [`TargetPipeline`]: crate::integration::TargetPipeline
pub trait AnnotationSource {
    /// Error type for annotation loading failures.
    type Error: std::error::Error + 'static;

    /// Number of annotated images.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Load the ground truth of image `index`.
    fn annotation(&mut self, index: usize) -> Result<Annotation, Self::Error>;
}

/// Helper trait for converting dataset-specific box lists to ground truth.
pub trait IntoGroundTruth {
    fn into_ground_truth(self) -> Vec<CentreBox>;
}

impl IntoGroundTruth for Vec<CentreBox> {
    fn into_ground_truth(self) -> Vec<CentreBox> {
        self
    }
}

impl IntoGroundTruth for Vec<Extent> {
    fn into_ground_truth(self) -> Vec<CentreBox> {
        self.iter().map(Extent::to_centre_box).collect()
    }
}

/// Rows of `(centre_y, centre_x, height, width)`.
impl IntoGroundTruth for Vec<[f64; 4]> {
    fn into_ground_truth(self) -> Vec<CentreBox> {
        self.into_iter().map(CentreBox::from_cycxhw).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_ground_truth() {
        let from_rows = Annotation::new([480.0, 640.0], vec![[20.0, 30.0, 16.0, 8.0]]);
        let from_extents = Annotation::new(
            [480.0, 640.0],
            vec![Extent::new((12.0, 28.0), (26.0, 34.0))],
        );
        assert_eq!(from_rows, from_extents);
        assert_eq!(from_rows.boxes, vec![CentreBox::new(20.0, 30.0, 16.0, 8.0)]);
    }
}
