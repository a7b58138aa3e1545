use std::sync::Arc;

use crate::shared::frame::Frame;

/// Outcome of running one mode over one image.
///
/// The image is shared rather than copied so an unannotated result points
/// at the very buffer that was analyzed.
#[derive(Clone, Debug)]
pub struct DetectionResult {
    annotated_image: Arc<Frame>,
    count: usize,
}

impl DetectionResult {
    pub fn new(annotated_image: Arc<Frame>, count: usize) -> Self {
        Self {
            annotated_image,
            count,
        }
    }

    /// The input image passed through, nothing detected.
    pub fn unchanged(image: Arc<Frame>) -> Self {
        Self::new(image, 0)
    }

    pub fn annotated_image(&self) -> &Arc<Frame> {
        &self.annotated_image
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn into_parts(self) -> (Arc<Frame>, usize) {
        (self.annotated_image, self.count)
    }
}
