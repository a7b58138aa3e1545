use std::sync::Arc;

use thiserror::Error;

use crate::shared::callback::Completion;
use crate::shared::frame::Frame;
use crate::shared::geometry::{BoundingBox, Point};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectorError {
    #[error("failed to load detector model: {0}")]
    ModelLoad(String),
    #[error("face detection failed: {0}")]
    Inference(String),
    #[error("detector service has shut down")]
    ShutDown,
}

/// How much work the detector should do per image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorProfile {
    /// Bounding boxes only, tuned for speed.
    Fast,
    /// Bounding boxes plus every contour the model reports.
    Contours,
}

impl DetectorProfile {
    pub fn includes_contours(self) -> bool {
        matches!(self, DetectorProfile::Contours)
    }
}

/// One ordered run of image-space points outlining a facial feature.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FaceContour {
    pub points: Vec<Point>,
}

/// A detected face in image pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedFace {
    pub bounding_box: BoundingBox,
    pub contours: Vec<FaceContour>,
}

impl DetectedFace {
    pub fn new(bounding_box: BoundingBox) -> Self {
        Self {
            bounding_box,
            contours: Vec::new(),
        }
    }

    pub fn with_contours(mut self, contours: Vec<FaceContour>) -> Self {
        self.contours = contours;
        self
    }

    pub fn all_contour_points(&self) -> impl Iterator<Item = Point> + '_ {
        self.contours.iter().flat_map(|c| c.points.iter().copied())
    }
}

pub type DetectionCallback = Completion<Vec<DetectedFace>, DetectorError>;

/// Callback-style face detection service.
///
/// `process` must return promptly; the outcome is delivered later, exactly
/// once, through `on_complete`, possibly from another thread. Dropping
/// `on_complete` without calling it is treated as an abandoned request.
pub trait FaceDetectorService: Send + Sync {
    fn process(&self, image: Arc<Frame>, profile: DetectorProfile, on_complete: DetectionCallback);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_contour_points_flattens_in_order() {
        let face = DetectedFace::new(BoundingBox::new(0.0, 0.0, 10.0, 10.0)).with_contours(vec![
            FaceContour {
                points: vec![Point::new(1.0, 1.0), Point::new(2.0, 2.0)],
            },
            FaceContour {
                points: vec![Point::new(3.0, 3.0)],
            },
        ]);
        let points: Vec<Point> = face.all_contour_points().collect();
        assert_eq!(
            points,
            vec![
                Point::new(1.0, 1.0),
                Point::new(2.0, 2.0),
                Point::new(3.0, 3.0)
            ]
        );
    }

    #[test]
    fn test_profile_contour_flag() {
        assert!(!DetectorProfile::Fast.includes_contours());
        assert!(DetectorProfile::Contours.includes_contours());
    }
}
