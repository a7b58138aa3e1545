use std::sync::Arc;

use crate::detection::domain::detection_result::DetectionResult;
use crate::detection::domain::face_detector::DetectorProfile;
use crate::detection::domain::mode::VisionMode;
use crate::detection::infrastructure::detector_adapter::{AsyncDetectorAdapter, DetectionError};
use crate::pipeline::ui_context::UiHandle;
use crate::shared::cancellation::CancellationToken;
use crate::shared::frame::Frame;
use crate::shared::geometry::Point;

/// Runs the selected mode over one upright image.
///
/// Detection modes publish their overlay through the UI context and leave
/// the image itself untouched. Modes without a detector pass the image
/// through with a zero count and no overlay effect.
pub struct ImageProcessor {
    adapter: AsyncDetectorAdapter,
    ui: UiHandle,
}

impl ImageProcessor {
    pub fn new(adapter: AsyncDetectorAdapter, ui: UiHandle) -> Self {
        Self { adapter, ui }
    }

    pub fn process(
        &self,
        image: Arc<Frame>,
        mode: VisionMode,
        cancel: &CancellationToken,
    ) -> Result<DetectionResult, DetectionError> {
        match mode {
            VisionMode::None | VisionMode::MeshDetection | VisionMode::SelfieSegmentation => {
                Ok(DetectionResult::unchanged(image))
            }
            VisionMode::FaceDetection => self.detect_faces(image, cancel),
            VisionMode::ContourDetection => self.detect_contours(image, cancel),
        }
    }

    fn detect_faces(
        &self,
        image: Arc<Frame>,
        cancel: &CancellationToken,
    ) -> Result<DetectionResult, DetectionError> {
        let faces = self.adapter.detect(&image, DetectorProfile::Fast, cancel)?;
        if cancel.is_cancelled() {
            return Err(DetectionError::Cancelled);
        }

        let (width, height) = image_size(&image);
        // Only the most recent face is drawn.
        let shown = faces.last().map(|f| f.bounding_box.bias_corrected());
        let cancel = cancel.clone();
        self.ui.post(move |state| {
            if cancel.is_cancelled() {
                return;
            }
            match shown {
                Some(b) => {
                    state.overlay_mut().publish_box(&b, width, height);
                }
                None => state.overlay_mut().clear_box(),
            }
        });

        Ok(DetectionResult::new(image, faces.len()))
    }

    fn detect_contours(
        &self,
        image: Arc<Frame>,
        cancel: &CancellationToken,
    ) -> Result<DetectionResult, DetectionError> {
        let faces = self.adapter.detect(&image, DetectorProfile::Contours, cancel)?;
        if cancel.is_cancelled() {
            return Err(DetectionError::Cancelled);
        }

        let (width, height) = image_size(&image);
        let points: Vec<Point> = faces.iter().flat_map(|f| f.all_contour_points()).collect();
        let cancel = cancel.clone();
        self.ui.post(move |state| {
            if !cancel.is_cancelled() {
                state.overlay_mut().publish_points(&points, width, height);
            }
        });

        Ok(DetectionResult::new(image, faces.len()))
    }
}

fn image_size(image: &Frame) -> (f64, f64) {
    (f64::from(image.width()), f64::from(image.height()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::face_detector::{
        DetectedFace, DetectionCallback, DetectorError, FaceContour, FaceDetectorService,
    };
    use crate::detection::domain::mode::ModeCell;
    use crate::pipeline::ui_context::UiLoop;
    use crate::shared::geometry::BoundingBox;
    use approx::assert_relative_eq;
    use rstest::rstest;
    use std::sync::Mutex;

    struct ScriptedService {
        outcome: Result<Vec<DetectedFace>, DetectorError>,
        profiles: Mutex<Vec<DetectorProfile>>,
    }

    impl ScriptedService {
        fn new(outcome: Result<Vec<DetectedFace>, DetectorError>) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                profiles: Mutex::new(Vec::new()),
            })
        }
    }

    impl FaceDetectorService for ScriptedService {
        fn process(&self, _image: Arc<Frame>, profile: DetectorProfile, done: DetectionCallback) {
            self.profiles.lock().unwrap().push(profile);
            done(self.outcome.clone());
        }
    }

    fn image() -> Arc<Frame> {
        Arc::new(Frame::new(vec![7u8; 480 * 640 * 3], 480, 640, 3, 0))
    }

    fn setup(service: Arc<ScriptedService>) -> (ImageProcessor, UiLoop) {
        let (ui_loop, ui) = UiLoop::new(ModeCell::default(), 1080.0, 1920.0);
        let processor = ImageProcessor::new(AsyncDetectorAdapter::new(service), ui);
        (processor, ui_loop)
    }

    fn contoured(points: &[(f64, f64)]) -> DetectedFace {
        DetectedFace::new(BoundingBox::new(0.0, 0.0, 10.0, 10.0)).with_contours(vec![FaceContour {
            points: points.iter().map(|&(x, y)| Point::new(x, y)).collect(),
        }])
    }

    #[rstest]
    #[case(VisionMode::None)]
    #[case(VisionMode::MeshDetection)]
    #[case(VisionMode::SelfieSegmentation)]
    fn test_modes_without_detector_return_input_unchanged(#[case] mode: VisionMode) {
        let service = ScriptedService::new(Ok(vec![contoured(&[(1.0, 1.0)])]));
        let (processor, mut ui_loop) = setup(service.clone());
        let input = image();

        let result = processor
            .process(input.clone(), mode, &CancellationToken::new())
            .unwrap();

        assert!(Arc::ptr_eq(result.annotated_image(), &input));
        assert_eq!(result.count(), 0);
        assert!(service.profiles.lock().unwrap().is_empty());
        assert_eq!(ui_loop.run_pending(), 0);
    }

    #[test]
    fn test_face_mode_publishes_last_face_shifted_down() {
        let service = ScriptedService::new(Ok(vec![
            DetectedFace::new(BoundingBox::new(0.0, 0.0, 50.0, 50.0)),
            DetectedFace::new(BoundingBox::new(100.0, 100.0, 200.0, 300.0)),
        ]));
        let (processor, mut ui_loop) = setup(service.clone());
        let input = image();

        let result = processor
            .process(input.clone(), VisionMode::FaceDetection, &CancellationToken::new())
            .unwrap();
        ui_loop.run_pending();

        assert_eq!(result.count(), 2);
        assert!(Arc::ptr_eq(result.annotated_image(), &input));
        assert_eq!(*service.profiles.lock().unwrap(), vec![DetectorProfile::Fast]);

        // Shifted by 20px in image space, then scaled by 3.0 with a -180px x offset.
        let b = ui_loop.state().overlay().bounding_box().unwrap();
        assert_relative_eq!(b.left, 120.0);
        assert_relative_eq!(b.top, 360.0);
        assert_relative_eq!(b.right, 420.0);
        assert_relative_eq!(b.bottom, 960.0);
        assert!(ui_loop.state().overlay().contour_points().is_none());
    }

    #[test]
    fn test_face_mode_without_faces_clears_box() {
        let (processor, mut ui_loop) = setup(ScriptedService::new(Ok(Vec::new())));
        ui_loop
            .state_mut()
            .overlay_mut()
            .publish_box(&BoundingBox::new(1.0, 1.0, 2.0, 2.0), 480.0, 640.0);

        let result = processor
            .process(image(), VisionMode::FaceDetection, &CancellationToken::new())
            .unwrap();
        ui_loop.run_pending();

        assert_eq!(result.count(), 0);
        assert!(ui_loop.state().overlay().bounding_box().is_none());
    }

    #[test]
    fn test_contour_mode_publishes_every_point_of_every_face() {
        let service = ScriptedService::new(Ok(vec![
            contoured(&[(100.0, 100.0), (0.0, 0.0)]),
            contoured(&[(480.0, 640.0)]),
        ]));
        let (processor, mut ui_loop) = setup(service.clone());

        let result = processor
            .process(image(), VisionMode::ContourDetection, &CancellationToken::new())
            .unwrap();
        ui_loop.run_pending();

        assert_eq!(result.count(), 2);
        assert_eq!(*service.profiles.lock().unwrap(), vec![DetectorProfile::Contours]);
        let points = ui_loop.state().overlay().contour_points().unwrap();
        assert_eq!(
            points,
            &[
                Point::new(120.0, 300.0),
                Point::new(-180.0, 0.0),
                Point::new(1260.0, 1920.0)
            ]
        );
        assert!(ui_loop.state().overlay().bounding_box().is_none());
    }

    #[test]
    fn test_detector_failure_leaves_overlay_untouched() {
        let err = DetectorError::Inference("bad tensor".into());
        let (processor, mut ui_loop) = setup(ScriptedService::new(Err(err.clone())));
        ui_loop
            .state_mut()
            .overlay_mut()
            .publish_box(&BoundingBox::new(1.0, 1.0, 2.0, 2.0), 480.0, 640.0);
        let before = *ui_loop.state().overlay().bounding_box().unwrap();

        let result = processor.process(image(), VisionMode::FaceDetection, &CancellationToken::new());

        assert_eq!(result.unwrap_err(), DetectionError::Detector(err));
        assert_eq!(ui_loop.run_pending(), 0);
        assert_eq!(ui_loop.state().overlay().bounding_box(), Some(&before));
    }

    #[test]
    fn test_cancelled_scope_never_writes_overlay() {
        let (processor, mut ui_loop) = setup(ScriptedService::new(Ok(vec![contoured(&[(1.0, 1.0)])])));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = processor.process(image(), VisionMode::ContourDetection, &cancel);

        assert_eq!(result.unwrap_err(), DetectionError::Cancelled);
        ui_loop.run_pending();
        assert!(ui_loop.state().overlay().contour_points().is_none());
    }

    #[test]
    fn test_cancel_after_post_skips_queued_write() {
        let (processor, mut ui_loop) = setup(ScriptedService::new(Ok(vec![contoured(&[(1.0, 1.0)])])));
        let cancel = CancellationToken::new();

        processor
            .process(image(), VisionMode::FaceDetection, &cancel)
            .unwrap();
        cancel.cancel();
        ui_loop.run_pending();

        assert!(ui_loop.state().overlay().bounding_box().is_none());
    }
}
