use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::detection::domain::face_detector::{
    DetectedFace, DetectorError, DetectorProfile, FaceDetectorService,
};
use crate::shared::callback::{await_callback, CallbackError};
use crate::shared::cancellation::CancellationToken;
use crate::shared::constants::CALLBACK_POLL_INTERVAL;
use crate::shared::frame::Frame;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectionError {
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error("detection cancelled")]
    Cancelled,
    #[error("detector dropped the request without responding")]
    Abandoned,
}

impl From<CallbackError<DetectorError>> for DetectionError {
    fn from(e: CallbackError<DetectorError>) -> Self {
        match e {
            CallbackError::Failed(inner) => DetectionError::Detector(inner),
            CallbackError::Cancelled => DetectionError::Cancelled,
            CallbackError::Abandoned => DetectionError::Abandoned,
        }
    }
}

/// Turns the callback-style [`FaceDetectorService`] into a blocking call
/// that resolves exactly once and honors cancellation of the caller's scope.
#[derive(Clone)]
pub struct AsyncDetectorAdapter {
    service: Arc<dyn FaceDetectorService>,
    poll_interval: Duration,
}

impl AsyncDetectorAdapter {
    pub fn new(service: Arc<dyn FaceDetectorService>) -> Self {
        Self {
            service,
            poll_interval: CALLBACK_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn detect(
        &self,
        image: &Arc<Frame>,
        profile: DetectorProfile,
        cancel: &CancellationToken,
    ) -> Result<Vec<DetectedFace>, DetectionError> {
        let image = image.clone();
        await_callback(cancel, self.poll_interval, |on_complete| {
            self.service.process(image, profile, on_complete)
        })
        .map_err(DetectionError::from)
    }
}
