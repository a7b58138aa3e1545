use thiserror::Error;

use crate::camera::domain::camera_frame::CameraFrame;
use crate::shared::callback::Completion;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("still capture failed: {0}")]
    Failed(String),
    #[error("no frame available to capture")]
    NoFrame,
    #[error("camera has stopped")]
    Stopped,
}

pub type CaptureCallback = Completion<CameraFrame, CaptureError>;

/// One-shot still capture.
///
/// `take_picture` returns immediately and reports the captured frame or the
/// failure exactly once through `on_complete`, usually from a camera-owned
/// thread.
pub trait StillCamera: Send + Sync {
    fn take_picture(&self, on_complete: CaptureCallback);
}
