use crate::camera::domain::camera_frame::CameraFrame;

/// Receives the live feed.
///
/// A camera calls `on_frame` from a single delivery thread, one frame at a
/// time. The sink owns each frame it receives and must not block the
/// delivery thread on analysis work.
pub trait FrameSink: Send + Sync {
    fn on_frame(&self, frame: CameraFrame);
}
