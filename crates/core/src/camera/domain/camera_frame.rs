use crate::shared::frame::{Frame, Rotation};

/// Returns a frame's buffer to the camera that produced it.
pub type ReleaseHook = Box<dyn FnOnce() + Send>;

/// A frame as delivered by the camera: pixels in sensor orientation, the
/// rotation needed to make them upright, and the camera-side resource
/// backing them.
///
/// The release hook runs exactly once, when the frame is closed or dropped,
/// whichever comes first. Every path that takes ownership of a frame
/// therefore releases it, including early returns and panics.
pub struct CameraFrame {
    image: Frame,
    rotation: Rotation,
    release: Option<ReleaseHook>,
}

impl CameraFrame {
    pub fn new(image: Frame, rotation: Rotation) -> Self {
        Self {
            image,
            rotation,
            release: None,
        }
    }

    pub fn with_release(mut self, release: ReleaseHook) -> Self {
        self.release = Some(release);
        self
    }

    pub fn image(&self) -> &Frame {
        &self.image
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn index(&self) -> usize {
        self.image.index()
    }

    /// Dimensions as stored, before rotation.
    pub fn sensor_dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    /// Dimensions after rotation normalization.
    pub fn upright_dimensions(&self) -> (u32, u32) {
        self.rotation
            .apply_to_dimensions(self.image.width(), self.image.height())
    }

    /// Produces the upright image, leaving this frame open.
    pub fn normalize(&self) -> Frame {
        self.image.rotated(self.rotation)
    }

    /// Produces the upright image and releases the camera buffer.
    pub fn into_upright(self) -> Frame {
        let upright = self.normalize();
        self.close();
        upright
    }

    pub fn close(self) {
        drop(self);
    }
}

impl Drop for CameraFrame {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for CameraFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CameraFrame")
            .field("index", &self.image.index())
            .field("width", &self.image.width())
            .field("height", &self.image.height())
            .field("rotation", &self.rotation)
            .field("releasable", &self.release.is_some())
            .finish()
    }
}
