use std::time::Duration;

/// Face boxes are moved down by this fraction of their height before drawing.
/// Empirical correction for the detector placing boxes slightly high.
pub const FACE_BOX_SHIFT_RATIO: f64 = 0.10;

/// How often a still capture re-checks whether live analysis has drained.
pub const CAPTURE_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// How often a pending detector callback re-checks for cancellation.
pub const CALLBACK_POLL_INTERVAL: Duration = Duration::from_millis(5);

pub const DEFAULT_CONFIDENCE: f64 = 0.5;

pub const DEFAULT_VIEW_WIDTH: u32 = 1080;
pub const DEFAULT_VIEW_HEIGHT: u32 = 1920;

pub const BOX_STROKE_WIDTH: u32 = 5;
pub const CONTOUR_DOT_RADIUS: u32 = 3;

pub const SETTINGS_DIR_NAME: &str = "FaceLens";

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];
