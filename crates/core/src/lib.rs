//! Live camera frame analysis.
//!
//! Frames from a camera are admitted one at a time into a face or contour
//! detector, and the results are mapped into the hosting view's pixel space
//! as overlays. A still capture pauses the live path, analyzes one picture
//! and publishes it with a face count.

pub mod camera;
pub mod detection;
pub mod overlay;
pub mod pipeline;
pub mod shared;
