pub mod camera_frame;
pub mod frame_sink;
pub mod still_camera;
