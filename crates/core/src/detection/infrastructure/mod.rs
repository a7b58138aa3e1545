pub mod detector_adapter;
pub mod onnx_face_detector;
