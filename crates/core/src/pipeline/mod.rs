pub mod frame_analysis_controller;
pub mod image_processor;
pub mod pipeline_logger;
pub mod ui_context;
