pub mod callback;
pub mod cancellation;
pub mod constants;
pub mod frame;
pub mod geometry;
pub mod settings;
