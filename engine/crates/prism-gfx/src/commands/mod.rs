pub mod barrier;
pub mod queue;
pub mod recorder;
pub mod rendering_info;
