pub mod format;
pub mod handles;
pub mod render_target_cache;
