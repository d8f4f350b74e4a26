//! 场景数据的 GPU 侧管理
//!
//! 每类场景对象由一个 domain manager 管理，底层都是
//! [`prism_render_interface::DataManager`]：CPU 侧用 slotmap 保存逻辑对象和名字索引，
//! GPU 侧的记录通过 bindless `(binding, index)` 暴露给 shader。

pub mod components;
pub mod handles;
pub mod managers;
pub mod scene_manager;

pub use handles::{DdgiVolumeHandle, InstanceHandle, MaterialHandle, MeshHandle};
pub use scene_manager::SceneManager;
