//! bindless 数据管理器
//!
//! 将同类的 POD 记录（mesh 元数据、材质参数、instance 变换、DDGI volume 参数……）
//! 按固定大小的 slot 打包进 GPU buffer。每个 slot 在 bindless storage buffer 数组中
//! 占一个元素，shader 通过 [`data_handle::DataHandle`] 的 `(binding, index)` 直接访问记录。

pub mod data_handle;
pub mod data_manager;

pub use data_handle::DataHandle;
pub use data_manager::DataManager;
