//! 与 shader 共享布局的 GPU 记录
//!
//! 所有结构体都是 `#[repr(C)]` 且没有隐式 padding，可以直接按字节上传

pub mod ddgi_volume;
pub mod instance;
pub mod material;
pub mod mesh;
pub mod scene;

/// bindless 下标的无效值，与 shader 侧约定一致
pub const INVALID_BINDLESS_INDEX: u32 = u32::MAX;
