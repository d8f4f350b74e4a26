//! 不依赖窗口和 GPU 的示例程序
//!
//! 在 [`prism_gfx::headless::HeadlessDevice`] 上搭建一个延迟渲染风格的渲染图，
//! 每帧上传场景数据并执行渲染图，用于检查 barrier 推导和数据上传的结果。

pub mod deferred_graph;
pub mod headless_app;
