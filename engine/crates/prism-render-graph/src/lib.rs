//! 声明式渲染图
//!
//! # 核心概念
//!
//! - **资源表**：按名字登记的 image / buffer，id 连续且在图的生命周期内稳定
//! - **Pass 表**：按提交顺序登记的 pass，声明对资源的读写以及录制回调
//! - **barrier 推导**：对每个资源按 pass 顺序归并 reader / writer，推导出
//!   RaW / WaW / WaR / 首次使用 / present 所需的最少 barrier
//! - **帧执行**：每帧解析物理资源，依次录制并提交每个 pass
//!
//! # 生命周期
//!
//! `Setup` → `Build` → `Execute`，只能前进；`Execute` 每帧调用一次。
//!
//! # 使用示例
//!
//! ```ignore
//! let mut graph = RenderGraph::new();
//!
//! let mut gbuffer = graph.add_pass("gbuffer", RgPassType::Graphics);
//! gbuffer.write_color("albedo", RgImageAttachment::swapchain_relative(vk::Format::R8G8B8A8_UNORM));
//! gbuffer.add_render_function(true, |cmd, ctx| { /* draw */ });
//!
//! let mut lighting = graph.add_pass("lighting", RgPassType::Graphics);
//! lighting.read_sampled("albedo");
//! lighting.write_swapchain();
//! lighting.add_render_function(true, |cmd, ctx| { /* fullscreen */ });
//!
//! graph.build();
//! loop {
//!     graph.execute(&mut device)?;
//! }
//! ```

pub mod barrier;
pub mod debug;
pub mod executor;
pub mod graph;
pub mod pass;
pub mod render_graph;
pub mod resource;
pub mod resource_state;
pub mod resource_usage;
pub mod settings;
pub mod synthesis;

pub use barrier::{RgBarrier, RgBarrierKind, RgPassBarriers};
pub use graph::{RgDependency, RgDependencyGraph, RgDependencyKind};
pub use pass::{RgPass, RgPassBuilder, RgPassContext, RgPassId, RgPassType};
pub use render_graph::{RenderGraph, RgState};
pub use resource::{RgAttachment, RgBufferAttachment, RgImageAttachment, RgResource, RgResourceId, RgSizePolicy};
pub use resource_state::{RgBufferState, RgImageState};
pub use resource_usage::{RgReadType, RgUseFlags, RgWriteType};
pub use settings::RgSettings;
