//! Prism 的 GFX 层
//!
//! 渲染图和 bindless 数据管理器只通过这里的 trait 与 GPU 打交道：
//!
//! - [`device::GfxDevice`]：render target / buffer 的申请、队列提交、bindless 表
//! - [`commands::recorder::GfxCommandRecorder`]：命令录制
//!
//! 提供两份实现：[`headless::HeadlessDevice`] 不需要 GPU，用于离线验证和测试；
//! [`vulkan::VulkanDevice`] 基于 ash + vk-mem。

pub mod basic;
pub mod bindless;
pub mod commands;
pub mod device;
pub mod headless;
pub mod resources;
pub mod vulkan;
