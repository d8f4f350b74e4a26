//! 基于 ash + vk-mem 的 [`crate::device::GfxDevice`] 实现
//!
//! instance / device / swapchain 的创建不在这里，由外部创建好之后通过
//! [`device::VulkanDeviceCreateInfo`] 传入。要求设备开启 Vulkan 1.3 的
//! synchronization2 和 dynamic rendering。

pub mod buffer;
pub mod command_buffer;
pub mod device;
pub mod frame_counter;
pub mod image;
