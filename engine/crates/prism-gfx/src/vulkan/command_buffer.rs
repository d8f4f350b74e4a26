use std::ffi::CString;

use ash::vk;
use itertools::Itertools;

use crate::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};
use crate::commands::queue::GfxQueueType;
use crate::commands::recorder::GfxCommandRecorder;
use crate::commands::rendering_info::{GfxRenderingInfo, GfxRenderingInfoStorage};

/// 命令缓冲封装
///
/// 由 [`crate::vulkan::device::VulkanDevice::begin_commands`] 创建，
/// 处于 recording 状态，提交时由设备结束录制。
pub struct GfxCommandBuffer {
    vk_handle: vk::CommandBuffer,
    queue: GfxQueueType,

    device: ash::Device,
    debug_utils: Option<ash::ext::debug_utils::Device>,

    name: String,
}
// new & init
impl GfxCommandBuffer {
    pub(crate) fn begin(
        device: ash::Device,
        debug_utils: Option<ash::ext::debug_utils::Device>,
        vk_handle: vk::CommandBuffer,
        queue: GfxQueueType,
        name: &str,
    ) -> anyhow::Result<Self> {
        unsafe {
            device.begin_command_buffer(
                vk_handle,
                &vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
            )?;
        }
        Ok(Self {
            vk_handle,
            queue,
            device,
            debug_utils,
            name: name.to_string(),
        })
    }

    /// 结束录制 command
    pub(crate) fn end(&self) -> anyhow::Result<()> {
        unsafe { self.device.end_command_buffer(self.vk_handle)? };
        Ok(())
    }
}
// getters
impl GfxCommandBuffer {
    #[inline]
    pub fn queue(&self) -> GfxQueueType {
        self.queue
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl GfxCommandRecorder for GfxCommandBuffer {
    #[inline]
    fn vk_handle(&self) -> vk::CommandBuffer {
        self.vk_handle
    }

    fn pipeline_barrier(&mut self, image_barriers: &[GfxImageBarrier], buffer_barriers: &[GfxBufferBarrier]) {
        if image_barriers.is_empty() && buffer_barriers.is_empty() {
            return;
        }
        let image_barriers = image_barriers.iter().map(|b| *b.inner()).collect_vec();
        let buffer_barriers = buffer_barriers.iter().map(|b| *b.inner()).collect_vec();
        let dependency_info = vk::DependencyInfo::default()
            .image_memory_barriers(&image_barriers)
            .buffer_memory_barriers(&buffer_barriers);
        unsafe {
            self.device.cmd_pipeline_barrier2(self.vk_handle, &dependency_info);
        }
    }

    fn begin_rendering(&mut self, rendering_info: &GfxRenderingInfo) {
        let mut storage = GfxRenderingInfoStorage::default();
        let vk_info = rendering_info.fill_vk_info(&mut storage);
        unsafe {
            self.device.cmd_begin_rendering(self.vk_handle, &vk_info);
        }
    }

    fn end_rendering(&mut self) {
        unsafe {
            self.device.cmd_end_rendering(self.vk_handle);
        }
    }

    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        unsafe {
            self.device.cmd_copy_buffer(self.vk_handle, src, dst, regions);
        }
    }

    fn begin_label(&mut self, label_name: &str, label_color: glam::Vec4) {
        let Some(debug_utils) = self.debug_utils.as_ref() else {
            return;
        };
        let name = CString::new(label_name).unwrap_or_default();
        unsafe {
            debug_utils.cmd_begin_debug_utils_label(
                self.vk_handle,
                &vk::DebugUtilsLabelEXT::default().label_name(name.as_c_str()).color(label_color.into()),
            );
        }
    }

    fn end_label(&mut self) {
        if let Some(debug_utils) = self.debug_utils.as_ref() {
            unsafe {
                debug_utils.cmd_end_debug_utils_label(self.vk_handle);
            }
        }
    }
}
