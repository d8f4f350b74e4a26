use ash::vk;

use crate::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};
use crate::commands::rendering_info::GfxRenderingInfo;

/// 命令录制接口
///
/// 渲染图和数据管理器只通过这个 trait 录制命令，因此可以在没有 GPU 的情况下
/// 用 [`crate::headless::HeadlessRecorder`] 验证录制出来的命令序列。
///
/// 每个方法的注释里标注了命令类型和支持的 queue。
pub trait GfxCommandRecorder {
    /// 底层的 command buffer 句柄，headless 实现返回伪造的句柄
    fn vk_handle(&self) -> vk::CommandBuffer;

    /// - command type: synchronize
    /// - supported queue types: graphics, compute, transfer
    fn pipeline_barrier(&mut self, image_barriers: &[GfxImageBarrier], buffer_barriers: &[GfxBufferBarrier]);

    /// - command type: action, state
    /// - supported queue types: graphics
    fn begin_rendering(&mut self, rendering_info: &GfxRenderingInfo);

    /// - command type: action, state
    /// - supported queue types: graphics
    fn end_rendering(&mut self);

    /// - command type: action
    /// - 支持的 queue：transfer，graphics，compute
    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]);

    /// - command type: state, action
    /// - supported queue type: graphics, compute
    fn begin_label(&mut self, label_name: &str, label_color: glam::Vec4);

    /// - command type: state, action
    /// - supported queue type: graphics, compute
    fn end_label(&mut self);
}
