use ash::vk;

use crate::bindless::{GfxBindlessSet, GfxBindlessSlot};
use crate::commands::queue::GfxQueueType;
use crate::commands::recorder::GfxCommandRecorder;
use crate::resources::handles::{GfxBufferCreateInfo, GfxBufferHandle, GfxBufferInfo, GfxBufferTarget, GfxImageTarget};

/// 渲染图向设备申请 render target 的参数
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxRenderTargetRequest {
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    /// 渲染图中资源的 id，作为缓存 key 的一部分
    pub resource_id: u32,
}

/// 渲染图向设备申请 transient buffer 的参数
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxTransientBufferRequest {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub resource_id: u32,
}

/// GPU 设备的边界
///
/// 渲染图的执行器和 bindless 数据管理器只依赖这个 trait：
///
/// - render target / transient buffer 按 key 缓存，跨帧复用
/// - 普通 buffer 通过 [`GfxBufferHandle`] 管理，销毁会延迟到 GPU 不再使用之后
/// - 每个 pass 独立录制并提交到对应的队列
/// - bindless 描述符集由设备持有
pub trait GfxDevice {
    type Recorder: GfxCommandRecorder;

    /// 当前帧的 swapchain image
    fn swapchain_target(&self) -> GfxImageTarget;

    #[inline]
    fn swapchain_extent(&self) -> vk::Extent2D {
        self.swapchain_target().extent
    }

    /// 申请 render target，相同参数的请求返回同一份资源
    fn request_render_target(&mut self, request: &GfxRenderTargetRequest) -> anyhow::Result<GfxImageTarget>;

    /// 申请 transient buffer，相同参数的请求返回同一份资源
    fn request_transient_buffer(&mut self, request: &GfxTransientBufferRequest) -> anyhow::Result<GfxBufferTarget>;

    fn create_buffer(&mut self, create_info: &GfxBufferCreateInfo) -> anyhow::Result<GfxBufferHandle>;

    /// 延迟销毁：资源会在当前帧的命令执行完之后才真正释放
    fn destroy_buffer(&mut self, handle: GfxBufferHandle);

    fn buffer_info(&self, handle: GfxBufferHandle) -> Option<GfxBufferInfo>;

    /// 写入 host visible 的 buffer
    fn write_buffer(&mut self, handle: GfxBufferHandle, offset: vk::DeviceSize, data: &[u8]) -> anyhow::Result<()>;

    /// 延迟释放 bindless 下标：在当前帧的命令执行完之后才能被重新分配
    fn release_bindless(&mut self, slot: GfxBindlessSlot);

    fn bindless_set(&self) -> &GfxBindlessSet;

    fn bindless_set_mut(&mut self) -> &mut GfxBindlessSet;

    /// 开始录制一段提交到 `queue` 的命令
    fn begin_commands(&mut self, queue: GfxQueueType, label: &str) -> anyhow::Result<Self::Recorder>;

    /// 结束录制并提交；提交之前会将 bindless 的写入刷新到描述符集
    fn submit(&mut self, queue: GfxQueueType, recorder: Self::Recorder) -> anyhow::Result<()>;
}
