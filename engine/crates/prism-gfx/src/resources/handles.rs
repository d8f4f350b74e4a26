use ash::vk;

slotmap::new_key_type! {
    /// 设备上 buffer 的句柄
    pub struct GfxBufferHandle;
}

/// 解析后的 image 资源，渲染图在执行阶段拿到的就是它
///
/// 只包含句柄，不持有资源的生命周期
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxImageTarget {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    /// 在 bindless sampled image 数组中的下标
    pub sampled_index: Option<u32>,
    /// 在 bindless storage image 数组中的下标
    pub storage_index: Option<u32>,
}

/// 解析后的 buffer 资源
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxBufferTarget {
    pub handle: GfxBufferHandle,
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
    /// 在 bindless storage buffer 数组中的下标
    pub storage_index: Option<u32>,
}

/// buffer 的内存位置
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum GfxMemoryLocation {
    /// 只能由 GPU 访问
    DeviceLocal,
    /// CPU 可写，通常作为 stage buffer
    HostVisible,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GfxBufferCreateInfo {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub location: GfxMemoryLocation,
    pub name: String,
}

impl GfxBufferCreateInfo {
    pub fn new_device_buffer(size: vk::DeviceSize, usage: vk::BufferUsageFlags, name: impl AsRef<str>) -> Self {
        Self {
            size,
            usage,
            location: GfxMemoryLocation::DeviceLocal,
            name: name.as_ref().to_string(),
        }
    }

    pub fn new_stage_buffer(size: vk::DeviceSize, name: impl AsRef<str>) -> Self {
        Self {
            size,
            usage: vk::BufferUsageFlags::TRANSFER_SRC,
            location: GfxMemoryLocation::HostVisible,
            name: name.as_ref().to_string(),
        }
    }
}

/// 已创建的 buffer 的信息
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxBufferInfo {
    pub buffer: vk::Buffer,
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub location: GfxMemoryLocation,
}
