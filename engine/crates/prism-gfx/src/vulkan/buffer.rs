use std::ptr;

use anyhow::Context;
use ash::vk;
use vk_mem::Alloc;

use crate::resources::handles::{GfxBufferCreateInfo, GfxBufferInfo, GfxMemoryLocation};

/// vk-mem 分配的 buffer
///
/// 不实现 Drop，必须通过 [`GfxBuffer::destroy`] 显式销毁
pub struct GfxBuffer {
    handle: vk::Buffer,
    allocation: vk_mem::Allocation,

    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
    location: GfxMemoryLocation,

    /// host visible 的 buffer 在创建时就 map 好
    map_ptr: Option<*mut u8>,

    name: String,
}
// new & init
impl GfxBuffer {
    /// - 优先使用 device memory
    /// - host visible 的 buffer 使用顺序写入
    pub fn new(allocator: &vk_mem::Allocator, create_info: &GfxBufferCreateInfo) -> anyhow::Result<Self> {
        anyhow::ensure!(create_info.size > 0, "create buffer with zero size: {}", create_info.name);

        let buffer_ci = vk::BufferCreateInfo::default().size(create_info.size).usage(create_info.usage);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            flags: match create_info.location {
                GfxMemoryLocation::DeviceLocal => vk_mem::AllocationCreateFlags::empty(),
                GfxMemoryLocation::HostVisible => vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
            },
            ..Default::default()
        };

        let (buffer, mut allocation) = unsafe { allocator.create_buffer_with_alignment(&buffer_ci, &alloc_ci, 16) }
            .with_context(|| format!("failed to create buffer {} ({} bytes)", create_info.name, create_info.size))?;

        let map_ptr = match create_info.location {
            GfxMemoryLocation::HostVisible => Some(unsafe { allocator.map_memory(&mut allocation)? }),
            GfxMemoryLocation::DeviceLocal => None,
        };

        log::debug!("create buffer {}: {} bytes", create_info.name, create_info.size);
        Ok(Self {
            handle: buffer,
            allocation,
            size: create_info.size,
            usage: create_info.usage,
            location: create_info.location,
            map_ptr,
            name: create_info.name.clone(),
        })
    }
}
// destroy
impl GfxBuffer {
    pub fn destroy(mut self, allocator: &vk_mem::Allocator) {
        unsafe {
            if self.map_ptr.is_some() {
                allocator.unmap_memory(&mut self.allocation);
            }
            allocator.destroy_buffer(self.handle, &mut self.allocation);
        }
    }
}
// getters
impl GfxBuffer {
    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.handle
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn info(&self) -> GfxBufferInfo {
        GfxBufferInfo {
            buffer: self.handle,
            size: self.size,
            usage: self.usage,
            location: self.location,
        }
    }
}
// tools
impl GfxBuffer {
    /// 通过 mem map 的方式将 data 写入 buffer
    pub fn write(&self, allocator: &vk_mem::Allocator, offset: vk::DeviceSize, data: &[u8]) -> anyhow::Result<()> {
        let Some(map_ptr) = self.map_ptr else {
            anyhow::bail!("buffer {} is not host visible", self.name);
        };
        anyhow::ensure!(
            offset + data.len() as vk::DeviceSize <= self.size,
            "write out of range on buffer {}: offset {}, len {}, size {}",
            self.name,
            offset,
            data.len(),
            self.size
        );

        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), map_ptr.add(offset as usize), data.len());
        }
        allocator.flush_allocation(&self.allocation, offset, data.len() as vk::DeviceSize)?;
        Ok(())
    }
}
