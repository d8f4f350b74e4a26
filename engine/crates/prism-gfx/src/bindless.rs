use ash::vk;
use bitvec::vec::BitVec;

/// bindless 描述符集中各个数组的 binding 编号
///
/// shader 侧需要与之保持一致
pub struct GfxBindlessBinding;
impl GfxBindlessBinding {
    pub const STORAGE_BUFFERS: u32 = 0;
    pub const SAMPLED_IMAGES: u32 = 1;
    pub const STORAGE_IMAGES: u32 = 2;
}

/// 写入 bindless 数组的一个元素
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GfxBindlessResource {
    StorageBuffer {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    },
    SampledImage {
        view: vk::ImageView,
        layout: vk::ImageLayout,
    },
    StorageImage {
        view: vk::ImageView,
    },
}

impl GfxBindlessResource {
    #[inline]
    pub fn storage_buffer(buffer: vk::Buffer) -> Self {
        Self::StorageBuffer {
            buffer,
            offset: 0,
            range: vk::WHOLE_SIZE,
        }
    }

    #[inline]
    pub fn descriptor_type(&self) -> vk::DescriptorType {
        match self {
            Self::StorageBuffer { .. } => vk::DescriptorType::STORAGE_BUFFER,
            Self::SampledImage { .. } => vk::DescriptorType::SAMPLED_IMAGE,
            Self::StorageImage { .. } => vk::DescriptorType::STORAGE_IMAGE,
        }
    }
}

/// bindless 数组中的一个元素
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum GfxBindlessSlot {
    StorageBuffer(u32),
    SampledImage(u32),
    StorageImage(u32),
}

/// 尚未提交到描述符集的写入
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxBindlessWrite {
    pub binding: u32,
    pub array_element: u32,
    pub resource: GfxBindlessResource,
}

/// bindless 描述符集中的一个数组
///
/// 用 bit 数组记录占用情况，释放的下标会被优先复用
pub struct GfxBindlessArray {
    binding: u32,
    capacity: u32,
    occupied: BitVec,
    bound: Vec<Option<GfxBindlessResource>>,
}

// new & init
impl GfxBindlessArray {
    pub fn new(binding: u32, capacity: u32) -> Self {
        Self {
            binding,
            capacity,
            occupied: BitVec::repeat(false, capacity as usize),
            bound: vec![None; capacity as usize],
        }
    }
}
// getters
impl GfxBindlessArray {
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline]
    pub fn occupied_count(&self) -> usize {
        self.occupied.count_ones()
    }

    #[inline]
    pub fn is_occupied(&self, index: u32) -> bool {
        self.occupied.get(index as usize).is_some_and(|b| *b)
    }

    #[inline]
    pub fn bound(&self, index: u32) -> Option<&GfxBindlessResource> {
        self.bound.get(index as usize).and_then(|r| r.as_ref())
    }
}
// tools
impl GfxBindlessArray {
    /// 申请一个空闲下标，数组满时返回错误
    pub fn reserve(&mut self) -> anyhow::Result<u32> {
        let Some(index) = self.occupied.first_zero() else {
            anyhow::bail!("bindless array (binding {}) exhausted: capacity {}", self.binding, self.capacity);
        };
        self.occupied.set(index, true);
        Ok(index as u32)
    }

    pub fn release(&mut self, index: u32) {
        assert!(self.is_occupied(index), "release unoccupied bindless index {} (binding {})", index, self.binding);
        self.occupied.set(index as usize, false);
        self.bound[index as usize] = None;
    }

    /// 将资源写入数组
    ///
    /// - `index` 为 `None` 时申请新的下标
    /// - `index` 为 `Some` 时覆盖已有的下标，该下标必须是之前申请过的
    fn write(
        &mut self,
        index: Option<u32>,
        resource: GfxBindlessResource,
        pending: &mut Vec<GfxBindlessWrite>,
    ) -> anyhow::Result<u32> {
        let index = match index {
            Some(index) => {
                assert!(
                    self.is_occupied(index),
                    "bindless index {} (binding {}) is not reserved",
                    index,
                    self.binding
                );
                index
            }
            None => self.reserve()?,
        };
        self.bound[index as usize] = Some(resource);
        pending.push(GfxBindlessWrite {
            binding: self.binding,
            array_element: index,
            resource,
        });
        Ok(index)
    }
}

/// 各个 bindless 数组的容量
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GfxBindlessCapacity {
    pub storage_buffers: u32,
    pub sampled_images: u32,
    pub storage_images: u32,
}

impl Default for GfxBindlessCapacity {
    fn default() -> Self {
        Self {
            storage_buffers: 1024,
            sampled_images: 1024,
            storage_images: 128,
        }
    }
}

/// bindless 描述符集
///
/// 由设备持有，生命周期与设备相同。这里只维护下标分配和待提交的写入，
/// 真正的 `vkUpdateDescriptorSets` 由设备在提交前调用
/// [`GfxBindlessSet::take_pending_writes`] 之后完成。
///
/// # Bindless 架构
/// - Binding 0: storage buffer 数组，数据管理器的每个 slot 占一个元素
/// - Binding 1: sampled image 数组，渲染图中被采样的 render target
/// - Binding 2: storage image 数组，渲染图中作为 UAV 的 render target
pub struct GfxBindlessSet {
    storage_buffers: GfxBindlessArray,
    sampled_images: GfxBindlessArray,
    storage_images: GfxBindlessArray,

    pending_writes: Vec<GfxBindlessWrite>,
}

impl Default for GfxBindlessSet {
    fn default() -> Self {
        Self::new(GfxBindlessCapacity::default())
    }
}

// new & init
impl GfxBindlessSet {
    pub fn new(capacity: GfxBindlessCapacity) -> Self {
        Self {
            storage_buffers: GfxBindlessArray::new(GfxBindlessBinding::STORAGE_BUFFERS, capacity.storage_buffers),
            sampled_images: GfxBindlessArray::new(GfxBindlessBinding::SAMPLED_IMAGES, capacity.sampled_images),
            storage_images: GfxBindlessArray::new(GfxBindlessBinding::STORAGE_IMAGES, capacity.storage_images),
            pending_writes: Vec::new(),
        }
    }
}
// getters
impl GfxBindlessSet {
    #[inline]
    pub fn storage_buffers(&self) -> &GfxBindlessArray {
        &self.storage_buffers
    }

    #[inline]
    pub fn sampled_images(&self) -> &GfxBindlessArray {
        &self.sampled_images
    }

    #[inline]
    pub fn storage_images(&self) -> &GfxBindlessArray {
        &self.storage_images
    }

    #[inline]
    pub fn has_pending_writes(&self) -> bool {
        !self.pending_writes.is_empty()
    }
}
// update
impl GfxBindlessSet {
    /// 写入 storage buffer，返回在数组中的下标
    ///
    /// `binding` 为 `None` 时分配新下标，否则覆盖原下标
    pub fn set_storage_buffer(&mut self, binding: Option<u32>, buffer: vk::Buffer) -> anyhow::Result<u32> {
        self.storage_buffers.write(binding, GfxBindlessResource::storage_buffer(buffer), &mut self.pending_writes)
    }

    pub fn set_sampled_image(
        &mut self,
        binding: Option<u32>,
        view: vk::ImageView,
        layout: vk::ImageLayout,
    ) -> anyhow::Result<u32> {
        self.sampled_images.write(binding, GfxBindlessResource::SampledImage { view, layout }, &mut self.pending_writes)
    }

    pub fn set_storage_image(&mut self, binding: Option<u32>, view: vk::ImageView) -> anyhow::Result<u32> {
        self.storage_images.write(binding, GfxBindlessResource::StorageImage { view }, &mut self.pending_writes)
    }

    pub fn release_storage_buffer(&mut self, binding: u32) {
        self.storage_buffers.release(binding);
    }

    pub fn release_sampled_image(&mut self, binding: u32) {
        self.sampled_images.release(binding);
    }

    pub fn release_storage_image(&mut self, binding: u32) {
        self.storage_images.release(binding);
    }

    pub fn release(&mut self, slot: GfxBindlessSlot) {
        match slot {
            GfxBindlessSlot::StorageBuffer(binding) => self.release_storage_buffer(binding),
            GfxBindlessSlot::SampledImage(binding) => self.release_sampled_image(binding),
            GfxBindlessSlot::StorageImage(binding) => self.release_storage_image(binding),
        }
    }

    /// 取出所有待提交的写入；同一元素的多次写入只保留最后一次
    pub fn take_pending_writes(&mut self) -> Vec<GfxBindlessWrite> {
        let mut writes = std::mem::take(&mut self.pending_writes);
        let mut seen = std::collections::HashSet::new();
        writes.reverse();
        writes.retain(|w| seen.insert((w.binding, w.array_element)));
        writes.reverse();
        writes
    }
}
