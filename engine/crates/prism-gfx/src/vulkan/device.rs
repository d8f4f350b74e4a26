use std::collections::HashMap;

use anyhow::Context;
use ash::vk;
use itertools::Itertools;
use slotmap::SlotMap;

use crate::bindless::{GfxBindlessCapacity, GfxBindlessResource, GfxBindlessSet, GfxBindlessSlot};
use crate::commands::queue::GfxQueueType;
use crate::commands::recorder::GfxCommandRecorder;
use crate::device::{GfxDevice, GfxRenderTargetRequest, GfxTransientBufferRequest};
use crate::resources::handles::{GfxBufferCreateInfo, GfxBufferHandle, GfxBufferInfo, GfxBufferTarget, GfxImageTarget};
use crate::resources::render_target_cache::{GfxRenderTargetCache, GfxRenderTargetKey};
use crate::vulkan::buffer::GfxBuffer;
use crate::vulkan::command_buffer::GfxCommandBuffer;
use crate::vulkan::frame_counter::GfxFrameCounter;
use crate::vulkan::image::GfxRenderImage;

#[derive(Copy, Clone, Debug)]
pub struct GfxQueueInfo {
    pub queue: vk::Queue,
    pub family_index: u32,
}

pub struct VulkanDeviceCreateInfo {
    pub device: ash::Device,
    pub allocator: vk_mem::Allocator,
    /// 为 None 时 debug label 不生效
    pub debug_utils: Option<ash::ext::debug_utils::Device>,
    /// 按 [`GfxQueueType::index`] 排列；多个类型可以指向同一个 queue
    pub queues: [GfxQueueInfo; GfxQueueType::COUNT],
    /// 需要以 UPDATE_AFTER_BIND | PARTIALLY_BOUND 创建，binding 编号见
    /// [`crate::bindless::GfxBindlessBinding`]
    pub bindless_descriptor_set: vk::DescriptorSet,
    pub bindless_capacity: GfxBindlessCapacity,
    pub swapchain_target: GfxImageTarget,
}

/// 一个 frame in flight 槽位的命令资源
struct GfxFrameSlot {
    command_pools: [vk::CommandPool; GfxQueueType::COUNT],
    command_buffers: [Vec<vk::CommandBuffer>; GfxQueueType::COUNT],
    /// 本帧已经使用的 command buffer 数量
    cursors: [usize; GfxQueueType::COUNT],
    fences: [vk::Fence; GfxQueueType::COUNT],
    /// fence 是否已经提交，未提交的 fence 不能等待
    fence_submitted: [bool; GfxQueueType::COUNT],
    queue_used: [bool; GfxQueueType::COUNT],
}

enum GfxDeferredDestroy {
    Buffer(GfxBuffer),
    RenderImage(GfxRenderImage),
    /// 描述符仍可能被在途的命令使用，下标要等到帧结束后才能重新分配
    BindlessSlot(GfxBindlessSlot),
}

/// 基于 ash + vk-mem 的设备实现
///
/// # 帧的生命周期
/// 1. [`VulkanDevice::begin_frame`]：等待 FIF_COUNT 帧之前的命令执行完毕，回收命令资源和延迟销毁的资源
/// 2. [`VulkanDevice::set_swapchain_target`]：设置 acquire 得到的 swapchain image
/// 3. 渲染图执行：每个 pass `begin_commands` / `submit`
/// 4. [`VulkanDevice::end_frame`]：为本帧用到的每个队列提交 fence
pub struct VulkanDevice {
    device: ash::Device,
    debug_utils: Option<ash::ext::debug_utils::Device>,
    queues: [GfxQueueInfo; GfxQueueType::COUNT],

    frame_counter: GfxFrameCounter,
    frame_slots: Vec<GfxFrameSlot>,

    swapchain_target: GfxImageTarget,
    render_targets: GfxRenderTargetCache<GfxRenderImage>,
    transient_buffers: HashMap<u32, (GfxTransientBufferRequest, GfxBufferTarget)>,
    buffers: SlotMap<GfxBufferHandle, GfxBuffer>,
    /// (销毁时的帧序号, 资源)
    deletion_queue: Vec<(u64, GfxDeferredDestroy)>,

    bindless: GfxBindlessSet,
    bindless_descriptor_set: vk::DescriptorSet,

    /// 最后 drop，在此之前所有资源都已经销毁
    allocator: vk_mem::Allocator,
}

// new & init
impl VulkanDevice {
    pub fn new(create_info: VulkanDeviceCreateInfo) -> anyhow::Result<Self> {
        let device = create_info.device;
        let mut frame_slots = Vec::with_capacity(GfxFrameCounter::FIF_COUNT);
        for _ in 0..GfxFrameCounter::FIF_COUNT {
            let mut command_pools = [vk::CommandPool::null(); GfxQueueType::COUNT];
            let mut fences = [vk::Fence::null(); GfxQueueType::COUNT];
            for queue_type in GfxQueueType::ALL {
                let pool_ci = vk::CommandPoolCreateInfo::default()
                    .queue_family_index(create_info.queues[queue_type.index()].family_index)
                    .flags(vk::CommandPoolCreateFlags::TRANSIENT);
                unsafe {
                    command_pools[queue_type.index()] = device.create_command_pool(&pool_ci, None)?;
                    fences[queue_type.index()] = device.create_fence(&vk::FenceCreateInfo::default(), None)?;
                }
            }
            frame_slots.push(GfxFrameSlot {
                command_pools,
                command_buffers: Default::default(),
                cursors: [0; GfxQueueType::COUNT],
                fences,
                fence_submitted: [false; GfxQueueType::COUNT],
                queue_used: [false; GfxQueueType::COUNT],
            });
        }

        log::info!("vulkan device initialized with {} frames in flight", GfxFrameCounter::FIF_COUNT);
        Ok(Self {
            device,
            debug_utils: create_info.debug_utils,
            queues: create_info.queues,
            frame_counter: GfxFrameCounter::new(0),
            frame_slots,
            swapchain_target: create_info.swapchain_target,
            render_targets: GfxRenderTargetCache::new(),
            transient_buffers: HashMap::new(),
            buffers: SlotMap::with_key(),
            deletion_queue: Vec::new(),
            bindless: GfxBindlessSet::new(create_info.bindless_capacity),
            bindless_descriptor_set: create_info.bindless_descriptor_set,
            allocator: create_info.allocator,
        })
    }
}
// frame
impl VulkanDevice {
    /// 进入新的一帧
    ///
    /// 等待当前槽位上一次使用时提交的 fence，然后回收命令资源和延迟销毁的资源
    pub fn begin_frame(&mut self) -> anyhow::Result<()> {
        let _span = tracy_client::span!("VulkanDevice::begin_frame");
        self.frame_counter.next_frame();

        let slot = &mut self.frame_slots[self.frame_counter.fif_index()];
        let fences = slot
            .fences
            .iter()
            .zip(slot.fence_submitted.iter())
            .filter(|(_, submitted)| **submitted)
            .map(|(fence, _)| *fence)
            .collect_vec();
        unsafe {
            if !fences.is_empty() {
                self.device.wait_for_fences(&fences, true, u64::MAX)?;
                self.device.reset_fences(&fences)?;
            }
            for pool in slot.command_pools {
                self.device.reset_command_pool(pool, vk::CommandPoolResetFlags::empty())?;
            }
        }
        slot.fence_submitted = [false; GfxQueueType::COUNT];
        slot.queue_used = [false; GfxQueueType::COUNT];
        slot.cursors = [0; GfxQueueType::COUNT];

        if let Some(retired) = self.frame_counter.retired_frame_id() {
            let (expired, alive): (Vec<_>, Vec<_>) =
                std::mem::take(&mut self.deletion_queue).into_iter().partition(|(frame_id, _)| *frame_id <= retired);
            self.deletion_queue = alive;
            for (_, resource) in expired {
                self.destroy_now(resource);
            }
        }
        Ok(())
    }

    /// 为本帧用到的每个队列提交 fence
    pub fn end_frame(&mut self) -> anyhow::Result<()> {
        let slot = &mut self.frame_slots[self.frame_counter.fif_index()];
        for queue_type in GfxQueueType::ALL {
            let index = queue_type.index();
            if !slot.queue_used[index] {
                continue;
            }
            unsafe {
                self.device.queue_submit2(self.queues[index].queue, &[], slot.fences[index])?;
            }
            slot.fence_submitted[index] = true;
        }
        Ok(())
    }

    /// 设置当前帧 acquire 到的 swapchain image
    pub fn set_swapchain_target(&mut self, target: GfxImageTarget) {
        self.swapchain_target = target;
    }

    #[inline]
    pub fn frame_counter(&self) -> &GfxFrameCounter {
        &self.frame_counter
    }
}
// tools
impl VulkanDevice {
    fn destroy_now(&mut self, resource: GfxDeferredDestroy) {
        match resource {
            GfxDeferredDestroy::Buffer(buffer) => buffer.destroy(&self.allocator),
            GfxDeferredDestroy::RenderImage(image) => image.destroy(&self.device, &self.allocator),
            GfxDeferredDestroy::BindlessSlot(slot) => self.bindless.release(slot),
        }
    }

    fn defer_destroy(&mut self, resource: GfxDeferredDestroy) {
        self.deletion_queue.push((self.frame_counter.frame_id(), resource));
    }

    /// 将 bindless 的写入刷新到描述符集
    fn flush_bindless(&mut self) {
        let writes = self.bindless.take_pending_writes();
        if writes.is_empty() {
            return;
        }

        // vk::WriteDescriptorSet 只保存指针，info 需要先全部放好
        let mut buffer_infos = Vec::new();
        let mut image_infos = Vec::new();
        for write in &writes {
            match write.resource {
                GfxBindlessResource::StorageBuffer { buffer, offset, range } => {
                    buffer_infos.push(vk::DescriptorBufferInfo { buffer, offset, range })
                }
                GfxBindlessResource::SampledImage { view, layout } => image_infos.push(vk::DescriptorImageInfo {
                    sampler: vk::Sampler::null(),
                    image_view: view,
                    image_layout: layout,
                }),
                GfxBindlessResource::StorageImage { view } => image_infos.push(vk::DescriptorImageInfo {
                    sampler: vk::Sampler::null(),
                    image_view: view,
                    image_layout: vk::ImageLayout::GENERAL,
                }),
            }
        }

        let mut buffer_cursor = 0;
        let mut image_cursor = 0;
        let vk_writes = writes
            .iter()
            .map(|write| {
                let base = vk::WriteDescriptorSet::default()
                    .dst_set(self.bindless_descriptor_set)
                    .dst_binding(write.binding)
                    .dst_array_element(write.array_element)
                    .descriptor_type(write.resource.descriptor_type());
                match write.resource {
                    GfxBindlessResource::StorageBuffer { .. } => {
                        buffer_cursor += 1;
                        base.buffer_info(std::slice::from_ref(&buffer_infos[buffer_cursor - 1]))
                    }
                    _ => {
                        image_cursor += 1;
                        base.image_info(std::slice::from_ref(&image_infos[image_cursor - 1]))
                    }
                }
            })
            .collect_vec();

        log::trace!("flush {} bindless writes", vk_writes.len());
        unsafe {
            self.device.update_descriptor_sets(&vk_writes, &[]);
        }
    }
}

impl GfxDevice for VulkanDevice {
    type Recorder = GfxCommandBuffer;

    fn swapchain_target(&self) -> GfxImageTarget {
        self.swapchain_target
    }

    fn request_render_target(&mut self, request: &GfxRenderTargetRequest) -> anyhow::Result<GfxImageTarget> {
        let key = GfxRenderTargetKey {
            width: request.width,
            height: request.height,
            format: request.format,
            resource_id: request.resource_id,
        };

        let device = &self.device;
        let allocator = &self.allocator;
        let bindless = &mut self.bindless;
        let (image, evicted) = self.render_targets.get_or_create(key, |key| {
            let mut image = GfxRenderImage::new(device, allocator, key, request.usage)?;
            let view = image.target().view;
            let sampled_index = if request.usage.contains(vk::ImageUsageFlags::SAMPLED) {
                Some(bindless.set_sampled_image(None, view, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)?)
            } else {
                None
            };
            let storage_index = if request.usage.contains(vk::ImageUsageFlags::STORAGE) {
                Some(bindless.set_storage_image(None, view)?)
            } else {
                None
            };
            image.set_bindless_indices(sampled_index, storage_index);
            Ok(image)
        })?;
        let target = image.target();

        for old in evicted {
            let old_target = old.target();
            if let Some(index) = old_target.sampled_index {
                self.release_bindless(GfxBindlessSlot::SampledImage(index));
            }
            if let Some(index) = old_target.storage_index {
                self.release_bindless(GfxBindlessSlot::StorageImage(index));
            }
            self.defer_destroy(GfxDeferredDestroy::RenderImage(old));
        }
        Ok(target)
    }

    fn request_transient_buffer(&mut self, request: &GfxTransientBufferRequest) -> anyhow::Result<GfxBufferTarget> {
        if let Some((cached_request, target)) = self.transient_buffers.get(&request.resource_id) {
            if cached_request == request {
                return Ok(*target);
            }
        }
        if let Some((_, old)) = self.transient_buffers.remove(&request.resource_id) {
            if let Some(index) = old.storage_index {
                self.release_bindless(GfxBindlessSlot::StorageBuffer(index));
            }
            self.destroy_buffer(old.handle);
        }

        let handle = self.create_buffer(&GfxBufferCreateInfo::new_device_buffer(
            request.size,
            request.usage,
            format!("transient-{}", request.resource_id),
        ))?;
        let buffer = self.buffers[handle].vk_buffer();
        let storage_index = if request.usage.contains(vk::BufferUsageFlags::STORAGE_BUFFER) {
            Some(self.bindless.set_storage_buffer(None, buffer)?)
        } else {
            None
        };
        let target = GfxBufferTarget {
            handle,
            buffer,
            size: request.size,
            storage_index,
        };
        self.transient_buffers.insert(request.resource_id, (*request, target));
        Ok(target)
    }

    fn create_buffer(&mut self, create_info: &GfxBufferCreateInfo) -> anyhow::Result<GfxBufferHandle> {
        let buffer = GfxBuffer::new(&self.allocator, create_info)?;
        Ok(self.buffers.insert(buffer))
    }

    fn destroy_buffer(&mut self, handle: GfxBufferHandle) {
        match self.buffers.remove(handle) {
            Some(buffer) => self.defer_destroy(GfxDeferredDestroy::Buffer(buffer)),
            None => log::warn!("destroy unknown buffer handle {:?}", handle),
        }
    }

    fn buffer_info(&self, handle: GfxBufferHandle) -> Option<GfxBufferInfo> {
        self.buffers.get(handle).map(|b| b.info())
    }

    fn release_bindless(&mut self, slot: GfxBindlessSlot) {
        self.defer_destroy(GfxDeferredDestroy::BindlessSlot(slot));
    }

    fn write_buffer(&mut self, handle: GfxBufferHandle, offset: vk::DeviceSize, data: &[u8]) -> anyhow::Result<()> {
        let buffer = self.buffers.get(handle).ok_or_else(|| anyhow::anyhow!("unknown buffer handle {:?}", handle))?;
        buffer.write(&self.allocator, offset, data)
    }

    fn bindless_set(&self) -> &GfxBindlessSet {
        &self.bindless
    }

    fn bindless_set_mut(&mut self) -> &mut GfxBindlessSet {
        &mut self.bindless
    }

    fn begin_commands(&mut self, queue: GfxQueueType, label: &str) -> anyhow::Result<Self::Recorder> {
        let index = queue.index();
        let slot = &mut self.frame_slots[self.frame_counter.fif_index()];
        if slot.cursors[index] == slot.command_buffers[index].len() {
            let alloc_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(slot.command_pools[index])
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let allocated = unsafe { self.device.allocate_command_buffers(&alloc_info)? };
            slot.command_buffers[index].extend(allocated);
        }
        let vk_handle = slot.command_buffers[index][slot.cursors[index]];
        slot.cursors[index] += 1;

        GfxCommandBuffer::begin(self.device.clone(), self.debug_utils.clone(), vk_handle, queue, label)
    }

    fn submit(&mut self, queue: GfxQueueType, recorder: Self::Recorder) -> anyhow::Result<()> {
        let _span = tracy_client::span!("VulkanDevice::submit");
        debug_assert_eq!(recorder.queue(), queue, "command buffer {} submitted to another queue", recorder.name());
        recorder.end()?;
        self.flush_bindless();

        let command_buffer_infos = [vk::CommandBufferSubmitInfo::default().command_buffer(recorder.vk_handle())];
        let submit_info = vk::SubmitInfo2::default().command_buffer_infos(&command_buffer_infos);
        unsafe {
            self.device
                .queue_submit2(self.queues[queue.index()].queue, &[submit_info], vk::Fence::null())
                .with_context(|| format!("failed to submit {} to the {} queue", recorder.name(), queue))?;
        }
        self.frame_slots[self.frame_counter.fif_index()].queue_used[queue.index()] = true;
        Ok(())
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                log::error!("device_wait_idle failed while dropping VulkanDevice: {:?}", e);
            }
        }
        for (_, resource) in std::mem::take(&mut self.deletion_queue) {
            self.destroy_now(resource);
        }
        for image in self.render_targets.drain() {
            image.destroy(&self.device, &self.allocator);
        }
        for (_, buffer) in self.buffers.drain() {
            buffer.destroy(&self.allocator);
        }
        for slot in &self.frame_slots {
            unsafe {
                for pool in slot.command_pools {
                    self.device.destroy_command_pool(pool, None);
                }
                for fence in slot.fences {
                    self.device.destroy_fence(fence, None);
                }
            }
        }
        log::info!("Dropping VulkanDevice");
    }
}
