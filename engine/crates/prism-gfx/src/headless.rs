//! 不依赖 GPU 的设备实现
//!
//! 所有句柄都是伪造的，命令只被记录下来；`copy_buffer` 会在提交时在 CPU 上执行，
//! 因此上传路径可以直接检查 buffer 的内容。

use std::collections::HashMap;

use ash::vk;
use ash::vk::Handle;
use slotmap::SlotMap;

use crate::bindless::{GfxBindlessCapacity, GfxBindlessSet, GfxBindlessSlot, GfxBindlessWrite};
use crate::commands::barrier::{GfxBufferBarrier, GfxImageBarrier};
use crate::commands::queue::GfxQueueType;
use crate::commands::recorder::GfxCommandRecorder;
use crate::commands::rendering_info::GfxRenderingInfo;
use crate::device::{GfxDevice, GfxRenderTargetRequest, GfxTransientBufferRequest};
use crate::resources::handles::{
    GfxBufferCreateInfo, GfxBufferHandle, GfxBufferInfo, GfxBufferTarget, GfxImageTarget, GfxMemoryLocation,
};
use crate::resources::render_target_cache::{GfxRenderTargetCache, GfxRenderTargetKey};

/// 被记录下来的一条命令
#[derive(Clone, Debug)]
pub enum GfxRecordedCommand {
    PipelineBarrier {
        image_barriers: Vec<GfxImageBarrier>,
        buffer_barriers: Vec<GfxBufferBarrier>,
    },
    BeginRendering(GfxRenderingInfo),
    EndRendering,
    CopyBuffer {
        src: vk::Buffer,
        dst: vk::Buffer,
        regions: Vec<vk::BufferCopy>,
    },
    BeginLabel(String),
    EndLabel,
}

pub struct HeadlessRecorder {
    handle: vk::CommandBuffer,
    label: String,
    commands: Vec<GfxRecordedCommand>,
    inside_rendering: bool,
}

impl HeadlessRecorder {
    #[inline]
    pub fn commands(&self) -> &[GfxRecordedCommand] {
        &self.commands
    }
}

impl GfxCommandRecorder for HeadlessRecorder {
    fn vk_handle(&self) -> vk::CommandBuffer {
        self.handle
    }

    fn pipeline_barrier(&mut self, image_barriers: &[GfxImageBarrier], buffer_barriers: &[GfxBufferBarrier]) {
        assert!(!self.inside_rendering, "pipeline barrier inside dynamic rendering: {}", self.label);
        self.commands.push(GfxRecordedCommand::PipelineBarrier {
            image_barriers: image_barriers.to_vec(),
            buffer_barriers: buffer_barriers.to_vec(),
        });
    }

    fn begin_rendering(&mut self, rendering_info: &GfxRenderingInfo) {
        assert!(!self.inside_rendering, "nested dynamic rendering: {}", self.label);
        self.inside_rendering = true;
        self.commands.push(GfxRecordedCommand::BeginRendering(rendering_info.clone()));
    }

    fn end_rendering(&mut self) {
        assert!(self.inside_rendering, "end_rendering without begin_rendering: {}", self.label);
        self.inside_rendering = false;
        self.commands.push(GfxRecordedCommand::EndRendering);
    }

    fn copy_buffer(&mut self, src: vk::Buffer, dst: vk::Buffer, regions: &[vk::BufferCopy]) {
        self.commands.push(GfxRecordedCommand::CopyBuffer {
            src,
            dst,
            regions: regions.to_vec(),
        });
    }

    fn begin_label(&mut self, label_name: &str, _label_color: glam::Vec4) {
        self.commands.push(GfxRecordedCommand::BeginLabel(label_name.to_string()));
    }

    fn end_label(&mut self) {
        self.commands.push(GfxRecordedCommand::EndLabel);
    }
}

/// 一次队列提交
#[derive(Clone, Debug)]
pub struct HeadlessSubmission {
    pub queue: GfxQueueType,
    pub label: String,
    pub commands: Vec<GfxRecordedCommand>,
    /// 提交之前刷新到描述符集的 bindless 写入
    pub bindless_writes: Vec<GfxBindlessWrite>,
}

impl HeadlessSubmission {
    /// 所有 image barrier，按录制顺序
    pub fn image_barriers(&self) -> impl Iterator<Item = &GfxImageBarrier> {
        self.commands.iter().flat_map(|c| match c {
            GfxRecordedCommand::PipelineBarrier { image_barriers, .. } => image_barriers.as_slice(),
            _ => Default::default(),
        })
    }

    pub fn buffer_barriers(&self) -> impl Iterator<Item = &GfxBufferBarrier> {
        self.commands.iter().flat_map(|c| match c {
            GfxRecordedCommand::PipelineBarrier { buffer_barriers, .. } => buffer_barriers.as_slice(),
            _ => Default::default(),
        })
    }

    pub fn copy_count(&self) -> usize {
        self.commands.iter().filter(|c| matches!(c, GfxRecordedCommand::CopyBuffer { .. })).count()
    }
}

struct HeadlessBuffer {
    info: GfxBufferInfo,
    data: Vec<u8>,
}

/// 不需要 GPU 的 [`GfxDevice`] 实现
pub struct HeadlessDevice {
    next_raw_handle: u64,

    swapchain_images: Vec<GfxImageTarget>,
    swapchain_index: usize,

    render_targets: GfxRenderTargetCache<GfxImageTarget>,
    render_target_creations: usize,
    transient_buffers: HashMap<u32, (GfxTransientBufferRequest, GfxBufferTarget)>,

    buffers: SlotMap<GfxBufferHandle, HeadlessBuffer>,
    buffer_lookup: HashMap<vk::Buffer, GfxBufferHandle>,
    pending_destroy: Vec<GfxBufferHandle>,
    pending_release: Vec<GfxBindlessSlot>,

    bindless: GfxBindlessSet,
    submissions: Vec<HeadlessSubmission>,
}

// new & init
impl HeadlessDevice {
    pub const SWAPCHAIN_IMAGE_COUNT: usize = 3;
    pub const SWAPCHAIN_FORMAT: vk::Format = vk::Format::B8G8R8A8_SRGB;

    pub fn new(swapchain_extent: vk::Extent2D) -> Self {
        Self::with_bindless_capacity(swapchain_extent, GfxBindlessCapacity::default())
    }

    pub fn with_bindless_capacity(swapchain_extent: vk::Extent2D, capacity: GfxBindlessCapacity) -> Self {
        let mut device = Self {
            next_raw_handle: 1,
            swapchain_images: Vec::new(),
            swapchain_index: 0,
            render_targets: GfxRenderTargetCache::new(),
            render_target_creations: 0,
            transient_buffers: HashMap::new(),
            buffers: SlotMap::with_key(),
            buffer_lookup: HashMap::new(),
            pending_destroy: Vec::new(),
            pending_release: Vec::new(),
            bindless: GfxBindlessSet::new(capacity),
            submissions: Vec::new(),
        };
        device.resize_swapchain(swapchain_extent);
        device
    }

    fn next_raw(&mut self) -> u64 {
        let raw = self.next_raw_handle;
        self.next_raw_handle += 1;
        raw
    }
}
// swapchain
impl HeadlessDevice {
    /// 模拟窗口尺寸变化，重建所有 swapchain image
    pub fn resize_swapchain(&mut self, extent: vk::Extent2D) {
        self.swapchain_images = (0..Self::SWAPCHAIN_IMAGE_COUNT)
            .map(|_| GfxImageTarget {
                image: vk::Image::from_raw(self.next_raw()),
                view: vk::ImageView::from_raw(self.next_raw()),
                format: Self::SWAPCHAIN_FORMAT,
                extent,
                sampled_index: None,
                storage_index: None,
            })
            .collect();
        self.swapchain_index = 0;
    }

    /// 轮换到下一张 swapchain image
    pub fn acquire_next_image(&mut self) {
        self.swapchain_index = (self.swapchain_index + 1) % self.swapchain_images.len();
    }

    /// 帧结束：真正释放延迟销毁的 buffer 和 bindless 下标
    pub fn end_frame(&mut self) {
        for handle in std::mem::take(&mut self.pending_destroy) {
            if let Some(buffer) = self.buffers.remove(handle) {
                self.buffer_lookup.remove(&buffer.info.buffer);
            }
        }
        for slot in std::mem::take(&mut self.pending_release) {
            self.bindless.release(slot);
        }
    }
}
// getters
impl HeadlessDevice {
    #[inline]
    pub fn submissions(&self) -> &[HeadlessSubmission] {
        &self.submissions
    }

    #[inline]
    pub fn take_submissions(&mut self) -> Vec<HeadlessSubmission> {
        std::mem::take(&mut self.submissions)
    }

    /// render target 实际被创建的次数
    #[inline]
    pub fn render_target_creations(&self) -> usize {
        self.render_target_creations
    }

    #[inline]
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn buffer_data(&self, handle: GfxBufferHandle) -> Option<&[u8]> {
        self.buffers.get(handle).map(|b| b.data.as_slice())
    }
}
// tools
impl HeadlessDevice {
    fn replay_copies(&mut self, commands: &[GfxRecordedCommand]) -> anyhow::Result<()> {
        for command in commands {
            let GfxRecordedCommand::CopyBuffer { src, dst, regions } = command else {
                continue;
            };
            let src_handle = self.lookup(*src)?;
            let dst_handle = self.lookup(*dst)?;
            for region in regions {
                let src_range = region.src_offset as usize..(region.src_offset + region.size) as usize;
                let bytes = self.buffers[src_handle]
                    .data
                    .get(src_range)
                    .ok_or_else(|| anyhow::anyhow!("copy source out of range: {:?}", region))?
                    .to_vec();
                let dst_range = region.dst_offset as usize..(region.dst_offset + region.size) as usize;
                self.buffers[dst_handle]
                    .data
                    .get_mut(dst_range)
                    .ok_or_else(|| anyhow::anyhow!("copy destination out of range: {:?}", region))?
                    .copy_from_slice(&bytes);
            }
        }
        Ok(())
    }

    fn lookup(&self, buffer: vk::Buffer) -> anyhow::Result<GfxBufferHandle> {
        self.buffer_lookup.get(&buffer).copied().ok_or_else(|| anyhow::anyhow!("unknown buffer: {:?}", buffer))
    }
}

impl GfxDevice for HeadlessDevice {
    type Recorder = HeadlessRecorder;

    fn swapchain_target(&self) -> GfxImageTarget {
        self.swapchain_images[self.swapchain_index]
    }

    fn request_render_target(&mut self, request: &GfxRenderTargetRequest) -> anyhow::Result<GfxImageTarget> {
        let key = GfxRenderTargetKey {
            width: request.width,
            height: request.height,
            format: request.format,
            resource_id: request.resource_id,
        };

        let mut next_raw = self.next_raw_handle;
        let mut created = false;
        let bindless = &mut self.bindless;
        let (target, evicted) = self.render_targets.get_or_create(key, |key| {
            let view = vk::ImageView::from_raw(next_raw + 1);
            let target = GfxImageTarget {
                image: vk::Image::from_raw(next_raw),
                view,
                format: key.format,
                extent: vk::Extent2D {
                    width: key.width,
                    height: key.height,
                },
                sampled_index: if request.usage.contains(vk::ImageUsageFlags::SAMPLED) {
                    Some(bindless.set_sampled_image(None, view, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)?)
                } else {
                    None
                },
                storage_index: if request.usage.contains(vk::ImageUsageFlags::STORAGE) {
                    Some(bindless.set_storage_image(None, view)?)
                } else {
                    None
                },
            };
            next_raw += 2;
            created = true;
            Ok(target)
        })?;
        let target = *target;

        for old in evicted {
            if let Some(index) = old.sampled_index {
                self.release_bindless(GfxBindlessSlot::SampledImage(index));
            }
            if let Some(index) = old.storage_index {
                self.release_bindless(GfxBindlessSlot::StorageImage(index));
            }
        }
        self.next_raw_handle = next_raw;
        if created {
            self.render_target_creations += 1;
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
        let buffer = self.buffers[handle].info.buffer;
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
        anyhow::ensure!(create_info.size > 0, "create buffer with zero size: {}", create_info.name);
        let buffer = vk::Buffer::from_raw(self.next_raw());
        let handle = self.buffers.insert(HeadlessBuffer {
            info: GfxBufferInfo {
                buffer,
                size: create_info.size,
                usage: create_info.usage,
                location: create_info.location,
            },
            data: vec![0; create_info.size as usize],
        });
        self.buffer_lookup.insert(buffer, handle);
        Ok(handle)
    }

    fn destroy_buffer(&mut self, handle: GfxBufferHandle) {
        self.pending_destroy.push(handle);
    }

    fn release_bindless(&mut self, slot: GfxBindlessSlot) {
        self.pending_release.push(slot);
    }

    fn buffer_info(&self, handle: GfxBufferHandle) -> Option<GfxBufferInfo> {
        self.buffers.get(handle).map(|b| b.info)
    }

    fn write_buffer(&mut self, handle: GfxBufferHandle, offset: vk::DeviceSize, data: &[u8]) -> anyhow::Result<()> {
        let buffer = self.buffers.get_mut(handle).ok_or_else(|| anyhow::anyhow!("unknown buffer handle"))?;
        anyhow::ensure!(
            buffer.info.location == GfxMemoryLocation::HostVisible,
            "write_buffer on a device local buffer"
        );
        let range = offset as usize..offset as usize + data.len();
        buffer
            .data
            .get_mut(range)
            .ok_or_else(|| anyhow::anyhow!("write out of range: offset {}, len {}", offset, data.len()))?
            .copy_from_slice(data);
        Ok(())
    }

    fn bindless_set(&self) -> &GfxBindlessSet {
        &self.bindless
    }

    fn bindless_set_mut(&mut self) -> &mut GfxBindlessSet {
        &mut self.bindless
    }

    fn begin_commands(&mut self, _queue: GfxQueueType, label: &str) -> anyhow::Result<Self::Recorder> {
        Ok(HeadlessRecorder {
            handle: vk::CommandBuffer::from_raw(self.next_raw()),
            label: label.to_string(),
            commands: Vec::new(),
            inside_rendering: false,
        })
    }

    fn submit(&mut self, queue: GfxQueueType, recorder: Self::Recorder) -> anyhow::Result<()> {
        anyhow::ensure!(!recorder.inside_rendering, "submit while dynamic rendering is open: {}", recorder.label);
        self.replay_copies(&recorder.commands)?;
        let bindless_writes = self.bindless.take_pending_writes();
        self.submissions.push(HeadlessSubmission {
            queue,
            label: recorder.label,
            commands: recorder.commands,
            bindless_writes,
        });
        Ok(())
    }
}
