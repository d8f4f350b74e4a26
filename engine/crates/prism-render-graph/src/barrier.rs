//! 推导出的 barrier

use ash::vk;
use prism_gfx::commands::barrier::{GfxBarrierMask, GfxBufferBarrier, GfxImageBarrier};
use prism_gfx::resources::format::GfxFormatUtils;
use prism_gfx::resources::handles::{GfxBufferTarget, GfxImageTarget};

use crate::resource::RgResourceId;

/// barrier 对应的 hazard
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RgBarrierKind {
    /// 从初始状态到第一次访问
    FirstUse,
    ReadAfterWrite,
    WriteAfterWrite,
    WriteAfterRead,
    /// 两组 layout 不同的读之间
    LayoutChange,
    /// swapchain 转换到 PRESENT_SRC
    Present,
}

/// 一个资源上的 barrier
///
/// 物理资源每帧都可能变化，所以这里只记录资源 id，执行时再转换为 [`GfxImageBarrier`] / [`GfxBufferBarrier`]
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RgBarrier {
    pub resource: RgResourceId,
    pub kind: RgBarrierKind,
    pub src_stage: vk::PipelineStageFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_access: vk::AccessFlags2,
    /// buffer 的 layout 恒为 UNDEFINED
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub is_image: bool,
}

impl RgBarrier {
    #[inline]
    pub fn mask(&self) -> GfxBarrierMask {
        GfxBarrierMask {
            src_stage: self.src_stage,
            dst_stage: self.dst_stage,
            src_access: self.src_access,
            dst_access: self.dst_access,
        }
    }

    pub fn to_gfx_image_barrier(&self, image: &GfxImageTarget) -> GfxImageBarrier {
        debug_assert!(self.is_image);
        GfxImageBarrier::new()
            .image(image.image)
            .layout_transfer(self.old_layout, self.new_layout)
            .mask(self.mask())
            .image_aspect_flag(GfxFormatUtils::infer_aspect(image.format))
    }

    pub fn to_gfx_buffer_barrier(&self, buffer: &GfxBufferTarget) -> GfxBufferBarrier {
        debug_assert!(!self.is_image);
        GfxBufferBarrier::new().mask(self.mask()).buffer(buffer.buffer, 0, vk::WHOLE_SIZE)
    }
}

/// 一个 pass 的 barrier，按执行时机分为三组
///
/// - `pre`：pass 执行之前
/// - `copy`：`pre` 之后，目标是 copy / blit 的 barrier
/// - `post`：pass 执行之后，为后续的消费者准备
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RgPassBarriers {
    pub pre: Vec<RgBarrier>,
    pub copy: Vec<RgBarrier>,
    pub post: Vec<RgBarrier>,
}

impl RgPassBarriers {
    #[inline]
    pub fn len(&self) -> usize {
        self.pre.len() + self.copy.len() + self.post.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &RgBarrier> {
        self.pre.iter().chain(self.copy.iter()).chain(self.post.iter())
    }

    /// 某个资源上的所有 barrier
    pub fn for_resource(&self, resource: RgResourceId) -> impl Iterator<Item = &RgBarrier> {
        self.iter().filter(move |b| b.resource == resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    fn color_barrier() -> RgBarrier {
        RgBarrier {
            resource: RgResourceId(0),
            kind: RgBarrierKind::ReadAfterWrite,
            src_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            dst_stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
            src_access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
            dst_access: vk::AccessFlags2::SHADER_READ,
            old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            is_image: true,
        }
    }

    #[test]
    fn test_to_gfx_image_barrier() {
        let target = GfxImageTarget {
            image: vk::Image::from_raw(3),
            view: vk::ImageView::from_raw(4),
            format: vk::Format::D32_SFLOAT,
            extent: vk::Extent2D { width: 4, height: 4 },
            sampled_index: None,
            storage_index: None,
        };
        let barrier = color_barrier().to_gfx_image_barrier(&target);
        assert_eq!(barrier.vk_image(), target.image);
        assert_eq!(barrier.new_layout(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(barrier.aspect(), vk::ImageAspectFlags::DEPTH);
        assert_eq!(barrier.barrier_mask().dst_access, vk::AccessFlags2::SHADER_READ);
    }

    #[test]
    fn test_pass_barriers_for_resource() {
        let mut barriers = RgPassBarriers::default();
        barriers.pre.push(color_barrier());
        barriers.post.push(RgBarrier {
            resource: RgResourceId(1),
            ..color_barrier()
        });
        assert_eq!(barriers.len(), 2);
        assert_eq!(barriers.for_resource(RgResourceId(1)).count(), 1);
    }
}
