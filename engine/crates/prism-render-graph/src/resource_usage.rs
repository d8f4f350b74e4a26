//! 资源的使用方式，以及由使用方式推断出的 stage / access / layout

use ash::vk;
use bitflags::bitflags;

use crate::pass::RgPassType;

/// pass 对资源的读取方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgReadType {
    /// 着色器采样
    Sampled,
    InputAttachment,
    /// 作为 storage image / storage buffer 读取
    StorageLoad,
    /// 只读的深度附件
    DepthStencilAttachment,
    /// indirect draw / dispatch 的参数
    IndirectArgs,
    BlitSrc,
    CopySrc,
}

/// pass 对资源的写入方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgWriteType {
    ColorAttachment,
    DepthStencilAttachment,
    /// 作为 storage image / storage buffer 写入
    StorageStore,
    BlitDst,
    CopyDst,
}

bitflags! {
    /// 一个 pass 对一个资源的全部使用方式
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct RgUseFlags: u32 {
        const SAMPLED = 1 << 0;
        const INPUT_ATTACHMENT = 1 << 1;
        const STORAGE_LOAD = 1 << 2;
        const DEPTH_STENCIL_READ = 1 << 3;
        const INDIRECT_ARGS = 1 << 4;
        const BLIT_SRC = 1 << 5;
        const COPY_SRC = 1 << 6;
        const COLOR_ATTACHMENT = 1 << 7;
        const DEPTH_STENCIL_ATTACHMENT = 1 << 8;
        const STORAGE_STORE = 1 << 9;
        const BLIT_DST = 1 << 10;
        const COPY_DST = 1 << 11;

        const READS = Self::SAMPLED.bits()
            | Self::INPUT_ATTACHMENT.bits()
            | Self::STORAGE_LOAD.bits()
            | Self::DEPTH_STENCIL_READ.bits()
            | Self::INDIRECT_ARGS.bits()
            | Self::BLIT_SRC.bits()
            | Self::COPY_SRC.bits();
        const WRITES = Self::COLOR_ATTACHMENT.bits()
            | Self::DEPTH_STENCIL_ATTACHMENT.bits()
            | Self::STORAGE_STORE.bits()
            | Self::BLIT_DST.bits()
            | Self::COPY_DST.bits();
        const TRANSFER = Self::BLIT_SRC.bits() | Self::COPY_SRC.bits() | Self::BLIT_DST.bits() | Self::COPY_DST.bits();
        const SHADER = Self::SAMPLED.bits()
            | Self::INPUT_ATTACHMENT.bits()
            | Self::STORAGE_LOAD.bits()
            | Self::STORAGE_STORE.bits();
        const ATTACHMENT = Self::COLOR_ATTACHMENT.bits()
            | Self::DEPTH_STENCIL_ATTACHMENT.bits()
            | Self::DEPTH_STENCIL_READ.bits()
            | Self::INPUT_ATTACHMENT.bits();
        /// 只对 image 有意义的使用方式
        const IMAGE_ONLY = Self::ATTACHMENT.bits()
            | Self::SAMPLED.bits()
            | Self::BLIT_SRC.bits()
            | Self::BLIT_DST.bits();
        /// 只对 buffer 有意义的使用方式
        const BUFFER_ONLY = Self::INDIRECT_ARGS.bits();
    }
}

impl RgUseFlags {
    /// 单个使用方式的数量，也是资源上 per-use bitset 的数量
    pub const USE_COUNT: usize = 12;

    /// 单个 flag 在 per-use bitset 数组中的下标
    #[inline]
    pub fn use_index(self) -> usize {
        debug_assert_eq!(self.bits().count_ones(), 1, "use_index on combined flags: {:?}", self);
        self.bits().trailing_zeros() as usize
    }

    #[inline]
    pub fn from_use_index(index: usize) -> Self {
        Self::from_bits_truncate(1 << index)
    }

    #[inline]
    pub fn is_write(self) -> bool {
        self.intersects(Self::WRITES)
    }

    /// 对应的 image usage
    pub fn image_usage(self) -> vk::ImageUsageFlags {
        let mut usage = vk::ImageUsageFlags::empty();
        if self.contains(Self::SAMPLED) {
            usage |= vk::ImageUsageFlags::SAMPLED;
        }
        if self.contains(Self::INPUT_ATTACHMENT) {
            usage |= vk::ImageUsageFlags::INPUT_ATTACHMENT | vk::ImageUsageFlags::SAMPLED;
        }
        if self.intersects(Self::STORAGE_LOAD | Self::STORAGE_STORE) {
            usage |= vk::ImageUsageFlags::STORAGE;
        }
        if self.contains(Self::COLOR_ATTACHMENT) {
            usage |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
        }
        if self.intersects(Self::DEPTH_STENCIL_ATTACHMENT | Self::DEPTH_STENCIL_READ) {
            usage |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
        }
        if self.intersects(Self::BLIT_SRC | Self::COPY_SRC) {
            usage |= vk::ImageUsageFlags::TRANSFER_SRC;
        }
        if self.intersects(Self::BLIT_DST | Self::COPY_DST) {
            usage |= vk::ImageUsageFlags::TRANSFER_DST;
        }
        usage
    }

    /// 对应的 buffer usage
    pub fn buffer_usage(self) -> vk::BufferUsageFlags {
        let mut usage = vk::BufferUsageFlags::empty();
        if self.intersects(Self::STORAGE_LOAD | Self::STORAGE_STORE) {
            usage |= vk::BufferUsageFlags::STORAGE_BUFFER;
        }
        if self.contains(Self::INDIRECT_ARGS) {
            usage |= vk::BufferUsageFlags::INDIRECT_BUFFER;
        }
        if self.contains(Self::COPY_SRC) {
            usage |= vk::BufferUsageFlags::TRANSFER_SRC;
        }
        if self.contains(Self::COPY_DST) {
            usage |= vk::BufferUsageFlags::TRANSFER_DST;
        }
        usage
    }

    /// 检查使用方式与 pass 类型、资源类型是否匹配，返回错误描述
    pub fn validate(self, pass_type: RgPassType, is_image: bool) -> Option<&'static str> {
        if self.contains(Self::DEPTH_STENCIL_READ | Self::DEPTH_STENCIL_ATTACHMENT) {
            return Some("depth stencil attachment declared as both read and write");
        }
        if is_image && self.intersects(Self::BUFFER_ONLY) {
            return Some("buffer-only use on an image resource");
        }
        if !is_image && self.intersects(Self::IMAGE_ONLY) {
            return Some("image-only use on a buffer resource");
        }
        match pass_type {
            RgPassType::Graphics => None,
            RgPassType::AsyncCompute if self.intersects(Self::ATTACHMENT) => {
                Some("attachment use in an async compute pass")
            }
            RgPassType::Transfer if !(self - Self::TRANSFER).is_empty() => Some("non-transfer use in a transfer pass"),
            _ => None,
        }
    }
}

impl From<RgReadType> for RgUseFlags {
    fn from(read_type: RgReadType) -> Self {
        match read_type {
            RgReadType::Sampled => Self::SAMPLED,
            RgReadType::InputAttachment => Self::INPUT_ATTACHMENT,
            RgReadType::StorageLoad => Self::STORAGE_LOAD,
            RgReadType::DepthStencilAttachment => Self::DEPTH_STENCIL_READ,
            RgReadType::IndirectArgs => Self::INDIRECT_ARGS,
            RgReadType::BlitSrc => Self::BLIT_SRC,
            RgReadType::CopySrc => Self::COPY_SRC,
        }
    }
}

impl From<RgWriteType> for RgUseFlags {
    fn from(write_type: RgWriteType) -> Self {
        match write_type {
            RgWriteType::ColorAttachment => Self::COLOR_ATTACHMENT,
            RgWriteType::DepthStencilAttachment => Self::DEPTH_STENCIL_ATTACHMENT,
            RgWriteType::StorageStore => Self::STORAGE_STORE,
            RgWriteType::BlitDst => Self::BLIT_DST,
            RgWriteType::CopyDst => Self::COPY_DST,
        }
    }
}

/// 一个 pass 对一个资源的访问，由该 pass 的全部使用方式合并而来
///
/// - `src_*`：作为 barrier 的生产者一侧，只包含写操作
/// - `dst_*`：作为 barrier 的消费者一侧
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgAccess {
    pub uses: RgUseFlags,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
    /// buffer 恒为 UNDEFINED
    pub layout: vk::ImageLayout,
}

struct RgUseState {
    src_stage: vk::PipelineStageFlags2,
    src_access: vk::AccessFlags2,
    dst_stage: vk::PipelineStageFlags2,
    dst_access: vk::AccessFlags2,
    layout: vk::ImageLayout,
}

impl RgUseState {
    /// 只读的使用方式：生产者一侧只有执行依赖
    fn read(stage: vk::PipelineStageFlags2, access: vk::AccessFlags2, layout: vk::ImageLayout) -> Self {
        Self {
            src_stage: stage,
            src_access: vk::AccessFlags2::NONE,
            dst_stage: stage,
            dst_access: access,
            layout,
        }
    }
}

impl RgAccess {
    /// pass 中着色器访问资源的 stage
    fn shader_stages(pass_type: RgPassType) -> vk::PipelineStageFlags2 {
        match pass_type {
            RgPassType::Graphics => vk::PipelineStageFlags2::FRAGMENT_SHADER | vk::PipelineStageFlags2::COMPUTE_SHADER,
            RgPassType::AsyncCompute => vk::PipelineStageFlags2::COMPUTE_SHADER,
            RgPassType::Transfer => vk::PipelineStageFlags2::TRANSFER,
        }
    }

    fn use_state(single: RgUseFlags, pass_type: RgPassType) -> RgUseState {
        type S = vk::PipelineStageFlags2;
        type A = vk::AccessFlags2;
        type L = vk::ImageLayout;

        let shader = Self::shader_stages(pass_type);
        let fragment_tests = S::EARLY_FRAGMENT_TESTS | S::LATE_FRAGMENT_TESTS;
        match single {
            RgUseFlags::SAMPLED => RgUseState::read(shader, A::SHADER_READ, L::SHADER_READ_ONLY_OPTIMAL),
            RgUseFlags::INPUT_ATTACHMENT => {
                RgUseState::read(S::FRAGMENT_SHADER, A::INPUT_ATTACHMENT_READ, L::SHADER_READ_ONLY_OPTIMAL)
            }
            RgUseFlags::STORAGE_LOAD => RgUseState::read(shader, A::SHADER_STORAGE_READ, L::GENERAL),
            RgUseFlags::DEPTH_STENCIL_READ => {
                RgUseState::read(fragment_tests, A::DEPTH_STENCIL_ATTACHMENT_READ, L::DEPTH_STENCIL_READ_ONLY_OPTIMAL)
            }
            RgUseFlags::INDIRECT_ARGS => RgUseState::read(S::DRAW_INDIRECT, A::INDIRECT_COMMAND_READ, L::UNDEFINED),
            RgUseFlags::BLIT_SRC | RgUseFlags::COPY_SRC => {
                RgUseState::read(S::TRANSFER, A::TRANSFER_READ, L::TRANSFER_SRC_OPTIMAL)
            }
            RgUseFlags::COLOR_ATTACHMENT => RgUseState {
                src_stage: S::COLOR_ATTACHMENT_OUTPUT,
                src_access: A::COLOR_ATTACHMENT_WRITE,
                dst_stage: S::COLOR_ATTACHMENT_OUTPUT,
                dst_access: A::COLOR_ATTACHMENT_READ | A::COLOR_ATTACHMENT_WRITE,
                layout: L::COLOR_ATTACHMENT_OPTIMAL,
            },
            RgUseFlags::DEPTH_STENCIL_ATTACHMENT => RgUseState {
                src_stage: S::LATE_FRAGMENT_TESTS,
                src_access: A::DEPTH_STENCIL_ATTACHMENT_WRITE,
                dst_stage: S::EARLY_FRAGMENT_TESTS,
                dst_access: A::DEPTH_STENCIL_ATTACHMENT_READ | A::DEPTH_STENCIL_ATTACHMENT_WRITE,
                layout: L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            },
            RgUseFlags::STORAGE_STORE => RgUseState {
                src_stage: shader,
                src_access: A::SHADER_STORAGE_WRITE,
                dst_stage: shader,
                dst_access: A::SHADER_STORAGE_READ | A::SHADER_STORAGE_WRITE,
                layout: L::GENERAL,
            },
            RgUseFlags::BLIT_DST | RgUseFlags::COPY_DST => RgUseState {
                src_stage: S::TRANSFER,
                src_access: A::TRANSFER_WRITE,
                dst_stage: S::TRANSFER,
                dst_access: A::TRANSFER_WRITE,
                layout: L::TRANSFER_DST_OPTIMAL,
            },
            _ => unreachable!("not a single use flag: {:?}", single),
        }
    }

    /// 同一个 pass 中多个使用方式要求的 layout 不同时，选择兼容的 layout
    ///
    /// bindless 表中的 sampled image 描述符固定以 `SHADER_READ_ONLY_OPTIMAL` 写入，
    /// 采样所在的 pass 不能把 image 换到其他 layout
    fn merge_layout(a: vk::ImageLayout, b: vk::ImageLayout) -> Option<vk::ImageLayout> {
        type L = vk::ImageLayout;
        match (a, b) {
            _ if a == b => Some(a),
            (L::SHADER_READ_ONLY_OPTIMAL, _) | (_, L::SHADER_READ_ONLY_OPTIMAL) => None,
            (L::GENERAL, _) | (_, L::GENERAL) => Some(L::GENERAL),
            _ => None,
        }
    }

    /// 合并一个 pass 对资源的全部使用方式
    ///
    /// layout 冲突时返回 None
    pub fn from_uses(uses: RgUseFlags, pass_type: RgPassType, is_image: bool) -> Option<Self> {
        let mut access = Self {
            uses,
            src_stage: vk::PipelineStageFlags2::NONE,
            src_access: vk::AccessFlags2::NONE,
            dst_stage: vk::PipelineStageFlags2::NONE,
            dst_access: vk::AccessFlags2::NONE,
            layout: vk::ImageLayout::UNDEFINED,
        };

        let mut layout: Option<vk::ImageLayout> = None;
        for index in 0..RgUseFlags::USE_COUNT {
            let single = RgUseFlags::from_use_index(index);
            if !uses.contains(single) {
                continue;
            }
            let state = Self::use_state(single, pass_type);
            access.src_stage |= state.src_stage;
            access.src_access |= state.src_access;
            access.dst_stage |= state.dst_stage;
            access.dst_access |= state.dst_access;
            if is_image {
                layout = match layout {
                    None => Some(state.layout),
                    Some(prev) => Some(Self::merge_layout(prev, state.layout)?),
                };
            }
        }
        access.layout = layout.unwrap_or(vk::ImageLayout::UNDEFINED);
        Some(access)
    }

    #[inline]
    pub fn is_write(&self) -> bool {
        self.uses.is_write()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_use_index_roundtrip() {
        for index in 0..RgUseFlags::USE_COUNT {
            assert_eq!(RgUseFlags::from_use_index(index).use_index(), index);
        }
        assert_eq!(RgUseFlags::from_use_index(RgUseFlags::USE_COUNT), RgUseFlags::empty());
    }

    #[test]
    fn test_color_attachment_access() {
        let access = RgAccess::from_uses(RgUseFlags::COLOR_ATTACHMENT, RgPassType::Graphics, true).unwrap();
        assert!(access.is_write());
        assert_eq!(access.src_access, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
        assert_eq!(
            access.dst_access,
            vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE
        );
        assert_eq!(access.layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
    }

    #[test]
    fn test_sampled_stage_follows_pass_type() {
        let graphics = RgAccess::from_uses(RgUseFlags::SAMPLED, RgPassType::Graphics, true).unwrap();
        let compute = RgAccess::from_uses(RgUseFlags::SAMPLED, RgPassType::AsyncCompute, true).unwrap();
        assert!(graphics.dst_stage.contains(vk::PipelineStageFlags2::FRAGMENT_SHADER));
        assert_eq!(compute.dst_stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(graphics.src_access, vk::AccessFlags2::NONE);
    }

    #[test]
    fn test_merge_layouts() {
        // storage 读写 + 拷贝源：GENERAL 对两者都合法
        let rw = RgAccess::from_uses(
            RgUseFlags::STORAGE_LOAD | RgUseFlags::STORAGE_STORE | RgUseFlags::COPY_SRC,
            RgPassType::Graphics,
            true,
        )
        .unwrap();
        assert_eq!(rw.layout, vk::ImageLayout::GENERAL);

        let sampled_twice =
            RgAccess::from_uses(RgUseFlags::SAMPLED | RgUseFlags::INPUT_ATTACHMENT, RgPassType::Graphics, true)
                .unwrap();
        assert_eq!(sampled_twice.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

        // 颜色附件同时被采样：layout 冲突
        assert!(
            RgAccess::from_uses(RgUseFlags::COLOR_ATTACHMENT | RgUseFlags::SAMPLED, RgPassType::Graphics, true)
                .is_none()
        );
    }

    #[test]
    fn test_sampled_keeps_descriptor_layout() {
        // 采样的 layout 必须与 bindless 描述符一致，不能被合并成其他 layout
        for other in [RgUseFlags::DEPTH_STENCIL_READ, RgUseFlags::STORAGE_LOAD, RgUseFlags::STORAGE_STORE] {
            assert!(RgAccess::from_uses(other | RgUseFlags::SAMPLED, RgPassType::Graphics, true).is_none());
        }
        let sampled = RgAccess::from_uses(RgUseFlags::SAMPLED, RgPassType::AsyncCompute, true).unwrap();
        assert_eq!(sampled.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_buffer_has_no_layout() {
        let access = RgAccess::from_uses(RgUseFlags::STORAGE_STORE, RgPassType::AsyncCompute, false).unwrap();
        assert_eq!(access.layout, vk::ImageLayout::UNDEFINED);
    }

    #[test]
    fn test_validate() {
        let both = RgUseFlags::DEPTH_STENCIL_READ | RgUseFlags::DEPTH_STENCIL_ATTACHMENT;
        assert!(both.validate(RgPassType::Graphics, true).is_some());
        assert!(RgUseFlags::COLOR_ATTACHMENT.validate(RgPassType::AsyncCompute, true).is_some());
        assert!(RgUseFlags::INDIRECT_ARGS.validate(RgPassType::Graphics, true).is_some());
        assert!(RgUseFlags::COPY_DST.validate(RgPassType::Transfer, false).is_none());
        assert!(RgUseFlags::SAMPLED.validate(RgPassType::Transfer, true).is_some());
    }
}
