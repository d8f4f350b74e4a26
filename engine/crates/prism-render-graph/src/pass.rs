//! Pass 表与 pass 的声明接口

use ash::vk;
use prism_gfx::commands::queue::GfxQueueType;
use prism_gfx::commands::recorder::GfxCommandRecorder;
use prism_gfx::resources::handles::{GfxBufferTarget, GfxImageTarget};

use crate::barrier::RgPassBarriers;
use crate::resource::{RgAttachment, RgBufferAttachment, RgImageAttachment, RgResourceId, RgResourceTable};
use crate::resource_usage::{RgReadType, RgUseFlags, RgWriteType};

/// pass 的 id，等于它的提交顺序
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RgPassId(pub u32);

impl RgPassId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RgPassType {
    Graphics,
    AsyncCompute,
    Transfer,
}

impl RgPassType {
    /// pass 提交到的队列
    #[inline]
    pub fn queue_type(self) -> GfxQueueType {
        match self {
            Self::Graphics => GfxQueueType::Graphics,
            Self::AsyncCompute => GfxQueueType::Compute,
            Self::Transfer => GfxQueueType::Transfer,
        }
    }
}

/// pass 的一个读声明
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RgRead {
    pub resource: RgResourceId,
    pub ty: RgReadType,
    /// 每帧解析：bindless 下标，或者 attachment 的位置
    pub binding: Option<u32>,
}

/// pass 的一个写声明
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RgWrite {
    pub resource: RgResourceId,
    pub ty: RgWriteType,
    pub binding: Option<u32>,
}

/// 录制回调，参数为命令录制器和 pass 的上下文
pub type RgRenderFn<'a> = Box<dyn FnMut(&mut dyn GfxCommandRecorder, &RgPassContext) + 'a>;

pub(crate) struct RgRenderCallback<'a> {
    /// 为 true 时，执行器会在 dynamic rendering 内调用这个回调
    pub(crate) uses_dynamic_rendering: bool,
    pub(crate) func: RgRenderFn<'a>,
}

pub struct RgPass<'a> {
    id: RgPassId,
    name: String,
    ty: RgPassType,

    pub(crate) reads: Vec<RgRead>,
    pub(crate) writes: Vec<RgWrite>,
    pub(crate) callbacks: Vec<RgRenderCallback<'a>>,
    pub(crate) barriers: RgPassBarriers,
}

// new & init
impl<'a> RgPass<'a> {
    pub(crate) fn new(id: RgPassId, name: String, ty: RgPassType) -> Self {
        Self {
            id,
            name,
            ty,
            reads: Vec::new(),
            writes: Vec::new(),
            callbacks: Vec::new(),
            barriers: RgPassBarriers::default(),
        }
    }
}

// getters
impl RgPass<'_> {
    #[inline]
    pub fn id(&self) -> RgPassId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn ty(&self) -> RgPassType {
        self.ty
    }

    #[inline]
    pub fn reads(&self) -> &[RgRead] {
        &self.reads
    }

    #[inline]
    pub fn writes(&self) -> &[RgWrite] {
        &self.writes
    }

    #[inline]
    pub fn barriers(&self) -> &RgPassBarriers {
        &self.barriers
    }

    #[inline]
    pub fn callback_count(&self) -> usize {
        self.callbacks.len()
    }

    /// 是否有需要绑定为 attachment 的资源
    pub fn has_attachments(&self) -> bool {
        self.writes
            .iter()
            .any(|w| matches!(w.ty, RgWriteType::ColorAttachment | RgWriteType::DepthStencilAttachment))
            || self.reads.iter().any(|r| r.ty == RgReadType::DepthStencilAttachment)
    }
}

/// 声明 pass 的读写以及录制回调
///
/// 由 [`crate::RenderGraph::add_pass`] 返回，只在 Setup 阶段存在
pub struct RgPassBuilder<'g, 'a> {
    pub(crate) resources: &'g mut RgResourceTable,
    pub(crate) pass: &'g mut RgPass<'a>,
}

// 通用的读写声明
impl<'a> RgPassBuilder<'_, 'a> {
    #[inline]
    pub fn id(&self) -> RgPassId {
        self.pass.id
    }

    /// 声明读取，同一个 (资源, 方式) 只登记一次
    pub fn read(&mut self, name: &str, ty: RgReadType) -> RgResourceId {
        let resource = self.resources.get_or_create(name);
        if ty == RgReadType::DepthStencilAttachment {
            assert!(
                !self.pass.writes.iter().any(|w| w.resource == resource && w.ty == RgWriteType::DepthStencilAttachment),
                "pass '{}' declares '{}' as both depth stencil read and write",
                self.pass.name,
                name
            );
        }
        if !self.pass.reads.iter().any(|r| r.resource == resource && r.ty == ty) {
            let binding = (ty == RgReadType::DepthStencilAttachment).then_some(0);
            self.pass.reads.push(RgRead {
                resource,
                ty,
                binding,
            });
        }
        self.resources.get_mut(resource).add_reader(self.pass.id, ty.into());
        resource
    }

    /// 声明写入，同一个 (资源, 方式) 只登记一次
    pub fn write(&mut self, name: &str, ty: RgWriteType) -> RgResourceId {
        let resource = self.resources.get_or_create(name);
        if ty == RgWriteType::DepthStencilAttachment {
            assert!(
                !self.pass.reads.iter().any(|r| r.resource == resource && r.ty == RgReadType::DepthStencilAttachment),
                "pass '{}' declares '{}' as both depth stencil read and write",
                self.pass.name,
                name
            );
            assert!(
                !self
                    .pass
                    .writes
                    .iter()
                    .any(|w| w.resource != resource && w.ty == RgWriteType::DepthStencilAttachment),
                "pass '{}' has more than one depth stencil attachment",
                self.pass.name
            );
        }
        if !self.pass.writes.iter().any(|w| w.resource == resource && w.ty == ty) {
            // attachment 的位置在声明时就确定了
            let binding = match ty {
                RgWriteType::ColorAttachment => Some(
                    self.pass.writes.iter().filter(|w| w.ty == RgWriteType::ColorAttachment).count() as u32,
                ),
                RgWriteType::DepthStencilAttachment => Some(0),
                _ => None,
            };
            self.pass.writes.push(RgWrite {
                resource,
                ty,
                binding,
            });
        }
        self.resources.get_mut(resource).add_writer(self.pass.id, ty.into());
        resource
    }

    /// 注册录制回调，按注册顺序调用
    pub fn add_render_function(
        &mut self,
        uses_dynamic_rendering: bool,
        func: impl FnMut(&mut dyn GfxCommandRecorder, &RgPassContext) + 'a,
    ) {
        self.pass.callbacks.push(RgRenderCallback {
            uses_dynamic_rendering,
            func: Box::new(func),
        });
    }
}

// 便捷的读写声明
impl RgPassBuilder<'_, '_> {
    #[inline]
    pub fn read_sampled(&mut self, name: &str) -> RgResourceId {
        self.read(name, RgReadType::Sampled)
    }

    #[inline]
    pub fn read_storage(&mut self, name: &str) -> RgResourceId {
        self.read(name, RgReadType::StorageLoad)
    }

    /// 只读的深度附件
    #[inline]
    pub fn read_depth(&mut self, name: &str) -> RgResourceId {
        self.read(name, RgReadType::DepthStencilAttachment)
    }

    #[inline]
    pub fn read_indirect_args(&mut self, name: &str) -> RgResourceId {
        self.read(name, RgReadType::IndirectArgs)
    }

    pub fn write_color(&mut self, name: &str, attachment: RgImageAttachment) -> RgResourceId {
        self.resources.describe(name, RgAttachment::Image(attachment));
        self.write(name, RgWriteType::ColorAttachment)
    }

    pub fn write_depth(&mut self, name: &str, attachment: RgImageAttachment) -> RgResourceId {
        self.resources.describe(name, RgAttachment::Image(attachment));
        self.write(name, RgWriteType::DepthStencilAttachment)
    }

    pub fn write_storage_image(&mut self, name: &str, attachment: RgImageAttachment) -> RgResourceId {
        self.resources.describe(name, RgAttachment::Image(attachment));
        self.write(name, RgWriteType::StorageStore)
    }

    pub fn write_storage_buffer(&mut self, name: &str, attachment: RgBufferAttachment) -> RgResourceId {
        self.resources.describe(name, RgAttachment::Buffer(attachment));
        self.write(name, RgWriteType::StorageStore)
    }

    /// 写入当前帧的 swapchain image，最后一次访问之后会转换到 PRESENT_SRC
    pub fn write_swapchain(&mut self) -> RgResourceId {
        self.resources.swapchain();
        self.write(RgResourceTable::SWAPCHAIN_NAME, RgWriteType::ColorAttachment)
    }
}

/// 录制回调拿到的上下文
///
/// 可以查询 pass 的读写在本帧解析得到的 binding 和物理资源
pub struct RgPassContext<'p> {
    pub(crate) pass_id: RgPassId,
    pub(crate) pass_name: &'p str,
    pub(crate) reads: &'p [RgRead],
    pub(crate) writes: &'p [RgWrite],
    pub(crate) resources: &'p RgResourceTable,
    pub(crate) render_extent: vk::Extent2D,
}

impl RgPassContext<'_> {
    #[inline]
    pub fn pass_id(&self) -> RgPassId {
        self.pass_id
    }

    #[inline]
    pub fn pass_name(&self) -> &str {
        self.pass_name
    }

    /// attachment 的尺寸；没有 attachment 的 pass 为 swapchain 的尺寸
    #[inline]
    pub fn render_extent(&self) -> vk::Extent2D {
        self.render_extent
    }

    fn resource_id(&self, name: &str) -> RgResourceId {
        self.resources
            .find(name)
            .unwrap_or_else(|| panic!("pass '{}' queries unknown resource '{}'", self.pass_name, name))
    }

    /// 读声明在本帧的 binding
    ///
    /// - Sampled / InputAttachment：bindless sampled image 下标
    /// - StorageLoad：bindless storage image / buffer 下标
    /// - DepthStencilAttachment：0
    pub fn get_read_bind(&self, name: &str, ty: RgReadType) -> u32 {
        let resource = self.resource_id(name);
        let read = self
            .reads
            .iter()
            .find(|r| r.resource == resource && r.ty == ty)
            .unwrap_or_else(|| panic!("pass '{}' does not read '{}' as {:?}", self.pass_name, name, ty));
        read.binding
            .unwrap_or_else(|| panic!("read '{}' ({:?}) of pass '{}' has no binding", name, ty, self.pass_name))
    }

    /// 写声明在本帧的 binding
    ///
    /// - ColorAttachment：color attachment 的位置
    /// - DepthStencilAttachment：0
    /// - StorageStore：bindless storage image / buffer 下标
    pub fn get_write_bind(&self, name: &str, ty: RgWriteType) -> u32 {
        let resource = self.resource_id(name);
        let write = self
            .writes
            .iter()
            .find(|w| w.resource == resource && w.ty == ty)
            .unwrap_or_else(|| panic!("pass '{}' does not write '{}' as {:?}", self.pass_name, name, ty));
        write
            .binding
            .unwrap_or_else(|| panic!("write '{}' ({:?}) of pass '{}' has no binding", name, ty, self.pass_name))
    }

    /// 资源在本帧解析得到的 image
    pub fn image(&self, name: &str) -> &GfxImageTarget {
        let resource = self.resources.get(self.resource_id(name));
        resource
            .image()
            .unwrap_or_else(|| panic!("resource '{}' is not a resolved image", resource.name()))
    }

    pub fn buffer(&self, name: &str) -> &GfxBufferTarget {
        let resource = self.resources.get(self.resource_id(name));
        resource
            .buffer()
            .unwrap_or_else(|| panic!("resource '{}' is not a resolved buffer", resource.name()))
    }
}

/// 需要 bindless 下标的读写方式
pub(crate) fn bindless_binding_of(
    uses: RgUseFlags,
    image: Option<&GfxImageTarget>,
    buffer: Option<&GfxBufferTarget>,
) -> Option<u32> {
    if uses.intersects(RgUseFlags::SAMPLED | RgUseFlags::INPUT_ATTACHMENT) {
        return image.and_then(|i| i.sampled_index);
    }
    if uses.intersects(RgUseFlags::STORAGE_LOAD | RgUseFlags::STORAGE_STORE) {
        return image.and_then(|i| i.storage_index).or_else(|| buffer.and_then(|b| b.storage_index));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_builder<'g>(
        resources: &'g mut RgResourceTable,
        pass: &'g mut RgPass<'static>,
    ) -> RgPassBuilder<'g, 'static> {
        RgPassBuilder { resources, pass }
    }

    #[test]
    fn test_color_attachment_locations() {
        let mut resources = RgResourceTable::new();
        let mut pass = RgPass::new(RgPassId(0), "gbuffer".to_string(), RgPassType::Graphics);
        let mut builder = new_builder(&mut resources, &mut pass);

        let format = vk::Format::R8G8B8A8_UNORM;
        builder.write_color("albedo", RgImageAttachment::swapchain_relative(format));
        builder.write_color("normal", RgImageAttachment::swapchain_relative(format));
        // 重复声明不会新增写入
        builder.write_color("albedo", RgImageAttachment::swapchain_relative(format));

        assert_eq!(pass.writes.len(), 2);
        assert_eq!(pass.writes[0].binding, Some(0));
        assert_eq!(pass.writes[1].binding, Some(1));
        assert!(pass.has_attachments());
    }

    #[test]
    fn test_read_before_describe() {
        let mut resources = RgResourceTable::new();
        let mut pass = RgPass::new(RgPassId(0), "lighting".to_string(), RgPassType::Graphics);
        let mut builder = new_builder(&mut resources, &mut pass);
        let id = builder.read_sampled("albedo");
        assert!(resources.get(id).attachment().is_none());
        assert_eq!(resources.get(id).readers(), &[RgPassId(0)]);
    }

    #[test]
    #[should_panic(expected = "both depth stencil read and write")]
    fn test_depth_read_and_write_rejected() {
        let mut resources = RgResourceTable::new();
        let mut pass = RgPass::new(RgPassId(0), "forward".to_string(), RgPassType::Graphics);
        let mut builder = new_builder(&mut resources, &mut pass);
        builder.write_depth("depth", RgImageAttachment::swapchain_relative(vk::Format::D32_SFLOAT));
        builder.read_depth("depth");
    }

    #[test]
    fn test_bindless_binding_of() {
        use ash::vk::Handle;
        let image = GfxImageTarget {
            image: vk::Image::from_raw(1),
            view: vk::ImageView::from_raw(2),
            format: vk::Format::R8G8B8A8_UNORM,
            extent: vk::Extent2D { width: 1, height: 1 },
            sampled_index: Some(5),
            storage_index: Some(9),
        };
        assert_eq!(bindless_binding_of(RgUseFlags::SAMPLED, Some(&image), None), Some(5));
        assert_eq!(bindless_binding_of(RgUseFlags::STORAGE_STORE, Some(&image), None), Some(9));
        assert_eq!(bindless_binding_of(RgUseFlags::COPY_SRC, Some(&image), None), None);
    }
}
