//! 渲染图的所有者：资源表、pass 表和状态机

use ash::vk;
use itertools::Itertools;
use prism_gfx::resources::handles::{GfxBufferTarget, GfxImageTarget};

use crate::graph::RgDependencyGraph;
use crate::pass::{RgPass, RgPassBuilder, RgPassId, RgPassType};
use crate::resource::{RgAttachment, RgPhysicalResource, RgResource, RgResourceId, RgResourceTable};
use crate::resource_state::{RgBufferState, RgImageState};
use crate::settings::RgSettings;
use crate::synthesis::RgBarrierSynthesizer;

/// 渲染图的阶段，只能前进
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RgState {
    /// 登记资源和 pass
    Setup,
    /// 推导 barrier
    Build,
    /// 每帧执行
    Execute,
}

/// 声明式渲染图
///
/// `'a` 是录制回调可以借用的外部数据的生命周期，
/// 回调可以直接引用外部的 pipeline、geometry 等资源。
pub struct RenderGraph<'a> {
    pub(crate) state: RgState,
    pub(crate) settings: RgSettings,

    pub(crate) resources: RgResourceTable,
    pub(crate) passes: Vec<RgPass<'a>>,
    pub(crate) dependency_graph: RgDependencyGraph,

    pub(crate) frame_count: u64,
}

impl Default for RenderGraph<'_> {
    fn default() -> Self {
        Self::new()
    }
}

// new & init
impl<'a> RenderGraph<'a> {
    pub fn new() -> Self {
        Self::with_settings(RgSettings::default())
    }

    pub fn with_settings(settings: RgSettings) -> Self {
        Self {
            state: RgState::Setup,
            settings,
            resources: RgResourceTable::new(),
            passes: Vec::new(),
            dependency_graph: RgDependencyGraph::default(),
            frame_count: 0,
        }
    }
}

// getters
impl<'a> RenderGraph<'a> {
    #[inline]
    pub fn state(&self) -> RgState {
        self.state
    }

    #[inline]
    pub fn settings(&self) -> &RgSettings {
        &self.settings
    }

    #[inline]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    #[inline]
    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    #[inline]
    pub fn pass(&self, id: RgPassId) -> &RgPass<'a> {
        &self.passes[id.index()]
    }

    pub fn find_pass(&self, name: &str) -> Option<&RgPass<'a>> {
        self.passes.iter().find(|p| p.name() == name)
    }

    pub fn passes(&self) -> impl Iterator<Item = &RgPass<'a>> {
        self.passes.iter()
    }

    #[inline]
    pub fn resource(&self, name: &str) -> Option<&RgResource> {
        self.resources.by_name(name)
    }

    #[inline]
    pub fn resource_by_id(&self, id: RgResourceId) -> &RgResource {
        self.resources.get(id)
    }

    pub fn resources(&self) -> impl Iterator<Item = &RgResource> {
        self.resources.iter()
    }

    #[inline]
    pub fn swapchain_id(&self) -> Option<RgResourceId> {
        self.resources.swapchain_id()
    }

    /// Build 之后才有内容
    #[inline]
    pub fn dependency_graph(&self) -> &RgDependencyGraph {
        &self.dependency_graph
    }

    /// 已经执行的帧数
    #[inline]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

// Setup 阶段
impl<'a> RenderGraph<'a> {
    #[inline]
    fn assert_setup(&self, operation: &str) {
        assert_eq!(self.state, RgState::Setup, "render graph: {} is only allowed during setup", operation);
    }

    /// 添加 pass，返回的 builder 用于声明读写和录制回调
    pub fn add_pass(&mut self, name: &str, ty: RgPassType) -> RgPassBuilder<'_, 'a> {
        self.assert_setup("add_pass");
        let index = self.passes.len();
        self.passes.push(RgPass::new(RgPassId(index as u32), name.to_string(), ty));
        RgPassBuilder {
            resources: &mut self.resources,
            pass: &mut self.passes[index],
        }
    }

    /// 描述一个资源；同名资源已经描述过时必须一致
    pub fn add_resource(&mut self, name: &str, attachment: RgAttachment) -> RgResourceId {
        self.assert_setup("add_resource");
        self.resources.describe(name, attachment)
    }

    /// 按名字获取资源 id，不存在时创建占位资源
    pub fn get_resource(&mut self, name: &str) -> RgResourceId {
        self.assert_setup("get_resource");
        self.resources.get_or_create(name)
    }

    /// 导入外部 image，物理资源通过 [`Self::set_imported_image`] 每帧提供
    pub fn import_image(&mut self, name: &str, format: vk::Format, initial_state: RgImageState) -> RgResourceId {
        self.assert_setup("import_image");
        self.resources.import_image(name, format, initial_state)
    }

    pub fn import_buffer(&mut self, name: &str, size: vk::DeviceSize, initial_state: RgBufferState) -> RgResourceId {
        self.assert_setup("import_buffer");
        self.resources.import_buffer(name, size, initial_state)
    }
}

// 导入资源的物理句柄，任意阶段都可以更新
impl RenderGraph<'_> {
    pub fn set_imported_image(&mut self, id: RgResourceId, target: GfxImageTarget) {
        let resource = self.resources.get_mut(id);
        assert!(resource.is_imported() && resource.is_image(), "'{}' is not an imported image", resource.name());
        resource.physical = Some(RgPhysicalResource::Image(target));
    }

    pub fn set_imported_buffer(&mut self, id: RgResourceId, target: GfxBufferTarget) {
        let resource = self.resources.get_mut(id);
        assert!(resource.is_imported() && !resource.is_image(), "'{}' is not an imported buffer", resource.name());
        resource.physical = Some(RgPhysicalResource::Buffer(target));
    }
}

// Build 阶段
impl RenderGraph<'_> {
    /// 推导所有 barrier，之后进入 Execute 阶段
    ///
    /// 只能调用一次；拓扑变化时需要重新创建渲染图
    pub fn build(&mut self) {
        let _span = tracy_client::span!("RenderGraph::build");
        assert_eq!(self.state, RgState::Setup, "render graph: build called twice");
        self.state = RgState::Build;

        let synthesizer = RgBarrierSynthesizer::new(&mut self.passes, &self.settings);
        self.dependency_graph = synthesizer.synthesize(&self.resources);

        let barrier_count: usize = self.passes.iter().map(|p| p.barriers().len()).sum();
        log::info!(
            "render graph built: {} passes, {} resources, {} barriers, {} dependencies",
            self.passes.len(),
            self.resources.len(),
            barrier_count,
            self.dependency_graph.edge_count()
        );
        log::debug!("render graph pass order: [{}]", self.passes.iter().map(|p| p.name()).join(", "));

        self.state = RgState::Execute;
        if self.settings.log_execution_plan {
            self.print_execution_plan();
        }
    }
}
