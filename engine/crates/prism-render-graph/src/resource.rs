//! 资源表
//!
//! 资源按名字登记，id 连续分配，在图的生命周期内不变。
//! 资源在第一次被引用时创建；读声明可能先于写声明出现，
//! 这时先创建一个没有描述的占位资源，等写入方声明描述时再补上。

use std::collections::HashMap;

use ash::vk;
use bitvec::vec::BitVec;
use prism_gfx::commands::rendering_info::GfxClearValue;
use prism_gfx::resources::handles::{GfxBufferTarget, GfxImageTarget};

use crate::pass::RgPassId;
use crate::resource_state::{RgBufferState, RgImageState};
use crate::resource_usage::RgUseFlags;

/// 资源在资源表中的 id
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RgResourceId(pub u32);

impl RgResourceId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// image 的尺寸策略
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RgSizePolicy {
    Absolute { width: u32, height: u32 },
    /// 相对于 swapchain 的缩放
    SwapchainRelative { scale_x: f32, scale_y: f32 },
}

impl RgSizePolicy {
    /// 计算实际尺寸，结果可能为 0，由调用者检查
    pub fn resolve(&self, swapchain_extent: vk::Extent2D) -> vk::Extent2D {
        match *self {
            Self::Absolute { width, height } => vk::Extent2D { width, height },
            Self::SwapchainRelative { scale_x, scale_y } => vk::Extent2D {
                width: (swapchain_extent.width as f32 * scale_x) as u32,
                height: (swapchain_extent.height as f32 * scale_y) as u32,
            },
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct RgImageAttachment {
    pub format: vk::Format,
    pub size: RgSizePolicy,
    /// 第一个写入者在本帧 clear 的值；None 表示不关心原内容
    pub clear: Option<GfxClearValue>,
}

impl RgImageAttachment {
    /// 和 swapchain 一样大
    pub fn swapchain_relative(format: vk::Format) -> Self {
        Self::scaled(format, 1.0, 1.0)
    }

    pub fn scaled(format: vk::Format, scale_x: f32, scale_y: f32) -> Self {
        Self {
            format,
            size: RgSizePolicy::SwapchainRelative { scale_x, scale_y },
            clear: None,
        }
    }

    pub fn absolute(format: vk::Format, width: u32, height: u32) -> Self {
        Self {
            format,
            size: RgSizePolicy::Absolute { width, height },
            clear: None,
        }
    }

    pub fn with_clear(mut self, clear: GfxClearValue) -> Self {
        self.clear = Some(clear);
        self
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RgBufferAttachment {
    pub size: vk::DeviceSize,
    /// 额外的 usage，会和从读写声明推断出的 usage 合并
    pub usage: vk::BufferUsageFlags,
}

impl RgBufferAttachment {
    pub fn new(size: vk::DeviceSize) -> Self {
        Self {
            size,
            usage: vk::BufferUsageFlags::empty(),
        }
    }
}

/// 资源的描述
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum RgAttachment {
    Image(RgImageAttachment),
    Buffer(RgBufferAttachment),
}

/// 资源的来源
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RgResourceOrigin {
    /// 由渲染图每帧向设备申请
    Transient,
    /// 外部资源，句柄由调用者提供
    Imported,
    /// 当前帧的 swapchain image
    Swapchain,
}

/// 本帧解析得到的物理资源
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RgPhysicalResource {
    Image(GfxImageTarget),
    Buffer(GfxBufferTarget),
}

pub struct RgResource {
    id: RgResourceId,
    name: String,

    /// None 表示只被引用过、还没有被描述的占位资源
    attachment: Option<RgAttachment>,
    origin: RgResourceOrigin,
    /// 第一次访问之前的状态，非 imported 资源为 UNDEFINED
    initial_state: RgImageState,

    /// 按 pass 顺序排列，不重复
    readers: Vec<RgPassId>,
    writers: Vec<RgPassId>,
    /// 每一种使用方式一个 bitset，下标为 pass id
    uses: Vec<BitVec>,

    pub(crate) physical: Option<RgPhysicalResource>,
}

// new & init
impl RgResource {
    fn new(id: RgResourceId, name: String) -> Self {
        Self {
            id,
            name,
            attachment: None,
            origin: RgResourceOrigin::Transient,
            initial_state: RgImageState::UNDEFINED,
            readers: Vec::new(),
            writers: Vec::new(),
            uses: vec![BitVec::new(); RgUseFlags::USE_COUNT],
            physical: None,
        }
    }
}

// getters
impl RgResource {
    #[inline]
    pub fn id(&self) -> RgResourceId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn attachment(&self) -> Option<&RgAttachment> {
        self.attachment.as_ref()
    }

    #[inline]
    pub fn origin(&self) -> RgResourceOrigin {
        self.origin
    }

    #[inline]
    pub fn is_swapchain(&self) -> bool {
        self.origin == RgResourceOrigin::Swapchain
    }

    #[inline]
    pub fn is_imported(&self) -> bool {
        self.origin == RgResourceOrigin::Imported
    }

    /// 占位资源按 image 处理
    #[inline]
    pub fn is_image(&self) -> bool {
        !matches!(self.attachment, Some(RgAttachment::Buffer(_)))
    }

    #[inline]
    pub fn initial_state(&self) -> RgImageState {
        self.initial_state
    }

    #[inline]
    pub fn readers(&self) -> &[RgPassId] {
        &self.readers
    }

    #[inline]
    pub fn writers(&self) -> &[RgPassId] {
        &self.writers
    }

    /// 某个 pass 对该资源的全部使用方式
    pub fn uses_of(&self, pass: RgPassId) -> RgUseFlags {
        self.uses
            .iter()
            .enumerate()
            .filter(|(_, bits)| bits.get(pass.index()).is_some_and(|b| *b))
            .fold(RgUseFlags::empty(), |acc, (index, _)| acc | RgUseFlags::from_use_index(index))
    }

    /// 所有 pass 的使用方式之和
    pub fn all_uses(&self) -> RgUseFlags {
        self.uses
            .iter()
            .enumerate()
            .filter(|(_, bits)| bits.any())
            .fold(RgUseFlags::empty(), |acc, (index, _)| acc | RgUseFlags::from_use_index(index))
    }

    /// 首个写入者，决定 attachment 的 load op
    #[inline]
    pub fn first_writer(&self) -> Option<RgPassId> {
        self.writers.first().copied()
    }

    /// 本帧解析得到的 image
    #[inline]
    pub fn image(&self) -> Option<&GfxImageTarget> {
        match self.physical.as_ref() {
            Some(RgPhysicalResource::Image(image)) => Some(image),
            _ => None,
        }
    }

    #[inline]
    pub fn buffer(&self) -> Option<&GfxBufferTarget> {
        match self.physical.as_ref() {
            Some(RgPhysicalResource::Buffer(buffer)) => Some(buffer),
            _ => None,
        }
    }
}

// tools
impl RgResource {
    fn record_use(&mut self, pass: RgPassId, flags: RgUseFlags) {
        for index in 0..RgUseFlags::USE_COUNT {
            if !flags.contains(RgUseFlags::from_use_index(index)) {
                continue;
            }
            let bits = &mut self.uses[index];
            if bits.len() <= pass.index() {
                bits.resize(pass.index() + 1, false);
            }
            bits.set(pass.index(), true);
        }
    }

    /// 同一个 pass 的多次声明只登记一次
    fn push_pass(list: &mut Vec<RgPassId>, pass: RgPassId) {
        match list.last() {
            Some(&last) if last == pass => {}
            Some(&last) => {
                assert!(last < pass, "passes must be declared in submission order: {:?} after {:?}", pass, last);
                list.push(pass);
            }
            None => list.push(pass),
        }
    }

    pub(crate) fn add_reader(&mut self, pass: RgPassId, flags: RgUseFlags) {
        Self::push_pass(&mut self.readers, pass);
        self.record_use(pass, flags);
    }

    pub(crate) fn add_writer(&mut self, pass: RgPassId, flags: RgUseFlags) {
        Self::push_pass(&mut self.writers, pass);
        self.record_use(pass, flags);
    }
}

/// 资源表，按名字查找，按 id 索引
#[derive(Default)]
pub struct RgResourceTable {
    resources: Vec<RgResource>,
    name_to_id: HashMap<String, RgResourceId>,
    swapchain: Option<RgResourceId>,
}

impl RgResourceTable {
    /// swapchain 资源固定的名字
    pub const SWAPCHAIN_NAME: &'static str = "swapchain";

    pub fn new() -> Self {
        Self::default()
    }
}

// getters
impl RgResourceTable {
    #[inline]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    #[inline]
    pub fn get(&self, id: RgResourceId) -> &RgResource {
        &self.resources[id.index()]
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: RgResourceId) -> &mut RgResource {
        &mut self.resources[id.index()]
    }

    #[inline]
    pub fn find(&self, name: &str) -> Option<RgResourceId> {
        self.name_to_id.get(name).copied()
    }

    #[inline]
    pub fn by_name(&self, name: &str) -> Option<&RgResource> {
        self.find(name).map(|id| self.get(id))
    }

    #[inline]
    pub fn swapchain_id(&self) -> Option<RgResourceId> {
        self.swapchain
    }

    pub fn iter(&self) -> impl Iterator<Item = &RgResource> {
        self.resources.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut RgResource> {
        self.resources.iter_mut()
    }
}

// update
impl RgResourceTable {
    /// 按名字查找资源，不存在时创建一个占位资源
    pub fn get_or_create(&mut self, name: &str) -> RgResourceId {
        if let Some(id) = self.find(name) {
            return id;
        }
        let id = RgResourceId(self.resources.len() as u32);
        self.resources.push(RgResource::new(id, name.to_string()));
        self.name_to_id.insert(name.to_string(), id);
        log::trace!("render graph resource created: {} -> {:?}", name, id);
        id
    }

    /// 描述一个资源；已经描述过的资源必须给出相同的描述
    pub fn describe(&mut self, name: &str, attachment: RgAttachment) -> RgResourceId {
        let id = self.get_or_create(name);
        let resource = self.get_mut(id);
        match resource.attachment {
            Some(existing) => assert!(
                existing == attachment,
                "resource '{}' described twice with different attachments: {:?} vs {:?}",
                name,
                existing,
                attachment
            ),
            None => resource.attachment = Some(attachment),
        }
        id
    }

    pub fn import_image(&mut self, name: &str, format: vk::Format, initial_state: RgImageState) -> RgResourceId {
        let id = self.describe(name, RgAttachment::Image(RgImageAttachment::swapchain_relative(format)));
        let resource = self.get_mut(id);
        resource.origin = RgResourceOrigin::Imported;
        resource.initial_state = initial_state;
        id
    }

    pub fn import_buffer(&mut self, name: &str, size: vk::DeviceSize, initial_state: RgBufferState) -> RgResourceId {
        let id = self.describe(name, RgAttachment::Buffer(RgBufferAttachment::new(size)));
        let resource = self.get_mut(id);
        resource.origin = RgResourceOrigin::Imported;
        resource.initial_state = initial_state.into();
        id
    }

    /// swapchain 资源只有一个，格式和尺寸在执行时由设备决定
    pub fn swapchain(&mut self) -> RgResourceId {
        if let Some(id) = self.swapchain {
            return id;
        }
        let id = self.describe(
            Self::SWAPCHAIN_NAME,
            RgAttachment::Image(RgImageAttachment::swapchain_relative(vk::Format::UNDEFINED)),
        );
        self.get_mut(id).origin = RgResourceOrigin::Swapchain;
        self.swapchain = Some(id);
        id
    }
}
