use ash::vk;

/// attachment 的 clear 值
///
/// `vk::ClearValue` 是 union，这里换成 enum 方便比较和打印
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum GfxClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

impl GfxClearValue {
    pub const BLACK: Self = Self::Color([0.0, 0.0, 0.0, 1.0]);
    /// reverse-z 之外的常规深度
    pub const DEPTH_ONE: Self = Self::DepthStencil { depth: 1.0, stencil: 0 };

    pub fn vk_clear_value(&self) -> vk::ClearValue {
        match *self {
            Self::Color(color) => vk::ClearValue {
                color: vk::ClearColorValue { float32: color },
            },
            Self::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

/// dynamic rendering 的一个 attachment
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GfxRenderingAttachment {
    pub view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub clear_value: Option<GfxClearValue>,
}

impl GfxRenderingAttachment {
    /// 保留原内容
    pub fn load(view: vk::ImageView, layout: vk::ImageLayout) -> Self {
        Self {
            view,
            layout,
            load_op: vk::AttachmentLoadOp::LOAD,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_value: None,
        }
    }

    pub fn clear(view: vk::ImageView, layout: vk::ImageLayout, clear_value: GfxClearValue) -> Self {
        Self {
            view,
            layout,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            clear_value: Some(clear_value),
        }
    }

    /// 只读的 attachment 不需要写回
    pub fn read_only(mut self) -> Self {
        self.store_op = vk::AttachmentStoreOp::NONE;
        self
    }

    fn vk_info(&self) -> vk::RenderingAttachmentInfo<'static> {
        vk::RenderingAttachmentInfo::default()
            .image_view(self.view)
            .image_layout(self.layout)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .clear_value(self.clear_value.map(|c| c.vk_clear_value()).unwrap_or_default())
    }
}

/// dynamic rendering 的参数
///
/// attachment 的顺序就是 shader 中 location 的顺序
#[derive(Clone, Debug, PartialEq, Default)]
pub struct GfxRenderingInfo {
    pub render_area: vk::Rect2D,
    pub color_attachments: Vec<GfxRenderingAttachment>,
    pub depth_attachment: Option<GfxRenderingAttachment>,
    pub stencil_attachment: Option<GfxRenderingAttachment>,
}

impl GfxRenderingInfo {
    pub fn new(extent: vk::Extent2D) -> Self {
        Self {
            render_area: vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent,
            },
            ..Default::default()
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.color_attachments.is_empty() && self.depth_attachment.is_none() && self.stencil_attachment.is_none()
    }

    /// 转换为 vk 结构体，结果中的指针引用 `storage`
    pub fn fill_vk_info<'a>(&self, storage: &'a mut GfxRenderingInfoStorage) -> vk::RenderingInfo<'a> {
        storage.colors = self.color_attachments.iter().map(|a| a.vk_info()).collect();
        storage.depth = self.depth_attachment.map(|a| a.vk_info());
        storage.stencil = self.stencil_attachment.map(|a| a.vk_info());

        let mut info = vk::RenderingInfo::default()
            .render_area(self.render_area)
            .layer_count(1)
            .color_attachments(&storage.colors);
        if let Some(depth) = storage.depth.as_ref() {
            info = info.depth_attachment(depth);
        }
        if let Some(stencil) = storage.stencil.as_ref() {
            info = info.stencil_attachment(stencil);
        }
        info
    }
}

/// `vk::RenderingInfo` 引用的 attachment 数组的存放位置
#[derive(Default)]
pub struct GfxRenderingInfoStorage {
    colors: Vec<vk::RenderingAttachmentInfo<'static>>,
    depth: Option<vk::RenderingAttachmentInfo<'static>>,
    stencil: Option<vk::RenderingAttachmentInfo<'static>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_fill_vk_info() {
        let mut info = GfxRenderingInfo::new(vk::Extent2D { width: 64, height: 32 });
        assert!(info.is_empty());

        info.color_attachments.push(GfxRenderingAttachment::clear(
            vk::ImageView::from_raw(1),
            vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            GfxClearValue::BLACK,
        ));
        info.depth_attachment = Some(GfxRenderingAttachment::load(
            vk::ImageView::from_raw(2),
            vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        ));

        let mut storage = GfxRenderingInfoStorage::default();
        let vk_info = info.fill_vk_info(&mut storage);
        assert_eq!(vk_info.color_attachment_count, 1);
        assert_eq!(vk_info.render_area.extent.width, 64);
        assert!(!vk_info.p_depth_attachment.is_null());
        assert!(vk_info.p_stencil_attachment.is_null());
    }
}
