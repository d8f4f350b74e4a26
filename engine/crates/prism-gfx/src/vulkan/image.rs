use ash::vk;
use vk_mem::Alloc;

use crate::resources::format::GfxFormatUtils;
use crate::resources::handles::GfxImageTarget;
use crate::resources::render_target_cache::GfxRenderTargetKey;

/// 渲染图使用的 2D render target：image + 覆盖整个 image 的 view
///
/// 不实现 Drop，必须通过 [`GfxRenderImage::destroy`] 显式销毁
pub struct GfxRenderImage {
    image: vk::Image,
    allocation: vk_mem::Allocation,
    view: vk::ImageView,

    target: GfxImageTarget,
}
// new & init
impl GfxRenderImage {
    pub fn new(
        device: &ash::Device,
        allocator: &vk_mem::Allocator,
        key: &GfxRenderTargetKey,
        usage: vk::ImageUsageFlags,
    ) -> anyhow::Result<Self> {
        anyhow::ensure!(key.width > 0 && key.height > 0, "render target with zero extent: {:?}", key);

        let image_ci = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(key.format)
            .extent(vk::Extent3D {
                width: key.width,
                height: key.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let alloc_ci = vk_mem::AllocationCreateInfo {
            usage: vk_mem::MemoryUsage::AutoPreferDevice,
            ..Default::default()
        };
        let (image, mut allocation) = unsafe { allocator.create_image(&image_ci, &alloc_ci)? };

        let view_ci = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(key.format)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: GfxFormatUtils::infer_aspect(key.format),
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        let view = match unsafe { device.create_image_view(&view_ci, None) } {
            Ok(view) => view,
            Err(e) => {
                unsafe { allocator.destroy_image(image, &mut allocation) };
                return Err(e.into());
            }
        };

        log::debug!("create render target {:?}", key);
        Ok(Self {
            image,
            allocation,
            view,
            target: GfxImageTarget {
                image,
                view,
                format: key.format,
                extent: vk::Extent2D {
                    width: key.width,
                    height: key.height,
                },
                sampled_index: None,
                storage_index: None,
            },
        })
    }

    /// 记录 bindless 下标
    pub fn set_bindless_indices(&mut self, sampled_index: Option<u32>, storage_index: Option<u32>) {
        self.target.sampled_index = sampled_index;
        self.target.storage_index = storage_index;
    }
}
// destroy
impl GfxRenderImage {
    pub fn destroy(mut self, device: &ash::Device, allocator: &vk_mem::Allocator) {
        unsafe {
            device.destroy_image_view(self.view, None);
            allocator.destroy_image(self.image, &mut self.allocation);
        }
    }
}
// getters
impl GfxRenderImage {
    #[inline]
    pub fn target(&self) -> GfxImageTarget {
        self.target
    }
}
