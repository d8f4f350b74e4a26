use ash::vk;

/// Vulkan 格式相关的工具类
pub struct GfxFormatUtils;
impl GfxFormatUtils {
    /// 根据 format 推断 barrier 和 view 使用的 aspect
    pub fn infer_aspect(format: vk::Format) -> vk::ImageAspectFlags {
        match format {
            vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
                vk::ImageAspectFlags::DEPTH
            }

            vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,

            vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            }

            _ => vk::ImageAspectFlags::COLOR,
        }
    }

    #[inline]
    pub fn is_depth_stencil(format: vk::Format) -> bool {
        !Self::infer_aspect(format).contains(vk::ImageAspectFlags::COLOR)
    }

    #[inline]
    pub fn has_stencil(format: vk::Format) -> bool {
        Self::infer_aspect(format).contains(vk::ImageAspectFlags::STENCIL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_aspect() {
        assert_eq!(GfxFormatUtils::infer_aspect(vk::Format::R8G8B8A8_UNORM), vk::ImageAspectFlags::COLOR);
        assert_eq!(GfxFormatUtils::infer_aspect(vk::Format::D32_SFLOAT), vk::ImageAspectFlags::DEPTH);
        assert_eq!(
            GfxFormatUtils::infer_aspect(vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert!(GfxFormatUtils::is_depth_stencil(vk::Format::S8_UINT));
        assert!(!GfxFormatUtils::has_stencil(vk::Format::D32_SFLOAT));
    }
}
