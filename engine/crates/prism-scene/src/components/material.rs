use super::INVALID_BINDLESS_INDEX;

/// PBR 材质参数
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuMaterial {
    pub base_color: glam::Vec4,
    pub emissive: glam::Vec4,

    pub metallic: f32,
    pub roughness: f32,
    pub opaque: f32,
    /// bindless sampled image 下标
    pub diffuse_map: u32,

    pub normal_map: u32,
    pub _padding: [u32; 3],
}

impl Default for GpuMaterial {
    fn default() -> Self {
        Self {
            base_color: glam::Vec4::ONE,
            emissive: glam::Vec4::ZERO,
            metallic: 0.0,
            roughness: 0.5,
            opaque: 1.0,
            diffuse_map: INVALID_BINDLESS_INDEX,
            normal_map: INVALID_BINDLESS_INDEX,
            _padding: [0; 3],
        }
    }
}

impl GpuMaterial {
    pub fn from_base_color(base_color: glam::Vec4) -> Self {
        Self {
            base_color,
            ..Default::default()
        }
    }

    #[inline]
    pub fn has_diffuse_map(&self) -> bool {
        self.diffuse_map != INVALID_BINDLESS_INDEX
    }
}
