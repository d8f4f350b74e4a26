use super::INVALID_BINDLESS_INDEX;

/// DDGI 探针体积
///
/// 探针均匀排布在以 `origin` 为中心的网格上
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuDdgiVolume {
    pub origin: glam::Vec3,
    pub hysteresis: f32,

    pub probe_spacing: glam::Vec3,
    pub max_ray_distance: f32,

    pub probe_counts: glam::UVec3,
    pub rays_per_probe: u32,

    /// bindless storage image 下标
    pub irradiance_texture: u32,
    pub distance_texture: u32,
    pub _padding: [u32; 2],
}

impl GpuDdgiVolume {
    pub const DEFAULT_HYSTERESIS: f32 = 0.97;
    pub const DEFAULT_RAYS_PER_PROBE: u32 = 256;

    pub fn new(origin: glam::Vec3, probe_spacing: glam::Vec3, probe_counts: glam::UVec3) -> Self {
        Self {
            origin,
            hysteresis: Self::DEFAULT_HYSTERESIS,
            probe_spacing,
            max_ray_distance: probe_spacing.length() * 1.5,
            probe_counts,
            rays_per_probe: Self::DEFAULT_RAYS_PER_PROBE,
            irradiance_texture: INVALID_BINDLESS_INDEX,
            distance_texture: INVALID_BINDLESS_INDEX,
            _padding: [0; 2],
        }
    }

    #[inline]
    pub fn probe_count(&self) -> u32 {
        self.probe_counts.x * self.probe_counts.y * self.probe_counts.z
    }

    /// 网格在世界空间中的半边长
    #[inline]
    pub fn half_extent(&self) -> glam::Vec3 {
        (self.probe_counts.as_vec3() - glam::Vec3::ONE).max(glam::Vec3::ZERO) * self.probe_spacing * 0.5
    }

    /// 第 `(x, y, z)` 个探针的世界坐标
    pub fn probe_position(&self, probe: glam::UVec3) -> glam::Vec3 {
        self.origin - self.half_extent() + probe.as_vec3() * self.probe_spacing
    }
}
