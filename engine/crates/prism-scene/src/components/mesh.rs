use super::INVALID_BINDLESS_INDEX;

/// 一个 mesh 的几何信息
///
/// 顶点和索引数据位于 bindless storage buffer 中，这里只记录下标和范围
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuMesh {
    pub aabb_min: glam::Vec3,
    pub vertex_count: u32,
    pub aabb_max: glam::Vec3,
    pub index_count: u32,

    pub vertex_buffer: u32,
    pub index_buffer: u32,
    pub first_index: u32,
    pub vertex_offset: i32,
}

impl Default for GpuMesh {
    fn default() -> Self {
        Self {
            aabb_min: glam::Vec3::ZERO,
            vertex_count: 0,
            aabb_max: glam::Vec3::ZERO,
            index_count: 0,
            vertex_buffer: INVALID_BINDLESS_INDEX,
            index_buffer: INVALID_BINDLESS_INDEX,
            first_index: 0,
            vertex_offset: 0,
        }
    }
}

impl GpuMesh {
    pub fn new(vertex_buffer: u32, vertex_count: u32, index_buffer: u32, index_count: u32) -> Self {
        Self {
            vertex_buffer,
            vertex_count,
            index_buffer,
            index_count,
            ..Default::default()
        }
    }

    #[inline]
    pub fn with_bounds(mut self, aabb_min: glam::Vec3, aabb_max: glam::Vec3) -> Self {
        self.aabb_min = aabb_min;
        self.aabb_max = aabb_max;
        self
    }

    #[inline]
    pub fn triangle_count(&self) -> u32 {
        self.index_count / 3
    }
}
