use prism_render_interface::DataHandle;

/// 场景中的一个 instance
///
/// `mesh` 和 `material` 指向对应 manager 中的记录；被删除的 instance 记录仍然留在
/// buffer 中，只是清掉了 [`GpuInstance::FLAG_ACTIVE`]，shader 需要跳过它
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuInstance {
    pub model: glam::Mat4,
    pub inv_model: glam::Mat4,

    pub mesh: DataHandle,
    pub material: DataHandle,

    pub flags: u32,
    pub _padding: [u32; 3],
}

impl GpuInstance {
    pub const FLAG_ACTIVE: u32 = 1 << 0;
    pub const FLAG_CAST_SHADOW: u32 = 1 << 1;

    pub fn new(mesh: DataHandle, material: DataHandle, transform: glam::Mat4) -> Self {
        Self {
            model: transform,
            inv_model: transform.inverse(),
            mesh,
            material,
            flags: Self::FLAG_ACTIVE | Self::FLAG_CAST_SHADOW,
            _padding: [0; 3],
        }
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.flags & Self::FLAG_ACTIVE != 0
    }

    /// 同时更新逆矩阵
    #[inline]
    pub fn set_transform(&mut self, transform: glam::Mat4) {
        self.model = transform;
        self.inv_model = transform.inverse();
    }
}
