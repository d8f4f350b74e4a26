use prism_render_interface::DataHandle;

/// [`GpuSceneData`] 中能记录的 instance slot 数量上限
pub const MAX_INSTANCE_SLOTS: usize = 16;

/// 场景的根记录，shader 从这里找到其他所有数据
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuSceneData {
    /// 未被删除的 instance 数量
    pub active_instance_count: u32,
    /// instance buffer 中的记录总数，包括已删除的
    pub instance_record_count: u32,
    pub mesh_count: u32,
    pub material_count: u32,

    pub ddgi_volume_count: u32,
    pub instance_slot_count: u32,
    /// 每个 instance slot 的记录数
    pub instance_slot_size: u32,
    pub _padding: u32,

    pub primary_ddgi_volume: DataHandle,
    pub _padding_1: [u32; 2],

    /// 各个 instance slot 的 bindless binding
    pub instance_slot_bindings: [u32; MAX_INSTANCE_SLOTS],
}

impl Default for GpuSceneData {
    fn default() -> Self {
        Self {
            primary_ddgi_volume: DataHandle::INVALID,
            instance_slot_bindings: [u32::MAX; MAX_INSTANCE_SLOTS],
            ..bytemuck::Zeroable::zeroed()
        }
    }
}
