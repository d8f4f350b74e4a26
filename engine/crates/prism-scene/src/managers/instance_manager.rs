use prism_gfx::commands::recorder::GfxCommandRecorder;
use prism_gfx::device::GfxDevice;
use prism_render_interface::{DataHandle, DataManager};

use crate::components::instance::GpuInstance;
use crate::handles::InstanceHandle;
use crate::managers::named_data::NamedDataManager;

/// 每个 slot 的记录数
pub const INSTANCE_SLOT_SIZE: usize = 1024;

/// instance 的 bindless 管理
///
/// 删除 instance 时记录留在 buffer 中并被标记为非活动，
/// shader 遍历所有 instance slot 时根据 [`GpuInstance::FLAG_ACTIVE`] 跳过
pub struct InstanceManager {
    instances: NamedDataManager<InstanceHandle, GpuInstance, INSTANCE_SLOT_SIZE>,
}

impl Default for InstanceManager {
    fn default() -> Self {
        Self::new()
    }
}

// new & init
impl InstanceManager {
    pub fn new() -> Self {
        Self {
            instances: NamedDataManager::new("instances"),
        }
    }
}
// getters
impl InstanceManager {
    /// 存活的 instance 数量
    #[inline]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// buffer 中的记录数，包括已经删除的 instance
    #[inline]
    pub fn record_count(&self) -> usize {
        self.instances.data().len()
    }

    #[inline]
    pub fn slot_bindings(&self) -> Vec<u32> {
        self.instances.data().bindings()
    }

    /// 底层的数据管理器
    #[inline]
    pub fn data(&self) -> &DataManager<GpuInstance, INSTANCE_SLOT_SIZE> {
        self.instances.data()
    }

    #[inline]
    pub fn find(&self, name: &str) -> Option<InstanceHandle> {
        self.instances.find(name)
    }

    #[inline]
    pub fn instance(&self, handle: InstanceHandle) -> Option<&GpuInstance> {
        self.instances.get(handle)
    }

    #[inline]
    pub fn data_handle(&self, handle: InstanceHandle) -> Option<DataHandle> {
        self.instances.data_handle(handle)
    }

    /// 引用了 `mesh` 的存活 instance
    pub fn instances_of_mesh(&self, mesh: DataHandle) -> impl Iterator<Item = InstanceHandle> + '_ {
        self.instances.iter().filter(move |(_, _, record)| record.mesh == mesh).map(|(handle, _, _)| handle)
    }
}
// update
impl InstanceManager {
    pub fn add_instance<D: GfxDevice>(
        &mut self,
        device: &mut D,
        name: &str,
        mesh: DataHandle,
        material: DataHandle,
        transform: glam::Mat4,
    ) -> anyhow::Result<InstanceHandle> {
        self.instances.insert(device, name, GpuInstance::new(mesh, material, transform))
    }

    pub fn set_transform(&mut self, handle: InstanceHandle, transform: glam::Mat4) -> bool {
        self.instances.update(handle, |instance| instance.set_transform(transform))
    }

    pub fn set_material(&mut self, handle: InstanceHandle, material: DataHandle) -> bool {
        self.instances.update(handle, |instance| instance.material = material)
    }

    pub fn set_cast_shadow(&mut self, handle: InstanceHandle, cast_shadow: bool) -> bool {
        self.instances.update(handle, |instance| {
            if cast_shadow {
                instance.flags |= GpuInstance::FLAG_CAST_SHADOW;
            } else {
                instance.flags &= !GpuInstance::FLAG_CAST_SHADOW;
            }
        })
    }

    /// 删除 instance，GPU 记录被标记为非活动
    pub fn remove_instance(&mut self, handle: InstanceHandle) -> Option<DataHandle> {
        let data = self.instances.remove(handle)?;
        self.instances.record_mut(data).flags &= !GpuInstance::FLAG_ACTIVE;
        Some(data)
    }

    pub fn upload<D: GfxDevice>(
        &mut self,
        device: &mut D,
        recorder: &mut impl GfxCommandRecorder,
    ) -> anyhow::Result<bool> {
        self.instances.upload(device, recorder)
    }
}
// destroy
impl InstanceManager {
    pub fn destroy<D: GfxDevice>(&mut self, device: &mut D) {
        self.instances.destroy(device);
    }
}
