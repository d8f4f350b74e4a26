use ash::vk;
use itertools::Itertools;
use prism_gfx::commands::barrier::GfxBufferBarrier;
use prism_gfx::commands::recorder::GfxCommandRecorder;
use prism_gfx::device::GfxDevice;
use prism_render_interface::{DataHandle, DataManager};

use crate::components::ddgi_volume::GpuDdgiVolume;
use crate::components::material::GpuMaterial;
use crate::components::mesh::GpuMesh;
use crate::components::scene::{GpuSceneData, MAX_INSTANCE_SLOTS};
use crate::handles::{DdgiVolumeHandle, InstanceHandle, MaterialHandle, MeshHandle};
use crate::managers::ddgi_volume_manager::DdgiVolumeManager;
use crate::managers::instance_manager::{INSTANCE_SLOT_SIZE, InstanceManager};
use crate::managers::material_manager::MaterialManager;
use crate::managers::mesh_manager::MeshManager;

/// 场景中所有 GPU 数据的入口
///
/// 持有各个 domain manager 以及场景的根记录 [`GpuSceneData`]。
/// shader 只需要拿到 [`SceneManager::scene_handle`]，就能找到所有 instance slot。
///
/// 上传由调用者驱动：每帧在消费这些数据的 pass 之前调用 [`SceneManager::upload_all`]，
/// 再插入 [`SceneManager::upload_barriers`] 返回的 barrier。
pub struct SceneManager {
    meshes: MeshManager,
    materials: MaterialManager,
    instances: InstanceManager,
    ddgi_volumes: DdgiVolumeManager,

    scene: DataManager<GpuSceneData, 1>,
    scene_handle: DataHandle,
    primary_ddgi_volume: Option<DdgiVolumeHandle>,
}

// new & init
impl SceneManager {
    pub fn new<D: GfxDevice>(device: &mut D) -> anyhow::Result<Self> {
        let mut scene = DataManager::new("scene");
        let scene_handle = scene.add(device, GpuSceneData::default())?;
        Ok(Self {
            meshes: MeshManager::new(),
            materials: MaterialManager::new(),
            instances: InstanceManager::new(),
            ddgi_volumes: DdgiVolumeManager::new(),
            scene,
            scene_handle,
            primary_ddgi_volume: None,
        })
    }
}
// getters
impl SceneManager {
    /// 场景根记录的句柄，通常通过 push constant 传给 shader
    #[inline]
    pub fn scene_handle(&self) -> DataHandle {
        self.scene_handle
    }

    #[inline]
    pub fn scene_data(&self) -> &GpuSceneData {
        self.scene.get(self.scene_handle)
    }

    #[inline]
    pub fn meshes(&self) -> &MeshManager {
        &self.meshes
    }

    #[inline]
    pub fn meshes_mut(&mut self) -> &mut MeshManager {
        &mut self.meshes
    }

    #[inline]
    pub fn materials(&self) -> &MaterialManager {
        &self.materials
    }

    #[inline]
    pub fn materials_mut(&mut self) -> &mut MaterialManager {
        &mut self.materials
    }

    #[inline]
    pub fn instances(&self) -> &InstanceManager {
        &self.instances
    }

    #[inline]
    pub fn instances_mut(&mut self) -> &mut InstanceManager {
        &mut self.instances
    }

    #[inline]
    pub fn ddgi_volumes(&self) -> &DdgiVolumeManager {
        &self.ddgi_volumes
    }

    #[inline]
    pub fn ddgi_volumes_mut(&mut self) -> &mut DdgiVolumeManager {
        &mut self.ddgi_volumes
    }

    /// 最近一次 [`Self::upload_all`] 写入的所有 buffer 的 barrier
    pub fn upload_barriers(
        &self,
        dst_stage: vk::PipelineStageFlags2,
        dst_access: vk::AccessFlags2,
    ) -> Vec<GfxBufferBarrier> {
        [
            self.meshes.data().upload_barrier(dst_stage, dst_access),
            self.materials.data().upload_barrier(dst_stage, dst_access),
            self.instances.data().upload_barrier(dst_stage, dst_access),
            self.ddgi_volumes.data().upload_barrier(dst_stage, dst_access),
            self.scene.upload_barrier(dst_stage, dst_access),
        ]
        .into_iter()
        .flatten()
        .collect_vec()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty() && self.meshes.is_empty() && self.materials.is_empty() && self.ddgi_volumes.is_empty()
    }
}
// update
impl SceneManager {
    pub fn add_mesh<D: GfxDevice>(&mut self, device: &mut D, name: &str, mesh: GpuMesh) -> anyhow::Result<MeshHandle> {
        self.meshes.add_mesh(device, name, mesh)
    }

    pub fn add_material<D: GfxDevice>(
        &mut self,
        device: &mut D,
        name: &str,
        material: GpuMaterial,
    ) -> anyhow::Result<MaterialHandle> {
        self.materials.add_material(device, name, material)
    }

    /// 按名字引用已注册的 mesh 和材质
    pub fn add_instance<D: GfxDevice>(
        &mut self,
        device: &mut D,
        name: &str,
        mesh_name: &str,
        material_name: &str,
        transform: glam::Mat4,
    ) -> anyhow::Result<InstanceHandle> {
        let mesh = self
            .meshes
            .find(mesh_name)
            .and_then(|handle| self.meshes.data_handle(handle))
            .ok_or_else(|| anyhow::anyhow!("instance '{}': mesh '{}' not found", name, mesh_name))?;
        let material = self
            .materials
            .find(material_name)
            .and_then(|handle| self.materials.data_handle(handle))
            .ok_or_else(|| anyhow::anyhow!("instance '{}': material '{}' not found", name, material_name))?;

        // 根记录只能容纳有限个 instance slot
        let slot_limit = MAX_INSTANCE_SLOTS * INSTANCE_SLOT_SIZE;
        anyhow::ensure!(
            self.instances.record_count() < slot_limit,
            "instance '{}': scene already holds {} instance records",
            name,
            slot_limit
        );

        self.instances.add_instance(device, name, mesh, material, transform)
    }

    /// 第一个注册的体积自动成为主体积
    pub fn add_ddgi_volume<D: GfxDevice>(
        &mut self,
        device: &mut D,
        name: &str,
        volume: GpuDdgiVolume,
    ) -> anyhow::Result<DdgiVolumeHandle> {
        let handle = self.ddgi_volumes.add_volume(device, name, volume)?;
        self.primary_ddgi_volume.get_or_insert(handle);
        Ok(handle)
    }

    pub fn set_primary_ddgi_volume(&mut self, handle: DdgiVolumeHandle) {
        assert!(self.ddgi_volumes.volume(handle).is_some(), "set_primary_ddgi_volume: stale ddgi volume handle");
        self.primary_ddgi_volume = Some(handle);
    }

    /// 删除 mesh 之前必须先删除引用它的 instance
    pub fn remove_mesh(&mut self, handle: MeshHandle) -> anyhow::Result<()> {
        let Some(data) = self.meshes.data_handle(handle) else {
            anyhow::bail!("remove_mesh: stale mesh handle");
        };
        let users = self.instances.instances_of_mesh(data).count();
        anyhow::ensure!(users == 0, "remove_mesh: mesh {} is still used by {} instance(s)", data, users);
        self.meshes.remove_mesh(handle);
        Ok(())
    }

    pub fn remove_instance(&mut self, handle: InstanceHandle) -> bool {
        self.instances.remove_instance(handle).is_some()
    }

    pub fn remove_ddgi_volume(&mut self, handle: DdgiVolumeHandle) -> bool {
        if self.primary_ddgi_volume == Some(handle) {
            self.primary_ddgi_volume = None;
        }
        self.ddgi_volumes.remove_volume(handle).is_some()
    }

    /// 刷新根记录并上传所有 dirty 的数据
    ///
    /// 返回是否录制了任何拷贝
    pub fn upload_all<D: GfxDevice>(
        &mut self,
        device: &mut D,
        recorder: &mut impl GfxCommandRecorder,
    ) -> anyhow::Result<bool> {
        let _span = tracy_client::span!("SceneManager::upload_all");
        self.refresh_scene_data();

        let mut any_uploaded = false;
        any_uploaded |= self.meshes.upload(device, recorder)?;
        any_uploaded |= self.materials.upload(device, recorder)?;
        any_uploaded |= self.instances.upload(device, recorder)?;
        any_uploaded |= self.ddgi_volumes.upload(device, recorder)?;
        any_uploaded |= self.scene.upload(device, recorder)?;
        Ok(any_uploaded)
    }
}
// tools
impl SceneManager {
    /// 根据当前的 manager 状态重建根记录，内容不变时不会触发上传
    fn refresh_scene_data(&mut self) {
        let instance_slots = self.instances.slot_bindings();
        let mut instance_slot_bindings = [u32::MAX; MAX_INSTANCE_SLOTS];
        for (dst, binding) in instance_slot_bindings.iter_mut().zip(&instance_slots) {
            *dst = *binding;
        }

        let scene_data = GpuSceneData {
            active_instance_count: self.instances.len() as u32,
            instance_record_count: self.instances.record_count() as u32,
            mesh_count: self.meshes.len() as u32,
            material_count: self.materials.len() as u32,
            ddgi_volume_count: self.ddgi_volumes.len() as u32,
            instance_slot_count: instance_slots.len() as u32,
            instance_slot_size: INSTANCE_SLOT_SIZE as u32,
            primary_ddgi_volume: self
                .primary_ddgi_volume
                .and_then(|handle| self.ddgi_volumes.data_handle(handle))
                .unwrap_or(DataHandle::INVALID),
            instance_slot_bindings,
            ..Default::default()
        };

        if bytemuck::bytes_of(&scene_data) != bytemuck::bytes_of(self.scene.get(self.scene_handle)) {
            self.scene.set(self.scene_handle, scene_data);
        }
    }
}
// destroy
impl SceneManager {
    pub fn destroy<D: GfxDevice>(&mut self, device: &mut D) {
        self.meshes.destroy(device);
        self.materials.destroy(device);
        self.instances.destroy(device);
        self.ddgi_volumes.destroy(device);
        self.scene.destroy(device);
        self.primary_ddgi_volume = None;
        log::info!("SceneManager destroyed.");
    }
}
