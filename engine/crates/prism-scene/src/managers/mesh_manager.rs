use prism_gfx::commands::recorder::GfxCommandRecorder;
use prism_gfx::device::GfxDevice;
use prism_render_interface::{DataHandle, DataManager};

use crate::components::mesh::GpuMesh;
use crate::handles::MeshHandle;
use crate::managers::named_data::NamedDataManager;

/// 每个 slot 的记录数
pub const MESH_SLOT_SIZE: usize = 256;

pub struct MeshManager {
    meshes: NamedDataManager<MeshHandle, GpuMesh, MESH_SLOT_SIZE>,
}

impl Default for MeshManager {
    fn default() -> Self {
        Self::new()
    }
}

// new & init
impl MeshManager {
    pub fn new() -> Self {
        Self {
            meshes: NamedDataManager::new("meshes"),
        }
    }
}
// getters
impl MeshManager {
    #[inline]
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    /// 底层的数据管理器
    #[inline]
    pub fn data(&self) -> &DataManager<GpuMesh, MESH_SLOT_SIZE> {
        self.meshes.data()
    }

    #[inline]
    pub fn find(&self, name: &str) -> Option<MeshHandle> {
        self.meshes.find(name)
    }

    #[inline]
    pub fn mesh(&self, handle: MeshHandle) -> Option<&GpuMesh> {
        self.meshes.get(handle)
    }

    #[inline]
    pub fn data_handle(&self, handle: MeshHandle) -> Option<DataHandle> {
        self.meshes.data_handle(handle)
    }
}
// update
impl MeshManager {
    pub fn add_mesh<D: GfxDevice>(&mut self, device: &mut D, name: &str, mesh: GpuMesh) -> anyhow::Result<MeshHandle> {
        let handle = self.meshes.insert(device, name, mesh)?;
        log::debug!("mesh '{}' registered: {} triangles", name, mesh.triangle_count());
        Ok(handle)
    }

    /// 替换 mesh 的几何信息，例如重新生成了顶点 buffer 之后
    pub fn set_mesh(&mut self, handle: MeshHandle, mesh: GpuMesh) -> bool {
        self.meshes.update(handle, |record| *record = mesh)
    }

    pub fn remove_mesh(&mut self, handle: MeshHandle) -> Option<DataHandle> {
        self.meshes.remove(handle)
    }

    pub fn upload<D: GfxDevice>(
        &mut self,
        device: &mut D,
        recorder: &mut impl GfxCommandRecorder,
    ) -> anyhow::Result<bool> {
        self.meshes.upload(device, recorder)
    }
}
// destroy
impl MeshManager {
    pub fn destroy<D: GfxDevice>(&mut self, device: &mut D) {
        self.meshes.destroy(device);
    }
}
