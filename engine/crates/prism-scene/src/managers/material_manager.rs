use prism_gfx::commands::recorder::GfxCommandRecorder;
use prism_gfx::device::GfxDevice;
use prism_render_interface::{DataHandle, DataManager};

use crate::components::material::GpuMaterial;
use crate::handles::MaterialHandle;
use crate::managers::named_data::NamedDataManager;

/// 每个 slot 的记录数
pub const MATERIAL_SLOT_SIZE: usize = 256;

/// 材质参数的 bindless 管理
///
/// 贴图本身由 bindless sampled image 数组管理，这里只保存下标
pub struct MaterialManager {
    materials: NamedDataManager<MaterialHandle, GpuMaterial, MATERIAL_SLOT_SIZE>,
}

impl Default for MaterialManager {
    fn default() -> Self {
        Self::new()
    }
}

// new & init
impl MaterialManager {
    pub fn new() -> Self {
        Self {
            materials: NamedDataManager::new("materials"),
        }
    }
}
// getters
impl MaterialManager {
    #[inline]
    pub fn len(&self) -> usize {
        self.materials.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }

    /// 底层的数据管理器
    #[inline]
    pub fn data(&self) -> &DataManager<GpuMaterial, MATERIAL_SLOT_SIZE> {
        self.materials.data()
    }

    #[inline]
    pub fn find(&self, name: &str) -> Option<MaterialHandle> {
        self.materials.find(name)
    }

    #[inline]
    pub fn material(&self, handle: MaterialHandle) -> Option<&GpuMaterial> {
        self.materials.get(handle)
    }

    #[inline]
    pub fn data_handle(&self, handle: MaterialHandle) -> Option<DataHandle> {
        self.materials.data_handle(handle)
    }

    pub fn iter(&self) -> impl Iterator<Item = (MaterialHandle, &str, &GpuMaterial)> {
        self.materials.iter()
    }
}
// update
impl MaterialManager {
    pub fn add_material<D: GfxDevice>(
        &mut self,
        device: &mut D,
        name: &str,
        material: GpuMaterial,
    ) -> anyhow::Result<MaterialHandle> {
        self.materials.insert(device, name, material)
    }

    pub fn set_base_color(&mut self, handle: MaterialHandle, base_color: glam::Vec4) -> bool {
        self.materials.update(handle, |material| material.base_color = base_color)
    }

    pub fn set_emissive(&mut self, handle: MaterialHandle, emissive: glam::Vec4) -> bool {
        self.materials.update(handle, |material| material.emissive = emissive)
    }

    /// `metallic` 和 `roughness` 会被截断到 [0, 1]
    pub fn set_metallic_roughness(&mut self, handle: MaterialHandle, metallic: f32, roughness: f32) -> bool {
        self.materials.update(handle, |material| {
            material.metallic = metallic.clamp(0.0, 1.0);
            material.roughness = roughness.clamp(0.0, 1.0);
        })
    }

    pub fn set_diffuse_map(&mut self, handle: MaterialHandle, sampled_index: u32) -> bool {
        self.materials.update(handle, |material| material.diffuse_map = sampled_index)
    }

    pub fn remove_material(&mut self, handle: MaterialHandle) -> Option<DataHandle> {
        self.materials.remove(handle)
    }

    pub fn upload<D: GfxDevice>(
        &mut self,
        device: &mut D,
        recorder: &mut impl GfxCommandRecorder,
    ) -> anyhow::Result<bool> {
        self.materials.upload(device, recorder)
    }
}
// destroy
impl MaterialManager {
    pub fn destroy<D: GfxDevice>(&mut self, device: &mut D) {
        self.materials.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;
    use prism_gfx::headless::HeadlessDevice;

    #[test]
    fn test_material_parameters() {
        let mut device = HeadlessDevice::new(vk::Extent2D {
            width: 16,
            height: 16,
        });
        let mut manager = MaterialManager::new();
        let handle = manager.add_material(&mut device, "red", GpuMaterial::from_base_color(glam::Vec4::X)).unwrap();

        assert!(manager.set_metallic_roughness(handle, 2.0, -1.0));
        assert!(manager.set_diffuse_map(handle, 3));

        let material = manager.material(handle).unwrap();
        assert_eq!(material.metallic, 1.0);
        assert_eq!(material.roughness, 0.0);
        assert!(material.has_diffuse_map());
        assert_eq!(manager.iter().count(), 1);

        manager.remove_material(handle);
        assert!(!manager.set_base_color(handle, glam::Vec4::ONE));
        assert!(manager.is_empty());
    }
}
