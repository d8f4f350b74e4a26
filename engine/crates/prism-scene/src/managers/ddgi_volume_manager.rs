use prism_gfx::commands::recorder::GfxCommandRecorder;
use prism_gfx::device::GfxDevice;
use prism_render_interface::{DataHandle, DataManager};

use crate::components::ddgi_volume::GpuDdgiVolume;
use crate::handles::DdgiVolumeHandle;
use crate::managers::named_data::NamedDataManager;

/// 每个 slot 的记录数
pub const DDGI_VOLUME_SLOT_SIZE: usize = 16;

/// DDGI 探针体积的 bindless 管理
pub struct DdgiVolumeManager {
    volumes: NamedDataManager<DdgiVolumeHandle, GpuDdgiVolume, DDGI_VOLUME_SLOT_SIZE>,
}

impl Default for DdgiVolumeManager {
    fn default() -> Self {
        Self::new()
    }
}

// new & init
impl DdgiVolumeManager {
    pub fn new() -> Self {
        Self {
            volumes: NamedDataManager::new("ddgi-volumes"),
        }
    }
}
// getters
impl DdgiVolumeManager {
    #[inline]
    pub fn len(&self) -> usize {
        self.volumes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.volumes.is_empty()
    }

    /// 底层的数据管理器
    #[inline]
    pub fn data(&self) -> &DataManager<GpuDdgiVolume, DDGI_VOLUME_SLOT_SIZE> {
        self.volumes.data()
    }

    #[inline]
    pub fn find(&self, name: &str) -> Option<DdgiVolumeHandle> {
        self.volumes.find(name)
    }

    #[inline]
    pub fn volume(&self, handle: DdgiVolumeHandle) -> Option<&GpuDdgiVolume> {
        self.volumes.get(handle)
    }

    #[inline]
    pub fn data_handle(&self, handle: DdgiVolumeHandle) -> Option<DataHandle> {
        self.volumes.data_handle(handle)
    }

    /// 包含 `position` 的体积中探针间距最小的一个
    pub fn volume_at(&self, position: glam::Vec3) -> Option<DdgiVolumeHandle> {
        self.volumes
            .iter()
            .filter(|(_, _, volume)| {
                let offset = (position - volume.origin).abs();
                offset.cmple(volume.half_extent()).all()
            })
            .min_by(|(_, _, a), (_, _, b)| a.probe_spacing.length().total_cmp(&b.probe_spacing.length()))
            .map(|(handle, _, _)| handle)
    }
}
// update
impl DdgiVolumeManager {
    pub fn add_volume<D: GfxDevice>(
        &mut self,
        device: &mut D,
        name: &str,
        volume: GpuDdgiVolume,
    ) -> anyhow::Result<DdgiVolumeHandle> {
        anyhow::ensure!(volume.probe_count() > 0, "ddgi volume '{}' has no probe", name);
        let handle = self.volumes.insert(device, name, volume)?;
        log::info!("ddgi volume '{}' registered: {} probes", name, volume.probe_count());
        Ok(handle)
    }

    /// 移动体积，例如跟随相机
    pub fn set_origin(&mut self, handle: DdgiVolumeHandle, origin: glam::Vec3) -> bool {
        self.volumes.update(handle, |volume| volume.origin = origin)
    }

    pub fn set_hysteresis(&mut self, handle: DdgiVolumeHandle, hysteresis: f32) -> bool {
        self.volumes.update(handle, |volume| volume.hysteresis = hysteresis.clamp(0.0, 1.0))
    }

    /// 绑定探针的 irradiance / distance 纹理（bindless storage image 下标）
    pub fn set_probe_textures(&mut self, handle: DdgiVolumeHandle, irradiance: u32, distance: u32) -> bool {
        self.volumes.update(handle, |volume| {
            volume.irradiance_texture = irradiance;
            volume.distance_texture = distance;
        })
    }

    pub fn remove_volume(&mut self, handle: DdgiVolumeHandle) -> Option<DataHandle> {
        self.volumes.remove(handle)
    }

    pub fn upload<D: GfxDevice>(
        &mut self,
        device: &mut D,
        recorder: &mut impl GfxCommandRecorder,
    ) -> anyhow::Result<bool> {
        self.volumes.upload(device, recorder)
    }
}
// destroy
impl DdgiVolumeManager {
    pub fn destroy<D: GfxDevice>(&mut self, device: &mut D) {
        self.volumes.destroy(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;
    use prism_gfx::headless::HeadlessDevice;

    fn volume(origin: glam::Vec3, spacing: f32) -> GpuDdgiVolume {
        GpuDdgiVolume::new(origin, glam::Vec3::splat(spacing), glam::UVec3::new(8, 4, 8))
    }

    #[test]
    fn test_set_origin() {
        let mut device = HeadlessDevice::new(vk::Extent2D {
            width: 16,
            height: 16,
        });
        let mut manager = DdgiVolumeManager::new();
        let handle = manager.add_volume(&mut device, "main", volume(glam::Vec3::ZERO, 1.0)).unwrap();
        let data = manager.data_handle(handle).unwrap();

        assert!(manager.set_origin(handle, glam::vec3(10.0, 0.0, 0.0)));
        // 句柄不变，记录被修改
        assert_eq!(manager.data_handle(handle), Some(data));
        let moved = manager.volume(handle).unwrap();
        assert_eq!(moved.origin, glam::vec3(10.0, 0.0, 0.0));
        assert_eq!(moved.probe_position(glam::UVec3::ZERO), glam::vec3(6.5, -1.5, -3.5));
    }

    #[test]
    fn test_volume_at_prefers_finer_volume() {
        let mut device = HeadlessDevice::new(vk::Extent2D {
            width: 16,
            height: 16,
        });
        let mut manager = DdgiVolumeManager::new();
        let coarse = manager.add_volume(&mut device, "coarse", volume(glam::Vec3::ZERO, 4.0)).unwrap();
        let fine = manager.add_volume(&mut device, "fine", volume(glam::Vec3::ZERO, 0.5)).unwrap();

        assert_eq!(manager.volume_at(glam::Vec3::ZERO), Some(fine));
        assert_eq!(manager.volume_at(glam::vec3(10.0, 0.0, 0.0)), Some(coarse));
        assert_eq!(manager.volume_at(glam::vec3(100.0, 0.0, 0.0)), None);

        let empty = GpuDdgiVolume::new(glam::Vec3::ZERO, glam::Vec3::ONE, glam::UVec3::ZERO);
        assert!(manager.add_volume(&mut device, "empty", empty).is_err());
    }
}
