use std::collections::HashMap;

use prism_gfx::commands::recorder::GfxCommandRecorder;
use prism_gfx::device::GfxDevice;
use prism_render_interface::{DataHandle, DataManager};
use slotmap::SlotMap;

struct NamedEntry {
    name: String,
    data: DataHandle,
}

/// 在 [`DataManager`] 之上维护逻辑对象和名字索引
///
/// 逻辑对象用 slotmap 的 key 标识，删除之后 key 失效、名字可以被重新使用；
/// 但 GPU 上的记录不会被回收，仍然占据原来的 `(binding, index)`。
pub struct NamedDataManager<K: slotmap::Key, T: bytemuck::Pod, const SLOT_SIZE: usize> {
    data: DataManager<T, SLOT_SIZE>,
    entries: SlotMap<K, NamedEntry>,
    name_index: HashMap<String, K>,
}

// new & init
impl<K: slotmap::Key, T: bytemuck::Pod, const SLOT_SIZE: usize> NamedDataManager<K, T, SLOT_SIZE> {
    pub fn new(label: &str) -> Self {
        Self {
            data: DataManager::new(label),
            entries: SlotMap::with_key(),
            name_index: HashMap::new(),
        }
    }
}
// getters
impl<K: slotmap::Key, T: bytemuck::Pod, const SLOT_SIZE: usize> NamedDataManager<K, T, SLOT_SIZE> {
    /// 存活的逻辑对象数量
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn data(&self) -> &DataManager<T, SLOT_SIZE> {
        &self.data
    }

    #[inline]
    pub fn find(&self, name: &str) -> Option<K> {
        self.name_index.get(name).copied()
    }

    #[inline]
    pub fn name(&self, key: K) -> Option<&str> {
        self.entries.get(key).map(|entry| entry.name.as_str())
    }

    #[inline]
    pub fn data_handle(&self, key: K) -> Option<DataHandle> {
        self.entries.get(key).map(|entry| entry.data)
    }

    #[inline]
    pub fn get(&self, key: K) -> Option<&T> {
        self.entries.get(key).map(|entry| self.data.get(entry.data))
    }

    /// 遍历存活的对象，顺序与 slotmap 一致
    pub fn iter(&self) -> impl Iterator<Item = (K, &str, &T)> {
        self.entries.iter().map(|(key, entry)| (key, entry.name.as_str(), self.data.get(entry.data)))
    }
}
// update
impl<K: slotmap::Key, T: bytemuck::Pod, const SLOT_SIZE: usize> NamedDataManager<K, T, SLOT_SIZE> {
    /// 名字必须唯一
    pub fn insert<D: GfxDevice>(&mut self, device: &mut D, name: &str, value: T) -> anyhow::Result<K> {
        anyhow::ensure!(
            !self.name_index.contains_key(name),
            "'{}' is already registered in '{}'",
            name,
            self.data.name()
        );

        let data = self.data.add(device, value)?;
        let key = self.entries.insert(NamedEntry {
            name: name.to_string(),
            data,
        });
        self.name_index.insert(name.to_string(), key);
        Ok(key)
    }

    /// 修改记录，key 已失效时返回 false
    pub fn update(&mut self, key: K, f: impl FnOnce(&mut T)) -> bool {
        let Some(entry) = self.entries.get(key) else {
            return false;
        };
        f(self.data.get_mut(entry.data));
        true
    }

    /// 删除逻辑对象，返回其 GPU 记录的句柄；记录本身保持不变
    pub fn remove(&mut self, key: K) -> Option<DataHandle> {
        let entry = self.entries.remove(key)?;
        self.name_index.remove(&entry.name);
        Some(entry.data)
    }

    /// 直接修改 GPU 记录，用于已经删除的逻辑对象
    pub fn record_mut(&mut self, handle: DataHandle) -> &mut T {
        self.data.get_mut(handle)
    }

    pub fn upload<D: GfxDevice>(
        &mut self,
        device: &mut D,
        recorder: &mut impl GfxCommandRecorder,
    ) -> anyhow::Result<bool> {
        self.data.upload(device, recorder)
    }
}
// destroy
impl<K: slotmap::Key, T: bytemuck::Pod, const SLOT_SIZE: usize> NamedDataManager<K, T, SLOT_SIZE> {
    pub fn destroy<D: GfxDevice>(&mut self, device: &mut D) {
        self.data.destroy(device);
        self.entries.clear();
        self.name_index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;
    use prism_gfx::headless::HeadlessDevice;

    slotmap::new_key_type! {
        struct TestKey;
    }

    fn device() -> HeadlessDevice {
        HeadlessDevice::new(vk::Extent2D {
            width: 16,
            height: 16,
        })
    }

    #[test]
    fn test_name_lookup() {
        let mut device = device();
        let mut manager = NamedDataManager::<TestKey, u32, 4>::new("named");
        let a = manager.insert(&mut device, "a", 1).unwrap();
        let b = manager.insert(&mut device, "b", 2).unwrap();

        assert_eq!(manager.find("a"), Some(a));
        assert_eq!(manager.name(b), Some("b"));
        assert_eq!(manager.get(b), Some(&2));
        assert!(manager.insert(&mut device, "a", 3).is_err());
        assert_eq!(manager.data().len(), 2);
    }

    #[test]
    fn test_remove_keeps_record() {
        let mut device = device();
        let mut manager = NamedDataManager::<TestKey, u32, 4>::new("named");
        let a = manager.insert(&mut device, "a", 1).unwrap();

        let handle = manager.remove(a).unwrap();
        assert!(manager.get(a).is_none());
        assert!(manager.find("a").is_none());
        assert!(!manager.update(a, |v| *v = 5));
        assert_eq!(*manager.data().get(handle), 1);

        // 名字可以重新使用，但记录是新分配的
        let a2 = manager.insert(&mut device, "a", 7).unwrap();
        assert_ne!(manager.data_handle(a2), Some(handle));
        assert_eq!(manager.data().len(), 2);
        assert_eq!(manager.len(), 1);
    }
}
