use std::collections::HashMap;

use ash::vk;

/// render target 的缓存 key
///
/// 同一个 resource id 在尺寸或格式变化之后会得到新的 key
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct GfxRenderTargetKey {
    pub width: u32,
    pub height: u32,
    pub format: vk::Format,
    pub resource_id: u32,
}

/// 按 (width, height, format, resource id) 缓存 render target
///
/// 设备实现用它跨帧复用 render target；同一个 resource id 只保留最新的一份，
/// 旧的条目会从 [`GfxRenderTargetCache::get_or_create`] 返回给调用者延迟销毁。
pub struct GfxRenderTargetCache<T> {
    entries: HashMap<GfxRenderTargetKey, T>,
}

impl<T> Default for GfxRenderTargetCache<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<T> GfxRenderTargetCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[inline]
    pub fn get(&self, key: &GfxRenderTargetKey) -> Option<&T> {
        self.entries.get(key)
    }

    /// 命中则直接返回；否则调用 `create` 创建新条目
    ///
    /// 返回值的第二项是被替换掉的旧条目（同一 resource id，不同尺寸或格式）
    pub fn get_or_create(
        &mut self,
        key: GfxRenderTargetKey,
        create: impl FnOnce(&GfxRenderTargetKey) -> anyhow::Result<T>,
    ) -> anyhow::Result<(&T, Vec<T>)> {
        let mut evicted = Vec::new();
        if !self.entries.contains_key(&key) {
            let stale_keys: Vec<_> =
                self.entries.keys().filter(|k| k.resource_id == key.resource_id).copied().collect();
            for stale in stale_keys {
                if let Some(old) = self.entries.remove(&stale) {
                    log::debug!("render target {} resized: {:?} -> {:?}", key.resource_id, stale, key);
                    evicted.push(old);
                }
            }
            self.entries.insert(key, create(&key)?);
        }
        Ok((&self.entries[&key], evicted))
    }

    /// 清空缓存，返回所有条目
    pub fn drain(&mut self) -> Vec<T> {
        self.entries.drain().map(|(_, v)| v).collect()
    }
}
