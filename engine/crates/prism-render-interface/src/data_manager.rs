use std::collections::HashMap;

use ash::vk;
use itertools::Itertools;
use prism_gfx::bindless::GfxBindlessSlot;
use prism_gfx::commands::barrier::GfxBufferBarrier;
use prism_gfx::commands::recorder::GfxCommandRecorder;
use prism_gfx::device::GfxDevice;
use prism_gfx::resources::handles::{GfxBufferCreateInfo, GfxBufferHandle};

use crate::data_handle::DataHandle;

/// 一块固定容量的记录，对应一个 device buffer 和一个 bindless binding
struct DataSlot<T> {
    binding: u32,
    records: Vec<T>,

    device_buffer: GfxBufferHandle,
    vk_buffer: vk::Buffer,
    /// device buffer 能容纳的记录数
    gpu_capacity: usize,

    dirty: bool,
}

/// 同类 POD 记录的 bindless 分块管理器
///
/// - 记录按添加顺序填入 slot，每个 slot 最多 `SLOT_SIZE` 条；只有所有 slot 都满时才会创建新的 slot
/// - 每个 slot 在 bindless storage buffer 数组中占一个元素，`add` 返回的 [`DataHandle`] 在管理器的生命周期内不变
/// - 记录不会被单独删除，也不会被移动；逻辑上的删除由上层的 domain manager 负责
/// - `set` / `get_mut` 会将所在的 slot 标记为 dirty，`upload` 只上传 dirty 的 slot
///
/// 上传在调用者提供的 command recorder 上录制，调用者需要保证在消费数据的 pass 之前提交，
/// 并插入 [`DataManager::upload_barrier`] 返回的 barrier。
pub struct DataManager<T: bytemuck::Pod, const SLOT_SIZE: usize> {
    name: String,
    usage: vk::BufferUsageFlags,

    slots: Vec<DataSlot<T>>,
    /// bindless binding -> slots 中的下标
    slot_lookup: HashMap<u32, usize>,

    /// 最近一次 upload 写入的 device buffer
    uploaded: Vec<vk::Buffer>,
}

// new & init
impl<T: bytemuck::Pod, const SLOT_SIZE: usize> DataManager<T, SLOT_SIZE> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_usage(name, vk::BufferUsageFlags::empty())
    }

    /// `usage` 会与 `STORAGE_BUFFER | TRANSFER_DST` 合并
    pub fn with_usage(name: impl Into<String>, usage: vk::BufferUsageFlags) -> Self {
        const { assert!(SLOT_SIZE > 0, "SLOT_SIZE must be positive") };
        Self {
            name: name.into(),
            usage: usage | vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            slots: Vec::new(),
            slot_lookup: HashMap::new(),
            uploaded: Vec::new(),
        }
    }
}
// getters
impl<T: bytemuck::Pod, const SLOT_SIZE: usize> DataManager<T, SLOT_SIZE> {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 所有 slot 中记录的总数
    #[inline]
    pub fn len(&self) -> usize {
        self.slots.iter().map(|slot| slot.records.len()).sum()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// 各个 slot 的 bindless binding，按创建顺序
    pub fn bindings(&self) -> Vec<u32> {
        self.slots.iter().map(|slot| slot.binding).collect_vec()
    }

    /// 按添加顺序遍历所有记录
    pub fn iter(&self) -> impl Iterator<Item = (DataHandle, &T)> {
        self.slots.iter().flat_map(|slot| {
            slot.records.iter().enumerate().map(|(index, record)| (DataHandle::new(slot.binding, index as u32), record))
        })
    }

    pub fn is_dirty(&self, binding: u32) -> bool {
        self.slot_lookup.get(&binding).is_some_and(|&index| self.slots[index].dirty)
    }

    #[inline]
    pub fn has_dirty_slot(&self) -> bool {
        self.slots.iter().any(|slot| slot.dirty)
    }

    /// slot 当前使用的 device buffer
    pub fn slot_buffer(&self, binding: u32) -> Option<GfxBufferHandle> {
        self.slot_lookup.get(&binding).map(|&index| self.slots[index].device_buffer)
    }

    #[inline]
    pub fn contains(&self, handle: DataHandle) -> bool {
        self.slot_lookup
            .get(&handle.binding)
            .is_some_and(|&index| (handle.index as usize) < self.slots[index].records.len())
    }

    /// 句柄必须来自这个管理器，否则 panic
    pub fn get(&self, handle: DataHandle) -> &T {
        let slot = &self.slots[self.slot_index_of(handle)];
        &slot.records[handle.index as usize]
    }
}
// update
impl<T: bytemuck::Pod, const SLOT_SIZE: usize> DataManager<T, SLOT_SIZE> {
    /// 添加一条记录
    ///
    /// 所有 slot 都满时会创建新的 device buffer，并在 bindless 表中申请一个 binding
    pub fn add<D: GfxDevice>(&mut self, device: &mut D, value: T) -> anyhow::Result<DataHandle> {
        let need_new_slot = self.slots.last().is_none_or(|slot| slot.records.len() >= SLOT_SIZE);
        if need_new_slot {
            self.create_slot(device)?;
        }

        let slot = self.slots.last_mut().ok_or_else(|| anyhow::anyhow!("data manager '{}' has no slot", self.name))?;
        let index = slot.records.len() as u32;
        slot.records.push(value);
        slot.dirty = true;
        Ok(DataHandle::new(slot.binding, index))
    }

    /// 添加一条全 0 的记录，并通过 `init` 就地初始化
    pub fn emplace<D: GfxDevice>(&mut self, device: &mut D, init: impl FnOnce(&mut T)) -> anyhow::Result<DataHandle> {
        let mut value = T::zeroed();
        init(&mut value);
        self.add(device, value)
    }

    /// 让 slot 的 device buffer 至少容纳 `capacity` 条记录
    ///
    /// 重新分配发生在下一次 upload，binding 保持不变，描述符会被改写为新的 buffer
    pub fn reserve(&mut self, binding: u32, capacity: usize) {
        let Some(&slot_index) = self.slot_lookup.get(&binding) else {
            panic!("data manager '{}': reserve on missing slot binding {}", self.name, binding);
        };
        let slot = &mut self.slots[slot_index];
        if capacity <= slot.records.capacity() {
            return;
        }
        slot.records.reserve_exact(capacity - slot.records.len());
        slot.dirty = true;
    }

    pub fn set(&mut self, handle: DataHandle, value: T) {
        *self.get_mut(handle) = value;
    }

    /// 可变访问会将 slot 标记为 dirty
    pub fn get_mut(&mut self, handle: DataHandle) -> &mut T {
        let slot_index = self.slot_index_of(handle);
        let slot = &mut self.slots[slot_index];
        slot.dirty = true;
        &mut slot.records[handle.index as usize]
    }

    /// 将 dirty 的 slot 上传到 GPU
    ///
    /// 每个 dirty 的 slot 录制一次 stage buffer → device buffer 的拷贝。
    /// 返回是否录制了拷贝，调用者据此决定是否需要 [`Self::upload_barrier`]。
    pub fn upload<D: GfxDevice>(
        &mut self,
        device: &mut D,
        recorder: &mut impl GfxCommandRecorder,
    ) -> anyhow::Result<bool> {
        let _span = tracy_client::span!("DataManager::upload");
        self.uploaded.clear();

        for slot_index in 0..self.slots.len() {
            if !self.slots[slot_index].dirty {
                continue;
            }

            let required_capacity = self.slots[slot_index].records.capacity();
            if self.slots[slot_index].gpu_capacity < required_capacity {
                self.reallocate_slot(device, slot_index, required_capacity)?;
            }

            let slot = &mut self.slots[slot_index];
            let bytes: &[u8] = bytemuck::cast_slice(&slot.records);
            let stage_buffer = device.create_buffer(&GfxBufferCreateInfo::new_stage_buffer(
                bytes.len() as vk::DeviceSize,
                format!("{}-stage-{}", self.name, slot.binding),
            ))?;
            device.write_buffer(stage_buffer, 0, bytes)?;
            let vk_stage_buffer = device
                .buffer_info(stage_buffer)
                .ok_or_else(|| anyhow::anyhow!("stage buffer of '{}' vanished", self.name))?
                .buffer;

            recorder.copy_buffer(
                vk_stage_buffer,
                slot.vk_buffer,
                &[vk::BufferCopy {
                    size: bytes.len() as vk::DeviceSize,
                    ..Default::default()
                }],
            );
            // 销毁是延迟的，拷贝执行完之后才会真正释放
            device.destroy_buffer(stage_buffer);

            slot.dirty = false;
            self.uploaded.push(slot.vk_buffer);
        }

        if !self.uploaded.is_empty() {
            log::trace!("data manager '{}': uploaded {} slot(s)", self.name, self.uploaded.len());
        }
        Ok(!self.uploaded.is_empty())
    }

    /// 最近一次 upload 所写入 buffer 的 barrier：拷贝 → `dst_stage` / `dst_access`
    pub fn upload_barrier(
        &self,
        dst_stage: vk::PipelineStageFlags2,
        dst_access: vk::AccessFlags2,
    ) -> Vec<GfxBufferBarrier> {
        self.uploaded
            .iter()
            .map(|&buffer| {
                GfxBufferBarrier::new()
                    .src_mask(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)
                    .dst_mask(dst_stage, dst_access)
                    .buffer(buffer, 0, vk::WHOLE_SIZE)
            })
            .collect_vec()
    }
}
// tools
impl<T: bytemuck::Pod, const SLOT_SIZE: usize> DataManager<T, SLOT_SIZE> {
    fn slot_index_of(&self, handle: DataHandle) -> usize {
        let Some(&slot_index) = self.slot_lookup.get(&handle.binding) else {
            panic!("data manager '{}': handle {} refers to a missing slot", self.name, handle);
        };
        let len = self.slots[slot_index].records.len();
        assert!(
            (handle.index as usize) < len,
            "data manager '{}': handle {} out of range, slot holds {} record(s)",
            self.name,
            handle,
            len
        );
        slot_index
    }

    fn create_device_buffer<D: GfxDevice>(
        &self,
        device: &mut D,
        capacity: usize,
        label: usize,
    ) -> anyhow::Result<(GfxBufferHandle, vk::Buffer)> {
        let size = (capacity * size_of::<T>()) as vk::DeviceSize;
        let handle = device.create_buffer(&GfxBufferCreateInfo::new_device_buffer(
            size,
            self.usage,
            format!("{}-slot-{}", self.name, label),
        ))?;
        let info = device
            .buffer_info(handle)
            .ok_or_else(|| anyhow::anyhow!("device buffer of '{}' vanished", self.name))?;
        Ok((handle, info.buffer))
    }

    fn create_slot<D: GfxDevice>(&mut self, device: &mut D) -> anyhow::Result<()> {
        let (device_buffer, vk_buffer) = self.create_device_buffer(device, SLOT_SIZE, self.slots.len())?;
        let binding = match device.bindless_set_mut().set_storage_buffer(None, vk_buffer) {
            Ok(binding) => binding,
            Err(err) => {
                device.destroy_buffer(device_buffer);
                return Err(err.context(format!("data manager '{}' failed to allocate a new slot", self.name)));
            }
        };

        self.slot_lookup.insert(binding, self.slots.len());
        self.slots.push(DataSlot {
            binding,
            records: Vec::with_capacity(SLOT_SIZE),
            device_buffer,
            vk_buffer,
            gpu_capacity: SLOT_SIZE,
            dirty: false,
        });
        log::debug!(
            "data manager '{}': slot #{} created, bindless binding {}",
            self.name,
            self.slots.len() - 1,
            binding
        );
        Ok(())
    }

    /// device buffer 放不下内存中的记录时重新分配，binding 保持不变
    fn reallocate_slot<D: GfxDevice>(
        &mut self,
        device: &mut D,
        slot_index: usize,
        capacity: usize,
    ) -> anyhow::Result<()> {
        let (device_buffer, vk_buffer) = self.create_device_buffer(device, capacity, slot_index)?;

        let slot = &mut self.slots[slot_index];
        device.bindless_set_mut().set_storage_buffer(Some(slot.binding), vk_buffer)?;
        device.destroy_buffer(slot.device_buffer);

        log::info!(
            "data manager '{}': slot binding {} reallocated, {} -> {} records",
            self.name,
            slot.binding,
            slot.gpu_capacity,
            capacity
        );
        slot.device_buffer = device_buffer;
        slot.vk_buffer = vk_buffer;
        slot.gpu_capacity = capacity;
        Ok(())
    }
}
// destroy
impl<T: bytemuck::Pod, const SLOT_SIZE: usize> DataManager<T, SLOT_SIZE> {
    /// 释放所有 slot 的 buffer 和 bindless binding，之前的句柄全部失效
    pub fn destroy<D: GfxDevice>(&mut self, device: &mut D) {
        for slot in self.slots.drain(..) {
            device.release_bindless(GfxBindlessSlot::StorageBuffer(slot.binding));
            device.destroy_buffer(slot.device_buffer);
        }
        self.slot_lookup.clear();
        self.uploaded.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prism_gfx::bindless::{GfxBindlessBinding, GfxBindlessCapacity, GfxBindlessResource, GfxBindlessWrite};
    use prism_gfx::commands::queue::GfxQueueType;
    use prism_gfx::headless::HeadlessDevice;

    #[repr(C)]
    #[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    struct TestRecord {
        value: u32,
        weight: f32,
    }

    fn record(value: u32) -> TestRecord {
        TestRecord {
            value,
            weight: value as f32 * 0.5,
        }
    }

    fn device() -> HeadlessDevice {
        HeadlessDevice::new(vk::Extent2D {
            width: 64,
            height: 64,
        })
    }

    /// 录制一次上传并提交，返回 upload 的返回值
    fn upload_and_submit<const N: usize>(
        device: &mut HeadlessDevice,
        manager: &mut DataManager<TestRecord, N>,
    ) -> bool {
        let mut recorder = device.begin_commands(GfxQueueType::Transfer, "upload").unwrap();
        let uploaded = manager.upload(device, &mut recorder).unwrap();
        device.submit(GfxQueueType::Transfer, recorder).unwrap();
        uploaded
    }

    #[test]
    fn test_slot_growth_and_copies() {
        prism_crate_tools::init_log::init_log();
        let mut device = device();
        let mut manager = DataManager::<TestRecord, 16>::new("test");

        let handles = (0..17).map(|i| manager.add(&mut device, record(i)).unwrap()).collect_vec();
        assert_eq!(manager.slot_count(), 2);
        assert_eq!(manager.len(), 17);

        let bindings = manager.bindings();
        for (i, handle) in handles.iter().take(16).enumerate() {
            assert_eq!(*handle, DataHandle::new(bindings[0], i as u32));
        }
        assert_eq!(handles[16], DataHandle::new(bindings[1], 0));

        assert!(upload_and_submit(&mut device, &mut manager));
        let submission = &device.submissions()[0];
        assert_eq!(submission.copy_count(), 2);
        // 两个 slot 的 binding 在第一次提交时写入描述符集
        assert_eq!(submission.bindless_writes.len(), 2);

        // device buffer 中的内容与内存中的记录一致
        let expected = (0..16).map(record).collect_vec();
        let data = device.buffer_data(manager.slot_buffer(bindings[0]).unwrap()).unwrap();
        assert_eq!(&data[..16 * size_of::<TestRecord>()], bytemuck::cast_slice::<TestRecord, u8>(&expected));
        let data = device.buffer_data(manager.slot_buffer(bindings[1]).unwrap()).unwrap();
        assert_eq!(&data[..size_of::<TestRecord>()], bytemuck::bytes_of(&record(16)));
    }

    #[test]
    fn test_upload_idempotent() {
        let mut device = device();
        let mut manager = DataManager::<TestRecord, 4>::new("idempotent");
        for i in 0..6 {
            manager.add(&mut device, record(i)).unwrap();
        }

        assert!(upload_and_submit(&mut device, &mut manager));
        assert!(!manager.has_dirty_slot());
        assert!(!upload_and_submit(&mut device, &mut manager));

        let submissions = device.submissions();
        assert_eq!(submissions[0].copy_count(), 2);
        assert_eq!(submissions[1].copy_count(), 0);
        let barriers =
            manager.upload_barrier(vk::PipelineStageFlags2::VERTEX_SHADER, vk::AccessFlags2::SHADER_STORAGE_READ);
        assert!(barriers.is_empty());
    }

    #[test]
    fn test_handle_stability() {
        let mut device = device();
        let mut manager = DataManager::<TestRecord, 3>::new("stable");

        let first = manager.add(&mut device, record(100)).unwrap();
        let later = (0..20).map(|i| (manager.add(&mut device, record(i)).unwrap(), i)).collect_vec();

        assert_eq!(*manager.get(first), record(100));
        for (handle, i) in later {
            assert_eq!(*manager.get(handle), record(i));
        }
        assert_eq!(manager.slot_count(), 7);
        assert_eq!(manager.iter().count(), 21);
        assert_eq!(manager.iter().next(), Some((first, &record(100))));
    }

    #[test]
    fn test_set_dirties_only_owning_slot() {
        let mut device = device();
        let mut manager = DataManager::<TestRecord, 2>::new("dirty");
        let handles = (0..4).map(|i| manager.add(&mut device, record(i)).unwrap()).collect_vec();
        upload_and_submit(&mut device, &mut manager);

        manager.set(handles[3], record(42));
        let bindings = manager.bindings();
        assert!(!manager.is_dirty(bindings[0]));
        assert!(manager.is_dirty(bindings[1]));

        assert!(upload_and_submit(&mut device, &mut manager));
        assert_eq!(device.submissions()[1].copy_count(), 1);

        let barriers =
            manager.upload_barrier(vk::PipelineStageFlags2::FRAGMENT_SHADER, vk::AccessFlags2::SHADER_STORAGE_READ);
        assert_eq!(barriers.len(), 1);
        let slot_buffer = device.buffer_info(manager.slot_buffer(bindings[1]).unwrap()).unwrap().buffer;
        assert_eq!(barriers[0].vk_buffer(), slot_buffer);
        assert_eq!(barriers[0].barrier_mask().src_access, vk::AccessFlags2::TRANSFER_WRITE);

        let data = device.buffer_data(manager.slot_buffer(bindings[1]).unwrap()).unwrap();
        assert_eq!(&data[size_of::<TestRecord>()..2 * size_of::<TestRecord>()], bytemuck::bytes_of(&record(42)));

        manager.get_mut(handles[0]).weight = 3.0;
        assert!(manager.is_dirty(bindings[0]));
    }

    #[test]
    fn test_reserve_reallocates_keeping_binding() {
        let mut device = device();
        let mut manager = DataManager::<TestRecord, 4>::new("reserve");
        for i in 0..3 {
            manager.add(&mut device, record(i)).unwrap();
        }
        upload_and_submit(&mut device, &mut manager);
        let bindings = manager.bindings();
        let old_buffer = manager.slot_buffer(bindings[0]).unwrap();
        assert_eq!(manager.slots[0].gpu_capacity, 4);

        // 容量不超过当前值时什么也不做
        manager.reserve(bindings[0], 4);
        assert!(!manager.has_dirty_slot());

        manager.reserve(bindings[0], 12);
        assert!(manager.is_dirty(bindings[0]));
        assert!(upload_and_submit(&mut device, &mut manager));

        assert!(manager.slots[0].gpu_capacity >= 12);
        assert_eq!(manager.slots[0].gpu_capacity, manager.slots[0].records.capacity());
        assert_eq!(manager.bindings(), bindings);

        // 同一个数组元素被改写为新的 buffer
        let new_buffer = manager.slot_buffer(bindings[0]).unwrap();
        assert_ne!(new_buffer, old_buffer);
        let new_vk_buffer = device.buffer_info(new_buffer).unwrap().buffer;
        assert_eq!(
            device.submissions()[1].bindless_writes,
            vec![GfxBindlessWrite {
                binding: GfxBindlessBinding::STORAGE_BUFFERS,
                array_element: bindings[0],
                resource: GfxBindlessResource::storage_buffer(new_vk_buffer),
            }]
        );
        assert!(device.buffer_info(new_buffer).unwrap().size >= (12 * size_of::<TestRecord>()) as vk::DeviceSize);

        // 新 buffer 中有完整的记录
        let expected = (0..3).map(record).collect_vec();
        let data = device.buffer_data(new_buffer).unwrap();
        assert_eq!(&data[..3 * size_of::<TestRecord>()], bytemuck::cast_slice::<TestRecord, u8>(&expected));

        // 旧 buffer 在帧结束之后才销毁
        assert!(device.buffer_info(old_buffer).is_some());
        device.end_frame();
        assert!(device.buffer_info(old_buffer).is_none());
        assert_eq!(device.bindless_set().storage_buffers().occupied_count(), 1);
    }

    #[test]
    #[should_panic(expected = "missing slot binding")]
    fn test_reserve_missing_slot_panics() {
        let mut manager = DataManager::<TestRecord, 4>::new("reserve-missing");
        manager.reserve(3, 8);
    }

    #[test]
    fn test_emplace_zeroed() {
        let mut device = device();
        let mut manager = DataManager::<TestRecord, 8>::new("emplace");
        let handle = manager.emplace(&mut device, |r| r.value = 7).unwrap();
        assert_eq!(
            *manager.get(handle),
            TestRecord {
                value: 7,
                weight: 0.0
            }
        );
        assert!(manager.contains(handle));
        assert!(!manager.contains(DataHandle::new(handle.binding, 1)));
    }

    #[test]
    fn test_bindless_exhausted() {
        let mut device = HeadlessDevice::with_bindless_capacity(
            vk::Extent2D {
                width: 64,
                height: 64,
            },
            GfxBindlessCapacity {
                storage_buffers: 1,
                ..Default::default()
            },
        );
        let mut manager = DataManager::<TestRecord, 2>::new("exhausted");
        manager.add(&mut device, record(0)).unwrap();
        manager.add(&mut device, record(1)).unwrap();
        assert!(manager.add(&mut device, record(2)).is_err());
        assert_eq!(manager.slot_count(), 1);
    }

    #[test]
    fn test_destroy_releases_bindings() {
        let mut device = device();
        let mut manager = DataManager::<TestRecord, 2>::new("destroy");
        for i in 0..5 {
            manager.add(&mut device, record(i)).unwrap();
        }
        upload_and_submit(&mut device, &mut manager);
        assert_eq!(device.bindless_set().storage_buffers().occupied_count(), 3);

        manager.destroy(&mut device);
        // 下标在帧结束之后才回到空闲列表
        assert_eq!(device.bindless_set().storage_buffers().occupied_count(), 3);
        device.end_frame();
        assert_eq!(device.bindless_set().storage_buffers().occupied_count(), 0);
        assert_eq!(device.live_buffer_count(), 0);
        assert!(manager.is_empty());
    }

    #[test]
    #[should_panic(expected = "missing slot")]
    fn test_stale_handle_panics() {
        let manager = DataManager::<TestRecord, 2>::new("stale");
        manager.get(DataHandle::new(9, 0));
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_index_out_of_range_panics() {
        let mut device = device();
        let mut manager = DataManager::<TestRecord, 4>::new("range");
        let handle = manager.add(&mut device, record(0)).unwrap();
        manager.set(DataHandle::new(handle.binding, 2), record(1));
    }
}
