use std::fmt;

/// 指向 [`crate::DataManager`] 中一条记录的句柄
///
/// - `binding`：slot 在 bindless storage buffer 数组中的下标
/// - `index`：记录在 slot 内的下标
///
/// 布局与 shader 侧一致，可以直接写进 push constant 或其他 GPU 记录中
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DataHandle {
    pub binding: u32,
    pub index: u32,
}

impl DataHandle {
    /// shader 侧约定的无效值
    pub const INVALID: Self = Self {
        binding: u32::MAX,
        index: u32::MAX,
    };

    #[inline]
    pub const fn new(binding: u32, index: u32) -> Self {
        Self { binding, index }
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }
}

impl Default for DataHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for DataHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() { write!(f, "[{}:{}]", self.binding, self.index) } else { write!(f, "[invalid]") }
    }
}
