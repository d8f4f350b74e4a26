/// 帧序号与 frames in flight 的对应关系
pub struct GfxFrameCounter {
    /// 当前的帧序号，一直累加
    frame_id: u64,
}
// new & init
impl GfxFrameCounter {
    pub const FIF_COUNT: usize = 3;

    pub fn new(init_frame_id: u64) -> Self {
        Self { frame_id: init_frame_id }
    }
}
// update
impl GfxFrameCounter {
    #[inline]
    pub fn next_frame(&mut self) {
        self.frame_id = self.frame_id.wrapping_add(1);
    }
}
// getters
impl GfxFrameCounter {
    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }

    /// 当前帧使用的 frame in flight 槽位
    #[inline]
    pub fn fif_index(&self) -> usize {
        self.frame_id as usize % Self::FIF_COUNT
    }

    /// 序号不大于该值的帧，其命令一定已经执行完毕
    ///
    /// 只有在等待过当前槽位的 fence 之后才成立
    #[inline]
    pub fn retired_frame_id(&self) -> Option<u64> {
        self.frame_id.checked_sub(Self::FIF_COUNT as u64)
    }

    #[inline]
    pub fn frame_name(&self) -> String {
        format!("[F{}-{}]", self.frame_id, self.fif_index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fif_index_wraps() {
        let mut counter = GfxFrameCounter::new(0);
        let indices: Vec<_> = (0..5)
            .map(|_| {
                let index = counter.fif_index();
                counter.next_frame();
                index
            })
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 0, 1]);
        assert_eq!(counter.retired_frame_id(), Some(2));
        assert_eq!(GfxFrameCounter::new(1).retired_frame_id(), None);
    }
}
