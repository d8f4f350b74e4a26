use std::fmt;

/// 命令提交的目标队列
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GfxQueueType {
    Graphics,
    Compute,
    Transfer,
}

impl GfxQueueType {
    pub const COUNT: usize = 3;

    pub const ALL: [GfxQueueType; Self::COUNT] = [Self::Graphics, Self::Compute, Self::Transfer];

    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Self::Graphics => 0,
            Self::Compute => 1,
            Self::Transfer => 2,
        }
    }
}

impl fmt::Display for GfxQueueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Graphics => write!(f, "graphics"),
            Self::Compute => write!(f, "compute"),
            Self::Transfer => write!(f, "transfer"),
        }
    }
}
