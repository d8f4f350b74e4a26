/// 渲染图的设置
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RgSettings {
    /// 用 debug label 包裹每个 pass
    pub debug_labels: bool,
    /// build 之后打印一次执行计划
    pub log_execution_plan: bool,
    /// 读取一个没有写入者的资源时 panic，否则只打印警告
    pub strict_topology: bool,
}

impl Default for RgSettings {
    fn default() -> Self {
        Self {
            debug_labels: true,
            log_execution_plan: false,
            strict_topology: cfg!(debug_assertions),
        }
    }
}
