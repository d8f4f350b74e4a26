//! 执行计划的打印

use ash::vk;
use itertools::Itertools;

use crate::barrier::RgBarrier;
use crate::render_graph::RenderGraph;

const STAGE_NAMES: &[(vk::PipelineStageFlags2, &str)] = &[
    (vk::PipelineStageFlags2::TOP_OF_PIPE, "TOP_OF_PIPE"),
    (vk::PipelineStageFlags2::DRAW_INDIRECT, "DRAW_INDIRECT"),
    (vk::PipelineStageFlags2::VERTEX_SHADER, "VERTEX_SHADER"),
    (vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS, "EARLY_FRAGMENT_TESTS"),
    (vk::PipelineStageFlags2::FRAGMENT_SHADER, "FRAGMENT_SHADER"),
    (vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS, "LATE_FRAGMENT_TESTS"),
    (vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, "COLOR_ATTACHMENT_OUTPUT"),
    (vk::PipelineStageFlags2::COMPUTE_SHADER, "COMPUTE_SHADER"),
    (vk::PipelineStageFlags2::TRANSFER, "TRANSFER"),
    (vk::PipelineStageFlags2::HOST, "HOST"),
    (vk::PipelineStageFlags2::BOTTOM_OF_PIPE, "BOTTOM_OF_PIPE"),
];

const ACCESS_NAMES: &[(vk::AccessFlags2, &str)] = &[
    (vk::AccessFlags2::INDIRECT_COMMAND_READ, "INDIRECT_CMD_READ"),
    (vk::AccessFlags2::INPUT_ATTACHMENT_READ, "INPUT_ATTACH_READ"),
    (vk::AccessFlags2::SHADER_READ, "SHADER_READ"),
    (vk::AccessFlags2::SHADER_STORAGE_READ, "STORAGE_READ"),
    (vk::AccessFlags2::SHADER_STORAGE_WRITE, "STORAGE_WRITE"),
    (vk::AccessFlags2::COLOR_ATTACHMENT_READ, "COLOR_ATTACH_READ"),
    (vk::AccessFlags2::COLOR_ATTACHMENT_WRITE, "COLOR_ATTACH_WRITE"),
    (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ, "DEPTH_ATTACH_READ"),
    (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE, "DEPTH_ATTACH_WRITE"),
    (vk::AccessFlags2::TRANSFER_READ, "TRANSFER_READ"),
    (vk::AccessFlags2::TRANSFER_WRITE, "TRANSFER_WRITE"),
    (vk::AccessFlags2::HOST_WRITE, "HOST_WRITE"),
];

/// 格式化 PipelineStageFlags2 为可读字符串
pub fn format_pipeline_stage(stage: vk::PipelineStageFlags2) -> String {
    if stage == vk::PipelineStageFlags2::NONE {
        return "NONE".to_string();
    }
    let names = STAGE_NAMES.iter().filter(|(flag, _)| stage.contains(*flag)).map(|(_, name)| *name).collect_vec();
    if names.is_empty() { format!("{:?}", stage) } else { names.join(" | ") }
}

/// 格式化 AccessFlags2 为可读字符串
pub fn format_access_flags(access: vk::AccessFlags2) -> String {
    if access == vk::AccessFlags2::NONE {
        return "NONE".to_string();
    }
    let names = ACCESS_NAMES.iter().filter(|(flag, _)| access.contains(*flag)).map(|(_, name)| *name).collect_vec();
    if names.is_empty() { format!("{:?}", access) } else { names.join(" | ") }
}

impl RenderGraph<'_> {
    /// 打印所有 pass、它们的读写以及 barrier
    pub fn print_execution_plan(&self) {
        log::info!("╔══════════════════════════════════════════════════════════════════╗");
        log::info!("║                  Render Graph Execution Plan                     ║");
        log::info!("╠══════════════════════════════════════════════════════════════════╣");
        log::info!(
            "║ {} passes, {} resources: [{}]",
            self.passes.len(),
            self.resources.len(),
            self.passes.iter().map(|p| p.name()).join(" → ")
        );
        log::info!("╚══════════════════════════════════════════════════════════════════╝");

        for pass in &self.passes {
            log::info!("┌─────────────────────────────────────────────────────────────────┐");
            log::info!(
                "│ #{} \"{}\" ({:?}, {} callbacks)",
                pass.id().0,
                pass.name(),
                pass.ty(),
                pass.callback_count()
            );
            log::info!("├─────────────────────────────────────────────────────────────────┤");
            for read in pass.reads() {
                log::info!("│   read  \"{}\" as {:?}", self.resources.get(read.resource).name(), read.ty);
            }
            for write in pass.writes() {
                log::info!("│   write \"{}\" as {:?}", self.resources.get(write.resource).name(), write.ty);
            }

            let barriers = pass.barriers();
            if barriers.is_empty() {
                log::info!("│ No barriers required");
            }
            for (phase, list) in [("pre", &barriers.pre), ("copy", &barriers.copy), ("post", &barriers.post)] {
                for barrier in list {
                    self.print_barrier(phase, barrier);
                }
            }
            log::info!("└─────────────────────────────────────────────────────────────────┘");
        }

        for (producer, consumer, dependency) in self.dependency_graph.edges() {
            log::info!(
                "  {} → {}: {:?} on \"{}\"",
                self.passes[producer.index()].name(),
                self.passes[consumer.index()].name(),
                dependency.kind,
                self.resources.get(dependency.resource).name()
            );
        }
    }

    fn print_barrier(&self, phase: &str, barrier: &RgBarrier) {
        log::info!("│   🔒 [{}] {:?} \"{}\"", phase, barrier.kind, self.resources.get(barrier.resource).name());
        if barrier.is_image {
            log::info!("│       Layout: {:?} → {:?}", barrier.old_layout, barrier.new_layout);
        }
        log::info!(
            "│       Stage:  {} → {}",
            format_pipeline_stage(barrier.src_stage),
            format_pipeline_stage(barrier.dst_stage)
        );
        log::info!(
            "│       Access: {} → {}",
            format_access_flags(barrier.src_access),
            format_access_flags(barrier.dst_access)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_flags() {
        assert_eq!(
            format_pipeline_stage(vk::PipelineStageFlags2::FRAGMENT_SHADER | vk::PipelineStageFlags2::COMPUTE_SHADER),
            "FRAGMENT_SHADER | COMPUTE_SHADER"
        );
        assert_eq!(format_access_flags(vk::AccessFlags2::NONE), "NONE");
        assert_eq!(format_access_flags(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE), "COLOR_ATTACH_WRITE");
    }
}
