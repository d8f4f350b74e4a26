//! barrier 推导
//!
//! 对每个资源，按 pass 顺序归并它的 reader 和 writer，得到一串访问：
//!
//! - 同一个 pass 既读又写时算作一次写，使用方式合并
//! - 连续的、layout 相同的读合并为一组，组内不需要 barrier
//! - 相邻两次访问之间按 hazard 类型生成一个 barrier：
//!
//! | 前一次访问 | 当前访问 | barrier 位置 |
//! |---|---|---|
//! | 初始状态 | 任意 | 当前 pass 的 pre |
//! | 写 | 读组 (RaW) | 写入 pass 的 post |
//! | 写 | 写 (WaW) | 前一个写入 pass 的 post |
//! | 读组 | 写 (WaR) | 当前 pass 的 pre |
//! | 读组 | layout 不同的读组 | 当前组第一个 pass 的 pre |
//!
//! swapchain 在最后一次访问之后转换到 PRESENT_SRC。

use ash::vk;
use itertools::{EitherOrBoth, Itertools};

use crate::barrier::{RgBarrier, RgBarrierKind};
use crate::graph::{RgDependency, RgDependencyGraph, RgDependencyKind};
use crate::pass::{RgPass, RgPassId};
use crate::resource::{RgResource, RgResourceTable};
use crate::resource_state::{RgImageState, write_access_only};
use crate::resource_usage::{RgAccess, RgUseFlags};
use crate::settings::RgSettings;

/// 上一次访问
enum RgPrevAccess {
    Initial(RgImageState),
    Write {
        pass: RgPassId,
        access: RgAccess,
    },
    Reads {
        passes: Vec<RgPassId>,
        stage: vk::PipelineStageFlags2,
        layout: vk::ImageLayout,
    },
}

pub(crate) struct RgBarrierSynthesizer<'s, 'a> {
    passes: &'s mut [RgPass<'a>],
    settings: &'s RgSettings,
    graph: RgDependencyGraph,
}

impl<'s, 'a> RgBarrierSynthesizer<'s, 'a> {
    pub(crate) fn new(passes: &'s mut [RgPass<'a>], settings: &'s RgSettings) -> Self {
        let graph = RgDependencyGraph::new(passes.len());
        Self {
            passes,
            settings,
            graph,
        }
    }

    /// 为所有资源生成 barrier，返回依赖图
    pub(crate) fn synthesize(mut self, resources: &RgResourceTable) -> RgDependencyGraph {
        for pass in self.passes.iter_mut() {
            pass.barriers = Default::default();
        }
        for resource in resources.iter() {
            if self.check_topology(resource) {
                self.synthesize_resource(resource);
            }
        }
        self.graph.validate();
        self.graph
    }

    /// 返回 false 表示跳过该资源
    fn check_topology(&self, resource: &RgResource) -> bool {
        if resource.readers().is_empty() && resource.writers().is_empty() {
            if !resource.is_swapchain() {
                log::warn!("render graph resource '{}' is never used", resource.name());
            }
            return false;
        }

        if resource.attachment().is_none() {
            assert!(
                resource.writers().is_empty(),
                "render graph resource '{}' is written but never described",
                resource.name()
            );
        }

        if resource.writers().is_empty() && !resource.is_imported() && !resource.is_swapchain() {
            let reader = &self.passes[resource.readers()[0].index()];
            if self.settings.strict_topology {
                panic!("pass '{}' reads '{}' which no pass writes", reader.name(), resource.name());
            }
            log::warn!("pass '{}' reads '{}' which no pass writes", reader.name(), resource.name());
            // 没有描述的占位资源无法解析，直接跳过
            return resource.attachment().is_some();
        }
        true
    }

    fn access_of(&self, resource: &RgResource, pass: RgPassId) -> RgAccess {
        let uses = resource.uses_of(pass);
        let pass = &self.passes[pass.index()];
        if let Some(error) = uses.validate(pass.ty(), resource.is_image()) {
            panic!("pass '{}' uses '{}' as {:?}: {}", pass.name(), resource.name(), uses, error);
        }
        RgAccess::from_uses(uses, pass.ty(), resource.is_image()).unwrap_or_else(|| {
            panic!("pass '{}' uses '{}' with incompatible layouts: {:?}", pass.name(), resource.name(), uses)
        })
    }

    fn synthesize_resource(&mut self, resource: &RgResource) {
        let accesses = resource
            .readers()
            .iter()
            .merge_join_by(resource.writers().iter(), |r, w| r.cmp(w))
            .map(|pair| match pair {
                EitherOrBoth::Left(pass) | EitherOrBoth::Right(pass) | EitherOrBoth::Both(pass, _) => *pass,
            })
            .map(|pass| (pass, self.access_of(resource, pass)))
            .collect_vec();

        let is_image = resource.is_image();
        let new_barrier = |kind, src_stage, src_access, dst_stage, dst_access, old_layout, new_layout| RgBarrier {
            resource: resource.id(),
            kind,
            src_stage,
            dst_stage,
            src_access,
            dst_access,
            old_layout,
            new_layout,
            is_image,
        };

        let mut prev = RgPrevAccess::Initial(resource.initial_state());
        let mut i = 0;
        while i < accesses.len() {
            let (pass, access) = accesses[i];

            if access.is_write() {
                match &prev {
                    RgPrevAccess::Initial(initial) => {
                        if Self::needs_first_use_barrier(initial, access.layout, is_image) {
                            self.push_pre(
                                pass,
                                access.uses,
                                new_barrier(
                                    RgBarrierKind::FirstUse,
                                    initial.stage,
                                    write_access_only(initial.access),
                                    access.dst_stage,
                                    access.dst_access,
                                    initial.layout,
                                    access.layout,
                                ),
                            );
                        }
                    }
                    RgPrevAccess::Write {
                        pass: writer,
                        access: write,
                    } => {
                        self.add_dependency(resource, *writer, pass, RgDependencyKind::WriteAfterWrite);
                        self.passes[writer.index()].barriers.post.push(new_barrier(
                            RgBarrierKind::WriteAfterWrite,
                            write.src_stage,
                            write.src_access,
                            access.dst_stage,
                            access.dst_access,
                            write.layout,
                            access.layout,
                        ));
                    }
                    RgPrevAccess::Reads { passes, stage, layout } => {
                        for reader in passes {
                            self.add_dependency(resource, *reader, pass, RgDependencyKind::WriteAfterRead);
                        }
                        // 读之后的写只需要执行依赖
                        self.push_pre(
                            pass,
                            access.uses,
                            new_barrier(
                                RgBarrierKind::WriteAfterRead,
                                *stage,
                                vk::AccessFlags2::NONE,
                                access.dst_stage,
                                access.dst_access,
                                *layout,
                                access.layout,
                            ),
                        );
                    }
                }
                prev = RgPrevAccess::Write { pass, access };
                i += 1;
                continue;
            }

            // layout 相同的连续读合并为一组
            let group_end = accesses[i..]
                .iter()
                .position(|(_, a)| a.is_write() || a.layout != access.layout)
                .map_or(accesses.len(), |n| i + n);
            let group = &accesses[i..group_end];
            let group_passes = group.iter().map(|(p, _)| *p).collect_vec();
            let dst_stage = group.iter().fold(vk::PipelineStageFlags2::NONE, |s, (_, a)| s | a.dst_stage);
            let dst_access = group.iter().fold(vk::AccessFlags2::NONE, |s, (_, a)| s | a.dst_access);
            let src_stage = group.iter().fold(vk::PipelineStageFlags2::NONE, |s, (_, a)| s | a.src_stage);
            let group_uses = group.iter().fold(RgUseFlags::empty(), |s, (_, a)| s | a.uses);

            match &prev {
                RgPrevAccess::Initial(initial) => {
                    if Self::needs_first_use_barrier(initial, access.layout, is_image) {
                        self.push_pre(
                            pass,
                            group_uses,
                            new_barrier(
                                RgBarrierKind::FirstUse,
                                initial.stage,
                                write_access_only(initial.access),
                                dst_stage,
                                dst_access,
                                initial.layout,
                                access.layout,
                            ),
                        );
                    }
                }
                RgPrevAccess::Write {
                    pass: writer,
                    access: write,
                } => {
                    for reader in &group_passes {
                        self.add_dependency(resource, *writer, *reader, RgDependencyKind::ReadAfterWrite);
                    }
                    self.passes[writer.index()].barriers.post.push(new_barrier(
                        RgBarrierKind::ReadAfterWrite,
                        write.src_stage,
                        write.src_access,
                        dst_stage,
                        dst_access,
                        write.layout,
                        access.layout,
                    ));
                }
                RgPrevAccess::Reads {
                    passes,
                    stage,
                    layout,
                } => {
                    for reader in passes {
                        self.check_same_queue(resource, *reader, pass);
                    }
                    self.push_pre(
                        pass,
                        group_uses,
                        new_barrier(
                            RgBarrierKind::LayoutChange,
                            *stage,
                            vk::AccessFlags2::NONE,
                            dst_stage,
                            dst_access,
                            *layout,
                            access.layout,
                        ),
                    );
                }
            }
            prev = RgPrevAccess::Reads {
                passes: group_passes,
                stage: src_stage,
                layout: access.layout,
            };
            i = group_end;
        }

        if resource.is_swapchain() {
            let (last_pass, src_stage, src_access, layout) = match &prev {
                RgPrevAccess::Write { pass, access } => (*pass, access.src_stage, access.src_access, access.layout),
                RgPrevAccess::Reads { passes, stage, layout } => {
                    (passes[passes.len() - 1], *stage, vk::AccessFlags2::NONE, *layout)
                }
                RgPrevAccess::Initial(_) => unreachable!("swapchain with accesses has a previous access"),
            };
            self.passes[last_pass.index()].barriers.post.push(new_barrier(
                RgBarrierKind::Present,
                src_stage,
                src_access,
                vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
                vk::AccessFlags2::NONE,
                layout,
                vk::ImageLayout::PRESENT_SRC_KHR,
            ));
        }
    }

    /// 第一次访问：image 在 layout 相同且初始状态没有未完成的写入时可以省略；
    /// buffer 只在初始状态有写入时需要
    fn needs_first_use_barrier(initial: &RgImageState, layout: vk::ImageLayout, is_image: bool) -> bool {
        if is_image {
            initial.layout != layout || initial.is_write()
        } else {
            initial.is_write()
        }
    }

    /// 目标是 copy / blit 的 barrier 放入 copy 组
    fn push_pre(&mut self, pass: RgPassId, consumer_uses: RgUseFlags, barrier: RgBarrier) {
        let barriers = &mut self.passes[pass.index()].barriers;
        if RgUseFlags::TRANSFER.contains(consumer_uses) && !consumer_uses.is_empty() {
            barriers.copy.push(barrier);
        } else {
            barriers.pre.push(barrier);
        }
    }

    fn check_same_queue(&self, resource: &RgResource, producer: RgPassId, consumer: RgPassId) {
        let producer = &self.passes[producer.index()];
        let consumer = &self.passes[consumer.index()];
        assert_eq!(
            producer.ty().queue_type(),
            consumer.ty().queue_type(),
            "cross-queue dependency on '{}' between pass '{}' and pass '{}' is not supported",
            resource.name(),
            producer.name(),
            consumer.name()
        );
    }

    fn add_dependency(
        &mut self,
        resource: &RgResource,
        producer: RgPassId,
        consumer: RgPassId,
        kind: RgDependencyKind,
    ) {
        self.check_same_queue(resource, producer, consumer);
        self.graph.add_dependency(
            producer,
            consumer,
            RgDependency {
                kind,
                resource: resource.id(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pass::RgPassType;
    use crate::render_graph::RenderGraph;
    use crate::resource::{RgBufferAttachment, RgImageAttachment};
    use crate::resource_usage::{RgReadType, RgWriteType};

    const COLOR: vk::Format = vk::Format::R8G8B8A8_UNORM;
    const DEPTH: vk::Format = vk::Format::D32_SFLOAT;

    fn barriers_of(graph: &RenderGraph, pass: &str, resource: &str) -> Vec<RgBarrier> {
        let resource = graph.resource(resource).unwrap().id();
        graph.find_pass(pass).unwrap().barriers().for_resource(resource).copied().collect_vec()
    }

    #[test]
    fn test_color_read_after_write() {
        let mut graph = RenderGraph::new();
        graph.add_pass("A", RgPassType::Graphics).write_color("color", RgImageAttachment::swapchain_relative(COLOR));
        graph.add_pass("B", RgPassType::Graphics).read_sampled("color");
        graph.build();

        let color = graph.resource("color").unwrap().id();
        let a = graph.find_pass("A").unwrap();
        let post = a.barriers().post.iter().filter(|b| b.resource == color).collect_vec();
        assert_eq!(post.len(), 1);
        assert_eq!(post[0].kind, RgBarrierKind::ReadAfterWrite);
        assert_eq!(post[0].src_stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(post[0].src_access, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
        assert!(post[0].dst_stage.contains(vk::PipelineStageFlags2::FRAGMENT_SHADER));
        assert_eq!(post[0].dst_access, vk::AccessFlags2::SHADER_READ);
        assert_eq!(post[0].new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);

        // 第一次写入从 UNDEFINED 转换
        assert_eq!(a.barriers().pre.len(), 1);
        assert_eq!(a.barriers().pre[0].kind, RgBarrierKind::FirstUse);
        assert_eq!(a.barriers().pre[0].old_layout, vk::ImageLayout::UNDEFINED);

        // 消费者一侧没有重复的 barrier
        assert!(barriers_of(&graph, "B", "color").is_empty());
        assert!(graph.dependency_graph().has_dependency(RgPassId(0), RgPassId(1)));
    }

    #[test]
    fn test_swapchain_present() {
        let mut graph = RenderGraph::new();
        graph.add_pass("scene", RgPassType::Graphics).write_color("hdr", RgImageAttachment::swapchain_relative(COLOR));
        {
            let mut tonemap = graph.add_pass("tonemap", RgPassType::Graphics);
            tonemap.read_sampled("hdr");
            tonemap.write_swapchain();
        }
        graph.build();

        let swapchain = barriers_of(&graph, "tonemap", RgResourceTable::SWAPCHAIN_NAME);
        assert_eq!(swapchain.len(), 2);
        assert_eq!(swapchain[0].kind, RgBarrierKind::FirstUse);
        assert_eq!(swapchain[0].new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let tonemap = graph.find_pass("tonemap").unwrap();
        let present = tonemap.barriers().post.last().unwrap();
        assert_eq!(present.kind, RgBarrierKind::Present);
        assert_eq!(present.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(present.new_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(present.src_access, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
    }

    #[test]
    fn test_first_use_from_imported_state() {
        let mut graph = RenderGraph::new();
        graph.import_image("history", COLOR, RgImageState::SHADER_READ_FRAGMENT);
        graph.import_image("env", COLOR, RgImageState::SHADER_READ_FRAGMENT);
        graph.add_pass("accumulate", RgPassType::AsyncCompute).write("history", RgWriteType::StorageStore);
        graph.add_pass("sky", RgPassType::Graphics).read_sampled("env");
        graph.build();

        let history = barriers_of(&graph, "accumulate", "history");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, RgBarrierKind::FirstUse);
        assert_eq!(history[0].old_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(history[0].new_layout, vk::ImageLayout::GENERAL);
        assert_eq!(history[0].src_stage, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert_eq!(history[0].src_access, vk::AccessFlags2::NONE);

        // 已经在目标 layout 且没有未完成的写入
        assert!(barriers_of(&graph, "sky", "env").is_empty());
    }

    #[test]
    fn test_reads_share_one_barrier() {
        let mut graph = RenderGraph::new();
        graph.add_pass("draw", RgPassType::Graphics).write_color("color", RgImageAttachment::swapchain_relative(COLOR));
        graph.add_pass("blur", RgPassType::Graphics).read_sampled("color");
        graph.add_pass("bloom", RgPassType::Graphics).read_sampled("color");
        graph.add_pass("readback", RgPassType::Graphics).read("color", RgReadType::CopySrc);
        graph.build();

        let draw = barriers_of(&graph, "draw", "color");
        assert_eq!(draw.iter().filter(|b| b.kind == RgBarrierKind::ReadAfterWrite).count(), 1);
        assert!(barriers_of(&graph, "blur", "color").is_empty());
        assert!(barriers_of(&graph, "bloom", "color").is_empty());

        // layout 不同的读之间只有一个 barrier，并且放在 copy 组
        let readback = graph.find_pass("readback").unwrap();
        assert!(readback.barriers().pre.is_empty());
        assert_eq!(readback.barriers().copy.len(), 1);
        let change = readback.barriers().copy[0];
        assert_eq!(change.kind, RgBarrierKind::LayoutChange);
        assert_eq!(change.old_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(change.new_layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        assert_eq!(change.src_access, vk::AccessFlags2::NONE);
        assert_eq!(change.dst_access, vk::AccessFlags2::TRANSFER_READ);

        // 读之间没有依赖边
        assert_eq!(graph.dependency_graph().predecessors(RgPassId(2)), vec![RgPassId(0)]);
        assert_eq!(graph.dependency_graph().edge_count(), 2);
    }

    #[test]
    fn test_buffer_write_after_write_and_read() {
        let mut graph = RenderGraph::new();
        let attachment = RgBufferAttachment::new(1024);
        graph.add_pass("spawn", RgPassType::AsyncCompute).write_storage_buffer("particles", attachment);
        graph.add_pass("simulate", RgPassType::AsyncCompute).write_storage_buffer("particles", attachment);
        graph.add_pass("cull", RgPassType::AsyncCompute).read_storage("particles");
        graph.add_pass("reset", RgPassType::AsyncCompute).write("particles", RgWriteType::StorageStore);
        graph.build();

        let spawn = graph.find_pass("spawn").unwrap().barriers();
        assert!(spawn.pre.is_empty(), "buffer first use from UNDEFINED needs no barrier");
        assert_eq!(spawn.post.len(), 1);
        assert_eq!(spawn.post[0].kind, RgBarrierKind::WriteAfterWrite);
        assert!(!spawn.post[0].is_image);
        assert_eq!(spawn.post[0].src_access, vk::AccessFlags2::SHADER_STORAGE_WRITE);
        assert_eq!(
            spawn.post[0].dst_access,
            vk::AccessFlags2::SHADER_STORAGE_READ | vk::AccessFlags2::SHADER_STORAGE_WRITE
        );

        let simulate = graph.find_pass("simulate").unwrap().barriers();
        assert_eq!(simulate.post.len(), 1);
        assert_eq!(simulate.post[0].kind, RgBarrierKind::ReadAfterWrite);
        assert_eq!(simulate.post[0].dst_access, vk::AccessFlags2::SHADER_STORAGE_READ);

        let reset = graph.find_pass("reset").unwrap().barriers();
        assert_eq!(reset.pre.len(), 1);
        assert_eq!(reset.pre[0].kind, RgBarrierKind::WriteAfterRead);
        assert_eq!(reset.pre[0].src_stage, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(reset.pre[0].src_access, vk::AccessFlags2::NONE);

        let kinds = graph.dependency_graph().edges().map(|(p, c, d)| (p.0, c.0, d.kind)).collect_vec();
        assert_eq!(
            kinds,
            vec![
                (0, 1, RgDependencyKind::WriteAfterWrite),
                (1, 2, RgDependencyKind::ReadAfterWrite),
                (2, 3, RgDependencyKind::WriteAfterRead),
            ]
        );
    }

    #[test]
    fn test_read_write_in_one_pass_counts_as_write() {
        let mut graph = RenderGraph::new();
        graph.add_pass("raster", RgPassType::Graphics).write_color("img", RgImageAttachment::swapchain_relative(COLOR));
        {
            let mut post = graph.add_pass("post", RgPassType::Graphics);
            post.read_storage("img");
            post.write("img", RgWriteType::StorageStore);
        }
        graph.build();

        let raster = barriers_of(&graph, "raster", "img");
        let waw = raster.iter().find(|b| b.kind == RgBarrierKind::WriteAfterWrite).unwrap();
        assert_eq!(waw.old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(waw.new_layout, vk::ImageLayout::GENERAL);
        assert!(barriers_of(&graph, "post", "img").is_empty());
    }

    #[test]
    fn test_depth_read_after_write() {
        let mut graph = RenderGraph::new();
        graph
            .add_pass("prepass", RgPassType::Graphics)
            .write_depth("depth", RgImageAttachment::swapchain_relative(DEPTH));
        graph.add_pass("ssao", RgPassType::Graphics).read_sampled("depth");
        graph.build();

        let raw = barriers_of(&graph, "prepass", "depth")
            .into_iter()
            .filter(|b| b.kind == RgBarrierKind::ReadAfterWrite)
            .collect_vec();
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].src_stage, vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS);
        assert_eq!(raw[0].src_access, vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE);
        assert!(raw[0].dst_stage.contains(vk::PipelineStageFlags2::FRAGMENT_SHADER));
        assert_eq!(raw[0].dst_access, vk::AccessFlags2::SHADER_READ);
        assert_eq!(raw[0].old_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        assert_eq!(raw[0].new_layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert!(barriers_of(&graph, "ssao", "depth").is_empty());
    }

    #[test]
    fn test_color_write_after_write() {
        let mut graph = RenderGraph::new();
        graph
            .add_pass("opaque", RgPassType::Graphics)
            .write_color("color", RgImageAttachment::swapchain_relative(COLOR));
        graph.add_pass("transparent", RgPassType::Graphics).write("color", RgWriteType::ColorAttachment);
        graph.build();

        let waw = barriers_of(&graph, "opaque", "color")
            .into_iter()
            .filter(|b| b.kind == RgBarrierKind::WriteAfterWrite)
            .collect_vec();
        assert_eq!(waw.len(), 1);
        assert_eq!(waw[0].src_stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(waw[0].src_access, vk::AccessFlags2::COLOR_ATTACHMENT_WRITE);
        assert_eq!(waw[0].dst_stage, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(
            waw[0].dst_access,
            vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE
        );
        assert_eq!(waw[0].old_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert_eq!(waw[0].new_layout, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        assert!(barriers_of(&graph, "transparent", "color").is_empty());
    }

    #[test]
    fn test_depth_write_after_write() {
        let mut graph = RenderGraph::new();
        graph
            .add_pass("prepass", RgPassType::Graphics)
            .write_depth("depth", RgImageAttachment::swapchain_relative(DEPTH));
        graph.add_pass("forward", RgPassType::Graphics).write("depth", RgWriteType::DepthStencilAttachment);
        graph.build();

        let waw = barriers_of(&graph, "prepass", "depth")
            .into_iter()
            .filter(|b| b.kind == RgBarrierKind::WriteAfterWrite)
            .collect_vec();
        assert_eq!(waw.len(), 1);
        assert_eq!(waw[0].src_stage, vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS);
        assert_eq!(waw[0].src_access, vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE);
        assert_eq!(waw[0].dst_stage, vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS);
        assert_eq!(
            waw[0].dst_access,
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE
        );
        assert_eq!(waw[0].new_layout, vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        assert!(barriers_of(&graph, "forward", "depth").is_empty());
    }

    #[test]
    #[should_panic(expected = "incompatible layouts")]
    fn test_sampled_depth_attachment_rejected() {
        // 采样描述符固定为 SHADER_READ_ONLY_OPTIMAL，不能同时作为只读深度附件
        let mut graph = RenderGraph::new();
        graph
            .add_pass("prepass", RgPassType::Graphics)
            .write_depth("depth", RgImageAttachment::swapchain_relative(DEPTH));
        {
            let mut decal = graph.add_pass("decal", RgPassType::Graphics);
            decal.read_sampled("depth");
            decal.read_depth("depth");
        }
        graph.build();
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    enum Op {
        Write,
        Sampled,
        CopySrc,
    }

    impl Op {
        fn layout(self) -> vk::ImageLayout {
            match self {
                Op::Write => vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                Op::Sampled => vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                Op::CopySrc => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            }
        }
    }

    /// 相邻两次访问需要的 barrier 数量
    fn expected_between(prev: Op, next: Op) -> usize {
        match (prev, next) {
            (_, Op::Write) | (Op::Write, _) => 1,
            (a, b) => usize::from(a.layout() != b.layout()),
        }
    }

    #[test]
    fn test_barrier_count_over_access_sequences() {
        let ops = [Op::Write, Op::Sampled, Op::CopySrc];
        for len in 1..=4 {
            for tail in (1..len).map(|_| ops.iter().copied()).multi_cartesian_product() {
                // 第一个访问固定为写入，保证资源有生产者
                let sequence = std::iter::once(Op::Write).chain(tail).collect_vec();

                let mut graph = RenderGraph::new();
                for (i, op) in sequence.iter().enumerate() {
                    let name = format!("p{i}");
                    let mut pass = graph.add_pass(&name, RgPassType::Graphics);
                    match (i, op) {
                        (0, _) => {
                            pass.write_color("color", RgImageAttachment::swapchain_relative(COLOR));
                        }
                        (_, Op::Write) => {
                            pass.write("color", RgWriteType::ColorAttachment);
                        }
                        (_, Op::Sampled) => {
                            pass.read_sampled("color");
                        }
                        (_, Op::CopySrc) => {
                            pass.read("color", RgReadType::CopySrc);
                        }
                    }
                }
                graph.build();

                let all = (0..sequence.len())
                    .flat_map(|i| barriers_of(&graph, &format!("p{i}"), "color"))
                    .collect_vec();
                let first_use = all.iter().filter(|b| b.kind == RgBarrierKind::FirstUse).count();
                let expected: usize = sequence.iter().tuple_windows().map(|(a, b)| expected_between(*a, *b)).sum();
                assert_eq!(first_use, 1, "sequence {:?}", sequence);
                assert_eq!(all.len() - first_use, expected, "sequence {:?}", sequence);

                // 相同 layout 的相邻读之间没有 barrier
                for (i, (a, b)) in sequence.iter().tuple_windows().enumerate() {
                    if *a != Op::Write && *b != Op::Write && a.layout() == b.layout() {
                        assert!(
                            barriers_of(&graph, &format!("p{}", i + 1), "color").is_empty(),
                            "sequence {:?}",
                            sequence
                        );
                    }
                }
            }
        }
    }

    #[test]
    #[should_panic(expected = "cross-queue dependency")]
    fn test_cross_queue_rejected() {
        let mut graph = RenderGraph::new();
        graph.add_pass("draw", RgPassType::Graphics).write_color("color", RgImageAttachment::swapchain_relative(COLOR));
        graph.add_pass("compute", RgPassType::AsyncCompute).read_sampled("color");
        graph.build();
    }

    #[test]
    #[should_panic(expected = "which no pass writes")]
    fn test_read_without_writer_strict() {
        let mut graph = RenderGraph::with_settings(RgSettings {
            strict_topology: true,
            ..Default::default()
        });
        graph.add_pass("lighting", RgPassType::Graphics).read_sampled("missing");
        graph.build();
    }

    #[test]
    fn test_read_without_writer_lenient() {
        let mut graph = RenderGraph::with_settings(RgSettings {
            strict_topology: false,
            ..Default::default()
        });
        graph.add_pass("lighting", RgPassType::Graphics).read_sampled("missing");
        graph.build();
        assert!(graph.find_pass("lighting").unwrap().barriers().is_empty());
    }

    #[test]
    #[should_panic(expected = "only allowed during setup")]
    fn test_add_pass_after_build() {
        let mut graph = RenderGraph::new();
        graph.build();
        graph.add_pass("late", RgPassType::Graphics);
    }
}
