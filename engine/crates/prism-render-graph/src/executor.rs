//! 帧执行
//!
//! 每帧：
//!
//! 1. 解析所有资源的物理句柄：transient 资源从设备的缓存中申请，swapchain 绑定到当前帧的 image
//! 2. 解析每个 pass 读写的 binding
//! 3. 按提交顺序录制每个 pass：pre / copy barrier → 录制回调 → post barrier，然后提交

use ash::vk;
use prism_gfx::basic::color::LabelColor;
use prism_gfx::commands::recorder::GfxCommandRecorder;
use prism_gfx::commands::rendering_info::{GfxRenderingAttachment, GfxRenderingInfo};
use prism_gfx::device::{GfxDevice, GfxRenderTargetRequest, GfxTransientBufferRequest};
use prism_gfx::resources::format::GfxFormatUtils;

use crate::barrier::RgBarrier;
use crate::pass::{RgPass, RgPassContext, bindless_binding_of};
use crate::render_graph::{RenderGraph, RgState};
use crate::resource::{RgAttachment, RgPhysicalResource, RgResource};
use crate::resource_usage::{RgAccess, RgReadType, RgWriteType};

impl RenderGraph<'_> {
    /// 执行一帧
    ///
    /// 设备层的错误直接返回；资源尺寸为 0 等违反约束的情况会 panic
    pub fn execute<D: GfxDevice>(&mut self, device: &mut D) -> anyhow::Result<()> {
        let _span = tracy_client::span!("RenderGraph::execute");
        assert_eq!(self.state, RgState::Execute, "render graph: execute called before build");

        self.resolve_resources(device)?;
        self.resolve_bindings();

        for index in 0..self.passes.len() {
            self.execute_pass(device, index)?;
        }

        self.frame_count += 1;
        Ok(())
    }
}

// 资源解析
impl RenderGraph<'_> {
    fn resolve_resources<D: GfxDevice>(&mut self, device: &mut D) -> anyhow::Result<()> {
        let swapchain_extent = device.swapchain_extent();
        for resource in self.resources.iter_mut() {
            if resource.readers().is_empty() && resource.writers().is_empty() {
                continue;
            }
            let Some(attachment) = resource.attachment().copied() else {
                continue;
            };

            if resource.is_swapchain() {
                resource.physical = Some(RgPhysicalResource::Image(device.swapchain_target()));
                continue;
            }
            if resource.is_imported() {
                assert!(resource.physical.is_some(), "imported resource '{}' has no physical handle", resource.name());
                continue;
            }

            resource.physical = Some(match attachment {
                RgAttachment::Image(image) => {
                    let extent = image.size.resolve(swapchain_extent);
                    assert!(
                        extent.width > 0 && extent.height > 0,
                        "render graph resource '{}' resolves to a zero-sized image: {:?}",
                        resource.name(),
                        extent
                    );
                    let request = GfxRenderTargetRequest {
                        width: extent.width,
                        height: extent.height,
                        format: image.format,
                        usage: resource.all_uses().image_usage(),
                        resource_id: resource.id().0,
                    };
                    RgPhysicalResource::Image(device.request_render_target(&request)?)
                }
                RgAttachment::Buffer(buffer) => {
                    assert!(
                        buffer.size > 0,
                        "render graph resource '{}' resolves to a zero-sized buffer",
                        resource.name()
                    );
                    let request = GfxTransientBufferRequest {
                        size: buffer.size,
                        usage: resource.all_uses().buffer_usage() | buffer.usage,
                        resource_id: resource.id().0,
                    };
                    RgPhysicalResource::Buffer(device.request_transient_buffer(&request)?)
                }
            });
            log::trace!("render graph resource '{}' resolved: {:?}", resource.name(), resource.physical);
        }
        Ok(())
    }

    /// attachment 的 binding 在声明时确定，这里只更新 bindless 下标
    fn resolve_bindings(&mut self) {
        let resources = &self.resources;
        for pass in self.passes.iter_mut() {
            for read in pass.reads.iter_mut() {
                if read.ty == RgReadType::DepthStencilAttachment {
                    continue;
                }
                let resource = resources.get(read.resource);
                read.binding = bindless_binding_of(read.ty.into(), resource.image(), resource.buffer());
            }
            for write in pass.writes.iter_mut() {
                if matches!(write.ty, RgWriteType::ColorAttachment | RgWriteType::DepthStencilAttachment) {
                    continue;
                }
                let resource = resources.get(write.resource);
                write.binding = bindless_binding_of(write.ty.into(), resource.image(), resource.buffer());
            }
        }
    }
}

// pass 的录制
impl RenderGraph<'_> {
    fn execute_pass<D: GfxDevice>(&mut self, device: &mut D, index: usize) -> anyhow::Result<()> {
        let _span = tracy_client::span!("RenderGraph::execute_pass");
        let queue = self.passes[index].ty().queue_type();
        let mut recorder = device.begin_commands(queue, self.passes[index].name())?;

        let mut callbacks = std::mem::take(&mut self.passes[index].callbacks);
        {
            let pass = &self.passes[index];
            if self.settings.debug_labels {
                recorder.begin_label(pass.name(), LabelColor::COLOR_PASS);
            }
            self.record_barriers(&mut recorder, &pass.barriers.pre);
            self.record_barriers(&mut recorder, &pass.barriers.copy);

            let mut rendering_info = self.rendering_info(pass);
            let ctx = RgPassContext {
                pass_id: pass.id(),
                pass_name: pass.name(),
                reads: &pass.reads,
                writes: &pass.writes,
                resources: &self.resources,
                render_extent: rendering_info
                    .as_ref()
                    .map_or_else(|| device.swapchain_extent(), |info| info.render_area.extent),
            };

            // 有 attachment 但没有需要 dynamic rendering 的回调时，也要执行一次 load / store
            let any_rendering_callback = callbacks.iter().any(|c| c.uses_dynamic_rendering);
            let mut inside_rendering = false;
            if let Some(info) = rendering_info.as_mut().filter(|_| !any_rendering_callback) {
                Self::begin_rendering(&mut recorder, info);
                inside_rendering = true;
            }

            for callback in callbacks.iter_mut() {
                match (callback.uses_dynamic_rendering, inside_rendering, rendering_info.as_mut()) {
                    (true, false, Some(info)) => {
                        Self::begin_rendering(&mut recorder, info);
                        inside_rendering = true;
                    }
                    (false, true, _) => {
                        recorder.end_rendering();
                        inside_rendering = false;
                    }
                    _ => {}
                }
                (callback.func)(&mut recorder, &ctx);
            }
            if inside_rendering {
                recorder.end_rendering();
            }

            self.record_barriers(&mut recorder, &pass.barriers.post);
            if self.settings.debug_labels {
                recorder.end_label();
            }
        }
        self.passes[index].callbacks = callbacks;

        device.submit(queue, recorder)
    }

    /// 同一个 pass 内再次开始 rendering 时保留之前的内容
    fn begin_rendering(recorder: &mut impl GfxCommandRecorder, info: &mut GfxRenderingInfo) {
        recorder.begin_rendering(info);
        for attachment in info
            .color_attachments
            .iter_mut()
            .chain(info.depth_attachment.iter_mut())
            .chain(info.stencil_attachment.iter_mut())
        {
            if attachment.load_op != vk::AttachmentLoadOp::LOAD {
                attachment.load_op = vk::AttachmentLoadOp::LOAD;
                attachment.clear_value = None;
            }
        }
    }

    fn record_barriers(&self, recorder: &mut impl GfxCommandRecorder, barriers: &[RgBarrier]) {
        if barriers.is_empty() {
            return;
        }
        let mut image_barriers = Vec::new();
        let mut buffer_barriers = Vec::new();
        for barrier in barriers {
            let resource = self.resources.get(barrier.resource);
            match resource.physical.as_ref() {
                Some(RgPhysicalResource::Image(image)) => image_barriers.push(barrier.to_gfx_image_barrier(image)),
                Some(RgPhysicalResource::Buffer(buffer)) => buffer_barriers.push(barrier.to_gfx_buffer_barrier(buffer)),
                None => panic!("barrier on unresolved render graph resource '{}'", resource.name()),
            }
        }
        recorder.pipeline_barrier(&image_barriers, &buffer_barriers);
    }

    /// 第一个写入者：有 clear 值时 clear，否则不关心原内容；imported 资源和后续写入者保留原内容
    fn attachment_of(&self, pass: &RgPass, resource: &RgResource) -> GfxRenderingAttachment {
        let image = resource.image().unwrap_or_else(|| {
            panic!("attachment '{}' of pass '{}' is not a resolved image", resource.name(), pass.name())
        });
        let uses = resource.uses_of(pass.id());
        let layout = RgAccess::from_uses(uses, pass.ty(), true)
            .map(|a| a.layout)
            .unwrap_or_else(|| panic!("pass '{}' uses '{}' with incompatible layouts", pass.name(), resource.name()));

        if !uses.is_write() {
            return GfxRenderingAttachment::load(image.view, layout).read_only();
        }
        let clear = match resource.attachment() {
            Some(RgAttachment::Image(attachment)) => attachment.clear,
            _ => None,
        };
        match (resource.first_writer() == Some(pass.id()), clear) {
            (true, Some(clear)) => GfxRenderingAttachment::clear(image.view, layout, clear),
            (true, None) if !resource.is_imported() => GfxRenderingAttachment {
                load_op: vk::AttachmentLoadOp::DONT_CARE,
                ..GfxRenderingAttachment::load(image.view, layout)
            },
            _ => GfxRenderingAttachment::load(image.view, layout),
        }
    }

    /// dynamic rendering 的参数，没有 attachment 的 pass 返回 None
    fn rendering_info(&self, pass: &RgPass) -> Option<GfxRenderingInfo> {
        if !pass.has_attachments() {
            return None;
        }

        let mut extent: Option<vk::Extent2D> = None;
        let mut check_extent = |resource: &RgResource| {
            let image_extent = resource.image().map(|i| i.extent).unwrap_or_default();
            match extent {
                None => extent = Some(image_extent),
                Some(e) => assert_eq!(
                    e,
                    image_extent,
                    "attachments of pass '{}' have different extents ('{}')",
                    pass.name(),
                    resource.name()
                ),
            }
        };

        let mut color_attachments = Vec::new();
        for write in pass.writes.iter().filter(|w| w.ty == RgWriteType::ColorAttachment) {
            let resource = self.resources.get(write.resource);
            check_extent(resource);
            color_attachments.push(self.attachment_of(pass, resource));
        }

        let depth = pass
            .writes
            .iter()
            .find(|w| w.ty == RgWriteType::DepthStencilAttachment)
            .map(|w| w.resource)
            .or_else(|| pass.reads.iter().find(|r| r.ty == RgReadType::DepthStencilAttachment).map(|r| r.resource))
            .map(|id| self.resources.get(id));
        let mut depth_attachment = None;
        let mut stencil_attachment = None;
        if let Some(resource) = depth {
            check_extent(resource);
            let attachment = self.attachment_of(pass, resource);
            let format = resource.image().map(|i| i.format).unwrap_or_default();
            if GfxFormatUtils::has_stencil(format) {
                stencil_attachment = Some(attachment);
            }
            depth_attachment = Some(attachment);
        }

        let mut info = GfxRenderingInfo::new(extent.unwrap_or_default());
        info.color_attachments = color_attachments;
        info.depth_attachment = depth_attachment;
        info.stencil_attachment = stencil_attachment;
        Some(info)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use ash::vk::Handle;
    use prism_gfx::commands::rendering_info::GfxClearValue;
    use prism_gfx::headless::{GfxRecordedCommand, HeadlessDevice, HeadlessSubmission};
    use prism_gfx::resources::handles::{GfxBufferCreateInfo, GfxImageTarget};

    use super::*;
    use crate::pass::RgPassType;
    use crate::resource::RgImageAttachment;
    use crate::resource_state::RgImageState;

    const COLOR: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
    const DEPTH: vk::Format = vk::Format::D32_SFLOAT;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    fn rendering_infos(submission: &HeadlessSubmission) -> Vec<&GfxRenderingInfo> {
        submission
            .commands
            .iter()
            .filter_map(|c| match c {
                GfxRecordedCommand::BeginRendering(info) => Some(info),
                _ => None,
            })
            .collect()
    }

    fn position(submission: &HeadlessSubmission, pred: impl Fn(&GfxRecordedCommand) -> bool) -> usize {
        submission.commands.iter().position(pred).unwrap()
    }

    #[test]
    fn test_deferred_frames() {
        let albedo_bind = Cell::new(None);
        let lighting_extent = Cell::new(vk::Extent2D::default());

        prism_crate_tools::init_log::init_log();
        let mut device = HeadlessDevice::new(extent(800, 600));
        let mut graph = RenderGraph::with_settings(crate::settings::RgSettings {
            log_execution_plan: true,
            ..Default::default()
        });
        {
            let mut gbuffer = graph.add_pass("gbuffer", RgPassType::Graphics);
            gbuffer.write_color(
                "albedo",
                RgImageAttachment::swapchain_relative(COLOR).with_clear(GfxClearValue::BLACK),
            );
            gbuffer.write_depth(
                "depth",
                RgImageAttachment::swapchain_relative(DEPTH).with_clear(GfxClearValue::DEPTH_ONE),
            );
            gbuffer.add_render_function(true, |_, _| {});
        }
        {
            let mut lighting = graph.add_pass("lighting", RgPassType::Graphics);
            lighting.read_sampled("albedo");
            lighting.read_depth("depth");
            lighting.write_swapchain();
            lighting.add_render_function(true, |_, ctx| {
                albedo_bind.set(Some(ctx.get_read_bind("albedo", RgReadType::Sampled)));
                lighting_extent.set(ctx.render_extent());
            });
        }
        graph.build();

        for _ in 0..2 {
            device.acquire_next_image();
            graph.execute(&mut device).unwrap();
            device.end_frame();
        }
        assert_eq!(graph.frame_count(), 2);
        // 尺寸不变，render target 跨帧复用
        assert_eq!(device.render_target_creations(), 2);

        let submissions = device.take_submissions();
        assert_eq!(submissions.len(), 4);
        assert_eq!(submissions[0].label, "gbuffer");
        assert_eq!(submissions[1].label, "lighting");

        let gbuffer = rendering_infos(&submissions[0]);
        assert_eq!(gbuffer.len(), 1);
        assert_eq!(gbuffer[0].color_attachments[0].load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(gbuffer[0].depth_attachment.unwrap().load_op, vk::AttachmentLoadOp::CLEAR);
        assert!(gbuffer[0].stencil_attachment.is_none());
        assert_eq!(gbuffer[0].render_area.extent, extent(800, 600));

        let lighting = rendering_infos(&submissions[1]);
        let depth = lighting[0].depth_attachment.unwrap();
        assert_eq!(depth.layout, vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL);
        assert_eq!(depth.store_op, vk::AttachmentStoreOp::NONE);
        assert_eq!(lighting[0].color_attachments[0].load_op, vk::AttachmentLoadOp::DONT_CARE);

        let present = submissions[1].image_barriers().last().unwrap();
        assert_eq!(present.new_layout(), vk::ImageLayout::PRESENT_SRC_KHR);
        // 每帧使用当前的 swapchain image
        let present_next = submissions[3].image_barriers().last().unwrap();
        assert_ne!(present.vk_image(), present_next.vk_image());

        assert!(albedo_bind.get().is_some());
        assert_eq!(lighting_extent.get(), extent(800, 600));
    }

    #[test]
    fn test_resize_recreates_targets() {
        let mut device = HeadlessDevice::new(extent(64, 64));
        let mut graph = RenderGraph::new();
        graph.add_pass("half", RgPassType::Graphics).write_color("half", RgImageAttachment::scaled(COLOR, 0.5, 0.5));
        graph.add_pass("blit", RgPassType::Graphics).write_swapchain();
        graph.build();

        graph.execute(&mut device).unwrap();
        assert_eq!(device.render_target_creations(), 1);

        device.resize_swapchain(extent(128, 96));
        graph.execute(&mut device).unwrap();
        assert_eq!(device.render_target_creations(), 2);
        assert_eq!(graph.resource("half").unwrap().image().unwrap().extent, extent(64, 48));
    }

    #[test]
    fn test_callback_rendering_scopes() {
        let mut device = HeadlessDevice::new(extent(32, 32));
        let src = device.create_buffer(&GfxBufferCreateInfo::new_stage_buffer(16, "src")).unwrap();
        let dst = device
            .create_buffer(&GfxBufferCreateInfo::new_device_buffer(16, vk::BufferUsageFlags::TRANSFER_DST, "dst"))
            .unwrap();
        let src = device.buffer_info(src).unwrap().buffer;
        let dst = device.buffer_info(dst).unwrap().buffer;

        let mut graph = RenderGraph::new();
        {
            let mut pass = graph.add_pass("mixed", RgPassType::Graphics);
            pass.write_color("color", RgImageAttachment::swapchain_relative(COLOR).with_clear(GfxClearValue::BLACK));
            pass.add_render_function(false, move |cmd, _| {
                let region = vk::BufferCopy {
                    src_offset: 0,
                    dst_offset: 0,
                    size: 16,
                };
                cmd.copy_buffer(src, dst, &[region]);
            });
            pass.add_render_function(true, |_, _| {});
            pass.add_render_function(false, |_, _| {});
            pass.add_render_function(true, |_, _| {});
        }
        graph.add_pass("clear-only", RgPassType::Graphics).write_color(
            "other",
            RgImageAttachment::absolute(COLOR, 16, 16).with_clear(GfxClearValue::BLACK),
        );
        graph.build();
        graph.execute(&mut device).unwrap();

        let submissions = device.take_submissions();
        let mixed = &submissions[0];
        let copy = position(mixed, |c| matches!(c, GfxRecordedCommand::CopyBuffer { .. }));
        let begin = position(mixed, |c| matches!(c, GfxRecordedCommand::BeginRendering(_)));
        assert!(copy < begin);

        // 第二次开始 rendering 时保留第一次的内容
        let infos = rendering_infos(mixed);
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[0].color_attachments[0].load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(infos[1].color_attachments[0].load_op, vk::AttachmentLoadOp::LOAD);

        // 没有回调的 pass 也会执行一次 clear
        let clear_only = rendering_infos(&submissions[1]);
        assert_eq!(clear_only.len(), 1);
        assert_eq!(clear_only[0].render_area.extent, extent(16, 16));

        // debug label 包裹整个 pass
        assert!(matches!(mixed.commands.first(), Some(GfxRecordedCommand::BeginLabel(_))));
        assert!(matches!(mixed.commands.last(), Some(GfxRecordedCommand::EndLabel)));
    }

    #[test]
    fn test_imported_image_barrier_uses_handle() {
        let mut device = HeadlessDevice::new(extent(32, 32));
        let mut graph = RenderGraph::new();
        let history = graph.import_image("history", COLOR, RgImageState::SHADER_READ_FRAGMENT);
        graph.add_pass("accumulate", RgPassType::AsyncCompute).write("history", RgWriteType::StorageStore);
        graph.build();

        let target = GfxImageTarget {
            image: vk::Image::from_raw(0xABCD),
            view: vk::ImageView::from_raw(0xABCE),
            format: COLOR,
            extent: extent(32, 32),
            sampled_index: None,
            storage_index: Some(7),
        };
        graph.set_imported_image(history, target);
        graph.execute(&mut device).unwrap();

        let submission = &device.submissions()[0];
        assert_eq!(submission.queue, prism_gfx::commands::queue::GfxQueueType::Compute);
        let barrier = submission.image_barriers().next().unwrap();
        assert_eq!(barrier.vk_image(), target.image);
        assert_eq!(barrier.old_layout(), vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(barrier.new_layout(), vk::ImageLayout::GENERAL);
        assert_eq!(graph.pass(crate::pass::RgPassId(0)).writes()[0].binding, Some(7));
    }

    #[test]
    #[should_panic(expected = "zero-sized")]
    fn test_zero_sized_attachment() {
        let mut device = HeadlessDevice::new(extent(32, 32));
        let mut graph = RenderGraph::new();
        graph.add_pass("broken", RgPassType::Graphics).write_color("empty", RgImageAttachment::absolute(COLOR, 0, 8));
        graph.build();
        let _ = graph.execute(&mut device);
    }

    #[test]
    #[should_panic(expected = "has no physical handle")]
    fn test_imported_without_handle() {
        let mut device = HeadlessDevice::new(extent(32, 32));
        let mut graph = RenderGraph::new();
        graph.import_image("history", COLOR, RgImageState::UNDEFINED);
        graph.add_pass("accumulate", RgPassType::AsyncCompute).write("history", RgWriteType::StorageStore);
        graph.build();
        let _ = graph.execute(&mut device);
    }
}
