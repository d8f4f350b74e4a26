use std::cell::Cell;
use std::rc::Rc;

use ash::vk;
use prism_gfx::commands::rendering_info::GfxClearValue;
use prism_render_graph::{
    RenderGraph, RgBufferAttachment, RgImageAttachment, RgPassType, RgReadType, RgSettings, RgWriteType,
};

/// 录制回调与 app 之间共享的计数
///
/// 回调被渲染图持有，所以这里用 `Rc<Cell<_>>` 共享
#[derive(Clone, Default)]
pub struct FrameStats {
    /// 本帧需要绘制的 instance 数，由 app 在执行渲染图之前写入
    pub instance_count: Rc<Cell<u32>>,
    pub draw_calls: Rc<Cell<u64>>,
    pub dispatches: Rc<Cell<u64>>,
    /// lighting pass 最近一次拿到的 irradiance 纹理 binding
    pub irradiance_binding: Rc<Cell<Option<u32>>>,
}

pub struct DeferredGraph;
impl DeferredGraph {
    pub const ALBEDO_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;
    pub const NORMAL_FORMAT: vk::Format = vk::Format::A2R10G10B10_UNORM_PACK32;
    pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;
    pub const HDR_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

    /// DDGI 的 irradiance atlas 尺寸
    pub const IRRADIANCE_EXTENT: vk::Extent2D = vk::Extent2D {
        width: 512,
        height: 64,
    };

    /// 每个 instance 一条 `VkDrawIndexedIndirectCommand`
    pub const MAX_DRAWS: u64 = 4096;

    /// cull → gbuffer → ddgi-update → lighting → tonemap
    pub fn build(settings: RgSettings, stats: &FrameStats) -> RenderGraph<'static> {
        let mut graph = RenderGraph::with_settings(settings);

        {
            let mut cull = graph.add_pass("cull", RgPassType::Graphics);
            cull.write_storage_buffer(
                "draw-args",
                RgBufferAttachment::new(Self::MAX_DRAWS * size_of::<vk::DrawIndexedIndirectCommand>() as u64),
            );
            let dispatches = stats.dispatches.clone();
            cull.add_render_function(false, move |_cmd, ctx| {
                log::trace!("{}: cull dispatch", ctx.pass_name());
                dispatches.set(dispatches.get() + 1);
            });
        }
        {
            let mut gbuffer = graph.add_pass("gbuffer", RgPassType::Graphics);
            gbuffer.read_indirect_args("draw-args");
            gbuffer.write_color(
                "albedo",
                RgImageAttachment::swapchain_relative(Self::ALBEDO_FORMAT).with_clear(GfxClearValue::BLACK),
            );
            gbuffer.write_color(
                "normal",
                RgImageAttachment::swapchain_relative(Self::NORMAL_FORMAT).with_clear(GfxClearValue::BLACK),
            );
            gbuffer.write_depth(
                "depth",
                RgImageAttachment::swapchain_relative(Self::DEPTH_FORMAT).with_clear(GfxClearValue::DEPTH_ONE),
            );
            let instance_count = stats.instance_count.clone();
            let draw_calls = stats.draw_calls.clone();
            gbuffer.add_render_function(true, move |_cmd, _ctx| {
                draw_calls.set(draw_calls.get() + instance_count.get() as u64);
            });
        }
        {
            let mut ddgi = graph.add_pass("ddgi-update", RgPassType::Graphics);
            ddgi.read_sampled("depth");
            ddgi.write_storage_image(
                "irradiance",
                RgImageAttachment::absolute(
                    Self::HDR_FORMAT,
                    Self::IRRADIANCE_EXTENT.width,
                    Self::IRRADIANCE_EXTENT.height,
                ),
            );
            let dispatches = stats.dispatches.clone();
            ddgi.add_render_function(false, move |_cmd, ctx| {
                let _ = ctx.get_write_bind("irradiance", RgWriteType::StorageStore);
                dispatches.set(dispatches.get() + 1);
            });
        }
        {
            let mut lighting = graph.add_pass("lighting", RgPassType::Graphics);
            lighting.read_sampled("albedo");
            lighting.read_sampled("normal");
            lighting.read_sampled("irradiance");
            lighting.write_color("hdr", RgImageAttachment::swapchain_relative(Self::HDR_FORMAT));
            let draw_calls = stats.draw_calls.clone();
            let irradiance_binding = stats.irradiance_binding.clone();
            lighting.add_render_function(true, move |_cmd, ctx| {
                irradiance_binding.set(Some(ctx.get_read_bind("irradiance", RgReadType::Sampled)));
                draw_calls.set(draw_calls.get() + 1);
            });
        }
        {
            let mut tonemap = graph.add_pass("tonemap", RgPassType::Graphics);
            tonemap.read_sampled("hdr");
            tonemap.write_swapchain();
            let draw_calls = stats.draw_calls.clone();
            tonemap.add_render_function(true, move |_cmd, _ctx| {
                draw_calls.set(draw_calls.get() + 1);
            });
        }

        graph.build();
        graph
    }
}
