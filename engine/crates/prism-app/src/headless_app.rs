use ash::vk;
use prism_gfx::commands::queue::GfxQueueType;
use prism_gfx::commands::recorder::GfxCommandRecorder;
use prism_gfx::device::GfxDevice;
use prism_gfx::headless::HeadlessDevice;
use prism_render_graph::{RenderGraph, RgSettings};
use prism_scene::SceneManager;
use prism_scene::components::ddgi_volume::GpuDdgiVolume;
use prism_scene::components::material::GpuMaterial;
use prism_scene::components::mesh::GpuMesh;
use prism_scene::handles::DdgiVolumeHandle;

use crate::deferred_graph::{DeferredGraph, FrameStats};

/// 一帧的执行结果
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub frame: u64,
    /// 本帧场景数据上传录制的拷贝数
    pub upload_copies: usize,
    pub submissions: usize,
    pub image_barriers: usize,
    pub buffer_barriers: usize,
}

/// 在 headless 设备上运行的 app
///
/// 每帧：
/// 1. 移动 DDGI 体积，模拟跟随相机
/// 2. 上传场景数据，并插入 upload → shader read 的 barrier
/// 3. 执行渲染图
pub struct HeadlessApp {
    device: HeadlessDevice,
    scene: SceneManager,
    graph: RenderGraph<'static>,
    stats: FrameStats,

    ddgi_volume: DdgiVolumeHandle,
}

// new & init
impl HeadlessApp {
    pub fn new(extent: vk::Extent2D, settings: RgSettings) -> anyhow::Result<Self> {
        tracy_client::Client::start();
        tracy_client::set_thread_name!("HeadlessThread");

        let mut device = HeadlessDevice::new(extent);
        let mut scene = SceneManager::new(&mut device)?;
        let ddgi_volume = Self::init_scene(&mut device, &mut scene)?;

        let stats = FrameStats::default();
        let graph = DeferredGraph::build(settings, &stats);
        log::info!(
            "headless app initialized: {}x{}, {} passes, {} instances",
            extent.width,
            extent.height,
            graph.pass_count(),
            scene.instances().len()
        );

        Ok(Self {
            device,
            scene,
            graph,
            stats,
            ddgi_volume,
        })
    }

    /// 一个简单的场景：地面加一排立方体，共用两种材质
    fn init_scene(device: &mut HeadlessDevice, scene: &mut SceneManager) -> anyhow::Result<DdgiVolumeHandle> {
        scene.add_mesh(
            device,
            "plane",
            GpuMesh::new(0, 4, 1, 6).with_bounds(glam::vec3(-1.0, 0.0, -1.0), glam::vec3(1.0, 0.0, 1.0)),
        )?;
        scene.add_mesh(
            device,
            "cube",
            GpuMesh::new(2, 24, 3, 36).with_bounds(glam::Vec3::splat(-0.5), glam::Vec3::splat(0.5)),
        )?;
        scene.add_material(device, "floor", GpuMaterial::from_base_color(glam::vec4(0.8, 0.8, 0.8, 1.0)))?;
        scene.add_material(device, "red", GpuMaterial::from_base_color(glam::vec4(0.9, 0.1, 0.1, 1.0)))?;

        scene.add_instance(device, "floor", "plane", "floor", glam::Mat4::from_scale(glam::Vec3::splat(10.0)))?;
        for i in 0..8 {
            let translation = glam::vec3(i as f32 * 1.5 - 5.0, 0.5, 0.0);
            scene.add_instance(device, &format!("cube-{i}"), "cube", "red", glam::Mat4::from_translation(translation))?;
        }

        scene.add_ddgi_volume(
            device,
            "main",
            GpuDdgiVolume::new(glam::vec3(0.0, 2.0, 0.0), glam::Vec3::splat(1.0), glam::uvec3(16, 4, 16)),
        )
    }
}
// getters
impl HeadlessApp {
    #[inline]
    pub fn graph(&self) -> &RenderGraph<'static> {
        &self.graph
    }

    #[inline]
    pub fn scene(&self) -> &SceneManager {
        &self.scene
    }

    #[inline]
    pub fn scene_mut(&mut self) -> &mut SceneManager {
        &mut self.scene
    }

    #[inline]
    pub fn device(&self) -> &HeadlessDevice {
        &self.device
    }

    #[inline]
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }
}
// update
impl HeadlessApp {
    pub fn run_frame(&mut self) -> anyhow::Result<FrameReport> {
        let _span = tracy_client::span!("HeadlessApp::run_frame");
        let frame = self.graph.frame_count();
        self.device.acquire_next_image();

        let angle = frame as f32 * 0.1;
        let origin = glam::vec3(angle.cos(), 2.0, angle.sin());
        self.scene.ddgi_volumes_mut().set_origin(self.ddgi_volume, origin);

        let upload_copies = self.upload_scene()?;

        self.stats.instance_count.set(self.scene.instances().len() as u32);
        self.graph.execute(&mut self.device)?;
        self.device.end_frame();
        tracy_client::frame_mark();

        let submissions = self.device.take_submissions();
        let report = FrameReport {
            frame,
            upload_copies,
            submissions: submissions.len(),
            image_barriers: submissions.iter().map(|s| s.image_barriers().count()).sum(),
            buffer_barriers: submissions.iter().map(|s| s.buffer_barriers().count()).sum(),
        };
        log::info!("frame #{}: {:?}", frame, report);
        Ok(report)
    }

    /// 模拟窗口尺寸变化
    pub fn resize(&mut self, extent: vk::Extent2D) {
        log::info!("resize to {}x{}", extent.width, extent.height);
        self.device.resize_swapchain(extent);
    }

    /// 上传 dirty 的场景数据，返回拷贝数
    fn upload_scene(&mut self) -> anyhow::Result<usize> {
        let mut recorder = self.device.begin_commands(GfxQueueType::Graphics, "scene-upload")?;
        let uploaded = self.scene.upload_all(&mut self.device, &mut recorder)?;
        if uploaded {
            let barriers = self.scene.upload_barriers(
                vk::PipelineStageFlags2::VERTEX_SHADER
                    | vk::PipelineStageFlags2::FRAGMENT_SHADER
                    | vk::PipelineStageFlags2::COMPUTE_SHADER,
                vk::AccessFlags2::SHADER_STORAGE_READ,
            );
            recorder.pipeline_barrier(&[], &barriers);
        }

        let copies = recorder
            .commands()
            .iter()
            .filter(|c| matches!(c, prism_gfx::headless::GfxRecordedCommand::CopyBuffer { .. }))
            .count();
        self.device.submit(GfxQueueType::Graphics, recorder)?;
        Ok(copies)
    }
}
// destroy
impl HeadlessApp {
    pub fn destroy(mut self) {
        self.scene.destroy(&mut self.device);
        self.device.end_frame();
        log::info!("headless app destroyed after {} frames", self.graph.frame_count());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_frames() {
        prism_crate_tools::init_log::init_log();
        let mut app = HeadlessApp::new(extent(1280, 720), RgSettings::default()).unwrap();

        let first = app.run_frame().unwrap();
        // scene / mesh / material / instance / ddgi 各一个 slot
        assert_eq!(first.upload_copies, 5);
        // 1 次上传 + 5 个 pass
        assert_eq!(first.submissions, 6);
        assert!(first.buffer_barriers >= 5);

        // 之后每帧只有 DDGI 体积在变化
        let second = app.run_frame().unwrap();
        assert_eq!(second.upload_copies, 1);
        assert_eq!(second.image_barriers, first.image_barriers);

        let stats = app.stats();
        assert_eq!(stats.dispatches.get(), 4);
        // 每帧 9 个 instance + lighting + tonemap
        assert_eq!(stats.draw_calls.get(), 22);
        assert!(stats.irradiance_binding.get().is_some());
        assert_eq!(app.graph().frame_count(), 2);
    }

    #[test]
    fn test_resize() {
        let mut app = HeadlessApp::new(extent(640, 480), RgSettings::default()).unwrap();
        app.run_frame().unwrap();
        let created = app.device().render_target_creations();

        app.run_frame().unwrap();
        assert_eq!(app.device().render_target_creations(), created);

        // swapchain 相对尺寸的 target 重新创建，irradiance 的尺寸是固定的
        app.resize(extent(320, 240));
        app.run_frame().unwrap();
        assert_eq!(app.device().render_target_creations(), created + 4);
    }

    #[test]
    fn test_removed_instance_not_drawn() {
        let mut app = HeadlessApp::new(extent(64, 64), RgSettings::default()).unwrap();
        let cube = app.scene().instances().find("cube-0").unwrap();
        assert!(app.scene_mut().remove_instance(cube));

        app.run_frame().unwrap();
        assert_eq!(app.stats().draw_calls.get(), 8 + 2);
        assert_eq!(app.scene().scene_data().instance_record_count, 9);

        app.destroy();
    }
}
