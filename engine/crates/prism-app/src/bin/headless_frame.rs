use ash::vk;
use prism_app::headless_app::HeadlessApp;
use prism_render_graph::RgSettings;

/// 用法：`headless-frame [帧数]`，默认 4 帧；第二帧之后模拟一次窗口缩放
fn main() -> anyhow::Result<()> {
    prism_crate_tools::init_log::init_log();

    let frame_count = match std::env::args().nth(1) {
        Some(arg) => arg.parse::<u64>().map_err(|e| anyhow::anyhow!("invalid frame count '{}': {}", arg, e))?,
        None => 4,
    };

    let settings = RgSettings {
        log_execution_plan: true,
        ..Default::default()
    };
    let mut app = HeadlessApp::new(
        vk::Extent2D {
            width: 1280,
            height: 720,
        },
        settings,
    )?;

    for frame in 0..frame_count {
        if frame == 2 {
            app.resize(vk::Extent2D {
                width: 1920,
                height: 1080,
            });
        }
        app.run_frame()?;
    }

    log::info!("dependency edges: {}", app.graph().dependency_graph().edge_count());
    app.destroy();
    Ok(())
}
