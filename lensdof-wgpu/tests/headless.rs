//! Headless GPU runs. Each test returns early when no adapter is available.

use lensdof_render::{
    DepthOfFieldApp, DeviceLifecycle, DeviceState, DisplayMode, FrameStatus, SoftwareDevice,
};
use lensdof_wgpu::WgpuDevice;

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;

fn gpu_app() -> Option<DepthOfFieldApp<WgpuDevice>> {
    match WgpuDevice::new_headless() {
        Ok(device) => Some(DepthOfFieldApp::new(device)),
        Err(e) => {
            eprintln!("skipping: {e}");
            None
        }
    }
}

fn render(app: &mut DepthOfFieldApp<WgpuDevice>) -> FrameStatus {
    let view = app.camera().view_matrix();
    app.on_frame_render(view).unwrap()
}

#[test]
fn lifecycle_renders_and_reads_back() {
    let Some(mut app) = gpu_app() else { return };
    app.on_device_created().unwrap();
    app.on_device_reset(WIDTH, HEIGHT).unwrap();
    assert_eq!(render(&mut app), FrameStatus::Presented);

    let frame = app.frame_targets().unwrap();
    let pixels = app.device().read_output(frame).unwrap();
    assert_eq!(pixels.len(), (WIDTH * HEIGHT * 4) as usize);

    app.on_device_lost();
    assert_eq!(app.state(), DeviceState::Lost);
    assert_eq!(render(&mut app), FrameStatus::Skipped);

    app.on_device_reset(WIDTH * 2, HEIGHT).unwrap();
    assert_eq!(render(&mut app), FrameStatus::Presented);
    app.on_device_destroyed();
    assert_eq!(app.state(), DeviceState::Uninitialized);
}

#[test]
fn lens_changes_and_modes_render_on_gpu() {
    let Some(mut app) = gpu_app() else { return };
    app.on_device_created().unwrap();
    app.on_device_reset(WIDTH, HEIGHT).unwrap();

    app.set_f_stop(2.0).unwrap();
    app.set_focal_length(100.0).unwrap();
    app.set_focus_distance(1500.0).unwrap();
    for mode in [DisplayMode::Depth, DisplayMode::Blurriness, DisplayMode::Colors] {
        app.set_display_mode(mode);
        assert_eq!(render(&mut app), FrameStatus::Presented);
    }
    app.set_wireframe(true);
    assert_eq!(render(&mut app), FrameStatus::Presented);
}

#[test]
fn background_matches_software_reference() {
    let Some(mut gpu) = gpu_app() else { return };
    gpu.on_device_created().unwrap();
    gpu.on_device_reset(WIDTH, HEIGHT).unwrap();
    assert_eq!(render(&mut gpu), FrameStatus::Presented);
    let frame = gpu.frame_targets().unwrap();
    let pixels = gpu.device().read_output(frame).unwrap();

    let mut cpu = DepthOfFieldApp::new(SoftwareDevice::new());
    cpu.on_device_created().unwrap();
    cpu.on_device_reset(WIDTH, HEIGHT).unwrap();
    let view = cpu.camera().view_matrix();
    cpu.on_frame_render(view).unwrap();
    let reference = cpu.frame_targets().unwrap().output();

    // Compare only pixels the reference leaves at pure clear color, where
    // sRGB encoding is exact. Raster edges may bleed slightly.
    let mut compared = 0;
    for y in 0..HEIGHT {
        for x in 0..WIDTH {
            if reference.get(x, y) != [0.0, 0.0, 1.0, 1.0] {
                continue;
            }
            let i = ((y * WIDTH + x) * 4) as usize;
            let rgba = &pixels[i..i + 4];
            assert!(rgba[0] <= 16 && rgba[1] <= 16 && rgba[2] >= 240, "pixel {x},{y}: {rgba:?}");
            compared += 1;
        }
    }
    eprintln!("compared {compared} background pixels");
}

#[test]
fn lost_device_is_replaced_on_recreate() {
    let Some(mut app) = gpu_app() else { return };
    app.on_device_created().unwrap();
    app.on_device_reset(WIDTH, HEIGHT).unwrap();

    app.device().device.destroy();
    let _ = app.device().device.poll(wgpu::Maintain::Wait);
    assert!(app.device().is_lost());

    assert_eq!(render(&mut app), FrameStatus::Skipped);
    assert_eq!(app.state(), DeviceState::Lost);
    assert_eq!(
        app.on_device_reset(WIDTH, HEIGHT),
        Err(lensdof_render::DofError::DeviceLost)
    );
    assert_eq!(app.state(), DeviceState::Lost);

    app.on_device_destroyed();
    app.on_device_created().unwrap();
    assert!(!app.device().is_lost());
    app.on_device_reset(WIDTH, HEIGHT).unwrap();
    assert_eq!(render(&mut app), FrameStatus::Presented);
}
