use lensdof_render::composite::depth_visualization;
use lensdof_render::config::DEFAULT_BACK_BUFFER;
use lensdof_render::{
    CocLookupMode, DepthOfFieldApp, DeviceLifecycle, DeviceState, DisplayMode, DofConfig,
    DofError, FrameStatus, FrameTargets, LensParameters, SoftwareDevice,
};

fn active_app(config: DofConfig, width: u32, height: u32) -> DepthOfFieldApp<SoftwareDevice> {
    let mut app = DepthOfFieldApp::with_config(SoftwareDevice::new(), config);
    app.on_device_created().unwrap();
    app.on_device_reset(width, height).unwrap();
    app
}

fn render(app: &mut DepthOfFieldApp<SoftwareDevice>) -> FrameStatus {
    let view = app.camera().view_matrix();
    app.on_frame_render(view).unwrap()
}

#[test]
fn reset_allocates_targets_at_back_buffer_size() {
    let (w, h) = DEFAULT_BACK_BUFFER;
    let app = active_app(DofConfig::default(), w, h);
    assert_eq!(app.state(), DeviceState::Active);
    let frame = app.frame_targets().unwrap();
    assert_eq!(frame.extent(), (640, 576));
    assert_eq!(frame.levels().len(), 6);
    assert!(frame.levels().iter().all(|l| (l.width(), l.height()) == (640, 576)));
    assert_eq!(app.camera().aspect(), 640.0 / 576.0);
    assert_eq!(app.lens_model().pixels_per_mm(), 640.0 / 36.0);
}

#[test]
fn render_while_lost_submits_nothing() {
    let mut app = active_app(DofConfig::default(), 24, 16);
    assert_eq!(render(&mut app), FrameStatus::Presented);
    assert_eq!(app.device().frames_submitted(), 1);

    app.on_device_lost();
    assert_eq!(app.state(), DeviceState::Lost);
    assert_eq!(render(&mut app), FrameStatus::Skipped);
    assert_eq!(app.device().frames_submitted(), 1);

    app.on_device_reset(24, 16).unwrap();
    assert_eq!(render(&mut app), FrameStatus::Presented);
    assert_eq!(app.device().frames_submitted(), 2);
}

#[test]
fn render_before_reset_is_skipped() {
    let mut app = DepthOfFieldApp::new(SoftwareDevice::new());
    assert_eq!(render(&mut app), FrameStatus::Skipped);
    app.on_device_created().unwrap();
    assert_eq!(render(&mut app), FrameStatus::Skipped);
    assert_eq!(app.device().frames_submitted(), 0);
}

#[test]
fn device_lost_during_render_moves_to_lost() {
    let mut app = active_app(DofConfig::default(), 8, 8);
    app.device_mut().lose_next_frame();
    assert_eq!(render(&mut app), FrameStatus::Skipped);
    assert_eq!(app.state(), DeviceState::Lost);
    assert!(app.frame_targets().is_none());
    assert_eq!(app.device().frames_submitted(), 0);
}

#[test]
fn table_mode_regenerates_on_every_lens_change() {
    let mut app = active_app(DofConfig::default(), 8, 8);
    let start = app.table_generation();
    app.set_f_stop(2.8).unwrap();
    app.set_focus_distance(5000.0).unwrap();
    app.set_focal_length(85.0).unwrap();
    assert_eq!(app.table_generation(), start + 3);
    assert!(app
        .coc_table()
        .is_current_for(app.lens_model(), app.lens()));
}

#[test]
fn volume_mode_skips_regeneration_for_focal_length() {
    let config = DofConfig::default().with_lookup_mode(CocLookupMode::Volume);
    let mut app = active_app(config, 8, 8);
    let start = app.table_generation();
    let before = app.coc_table().clone();

    app.set_focal_length(135.0).unwrap();
    assert_eq!(app.lens().focal_length(), 135.0);
    assert_eq!(app.table_generation(), start);
    assert_eq!(*app.coc_table(), before);
    let inputs = app.frame_inputs(app.camera().view_matrix());
    assert_eq!(inputs.composite.focal_coord, app.lens().focal_coord());
    assert_eq!(inputs.composite.focal_slices, 32);

    app.set_f_stop(4.0).unwrap();
    app.set_focus_distance(900.0).unwrap();
    assert_eq!(app.table_generation(), start + 2);
}

#[test]
fn identical_parameters_regenerate_identical_tables() {
    let mut app = active_app(DofConfig::default(), 8, 8);
    app.set_f_stop(3.5).unwrap();
    let first = app.coc_table().values().to_vec();
    app.reset_to_defaults().unwrap();
    app.set_f_stop(3.5).unwrap();
    assert_eq!(app.coc_table().values(), first.as_slice());
}

#[test]
fn reset_to_defaults_restores_lens_and_regenerates() {
    let mut app = active_app(DofConfig::default(), 8, 8);
    app.set_f_stop(22.0).unwrap();
    app.set_focal_length(200.0).unwrap();
    app.camera_mut()
        .set_view_params(glam::Vec3::new(3.0, 4.0, 5.0), glam::Vec3::ZERO);
    let before = app.table_generation();

    app.reset_to_defaults().unwrap();
    assert_eq!(app.lens().f_stop(), 1.0);
    assert_eq!(app.lens().focal_length(), 20.0);
    assert_eq!(app.lens().focus_distance(), 2536.0);
    assert_eq!(app.table_generation(), before + 1);
    assert_eq!(app.camera().eye(), glam::Vec3::new(0.0, 1.0, -25.0));

    // Forced even when already at defaults.
    app.reset_to_defaults().unwrap();
    assert_eq!(app.table_generation(), before + 2);
}

#[test]
fn depth_mode_outputs_depth_visualization_for_every_pixel() {
    let mut app = active_app(DofConfig::default(), 40, 30);
    app.set_display_mode(DisplayMode::Depth);
    assert_eq!(render(&mut app), FrameStatus::Presented);

    let uniforms = app.frame_inputs(app.camera().view_matrix()).composite;
    let frame = app.frame_targets().unwrap();
    let depth = frame.linear_depth();
    for y in 0..30 {
        for x in 0..40 {
            let g = depth_visualization(&uniforms, depth.get(x, y)[0]);
            assert_eq!(frame.output().get(x, y), [g, g, g, 1.0], "pixel {x},{y}");
        }
    }
}

#[test]
fn colors_mode_keeps_focused_pixels_sharp() {
    let mut app = active_app(DofConfig::default(), 33, 33);
    assert_eq!(render(&mut app), FrameStatus::Presented);
    let frame = app.frame_targets().unwrap();
    let sharp = frame.levels()[0].get(16, 16);
    let out = frame.output().get(16, 16);
    for c in 0..3 {
        assert!((out[c] - sharp[c]).abs() < 0.05, "{out:?} vs {sharp:?}");
    }
}

#[test]
fn failed_upload_keeps_previous_table_and_parameters() {
    let mut app = active_app(DofConfig::default(), 8, 8);
    let table = app.coc_table().clone();
    let generation = app.table_generation();

    app.device_mut().fail_next_allocation();
    assert!(matches!(
        app.set_f_stop(8.0),
        Err(DofError::ResourceAllocation(_))
    ));
    assert_eq!(*app.lens(), LensParameters::default());
    assert_eq!(*app.coc_table(), table);
    assert_eq!(app.table_generation(), generation);
    assert_eq!(app.state(), DeviceState::Active);

    app.set_f_stop(8.0).unwrap();
    assert_eq!(app.lens().f_stop(), 8.0);
}

#[test]
fn failed_reset_from_lost_stays_lost() {
    let mut app = active_app(DofConfig::default(), 8, 8);
    app.on_device_lost();
    app.device_mut().fail_next_allocation();
    assert!(app.on_device_reset(16, 16).is_err());
    assert_eq!(app.state(), DeviceState::Lost);
    app.on_device_reset(16, 16).unwrap();
    assert_eq!(app.frame_targets().map(|f| f.extent()), Some((16, 16)));
}

#[test]
fn failed_creation_stays_uninitialized() {
    let mut app = DepthOfFieldApp::new(SoftwareDevice::new());
    app.device_mut().fail_next_allocation();
    assert!(app.on_device_created().is_err());
    assert_eq!(app.state(), DeviceState::Uninitialized);
    app.on_device_created().unwrap();
    assert_eq!(app.state(), DeviceState::Created);
}

#[test]
fn reset_regenerates_table_for_new_back_buffer() {
    let mut app = active_app(DofConfig::default(), 8, 8);
    let generation = app.table_generation();

    app.on_device_reset(1280, 720).unwrap();
    assert_eq!(app.table_generation(), generation + 1);
    assert_eq!(app.coc_table().key().pixels_per_mm, 1280.0 / 36.0);
    assert!(app.coc_table().is_current_for(app.lens_model(), app.lens()));
}
