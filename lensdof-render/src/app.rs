//! Application context and device resource lifecycle.
//!
//! `DepthOfFieldApp` owns the device, the lens state, the current CoC table
//! and the resource tiers. The tier enum only holds the resources valid in
//! each state, so rendering while lost or reallocating frame targets twice
//! cannot be expressed.

use crate::blur::BlurPyramid;
use crate::camera::Camera;
use crate::caps::is_device_acceptable;
use crate::coc_table::{CocTable, CocTableLayout};
use crate::composite::{composite_uniforms, DisplayMode};
use crate::config::{DofConfig, DEFAULT_BACK_BUFFER};
use crate::device::{FrameInputs, RenderDevice};
use crate::error::{DofError, DofResult};
use crate::lens::{LensChange, LensModel, LensParameters};
use crate::scene::DemoScene;
use glam::Mat4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceState {
    Uninitialized,
    Created,
    Active,
    Lost,
}

/// Outcome of a render call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    /// Nothing was submitted; the previous image stays on screen.
    Skipped,
}

/// Lifecycle notifications from the host framework.
pub trait DeviceLifecycle {
    fn on_device_created(&mut self) -> DofResult<()>;
    fn on_device_reset(&mut self, width: u32, height: u32) -> DofResult<()>;
    fn on_device_lost(&mut self);
    fn on_device_destroyed(&mut self);
}

enum Tier<P, F> {
    Uninitialized,
    Created { persistent: P },
    Active { persistent: P, frame: F },
    Lost { persistent: P },
}

impl<P, F> Tier<P, F> {
    fn state(&self) -> DeviceState {
        match self {
            Tier::Uninitialized => DeviceState::Uninitialized,
            Tier::Created { .. } => DeviceState::Created,
            Tier::Active { .. } => DeviceState::Active,
            Tier::Lost { .. } => DeviceState::Lost,
        }
    }

    fn persistent_mut(&mut self) -> Option<&mut P> {
        match self {
            Tier::Uninitialized => None,
            Tier::Created { persistent }
            | Tier::Active { persistent, .. }
            | Tier::Lost { persistent } => Some(persistent),
        }
    }
}

pub struct DepthOfFieldApp<D: RenderDevice> {
    device: D,
    config: DofConfig,
    scene: DemoScene,
    camera: Camera,
    pyramid: BlurPyramid,
    lens: LensParameters,
    lens_model: LensModel,
    display_mode: DisplayMode,
    wireframe: bool,
    wireframe_warned: bool,
    table: CocTable,
    table_generation: u64,
    tier: Tier<D::Persistent, D::Frame>,
}

impl<D: RenderDevice> DepthOfFieldApp<D> {
    pub fn new(device: D) -> Self {
        Self::with_config(device, DofConfig::default())
    }

    pub fn with_config(device: D, config: DofConfig) -> Self {
        let pyramid = BlurPyramid::default();
        let lens = LensParameters::default();
        let lens_model = LensModel::for_back_buffer(DEFAULT_BACK_BUFFER.0, pyramid.max_radius());
        let camera = Camera::default();
        let layout = table_layout(&config, &camera);
        Self {
            device,
            config,
            scene: DemoScene::default(),
            camera,
            table: CocTable::generate(&lens_model, &lens, layout),
            pyramid,
            lens,
            lens_model,
            display_mode: DisplayMode::default(),
            wireframe: false,
            wireframe_warned: false,
            table_generation: 0,
            tier: Tier::Uninitialized,
        }
    }

    // ============================================================
    // Accessors
    // ============================================================

    pub fn state(&self) -> DeviceState {
        self.tier.state()
    }

    pub fn lens(&self) -> &LensParameters {
        &self.lens
    }

    pub fn lens_model(&self) -> &LensModel {
        &self.lens_model
    }

    pub fn config(&self) -> &DofConfig {
        &self.config
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.display_mode
    }

    pub fn wireframe(&self) -> bool {
        self.wireframe
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn scene(&self) -> &DemoScene {
        &self.scene
    }

    pub fn pyramid(&self) -> &BlurPyramid {
        &self.pyramid
    }

    /// The table the device currently holds.
    pub fn coc_table(&self) -> &CocTable {
        &self.table
    }

    /// Incremented every time a table is generated and uploaded.
    pub fn table_generation(&self) -> u64 {
        self.table_generation
    }

    /// Frame targets; present only while `Active`.
    pub fn frame_targets(&self) -> Option<&D::Frame> {
        match &self.tier {
            Tier::Active { frame, .. } => Some(frame),
            _ => None,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    // ============================================================
    // Parameter setters
    // ============================================================

    pub fn set_f_stop(&mut self, f_stop: f32) -> DofResult<()> {
        self.apply_lens_change(LensChange::FStop(f_stop))
    }

    pub fn set_focal_length(&mut self, focal_length: f32) -> DofResult<()> {
        self.apply_lens_change(LensChange::FocalLength(focal_length))
    }

    pub fn set_focus_distance(&mut self, focus_distance: f32) -> DofResult<()> {
        self.apply_lens_change(LensChange::FocusDistance(focus_distance))
    }

    pub fn set_display_mode(&mut self, mode: DisplayMode) {
        if self.display_mode != mode {
            log::debug!("display mode {:?} -> {:?}", self.display_mode, mode);
            self.display_mode = mode;
        }
    }

    pub fn set_wireframe(&mut self, enabled: bool) {
        self.wireframe = enabled;
        if enabled && !self.device.capabilities().polygon_mode_line && !self.wireframe_warned {
            log::warn!("device has no line rasterization; wireframe renders filled");
            self.wireframe_warned = true;
        }
    }

    pub fn toggle_wireframe(&mut self) {
        self.set_wireframe(!self.wireframe);
    }

    /// Restore default lens parameters and camera view, regenerating the
    /// table regardless of whether the parameters changed.
    pub fn reset_to_defaults(&mut self) -> DofResult<()> {
        let (previous_lens, previous_camera) = (self.lens, self.camera);
        self.lens = LensParameters::default();
        self.camera.reset();
        if let Err(err) = self.regenerate_table() {
            self.lens = previous_lens;
            self.camera = previous_camera;
            return Err(err);
        }
        log::info!("lens reset to defaults");
        Ok(())
    }

    fn apply_lens_change(&mut self, change: LensChange) -> DofResult<()> {
        let previous = self.lens;
        if !self.lens.apply(change) {
            return Ok(());
        }
        if !self.config.lookup_mode.requires_regeneration(change.parameter()) {
            log::debug!("{change:?} handled by focal coordinate, table kept");
            return Ok(());
        }
        if let Err(err) = self.regenerate_table() {
            log::warn!("{change:?} rolled back: {err}");
            self.lens = previous;
            return Err(err);
        }
        Ok(())
    }

    fn table_layout(&self) -> CocTableLayout {
        table_layout(&self.config, &self.camera)
    }

    /// Generate from the current lens and upload when the device holds table
    /// storage. The stored table only changes once the upload succeeded.
    fn regenerate_table(&mut self) -> DofResult<()> {
        let table = CocTable::generate(&self.lens_model, &self.lens, self.table_layout());
        if let Some(persistent) = self.tier.persistent_mut() {
            self.device.upload_coc_table(persistent, &table)?;
        }
        self.table = table;
        self.table_generation += 1;
        log::debug!(
            "coc table regenerated (generation {}, f/{} {}mm focus {}mm)",
            self.table_generation,
            self.lens.f_stop(),
            self.lens.focal_length(),
            self.lens.focus_distance()
        );
        Ok(())
    }

    // ============================================================
    // Per-frame entry points
    // ============================================================

    /// Camera and animation update. Never renders.
    pub fn on_frame_update(&mut self, elapsed: f32) {
        self.camera.frame_move(elapsed);
    }

    /// Uniforms the next frame will use with the given view matrix.
    pub fn frame_inputs(&self, view: Mat4) -> FrameInputs {
        FrameInputs {
            scene: self.scene.uniforms(view, self.camera.projection_matrix()),
            composite: composite_uniforms(
                self.table.layout(),
                &self.pyramid,
                &self.lens_model,
                &self.lens,
                self.display_mode,
            ),
            wireframe: self.wireframe && self.device.capabilities().polygon_mode_line,
        }
    }

    /// Scene pass, blur pyramid and composite. Outside `Active` nothing is
    /// submitted and the frame is reported as skipped.
    pub fn on_frame_render(&mut self, view: Mat4) -> DofResult<FrameStatus> {
        let inputs = self.frame_inputs(view);
        let result = match &mut self.tier {
            Tier::Active { persistent, frame } => {
                self.device.render_frame(persistent, frame, &inputs)
            }
            other => {
                log::debug!("frame skipped while {:?}", other.state());
                return Ok(FrameStatus::Skipped);
            }
        };
        match result {
            Ok(()) => Ok(FrameStatus::Presented),
            Err(DofError::DeviceLost) => {
                log::warn!("device lost during render");
                self.on_device_lost();
                Ok(FrameStatus::Skipped)
            }
            Err(err) => {
                log::warn!("frame skipped: {err}");
                Err(err)
            }
        }
    }
}

fn table_layout(config: &DofConfig, camera: &Camera) -> CocTableLayout {
    CocTableLayout::new(config.lookup_mode, config.table_samples, camera.near(), camera.far())
}

impl<D: RenderDevice> DeviceLifecycle for DepthOfFieldApp<D> {
    fn on_device_created(&mut self) -> DofResult<()> {
        if !matches!(self.tier, Tier::Uninitialized) {
            return Err(DofError::InvalidTransition {
                state: self.state(),
                event: "device created",
            });
        }
        if let Some(reason) = self.device.capabilities().rejection_reason() {
            return Err(DofError::unavailable(reason));
        }
        debug_assert!(is_device_acceptable(self.device.capabilities()));

        let layout = self.table_layout();
        let mut persistent = self.device.create_persistent(&self.scene, &layout)?;
        let table = CocTable::generate(&self.lens_model, &self.lens, layout);
        self.device.upload_coc_table(&mut persistent, &table)?;

        self.table = table;
        self.table_generation += 1;
        self.tier = Tier::Created { persistent };
        log::info!("device created ({:?} lookup)", self.config.lookup_mode);
        Ok(())
    }

    fn on_device_reset(&mut self, width: u32, height: u32) -> DofResult<()> {
        let (mut persistent, was_created) =
            match std::mem::replace(&mut self.tier, Tier::Uninitialized) {
                Tier::Uninitialized => {
                    return Err(DofError::InvalidTransition {
                        state: DeviceState::Uninitialized,
                        event: "device reset",
                    });
                }
                Tier::Created { persistent } => (persistent, true),
                Tier::Lost { persistent } => (persistent, false),
                Tier::Active { persistent, frame } => {
                    log::debug!("releasing frame targets before reset");
                    drop(frame);
                    (persistent, false)
                }
            };

        let fallback = |persistent| {
            if was_created {
                Tier::Created { persistent }
            } else {
                Tier::Lost { persistent }
            }
        };

        if width == 0 || height == 0 {
            self.tier = fallback(persistent);
            return Err(DofError::allocation(format!(
                "back buffer {width}x{height} has no area"
            )));
        }

        let frame = match self.device.create_frame_targets(
            &persistent,
            width,
            height,
            self.pyramid.level_count(),
        ) {
            Ok(frame) => frame,
            Err(err) => {
                self.tier = fallback(persistent);
                return Err(err);
            }
        };

        let mut camera = self.camera;
        camera.set_back_buffer(width, height);
        let lens_model = LensModel::for_back_buffer(width, self.pyramid.max_radius());
        let table = CocTable::generate(&lens_model, &self.lens, table_layout(&self.config, &camera));
        if let Err(err) = self.device.upload_coc_table(&mut persistent, &table) {
            drop(frame);
            self.tier = fallback(persistent);
            return Err(err);
        }

        self.camera = camera;
        self.lens_model = lens_model;
        self.table = table;
        self.table_generation += 1;
        self.tier = Tier::Active { persistent, frame };
        log::info!("device reset to {width}x{height}");
        Ok(())
    }

    fn on_device_lost(&mut self) {
        match std::mem::replace(&mut self.tier, Tier::Uninitialized) {
            Tier::Active { persistent, frame } => {
                drop(frame);
                self.tier = Tier::Lost { persistent };
                log::info!("device lost, frame targets released");
            }
            other => {
                log::debug!("device lost ignored while {:?}", other.state());
                self.tier = other;
            }
        }
    }

    fn on_device_destroyed(&mut self) {
        let previous = self.state();
        match std::mem::replace(&mut self.tier, Tier::Uninitialized) {
            Tier::Active { persistent, frame } => {
                drop(frame);
                drop(persistent);
            }
            Tier::Created { persistent } | Tier::Lost { persistent } => drop(persistent),
            Tier::Uninitialized => {}
        }
        log::info!("device destroyed (was {previous:?})");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::FrameTargets;
    use crate::software::SoftwareDevice;

    #[test]
    fn starts_uninitialized_with_defaults() {
        let app = DepthOfFieldApp::new(SoftwareDevice::new());
        assert_eq!(app.state(), DeviceState::Uninitialized);
        assert_eq!(*app.lens(), LensParameters::default());
        assert_eq!(app.display_mode(), DisplayMode::Colors);
        assert!(app.frame_targets().is_none());
    }

    #[test]
    fn created_twice_is_rejected() {
        let mut app = DepthOfFieldApp::new(SoftwareDevice::new());
        app.on_device_created().unwrap();
        assert_eq!(
            app.on_device_created(),
            Err(DofError::InvalidTransition {
                state: DeviceState::Created,
                event: "device created",
            })
        );
        assert_eq!(app.state(), DeviceState::Created);
    }

    #[test]
    fn reset_requires_a_device() {
        let mut app = DepthOfFieldApp::new(SoftwareDevice::new());
        assert!(matches!(
            app.on_device_reset(64, 64),
            Err(DofError::InvalidTransition { .. })
        ));
        assert_eq!(app.state(), DeviceState::Uninitialized);
    }

    #[test]
    fn zero_sized_reset_keeps_created_state() {
        let mut app = DepthOfFieldApp::new(SoftwareDevice::new());
        app.on_device_created().unwrap();
        assert!(matches!(
            app.on_device_reset(0, 576),
            Err(DofError::ResourceAllocation(_))
        ));
        assert_eq!(app.state(), DeviceState::Created);
    }

    #[test]
    fn reset_while_active_reallocates() {
        let mut app = DepthOfFieldApp::new(SoftwareDevice::new());
        app.on_device_created().unwrap();
        app.on_device_reset(32, 16).unwrap();
        app.on_device_reset(48, 24).unwrap();
        assert_eq!(app.state(), DeviceState::Active);
        assert_eq!(app.frame_targets().map(|f| f.extent()), Some((48, 24)));
    }

    #[test]
    fn lost_and_destroyed_release_tiers() {
        let mut app = DepthOfFieldApp::new(SoftwareDevice::new());
        app.on_device_lost();
        assert_eq!(app.state(), DeviceState::Uninitialized);

        app.on_device_created().unwrap();
        app.on_device_lost();
        assert_eq!(app.state(), DeviceState::Created);

        app.on_device_reset(8, 8).unwrap();
        app.on_device_lost();
        assert_eq!(app.state(), DeviceState::Lost);
        assert!(app.frame_targets().is_none());

        app.on_device_destroyed();
        assert_eq!(app.state(), DeviceState::Uninitialized);
        app.on_device_created().unwrap();
        assert_eq!(app.state(), DeviceState::Created);
    }

    #[test]
    fn unchanged_parameter_does_not_regenerate() {
        let mut app = DepthOfFieldApp::new(SoftwareDevice::new());
        app.on_device_created().unwrap();
        let generation = app.table_generation();
        app.set_f_stop(1.0).unwrap();
        app.set_focus_distance(2536.0).unwrap();
        assert_eq!(app.table_generation(), generation);
        // Clamps to the current maximum both times.
        app.set_f_stop(50.0).unwrap();
        app.set_f_stop(60.0).unwrap();
        assert_eq!(app.table_generation(), generation + 1);
    }

    #[test]
    fn wireframe_needs_line_support_to_reach_the_device() {
        let mut app = DepthOfFieldApp::new(SoftwareDevice::new());
        app.toggle_wireframe();
        assert!(app.wireframe());
        assert!(!app.frame_inputs(Mat4::IDENTITY).wireframe);
        app.toggle_wireframe();
        assert!(!app.wireframe());
    }
}
