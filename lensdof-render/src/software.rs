//! CPU reference device. Ray casts the demo scene and runs the blur and
//! composite math on float images, so the whole pipeline can be exercised
//! and inspected without a GPU. Also used to inject allocation failures and
//! device loss.

use crate::blur::BlurPyramid;
use crate::caps::{DeviceCapabilities, ShaderModel, TargetFormat};
use crate::coc_table::{CocTable, CocTableLayout};
use crate::composite::composite;
use crate::config::CLEAR_COLOR;
use crate::device::{FrameInputs, FrameTargets, RenderDevice};
use crate::error::{DofError, DofResult};
use crate::raster::Image;
use crate::scene::{shade, DemoScene};
use glam::{Mat4, Vec2, Vec3};

pub struct SoftwareDevice {
    capabilities: DeviceCapabilities,
    fail_next_allocation: bool,
    lose_next_frame: bool,
    frames_submitted: u64,
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftwareDevice {
    pub fn new() -> Self {
        Self::with_capabilities(DeviceCapabilities {
            max_texture_dimension_2d: 8192,
            max_texture_array_layers: 256,
            color_render_formats: vec![TargetFormat::Rgba8UnormSrgb, TargetFormat::Rgba16Float],
            linear_depth_renderable: true,
            depth32_supported: true,
            shader_model: ShaderModel::Sm5,
            polygon_mode_line: false,
        })
    }

    pub fn with_capabilities(capabilities: DeviceCapabilities) -> Self {
        Self {
            capabilities,
            fail_next_allocation: false,
            lose_next_frame: false,
            frames_submitted: 0,
        }
    }

    /// Make the next allocation or table upload fail.
    pub fn fail_next_allocation(&mut self) {
        self.fail_next_allocation = true;
    }

    /// Make the next `render_frame` report device loss without submitting.
    pub fn lose_next_frame(&mut self) {
        self.lose_next_frame = true;
    }

    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    fn allocate(&mut self, what: &str) -> DofResult<()> {
        if std::mem::take(&mut self.fail_next_allocation) {
            return Err(DofError::allocation(format!("{what}: injected failure")));
        }
        Ok(())
    }
}

pub struct SoftwarePersistent {
    scene: DemoScene,
    table: Option<CocTable>,
}

impl SoftwarePersistent {
    /// The table last uploaded.
    pub fn table(&self) -> Option<&CocTable> {
        self.table.as_ref()
    }
}

pub struct SoftwareFrameTargets {
    width: u32,
    height: u32,
    linear_depth: Image,
    levels: Vec<Image>,
    output: Image,
    pyramid: BlurPyramid,
}

impl SoftwareFrameTargets {
    /// View depth in the red channel; cleared to the far plane.
    pub fn linear_depth(&self) -> &Image {
        &self.linear_depth
    }

    /// Level 0 is the sharp scene color.
    pub fn levels(&self) -> &[Image] {
        &self.levels
    }

    pub fn output(&self) -> &Image {
        &self.output
    }
}

impl FrameTargets for SoftwareFrameTargets {
    fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

impl RenderDevice for SoftwareDevice {
    type Persistent = SoftwarePersistent;
    type Frame = SoftwareFrameTargets;

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn create_persistent(
        &mut self,
        scene: &DemoScene,
        layout: &CocTableLayout,
    ) -> DofResult<SoftwarePersistent> {
        self.allocate("persistent resources")?;
        log::debug!("software table storage {}x{}", layout.samples, layout.slices);
        Ok(SoftwarePersistent {
            scene: scene.clone(),
            table: None,
        })
    }

    fn upload_coc_table(
        &mut self,
        persistent: &mut SoftwarePersistent,
        table: &CocTable,
    ) -> DofResult<()> {
        self.allocate("coc table")?;
        persistent.table = Some(table.clone());
        Ok(())
    }

    fn create_frame_targets(
        &mut self,
        _persistent: &SoftwarePersistent,
        width: u32,
        height: u32,
        levels: usize,
    ) -> DofResult<SoftwareFrameTargets> {
        self.allocate("frame targets")?;
        Ok(SoftwareFrameTargets {
            width,
            height,
            linear_depth: Image::new(width, height),
            levels: vec![Image::new(width, height); levels],
            output: Image::new(width, height),
            pyramid: BlurPyramid::new(levels),
        })
    }

    fn render_frame(
        &mut self,
        persistent: &SoftwarePersistent,
        frame: &mut SoftwareFrameTargets,
        inputs: &FrameInputs,
    ) -> DofResult<()> {
        if std::mem::take(&mut self.lose_next_frame) {
            return Err(DofError::DeviceLost);
        }
        let table = persistent
            .table
            .as_ref()
            .ok_or_else(|| DofError::render("no coc table uploaded"))?;

        let (color, depth) = scene_pass(&persistent.scene, inputs, frame.width, frame.height);
        frame.levels = frame.pyramid.build(&color);
        frame.linear_depth = depth;
        frame.output = composite(&inputs.composite, table, &frame.linear_depth, &frame.levels);
        self.frames_submitted += 1;
        Ok(())
    }
}

/// Ray cast one sample per pixel center. The ray direction has a view-space
/// z of 1, so the hit distance is the linear view depth.
fn scene_pass(scene: &DemoScene, inputs: &FrameInputs, width: u32, height: u32) -> (Image, Image) {
    let view = Mat4::from_cols_array_2d(&inputs.scene.view);
    let projection = Mat4::from_cols_array_2d(&inputs.scene.projection);
    let inverse_view = view.inverse();
    let origin = inverse_view.transform_point3(Vec3::ZERO);
    let scale = Vec2::new(projection.x_axis.x, projection.y_axis.y);
    let near = inputs.composite.near_plane;
    let far = inputs.composite.far_plane;

    let mut color = Image::filled(width, height, CLEAR_COLOR);
    let mut depth = Image::filled(width, height, [far, 0.0, 0.0, 1.0]);
    for y in 0..height {
        for x in 0..width {
            let ndc = Vec2::new(
                (x as f32 + 0.5) / width as f32 * 2.0 - 1.0,
                1.0 - (y as f32 + 0.5) / height as f32 * 2.0,
            );
            let dir_view = (ndc / scale).extend(1.0);
            let dir = inverse_view.transform_vector3(dir_view);
            if let Some(hit) = scene.trace(origin, dir, near, far) {
                color.set(x, y, shade(&inputs.scene, &hit));
                depth.set(x, y, [hit.t, 0.0, 0.0, 1.0]);
            }
        }
    }
    (color, depth)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Camera;
    use crate::coc_table::CocLookupMode;
    use crate::composite::{composite_uniforms, DisplayMode};
    use crate::lens::{LensModel, LensParameters};

    fn inputs(width: u32, height: u32) -> FrameInputs {
        let mut camera = Camera::default();
        camera.set_back_buffer(width, height);
        let scene = DemoScene::default();
        let layout = CocTableLayout::new(CocLookupMode::Table, 64, camera.near(), camera.far());
        FrameInputs {
            scene: scene.uniforms(camera.view_matrix(), camera.projection_matrix()),
            composite: composite_uniforms(
                &layout,
                &BlurPyramid::default(),
                &LensModel::default(),
                &LensParameters::default(),
                DisplayMode::Colors,
            ),
            wireframe: false,
        }
    }

    #[test]
    fn center_pixel_sees_the_focused_box() {
        let inputs = inputs(33, 33);
        let (color, depth) = scene_pass(&DemoScene::default(), &inputs, 33, 33);
        // The box at the origin has its front face 24 units from the eye.
        assert!((depth.get(16, 16)[0] - 24.0).abs() < 1e-3);
        assert_ne!(color.get(16, 16), CLEAR_COLOR);
        // Top row looks over the floor into the clear color.
        assert_eq!(color.get(16, 0), CLEAR_COLOR);
        assert_eq!(depth.get(16, 0)[0], inputs.composite.far_plane);
    }

    #[test]
    fn injected_failure_hits_only_the_next_allocation() {
        let mut device = SoftwareDevice::new();
        let scene = DemoScene::default();
        let layout = CocTableLayout::new(CocLookupMode::Table, 64, 0.1, 1000.0);
        device.fail_next_allocation();
        assert!(matches!(
            device.create_persistent(&scene, &layout),
            Err(DofError::ResourceAllocation(_))
        ));
        assert!(device.create_persistent(&scene, &layout).is_ok());
    }

    #[test]
    fn render_without_table_is_a_frame_error() {
        let mut device = SoftwareDevice::new();
        let scene = DemoScene::default();
        let layout = CocTableLayout::new(CocLookupMode::Table, 64, 0.1, 1000.0);
        let persistent = device.create_persistent(&scene, &layout).unwrap();
        let mut frame = device.create_frame_targets(&persistent, 4, 4, 6).unwrap();
        assert!(matches!(
            device.render_frame(&persistent, &mut frame, &inputs(4, 4)),
            Err(DofError::RenderFrame(_))
        ));
        assert_eq!(device.frames_submitted(), 0);
    }
}
