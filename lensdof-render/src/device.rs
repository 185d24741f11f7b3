//! The seam between the lifecycle state machine and a concrete device.
//!
//! Resources come in two tiers. `Persistent` holds everything independent of
//! the back buffer (pipelines, scene geometry, CoC table storage) and lives
//! from device creation to destruction. `Frame` holds the back-buffer-sized
//! targets and lives from a reset until the next loss. Dropping a tier value
//! releases its resources.

use crate::caps::DeviceCapabilities;
use crate::coc_table::{CocTable, CocTableLayout};
use crate::error::DofResult;
use crate::scene::DemoScene;
use lensdof_gpu_shared::uniforms::{CompositeUniforms, SceneUniforms};

pub trait FrameTargets {
    /// Width and height every target in the set was allocated with.
    fn extent(&self) -> (u32, u32);
}

/// Everything a frame needs besides the two resource tiers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInputs {
    pub scene: SceneUniforms,
    pub composite: CompositeUniforms,
    /// Only set when the device reported line rasterization support.
    pub wireframe: bool,
}

pub trait RenderDevice {
    type Persistent;
    type Frame: FrameTargets;

    fn capabilities(&self) -> &DeviceCapabilities;

    /// Allocate the size-independent tier, including table storage for `layout`.
    fn create_persistent(
        &mut self,
        scene: &DemoScene,
        layout: &CocTableLayout,
    ) -> DofResult<Self::Persistent>;

    /// Replace the table contents. On error the previously uploaded table
    /// stays in place.
    fn upload_coc_table(
        &mut self,
        persistent: &mut Self::Persistent,
        table: &CocTable,
    ) -> DofResult<()>;

    /// Allocate color, linear depth and `levels` blur targets at exactly
    /// `width x height`.
    fn create_frame_targets(
        &mut self,
        persistent: &Self::Persistent,
        width: u32,
        height: u32,
        levels: usize,
    ) -> DofResult<Self::Frame>;

    /// Scene pass, blur pyramid and composite, in that order.
    /// `DofError::DeviceLost` means the device is gone.
    fn render_frame(
        &mut self,
        persistent: &Self::Persistent,
        frame: &mut Self::Frame,
        inputs: &FrameInputs,
    ) -> DofResult<()>;
}
