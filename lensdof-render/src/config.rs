//! Compile-time bounds and defaults, plus the small runtime configuration.

use crate::coc_table::CocLookupMode;

// Lens parameter bounds; focal length and focus distance in millimetres.
// Every setter clamps into these.
pub const MIN_F_STOP: f32 = 0.6;
pub const MAX_F_STOP: f32 = 22.0;
pub const MIN_FOCAL_LENGTH: f32 = 10.0;
pub const MAX_FOCAL_LENGTH: f32 = 300.0;
pub const MIN_FOCUS_DISTANCE: f32 = 300.0;
pub const MAX_FOCUS_DISTANCE: f32 = 100_000.0;

pub const DEFAULT_F_STOP: f32 = 1.0;
pub const DEFAULT_FOCAL_LENGTH: f32 = 20.0;
pub const DEFAULT_FOCUS_DISTANCE: f32 = 2536.0;

/// Width of a full-frame 35mm sensor.
pub const SENSOR_WIDTH_MM: f32 = 36.0;
/// Scene geometry is modelled in 10 cm units.
pub const MILLIMETRES_PER_WORLD_UNIT: f32 = 100.0;
/// Guards the thin-lens denominator when focus distance approaches focal length.
pub const COC_DENOMINATOR_EPSILON: f32 = 1e-4;
/// Depths closer than this are treated as this depth by the lens model.
pub const MIN_SCENE_DEPTH_MM: f32 = 1.0;

pub const COC_TABLE_SAMPLES: u32 = 1024;
/// Number of focal-length slices in the volume lookup.
pub const FOCAL_LENGTH_SLICES: u32 = 32;

/// Pyramid levels including the sharp level 0.
pub const BLUR_LEVELS: usize = 6;

// Camera projection, matching the demo's fixed frustum.
pub const CAMERA_FOV_Y: f32 = std::f32::consts::FRAC_PI_4;
pub const CAMERA_NEAR: f32 = 0.1;
pub const CAMERA_FAR: f32 = 1000.0;
pub const CAMERA_EYE: [f32; 3] = [0.0, 1.0, -25.0];
pub const CAMERA_LOOK_AT: [f32; 3] = [0.0, 1.0, 0.0];

/// Depth visualization maps [min, max] world units to black..white.
pub const DEPTH_VIS_MIN: f32 = 0.0;
pub const DEPTH_VIS_MAX: f32 = 100.0;

/// Back buffer size the demo window is created with.
pub const DEFAULT_BACK_BUFFER: (u32, u32) = (640, 576);
/// Opaque blue, the demo's clear color.
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 1.0, 1.0];

/// Minimum 2D texture size a device must support.
pub const MIN_TEXTURE_DIMENSION: u32 = 1024;

/// Runtime options chosen when the application context is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DofConfig {
    pub lookup_mode: CocLookupMode,
    pub table_samples: u32,
}

impl Default for DofConfig {
    fn default() -> Self {
        Self {
            lookup_mode: CocLookupMode::Table,
            table_samples: COC_TABLE_SAMPLES,
        }
    }
}

impl DofConfig {
    pub fn with_lookup_mode(mut self, mode: CocLookupMode) -> Self {
        self.lookup_mode = mode;
        self
    }
}
