//! Thin-lens camera model: lens parameters and the circle of confusion.

use crate::config::{
    COC_DENOMINATOR_EPSILON, DEFAULT_BACK_BUFFER, DEFAULT_FOCAL_LENGTH, DEFAULT_FOCUS_DISTANCE,
    DEFAULT_F_STOP, MAX_FOCAL_LENGTH, MAX_FOCUS_DISTANCE, MAX_F_STOP, MILLIMETRES_PER_WORLD_UNIT,
    MIN_FOCAL_LENGTH, MIN_FOCUS_DISTANCE, MIN_F_STOP, MIN_SCENE_DEPTH_MM, SENSOR_WIDTH_MM,
};

/// Which lens parameter a change touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LensParameter {
    FStop,
    FocalLength,
    FocusDistance,
}

/// A requested change to one lens parameter, before clamping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LensChange {
    FStop(f32),
    FocalLength(f32),
    FocusDistance(f32),
}

impl LensChange {
    pub fn parameter(&self) -> LensParameter {
        match self {
            LensChange::FStop(_) => LensParameter::FStop,
            LensChange::FocalLength(_) => LensParameter::FocalLength,
            LensChange::FocusDistance(_) => LensParameter::FocusDistance,
        }
    }
}

/// Camera lens settings. Fields are private so every value stays inside its
/// configured bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LensParameters {
    f_stop: f32,
    focal_length: f32,
    focus_distance: f32,
}

impl Default for LensParameters {
    fn default() -> Self {
        Self {
            f_stop: DEFAULT_F_STOP,
            focal_length: DEFAULT_FOCAL_LENGTH,
            focus_distance: DEFAULT_FOCUS_DISTANCE,
        }
    }
}

fn clamp_input(value: f32, min: f32, max: f32, name: &str) -> Option<f32> {
    if !value.is_finite() {
        log::warn!("ignoring non-finite {name}: {value}");
        return None;
    }
    let clamped = value.clamp(min, max);
    if clamped != value {
        log::debug!("{name} {value} clamped to {clamped}");
    }
    Some(clamped)
}

impl LensParameters {
    /// Build parameters, clamping each value into its bounds.
    pub fn new(f_stop: f32, focal_length: f32, focus_distance: f32) -> Self {
        let mut params = Self::default();
        params.set_f_stop(f_stop);
        params.set_focal_length(focal_length);
        params.set_focus_distance(focus_distance);
        params
    }

    pub fn f_stop(&self) -> f32 {
        self.f_stop
    }

    /// Millimetres.
    pub fn focal_length(&self) -> f32 {
        self.focal_length
    }

    /// Millimetres.
    pub fn focus_distance(&self) -> f32 {
        self.focus_distance
    }

    /// Returns true when the stored value changed.
    pub fn set_f_stop(&mut self, f_stop: f32) -> bool {
        Self::store(&mut self.f_stop, clamp_input(f_stop, MIN_F_STOP, MAX_F_STOP, "f-stop"))
    }

    pub fn set_focal_length(&mut self, focal_length: f32) -> bool {
        Self::store(
            &mut self.focal_length,
            clamp_input(focal_length, MIN_FOCAL_LENGTH, MAX_FOCAL_LENGTH, "focal length"),
        )
    }

    pub fn set_focus_distance(&mut self, focus_distance: f32) -> bool {
        Self::store(
            &mut self.focus_distance,
            clamp_input(
                focus_distance,
                MIN_FOCUS_DISTANCE,
                MAX_FOCUS_DISTANCE,
                "focus distance",
            ),
        )
    }

    /// Apply a change; returns true when the stored value changed.
    pub fn apply(&mut self, change: LensChange) -> bool {
        match change {
            LensChange::FStop(v) => self.set_f_stop(v),
            LensChange::FocalLength(v) => self.set_focal_length(v),
            LensChange::FocusDistance(v) => self.set_focus_distance(v),
        }
    }

    /// Focal length normalized over its bounds, in [0, 1].
    pub fn focal_coord(&self) -> f32 {
        (self.focal_length - MIN_FOCAL_LENGTH) / (MAX_FOCAL_LENGTH - MIN_FOCAL_LENGTH)
    }

    fn store(slot: &mut f32, value: Option<f32>) -> bool {
        match value {
            Some(v) if v != *slot => {
                *slot = v;
                true
            }
            _ => false,
        }
    }
}

/// Diameter of the circle of confusion on the sensor, in millimetres, for a
/// point `depth_mm` in front of the lens.
///
/// `coc = |f (F - d)| / (d (F - f)) * (f / N)`; zero at the focus distance
/// and growing monotonically away from it on both sides.
pub fn coc_diameter_mm(params: &LensParameters, depth_mm: f32) -> f32 {
    signed_coc_diameter_mm(params, depth_mm).abs()
}

/// [`coc_diameter_mm`] before taking the magnitude: positive in front of the
/// focus distance, negative behind it. Linear in `1 / d`.
pub fn signed_coc_diameter_mm(params: &LensParameters, depth_mm: f32) -> f32 {
    let f = params.focal_length();
    let focus = params.focus_distance();
    let d = depth_mm.max(MIN_SCENE_DEPTH_MM);
    let denominator = (d * (focus - f)).max(COC_DENOMINATOR_EPSILON);
    f * (focus - d) / denominator * (f / params.f_stop())
}

/// Converts sensor-plane CoC to an on-screen blur radius in pixels, clamped
/// to the largest radius the blur pyramid can represent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LensModel {
    pixels_per_mm: f32,
    max_blur_radius: f32,
}

impl LensModel {
    pub fn new(pixels_per_mm: f32, max_blur_radius: f32) -> Self {
        Self {
            pixels_per_mm,
            max_blur_radius,
        }
    }

    /// The sensor width maps onto the back buffer width.
    pub fn for_back_buffer(width: u32, max_blur_radius: f32) -> Self {
        Self::new(width as f32 / SENSOR_WIDTH_MM, max_blur_radius)
    }

    pub fn pixels_per_mm(&self) -> f32 {
        self.pixels_per_mm
    }

    pub fn max_blur_radius(&self) -> f32 {
        self.max_blur_radius
    }

    /// Blur radius in pixels for a depth in millimetres, in `[0, max_blur_radius]`.
    pub fn circle_of_confusion(&self, params: &LensParameters, depth_mm: f32) -> f32 {
        let radius = 0.5 * coc_diameter_mm(params, depth_mm) * self.pixels_per_mm;
        radius.clamp(0.0, self.max_blur_radius)
    }

    /// Blur radius for a depth in scene (world) units.
    pub fn circle_of_confusion_world(&self, params: &LensParameters, depth: f32) -> f32 {
        self.circle_of_confusion(params, depth * MILLIMETRES_PER_WORLD_UNIT)
    }

    /// Unclamped signed radius in pixels for a depth in world units. Its
    /// magnitude, clamped, is [`LensModel::circle_of_confusion_world`].
    pub fn signed_radius_world(&self, params: &LensParameters, depth: f32) -> f32 {
        0.5 * signed_coc_diameter_mm(params, depth * MILLIMETRES_PER_WORLD_UNIT) * self.pixels_per_mm
    }

    /// Clamp a signed radius to the representable blur range.
    pub fn clamp_radius(&self, signed_radius: f32) -> f32 {
        signed_radius.abs().min(self.max_blur_radius)
    }
}

impl Default for LensModel {
    fn default() -> Self {
        Self::for_back_buffer(
            DEFAULT_BACK_BUFFER.0,
            crate::blur::BlurPyramid::default().max_radius(),
        )
    }
}
