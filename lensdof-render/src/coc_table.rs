//! Circle-of-confusion lookup tables.
//!
//! A table maps normalized inverse depth `t ∈ [0, 1]` (0 at the near plane,
//! 1 at the far plane) to a signed, unclamped blur radius in pixels. The thin
//! lens radius is linear in `1 / d`, so interpolating between samples is exact
//! and the lookup is zero at the focus distance whatever the sample spacing.
//! The magnitude is clamped to the blur range after interpolation. In
//! [`CocLookupMode::Volume`]
//! the table is a stack of rows, one per focal length across the focal-length
//! bounds, and the compositor interpolates between rows using the current
//! focal length. Focal-length changes then only move that shader scalar.

use crate::config::{FOCAL_LENGTH_SLICES, MAX_FOCAL_LENGTH, MIN_FOCAL_LENGTH};
use crate::lens::{LensModel, LensParameter, LensParameters};
use crate::raster::mix_scalar;

/// Selects between a per-focal-length table and a focal-length volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CocLookupMode {
    /// One row for the current focal length; regenerated on every lens change.
    Table,
    /// Rows spanning all focal lengths; focal-length changes skip regeneration.
    Volume,
}

impl CocLookupMode {
    /// Whether a change to `parameter` invalidates the table contents.
    pub fn requires_regeneration(self, parameter: LensParameter) -> bool {
        match parameter {
            LensParameter::FStop | LensParameter::FocusDistance => true,
            LensParameter::FocalLength => self == CocLookupMode::Table,
        }
    }

    pub fn focal_slices(self) -> u32 {
        match self {
            CocLookupMode::Table => 1,
            CocLookupMode::Volume => FOCAL_LENGTH_SLICES,
        }
    }
}

/// Shape and depth range of a table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CocTableLayout {
    pub mode: CocLookupMode,
    /// Depth samples per row (at least 2).
    pub samples: u32,
    /// Rows; 1 in table mode.
    pub slices: u32,
    /// World units.
    pub near: f32,
    pub far: f32,
}

impl CocTableLayout {
    pub fn new(mode: CocLookupMode, samples: u32, near: f32, far: f32) -> Self {
        Self {
            mode,
            samples: samples.max(2),
            slices: mode.focal_slices(),
            near,
            far,
        }
    }

    pub fn len(&self) -> usize {
        self.samples as usize * self.slices as usize
    }

    /// World-space depth of sample `i`; samples are evenly spaced in `1 / d`.
    pub fn depth_of_sample(&self, i: u32) -> f32 {
        let t = i as f32 / (self.samples - 1) as f32;
        self.near * self.far / (self.far - t * (self.far - self.near))
    }

    /// Table coordinate of a world-space depth. Mirrors `inverse_depth_coord`
    /// in `composite.wgsl`.
    pub fn normalized_depth(&self, depth: f32) -> f32 {
        inverse_depth_coord(self.near, self.far, depth)
    }

    /// Focal length a volume row was generated for.
    pub fn focal_length_of_slice(&self, j: u32) -> f32 {
        if self.slices <= 1 {
            return MIN_FOCAL_LENGTH;
        }
        let s = j as f32 / (self.slices - 1) as f32;
        MIN_FOCAL_LENGTH + s * (MAX_FOCAL_LENGTH - MIN_FOCAL_LENGTH)
    }
}

/// The inputs a table was generated from. The focal length is absent in
/// volume mode because the volume covers all of them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CocTableKey {
    pub f_stop: f32,
    pub focus_distance: f32,
    pub focal_length: Option<f32>,
    pub pixels_per_mm: f32,
    pub max_blur_radius: f32,
}

impl CocTableKey {
    pub fn new(model: &LensModel, params: &LensParameters, mode: CocLookupMode) -> Self {
        Self {
            f_stop: params.f_stop(),
            focus_distance: params.focus_distance(),
            focal_length: match mode {
                CocLookupMode::Table => Some(params.focal_length()),
                CocLookupMode::Volume => None,
            },
            pixels_per_mm: model.pixels_per_mm(),
            max_blur_radius: model.max_blur_radius(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CocTable {
    layout: CocTableLayout,
    key: CocTableKey,
    /// Row-major, `slices` rows of `samples` values.
    values: Vec<f32>,
}

impl CocTable {
    /// Evaluate the lens model over the layout. Pure: identical inputs give
    /// bit-identical contents.
    pub fn generate(model: &LensModel, params: &LensParameters, layout: CocTableLayout) -> Self {
        let mut values = Vec::with_capacity(layout.len());
        for j in 0..layout.slices {
            let row_params = match layout.mode {
                CocLookupMode::Table => *params,
                CocLookupMode::Volume => LensParameters::new(
                    params.f_stop(),
                    layout.focal_length_of_slice(j),
                    params.focus_distance(),
                ),
            };
            for i in 0..layout.samples {
                values.push(model.signed_radius_world(&row_params, layout.depth_of_sample(i)));
            }
        }
        Self {
            layout,
            key: CocTableKey::new(model, params, layout.mode),
            values,
        }
    }

    pub fn layout(&self) -> &CocTableLayout {
        &self.layout
    }

    pub fn key(&self) -> &CocTableKey {
        &self.key
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.values)
    }

    pub fn width(&self) -> u32 {
        self.layout.samples
    }

    pub fn height(&self) -> u32 {
        self.layout.slices
    }

    pub fn row(&self, slice: u32) -> &[f32] {
        let start = slice as usize * self.layout.samples as usize;
        &self.values[start..start + self.layout.samples as usize]
    }

    /// True when the table was generated from exactly these inputs.
    pub fn is_current_for(&self, model: &LensModel, params: &LensParameters) -> bool {
        self.key == CocTableKey::new(model, params, self.layout.mode)
    }

    /// Blur radius at normalized inverse depth `t`, interpolating linearly
    /// between samples and, in volume mode, between focal-length rows, then
    /// clamping the magnitude. Mirrors `lookup_coc` in `composite.wgsl`.
    pub fn sample(&self, t: f32, focal_coord: f32) -> f32 {
        let t = t.clamp(0.0, 1.0);
        let signed = if self.layout.slices <= 1 {
            self.row_lookup(t, 0)
        } else {
            let last = self.layout.slices - 1;
            let y = focal_coord.clamp(0.0, 1.0) * last as f32;
            let j0 = (y.floor() as u32).min(last);
            let j1 = (j0 + 1).min(last);
            let w = y - j0 as f32;
            mix_scalar(self.row_lookup(t, j0), self.row_lookup(t, j1), w)
        };
        signed.abs().min(self.key.max_blur_radius)
    }

    fn row_lookup(&self, t: f32, row: u32) -> f32 {
        let last = self.layout.samples - 1;
        let x = t * last as f32;
        let i0 = (x.floor() as u32).min(last);
        let i1 = (i0 + 1).min(last);
        let w = x - i0 as f32;
        let values = self.row(row);
        mix_scalar(values[i0 as usize], values[i1 as usize], w)
    }
}

/// `(1/near - 1/d) / (1/near - 1/far)`, clamped to `[0, 1]`. Evaluated as
/// `(d - near) / (far - near) * far / d` to avoid cancellation near the far
/// plane.
pub fn inverse_depth_coord(near: f32, far: f32, depth: f32) -> f32 {
    let d = depth.max(near);
    ((d - near) / (far - near) * (far / d)).clamp(0.0, 1.0)
}
