//! Compositor: per-pixel CoC lookup and blend between bracketing blur levels,
//! plus the depth and blurriness visualizations.
//!
//! Every function here has a twin in `composite.wgsl`; keep them in step.

use crate::blur::BlurPyramid;
use crate::coc_table::{inverse_depth_coord, CocTable, CocTableLayout};
use crate::config::{DEPTH_VIS_MAX, DEPTH_VIS_MIN};
use crate::lens::{LensModel, LensParameters};
use crate::raster::{mix, Image, Rgba};
use lensdof_gpu_shared::uniforms::{
    CompositeUniforms, DISPLAY_BLURRINESS, DISPLAY_COLORS, DISPLAY_DEPTH,
};

/// What the compositor writes to the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DisplayMode {
    /// The depth-of-field result.
    #[default]
    Colors,
    /// Linear depth as grayscale over `[DEPTH_VIS_MIN, DEPTH_VIS_MAX]`.
    Depth,
    /// Blur radius as grayscale over `[0, max_blur_radius]`.
    Blurriness,
}

impl DisplayMode {
    pub fn as_uniform(self) -> u32 {
        match self {
            DisplayMode::Colors => DISPLAY_COLORS,
            DisplayMode::Depth => DISPLAY_DEPTH,
            DisplayMode::Blurriness => DISPLAY_BLURRINESS,
        }
    }

    pub fn from_uniform(value: u32) -> Option<Self> {
        match value {
            DISPLAY_COLORS => Some(DisplayMode::Colors),
            DISPLAY_DEPTH => Some(DisplayMode::Depth),
            DISPLAY_BLURRINESS => Some(DisplayMode::Blurriness),
            _ => None,
        }
    }
}

/// Composite uniforms for the current lens, table layout and pyramid.
pub fn composite_uniforms(
    layout: &CocTableLayout,
    pyramid: &BlurPyramid,
    model: &LensModel,
    params: &LensParameters,
    display_mode: DisplayMode,
) -> CompositeUniforms {
    CompositeUniforms {
        near_plane: layout.near,
        far_plane: layout.far,
        focal_coord: params.focal_coord(),
        display_mode: display_mode.as_uniform(),
        depth_vis_min: DEPTH_VIS_MIN,
        depth_vis_max: DEPTH_VIS_MAX,
        max_blur_radius: model.max_blur_radius(),
        table_samples: layout.samples,
        focal_slices: layout.slices,
        level_count: pyramid.level_count() as u32,
        _pad1: 0,
        _pad2: 0,
        level_radii: CompositeUniforms::pack_radii(pyramid.radii()),
    }
}

/// CoC table coordinate of a linear view depth.
pub fn normalized_depth(uniforms: &CompositeUniforms, depth: f32) -> f32 {
    inverse_depth_coord(uniforms.near_plane, uniforms.far_plane, depth)
}

pub fn depth_visualization(uniforms: &CompositeUniforms, depth: f32) -> f32 {
    ((depth - uniforms.depth_vis_min) / (uniforms.depth_vis_max - uniforms.depth_vis_min))
        .clamp(0.0, 1.0)
}

pub fn blurriness_visualization(uniforms: &CompositeUniforms, coc: f32) -> f32 {
    (coc / uniforms.max_blur_radius).clamp(0.0, 1.0)
}

/// Index `k` of the lower bracketing level and the blend weight towards
/// `k + 1`. A CoC beyond the last radius saturates at the last level.
pub fn bracket_levels(uniforms: &CompositeUniforms, coc: f32) -> (usize, f32) {
    let count = uniforms.level_count as usize;
    let mut k = 0;
    while k + 2 < count && coc > uniforms.level_radius(k + 1) {
        k += 1;
    }
    let r0 = uniforms.level_radius(k);
    let r1 = uniforms.level_radius(k + 1);
    (k, ((coc - r0) / (r1 - r0)).clamp(0.0, 1.0))
}

/// Output color of one pixel. `levels[0]` is the sharp scene color and
/// `linear_depth` holds view depth in its red channel.
pub fn composite_pixel(
    uniforms: &CompositeUniforms,
    table: &CocTable,
    linear_depth: &Image,
    levels: &[Image],
    x: u32,
    y: u32,
) -> Rgba {
    let depth = linear_depth.get(x, y)[0];
    let coc = table.sample(normalized_depth(uniforms, depth), uniforms.focal_coord);

    match DisplayMode::from_uniform(uniforms.display_mode) {
        Some(DisplayMode::Depth) => {
            let g = depth_visualization(uniforms, depth);
            [g, g, g, 1.0]
        }
        Some(DisplayMode::Blurriness) => {
            let g = blurriness_visualization(uniforms, coc);
            [g, g, g, 1.0]
        }
        _ => {
            let (k, w) = bracket_levels(uniforms, coc);
            let c = mix(levels[k].get(x, y), levels[k + 1].get(x, y), w);
            [c[0], c[1], c[2], 1.0]
        }
    }
}

/// Composite a whole frame.
pub fn composite(
    uniforms: &CompositeUniforms,
    table: &CocTable,
    linear_depth: &Image,
    levels: &[Image],
) -> Image {
    let mut out = Image::new(linear_depth.width(), linear_depth.height());
    for y in 0..out.height() {
        for x in 0..out.width() {
            out.set(x, y, composite_pixel(uniforms, table, linear_depth, levels, x, y));
        }
    }
    out
}
