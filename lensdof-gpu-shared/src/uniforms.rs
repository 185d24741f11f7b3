use bytemuck::{Pod, Zeroable};

/// Number of blur radii the composite uniform block can carry.
pub const MAX_BLUR_LEVELS: usize = 8;

/// `CompositeUniforms::display_mode` value for the blended image.
pub const DISPLAY_COLORS: u32 = 0;
/// `CompositeUniforms::display_mode` value for the depth visualization.
pub const DISPLAY_DEPTH: u32 = 1;
/// `CompositeUniforms::display_mode` value for the blurriness visualization.
pub const DISPLAY_BLURRINESS: u32 = 2;

/// Scene pass uniforms for `scene.wgsl` bind group 0, binding 0.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SceneUniforms {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    /// xyz = direction the light travels, w unused.
    pub light_dir: [f32; 4],
    pub ambient: f32,
    pub checker_size: f32,
    pub _pad1: f32,
    pub _pad2: f32,
}

/// One separable blur pass for `blur.wgsl` bind group 0, binding 0.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct BlurParams {
    /// (1, 0) for horizontal, (0, 1) for vertical.
    pub direction: [i32; 2],
    /// Distance in pixels between kernel taps.
    pub stride: i32,
    pub _pad1: i32,
}

/// Scene mesh vertex for `scene.wgsl` `VertexInput`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct SceneVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    /// Alpha 0 marks checkered floor geometry.
    pub color: [f32; 4],
}

/// Composite pass uniforms for `composite.wgsl` bind group 0, binding 0.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct CompositeUniforms {
    pub near_plane: f32,
    pub far_plane: f32,
    /// Normalized focal length in [0, 1]; selects the table slice in volume mode.
    pub focal_coord: f32,
    pub display_mode: u32,
    pub depth_vis_min: f32,
    pub depth_vis_max: f32,
    pub max_blur_radius: f32,
    pub table_samples: u32,
    pub focal_slices: u32,
    pub level_count: u32,
    pub _pad1: u32,
    pub _pad2: u32,
    /// Blur radius of each pyramid level, packed four per vec4.
    pub level_radii: [[f32; 4]; MAX_BLUR_LEVELS / 4],
}

impl CompositeUniforms {
    /// Radius of pyramid level `k` as the shader reads it.
    pub fn level_radius(&self, k: usize) -> f32 {
        self.level_radii[k / 4][k % 4]
    }

    /// Pack level radii into the vec4 array.
    pub fn pack_radii(radii: &[f32]) -> [[f32; 4]; MAX_BLUR_LEVELS / 4] {
        let mut packed = [[0.0; 4]; MAX_BLUR_LEVELS / 4];
        for (k, r) in radii.iter().take(MAX_BLUR_LEVELS).enumerate() {
            packed[k / 4][k % 4] = *r;
        }
        packed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_sizes_follow_wgsl_layout() {
        assert_eq!(std::mem::size_of::<SceneUniforms>(), 160);
        assert_eq!(std::mem::size_of::<BlurParams>(), 16);
        assert_eq!(std::mem::size_of::<SceneVertex>(), 40);
        assert_eq!(std::mem::size_of::<CompositeUniforms>(), 80);
    }

    fn wgsl_struct_fields(source: &str, name: &str) -> Vec<String> {
        let start = source.find(&format!("struct {name} {{")).unwrap();
        let body = &source[start..];
        let body = &body[body.find('{').unwrap() + 1..body.find('}').unwrap()];
        body.lines()
            .filter_map(|line| line.trim().split_once(':'))
            .map(|(field, _)| field.trim().to_string())
            .collect()
    }

    #[test]
    fn scene_uniform_fields_match_shader() {
        assert_eq!(
            wgsl_struct_fields(crate::shaders::SCENE_SHADER, "SceneUniforms"),
            ["view", "projection", "light_dir", "ambient", "checker_size", "_pad1", "_pad2"]
        );
    }

    #[test]
    fn radii_pack_four_per_row() {
        let packed = CompositeUniforms::pack_radii(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        let uniforms = CompositeUniforms {
            level_radii: packed,
            ..Zeroable::zeroed()
        };
        assert_eq!(uniforms.level_radius(1), 1.0);
        assert_eq!(uniforms.level_radius(4), 4.0);
        assert_eq!(uniforms.level_radius(5), 5.0);
        assert_eq!(uniforms.level_radius(6), 0.0);
    }
}
