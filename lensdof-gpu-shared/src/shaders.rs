/// Embedded WGSL shader sources for the depth-of-field pipeline.
/// The composite shader mirrors the CPU reference compositor in `lensdof-render`.

pub const FULLSCREEN_QUAD_VERT: &str = include_str!("../shaders/fullscreen_quad.wgsl");
pub const SCENE_SHADER: &str = include_str!("../shaders/scene.wgsl");
pub const BLUR_FRAG: &str = include_str!("../shaders/blur.wgsl");
pub const COMPOSITE_FRAG: &str = include_str!("../shaders/composite.wgsl");
