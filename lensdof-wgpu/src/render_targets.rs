//! Render target creation: linear depth, blur level array, blur temp,
//! offscreen output and the CoC lookup texture.

use crate::backend::RenderTarget;
use lensdof_render::CocTableLayout;

/// Scene color and blur levels.
pub const HDR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;
/// Hardware depth for z-testing the scene pass.
pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
/// Linear view depth.
pub const LINEAR_DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;
/// CoC lookup, read with `textureLoad` only.
pub const COC_TABLE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;
/// Headless composite output.
pub const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Create a render target with a specific format.
pub fn create_render_target(
    device: &wgpu::Device,
    width: u32,
    height: u32,
    label: &str,
    format: wgpu::TextureFormat,
    with_depth: bool,
) -> RenderTarget {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };

    let color_texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let color_view = color_texture.create_view(&wgpu::TextureViewDescriptor::default());

    let (depth_texture, depth_view) = if with_depth {
        let dt = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(&format!("{label} Depth")),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let dv = dt.create_view(&wgpu::TextureViewDescriptor::default());
        (Some(dt), Some(dv))
    } else {
        (None, None)
    };

    RenderTarget {
        color_texture,
        color_view,
        depth_texture,
        depth_view,
        width,
        height,
    }
}

/// All pyramid levels in one array texture. Layer 0 is the sharp scene color.
pub struct BlurLevels {
    pub texture: wgpu::Texture,
    /// Every layer, bound by the composite pass.
    pub array_view: wgpu::TextureView,
    /// One 2D view per layer, used as attachment or blur source.
    pub layer_views: Vec<wgpu::TextureView>,
}

pub fn create_blur_levels(device: &wgpu::Device, width: u32, height: u32, levels: usize) -> BlurLevels {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Blur Levels"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: levels as u32,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: HDR_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let array_view = texture.create_view(&wgpu::TextureViewDescriptor {
        label: Some("Blur Levels Array"),
        dimension: Some(wgpu::TextureViewDimension::D2Array),
        ..Default::default()
    });
    let layer_views = (0..levels as u32)
        .map(|layer| {
            texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some(&format!("Blur Level {layer}")),
                dimension: Some(wgpu::TextureViewDimension::D2),
                base_array_layer: layer,
                array_layer_count: Some(1),
                ..Default::default()
            })
        })
        .collect();
    BlurLevels {
        texture,
        array_view,
        layer_views,
    }
}

/// Back-buffer-sized targets for one frame.
pub struct DofTargets {
    /// R32Float linear depth plus the Depth32Float z-buffer.
    pub linear_depth: RenderTarget,
    pub levels: BlurLevels,
    /// Horizontal half of each separable blur.
    pub blur_temp: RenderTarget,
    /// Composite destination when there is no surface.
    pub output: Option<RenderTarget>,
    pub width: u32,
    pub height: u32,
}

pub fn create_dof_targets(
    device: &wgpu::Device,
    width: u32,
    height: u32,
    levels: usize,
    offscreen_output: bool,
) -> DofTargets {
    DofTargets {
        linear_depth: create_render_target(device, width, height, "Linear Depth", LINEAR_DEPTH_FORMAT, true),
        levels: create_blur_levels(device, width, height, levels),
        blur_temp: create_render_target(device, width, height, "Blur Temp", HDR_FORMAT, false),
        output: offscreen_output
            .then(|| create_render_target(device, width, height, "DoF Output", OUTPUT_FORMAT, false)),
        width,
        height,
    }
}

/// CoC table storage: `samples x slices` texels of R32Float.
pub fn create_coc_table_texture(
    device: &wgpu::Device,
    layout: &CocTableLayout,
) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("CoC Table"),
        size: wgpu::Extent3d {
            width: layout.samples,
            height: layout.slices,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: COC_TABLE_FORMAT,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}
