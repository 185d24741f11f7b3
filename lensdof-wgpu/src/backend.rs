//! wgpu implementation of `RenderDevice`.

use crate::passes;
use crate::pipeline;
use crate::render_targets::{self, DofTargets, OUTPUT_FORMAT};
use lensdof_gpu_shared::uniforms::{BlurParams, CompositeUniforms, SceneUniforms};
use lensdof_render::blur::{BlurPass, BlurPyramid};
use lensdof_render::caps::{DeviceCapabilities, ShaderModel, TargetFormat};
use lensdof_render::device::{FrameInputs, FrameTargets, RenderDevice};
use lensdof_render::scene::DemoScene;
use lensdof_render::{CocTable, CocTableLayout, DofError, DofResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use wgpu::util::DeviceExt;

/// GPU mesh with interleaved vertices and 32-bit indices.
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

/// Render target (framebuffer equivalent).
pub struct RenderTarget {
    pub color_texture: wgpu::Texture,
    pub color_view: wgpu::TextureView,
    pub depth_texture: Option<wgpu::Texture>,
    pub depth_view: Option<wgpu::TextureView>,
    pub width: u32,
    pub height: u32,
}

/// Where the composite pass writes.
pub enum OutputTarget {
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    /// Into `DofTargets::output`, for headless use and tests.
    Offscreen,
}

/// Created-tier resources: pipelines, scene geometry, uniforms, CoC table.
pub struct PersistentResources {
    pub scene_bgl: wgpu::BindGroupLayout,
    pub blur_bgl: wgpu::BindGroupLayout,
    pub composite_bgl: wgpu::BindGroupLayout,
    pub scene_pipeline: wgpu::RenderPipeline,
    pub wireframe_pipeline: Option<wgpu::RenderPipeline>,
    pub blur_pipeline: wgpu::RenderPipeline,
    pub composite_pipeline: wgpu::RenderPipeline,
    pub mesh: GpuMesh,
    pub scene_buffer: wgpu::Buffer,
    pub composite_buffer: wgpu::Buffer,
    pub coc_table: wgpu::Texture,
    pub coc_table_view: wgpu::TextureView,
    pub coc_table_layout: CocTableLayout,
}

/// Active-tier resources: targets sized to the back buffer plus one params
/// buffer per blur pass.
pub struct FrameResources {
    pub targets: DofTargets,
    pub blur_passes: Vec<BlurPass>,
    pub blur_params: Vec<wgpu::Buffer>,
}

impl FrameTargets for FrameResources {
    fn extent(&self) -> (u32, u32) {
        (self.targets.width, self.targets.height)
    }
}

pub struct WgpuDevice {
    pub instance: wgpu::Instance,
    pub adapter: wgpu::Adapter,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub output: OutputTarget,
    capabilities: DeviceCapabilities,
    lost: Arc<AtomicBool>,
}

fn watch_device_loss(device: &wgpu::Device) -> Arc<AtomicBool> {
    let lost = Arc::new(AtomicBool::new(false));
    let flag = lost.clone();
    device.set_device_lost_callback(move |reason, message| {
        log::error!("wgpu device lost ({reason:?}): {message}");
        flag.store(true, Ordering::Release);
    });
    lost
}

/// Map adapter features, limits and format support onto the capability
/// descriptor the core checks.
pub fn capabilities_from_adapter(adapter: &wgpu::Adapter) -> DeviceCapabilities {
    let limits = adapter.limits();
    let downlevel = adapter.get_downlevel_capabilities();
    let renderable = |format: wgpu::TextureFormat| {
        adapter
            .get_texture_format_features(format)
            .allowed_usages
            .contains(wgpu::TextureUsages::RENDER_ATTACHMENT)
    };

    let shader_model = if !downlevel.is_webgpu_compliant() {
        ShaderModel::Sm2
    } else if downlevel.flags.contains(wgpu::DownlevelFlags::VERTEX_STORAGE) {
        ShaderModel::Sm5
    } else {
        ShaderModel::Sm4
    };

    let color_render_formats = [
        (wgpu::TextureFormat::Rgba8UnormSrgb, TargetFormat::Rgba8UnormSrgb),
        (wgpu::TextureFormat::Rgba16Float, TargetFormat::Rgba16Float),
    ]
    .into_iter()
    .filter(|(format, _)| renderable(*format))
    .map(|(_, target)| target)
    .collect();

    DeviceCapabilities {
        max_texture_dimension_2d: limits.max_texture_dimension_2d,
        max_texture_array_layers: limits.max_texture_array_layers,
        color_render_formats,
        linear_depth_renderable: renderable(wgpu::TextureFormat::R32Float),
        depth32_supported: renderable(wgpu::TextureFormat::Depth32Float),
        shader_model,
        polygon_mode_line: adapter.features().contains(wgpu::Features::POLYGON_MODE_LINE),
    }
}

impl WgpuDevice {
    /// Create a device presenting to a window surface.
    pub fn new(
        window: impl raw_window_handle::HasWindowHandle + raw_window_handle::HasDisplayHandle + Send + Sync + 'static,
        width: u32,
        height: u32,
    ) -> DofResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window)
            .map_err(|e| DofError::unavailable(format!("failed to create surface: {e}")))?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| DofError::unavailable("no suitable GPU adapter"))?;

        let (device, queue, capabilities) = Self::open(&adapter)?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or_else(|| DofError::unavailable("surface reports no formats"))?;
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(Self::assemble(
            instance,
            adapter,
            device,
            queue,
            OutputTarget::Surface { surface, config },
            capabilities,
        ))
    }

    /// Create a device without a surface; frames composite into an offscreen
    /// target that can be read back with [`WgpuDevice::read_output`].
    pub fn new_headless() -> DofResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| DofError::unavailable("no suitable GPU adapter"))?;
        let (device, queue, capabilities) = Self::open(&adapter)?;
        Ok(Self::assemble(
            instance,
            adapter,
            device,
            queue,
            OutputTarget::Offscreen,
            capabilities,
        ))
    }

    fn open(adapter: &wgpu::Adapter) -> DofResult<(wgpu::Device, wgpu::Queue, DeviceCapabilities)> {
        let capabilities = capabilities_from_adapter(adapter);
        if let Some(reason) = capabilities.rejection_reason() {
            return Err(DofError::unavailable(format!(
                "{} rejected: {reason}",
                adapter.get_info().name
            )));
        }

        let required_features = if capabilities.polygon_mode_line {
            wgpu::Features::POLYGON_MODE_LINE
        } else {
            wgpu::Features::empty()
        };
        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("Lens DoF Device"),
                required_features,
                required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::default(),
            },
            None,
        ))
        .map_err(|e| DofError::unavailable(format!("failed to create device: {e}")))?;

        log::info!(
            "WebGPU device ready: {} ({})",
            adapter.get_info().name,
            adapter.get_info().backend.to_str()
        );
        Ok((device, queue, capabilities))
    }

    fn assemble(
        instance: wgpu::Instance,
        adapter: wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
        output: OutputTarget,
        capabilities: DeviceCapabilities,
    ) -> Self {
        let lost = watch_device_loss(&device);
        Self {
            instance,
            adapter,
            device,
            queue,
            output,
            capabilities,
            lost,
        }
    }

    /// Whether the driver reported the current `wgpu::Device` as lost.
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> DofResult<()> {
        if self.is_lost() {
            return Err(DofError::DeviceLost);
        }
        Ok(())
    }

    /// Replace a lost device with a fresh adapter and device on the same
    /// instance and output.
    fn reopen(&mut self) -> DofResult<()> {
        let compatible_surface = match &self.output {
            OutputTarget::Surface { surface, .. } => Some(surface),
            OutputTarget::Offscreen => None,
        };
        let adapter = pollster::block_on(self.instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface,
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| DofError::unavailable("no suitable GPU adapter after device loss"))?;
        let (device, queue, capabilities) = Self::open(&adapter)?;

        if let OutputTarget::Surface { surface, config } = &self.output {
            surface.configure(&device, config);
        }
        self.lost = watch_device_loss(&device);
        self.adapter = adapter;
        self.device = device;
        self.queue = queue;
        self.capabilities = capabilities;
        log::info!("replaced lost device");
        Ok(())
    }

    fn output_format(&self) -> wgpu::TextureFormat {
        match &self.output {
            OutputTarget::Surface { config, .. } => config.format,
            OutputTarget::Offscreen => OUTPUT_FORMAT,
        }
    }

    /// Run `f` inside validation and out-of-memory error scopes and turn a
    /// captured error into `ResourceAllocation`.
    fn scoped<T>(&self, what: &str, f: impl FnOnce(&wgpu::Device) -> T) -> DofResult<T> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f(&self.device);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        match out_of_memory.or(validation) {
            Some(err) => Err(DofError::allocation(format!("{what}: {err}"))),
            None => Ok(value),
        }
    }

    /// Read the offscreen output as tightly packed sRGB RGBA8 rows.
    pub fn read_output(&self, frame: &FrameResources) -> DofResult<Vec<u8>> {
        let target = frame
            .targets
            .output
            .as_ref()
            .ok_or_else(|| DofError::render("device presents to a surface"))?;
        let (width, height) = (target.width, target.height);
        let unpadded = 4 * width;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Output Readback"),
            size: u64::from(padded) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Readback Encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &target.color_texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|e| DofError::render(format!("readback dropped: {e}")))?
            .map_err(|e| DofError::render(format!("readback failed: {e}")))?;

        let mapped = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded * height) as usize);
        for row in mapped.chunks(padded as usize) {
            pixels.extend_from_slice(&row[..unpadded as usize]);
        }
        drop(mapped);
        buffer.unmap();
        Ok(pixels)
    }
}

impl RenderDevice for WgpuDevice {
    type Persistent = PersistentResources;
    type Frame = FrameResources;

    fn capabilities(&self) -> &DeviceCapabilities {
        &self.capabilities
    }

    fn create_persistent(
        &mut self,
        scene: &DemoScene,
        layout: &CocTableLayout,
    ) -> DofResult<PersistentResources> {
        if self.is_lost() {
            self.reopen()?;
        }
        let output_format = self.output_format();
        let polygon_mode_line = self.capabilities.polygon_mode_line;
        let (vertices, indices) = scene.mesh();

        self.scoped("persistent resources", |device| {
            let scene_bgl = pipeline::create_scene_bgl(device);
            let blur_bgl = pipeline::create_blur_bgl(device);
            let composite_bgl = pipeline::create_composite_bgl(device);
            let (coc_table, coc_table_view) = render_targets::create_coc_table_texture(device, layout);

            PersistentResources {
                scene_pipeline: pipeline::create_scene_pipeline(device, &scene_bgl, wgpu::PolygonMode::Fill),
                wireframe_pipeline: polygon_mode_line
                    .then(|| pipeline::create_scene_pipeline(device, &scene_bgl, wgpu::PolygonMode::Line)),
                blur_pipeline: pipeline::create_blur_pipeline(device, &blur_bgl),
                composite_pipeline: pipeline::create_composite_pipeline(device, &composite_bgl, output_format),
                mesh: GpuMesh {
                    vertex_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("Scene Vertices"),
                        contents: bytemuck::cast_slice(&vertices),
                        usage: wgpu::BufferUsages::VERTEX,
                    }),
                    index_buffer: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("Scene Indices"),
                        contents: bytemuck::cast_slice(&indices),
                        usage: wgpu::BufferUsages::INDEX,
                    }),
                    index_count: indices.len() as u32,
                },
                scene_buffer: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Scene Uniforms"),
                    size: std::mem::size_of::<SceneUniforms>() as u64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }),
                composite_buffer: device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("Composite Uniforms"),
                    size: std::mem::size_of::<CompositeUniforms>() as u64,
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }),
                coc_table,
                coc_table_view,
                coc_table_layout: *layout,
                scene_bgl,
                blur_bgl,
                composite_bgl,
            }
        })
    }

    fn upload_coc_table(
        &mut self,
        persistent: &mut PersistentResources,
        table: &CocTable,
    ) -> DofResult<()> {
        self.ensure_live()?;
        let layout = *table.layout();
        if (layout.samples, layout.slices)
            != (persistent.coc_table_layout.samples, persistent.coc_table_layout.slices)
        {
            let (texture, view) = self.scoped("coc table", |device| {
                render_targets::create_coc_table_texture(device, &layout)
            })?;
            persistent.coc_table = texture;
            persistent.coc_table_view = view;
            persistent.coc_table_layout = layout;
        }

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &persistent.coc_table,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            table.as_bytes(),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(4 * layout.samples),
                rows_per_image: Some(layout.slices),
            },
            wgpu::Extent3d {
                width: layout.samples,
                height: layout.slices,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn create_frame_targets(
        &mut self,
        _persistent: &PersistentResources,
        width: u32,
        height: u32,
        levels: usize,
    ) -> DofResult<FrameResources> {
        // A lost device only comes back through destroy and create.
        self.ensure_live()?;
        if let OutputTarget::Surface { surface, config } = &mut self.output {
            config.width = width;
            config.height = height;
            surface.configure(&self.device, config);
        }
        let offscreen = matches!(self.output, OutputTarget::Offscreen);
        let blur_passes = BlurPyramid::new(levels).passes();

        self.scoped("frame targets", |device| {
            let blur_params = blur_passes
                .iter()
                .map(|pass| {
                    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some(&format!("Blur Params L{}", pass.level)),
                        contents: bytemuck::bytes_of::<BlurParams>(&pass.params),
                        usage: wgpu::BufferUsages::UNIFORM,
                    })
                })
                .collect();
            FrameResources {
                targets: render_targets::create_dof_targets(device, width, height, levels, offscreen),
                blur_passes,
                blur_params,
            }
        })
    }

    fn render_frame(
        &mut self,
        persistent: &PersistentResources,
        frame: &mut FrameResources,
        inputs: &FrameInputs,
    ) -> DofResult<()> {
        self.ensure_live()?;

        let surface_texture = match &self.output {
            OutputTarget::Surface { surface, .. } => match surface.get_current_texture() {
                Ok(texture) => Some(texture),
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    return Err(DofError::DeviceLost);
                }
                Err(e) => return Err(DofError::render(format!("surface error: {e}"))),
            },
            OutputTarget::Offscreen => None,
        };
        let surface_view = surface_texture
            .as_ref()
            .map(|t| t.texture.create_view(&wgpu::TextureViewDescriptor::default()));
        let output_view = match (&surface_view, &frame.targets.output) {
            (Some(view), _) => view,
            (None, Some(target)) => &target.color_view,
            (None, None) => return Err(DofError::render("no output target")),
        };

        self.queue
            .write_buffer(&persistent.scene_buffer, 0, bytemuck::bytes_of(&inputs.scene));
        self.queue
            .write_buffer(&persistent.composite_buffer, 0, bytemuck::bytes_of(&inputs.composite));

        let device = &self.device;
        let targets = &frame.targets;
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("DoF Frame Encoder"),
        });

        let scene_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Scene BG"),
            layout: &persistent.scene_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: persistent.scene_buffer.as_entire_binding(),
            }],
        });
        let scene_pipeline = match (&persistent.wireframe_pipeline, inputs.wireframe) {
            (Some(wireframe), true) => wireframe,
            _ => &persistent.scene_pipeline,
        };
        passes::scene::render_scene_pass(
            &mut encoder,
            &targets.levels.layer_views[0],
            &targets.linear_depth,
            scene_pipeline,
            &scene_bind_group,
            &persistent.mesh,
        )
        .map_err(DofError::render)?;

        for (pass, params) in frame.blur_passes.iter().zip(&frame.blur_params) {
            let (source, target, label) = if pass.is_horizontal() {
                (
                    &targets.levels.layer_views[pass.level - 1],
                    &targets.blur_temp.color_view,
                    "Blur H Pass",
                )
            } else {
                (
                    &targets.blur_temp.color_view,
                    &targets.levels.layer_views[pass.level],
                    "Blur V Pass",
                )
            };
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("Blur BG"),
                layout: &persistent.blur_bgl,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: params.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(source),
                    },
                ],
            });
            passes::blur::render_blur_pass(&mut encoder, target, &persistent.blur_pipeline, &bind_group, label);
        }

        let composite_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Composite BG"),
            layout: &persistent.composite_bgl,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: persistent.composite_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&targets.linear_depth.color_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&targets.levels.array_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&persistent.coc_table_view),
                },
            ],
        });
        passes::composite::render_composite_pass(
            &mut encoder,
            output_view,
            &persistent.composite_pipeline,
            &composite_bind_group,
        );

        self.queue.submit(std::iter::once(encoder.finish()));
        if let Some(texture) = surface_texture {
            texture.present();
        }

        self.ensure_live()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_adapter_capabilities_are_consistent() {
        let device = match WgpuDevice::new_headless() {
            Ok(device) => device,
            Err(e) => {
                eprintln!("skipping: {e}");
                return;
            }
        };
        let caps = device.capabilities();
        assert!(lensdof_render::is_device_acceptable(caps));
        assert_eq!(
            caps.polygon_mode_line,
            device.device.features().contains(wgpu::Features::POLYGON_MODE_LINE)
        );
    }
}
