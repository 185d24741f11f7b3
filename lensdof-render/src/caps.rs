//! Device capability check, run before a device is accepted.

use crate::config::{BLUR_LEVELS, MIN_TEXTURE_DIMENSION};

/// Color-renderable formats the pipeline cares about. Depth formats are
/// reported through the dedicated flags on [`DeviceCapabilities`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetFormat {
    Rgba8UnormSrgb,
    Rgba16Float,
}

/// Shader capability tier. `Sm2` corresponds to downlevel WebGL-class
/// adapters, `Sm4` to full WebGPU, `Sm5` to adapters with compute and
/// storage textures in every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ShaderModel {
    Sm2,
    Sm4,
    Sm5,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub max_texture_dimension_2d: u32,
    pub max_texture_array_layers: u32,
    pub color_render_formats: Vec<TargetFormat>,
    pub linear_depth_renderable: bool,
    pub depth32_supported: bool,
    pub shader_model: ShaderModel,
    /// Wireframe rendering; optional.
    pub polygon_mode_line: bool,
}

impl DeviceCapabilities {
    /// Why the device cannot run the pipeline, or `None` when it can.
    pub fn rejection_reason(&self) -> Option<String> {
        if self.shader_model < ShaderModel::Sm4 {
            return Some(format!("shader model {:?} is below Sm4", self.shader_model));
        }
        if !self.color_render_formats.contains(&TargetFormat::Rgba16Float) {
            return Some("Rgba16Float is not color-renderable".to_string());
        }
        if !self.linear_depth_renderable {
            return Some("R32Float is not renderable".to_string());
        }
        if !self.depth32_supported {
            return Some("Depth32Float is not supported".to_string());
        }
        if (self.max_texture_array_layers as usize) < BLUR_LEVELS {
            return Some(format!(
                "{} texture array layers, need {BLUR_LEVELS}",
                self.max_texture_array_layers
            ));
        }
        if self.max_texture_dimension_2d < MIN_TEXTURE_DIMENSION {
            return Some(format!(
                "max 2D texture size {} is below {MIN_TEXTURE_DIMENSION}",
                self.max_texture_dimension_2d
            ));
        }
        None
    }
}

/// Accept or reject a device. Pure.
pub fn is_device_acceptable(caps: &DeviceCapabilities) -> bool {
    caps.rejection_reason().is_none()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full() -> DeviceCapabilities {
        DeviceCapabilities {
            max_texture_dimension_2d: 8192,
            max_texture_array_layers: 256,
            color_render_formats: vec![TargetFormat::Rgba8UnormSrgb, TargetFormat::Rgba16Float],
            linear_depth_renderable: true,
            depth32_supported: true,
            shader_model: ShaderModel::Sm5,
            polygon_mode_line: true,
        }
    }

    #[test]
    fn accepts_capable_device_without_wireframe() {
        assert!(is_device_acceptable(&full()));
        let caps = DeviceCapabilities {
            polygon_mode_line: false,
            ..full()
        };
        assert!(is_device_acceptable(&caps));
    }

    #[test]
    fn rejects_missing_requirements() {
        let cases = [
            DeviceCapabilities { shader_model: ShaderModel::Sm2, ..full() },
            DeviceCapabilities { color_render_formats: vec![TargetFormat::Rgba8UnormSrgb], ..full() },
            DeviceCapabilities { linear_depth_renderable: false, ..full() },
            DeviceCapabilities { depth32_supported: false, ..full() },
            DeviceCapabilities { max_texture_array_layers: 4, ..full() },
            DeviceCapabilities { max_texture_dimension_2d: 512, ..full() },
        ];
        for caps in cases {
            assert!(!is_device_acceptable(&caps), "accepted {caps:?}");
            assert!(caps.rejection_reason().is_some());
        }
    }

    #[test]
    fn depth_formats_are_checked_through_flags() {
        let caps = DeviceCapabilities { linear_depth_renderable: false, ..full() };
        assert!(caps.rejection_reason().unwrap().contains("R32Float"));
        let caps = DeviceCapabilities { depth32_supported: false, ..full() };
        assert!(caps.rejection_reason().unwrap().contains("Depth32Float"));
    }
}
