//! Lens depth-of-field core.
//!
//! Platform-independent pieces of the pipeline: the thin-lens model, circle
//! of confusion tables, the blur pyramid definition, the compositor, the demo
//! scene and the device resource lifecycle. GPU backends implement
//! [`RenderDevice`]; [`SoftwareDevice`] is a CPU implementation of the same
//! passes.

pub mod app;
pub mod blur;
pub mod camera;
pub mod caps;
pub mod coc_table;
pub mod composite;
pub mod config;
pub mod device;
pub mod error;
pub mod lens;
pub mod raster;
pub mod scene;
pub mod software;

pub use app::{DepthOfFieldApp, DeviceLifecycle, DeviceState, FrameStatus};
pub use caps::{is_device_acceptable, DeviceCapabilities, ShaderModel, TargetFormat};
pub use coc_table::{CocLookupMode, CocTable, CocTableLayout};
pub use composite::DisplayMode;
pub use config::DofConfig;
pub use device::{FrameInputs, FrameTargets, RenderDevice};
pub use error::{DofError, DofResult};
pub use lens::{LensModel, LensParameters};
pub use software::SoftwareDevice;
