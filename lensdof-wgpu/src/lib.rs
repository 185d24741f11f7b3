//! Lens depth-of-field WebGPU backend with C FFI entry points.
//!
//! This crate is compiled as a cdylib and driven by a host framework that
//! forwards its device notifications and frame callbacks. Every entry point
//! takes the opaque handle returned by `lensdof_initialize*`.

pub mod backend;
pub mod passes;
pub mod pipeline;
pub mod render_targets;

pub use backend::{capabilities_from_adapter, FrameResources, PersistentResources, WgpuDevice};

use glam::Mat4;
use lensdof_render::caps::{ShaderModel, TargetFormat};
use lensdof_render::{
    DepthOfFieldApp, DeviceCapabilities, DeviceLifecycle, DisplayMode, DofResult, FrameStatus,
};
use std::ffi::CString;
use std::os::raw::c_char;

/// Everything behind an FFI handle.
pub struct DofHost {
    app: DepthOfFieldApp<WgpuDevice>,
    last_error: Option<CString>,
}

impl DofHost {
    fn record<T>(&mut self, result: DofResult<T>) -> Result<T, ()> {
        result.map_err(|e| {
            log::error!("{e}");
            self.last_error = CString::new(e.to_string()).ok();
        })
    }
}

fn host_mut<'a>(host: *mut DofHost) -> Option<&'a mut DofHost> {
    // SAFETY: handles only come from `Box::into_raw` in the initialisers and
    // are invalidated by `lensdof_shutdown`.
    unsafe { host.as_mut() }
}

fn status_code(result: Result<(), ()>) -> i32 {
    match result {
        Ok(()) => 0,
        Err(()) => -1,
    }
}

// ============================================================
// Window handle wrapper for raw-window-handle integration
// ============================================================

/// Wrapper that implements HasWindowHandle + HasDisplayHandle for X11.
#[cfg(target_os = "linux")]
struct X11WindowHandle {
    window: u64,
    display: *mut std::ffi::c_void,
}

#[cfg(target_os = "linux")]
unsafe impl Send for X11WindowHandle {}
#[cfg(target_os = "linux")]
unsafe impl Sync for X11WindowHandle {}

#[cfg(target_os = "linux")]
impl raw_window_handle::HasWindowHandle for X11WindowHandle {
    fn window_handle(&self) -> Result<raw_window_handle::WindowHandle<'_>, raw_window_handle::HandleError> {
        let raw = raw_window_handle::RawWindowHandle::Xlib(raw_window_handle::XlibWindowHandle::new(self.window as _));
        Ok(unsafe { raw_window_handle::WindowHandle::borrow_raw(raw) })
    }
}

#[cfg(target_os = "linux")]
impl raw_window_handle::HasDisplayHandle for X11WindowHandle {
    fn display_handle(&self) -> Result<raw_window_handle::DisplayHandle<'_>, raw_window_handle::HandleError> {
        let raw = raw_window_handle::RawDisplayHandle::Xlib(raw_window_handle::XlibDisplayHandle::new(
            std::ptr::NonNull::new(self.display),
            0,
        ));
        Ok(unsafe { raw_window_handle::DisplayHandle::borrow_raw(raw) })
    }
}

/// Wrapper for Windows (Win32).
#[cfg(target_os = "windows")]
struct Win32WindowHandle {
    hwnd: std::num::NonZeroIsize,
}

#[cfg(target_os = "windows")]
unsafe impl Send for Win32WindowHandle {}
#[cfg(target_os = "windows")]
unsafe impl Sync for Win32WindowHandle {}

#[cfg(target_os = "windows")]
impl raw_window_handle::HasWindowHandle for Win32WindowHandle {
    fn window_handle(&self) -> Result<raw_window_handle::WindowHandle<'_>, raw_window_handle::HandleError> {
        let raw = raw_window_handle::RawWindowHandle::Win32(raw_window_handle::Win32WindowHandle::new(self.hwnd));
        Ok(unsafe { raw_window_handle::WindowHandle::borrow_raw(raw) })
    }
}

#[cfg(target_os = "windows")]
impl raw_window_handle::HasDisplayHandle for Win32WindowHandle {
    fn display_handle(&self) -> Result<raw_window_handle::DisplayHandle<'_>, raw_window_handle::HandleError> {
        let raw = raw_window_handle::RawDisplayHandle::Windows(raw_window_handle::WindowsDisplayHandle::new());
        Ok(unsafe { raw_window_handle::DisplayHandle::borrow_raw(raw) })
    }
}

// ============================================================
// FFI: Lifecycle
// ============================================================

fn into_handle(result: DofResult<WgpuDevice>) -> *mut DofHost {
    match result {
        Ok(device) => Box::into_raw(Box::new(DofHost {
            app: DepthOfFieldApp::new(device),
            last_error: None,
        })),
        Err(e) => {
            log::error!("WebGPU initialization failed: {e}");
            std::ptr::null_mut()
        }
    }
}

/// Open a device presenting to a native window.
///
/// On Linux: `window_handle` is the X11 Window, `display_handle` is the X11 Display*.
/// On Windows: `window_handle` is the HWND, `display_handle` is unused.
///
/// Returns null on failure. The device is not yet `Created`; the host
/// follows with `lensdof_device_created` and `lensdof_device_reset`.
#[no_mangle]
pub extern "C" fn lensdof_initialize(
    window_handle: u64,
    display_handle: *mut std::ffi::c_void,
    width: i32,
    height: i32,
) -> *mut DofHost {
    let _ = env_logger::try_init();
    let (w, h) = (width.max(1) as u32, height.max(1) as u32);

    #[cfg(target_os = "linux")]
    let result = WgpuDevice::new(
        X11WindowHandle {
            window: window_handle,
            display: display_handle,
        },
        w,
        h,
    );

    #[cfg(target_os = "windows")]
    let result = {
        let _ = display_handle;
        match std::num::NonZeroIsize::new(window_handle as isize) {
            Some(hwnd) => WgpuDevice::new(Win32WindowHandle { hwnd }, w, h),
            None => Err(lensdof_render::DofError::unavailable("null HWND")),
        }
    };

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    let result = {
        let _ = (window_handle, display_handle, w, h);
        Err(lensdof_render::DofError::unavailable("unsupported platform"))
    };

    into_handle(result)
}

/// Open a device without a window; frames composite offscreen.
#[no_mangle]
pub extern "C" fn lensdof_initialize_headless() -> *mut DofHost {
    let _ = env_logger::try_init();
    into_handle(WgpuDevice::new_headless())
}

/// Release every resource and free the handle.
#[no_mangle]
pub extern "C" fn lensdof_shutdown(host: *mut DofHost) {
    if host.is_null() {
        return;
    }
    // SAFETY: see `host_mut`; ownership returns to Rust here.
    let mut host = unsafe { Box::from_raw(host) };
    host.app.on_device_destroyed();
    log::info!("WebGPU backend shut down");
}

#[no_mangle]
pub extern "C" fn lensdof_device_created(host: *mut DofHost) -> i32 {
    let Some(host) = host_mut(host) else { return -1 };
    let result = host.app.on_device_created();
    status_code(host.record(result))
}

#[no_mangle]
pub extern "C" fn lensdof_device_reset(host: *mut DofHost, width: i32, height: i32) -> i32 {
    let Some(host) = host_mut(host) else { return -1 };
    let result = host
        .app
        .on_device_reset(width.max(0) as u32, height.max(0) as u32);
    status_code(host.record(result))
}

#[no_mangle]
pub extern "C" fn lensdof_device_lost(host: *mut DofHost) {
    if let Some(host) = host_mut(host) {
        host.app.on_device_lost();
    }
}

#[no_mangle]
pub extern "C" fn lensdof_device_destroyed(host: *mut DofHost) {
    if let Some(host) = host_mut(host) {
        host.app.on_device_destroyed();
    }
}

// ============================================================
// FFI: Frame
// ============================================================

#[no_mangle]
pub extern "C" fn lensdof_frame_update(host: *mut DofHost, elapsed_seconds: f32) {
    if let Some(host) = host_mut(host) {
        host.app.on_frame_update(elapsed_seconds);
    }
}

/// Render one frame. `view_ptr` points at 16 column-major floats; null uses
/// the built-in camera. Returns 0 when presented, 1 when skipped.
#[no_mangle]
pub extern "C" fn lensdof_frame_render(host: *mut DofHost, view_ptr: *const f32) -> i32 {
    let Some(host) = host_mut(host) else { return -1 };
    let view = if view_ptr.is_null() {
        host.app.camera().view_matrix()
    } else {
        let cols = unsafe { std::slice::from_raw_parts(view_ptr, 16) };
        Mat4::from_cols_slice(cols)
    };
    let result = host.app.on_frame_render(view);
    match host.record(result) {
        Ok(FrameStatus::Presented) => 0,
        Ok(FrameStatus::Skipped) => 1,
        Err(()) => -1,
    }
}

// ============================================================
// FFI: Lens and display controls
// ============================================================

#[no_mangle]
pub extern "C" fn lensdof_set_f_stop(host: *mut DofHost, f_stop: f32) -> i32 {
    let Some(host) = host_mut(host) else { return -1 };
    let result = host.app.set_f_stop(f_stop);
    status_code(host.record(result))
}

#[no_mangle]
pub extern "C" fn lensdof_set_focal_length(host: *mut DofHost, focal_length_mm: f32) -> i32 {
    let Some(host) = host_mut(host) else { return -1 };
    let result = host.app.set_focal_length(focal_length_mm);
    status_code(host.record(result))
}

#[no_mangle]
pub extern "C" fn lensdof_set_focus_distance(host: *mut DofHost, focus_distance_mm: f32) -> i32 {
    let Some(host) = host_mut(host) else { return -1 };
    let result = host.app.set_focus_distance(focus_distance_mm);
    status_code(host.record(result))
}

/// `mode`: 0 colors, 1 depth, 2 blurriness.
#[no_mangle]
pub extern "C" fn lensdof_set_display_mode(host: *mut DofHost, mode: u32) -> i32 {
    let Some(host) = host_mut(host) else { return -1 };
    match DisplayMode::from_uniform(mode) {
        Some(mode) => {
            host.app.set_display_mode(mode);
            0
        }
        None => {
            log::warn!("unknown display mode {mode}");
            host.last_error = CString::new(format!("unknown display mode {mode}")).ok();
            -1
        }
    }
}

#[no_mangle]
pub extern "C" fn lensdof_set_wireframe(host: *mut DofHost, enabled: bool) {
    if let Some(host) = host_mut(host) {
        host.app.set_wireframe(enabled);
    }
}

#[no_mangle]
pub extern "C" fn lensdof_reset_to_defaults(host: *mut DofHost) -> i32 {
    let Some(host) = host_mut(host) else { return -1 };
    let result = host.app.reset_to_defaults();
    status_code(host.record(result))
}

/// Last error message, valid until the next failing call or shutdown.
#[no_mangle]
pub extern "C" fn lensdof_last_error(host: *mut DofHost) -> *const c_char {
    host_mut(host)
        .and_then(|host| host.last_error.as_ref())
        .map_or(std::ptr::null(), |msg| msg.as_ptr())
}

// ============================================================
// FFI: Capability check
// ============================================================

/// C view of [`DeviceCapabilities`]. `shader_model` is 2, 4 or 5.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct LensDofCaps {
    pub max_texture_dimension_2d: u32,
    pub max_texture_array_layers: u32,
    pub rgba8_srgb_renderable: bool,
    pub rgba16f_renderable: bool,
    pub r32f_renderable: bool,
    pub depth32_supported: bool,
    pub shader_model: u32,
    pub polygon_mode_line: bool,
}

impl From<&LensDofCaps> for DeviceCapabilities {
    fn from(caps: &LensDofCaps) -> Self {
        let color_render_formats = [
            (caps.rgba8_srgb_renderable, TargetFormat::Rgba8UnormSrgb),
            (caps.rgba16f_renderable, TargetFormat::Rgba16Float),
        ]
        .into_iter()
        .filter_map(|(supported, format)| supported.then_some(format))
        .collect();
        DeviceCapabilities {
            max_texture_dimension_2d: caps.max_texture_dimension_2d,
            max_texture_array_layers: caps.max_texture_array_layers,
            color_render_formats,
            linear_depth_renderable: caps.r32f_renderable,
            depth32_supported: caps.depth32_supported,
            shader_model: match caps.shader_model {
                0..=3 => ShaderModel::Sm2,
                4 => ShaderModel::Sm4,
                _ => ShaderModel::Sm5,
            },
            polygon_mode_line: caps.polygon_mode_line,
        }
    }
}

/// Whether a device with these capabilities can run the pipeline.
#[no_mangle]
pub extern "C" fn lensdof_is_device_acceptable(caps: *const LensDofCaps) -> bool {
    // SAFETY: the caller passes a valid pointer or null.
    let Some(caps) = (unsafe { caps.as_ref() }) else { return false };
    let caps = DeviceCapabilities::from(caps);
    match caps.rejection_reason() {
        Some(reason) => {
            log::info!("device rejected: {reason}");
            false
        }
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_caps() -> LensDofCaps {
        LensDofCaps {
            max_texture_dimension_2d: 8192,
            max_texture_array_layers: 256,
            rgba8_srgb_renderable: true,
            rgba16f_renderable: true,
            r32f_renderable: true,
            depth32_supported: true,
            shader_model: 5,
            polygon_mode_line: false,
        }
    }

    #[test]
    fn ffi_caps_accept_capable_device() {
        assert!(lensdof_is_device_acceptable(&full_caps()));
    }

    #[test]
    fn ffi_caps_reject_missing_requirements() {
        let mut caps = full_caps();
        caps.shader_model = 2;
        assert!(!lensdof_is_device_acceptable(&caps));

        let mut caps = full_caps();
        caps.rgba16f_renderable = false;
        assert!(!lensdof_is_device_acceptable(&caps));

        assert!(!lensdof_is_device_acceptable(std::ptr::null()));
    }

    #[test]
    fn null_handles_are_errors() {
        let null = std::ptr::null_mut();
        assert_eq!(lensdof_device_created(null), -1);
        assert_eq!(lensdof_frame_render(null, std::ptr::null()), -1);
        assert_eq!(lensdof_set_f_stop(null, 2.0), -1);
        assert!(lensdof_last_error(null).is_null());
        lensdof_shutdown(null);
    }
}
