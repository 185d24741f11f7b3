//! Error taxonomy for the depth-of-field core.

use crate::app::DeviceState;

/// Every failure in the core either aborts the current lifecycle transition
/// or the current frame. Nothing is retried internally.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DofError {
    /// A texture, render target, buffer or pipeline could not be created.
    #[error("resource allocation failed: {0}")]
    ResourceAllocation(String),

    /// No device satisfies the capability check.
    #[error("no acceptable device: {0}")]
    DeviceUnavailable(String),

    /// A single frame failed to render and was skipped.
    #[error("frame render failed: {0}")]
    RenderFrame(String),

    /// The device was lost while rendering.
    #[error("device lost")]
    DeviceLost,

    /// A lifecycle entry point was called from a state that does not accept it.
    #[error("cannot handle {event} while {state:?}")]
    InvalidTransition {
        state: DeviceState,
        event: &'static str,
    },
}

impl DofError {
    pub fn allocation<T: ToString>(msg: T) -> Self {
        DofError::ResourceAllocation(msg.to_string())
    }

    pub fn unavailable<T: ToString>(msg: T) -> Self {
        DofError::DeviceUnavailable(msg.to_string())
    }

    pub fn render<T: ToString>(msg: T) -> Self {
        DofError::RenderFrame(msg.to_string())
    }
}

pub type DofResult<T> = Result<T, DofError>;
