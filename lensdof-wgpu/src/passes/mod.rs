//! Render pass implementations for the depth-of-field pipeline.

pub mod blur;
pub mod composite;
pub mod scene;
