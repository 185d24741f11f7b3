//! Types and shader sources shared between the CPU reference device and the
//! WebGPU backend.

pub mod shaders;
pub mod uniforms;
