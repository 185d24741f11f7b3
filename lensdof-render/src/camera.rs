//! Fixed demo camera. Input-driven orbiting is left to the host; this only
//! holds the eye, target and projection and produces left-handed matrices.

use crate::config::{CAMERA_EYE, CAMERA_FAR, CAMERA_FOV_Y, CAMERA_LOOK_AT, CAMERA_NEAR, DEFAULT_BACK_BUFFER};
use glam::{Mat4, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    eye: Vec3,
    look_at: Vec3,
    fov_y: f32,
    aspect: f32,
    near: f32,
    far: f32,
    /// Seconds accumulated by `frame_move`.
    time: f32,
}

impl Default for Camera {
    fn default() -> Self {
        let (w, h) = DEFAULT_BACK_BUFFER;
        Self {
            eye: Vec3::from_array(CAMERA_EYE),
            look_at: Vec3::from_array(CAMERA_LOOK_AT),
            fov_y: CAMERA_FOV_Y,
            aspect: w as f32 / h as f32,
            near: CAMERA_NEAR,
            far: CAMERA_FAR,
            time: 0.0,
        }
    }
}

impl Camera {
    /// Restore the default eye and target. Projection is left alone since it
    /// follows the back buffer.
    pub fn reset(&mut self) {
        let defaults = Self::default();
        self.eye = defaults.eye;
        self.look_at = defaults.look_at;
    }

    pub fn set_view_params(&mut self, eye: Vec3, look_at: Vec3) {
        self.eye = eye;
        self.look_at = look_at;
    }

    pub fn set_proj_params(&mut self, fov_y: f32, aspect: f32, near: f32, far: f32) {
        self.fov_y = fov_y;
        self.aspect = aspect;
        self.near = near;
        self.far = far;
    }

    /// Projection for a back buffer of `width x height`.
    pub fn set_back_buffer(&mut self, width: u32, height: u32) {
        self.set_proj_params(CAMERA_FOV_Y, width as f32 / height as f32, CAMERA_NEAR, CAMERA_FAR);
    }

    pub fn frame_move(&mut self, elapsed: f32) {
        self.time += elapsed;
    }

    pub fn eye(&self) -> Vec3 {
        self.eye
    }

    pub fn look_at(&self) -> Vec3 {
        self.look_at
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn near(&self) -> f32 {
        self.near
    }

    pub fn far(&self) -> f32 {
        self.far
    }

    /// Seconds accumulated by `frame_move`.
    pub fn time(&self) -> f32 {
        self.time
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_lh(self.eye, self.look_at, Vec3::Y)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_lh(self.fov_y, self.aspect, self.near, self.far)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn view_depth_is_distance_along_forward_axis() {
        let camera = Camera::default();
        let p = camera.view_matrix().transform_point3(Vec3::new(0.0, 1.0, 0.0));
        assert!((p.z - 25.0).abs() < 1e-5);
    }

    #[test]
    fn back_buffer_sets_aspect() {
        let mut camera = Camera::default();
        camera.set_back_buffer(1280, 720);
        assert_eq!(camera.aspect(), 1280.0 / 720.0);
        camera.set_back_buffer(640, 576);
        assert_eq!(camera.aspect(), 640.0 / 576.0);
    }

    #[test]
    fn reset_restores_view_but_keeps_projection() {
        let mut camera = Camera::default();
        camera.set_back_buffer(800, 600);
        camera.set_view_params(Vec3::new(5.0, 5.0, 5.0), Vec3::ZERO);
        camera.reset();
        assert_eq!(camera.eye(), Vec3::from_array(CAMERA_EYE));
        assert_eq!(camera.look_at(), Vec3::from_array(CAMERA_LOOK_AT));
        assert_eq!(camera.aspect(), 800.0 / 600.0);
    }
}
