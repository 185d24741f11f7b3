//! The demo scene: a checkered floor with rows of colored boxes receding
//! from the camera, so near, focused and far depths are all on screen.
//!
//! The scene is exposed twice: as a triangle mesh for the GPU scene pass and
//! as an analytic ray cast for the CPU reference device. Shading is shared.

use glam::{Mat4, Vec3, Vec4};
use lensdof_gpu_shared::uniforms::{SceneUniforms, SceneVertex};

/// Axis-aligned box resting on the floor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneBox {
    pub min: Vec3,
    pub max: Vec3,
    pub color: [f32; 3],
}

impl SceneBox {
    /// A cube of edge `size` standing on the floor at `(x, z)`.
    pub fn cube(x: f32, z: f32, size: f32, color: [f32; 3]) -> Self {
        let h = size * 0.5;
        Self {
            min: Vec3::new(x - h, 0.0, z - h),
            max: Vec3::new(x + h, size, z + h),
            color,
        }
    }

    /// Slab test. Returns the entry distance and the face normal.
    fn intersect(&self, origin: Vec3, dir: Vec3) -> Option<(f32, Vec3)> {
        let mut t_enter = f32::NEG_INFINITY;
        let mut t_exit = f32::INFINITY;
        let mut normal = Vec3::ZERO;
        for axis in 0..3 {
            let o = origin[axis];
            let d = dir[axis];
            if d.abs() < 1e-8 {
                if o < self.min[axis] || o > self.max[axis] {
                    return None;
                }
                continue;
            }
            let t0 = (self.min[axis] - o) / d;
            let t1 = (self.max[axis] - o) / d;
            let (near, far, sign) = if t0 < t1 { (t0, t1, -1.0) } else { (t1, t0, 1.0) };
            if near > t_enter {
                t_enter = near;
                normal = Vec3::ZERO;
                normal[axis] = sign;
            }
            t_exit = t_exit.min(far);
        }
        (t_enter <= t_exit && t_exit > 0.0).then_some((t_enter, normal))
    }
}

/// A ray hit: distance along the ray, unshaded albedo and surface normal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneHit {
    pub t: f32,
    pub position: Vec3,
    pub normal: Vec3,
    /// `None` for the checkered floor.
    pub color: Option<[f32; 3]>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DemoScene {
    /// Floor spans `[-half_width, half_width]` in x and `floor_z` in z.
    pub floor_half_width: f32,
    pub floor_z: (f32, f32),
    pub boxes: Vec<SceneBox>,
    /// Direction the light travels.
    pub light_dir: Vec3,
    pub ambient: f32,
    pub checker_size: f32,
}

impl Default for DemoScene {
    fn default() -> Self {
        let boxes = vec![
            SceneBox::cube(-3.0, -15.0, 2.0, [0.9, 0.3, 0.2]),
            SceneBox::cube(3.0, -8.0, 2.0, [0.9, 0.7, 0.1]),
            // At the default focus distance.
            SceneBox::cube(0.0, 0.0, 2.0, [0.2, 0.8, 0.3]),
            SceneBox::cube(-4.0, 10.0, 2.0, [0.2, 0.5, 0.9]),
            SceneBox::cube(4.0, 25.0, 3.0, [0.7, 0.3, 0.8]),
            SceneBox::cube(-6.0, 50.0, 4.0, [0.9, 0.5, 0.3]),
            SceneBox::cube(7.0, 90.0, 6.0, [0.3, 0.8, 0.8]),
            SceneBox::cube(-10.0, 160.0, 10.0, [0.8, 0.8, 0.3]),
        ];
        Self {
            floor_half_width: 100.0,
            floor_z: (-40.0, 400.0),
            boxes,
            light_dir: Vec3::new(0.3, -1.0, 0.5).normalize(),
            ambient: 0.25,
            checker_size: 2.0,
        }
    }
}

impl DemoScene {
    /// Scene uniforms for the given camera matrices.
    pub fn uniforms(&self, view: Mat4, projection: Mat4) -> SceneUniforms {
        SceneUniforms {
            view: view.to_cols_array_2d(),
            projection: projection.to_cols_array_2d(),
            light_dir: self.light_dir.extend(0.0).to_array(),
            ambient: self.ambient,
            checker_size: self.checker_size,
            _pad1: 0.0,
            _pad2: 0.0,
        }
    }

    /// Triangle list for the scene pass. Floor vertices carry alpha 0.
    pub fn mesh(&self) -> (Vec<SceneVertex>, Vec<u32>) {
        let mut vertices = Vec::with_capacity(4 + self.boxes.len() * 24);
        let mut indices = Vec::with_capacity(6 + self.boxes.len() * 36);

        let (z0, z1) = self.floor_z;
        let w = self.floor_half_width;
        push_quad(
            &mut vertices,
            &mut indices,
            [
                Vec3::new(-w, 0.0, z0),
                Vec3::new(w, 0.0, z0),
                Vec3::new(w, 0.0, z1),
                Vec3::new(-w, 0.0, z1),
            ],
            Vec3::Y,
            [1.0, 1.0, 1.0, 0.0],
        );

        for b in &self.boxes {
            let color = [b.color[0], b.color[1], b.color[2], 1.0];
            let (lo, hi) = (b.min, b.max);
            let corner = |x: bool, y: bool, z: bool| {
                Vec3::new(
                    if x { hi.x } else { lo.x },
                    if y { hi.y } else { lo.y },
                    if z { hi.z } else { lo.z },
                )
            };
            let faces = [
                (Vec3::NEG_Z, [(false, false, false), (true, false, false), (true, true, false), (false, true, false)]),
                (Vec3::Z, [(true, false, true), (false, false, true), (false, true, true), (true, true, true)]),
                (Vec3::NEG_X, [(false, false, true), (false, false, false), (false, true, false), (false, true, true)]),
                (Vec3::X, [(true, false, false), (true, false, true), (true, true, true), (true, true, false)]),
                (Vec3::Y, [(false, true, false), (true, true, false), (true, true, true), (false, true, true)]),
                (Vec3::NEG_Y, [(false, false, true), (true, false, true), (true, false, false), (false, false, false)]),
            ];
            for (normal, c) in faces {
                let quad = c.map(|(x, y, z)| corner(x, y, z));
                push_quad(&mut vertices, &mut indices, quad, normal, color);
            }
        }
        (vertices, indices)
    }

    /// Nearest hit with `t` in `[t_min, t_max]`.
    pub fn trace(&self, origin: Vec3, dir: Vec3, t_min: f32, t_max: f32) -> Option<SceneHit> {
        let mut best: Option<SceneHit> = None;
        let mut consider = |t: f32, normal: Vec3, color: Option<[f32; 3]>| {
            if t < t_min || t > t_max || best.is_some_and(|b| b.t <= t) {
                return;
            }
            best = Some(SceneHit {
                t,
                position: origin + dir * t,
                normal,
                color,
            });
        };

        if dir.y.abs() > 1e-8 {
            let t = -origin.y / dir.y;
            let p = origin + dir * t;
            if p.x.abs() <= self.floor_half_width && p.z >= self.floor_z.0 && p.z <= self.floor_z.1 {
                consider(t, Vec3::Y, None);
            }
        }
        for b in &self.boxes {
            if let Some((t, normal)) = b.intersect(origin, dir) {
                consider(t, normal, Some(b.color));
            }
        }
        best
    }
}

fn push_quad(
    vertices: &mut Vec<SceneVertex>,
    indices: &mut Vec<u32>,
    corners: [Vec3; 4],
    normal: Vec3,
    color: [f32; 4],
) {
    let base = vertices.len() as u32;
    for p in corners {
        vertices.push(SceneVertex {
            position: p.to_array(),
            normal: normal.to_array(),
            color,
        });
    }
    indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
}

/// Floor albedo; mirrors `checker` in `scene.wgsl`.
pub fn checker(uniforms: &SceneUniforms, p: Vec3) -> [f32; 3] {
    let size = uniforms.checker_size;
    let tile = (p.x / size).floor() as i32 + (p.z / size).floor() as i32;
    if tile & 1 == 0 {
        [0.8, 0.8, 0.8]
    } else {
        [0.25, 0.25, 0.25]
    }
}

/// Ambient plus Lambert; mirrors `fs_main` in `scene.wgsl`.
pub fn shade(uniforms: &SceneUniforms, hit: &SceneHit) -> [f32; 4] {
    let base = hit.color.unwrap_or_else(|| checker(uniforms, hit.position));
    let light = Vec4::from_array(uniforms.light_dir).truncate();
    let lambert = hit.normal.normalize().dot(-light).max(0.0);
    let s = uniforms.ambient + (1.0 - uniforms.ambient) * lambert;
    [base[0] * s, base[1] * s, base[2] * s, 1.0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mesh_has_floor_and_six_faces_per_box() {
        let scene = DemoScene::default();
        let (vertices, indices) = scene.mesh();
        assert_eq!(vertices.len(), 4 + scene.boxes.len() * 24);
        assert_eq!(indices.len(), 6 + scene.boxes.len() * 36);
        assert!(indices.iter().all(|&i| (i as usize) < vertices.len()));
        assert_eq!(vertices[0].color[3], 0.0);
        assert_eq!(vertices[4].color[3], 1.0);
    }

    #[test]
    fn ray_down_hits_floor() {
        let scene = DemoScene::default();
        let hit = scene
            .trace(Vec3::new(20.0, 5.0, 30.0), Vec3::NEG_Y, 0.0, 100.0)
            .expect("floor hit");
        assert!((hit.t - 5.0).abs() < 1e-5);
        assert_eq!(hit.normal, Vec3::Y);
        assert!(hit.color.is_none());
    }

    #[test]
    fn box_occludes_floor() {
        let scene = DemoScene::default();
        let hit = scene
            .trace(Vec3::new(0.0, 1.0, -25.0), Vec3::Z, 0.1, 1000.0)
            .expect("box hit");
        // First box on the center line is the one at the origin.
        assert!((hit.t - 24.0).abs() < 1e-4);
        assert_eq!(hit.normal, Vec3::NEG_Z);
        assert_eq!(hit.color, Some([0.2, 0.8, 0.3]));
    }

    #[test]
    fn ray_into_the_sky_misses() {
        let scene = DemoScene::default();
        assert!(scene
            .trace(Vec3::new(0.0, 1.0, -25.0), Vec3::new(0.0, 1.0, 1.0).normalize(), 0.1, 1000.0)
            .is_none());
    }

    #[test]
    fn shading_is_ambient_in_shadowed_faces() {
        let scene = DemoScene::default();
        let uniforms = scene.uniforms(Mat4::IDENTITY, Mat4::IDENTITY);
        let hit = SceneHit {
            t: 1.0,
            position: Vec3::ZERO,
            normal: Vec3::NEG_Y,
            color: Some([1.0, 1.0, 1.0]),
        };
        assert_eq!(shade(&uniforms, &hit), [0.25, 0.25, 0.25, 1.0]);
    }

    #[test]
    fn checker_alternates_per_tile() {
        let uniforms = DemoScene::default().uniforms(Mat4::IDENTITY, Mat4::IDENTITY);
        assert_eq!(checker(&uniforms, Vec3::new(0.5, 0.0, 0.5)), [0.8, 0.8, 0.8]);
        assert_eq!(checker(&uniforms, Vec3::new(2.5, 0.0, 0.5)), [0.25, 0.25, 0.25]);
        assert_eq!(checker(&uniforms, Vec3::new(-0.5, 0.0, 0.5)), [0.25, 0.25, 0.25]);
    }
}
