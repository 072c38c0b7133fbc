//! View cameras and cube-face capture cameras.
//!
//! `Camera` is the look-at camera used for the main view. `CaptureCamera`
//! describes the temporary probe used to render an environment cubemap; its
//! faces are always world-axis aligned, in the WebGPU layer order
//! +X, -X, +Y, -Y, +Z, -Z.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::config::CaptureSettings;

// ============================================================================
// View Camera
// ============================================================================

/// Look-at camera with a perspective projection.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,
    /// Vertical field of view in degrees.
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec3::new(4.0, 2.0, 4.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov: 45.0,
            near: 0.1,
            far: 10_000.0,
        }
    }
}

impl Camera {
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self, aspect: f32) -> Mat4 {
        Mat4::perspective_rh(self.fov.to_radians(), aspect, self.near, self.far)
    }

    pub fn view_projection_matrix(&self, aspect: f32) -> Mat4 {
        self.projection_matrix(aspect) * self.view_matrix()
    }

    pub fn to_uniforms(&self, aspect: f32) -> CameraUniforms {
        CameraUniforms {
            view_proj: self.view_projection_matrix(aspect).to_cols_array_2d(),
            position: self.position.extend(1.0).to_array(),
        }
    }
}

/// Evaluated camera parameters ready for GPU.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct CameraUniforms {
    pub view_proj: [[f32; 4]; 4],
    /// Camera position in world space (vec4, w unused).
    pub position: [f32; 4],
}

// ============================================================================
// Cube Faces
// ============================================================================

/// One face of a cubemap.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    /// All faces in array-layer order.
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn layer(self) -> u32 {
        self as u32
    }

    /// (forward, right, down) axes of the face.
    ///
    /// Texel (u, v) in [-1, 1] with v growing downwards looks along
    /// `forward + u * right + v * down`.
    pub fn basis(self) -> (Vec3, Vec3, Vec3) {
        match self {
            CubeFace::PositiveX => (Vec3::X, Vec3::NEG_Z, Vec3::NEG_Y),
            CubeFace::NegativeX => (Vec3::NEG_X, Vec3::Z, Vec3::NEG_Y),
            CubeFace::PositiveY => (Vec3::Y, Vec3::X, Vec3::Z),
            CubeFace::NegativeY => (Vec3::NEG_Y, Vec3::X, Vec3::NEG_Z),
            CubeFace::PositiveZ => (Vec3::Z, Vec3::X, Vec3::NEG_Y),
            CubeFace::NegativeZ => (Vec3::NEG_Z, Vec3::NEG_X, Vec3::NEG_Y),
        }
    }

    /// Normalized world direction through the centre of texel (x, y).
    pub fn texel_direction(self, x: u32, y: u32, resolution: u32) -> Vec3 {
        let u = 2.0 * (x as f32 + 0.5) / resolution as f32 - 1.0;
        let v = 2.0 * (y as f32 + 0.5) / resolution as f32 - 1.0;
        let (forward, right, down) = self.basis();
        (forward + right * u + down * v).normalize()
    }

    /// View matrix looking down this face from `eye`.
    ///
    /// Cube faces are left-handed relative to the view space used by the
    /// projection, so this matrix mirrors; face pipelines must not cull.
    pub fn view_matrix(self, eye: Vec3) -> Mat4 {
        let (forward, right, down) = self.basis();
        let up = -down;
        let back = -forward;
        let rotation = Mat4::from_cols(
            Vec4::new(right.x, up.x, back.x, 0.0),
            Vec4::new(right.y, up.y, back.y, 0.0),
            Vec4::new(right.z, up.z, back.z, 0.0),
            Vec4::W,
        );
        rotation * Mat4::from_translation(-eye)
    }
}

// ============================================================================
// Capture Camera
// ============================================================================

/// Camera parameters of a cubemap capture probe.
///
/// Every face is rendered with a square 90 degree frustum so the six faces
/// tile the full sphere.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CaptureCamera {
    pub near: f32,
    pub far: f32,
}

impl Default for CaptureCamera {
    fn default() -> Self {
        Self::from_settings(&CaptureSettings::default())
    }
}

impl CaptureCamera {
    pub const FOV_DEGREES: f32 = 90.0;

    pub fn from_settings(settings: &CaptureSettings) -> Self {
        Self {
            near: settings.near,
            far: settings.far,
        }
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(Self::FOV_DEGREES.to_radians(), 1.0, self.near, self.far)
    }

    pub fn face_view_projection(&self, face: CubeFace, eye: Vec3) -> Mat4 {
        self.projection_matrix() * face.view_matrix(eye)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_view_matrix_lookat() {
        let camera = Camera {
            position: Vec3::new(5.0, 5.0, 5.0),
            ..Default::default()
        };
        let origin_in_view = camera.view_matrix().transform_point3(Vec3::ZERO);
        assert!(origin_in_view.z < 0.0); // Origin should be in front (negative Z in view space)
    }

    #[test]
    fn test_uniform_size() {
        assert_eq!(std::mem::size_of::<CameraUniforms>(), 80);
    }

    #[test]
    fn test_face_centre_directions() {
        for face in CubeFace::ALL {
            let (forward, _, _) = face.basis();
            // A 1x1 face looks straight down its axis.
            let d = face.texel_direction(0, 0, 1);
            assert!((d - forward).length() < 1e-6, "{:?}", face);
        }
    }

    #[test]
    fn test_face_layers_are_in_order() {
        let layers: Vec<u32> = CubeFace::ALL.iter().map(|f| f.layer()).collect();
        assert_eq!(layers, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_face_projection_matches_texel_direction() {
        let settings = CaptureSettings {
            near: 0.5,
            far: 50.0,
        };
        let camera = CaptureCamera::from_settings(&settings);
        let eye = Vec3::new(1.0, -2.0, 3.0);
        let resolution = 8;
        for face in CubeFace::ALL {
            let view_proj = camera.face_view_projection(face, eye);
            for (x, y) in [(0, 0), (7, 0), (3, 5), (7, 7)] {
                let dir = face.texel_direction(x, y, resolution);
                let clip = view_proj * (eye + dir * 10.0).extend(1.0);
                let ndc = clip.truncate() / clip.w;
                // NDC y points up, texel y points down.
                let px = (ndc.x + 1.0) * 0.5 * resolution as f32;
                let py = (1.0 - ndc.y) * 0.5 * resolution as f32;
                assert!((px - (x as f32 + 0.5)).abs() < 1e-3, "{:?} x", face);
                assert!((py - (y as f32 + 0.5)).abs() < 1e-3, "{:?} y", face);
                assert!(ndc.z > 0.0 && ndc.z < 1.0);
            }
        }
    }
}
