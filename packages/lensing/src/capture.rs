//! Environment capture: render the scene around a point into an HDR cubemap.
//!
//! Capturing goes through a [`CaptureBackend`], so the same sequence runs
//! on the GPU (`gpu::capture::GpuCaptureBackend`) and on the CPU
//! ([`SoftwareCaptureBackend`]).

use glam::Vec3;

use crate::camera::{CaptureCamera, CubeFace};
use crate::config::CaptureSettings;
use crate::error::EffectError;
use crate::scene_graph::{EntityId, SceneGraph, Transform};

/// Texture format of GPU-captured environment maps.
pub const HDR_CUBEMAP_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Largest face the software backend accepts by default.
pub const DEFAULT_SOFTWARE_MAX_RESOLUTION: u32 = 4096;

/// Six square faces of linear RGBA `f32` texels.
#[derive(Debug, Clone, PartialEq)]
pub struct SoftwareCubemap {
    resolution: u32,
    faces: Vec<Vec<[f32; 4]>>,
}

impl SoftwareCubemap {
    pub fn new(resolution: u32) -> Self {
        let texels = resolution as usize * resolution as usize;
        Self {
            resolution,
            faces: vec![vec![[0.0; 4]; texels]; 6],
        }
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    /// Texels of one face, row-major.
    pub fn face(&self, face: CubeFace) -> &[[f32; 4]] {
        &self.faces[face.layer() as usize]
    }

    pub fn texel(&self, face: CubeFace, x: u32, y: u32) -> [f32; 4] {
        self.faces[face.layer() as usize][(y * self.resolution + x) as usize]
    }

    pub fn set_texel(&mut self, face: CubeFace, x: u32, y: u32, value: [f32; 4]) {
        self.faces[face.layer() as usize][(y * self.resolution + x) as usize] = value;
    }

    /// Nearest-texel lookup along a world direction.
    pub fn sample(&self, direction: Vec3) -> [f32; 4] {
        let abs = direction.abs();
        let face = if abs.x >= abs.y && abs.x >= abs.z {
            if direction.x >= 0.0 { CubeFace::PositiveX } else { CubeFace::NegativeX }
        } else if abs.y >= abs.z {
            if direction.y >= 0.0 { CubeFace::PositiveY } else { CubeFace::NegativeY }
        } else if direction.z >= 0.0 {
            CubeFace::PositiveZ
        } else {
            CubeFace::NegativeZ
        };

        let (forward, right, down) = face.basis();
        let major = direction.dot(forward);
        let u = direction.dot(right) / major;
        let v = direction.dot(down) / major;

        let res = self.resolution as f32;
        let x = (((u + 1.0) * 0.5 * res) as u32).min(self.resolution - 1);
        let y = (((v + 1.0) * 0.5 * res) as u32).min(self.resolution - 1);
        self.texel(face, x, y)
    }
}

/// Where the texels of an environment map live.
#[derive(Debug)]
pub enum CubemapStorage {
    Gpu {
        texture: wgpu::Texture,
        /// Cube view for sampling.
        view: wgpu::TextureView,
    },
    Software(SoftwareCubemap),
}

/// A captured omnidirectional radiance map.
#[derive(Debug)]
pub struct EnvironmentMap {
    resolution: u32,
    format: wgpu::TextureFormat,
    storage: CubemapStorage,
}

impl EnvironmentMap {
    pub fn new(resolution: u32, format: wgpu::TextureFormat, storage: CubemapStorage) -> Self {
        Self {
            resolution,
            format,
            storage,
        }
    }

    /// Edge length of each face in texels.
    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn storage(&self) -> &CubemapStorage {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut CubemapStorage {
        &mut self.storage
    }

    pub fn software(&self) -> Option<&SoftwareCubemap> {
        match &self.storage {
            CubemapStorage::Software(cubemap) => Some(cubemap),
            CubemapStorage::Gpu { .. } => None,
        }
    }

    pub fn gpu_view(&self) -> Option<&wgpu::TextureView> {
        match &self.storage {
            CubemapStorage::Gpu { view, .. } => Some(view),
            CubemapStorage::Software(_) => None,
        }
    }
}

/// Something that can render a scene graph into a cubemap.
pub trait CaptureBackend {
    /// Allocate an HDR cubemap with `resolution`-sized faces.
    fn allocate_cubemap(&mut self, resolution: u32) -> Result<EnvironmentMap, EffectError>;

    /// Render the scene as seen from `probe` into all six faces of `target`.
    fn render_to_cubemap(
        &mut self,
        scene: &SceneGraph,
        probe: EntityId,
        target: &mut EnvironmentMap,
    ) -> Result<(), EffectError>;
}

/// Capture the scene around `placement` into a new environment map.
///
/// A temporary probe entity exists in `scene` only for the duration of the
/// render; it is destroyed before returning, including when the render
/// fails.
pub fn capture_environment<B: CaptureBackend + ?Sized>(
    scene: &mut SceneGraph,
    backend: &mut B,
    placement: &Transform,
    settings: &CaptureSettings,
    resolution: u32,
) -> Result<EnvironmentMap, EffectError> {
    let mut target = backend.allocate_cubemap(resolution)?;

    let probe_transform = Transform {
        position: placement.position,
        rotation: placement.rotation,
        scale: glam::Vec3::ONE,
    };
    let probe = scene.create_probe(CaptureCamera::from_settings(settings), probe_transform);
    log::debug!(
        "Capturing {}x{} environment from {:?} (probe {:?})",
        resolution,
        resolution,
        placement.position,
        probe
    );

    let rendered = backend.render_to_cubemap(scene, probe, &mut target);
    scene.destroy(probe);
    rendered?;

    Ok(target)
}

/// CPU capture backend.
///
/// Ray-casts the bounding sphere of every captured mesh and shades hits
/// with a head-light term, writing the scene clear color elsewhere. Faces are
/// always a true cube regardless of the probe's field of view.
#[derive(Debug, Clone)]
pub struct SoftwareCaptureBackend {
    pub max_resolution: u32,
}

impl Default for SoftwareCaptureBackend {
    fn default() -> Self {
        Self {
            max_resolution: DEFAULT_SOFTWARE_MAX_RESOLUTION,
        }
    }
}

impl SoftwareCaptureBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CaptureBackend for SoftwareCaptureBackend {
    fn allocate_cubemap(&mut self, resolution: u32) -> Result<EnvironmentMap, EffectError> {
        if resolution == 0 || resolution > self.max_resolution {
            return Err(EffectError::CubemapAllocation {
                resolution,
                reason: format!("face size must be in 1..={}", self.max_resolution),
            });
        }
        Ok(EnvironmentMap::new(
            resolution,
            wgpu::TextureFormat::Rgba32Float,
            CubemapStorage::Software(SoftwareCubemap::new(resolution)),
        ))
    }

    fn render_to_cubemap(
        &mut self,
        scene: &SceneGraph,
        probe: EntityId,
        target: &mut EnvironmentMap,
    ) -> Result<(), EffectError> {
        let probe = scene
            .probe(probe)
            .ok_or_else(|| EffectError::Capture(format!("probe {:?} is not in the scene graph", probe)))?;
        let origin = probe.transform.position;
        let (near, far) = (probe.camera.near, probe.camera.far);

        let spheres: Vec<(Vec3, f32, [f32; 4])> = scene
            .color_meshes()
            .map(|(_, mesh, color)| {
                let (center, radius) = mesh.world_bounds();
                (center, radius, color)
            })
            .collect();

        let cubemap = match target.storage_mut() {
            CubemapStorage::Software(cubemap) => cubemap,
            CubemapStorage::Gpu { .. } => {
                return Err(EffectError::Capture("software backend cannot render into a GPU cubemap".to_string()));
            }
        };

        let resolution = cubemap.resolution();
        for face in CubeFace::ALL {
            for y in 0..resolution {
                for x in 0..resolution {
                    let dir = face.texel_direction(x, y, resolution);
                    let texel = trace(origin, dir, near, far, &spheres).unwrap_or(scene.clear_color);
                    cubemap.set_texel(face, x, y, texel);
                }
            }
        }
        Ok(())
    }
}

/// Nearest sphere hit along the ray within [near, far].
fn trace(origin: Vec3, dir: Vec3, near: f32, far: f32, spheres: &[(Vec3, f32, [f32; 4])]) -> Option<[f32; 4]> {
    let mut nearest: Option<(f32, Vec3, f32, [f32; 4])> = None;

    for &(center, radius, color) in spheres {
        let oc = origin - center;
        let b = oc.dot(dir);
        let c = oc.length_squared() - radius * radius;
        let disc = b * b - c;
        if disc < 0.0 {
            continue;
        }
        let sqrt_disc = disc.sqrt();
        // Prefer the entry point; fall back to the exit point when inside.
        let t = [-b - sqrt_disc, -b + sqrt_disc]
            .into_iter()
            .find(|t| *t >= near && *t <= far);
        if let Some(t) = t {
            if nearest.map_or(true, |(best, ..)| t < best) {
                nearest = Some((t, center, radius, color));
            }
        }
    }

    nearest.map(|(t, center, radius, color)| {
        let normal = ((origin + dir * t) - center) / radius;
        let light = 0.25 + 0.75 * normal.dot(-dir).abs();
        [color[0] * light, color[1] * light, color[2] * light, color[3]]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh_asset::MeshAsset;
    use crate::scene_graph::Surface;
    use std::sync::Arc;

    fn scene_with_sphere(position: Vec3, surface: Surface) -> SceneGraph {
        let mut scene = SceneGraph::new();
        scene.clear_color = [0.0, 0.0, 0.1, 1.0];
        let id = scene.create_mesh(Arc::new(MeshAsset::icosphere(1)), surface);
        let mesh = scene.mesh_mut(id).unwrap();
        mesh.transform.position = position;
        mesh.transform.scale = Vec3::splat(4.0);
        scene.add_to_scene(id);
        scene
    }

    #[test]
    fn test_capture_has_requested_resolution() {
        let mut scene = SceneGraph::new();
        let mut backend = SoftwareCaptureBackend::new();
        let map = capture_environment(&mut scene, &mut backend, &Transform::default(), &CaptureSettings::default(), 16)
            .unwrap();

        assert_eq!(map.resolution(), 16);
        let cubemap = map.software().unwrap();
        for face in CubeFace::ALL {
            assert_eq!(cubemap.face(face).len(), 16 * 16);
        }
    }

    #[test]
    fn test_capture_removes_probe() {
        let mut scene = scene_with_sphere(Vec3::new(10.0, 0.0, 0.0), Surface::Color([1.0, 0.0, 0.0, 1.0]));
        let before = scene.len();
        let mut backend = SoftwareCaptureBackend::new();
        capture_environment(&mut scene, &mut backend, &Transform::default(), &CaptureSettings::default(), 4).unwrap();
        assert_eq!(scene.len(), before);
    }

    #[test]
    fn test_capture_sees_mesh_on_matching_face() {
        let red = [1.0, 0.0, 0.0, 1.0];
        let mut scene = scene_with_sphere(Vec3::new(10.0, 0.0, 0.0), Surface::Color(red));
        let mut backend = SoftwareCaptureBackend::new();
        // Odd resolution so the centre texel looks straight down +X.
        let map = capture_environment(&mut scene, &mut backend, &Transform::default(), &CaptureSettings::default(), 9)
            .unwrap();
        let cubemap = map.software().unwrap();

        let hit = cubemap.sample(Vec3::X);
        assert!(hit[0] > 0.99 && hit[1] == 0.0 && hit[2] == 0.0, "{:?}", hit);
        // Off-axis texels still hit the sphere, with dimmer head-light shading.
        let corner = cubemap.texel(CubeFace::PositiveX, 3, 3);
        assert!(corner[0] > 0.25 && corner[0] < hit[0], "{:?}", corner);
        assert_eq!(cubemap.sample(Vec3::NEG_X), scene.clear_color);
        assert_eq!(cubemap.sample(Vec3::Y), scene.clear_color);
    }

    #[test]
    fn test_capture_ignores_effect_surfaces() {
        let mut scene = scene_with_sphere(Vec3::new(0.0, 0.0, 10.0), Surface::Effect);
        let mut backend = SoftwareCaptureBackend::new();
        let map = capture_environment(&mut scene, &mut backend, &Transform::default(), &CaptureSettings::default(), 8)
            .unwrap();
        assert_eq!(map.software().unwrap().sample(Vec3::Z), scene.clear_color);
    }

    #[test]
    fn test_capture_respects_far_plane() {
        let green = [0.0, 1.0, 0.0, 1.0];
        let mut scene = scene_with_sphere(Vec3::new(0.0, 50.0, 0.0), Surface::Color(green));
        let settings = CaptureSettings {
            far: 20.0,
            ..Default::default()
        };
        let mut backend = SoftwareCaptureBackend::new();
        let map = capture_environment(&mut scene, &mut backend, &Transform::default(), &settings, 8).unwrap();
        assert_eq!(map.software().unwrap().sample(Vec3::Y), scene.clear_color);
    }

    #[test]
    fn test_allocation_limits() {
        let mut backend = SoftwareCaptureBackend { max_resolution: 64 };
        assert!(matches!(
            backend.allocate_cubemap(0),
            Err(EffectError::CubemapAllocation { resolution: 0, .. })
        ));
        assert!(matches!(
            backend.allocate_cubemap(65),
            Err(EffectError::CubemapAllocation { resolution: 65, .. })
        ));
        assert!(backend.allocate_cubemap(64).is_ok());
    }

    #[test]
    fn test_allocation_failure_leaves_scene_untouched() {
        let mut scene = SceneGraph::new();
        let mut backend = SoftwareCaptureBackend { max_resolution: 8 };
        let result = capture_environment(&mut scene, &mut backend, &Transform::default(), &CaptureSettings::default(), 9);
        assert!(result.is_err());
        assert!(scene.is_empty());
    }

    struct FailingBackend {
        probe_seen: bool,
    }

    impl CaptureBackend for FailingBackend {
        fn allocate_cubemap(&mut self, resolution: u32) -> Result<EnvironmentMap, EffectError> {
            SoftwareCaptureBackend::new().allocate_cubemap(resolution)
        }

        fn render_to_cubemap(
            &mut self,
            scene: &SceneGraph,
            probe: EntityId,
            _target: &mut EnvironmentMap,
        ) -> Result<(), EffectError> {
            self.probe_seen = scene.probe(probe).is_some();
            Err(EffectError::Capture("device lost".to_string()))
        }
    }

    #[test]
    fn test_probe_destroyed_when_render_fails() {
        let mut scene = SceneGraph::new();
        let mut backend = FailingBackend { probe_seen: false };
        let placement = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
        let result = capture_environment(&mut scene, &mut backend, &placement, &CaptureSettings::default(), 4);

        assert!(matches!(result, Err(EffectError::Capture(_))));
        assert!(backend.probe_seen);
        assert!(scene.is_empty());
    }

    #[test]
    fn test_sample_picks_face_texels() {
        let mut cubemap = SoftwareCubemap::new(2);
        cubemap.set_texel(CubeFace::NegativeZ, 1, 0, [0.5, 0.5, 0.5, 1.0]);
        // -Z face: right is -X, down is -Y; texel (1, 0) is towards -X, +Y.
        assert_eq!(cubemap.sample(Vec3::new(-0.3, 0.3, -1.0)), [0.5, 0.5, 0.5, 1.0]);
        assert_eq!(cubemap.sample(Vec3::new(0.3, 0.3, -1.0)), [0.0; 4]);
    }
}
