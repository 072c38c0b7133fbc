//! The black hole effect.
//!
//! Setup happens once through [`BlackHoleDescriptor::initialize`]: capture the
//! surroundings, bind every material slot, and create the proxy sphere entity.
//! After that the host calls [`BlackHole::update`] once per frame.

use std::sync::Arc;

use glam::Vec3;
use rand::Rng;

use crate::capture::{capture_environment, CaptureBackend, EnvironmentMap};
use crate::config::EffectConfig;
use crate::error::EffectError;
use crate::material::{black_hole_material, BlackHoleParams, BoundMaterial, Material, ShaderProgram};
use crate::mesh_asset::MeshAsset;
use crate::scene_graph::{EntityId, SceneGraph, Surface, Transform};
use crate::texture::Texture2d;

/// Ray-march bounds per unit of event horizon plus disk size.
///
/// Carried over as a tuning convention; it is not derived from any physical
/// quantity.
pub const BOUNDS_SCALE: f32 = 10.0;

/// Proxy sphere scale per unit of bounds radius.
///
/// Independent of [`BOUNDS_SCALE`]: the sphere only has to be large enough to
/// cover the lensed region from every viewpoint.
pub const RENDER_SCALE: f32 = 100.0;

/// Radius of the ray-marched region: `(event_horizon + disk_size) * 10`.
pub fn bounds_radius(event_horizon: f32, accretion_disk_size: f32) -> f32 {
    (event_horizon + accretion_disk_size) * BOUNDS_SCALE
}

/// Uniform scale of the proxy sphere: `radius * 100`.
pub fn render_scale(radius: f32) -> f32 {
    radius * RENDER_SCALE
}

/// Random tilt in degrees: X and Z uniform in `[-|max|, |max|]`, Y zero.
pub fn random_tilt<R: Rng + ?Sized>(rng: &mut R, max_degrees: f32) -> Vec3 {
    let max = max_degrees.abs();
    if max == 0.0 {
        return Vec3::ZERO;
    }
    let x = rng.gen_range(-max..=max);
    let z = rng.gen_range(-max..=max);
    Vec3::new(x, 0.0, z)
}

/// Shared assets an effect draws with. Any number of effects may hold the
/// same `Arc`s.
#[derive(Debug, Clone, Default)]
pub struct EffectAssets {
    pub shader: Option<Arc<ShaderProgram>>,
    pub mesh: Option<Arc<MeshAsset>>,
    pub noise: Option<Arc<Texture2d>>,
}

impl EffectAssets {
    pub fn new(shader: Arc<ShaderProgram>, mesh: Arc<MeshAsset>, noise: Arc<Texture2d>) -> Self {
        Self {
            shader: Some(shader),
            mesh: Some(mesh),
            noise: Some(noise),
        }
    }

    /// Built-in shader, a subdivided icosphere and generated disk noise.
    pub fn builtin(noise_seed: u64) -> Self {
        Self::new(
            Arc::new(ShaderProgram::black_hole()),
            Arc::new(MeshAsset::icosphere(3)),
            Arc::new(Texture2d::value_noise(256, 5, noise_seed)),
        )
    }
}

/// Everything needed to create a black hole.
#[derive(Debug, Clone, Default)]
pub struct BlackHoleDescriptor {
    pub config: EffectConfig,
    pub assets: EffectAssets,
}

impl BlackHoleDescriptor {
    pub fn new(config: EffectConfig, assets: EffectAssets) -> Self {
        Self { config, assets }
    }

    /// Capture the environment at `placement`, bind the material and add the
    /// effect's proxy sphere to `scene`.
    ///
    /// Fails without touching the scene when an asset is missing or the
    /// config is invalid.
    pub fn initialize<B, R>(
        self,
        scene: &mut SceneGraph,
        backend: &mut B,
        rng: &mut R,
        placement: Transform,
    ) -> Result<BlackHole, EffectError>
    where
        B: CaptureBackend + ?Sized,
        R: Rng + ?Sized,
    {
        let BlackHoleDescriptor { config, assets } = self;
        let shader = assets.shader.ok_or(EffectError::MissingShader)?;
        let mesh = assets.mesh.ok_or(EffectError::MissingMesh)?;
        let noise = assets.noise.ok_or(EffectError::MissingNoiseTexture)?;
        config.validate()?;

        let environment = Arc::new(capture_environment(
            scene,
            backend,
            &placement,
            &config.capture,
            config.lensing_resolution,
        )?);

        let radius = bounds_radius(config.event_horizon, config.accretion_disk_size);
        let material = Arc::new(black_hole_material());
        let params = bind_params(&config, &material, radius, placement.position);
        let bound = BoundMaterial::new(material, shader, params, environment, noise);

        let tilt = random_tilt(rng, config.max_rotation);
        let entity = scene.create_mesh(mesh, Surface::Effect);
        if let Some(instance) = scene.mesh_mut(entity) {
            instance.transform.position = placement.position;
            instance.transform.scale = Vec3::splat(render_scale(radius));
            instance.transform.set_rotation_degrees(tilt);
        }
        scene.add_to_scene(entity);

        log::info!(
            "Black hole {:?} at {:?}: radius {}, tilt ({:.2}, {:.2}), {}px environment",
            entity,
            placement.position,
            radius,
            tilt.x,
            tilt.z,
            config.lensing_resolution
        );

        Ok(BlackHole {
            entity,
            radius,
            tilt,
            material: bound,
        })
    }
}

fn bind_params(config: &EffectConfig, material: &Material, radius: f32, position: Vec3) -> BlackHoleParams {
    let disk_power = material.clamp_param("disk_power", config.accretion_disk_power);
    if disk_power != config.accretion_disk_power {
        log::warn!(
            "accretion_disk_power {} out of range, using {}",
            config.accretion_disk_power,
            disk_power
        );
    }

    BlackHoleParams {
        render_enabled: config.render_black_hole,
        disk_enabled: config.has_accretion_disk,
        disk_doppler: config.enable_doppler_effect,
        disk_speed: config.accretion_disk_speed,
        disk_size: config.accretion_disk_size,
        disk_gap: config.accretion_disk_gap,
        disk_detail: config.accretion_disk_detail,
        disk_power,
        disk_color: config.accretion_disk_color,
        gravity: config.gravity,
        bounds_radius: radius,
        marching_steps: config.marching_steps,
        world_position: position,
    }
}

/// An initialized black hole.
#[derive(Debug)]
pub struct BlackHole {
    entity: EntityId,
    radius: f32,
    tilt: Vec3,
    material: BoundMaterial,
}

impl BlackHole {
    /// Per-frame update: write the current world position into the material.
    pub fn update(&mut self, position: Vec3) {
        self.material.set_world_position(position);
    }

    /// Forward the proxy entity's current position. Does nothing once the
    /// entity has been destroyed.
    pub fn update_from_scene(&mut self, scene: &SceneGraph) {
        if let Some(entity) = scene.get(self.entity) {
            self.update(entity.transform().position);
        }
    }

    /// The proxy sphere entity.
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn material(&self) -> &BoundMaterial {
        &self.material
    }

    pub fn environment(&self) -> &Arc<EnvironmentMap> {
        self.material.skybox()
    }

    /// Bounds radius bound to the material.
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Tilt applied at setup, Euler degrees.
    pub fn tilt_degrees(&self) -> Vec3 {
        self.tilt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_bounds_radius_arithmetic() {
        assert_eq!(bounds_radius(1.0, 5.0), 60.0);
        assert_eq!(bounds_radius(0.0, 0.0), 0.0);
        assert_eq!(bounds_radius(1e6, 1e6), 2e7);
        assert_eq!(render_scale(bounds_radius(1.0, 5.0)), 6000.0);
        assert_eq!(render_scale(0.0), 0.0);
    }

    #[test]
    fn test_tilt_within_bounds() {
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..1000 {
            let tilt = random_tilt(&mut rng, 10.0);
            assert!((-10.0..=10.0).contains(&tilt.x));
            assert!((-10.0..=10.0).contains(&tilt.z));
            assert_eq!(tilt.y, 0.0);
        }
    }

    #[test]
    fn test_tilt_zero_max_is_exact() {
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(random_tilt(&mut rng, 0.0), Vec3::ZERO);
    }

    #[test]
    fn test_tilt_negative_max_uses_magnitude() {
        let mut rng = StdRng::seed_from_u64(5);
        for _ in 0..100 {
            let tilt = random_tilt(&mut rng, -4.0);
            assert!((-4.0..=4.0).contains(&tilt.x));
            assert!((-4.0..=4.0).contains(&tilt.z));
        }
    }

    #[test]
    fn test_tilt_is_deterministic_per_seed() {
        let a = random_tilt(&mut StdRng::seed_from_u64(42), 10.0);
        let b = random_tilt(&mut StdRng::seed_from_u64(42), 10.0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_bind_params_clamps_disk_power() {
        let material = black_hole_material();
        for (input, expected) in [(-5.0, 0.0), (0.0, 0.0), (1.0, 1.0), (2.0, 2.0), (7.0, 2.0)] {
            let config = EffectConfig {
                accretion_disk_power: input,
                ..Default::default()
            };
            let params = bind_params(&config, &material, 60.0, Vec3::ZERO);
            assert_eq!(params.disk_power, expected, "input {}", input);
        }
    }

    #[test]
    fn test_bind_params_copies_config() {
        let config = EffectConfig {
            accretion_disk_color: [0.2, 0.4, 0.6, 0.8],
            marching_steps: 64,
            gravity: 3.5,
            ..Default::default()
        };
        let params = bind_params(&config, &black_hole_material(), 12.0, Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(params.disk_color, [0.2, 0.4, 0.6, 0.8]);
        assert_eq!(params.marching_steps, 64);
        assert_eq!(params.gravity, 3.5);
        assert_eq!(params.bounds_radius, 12.0);
        assert_eq!(params.world_position, Vec3::new(1.0, 2.0, 3.0));
    }
}
