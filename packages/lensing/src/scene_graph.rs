//! Scene graph hosting plain meshes, effect meshes and capture probes.
//!
//! Entities are created detached; only entities added to the scene are
//! rendered or captured.

use std::collections::HashMap;
use std::sync::Arc;

use glam::{EulerRot, Mat4, Quat, Vec3};

use crate::camera::CaptureCamera;
use crate::mesh_asset::MeshAsset;

/// Unique identifier for scene entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(pub u64);

/// Transform component for scene entities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3, // Euler angles in radians
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Vec3::ZERO,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn orientation(&self) -> Quat {
        Quat::from_euler(EulerRot::XYZ, self.rotation.x, self.rotation.y, self.rotation.z)
    }

    /// Model = Translation * Rotation * Scale
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.orientation(), self.position)
    }

    /// Set the rotation from Euler angles in degrees.
    pub fn set_rotation_degrees(&mut self, degrees: Vec3) {
        self.rotation = Vec3::new(degrees.x.to_radians(), degrees.y.to_radians(), degrees.z.to_radians());
    }

    pub fn rotation_degrees(&self) -> Vec3 {
        Vec3::new(self.rotation.x.to_degrees(), self.rotation.y.to_degrees(), self.rotation.z.to_degrees())
    }
}

/// How a mesh entity is shaded.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Surface {
    /// Flat lit color, drawn by the scene pass and visible to captures.
    Color([f32; 4]),
    /// Drawn by an effect material. Never part of an environment capture.
    Effect,
}

/// A mesh instance - references shared geometry with its own transform.
#[derive(Debug, Clone)]
pub struct MeshInstance {
    pub mesh: Arc<MeshAsset>,
    pub surface: Surface,
    pub transform: Transform,
    pub visible: bool,
}

impl MeshInstance {
    pub fn new(mesh: Arc<MeshAsset>, surface: Surface) -> Self {
        Self {
            mesh,
            surface,
            transform: Transform::default(),
            visible: true,
        }
    }

    /// World-space bounding sphere (center, radius).
    pub fn world_bounds(&self) -> (Vec3, f32) {
        let center = self.transform.matrix().transform_point3(self.mesh.bounds.center());
        let max_scale = self.transform.scale.abs().max_element();
        (center, self.mesh.bounds.radius() * max_scale)
    }
}

/// A temporary viewpoint used to render the scene into a cubemap.
#[derive(Debug, Clone)]
pub struct CaptureProbe {
    pub camera: CaptureCamera,
    pub transform: Transform,
}

/// A scene entity.
#[derive(Debug, Clone)]
pub enum SceneEntity {
    Mesh(MeshInstance),
    Probe(CaptureProbe),
}

impl SceneEntity {
    pub fn transform(&self) -> &Transform {
        match self {
            SceneEntity::Mesh(m) => &m.transform,
            SceneEntity::Probe(p) => &p.transform,
        }
    }

    pub fn transform_mut(&mut self) -> &mut Transform {
        match self {
            SceneEntity::Mesh(m) => &mut m.transform,
            SceneEntity::Probe(p) => &mut p.transform,
        }
    }
}

/// The scene graph - owns every entity of the scene.
#[derive(Debug)]
pub struct SceneGraph {
    entities: HashMap<EntityId, SceneEntity>,
    /// Entities that have been added to the scene (will be rendered).
    scene_entities: Vec<EntityId>,
    next_id: u64,
    /// Linear RGBA background written wherever no geometry is hit.
    pub clear_color: [f32; 4],
}

impl SceneGraph {
    pub fn new() -> Self {
        Self {
            entities: HashMap::new(),
            scene_entities: Vec::new(),
            next_id: 1,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }

    fn new_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Create a new mesh instance and return its ID.
    /// The mesh is NOT added to the scene automatically.
    pub fn create_mesh(&mut self, mesh: Arc<MeshAsset>, surface: Surface) -> EntityId {
        let id = self.new_id();
        self.entities.insert(id, SceneEntity::Mesh(MeshInstance::new(mesh, surface)));
        id
    }

    /// Create a capture probe. Probes are never rendered.
    pub fn create_probe(&mut self, camera: CaptureCamera, transform: Transform) -> EntityId {
        let id = self.new_id();
        self.entities.insert(id, SceneEntity::Probe(CaptureProbe { camera, transform }));
        id
    }

    /// Add an entity to the scene (make it renderable).
    /// Returns true if the entity was added, false if already in scene or doesn't exist.
    pub fn add_to_scene(&mut self, id: EntityId) -> bool {
        if !self.entities.contains_key(&id) || self.scene_entities.contains(&id) {
            return false;
        }
        self.scene_entities.push(id);
        true
    }

    /// Remove an entity from the scene (stop rendering it).
    /// The entity still exists and can be re-added.
    pub fn remove_from_scene(&mut self, id: EntityId) -> bool {
        if let Some(pos) = self.scene_entities.iter().position(|&e| e == id) {
            self.scene_entities.remove(pos);
            true
        } else {
            false
        }
    }

    /// Destroy an entity completely (removes from scene and deletes).
    pub fn destroy(&mut self, id: EntityId) -> bool {
        self.remove_from_scene(id);
        self.entities.remove(&id).is_some()
    }

    pub fn get(&self, id: EntityId) -> Option<&SceneEntity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut SceneEntity> {
        self.entities.get_mut(&id)
    }

    pub fn probe(&self, id: EntityId) -> Option<&CaptureProbe> {
        match self.entities.get(&id) {
            Some(SceneEntity::Probe(probe)) => Some(probe),
            _ => None,
        }
    }

    pub fn mesh(&self, id: EntityId) -> Option<&MeshInstance> {
        match self.entities.get(&id) {
            Some(SceneEntity::Mesh(mesh)) => Some(mesh),
            _ => None,
        }
    }

    pub fn mesh_mut(&mut self, id: EntityId) -> Option<&mut MeshInstance> {
        match self.entities.get_mut(&id) {
            Some(SceneEntity::Mesh(mesh)) => Some(mesh),
            _ => None,
        }
    }

    /// Visible mesh instances in the scene, in insertion order.
    pub fn meshes(&self) -> impl Iterator<Item = (EntityId, &MeshInstance)> {
        self.scene_entities.iter().filter_map(|&id| match self.entities.get(&id) {
            Some(SceneEntity::Mesh(mesh)) if mesh.visible => Some((id, mesh)),
            _ => None,
        })
    }

    /// Visible meshes with a plain color surface, the set seen by captures.
    pub fn color_meshes(&self) -> impl Iterator<Item = (EntityId, &MeshInstance, [f32; 4])> {
        self.meshes().filter_map(|(id, mesh)| match mesh.surface {
            Surface::Color(color) => Some((id, mesh, color)),
            Surface::Effect => None,
        })
    }

    /// Number of entities, in the scene or not.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn exists(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn is_in_scene(&self, id: EntityId) -> bool {
        self.scene_entities.contains(&id)
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cube() -> Arc<MeshAsset> {
        Arc::new(MeshAsset::cube())
    }

    #[test]
    fn test_create_mesh() {
        let mut scene = SceneGraph::new();
        let id = scene.create_mesh(cube(), Surface::Color([1.0, 0.0, 0.0, 1.0]));

        assert!(scene.exists(id));
        assert!(!scene.is_in_scene(id));

        let mesh = scene.mesh(id).expect("Expected mesh entity");
        assert_eq!(mesh.mesh.id, "cube");
        assert!(mesh.visible);
    }

    #[test]
    fn test_add_to_scene() {
        let mut scene = SceneGraph::new();
        let id = scene.create_mesh(cube(), Surface::Effect);

        assert!(scene.add_to_scene(id));
        assert!(scene.is_in_scene(id));

        // Adding again should return false
        assert!(!scene.add_to_scene(id));
    }

    #[test]
    fn test_remove_from_scene() {
        let mut scene = SceneGraph::new();
        let id = scene.create_mesh(cube(), Surface::Effect);

        scene.add_to_scene(id);
        assert!(scene.remove_from_scene(id));
        assert!(!scene.is_in_scene(id));
        assert!(scene.exists(id)); // Still exists, just not in scene
    }

    #[test]
    fn test_destroy() {
        let mut scene = SceneGraph::new();
        let id = scene.create_mesh(cube(), Surface::Effect);
        scene.add_to_scene(id);

        assert!(scene.destroy(id));
        assert!(!scene.exists(id));
        assert!(!scene.is_in_scene(id));
        assert!(!scene.destroy(id));
    }

    #[test]
    fn test_ids_are_not_reused() {
        let mut scene = SceneGraph::new();
        let a = scene.create_probe(CaptureCamera::default(), Transform::default());
        scene.destroy(a);
        let b = scene.create_probe(CaptureCamera::default(), Transform::default());
        assert_ne!(a, b);
        assert_eq!(scene.len(), 1);
    }

    #[test]
    fn test_entity_transforms_by_id() {
        let mut scene = SceneGraph::new();
        let probe = scene.create_probe(CaptureCamera::default(), Transform::from_position(Vec3::X));
        let mesh = scene.create_mesh(cube(), Surface::Effect);

        scene.get_mut(mesh).unwrap().transform_mut().position = Vec3::new(0.0, 3.0, 0.0);
        assert_eq!(scene.get(probe).unwrap().transform().position, Vec3::X);
        assert_eq!(scene.mesh(mesh).unwrap().transform.position, Vec3::new(0.0, 3.0, 0.0));

        scene.destroy(probe);
        assert!(scene.get(probe).is_none());
        assert!(scene.get_mut(probe).is_none());
    }

    #[test]
    fn test_color_meshes_skip_effects_and_hidden() {
        let mut scene = SceneGraph::new();
        let shared = cube();
        let red = scene.create_mesh(shared.clone(), Surface::Color([1.0, 0.0, 0.0, 1.0]));
        let effect = scene.create_mesh(shared.clone(), Surface::Effect);
        let hidden = scene.create_mesh(shared, Surface::Color([0.0, 1.0, 0.0, 1.0]));
        for id in [red, effect, hidden] {
            scene.add_to_scene(id);
        }
        scene.mesh_mut(hidden).unwrap().visible = false;

        let ids: Vec<_> = scene.color_meshes().map(|(id, _, _)| id).collect();
        assert_eq!(ids, vec![red]);
        assert_eq!(scene.meshes().count(), 2);
    }

    #[test]
    fn test_transform_matrix_order() {
        let mut transform = Transform::from_position(Vec3::new(1.0, 2.0, 3.0));
        transform.scale = Vec3::splat(2.0);
        transform.set_rotation_degrees(Vec3::new(0.0, 90.0, 0.0));

        // Scale, then rotate +X onto -Z, then translate.
        let p = transform.matrix().transform_point3(Vec3::X);
        assert!((p - Vec3::new(1.0, 2.0, 1.0)).length() < 1e-5);
        assert!((transform.rotation_degrees().y - 90.0).abs() < 1e-4);
    }

    #[test]
    fn test_world_bounds_follow_scale() {
        let mut instance = MeshInstance::new(cube(), Surface::Effect);
        instance.transform.position = Vec3::new(0.0, 5.0, 0.0);
        instance.transform.scale = Vec3::splat(4.0);
        let (center, radius) = instance.world_bounds();
        assert_eq!(center, Vec3::new(0.0, 5.0, 0.0));
        assert!((radius - 3.0f32.sqrt() * 2.0).abs() < 1e-5);
    }
}
