//! Mesh assets shared between scene entities.
//!
//! Assets are immutable once built and handed around as `Arc<MeshAsset>`,
//! so any number of entities can draw the same geometry.
//!
//! ## Normal Handling
//!
//! OBJ meshes use provided normals when available. Normals are generated only
//! when missing, using area-weighted averaging of adjacent face normals.

use std::collections::HashMap;
use std::path::Path;

use crate::gpu::mesh::Vertex;

/// Axis-aligned bounding box for a mesh.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl BoundingBox {
    /// Compute bounding box from a set of vertices.
    pub fn from_vertices(vertices: &[Vertex]) -> Self {
        if vertices.is_empty() {
            return Self::default();
        }

        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];

        for v in vertices {
            for i in 0..3 {
                min[i] = min[i].min(v.position[i]);
                max[i] = max[i].max(v.position[i]);
            }
        }

        Self { min, max }
    }

    pub fn center(&self) -> glam::Vec3 {
        (glam::Vec3::from(self.min) + glam::Vec3::from(self.max)) * 0.5
    }

    /// Radius of the sphere around `center()` enclosing the box.
    pub fn radius(&self) -> f32 {
        (glam::Vec3::from(self.max) - glam::Vec3::from(self.min)).length() * 0.5
    }
}

/// Finest icosphere whose 40962 vertices still fit `u16` indices.
pub const MAX_ICOSPHERE_SUBDIVISIONS: u32 = 6;

/// Geometry ready for upload, with its bounds.
#[derive(Debug, Clone)]
pub struct MeshAsset {
    /// Unique identifier, also used to key GPU buffer caches.
    pub id: String,
    pub vertices: Vec<Vertex>,
    /// Triangle list indices.
    pub indices: Vec<u16>,
    pub bounds: BoundingBox,
}

impl MeshAsset {
    pub fn new(id: impl Into<String>, vertices: Vec<Vertex>, indices: Vec<u16>) -> Self {
        let bounds = BoundingBox::from_vertices(&vertices);
        Self {
            id: id.into(),
            vertices,
            indices,
            bounds,
        }
    }

    /// Parse a mesh asset from Wavefront OBJ content.
    ///
    /// Vertex positions and faces are required. All models in the file are
    /// merged into one mesh.
    pub fn from_obj(id: impl Into<String>, obj_content: &str) -> Result<Self, String> {
        let mut cursor = std::io::Cursor::new(obj_content.as_bytes());

        let load_options = tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        };

        let (models, _materials) = tobj::load_obj_buf(
            &mut cursor,
            &load_options,
            |_| Ok((vec![], Default::default())),
        )
        .map_err(|e| format!("Failed to parse OBJ: {}", e))?;

        if models.is_empty() {
            return Err("OBJ file contains no models".to_string());
        }

        let mut all_positions: Vec<[f32; 3]> = Vec::new();
        let mut all_normals: Vec<[f32; 3]> = Vec::new();
        let mut all_indices = Vec::new();
        let mut has_normals = true;

        for model in &models {
            let mesh = &model.mesh;
            if mesh.positions.is_empty() {
                continue;
            }

            let vertex_offset = all_positions.len();
            let vertex_count = mesh.positions.len() / 3;
            if vertex_offset + vertex_count > u16::MAX as usize {
                return Err(format!("OBJ mesh exceeds {} vertices", u16::MAX));
            }

            let model_has_normals = mesh.normals.len() == mesh.positions.len();
            has_normals &= model_has_normals;

            all_positions.extend(mesh.positions.chunks_exact(3).map(|p| [p[0], p[1], p[2]]));
            if model_has_normals {
                all_normals.extend(mesh.normals.chunks_exact(3).map(|n| [n[0], n[1], n[2]]));
            }
            all_indices.extend(mesh.indices.iter().map(|&idx| (vertex_offset + idx as usize) as u16));
        }

        if all_positions.is_empty() {
            return Err("OBJ file contains no vertices".to_string());
        }

        let normals = if has_normals && all_normals.len() == all_positions.len() {
            all_normals
        } else {
            compute_vertex_normals(&all_positions, &all_indices)
        };

        let vertices = all_positions
            .iter()
            .zip(normals.iter())
            .map(|(position, normal)| Vertex::new(*position, *normal))
            .collect();

        Ok(Self::new(id, vertices, all_indices))
    }

    /// Load an OBJ file from disk, using the file stem as the asset id.
    pub fn load_obj(path: impl AsRef<Path>) -> Result<Self, String> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mesh".to_string());
        Self::from_obj(id, &content)
    }

    /// Icosphere of radius 0.5 centred at the origin.
    ///
    /// Each subdivision splits every triangle into four; 3 subdivisions give
    /// 642 vertices and 1280 triangles. Subdivisions are capped at
    /// [`MAX_ICOSPHERE_SUBDIVISIONS`] so indices fit in `u16`.
    pub fn icosphere(subdivisions: u32) -> Self {
        let subdivisions = subdivisions.min(MAX_ICOSPHERE_SUBDIVISIONS);
        let t = (1.0 + 5.0f32.sqrt()) / 2.0;
        let mut positions: Vec<glam::Vec3> = [
            [-1.0, t, 0.0],
            [1.0, t, 0.0],
            [-1.0, -t, 0.0],
            [1.0, -t, 0.0],
            [0.0, -1.0, t],
            [0.0, 1.0, t],
            [0.0, -1.0, -t],
            [0.0, 1.0, -t],
            [t, 0.0, -1.0],
            [t, 0.0, 1.0],
            [-t, 0.0, -1.0],
            [-t, 0.0, 1.0],
        ]
        .iter()
        .map(|p| glam::Vec3::from(*p).normalize())
        .collect();

        let mut indices: Vec<u16> = vec![
            0, 11, 5, 0, 5, 1, 0, 1, 7, 0, 7, 10, 0, 10, 11,
            1, 5, 9, 5, 11, 4, 11, 10, 2, 10, 7, 6, 7, 1, 8,
            3, 9, 4, 3, 4, 2, 3, 2, 6, 3, 6, 8, 3, 8, 9,
            4, 9, 5, 2, 4, 11, 6, 2, 10, 8, 6, 7, 9, 8, 1,
        ];

        for _ in 0..subdivisions {
            let mut midpoints: HashMap<(u16, u16), u16> = HashMap::new();
            let mut next = Vec::with_capacity(indices.len() * 4);

            let mut midpoint = |a: u16, b: u16, positions: &mut Vec<glam::Vec3>| -> u16 {
                let key = if a < b { (a, b) } else { (b, a) };
                *midpoints.entry(key).or_insert_with(|| {
                    let mid = (positions[a as usize] + positions[b as usize]).normalize();
                    positions.push(mid);
                    (positions.len() - 1) as u16
                })
            };

            for tri in indices.chunks_exact(3) {
                let (a, b, c) = (tri[0], tri[1], tri[2]);
                let ab = midpoint(a, b, &mut positions);
                let bc = midpoint(b, c, &mut positions);
                let ca = midpoint(c, a, &mut positions);
                next.extend_from_slice(&[a, ab, ca, b, bc, ab, c, ca, bc, ab, bc, ca]);
            }
            indices = next;
        }

        let vertices = positions
            .iter()
            .map(|p| Vertex::new((*p * 0.5).to_array(), p.to_array()))
            .collect();

        Self::new(format!("icosphere_{}", subdivisions), vertices, indices)
    }

    /// UV sphere of radius 0.5 with 16 rings and 32 segments.
    pub fn uv_sphere() -> Self {
        let lat_segments = 16u16;
        let lon_segments = 32u16;
        let radius = 0.5;

        let mut vertices = Vec::new();
        let mut indices = Vec::new();

        for lat in 0..=lat_segments {
            let theta = std::f32::consts::PI * (lat as f32) / (lat_segments as f32);
            for lon in 0..=lon_segments {
                let phi = 2.0 * std::f32::consts::PI * (lon as f32) / (lon_segments as f32);
                let normal = [phi.cos() * theta.sin(), theta.cos(), phi.sin() * theta.sin()];
                let position = [normal[0] * radius, normal[1] * radius, normal[2] * radius];
                vertices.push(Vertex::new(position, normal));
            }
        }

        for lat in 0..lat_segments {
            for lon in 0..lon_segments {
                let first = lat * (lon_segments + 1) + lon;
                let second = first + lon_segments + 1;

                indices.extend_from_slice(&[first, second, first + 1]);
                indices.extend_from_slice(&[second, second + 1, first + 1]);
            }
        }

        Self::new("uv_sphere", vertices, indices)
    }

    /// Unit cube centred at the origin with per-face normals.
    pub fn cube() -> Self {
        let faces: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
            ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
            ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
            ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
            ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);

        for (normal, right, up) in faces {
            let n = glam::Vec3::from(normal);
            let r = glam::Vec3::from(right);
            let u = glam::Vec3::from(up);
            let base = vertices.len() as u16;
            for (sr, su) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
                let p = (n + r * sr + u * su) * 0.5;
                vertices.push(Vertex::new(p.to_array(), normal));
            }
            indices.extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }

        Self::new("cube", vertices, indices)
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }
}

/// Compute area-weighted vertex normals from face normals.
///
/// Each vertex accumulates the unnormalized face normal of every adjacent
/// triangle, so larger triangles contribute proportionally more.
fn compute_vertex_normals(positions: &[[f32; 3]], indices: &[u16]) -> Vec<[f32; 3]> {
    let mut normals = vec![glam::Vec3::ZERO; positions.len()];

    for tri in indices.chunks_exact(3) {
        let (i0, i1, i2) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        if i0 >= positions.len() || i1 >= positions.len() || i2 >= positions.len() {
            continue;
        }

        let p0 = glam::Vec3::from(positions[i0]);
        let p1 = glam::Vec3::from(positions[i1]);
        let p2 = glam::Vec3::from(positions[i2]);
        let face_normal = (p1 - p0).cross(p2 - p0);

        for idx in [i0, i1, i2] {
            normals[idx] += face_normal;
        }
    }

    normals
        .into_iter()
        .map(|n| {
            if n.length_squared() > 1e-12 {
                n.normalize().to_array()
            } else {
                // Degenerate normal, use Y-up as fallback
                [0.0, 1.0, 0.0]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounding_box_from_vertices() {
        let vertices = vec![
            Vertex::new([-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            Vertex::new([1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
            Vertex::new([0.0, 2.0, 0.0], [0.0, 1.0, 0.0]),
        ];

        let bounds = BoundingBox::from_vertices(&vertices);
        assert_eq!(bounds.min, [-1.0, 0.0, 0.0]);
        assert_eq!(bounds.max, [1.0, 2.0, 0.0]);
        assert_eq!(bounds.center(), glam::Vec3::new(0.0, 1.0, 0.0));
    }

    #[test]
    fn test_obj_parsing() {
        let obj_content = r#"
            v 0 0 0
            v 1 0 0
            v 0 1 0
            f 1 2 3
        "#;

        let asset = MeshAsset::from_obj("test", obj_content).unwrap();
        assert_eq!(asset.vertices.len(), 3);
        assert_eq!(asset.indices.len(), 3);
        assert_eq!(asset.triangle_count(), 1);
        // Counter-clockwise in XY, so the generated normal faces +Z.
        assert_eq!(asset.vertices[0].normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_obj_without_faces_or_vertices_fails() {
        assert!(MeshAsset::from_obj("empty", "# nothing here").is_err());
    }

    #[test]
    fn test_icosphere_counts() {
        let base = MeshAsset::icosphere(0);
        assert_eq!(base.vertices.len(), 12);
        assert_eq!(base.triangle_count(), 20);

        let sphere = MeshAsset::icosphere(3);
        assert_eq!(sphere.vertices.len(), 642);
        assert_eq!(sphere.triangle_count(), 1280);
    }

    #[test]
    fn test_icosphere_subdivisions_are_capped() {
        let finest = MeshAsset::icosphere(MAX_ICOSPHERE_SUBDIVISIONS);
        assert_eq!(finest.vertices.len(), 40962);

        let capped = MeshAsset::icosphere(9);
        assert_eq!(capped.id, finest.id);
        assert_eq!(capped.vertices.len(), finest.vertices.len());
        assert!(capped.indices.iter().all(|&i| (i as usize) < capped.vertices.len()));
    }

    #[test]
    fn test_icosphere_vertices_on_radius() {
        let sphere = MeshAsset::icosphere(2);
        for v in &sphere.vertices {
            let len = glam::Vec3::from(v.position).length();
            assert!((len - 0.5).abs() < 1e-5);
        }
        assert!((sphere.bounds.max[1] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_cube_bounds() {
        let cube = MeshAsset::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.triangle_count(), 12);
        assert_eq!(cube.bounds.min, [-0.5, -0.5, -0.5]);
        assert_eq!(cube.bounds.max, [0.5, 0.5, 0.5]);
    }
}
