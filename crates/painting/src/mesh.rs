//! Evaluated mesh snapshot read by a projection stroke
//!
//! The snapshot is a flat, read-only copy of the data a stroke needs:
//! - vertex positions and normals
//! - polygons as ranges of corners, each corner pointing at a vertex
//! - corner triangles (indices into the corner arrays) with their polygon
//! - per-corner UV layers
//! - per-polygon hide/select/smooth flags and material index
//! - material paint slots naming the image (and UV layer) each polygon paints into

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Index of an image in the stroke's image list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageId(pub u32);

#[derive(Debug, Error)]
pub enum MeshError {
    #[error("Array length mismatch: {what} has {actual} entries, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        actual: usize,
        expected: usize,
    },
    #[error("Corner {corner} references vertex {vert} but the mesh has {count} vertices")]
    VertexOutOfRange { corner: usize, vert: u32, count: usize },
    #[error("Triangle {tri} references corner {corner} outside the corner arrays")]
    CornerOutOfRange { tri: usize, corner: u32 },
    #[error("Triangle {tri} references polygon {face} that does not exist")]
    FaceOutOfRange { tri: usize, face: u32 },
    #[error("Polygon offsets are not ascending")]
    InvalidOffsets,
    #[error("UV layer index {0} out of range")]
    UvLayerOutOfRange(usize),
}

/// Per-corner UV coordinates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UvLayer {
    pub name: String,
    pub uvs: Vec<Vec2>,
}

/// An image target of a material slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaintSlot {
    pub image: ImageId,
    /// UV layer the slot maps through (None = the active layer)
    pub uv_layer: Option<usize>,
}

/// Texture paint slots of one material
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MaterialSlot {
    /// Active paint slot
    pub paint_slot: Option<PaintSlot>,
    /// Slot sampled by the clone brush
    pub clone_slot: Option<PaintSlot>,
}

/// Read-only mesh data for one stroke
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MeshSnapshot {
    pub positions: Vec<Vec3>,
    pub vert_normals: Vec<Vec3>,
    /// Vertex of each polygon corner
    pub corner_verts: Vec<u32>,
    /// Polygon `i` spans corners `face_offsets[i]..face_offsets[i + 1]`
    pub face_offsets: Vec<u32>,
    /// Corner triangles, three corner indices each
    pub tris: Vec<[u32; 3]>,
    /// Polygon of each corner triangle
    pub tri_faces: Vec<u32>,
    pub uv_layers: Vec<UvLayer>,
    pub active_uv: usize,
    pub face_hidden: Vec<bool>,
    pub face_selected: Vec<bool>,
    /// Smooth shaded polygons interpolate vertex normals for the normal mask
    pub face_smooth: Vec<bool>,
    pub face_material: Vec<u16>,
    pub materials: Vec<MaterialSlot>,
}

impl MeshSnapshot {
    /// Build a snapshot from polygons, fan-triangulating each one.
    ///
    /// # Arguments
    /// * `positions` - Vertex positions
    /// * `polygons` - Vertex indices of each polygon
    /// * `uvs` - One UV per polygon corner, in polygon order
    pub fn from_polygons(positions: Vec<Vec3>, polygons: &[Vec<u32>], uvs: Vec<Vec2>) -> Self {
        let mut corner_verts = Vec::new();
        let mut face_offsets = vec![0u32];
        let mut tris = Vec::new();
        let mut tri_faces = Vec::new();

        for (face, poly) in polygons.iter().enumerate() {
            let start = corner_verts.len() as u32;
            corner_verts.extend_from_slice(poly);
            for i in 1..poly.len().saturating_sub(1) {
                tris.push([start, start + i as u32, start + i as u32 + 1]);
                tri_faces.push(face as u32);
            }
            face_offsets.push(corner_verts.len() as u32);
        }

        let face_count = polygons.len();
        let mut mesh = Self {
            vert_normals: vec![Vec3::Z; positions.len()],
            positions,
            corner_verts,
            face_offsets,
            tris,
            tri_faces,
            uv_layers: vec![UvLayer {
                name: "UVMap".to_string(),
                uvs,
            }],
            active_uv: 0,
            face_hidden: vec![false; face_count],
            face_selected: vec![true; face_count],
            face_smooth: vec![true; face_count],
            face_material: vec![0; face_count],
            materials: Vec::new(),
        };
        mesh.compute_vert_normals();
        mesh
    }

    /// A 2x2 quad in the XY plane facing +Z, UV mapped to the unit square
    pub fn quad() -> Self {
        Self::from_polygons(
            vec![
                Vec3::new(-1.0, -1.0, 0.0),
                Vec3::new(1.0, -1.0, 0.0),
                Vec3::new(1.0, 1.0, 0.0),
                Vec3::new(-1.0, 1.0, 0.0),
            ],
            &[vec![0, 1, 2, 3]],
            vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(1.0, 1.0),
                Vec2::new(0.0, 1.0),
            ],
        )
    }

    /// A cube (-1..1) whose six sides are separate UV islands laid out in a
    /// 3x2 grid with a small margin between islands
    pub fn cube_islands() -> Self {
        let positions = (0..8)
            .map(|i| {
                Vec3::new(
                    if i & 1 != 0 { 1.0 } else { -1.0 },
                    if i & 2 != 0 { 1.0 } else { -1.0 },
                    if i & 4 != 0 { 1.0 } else { -1.0 },
                )
            })
            .collect();
        let polygons = vec![
            vec![0, 2, 3, 1],
            vec![4, 5, 7, 6],
            vec![0, 1, 5, 4],
            vec![2, 6, 7, 3],
            vec![0, 4, 6, 2],
            vec![1, 3, 7, 5],
        ];
        let margin = 0.02;
        let mut uvs = Vec::with_capacity(24);
        for island in 0..6 {
            let u0 = (island % 3) as f32 / 3.0 + margin;
            let u1 = (island % 3 + 1) as f32 / 3.0 - margin;
            let v0 = (island / 3) as f32 / 2.0 + margin;
            let v1 = (island / 3 + 1) as f32 / 2.0 - margin;
            uvs.extend([
                Vec2::new(u0, v0),
                Vec2::new(u1, v0),
                Vec2::new(u1, v1),
                Vec2::new(u0, v1),
            ]);
        }
        let mut mesh = Self::from_polygons(positions, &polygons, uvs);
        mesh.face_smooth = vec![false; 6];
        mesh
    }

    /// Assign one material with the given paint slot to every polygon
    pub fn with_material(mut self, slot: MaterialSlot) -> Self {
        self.materials = vec![slot];
        self.face_material = vec![0; self.face_count()];
        self
    }

    #[inline]
    pub fn vert_count(&self) -> usize {
        self.positions.len()
    }

    #[inline]
    pub fn face_count(&self) -> usize {
        self.face_offsets.len().saturating_sub(1)
    }

    #[inline]
    pub fn tri_count(&self) -> usize {
        self.tris.len()
    }

    #[inline]
    pub fn tri_face(&self, tri: usize) -> usize {
        self.tri_faces[tri] as usize
    }

    /// Vertex indices of a corner triangle
    #[inline]
    pub fn tri_verts(&self, tri: usize) -> [usize; 3] {
        self.tris[tri].map(|corner| self.corner_verts[corner as usize] as usize)
    }

    /// Vertex positions of a corner triangle
    #[inline]
    pub fn tri_positions(&self, tri: usize) -> [Vec3; 3] {
        self.tri_verts(tri).map(|v| self.positions[v])
    }

    /// UVs of a corner triangle on the given layer
    #[inline]
    pub fn tri_uvs(&self, layer: usize, tri: usize) -> [Vec2; 3] {
        let uvs = &self.uv_layers[layer].uvs;
        self.tris[tri].map(|corner| uvs[corner as usize])
    }

    /// Vertex indices of a polygon
    pub fn face_verts(&self, face: usize) -> &[u32] {
        let start = self.face_offsets[face] as usize;
        let end = self.face_offsets[face + 1] as usize;
        &self.corner_verts[start..end]
    }

    /// Polygon normal using Newell's method
    pub fn face_normal(&self, face: usize) -> Vec3 {
        let verts = self.face_verts(face);
        let mut normal = Vec3::ZERO;
        for (i, &v) in verts.iter().enumerate() {
            let a = self.positions[v as usize];
            let b = self.positions[verts[(i + 1) % verts.len()] as usize];
            normal += Vec3::new(
                (a.y - b.y) * (a.z + b.z),
                (a.z - b.z) * (a.x + b.x),
                (a.x - b.x) * (a.y + b.y),
            );
        }
        normal.normalize_or_zero()
    }

    /// Material slots of the polygon owning `tri`, if any
    pub fn tri_material(&self, tri: usize) -> Option<&MaterialSlot> {
        let face = self.tri_face(tri);
        let index = self.face_material.get(face).copied().unwrap_or(0) as usize;
        self.materials.get(index)
    }

    /// Find a UV layer by name
    pub fn uv_layer_index(&self, name: &str) -> Option<usize> {
        self.uv_layers.iter().position(|layer| layer.name == name)
    }

    /// Recompute vertex normals as the average of adjacent polygon normals
    pub fn compute_vert_normals(&mut self) {
        let mut normals = vec![Vec3::ZERO; self.positions.len()];
        for face in 0..self.face_count() {
            let normal = self.face_normal(face);
            for &v in self.face_verts(face) {
                normals[v as usize] += normal;
            }
        }
        self.vert_normals = normals
            .into_iter()
            .map(|n| n.try_normalize().unwrap_or(Vec3::Z))
            .collect();
    }

    /// Unique polygon edges as sorted vertex pairs
    pub fn edges(&self) -> Vec<[u32; 2]> {
        let mut edges: Vec<[u32; 2]> = Vec::with_capacity(self.corner_verts.len());
        for face in 0..self.face_count() {
            let verts = self.face_verts(face);
            for (i, &a) in verts.iter().enumerate() {
                let b = verts[(i + 1) % verts.len()];
                if a != b {
                    edges.push([a.min(b), a.max(b)]);
                }
            }
        }
        edges.sort_unstable();
        edges.dedup();
        edges
    }

    /// Per-vertex cavity in 0..1 (0.5 is flat).
    ///
    /// Each vertex sums the unit directions of its edges pointing towards it;
    /// the average is compared against the vertex normal.
    pub fn vertex_cavities(&self) -> Vec<f32> {
        let mut dirs = vec![Vec3::ZERO; self.vert_count()];
        let mut counts = vec![0u32; self.vert_count()];
        for [v0, v1] in self.edges() {
            let (v0, v1) = (v0 as usize, v1 as usize);
            let e = (self.positions[v0] - self.positions[v1]).normalize_or_zero();
            dirs[v1] += e;
            dirs[v0] -= e;
            counts[v0] += 1;
            counts[v1] += 1;
        }
        dirs.iter()
            .zip(&counts)
            .zip(&self.vert_normals)
            .map(|((&dir, &count), &normal)| {
                if count == 0 {
                    return 0.0;
                }
                let avg = dir / count as f32;
                crate::geometry::safe_acos(10.0 * normal.dot(avg)) / std::f32::consts::PI
            })
            .collect()
    }

    /// Check that every index is in range and per-element arrays agree in length
    pub fn validate(&self) -> Result<(), MeshError> {
        let verts = self.positions.len();
        let corners = self.corner_verts.len();
        let faces = self.face_count();

        check_len("vert_normals", self.vert_normals.len(), verts)?;
        check_len("tri_faces", self.tri_faces.len(), self.tris.len())?;
        check_len("face_hidden", self.face_hidden.len(), faces)?;
        check_len("face_selected", self.face_selected.len(), faces)?;
        check_len("face_smooth", self.face_smooth.len(), faces)?;
        check_len("face_material", self.face_material.len(), faces)?;
        for layer in &self.uv_layers {
            check_len("uv layer", layer.uvs.len(), corners)?;
        }
        if !self.uv_layers.is_empty() && self.active_uv >= self.uv_layers.len() {
            return Err(MeshError::UvLayerOutOfRange(self.active_uv));
        }

        if self.face_offsets.windows(2).any(|w| w[0] > w[1])
            || self.face_offsets.last().is_some_and(|&last| last as usize != corners)
        {
            return Err(MeshError::InvalidOffsets);
        }

        for (corner, &vert) in self.corner_verts.iter().enumerate() {
            if vert as usize >= verts {
                return Err(MeshError::VertexOutOfRange {
                    corner,
                    vert,
                    count: verts,
                });
            }
        }
        for (tri, corners_of_tri) in self.tris.iter().enumerate() {
            if let Some(&corner) = corners_of_tri.iter().find(|&&c| c as usize >= corners) {
                return Err(MeshError::CornerOutOfRange { tri, corner });
            }
            let face = self.tri_faces[tri];
            if face as usize >= faces {
                return Err(MeshError::FaceOutOfRange { tri, face });
            }
        }
        for material in &self.materials {
            for slot in [material.paint_slot, material.clone_slot].into_iter().flatten() {
                match slot.uv_layer {
                    Some(layer) if layer >= self.uv_layers.len() => {
                        return Err(MeshError::UvLayerOutOfRange(layer));
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }
}

fn check_len(what: &'static str, actual: usize, expected: usize) -> Result<(), MeshError> {
    if actual != expected {
        return Err(MeshError::LengthMismatch {
            what,
            actual,
            expected,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_triangulation() {
        let mesh = MeshSnapshot::quad();
        assert_eq!(mesh.tri_count(), 2);
        assert_eq!(mesh.face_count(), 1);
        assert_eq!(mesh.tri_verts(1), [0, 2, 3]);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_quad_normal_faces_z() {
        let mesh = MeshSnapshot::quad();
        assert!((mesh.face_normal(0) - Vec3::Z).length() < 1e-6);
        assert!((mesh.vert_normals[2] - Vec3::Z).length() < 1e-6);
    }

    #[test]
    fn test_cube_normals_point_outward() {
        let mesh = MeshSnapshot::cube_islands();
        assert_eq!(mesh.tri_count(), 12);
        for face in 0..mesh.face_count() {
            let centre = mesh
                .face_verts(face)
                .iter()
                .map(|&v| mesh.positions[v as usize])
                .sum::<Vec3>()
                / 4.0;
            assert!(mesh.face_normal(face).dot(centre) > 0.9);
        }
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_cube_edges_are_unique() {
        let mesh = MeshSnapshot::cube_islands();
        assert_eq!(mesh.edges().len(), 12);
    }

    #[test]
    fn test_flat_quad_cavity_is_half() {
        let mesh = MeshSnapshot::quad();
        let cavities = mesh.vertex_cavities();
        assert_eq!(cavities.len(), 4);
        for c in cavities {
            assert!((c - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn test_convex_corner_cavity_above_half() {
        let cavities = MeshSnapshot::cube_islands().vertex_cavities();
        assert!(cavities.iter().all(|&c| c > 0.5));
    }

    #[test]
    fn test_validate_catches_bad_vertex() {
        let mut mesh = MeshSnapshot::quad();
        mesh.corner_verts[2] = 9;
        assert!(matches!(
            mesh.validate(),
            Err(MeshError::VertexOutOfRange { vert: 9, .. })
        ));
    }

    #[test]
    fn test_validate_catches_short_uv_layer() {
        let mut mesh = MeshSnapshot::quad();
        mesh.uv_layers[0].uvs.pop();
        assert!(matches!(mesh.validate(), Err(MeshError::LengthMismatch { .. })));
    }
}
