//! Edge classification: which triangle edges are UV seams

use std::f32::consts::PI;

use glam::Vec2;

use super::{FaceSeamFlags, SeamState, SeamTopology, VertSeam, Winding, cmp_uv};
use crate::geometry::cross_tri_v2;

/// Edges in the order they are visited, `(start, end)` corner pairs
const EDGE_ORDER: [(usize, usize); 3] = [(2, 0), (1, 2), (0, 1)];

impl SeamState {
    pub(super) fn init_winding(&mut self, topo: &SeamTopology, tri: usize) {
        if self.winding[tri] != Winding::Unknown {
            return;
        }
        let [a, b, c] = topo.uvs[tri];
        self.winding[tri] = if cross_tri_v2(a, b, c) > 0.0 {
            Winding::Cw
        } else {
            Winding::Ccw
        };
    }

    /// Check whether the edge between two corners of `orig` is a seam.
    ///
    /// # Returns
    /// The seam state and, when another triangle shares the edge, that
    /// triangle with the index of the shared edge in it
    pub(super) fn check_seam(
        &mut self,
        topo: &SeamTopology,
        orig: usize,
        i1_fidx: usize,
        i2_fidx: usize,
    ) -> (bool, Option<(usize, usize)>) {
        let i1 = topo.verts[orig][i1_fidx];
        let i2 = topo.verts[orig][i2_fidx];

        for &tri in &topo.vert_faces[i1 as usize] {
            let tri = tri as usize;
            if tri == orig {
                continue;
            }
            let verts = topo.verts[tri];
            let Some(i1_f) = verts.iter().position(|&v| v == i1) else {
                continue;
            };
            let Some(i2_f) = verts.iter().position(|&v| v == i2) else {
                continue;
            };

            let other_edge = if (i1_f + 1) % 3 == i2_f { i1_f } else { i2_f };

            self.init_winding(topo, tri);
            self.init_winding(topo, orig);

            let same_target = topo.keys[tri].is_some() && topo.keys[tri] == topo.keys[orig];
            let is_seam = if same_target
                && cmp_uv(topo.uvs[orig][i1_fidx], topo.uvs[tri][i1_f])
                && cmp_uv(topo.uvs[orig][i2_fidx], topo.uvs[tri][i2_f])
            {
                // Opposite windings fold the faces onto the same UV side
                self.winding[tri] != self.winding[orig]
            } else {
                true
            };
            return (is_seam, Some((tri, other_edge)));
        }

        (true, None)
    }

    /// Add both ends of a seam edge to their vertices' angle sorted lists
    pub(super) fn insert_seam_vert(&mut self, topo: &SeamTopology, tri: usize, edge: usize, size: Vec2) {
        let fidx = [edge, (edge + 1) % 3];
        let uvs = topo.uvs[tri];

        let dir = (uvs[fidx[1]] - uvs[fidx[0]]) * size;
        let angle = dir.y.atan2(dir.x);

        let first = VertSeam {
            tri: tri as u32,
            corner: topo.corners[tri][fidx[0]],
            angle,
            normal_cw: self.winding[tri] == Winding::Cw,
            uv: uvs[fidx[0]],
        };
        let second = VertSeam {
            angle: if angle > 0.0 { angle - PI } else { angle + PI },
            normal_cw: !first.normal_cw,
            uv: uvs[fidx[1]],
            ..first
        };

        for (seam, f) in [(first, fidx[0]), (second, fidx[1])] {
            let list = &mut self.vert_seams[topo.verts[tri][f] as usize];
            let at = list
                .iter()
                .position(|item| item.angle >= seam.angle)
                .unwrap_or(list.len());
            list.insert(at, seam);
        }
    }

    /// Classify the edges of a triangle.
    ///
    /// With `vert` set only edges touching that vertex are checked. With
    /// `vert` None every edge is checked and the triangles around each
    /// unfinished edge's vertices are classified too, so the seam lists of
    /// those vertices are complete before any outset is computed.
    pub(super) fn init_face_seams(
        &mut self,
        topo: &SeamTopology,
        tri: usize,
        vert: Option<u32>,
        width: u32,
        height: u32,
    ) {
        let size = Vec2::new(width as f32, height as f32);
        let verts = topo.verts[tri];
        self.init_winding(topo, tri);

        for (f0, f1) in EDGE_ORDER {
            let touches = match vert {
                None => true,
                Some(v) => verts[f0] == v || verts[f1] == v,
            };
            if !touches {
                continue;
            }
            if self.flags[tri].intersects(FaceSeamFlags::seam(f0) | FaceSeamFlags::noseam(f0)) {
                continue;
            }

            let (is_seam, other) = self.check_seam(topo, tri, f0, f1);
            if is_seam {
                self.flags[tri].insert(FaceSeamFlags::seam(f0));
                self.insert_seam_vert(topo, tri, f0, size);

                if let Some((other, other_edge)) = other {
                    // The other side may already be listed
                    if !self.flags[other].has_seam(other_edge) {
                        self.flags[other].insert(FaceSeamFlags::seam(other_edge));
                        self.insert_seam_vert(topo, other, other_edge, size);
                    }
                }
            } else {
                self.flags[tri].insert(FaceSeamFlags::noseam(f0) | FaceSeamFlags::seam_init(f0));
                if let Some((other, other_edge)) = other {
                    self.flags[other]
                        .insert(FaceSeamFlags::noseam(other_edge) | FaceSeamFlags::seam_init(other_edge));
                }
            }
        }

        if vert.is_some() {
            return;
        }

        let mut checked = [false; 3];
        for (f0, f1) in EDGE_ORDER {
            if self.flags[tri].contains(FaceSeamFlags::seam_init(f0)) {
                continue;
            }
            for f in [f0, f1] {
                if checked[f] {
                    continue;
                }
                let v = verts[f];
                for &neighbour in &topo.vert_faces[v as usize] {
                    self.init_face_seams(topo, neighbour as usize, Some(v), width, height);
                }
                checked[f] = true;
            }
            self.flags[tri].insert(FaceSeamFlags::seam_init(f0));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::SeamData;
    use crate::image::TriTarget;
    use crate::mesh::{ImageId, MeshSnapshot};

    #[test]
    fn test_vert_seams_sorted_by_angle() {
        let mesh = MeshSnapshot::cube_islands();
        let slots = vec![
            Some(TriTarget {
                image: ImageId(0),
                uv_layer: 0,
                tile: 0,
            });
            mesh.tri_count()
        ];
        let seams = SeamData::new(&mesh, &slots, 2.0);
        for tri in 0..mesh.tri_count() {
            seams.tri_seams(tri, mesh.tri_uvs(0, tri), 64, 64);
        }

        let state = seams.lock();
        for list in &state.vert_seams {
            // Three islands meet at each cube corner, two seam ends each
            assert_eq!(list.len(), 6);
            assert!(list.windows(2).all(|pair| pair[0].angle <= pair[1].angle));
        }
    }
}
