//! Seam outset: pushing seam edges outward by the bleed distance

use std::f32::consts::{FRAC_PI_2, PI, TAU};

use glam::Vec2;

use super::{CornerSeam, FaceSeamFlags, SeamState, SeamTopology, VertSeam, cmp_uv};
use crate::constants::SEAM_LENGTH_FACTOR_MAX;
use crate::geometry::{isect_seg_seg_v2_point, isect_seg_seg_v2_simple};

/// Normal of two seams meeting at a vertex.
///
/// # Returns
/// Half the angle between the seams and the unit normal bisecting them
pub fn compute_seam_normal(seam: &VertSeam, adj: &VertSeam) -> (f32, Vec2) {
    let (a0, a1) = if seam.normal_cw {
        (adj.angle, seam.angle)
    } else {
        (seam.angle, adj.angle)
    };

    let mut angle_rel = a1 - a0;
    if angle_rel < 0.0 {
        angle_rel += TAU;
    }
    angle_rel *= 0.5;

    let mut angle_no = angle_rel + a0;
    if angle_no > PI {
        angle_no -= TAU;
    }

    (angle_rel, Vec2::new(angle_no.cos(), angle_no.sin()))
}

impl SeamState {
    /// Find the seam of a corner at a vertex and the first opposing seam
    /// with matching UVs, circulating in the direction of its normal.
    ///
    /// Falls back to the seam itself when nothing opposes it.
    pub(super) fn find_adjacent_seam(&self, corner: u32, vert: u32) -> Option<(VertSeam, VertSeam)> {
        let list = &self.vert_seams[vert as usize];
        let start = list.iter().position(|s| s.corner == corner)?;
        let seam = list[start];
        let n = list.len();

        let adjacent = (1..n)
            .map(|step| {
                if seam.normal_cw {
                    (start + n - step) % n
                } else {
                    (start + step) % n
                }
            })
            .map(|i| list[i])
            .find(|adj| adj.normal_cw != seam.normal_cw && cmp_uv(adj.uv, seam.uv))
            .unwrap_or(seam);

        Some((seam, adjacent))
    }

    /// Compute the outset of every seam edge of a triangle not computed yet.
    ///
    /// The outset keeps an even pixel distance from the UV edge rather than
    /// scaling the UVs, so image aspect is respected.
    pub(super) fn uv_image_outset(
        &mut self,
        topo: &SeamTopology,
        tri: usize,
        orig_uv: [Vec2; 3],
        puv: [Vec2; 3],
        size: Vec2,
    ) {
        let bleed = self.bleed_px;
        let inv = size.recip();

        for f0 in 0..3 {
            if !self.flags[tri].contains(FaceSeamFlags::seam(f0)) {
                continue;
            }
            let corner = topo.corners[tri][f0];
            if self.corners[corner as usize].is_computed() {
                continue;
            }

            let fidx = [f0, (f0 + 1) % 3];
            let verts = [topo.verts[tri][fidx[0]], topo.verts[tri][fidx[1]]];
            let mut data = CornerSeam::default();
            let mut ang = [0.0f32; 2];

            for i in 0..2 {
                let Some((seam, adj)) = self.find_adjacent_seam(corner, verts[i]) else {
                    // No seam list entry, paint the edge without bleed
                    data.seam_puvs[i] = puv[fidx[i]];
                    data.seam_uvs[i] = orig_uv[fidx[i]];
                    ang[i] = FRAC_PI_2;
                    continue;
                };

                let (angle, no) = compute_seam_normal(&seam, &adj);
                ang[i] = angle;
                let tri_ang = angle - FRAC_PI_2;

                data.corner_dist_sq[i] = if tri_ang > 0.0 {
                    let dist = bleed * tri_ang.tan();
                    dist * dist
                } else {
                    0.0
                };

                let len = tri_ang.cos();
                let len_fact = if len < f32::EPSILON { f32::MAX } else { 1.0 / len };
                let len_fact = len_fact.min(SEAM_LENGTH_FACTOR_MAX);

                data.seam_puvs[i] = puv[fidx[i]] + no * (bleed * len_fact);
                data.seam_uvs[i] = data.seam_puvs[i] * inv;
            }

            // Convergent normals can cross over, collapse them to the crossing
            if ang[0] + ang[1] < PI
                && isect_seg_seg_v2_simple(orig_uv[fidx[0]], data.seam_uvs[0], orig_uv[fidx[1]], data.seam_uvs[1])
            {
                if let Some(isect) =
                    isect_seg_seg_v2_point(orig_uv[fidx[0]], data.seam_uvs[0], orig_uv[fidx[1]], data.seam_uvs[1])
                {
                    data.seam_uvs = [isect, isect];
                }
            }

            self.corners[corner as usize] = data;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::TriTarget;
    use crate::mesh::{ImageId, MeshSnapshot};
    use crate::seam::SeamData;

    fn vseam(angle: f32, normal_cw: bool) -> VertSeam {
        VertSeam {
            tri: 0,
            corner: 0,
            angle,
            normal_cw,
            uv: Vec2::ZERO,
        }
    }

    #[test]
    fn test_seam_normal_right_angle() {
        // Bottom edge leaving along +x, left edge arriving from +y
        let (half, no) = compute_seam_normal(&vseam(0.0, true), &vseam(FRAC_PI_2, false));
        assert!((half - 0.75 * PI).abs() < 1e-5);
        let expected = Vec2::new(-1.0, -1.0).normalize();
        assert!(no.distance(expected) < 1e-5);
    }

    #[test]
    fn test_quad_corner_outset() {
        let mesh = MeshSnapshot::quad();
        let slots = vec![
            Some(TriTarget {
                image: ImageId(0),
                uv_layer: 0,
                tile: 0,
            });
            2
        ];
        let seams = SeamData::new(&mesh, &slots, 2.0);
        let edges = seams.tri_seams(0, mesh.tri_uvs(0, 0), 64, 64).unwrap();

        // The bottom edge pushes out diagonally at both square corners
        let bottom = edges[0].unwrap();
        assert!(bottom.seam_puvs[0].distance(Vec2::new(-2.0, -2.0)) < 1e-3);
        assert!(bottom.seam_puvs[1].distance(Vec2::new(66.0, -2.0)) < 1e-3);
        assert!(bottom.seam_uvs[0].distance(Vec2::new(-2.0, -2.0) / 64.0) < 1e-5);
        // 45 degree corner wedges reject pixels within the bleed radius
        assert!((bottom.corner_dist_sq[0] - 4.0).abs() < 1e-3);
        assert!((bottom.corner_dist_sq[1] - 4.0).abs() < 1e-3);

        let right = edges[1].unwrap();
        assert!(right.seam_puvs[0].distance(Vec2::new(66.0, -2.0)) < 1e-3);
        assert!(right.seam_puvs[1].distance(Vec2::new(66.0, 66.0)) < 1e-3);
    }

    #[test]
    fn test_outset_computed_once() {
        let mesh = MeshSnapshot::quad();
        let slots = vec![
            Some(TriTarget {
                image: ImageId(0),
                uv_layer: 0,
                tile: 0,
            });
            2
        ];
        let seams = SeamData::new(&mesh, &slots, 2.0);
        let first = seams.tri_seams(0, mesh.tri_uvs(0, 0), 64, 64).unwrap();
        // A later request with a different size reuses the stored outset
        let second = seams.tri_seams(0, mesh.tri_uvs(0, 0), 128, 128).unwrap();
        assert_eq!(first, second);
    }
}
