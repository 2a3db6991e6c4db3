//! UV seam detection and outset for seam bleed
//!
//! Paint is extended a few pixels past the UV edges of a triangle when that
//! edge is a seam, so texture filtering never reads unpainted texels.
//!
//! - [`FaceSeamFlags`] - per-triangle edge classification bits
//! - [`VertSeam`] - one seam edge end, kept sorted by angle per vertex
//! - [`CornerSeam`] - the outset quad of the seam edge starting at a corner
//! - [`SeamData`] - adjacency built at stroke begin plus the mutable seam
//!   state, guarded by a single lock shared by all workers
//!
//! Edges are classified lazily the first time a worker rasterizes a
//! triangle that needs them. Edge `i` of a triangle runs from corner `i`
//! to corner `(i + 1) % 3`.

mod classify;
mod outset;

use std::ops::BitOr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use glam::Vec2;
use tracing::debug;

use crate::constants::GEOM_TOLERANCE;
use crate::geometry::area_tri_v2;
use crate::image::TriTarget;
use crate::mesh::{ImageId, MeshSnapshot};

pub use outset::compute_seam_normal;

/// Seam classification bits of one triangle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FaceSeamFlags(pub u16);

impl FaceSeamFlags {
    pub const NONE: Self = Self(0);
    pub const SEAM0: Self = Self(1 << 0);
    pub const SEAM1: Self = Self(1 << 1);
    pub const SEAM2: Self = Self(1 << 2);
    pub const NOSEAM0: Self = Self(1 << 4);
    pub const NOSEAM1: Self = Self(1 << 5);
    pub const NOSEAM2: Self = Self(1 << 6);
    pub const SEAM_INIT0: Self = Self(1 << 8);
    pub const SEAM_INIT1: Self = Self(1 << 9);
    pub const SEAM_INIT2: Self = Self(1 << 10);
    /// Zero UV area, never bleeds and never counts as a neighbour
    pub const DEGENERATE: Self = Self(1 << 12);

    pub const ANY_SEAM: Self = Self(Self::SEAM0.0 | Self::SEAM1.0 | Self::SEAM2.0);
    pub const ALL_INIT: Self = Self(Self::SEAM_INIT0.0 | Self::SEAM_INIT1.0 | Self::SEAM_INIT2.0);

    /// Edge is a seam
    #[inline]
    pub fn seam(edge: usize) -> Self {
        Self(Self::SEAM0.0 << edge)
    }

    /// Edge was checked and is not a seam
    #[inline]
    pub fn noseam(edge: usize) -> Self {
        Self(Self::NOSEAM0.0 << edge)
    }

    /// Edge and its vertex neighbourhood are fully classified
    #[inline]
    pub fn seam_init(edge: usize) -> Self {
        Self(Self::SEAM_INIT0.0 << edge)
    }

    #[inline]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// True when edge `edge` is a seam
    #[inline]
    pub fn has_seam(self, edge: usize) -> bool {
        self.contains(Self::seam(edge))
    }
}

impl BitOr for FaceSeamFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Orientation of a triangle in UV space
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Winding {
    #[default]
    Unknown,
    Ccw,
    /// Positive signed UV area
    Cw,
}

/// One end of a seam edge, stored in the list of the vertex it touches
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertSeam {
    pub tri: u32,
    /// Corner the seam edge starts at (shared by both ends)
    pub corner: u32,
    /// Edge direction in pixel space, pointing away from this vertex
    pub angle: f32,
    pub normal_cw: bool,
    /// UV of this end
    pub uv: Vec2,
}

/// Outset geometry of the seam edge starting at one corner
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CornerSeam {
    /// Outset end points in UV space (`f32::MAX` until computed)
    pub seam_uvs: [Vec2; 2],
    /// Outset end points in pixel space
    pub seam_puvs: [Vec2; 2],
    /// Squared radius around each outset end where bleed is rejected
    pub corner_dist_sq: [f32; 2],
}

impl Default for CornerSeam {
    fn default() -> Self {
        Self {
            seam_uvs: [Vec2::splat(f32::MAX); 2],
            seam_puvs: [Vec2::ZERO; 2],
            corner_dist_sq: [0.0; 2],
        }
    }
}

impl CornerSeam {
    #[inline]
    pub fn is_computed(&self) -> bool {
        self.seam_uvs[0].x != f32::MAX
    }
}

/// Read-only triangle adjacency for seam classification
#[derive(Debug)]
pub(crate) struct SeamTopology {
    corners: Vec<[u32; 3]>,
    verts: Vec<[u32; 3]>,
    uvs: Vec<[Vec2; 3]>,
    /// Target image and UDIM tile, None for triangles without one
    keys: Vec<Option<(ImageId, u32)>>,
    degenerate: Vec<bool>,
    vert_faces: Vec<Vec<u32>>,
}

/// Mutable seam state, only touched under the seam lock
#[derive(Debug)]
pub(crate) struct SeamState {
    flags: Vec<FaceSeamFlags>,
    winding: Vec<Winding>,
    vert_seams: Vec<Vec<VertSeam>>,
    corners: Vec<CornerSeam>,
    bleed_px: f32,
}

/// Seam adjacency and lazily computed seam geometry for one stroke
#[derive(Debug)]
pub struct SeamData {
    topology: SeamTopology,
    state: Mutex<SeamState>,
    bleed_px: f32,
}

impl SeamData {
    /// Build vertex-face adjacency for every triangle with a target.
    ///
    /// # Arguments
    /// * `mesh` - Mesh snapshot of the stroke
    /// * `slots` - Target of each triangle, None when it has no image
    /// * `bleed_px` - Bleed distance in pixels
    pub fn new(mesh: &MeshSnapshot, slots: &[Option<TriTarget>], bleed_px: f32) -> Self {
        let tri_count = mesh.tri_count();
        let mut topology = SeamTopology {
            corners: mesh.tris.clone(),
            verts: Vec::with_capacity(tri_count),
            uvs: Vec::with_capacity(tri_count),
            keys: Vec::with_capacity(tri_count),
            degenerate: vec![false; tri_count],
            vert_faces: vec![Vec::new(); mesh.vert_count()],
        };
        let mut flags = vec![FaceSeamFlags::NONE; tri_count];

        for tri in 0..tri_count {
            let slot = slots.get(tri).copied().flatten();
            let layer = slot.map_or(mesh.active_uv, |s| s.uv_layer);
            let uvs = mesh.tri_uvs(layer, tri);
            let verts = mesh.tri_verts(tri).map(|v| v as u32);

            topology.verts.push(verts);
            topology.uvs.push(uvs);
            topology.keys.push(slot.map(|s| (s.image, s.tile)));

            if slot.is_none() {
                continue;
            }
            if area_tri_v2(uvs[0], uvs[1], uvs[2]) > 0.0 {
                for v in verts {
                    topology.vert_faces[v as usize].push(tri as u32);
                }
            } else {
                topology.degenerate[tri] = true;
                flags[tri].insert(FaceSeamFlags::DEGENERATE);
            }
        }

        let degenerate = topology.degenerate.iter().filter(|d| **d).count();
        debug!(
            "Seam data: {} triangles, {} degenerate, bleed {}px",
            tri_count, degenerate, bleed_px
        );

        Self {
            state: Mutex::new(SeamState {
                flags,
                winding: vec![Winding::Unknown; tri_count],
                vert_seams: vec![Vec::new(); mesh.vert_count()],
                corners: vec![CornerSeam::default(); mesh.corner_verts.len()],
                bleed_px,
            }),
            topology,
            bleed_px,
        }
    }

    #[inline]
    pub fn bleed_px(&self) -> f32 {
        self.bleed_px
    }

    #[inline]
    pub fn is_degenerate(&self, tri: usize) -> bool {
        self.topology.degenerate[tri]
    }

    /// Triangles using a vertex (non-degenerate triangles with a target)
    pub fn vert_faces(&self, vert: usize) -> &[u32] {
        &self.topology.vert_faces[vert]
    }

    fn lock(&self) -> MutexGuard<'_, SeamState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current classification of a triangle
    pub fn flags(&self, tri: usize) -> FaceSeamFlags {
        self.lock().flags[tri]
    }

    /// Classify a triangle's edges and compute the outset of its seams.
    ///
    /// # Arguments
    /// * `tri` - Triangle being rasterized
    /// * `uv_offset` - Its UVs shifted by the rasterizer's half pixel offset
    /// * `width`, `height` - Size of the image buffer it paints into
    ///
    /// # Returns
    /// The outset of each seam edge, or None when the triangle has no seams
    pub fn tri_seams(
        &self,
        tri: usize,
        uv_offset: [Vec2; 3],
        width: u32,
        height: u32,
    ) -> Option<[Option<CornerSeam>; 3]> {
        if self.topology.degenerate[tri] {
            return None;
        }

        let mut state = self.lock();
        if !state.flags[tri].contains(FaceSeamFlags::ALL_INIT) {
            state.init_face_seams(&self.topology, tri, None, width, height);
        }

        let flags = state.flags[tri];
        if !flags.intersects(FaceSeamFlags::ANY_SEAM) {
            return None;
        }

        let size = Vec2::new(width as f32, height as f32);
        let puv = uv_offset.map(|uv| uv * size);
        state.uv_image_outset(&self.topology, tri, uv_offset, puv, size);

        let corners = self.topology.corners[tri];
        Some(std::array::from_fn(|edge| {
            flags
                .has_seam(edge)
                .then(|| state.corners[corners[edge] as usize])
        }))
    }
}

/// Compare two UVs modulo the unit square
pub fn cmp_uv(a: Vec2, b: Vec2) -> bool {
    fn wrap(v: f32) -> f32 {
        let f = v % 1.0;
        if f < 0.0 { f + 1.0 } else { f }
    }
    (wrap(a.x) - wrap(b.x)).abs() < GEOM_TOLERANCE && (wrap(a.y) - wrap(b.y)).abs() < GEOM_TOLERANCE
}
