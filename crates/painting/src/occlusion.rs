//! Occlusion tests and colour picking against projected triangles
//!
//! All queries run against the triangles listed in one bucket, so a point is
//! only ever compared with geometry that overlaps its screen position.
//! Depths are compared in screen space: smaller values are nearer.

use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};
use projpaint_config::SampleInterpolation;

use crate::bucket::BucketGrid;
use crate::geometry::{barycentric_weights_v2, barycentric_weights_v2_persp, interp_v2, interp_v3, isect_point_tri_v2};
use crate::image::{PaintImage, TriTarget};
use crate::mesh::MeshSnapshot;
use crate::projection::{Projector, ScreenCoords};
use crate::surface::PixelValue;

/// Result of testing a point against one triangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Occlusion {
    /// The triangle is behind the point or does not cover it
    Behind,
    /// Every vertex of the triangle is nearer than the point
    FullyInFront,
    /// The interpolated triangle depth at the point is nearer
    Exact,
    /// The triangle covers the point but lies behind it there
    NotOccluded,
}

impl Occlusion {
    #[inline]
    pub fn occludes(self) -> bool {
        matches!(self, Occlusion::FullyInFront | Occlusion::Exact)
    }
}

/// Read-only projected geometry of one view
#[derive(Debug, Clone, Copy)]
pub struct ScreenView<'a> {
    pub mesh: &'a MeshSnapshot,
    pub coords: &'a ScreenCoords,
    pub projector: &'a Projector,
    pub grid: &'a BucketGrid,
}

impl ScreenView<'_> {
    /// Screen coordinates of a triangle's vertices
    #[inline]
    pub fn tri_screen(&self, tri: usize) -> [Vec4; 3] {
        self.mesh.tri_verts(tri).map(|v| self.coords.get(v))
    }
}

/// Depth at `pt` inside an orthographic triangle, with the weights used
pub fn z_depth_ortho(pt: Vec2, v: [Vec4; 3]) -> (f32, Vec3) {
    let w = barycentric_weights_v2(v[0].xy(), v[1].xy(), v[2].xy(), pt);
    (v[0].z * w.x + v[1].z * w.y + v[2].z * w.z, w)
}

/// Depth at `pt` inside a perspective triangle.
///
/// The returned weights stay perspective corrected; the depth uses the
/// screen-linear weights recovered by undoing the `w` division.
pub fn z_depth_persp(pt: Vec2, v: [Vec4; 3]) -> (f32, Vec3) {
    let w = barycentric_weights_v2_persp(v[0], v[1], v[2], pt);
    let mut w_tmp = Vec3::new(w.x * v[0].w, w.y * v[1].w, w.z * v[2].w);
    let total = w_tmp.x + w_tmp.y + w_tmp.z;
    if total != 0.0 {
        w_tmp /= total;
    } else {
        w_tmp = Vec3::splat(1.0 / 3.0);
    }
    (v[0].z * w_tmp.x + v[1].z * w_tmp.y + v[2].z * w_tmp.z, w)
}

#[inline]
fn z_depth(pt: Vec2, v: [Vec4; 3], is_ortho: bool) -> (f32, Vec3) {
    if is_ortho { z_depth_ortho(pt, v) } else { z_depth_persp(pt, v) }
}

/// Does the triangle `v` hide the screen point `pt` (x, y, depth)?
///
/// # Returns
/// The classification and, for [`Occlusion::Exact`] and
/// [`Occlusion::NotOccluded`], the weights of `pt` in the triangle.
pub fn occlude_point(pt: Vec4, v: [Vec4; 3], is_ortho: bool) -> (Occlusion, Option<Vec3>) {
    if v.iter().all(|p| p.z > pt.z) {
        return (Occlusion::Behind, None);
    }
    if isect_point_tri_v2(pt.xy(), v[0].xy(), v[1].xy(), v[2].xy()) == 0 {
        return (Occlusion::Behind, None);
    }
    if v.iter().all(|p| p.z < pt.z) {
        return (Occlusion::FullyInFront, None);
    }
    let (depth, w) = z_depth(pt.xy(), v, is_ortho);
    if depth < pt.z {
        (Occlusion::Exact, Some(w))
    } else {
        (Occlusion::NotOccluded, Some(w))
    }
}

/// Like [`occlude_point`], but the hiding part of the triangle must be
/// inside the clipping planes. A clipped occluder reports `NotOccluded`.
pub fn occlude_point_clipped(pt: Vec4, v: [Vec4; 3], cos: [Vec3; 3], projector: &Projector) -> Occlusion {
    let is_ortho = projector.is_ortho();
    let (ret, w) = occlude_point(pt, v, is_ortho);
    if !ret.occludes() {
        return ret;
    }
    let w = w.unwrap_or_else(|| {
        if is_ortho {
            barycentric_weights_v2(v[0].xy(), v[1].xy(), v[2].xy(), pt.xy())
        } else {
            barycentric_weights_v2_persp(v[0], v[1], v[2], pt.xy())
        }
    });
    let wco = interp_v3(cos[0], cos[1], cos[2], w);
    if projector.is_clipped(wco) {
        Occlusion::NotOccluded
    } else {
        Occlusion::FullyInFront
    }
}

/// Is the screen point hidden by any bucket triangle other than `exclude`?
pub fn point_occluded(view: &ScreenView<'_>, faces: &[u32], exclude: usize, pt: Vec4) -> bool {
    let do_clip = view.projector.has_clipping();
    let is_ortho = view.projector.is_ortho();
    faces.iter().map(|&tri| tri as usize).filter(|&tri| tri != exclude).any(|tri| {
        let v = view.tri_screen(tri);
        if do_clip {
            occlude_point_clipped(pt, v, view.mesh.tri_positions(tri), view.projector).occludes()
        } else {
            occlude_point(pt, v, is_ortho).0.occludes()
        }
    })
}

/// Nearest triangle under a screen point.
///
/// # Returns
/// The triangle and the weights of the point in it, None off the grid or
/// when no triangle covers the point.
pub fn pick_face(view: &ScreenView<'_>, pt: Vec2) -> Option<(usize, Vec3)> {
    let bucket = view.grid.bucket_offset_safe(pt)?;
    let is_ortho = view.projector.is_ortho();
    let mut best: Option<(usize, Vec3)> = None;
    let mut best_depth = f32::MAX;
    for &tri in &view.grid.bucket(bucket).faces {
        let tri = tri as usize;
        let v = view.tri_screen(tri);
        if isect_point_tri_v2(pt, v[0].xy(), v[1].xy(), v[2].xy()) == 0 {
            continue;
        }
        let (depth, w) = z_depth(pt, v, is_ortho);
        if depth < best_depth {
            best_depth = depth;
            best = Some((tri, w));
        }
    }
    best
}

/// Colour of the nearest painted surface under a screen point.
///
/// Float results are clamped to 0..1. None when nothing is hit or the
/// triangle's image has no buffer for its tile.
pub fn pick_color(
    view: &ScreenView<'_>,
    targets: &[Option<TriTarget>],
    images: &[PaintImage],
    pt: Vec2,
    interpolation: SampleInterpolation,
) -> Option<PixelValue> {
    let (tri, w) = pick_face(view, pt)?;
    let target = targets.get(tri).copied().flatten()?;
    let [uv0, uv1, uv2] = view.mesh.tri_uvs(target.uv_layer, tri);
    let uv = interp_v2(uv0, uv1, uv2, w);
    let buffer = images.get(target.image.0 as usize)?.tile_buffer(target.tile)?;

    let mut x = uv.x * buffer.width as f32;
    let mut y = uv.y * buffer.height as f32;
    let value = match interpolation {
        SampleInterpolation::Linear => {
            x -= 0.5;
            y -= 0.5;
            buffer.sample_bilinear_wrap(x, y)
        }
        SampleInterpolation::Closest => buffer.sample_nearest_wrap(x, y),
    };
    Some(match value {
        PixelValue::Float(f) => PixelValue::Float(f.map(|c| c.clamp(0.0, 1.0))),
        byte => byte,
    })
}
