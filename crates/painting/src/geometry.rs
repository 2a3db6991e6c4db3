//! 2D/3D geometry helpers shared by the clipper, rasterizer and seam engine.
//!
//! All functions are pure and work on `glam` vectors. Screen coordinates are
//! stored as `Vec4` (x, y, depth, w) where only the first two components take
//! part in 2D tests.

use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};

/// Axis aligned float rectangle (screen space or UV space).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub xmin: f32,
    pub xmax: f32,
    pub ymin: f32,
    pub ymax: f32,
}

impl Rect {
    pub fn new(xmin: f32, xmax: f32, ymin: f32, ymax: f32) -> Self {
        Self { xmin, xmax, ymin, ymax }
    }

    /// Rectangle that any point expands (min = MAX, max = MIN).
    pub fn empty() -> Self {
        Self {
            xmin: f32::MAX,
            xmax: f32::MIN,
            ymin: f32::MAX,
            ymax: f32::MIN,
        }
    }

    pub fn include_point(&mut self, p: Vec2) {
        self.xmin = self.xmin.min(p.x);
        self.xmax = self.xmax.max(p.x);
        self.ymin = self.ymin.min(p.y);
        self.ymax = self.ymax.max(p.y);
    }

    /// Inclusive point test.
    #[inline]
    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.xmin && p.x <= self.xmax && p.y >= self.ymin && p.y <= self.ymax
    }

    /// Grow every side by `amount`.
    pub fn expanded(&self, amount: f32) -> Self {
        Self {
            xmin: self.xmin - amount,
            xmax: self.xmax + amount,
            ymin: self.ymin - amount,
            ymax: self.ymax + amount,
        }
    }

    pub fn width(&self) -> f32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f32 {
        self.ymax - self.ymin
    }
}

/// Integer rectangle with exclusive max, used for pixel ranges and dirty regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IRect {
    pub xmin: i32,
    pub xmax: i32,
    pub ymin: i32,
    pub ymax: i32,
}

impl IRect {
    /// Rectangle that any union expands.
    pub fn empty() -> Self {
        Self {
            xmin: i32::MAX,
            xmax: i32::MIN,
            ymin: i32::MAX,
            ymax: i32::MIN,
        }
    }

    /// True when the rectangle covers at least one pixel.
    pub fn is_valid(&self) -> bool {
        self.xmin < self.xmax && self.ymin < self.ymax
    }

    pub fn union(&mut self, other: &IRect) {
        self.xmin = self.xmin.min(other.xmin);
        self.xmax = self.xmax.max(other.xmax);
        self.ymin = self.ymin.min(other.ymin);
        self.ymax = self.ymax.max(other.ymax);
    }
}

/// Twice the signed area of a 2D triangle.
#[inline]
pub fn cross_tri_v2(v1: Vec2, v2: Vec2, v3: Vec2) -> f32 {
    (v1.x - v2.x) * (v2.y - v3.y) + (v1.y - v2.y) * (v3.x - v2.x)
}

/// Unsigned area of a 2D triangle.
#[inline]
pub fn area_tri_v2(v1: Vec2, v2: Vec2, v3: Vec2) -> f32 {
    (cross_tri_v2(v1, v2, v3) * 0.5).abs()
}

/// Which side of the line `l1 -> l2` the point lies on (sign only is meaningful).
#[inline]
pub fn line_point_side_v2(l1: Vec2, l2: Vec2, pt: Vec2) -> f32 {
    (l1.x - pt.x) * (l2.y - pt.y) - (l2.x - pt.x) * (l1.y - pt.y)
}

/// Factor of the projection of `p` onto the line `l1 -> l2` (0 at l1, 1 at l2).
#[inline]
pub fn line_point_factor_v2(p: Vec2, l1: Vec2, l2: Vec2) -> f32 {
    let u = l2 - l1;
    let h = p - l1;
    let dot = u.length_squared();
    if dot > 0.0 { u.dot(h) / dot } else { 0.0 }
}

/// Squared distance from `p` to the infinite line through `l1` and `l2`.
pub fn dist_squared_to_line_v2(p: Vec2, l1: Vec2, l2: Vec2) -> f32 {
    let lambda = line_point_factor_v2(p, l1, l2);
    let closest = l1 + (l2 - l1) * lambda;
    p.distance_squared(closest)
}

/// Barycentric weights of `co` in the 2D triangle, falling back to 1/3 each
/// when the triangle has no area.
pub fn barycentric_weights_v2(v1: Vec2, v2: Vec2, v3: Vec2, co: Vec2) -> Vec3 {
    let w = Vec3::new(
        cross_tri_v2(v2, v3, co),
        cross_tri_v2(v3, v1, co),
        cross_tri_v2(v1, v2, co),
    );
    normalize_weights(w)
}

/// Perspective corrected barycentric weights: each weight is divided by its
/// vertex `w` before normalizing.
pub fn barycentric_weights_v2_persp(v1: Vec4, v2: Vec4, v3: Vec4, co: Vec2) -> Vec3 {
    let w = Vec3::new(
        cross_tri_v2(v2.xy(), v3.xy(), co) / v1.w,
        cross_tri_v2(v3.xy(), v1.xy(), co) / v2.w,
        cross_tri_v2(v1.xy(), v2.xy(), co) / v3.w,
    );
    normalize_weights(w)
}

/// Scale weights to sum to one, or return equal weights when the sum is zero.
#[inline]
pub fn normalize_weights(w: Vec3) -> Vec3 {
    let total = w.x + w.y + w.z;
    if total != 0.0 && total.is_finite() {
        w / total
    } else {
        Vec3::splat(1.0 / 3.0)
    }
}

/// Point in triangle test accepting either winding.
///
/// Returns 1 for a clockwise hit, -1 for counter-clockwise and 0 when outside.
pub fn isect_point_tri_v2(pt: Vec2, v1: Vec2, v2: Vec2, v3: Vec2) -> i32 {
    let side12 = line_point_side_v2(v1, v2, pt);
    let side23 = line_point_side_v2(v2, v3, pt);
    let side31 = line_point_side_v2(v3, v1, pt);
    if side12 >= 0.0 && side23 >= 0.0 && side31 >= 0.0 {
        1
    } else if side12 <= 0.0 && side23 <= 0.0 && side31 <= 0.0 {
        -1
    } else {
        0
    }
}

/// Point in quad test accepting either winding.
pub fn isect_point_quad_v2(pt: Vec2, v1: Vec2, v2: Vec2, v3: Vec2, v4: Vec2) -> bool {
    let side12 = line_point_side_v2(v1, v2, pt);
    let side23 = line_point_side_v2(v2, v3, pt);
    let side34 = line_point_side_v2(v3, v4, pt);
    let side41 = line_point_side_v2(v4, v1, pt);
    (side12 >= 0.0 && side23 >= 0.0 && side34 >= 0.0 && side41 >= 0.0)
        || (side12 <= 0.0 && side23 <= 0.0 && side34 <= 0.0 && side41 <= 0.0)
}

/// Segment/segment test that also reports collinear segments as touching.
pub fn isect_seg_seg_v2(v1: Vec2, v2: Vec2, v3: Vec2, v4: Vec2) -> bool {
    let div = (v2.x - v1.x) * (v4.y - v3.y) - (v2.y - v1.y) * (v4.x - v3.x);
    if div == 0.0 {
        return true;
    }
    let lambda = ((v1.y - v3.y) * (v4.x - v3.x) - (v1.x - v3.x) * (v4.y - v3.y)) / div;
    let mu = ((v1.y - v3.y) * (v2.x - v1.x) - (v1.x - v3.x) * (v2.y - v1.y)) / div;
    (0.0..=1.0).contains(&lambda) && (0.0..=1.0).contains(&mu)
}

/// Orientation based segment crossing test (no collinear handling).
pub fn isect_seg_seg_v2_simple(v1: Vec2, v2: Vec2, v3: Vec2, v4: Vec2) -> bool {
    fn ccw(a: Vec2, b: Vec2, c: Vec2) -> bool {
        (c.y - a.y) * (b.x - a.x) > (b.y - a.y) * (c.x - a.x)
    }
    ccw(v1, v3, v4) != ccw(v2, v3, v4) && ccw(v1, v2, v3) != ccw(v1, v2, v4)
}

/// Intersection point of segments `v0-v1` and `v2-v3`, if any.
pub fn isect_seg_seg_v2_point(v0: Vec2, v1: Vec2, v2: Vec2, v3: Vec2) -> Option<Vec2> {
    const ENDPOINT_BIAS: f32 = 1e-6;
    let endpoint_min = -ENDPOINT_BIAS;
    let endpoint_max = 1.0 + ENDPOINT_BIAS;

    let s10 = v1 - v0;
    let s32 = v3 - v2;
    let s30 = v3 - v0;
    let d = s10.perp_dot(s32);

    if d != 0.0 {
        let u = s30.perp_dot(s32) / d;
        let v = s10.perp_dot(s30) / d;
        if (endpoint_min..=endpoint_max).contains(&u) && (endpoint_min..=endpoint_max).contains(&v)
        {
            let vi = v0 + s10 * u;
            // Re-check against the second segment, near zero `d` lets collinear
            // segments through.
            let v = s32.dot(vi - v2) / s32.dot(s32);
            if (endpoint_min..=endpoint_max).contains(&v) {
                return Some(vi);
            }
        }
    }
    None
}

/// Inverse bilinear interpolation: the `u` parameter of `st` within the quad
/// `st0 st1 st2 st3`.
pub fn resolve_quad_u_v2(st: Vec2, st0: Vec2, st1: Vec2, st2: Vec2, st3: Vec2) -> f32 {
    let (st, st0, st1, st2, st3) = (st.as_dvec2(), st0.as_dvec2(), st1.as_dvec2(), st2.as_dvec2(), st3.as_dvec2());
    let signed_area = (st0.x * st1.y - st0.y * st1.x)
        + (st1.x * st2.y - st1.y * st2.x)
        + (st2.x * st3.y - st2.y * st3.x)
        + (st3.x * st0.y - st3.y * st0.x);

    let a = (st0.x - st.x) * (st0.y - st3.y) - (st0.y - st.y) * (st0.x - st3.x);
    let b = 0.5
        * (((st0.x - st.x) * (st1.y - st2.y) - (st0.y - st.y) * (st1.x - st2.x))
            + ((st1.x - st.x) * (st0.y - st3.y) - (st1.y - st.y) * (st0.x - st3.x)));
    let c = (st1.x - st.x) * (st1.y - st2.y) - (st1.y - st.y) * (st1.x - st2.x);
    let denom = a - 2.0 * b + c;

    if denom.abs() < f64::EPSILON {
        let f_den = a - c;
        if f_den.abs() >= f64::EPSILON {
            return (a / f_den) as f32;
        }
        return 0.0;
    }

    let desc_sq = b * b - a * c;
    let desc = desc_sq.max(0.0).sqrt();
    let s = if signed_area > 0.0 { -1.0 } else { 1.0 };
    (((a - b) + s * desc) / denom) as f32
}

/// Interpolate a Vec2 attribute with barycentric weights.
#[inline]
pub fn interp_v2(a: Vec2, b: Vec2, c: Vec2, w: Vec3) -> Vec2 {
    a * w.x + b * w.y + c * w.z
}

/// Interpolate a Vec3 attribute with barycentric weights.
#[inline]
pub fn interp_v3(a: Vec3, b: Vec3, c: Vec3, w: Vec3) -> Vec3 {
    a * w.x + b * w.y + c * w.z
}

/// Angle in radians between two vectors, safe for non-normalized input.
pub fn angle_v2v2(a: Vec2, b: Vec2) -> f32 {
    let len = (a.length_squared() * b.length_squared()).sqrt();
    if len <= 0.0 {
        return 0.0;
    }
    (a.dot(b) / len).clamp(-1.0, 1.0).acos()
}

/// `acos` clamped to the valid domain.
#[inline]
pub fn safe_acos(x: f32) -> f32 {
    x.clamp(-1.0, 1.0).acos()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_barycentric_weights_at_vertices() {
        let (a, b, c) = (Vec2::ZERO, Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0));
        let w = barycentric_weights_v2(a, b, c, a);
        assert!((w - Vec3::X).length() < 1e-6);
        let w = barycentric_weights_v2(a, b, c, Vec2::new(0.25, 0.25));
        assert!((w.x - 0.5).abs() < 1e-6);
        assert!((w.y - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_barycentric_degenerate_falls_back() {
        let p = Vec2::new(1.0, 1.0);
        let w = barycentric_weights_v2(p, p, p, Vec2::ZERO);
        assert_eq!(w, Vec3::splat(1.0 / 3.0));
    }

    #[test]
    fn test_persp_weights_match_affine_when_w_equal() {
        let (a, b, c) = (
            Vec4::new(0.0, 0.0, 0.0, 2.0),
            Vec4::new(4.0, 0.0, 0.0, 2.0),
            Vec4::new(0.0, 4.0, 0.0, 2.0),
        );
        let p = Vec2::new(1.0, 1.0);
        let affine = barycentric_weights_v2(a.xy(), b.xy(), c.xy(), p);
        let persp = barycentric_weights_v2_persp(a, b, c, p);
        assert!((affine - persp).length() < 1e-6);
    }

    #[test]
    fn test_point_in_triangle_both_windings() {
        let (a, b, c) = (Vec2::ZERO, Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0));
        let p = Vec2::new(0.2, 0.2);
        assert_ne!(isect_point_tri_v2(p, a, b, c), 0);
        assert_ne!(isect_point_tri_v2(p, a, c, b), 0);
        assert_eq!(isect_point_tri_v2(Vec2::new(1.0, 1.0), a, b, c), 0);
    }

    #[test]
    fn test_segment_intersection_point() {
        let p = isect_seg_seg_v2_point(
            Vec2::new(0.0, 0.0),
            Vec2::new(2.0, 2.0),
            Vec2::new(0.0, 2.0),
            Vec2::new(2.0, 0.0),
        )
        .unwrap();
        assert!((p - Vec2::ONE).length() < 1e-6);
        assert!(
            isect_seg_seg_v2_point(Vec2::ZERO, Vec2::X, Vec2::new(0.0, 1.0), Vec2::new(1.0, 1.0))
                .is_none()
        );
    }

    #[test]
    fn test_collinear_segments_touch() {
        assert!(isect_seg_seg_v2(Vec2::ZERO, Vec2::X, Vec2::new(2.0, 0.0), Vec2::new(3.0, 0.0)));
    }

    #[test]
    fn test_resolve_quad_u_unit_square() {
        let u = resolve_quad_u_v2(
            Vec2::new(0.25, 0.5),
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        );
        assert!((u - 0.25).abs() < 1e-5);
    }

    #[test]
    fn test_line_point_factor() {
        let f = line_point_factor_v2(Vec2::new(0.5, 3.0), Vec2::ZERO, Vec2::new(2.0, 0.0));
        assert!((f - 0.25).abs() < 1e-6);
        assert_eq!(line_point_factor_v2(Vec2::ONE, Vec2::ZERO, Vec2::ZERO), 0.0);
    }
}
