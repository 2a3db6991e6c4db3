//! Triangle/bucket clipping in screen space, mapped back to UV space
//!
//! A screen-space triangle is clipped against a bucket rectangle and the
//! resulting convex polygon is returned as UV coordinates, ready for pixel
//! scanning. Three cases are handled:
//! - the triangle lies inside the bucket: its UVs are returned directly
//! - the bucket lies inside the triangle: the bucket corners are mapped
//!   through barycentric weights
//! - partial overlap: corners, vertices and edge crossings are collected,
//!   sorted by angle around their centre and de-duplicated
//!
//! Nearly collinear triangles take a separate edge clipping path and fall
//! back to the raw triangle UVs rather than being dropped.

use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};

use crate::constants::{GEOM_TOLERANCE, PIXEL_TOLERANCE};
use crate::geometry::{
    IRect, Rect, area_tri_v2, barycentric_weights_v2, barycentric_weights_v2_persp,
    dist_squared_to_line_v2, interp_v2, line_point_side_v2,
};

const ISECT_1: u8 = 1;
const ISECT_2: u8 = 1 << 1;
const ISECT_3: u8 = 1 << 2;
const ISECT_4: u8 = 1 << 3;
const ISECT_ALL3: u8 = ISECT_1 | ISECT_2 | ISECT_3;
const ISECT_ALL4: u8 = ISECT_ALL3 | ISECT_4;

/// X where the segment `p1 p2` crosses the horizontal line `y_level`
pub fn line_isect_y(p1: Vec2, p2: Vec2, y_level: f32) -> Option<f32> {
    if y_level == p1.y {
        return Some(p1.x);
    }
    if y_level == p2.y {
        return Some(p2.x);
    }
    let y_diff = (p1.y - p2.y).abs();
    if y_diff < 0.000_001 {
        return Some((p1.x + p2.x) * 0.5);
    }
    if p1.y > y_level && p2.y < y_level {
        return Some((p2.x * (p1.y - y_level) + p1.x * (y_level - p2.y)) / y_diff);
    }
    if p1.y < y_level && p2.y > y_level {
        return Some((p2.x * (y_level - p1.y) + p1.x * (p2.y - y_level)) / y_diff);
    }
    None
}

/// Y where the segment `p1 p2` crosses the vertical line `x_level`
pub fn line_isect_x(p1: Vec2, p2: Vec2, x_level: f32) -> Option<f32> {
    if x_level == p1.x {
        return Some(p1.y);
    }
    if x_level == p2.x {
        return Some(p2.y);
    }
    let x_diff = (p1.x - p2.x).abs();
    if x_diff < 0.000_001 {
        return Some((p1.y + p2.y) * 0.5);
    }
    if p1.x > x_level && p2.x < x_level {
        return Some((p2.y * (p1.x - x_level) + p1.y * (x_level - p2.x)) / x_diff);
    }
    if p1.x < x_level && p2.x > x_level {
        return Some((p2.y * (x_level - p1.x) + p1.y * (p2.x - x_level)) / x_diff);
    }
    None
}

/// Clip a segment to `rect`, accepting crossings that fall within `clip_rect`.
///
/// # Returns
/// Both clipped end points, or None when the segment misses the rectangle.
pub fn line_clip_rect(clip_rect: &Rect, rect: &Rect, l1: Vec2, l2: Vec2) -> Option<(Vec2, Vec2)> {
    // Horizontal
    if (l1.y - l2.y).abs() < PIXEL_TOLERANCE {
        if l1.y < rect.ymin || l1.y > rect.ymax {
            return None;
        }
        if (l1.x < rect.xmin && l2.x < rect.xmin) || (l1.x > rect.xmax && l2.x > rect.xmax) {
            return None;
        }
        if (l1.x - l2.x).abs() < PIXEL_TOLERANCE {
            return rect.contains(l1).then_some((l1, l2));
        }
        let c1 = Vec2::new(l1.x.clamp(rect.xmin, rect.xmax), l1.y);
        let c2 = Vec2::new(l2.x.clamp(rect.xmin, rect.xmax), l2.y);
        return Some((c1, c2));
    }
    // Vertical
    if (l1.x - l2.x).abs() < PIXEL_TOLERANCE {
        if l1.x < rect.xmin || l1.x > rect.xmax {
            return None;
        }
        if (l1.y < rect.ymin && l2.y < rect.ymin) || (l1.y > rect.ymax && l2.y > rect.ymax) {
            return None;
        }
        if (l1.y - l2.y).abs() < PIXEL_TOLERANCE {
            return rect.contains(l1).then_some((l1, l2));
        }
        let c1 = Vec2::new(l1.x, l1.y.clamp(rect.ymin, rect.ymax));
        let c2 = Vec2::new(l2.x, l2.y.clamp(rect.ymin, rect.ymax));
        return Some((c1, c2));
    }

    let mut c1 = rect.contains(l1).then_some(l1);
    let mut c2 = rect.contains(l2).then_some(l2);
    if let (Some(a), Some(b)) = (c1, c2) {
        return Some((a, b));
    }

    let in_x = |v: f32| v >= clip_rect.xmin && v <= clip_rect.xmax;
    let in_y = |v: f32| v >= clip_rect.ymin && v <= clip_rect.ymax;

    // The end point on the outer side of each edge is replaced
    if let Some(x) = line_isect_y(l1, l2, rect.ymin).filter(|&x| in_x(x)) {
        let p = Vec2::new(x, rect.ymin);
        if l1.y < l2.y { c1 = Some(p) } else { c2 = Some(p) }
    }
    if let (Some(a), Some(b)) = (c1, c2) {
        return Some((a, b));
    }
    if let Some(x) = line_isect_y(l1, l2, rect.ymax).filter(|&x| in_x(x)) {
        let p = Vec2::new(x, rect.ymax);
        if l1.y > l2.y { c1 = Some(p) } else { c2 = Some(p) }
    }
    if let (Some(a), Some(b)) = (c1, c2) {
        return Some((a, b));
    }
    if let Some(y) = line_isect_x(l1, l2, rect.xmin).filter(|&y| in_y(y)) {
        let p = Vec2::new(rect.xmin, y);
        if l1.x < l2.x { c1 = Some(p) } else { c2 = Some(p) }
    }
    if let (Some(a), Some(b)) = (c1, c2) {
        return Some((a, b));
    }
    if let Some(y) = line_isect_x(l1, l2, rect.xmax).filter(|&y| in_y(y)) {
        let p = Vec2::new(rect.xmax, y);
        if l1.x > l2.x { c1 = Some(p) } else { c2 = Some(p) }
    }
    match (c1, c2) {
        (Some(a), Some(b)) => Some((a, b)),
        _ => None,
    }
}

/// UV position where the screen edge `l1 l2` first meets a side of `rect`.
///
/// Assumes one end point lies inside the rectangle.
fn line_rect_clip(rect: &Rect, l1: Vec4, l2: Vec4, uv1: Vec2, uv2: Vec2, is_ortho: bool) -> Option<Vec2> {
    let mut min = f32::MAX;
    let xlen = l2.x - l1.x;
    let ylen = l2.y - l1.y;

    // Lengths are in pixels
    if xlen > 0.1 {
        if (l1.x - rect.xmin) * (l2.x - rect.xmin) <= 0.0 {
            min = min.min((rect.xmin - l1.x) / xlen);
        } else if (l1.x - rect.xmax) * (l2.x - rect.xmax) < 0.0 {
            min = min.min((rect.xmax - l1.x) / xlen);
        }
    }
    if ylen > 0.1 {
        if (l1.y - rect.ymin) * (l2.y - rect.ymin) <= 0.0 {
            min = min.min((rect.ymin - l1.y) / ylen);
        } else if (l1.y - rect.ymax) * (l2.y - rect.ymax) < 0.0 {
            min = min.min((rect.ymax - l1.y) / ylen);
        }
    }
    if min == f32::MAX {
        return None;
    }

    let w = if is_ortho { 1.0 } else { l1.w + min * (l2.w - l1.w) };
    Some(uv1 + (uv2 - uv1) * (min / w))
}

/// Map the four bucket corners into UV space through the triangle's weights.
///
/// Corners are written counter-clockwise, or reversed when `flip` is set.
pub fn rect_to_uv_space(bucket: &Rect, v: [Vec4; 3], uv: [Vec2; 3], flip: bool, is_ortho: bool) -> [Vec2; 4] {
    let corner_uv = |p: Vec2| {
        let w = if is_ortho {
            barycentric_weights_v2(v[0].xy(), v[1].xy(), v[2].xy(), p)
        } else {
            barycentric_weights_v2_persp(v[0], v[1], v[2], p)
        };
        interp_v2(uv[0], uv[1], uv[2], w)
    };
    let corners = [
        Vec2::new(bucket.xmax, bucket.ymin),
        Vec2::new(bucket.xmax, bucket.ymax),
        Vec2::new(bucket.xmin, bucket.ymax),
        Vec2::new(bucket.xmin, bucket.ymin),
    ];
    let mut out = corners.map(corner_uv);
    if flip {
        out.reverse();
    }
    out
}

/// Point in triangle with a relative area tolerance (`limit` slightly over 1)
fn isect_point_tri_limit(pt: Vec2, v1: Vec2, v2: Vec2, v3: Vec2, limit: f32) -> bool {
    (area_tri_v2(pt, v1, v2) + area_tri_v2(pt, v2, v3) + area_tri_v2(pt, v3, v1))
        / area_tri_v2(v1, v2, v3)
        < limit
}

/// Clip a screen-space triangle to a bucket, returning the polygon in UV space.
///
/// # Arguments
/// * `clip_rect` - Bucket bounds grown by the pixel tolerance, used to accept edge crossings
/// * `bucket` - Bucket bounds
/// * `v` - Screen coordinates of the triangle
/// * `uv` - UV coordinates of the triangle
/// * `cull` - Drop nearly collinear triangles instead of falling back
///
/// # Returns
/// Zero or three to eight UV points. The polygon winding matches the image
/// winding used by [`isect_poly`].
pub fn clip_face_to_bucket(
    is_ortho: bool,
    is_flip_object: bool,
    clip_rect: &Rect,
    bucket: &Rect,
    v: [Vec4; 3],
    uv: [Vec2; 3],
    cull: bool,
) -> Vec<Vec2> {
    let [s1, s2, s3] = [v[0].xy(), v[1].xy(), v[2].xy()];

    let collinear = dist_squared_to_line_v2(s1, s2, s3)
        .min(dist_squared_to_line_v2(s2, s3, s1))
        .min(dist_squared_to_line_v2(s3, s1, s2))
        < PIXEL_TOLERANCE;

    let mut inside_bucket = 0u8;
    for (i, p) in [s1, s2, s3].iter().enumerate() {
        if bucket.contains(*p) {
            inside_bucket |= 1 << i;
        }
    }

    if inside_bucket == ISECT_ALL3 {
        let flip = ((line_point_side_v2(s1, s2, s3) > 0.0) != is_flip_object)
            != (line_point_side_v2(uv[0], uv[1], uv[2]) > 0.0);
        return if flip {
            vec![uv[2], uv[1], uv[0]]
        } else {
            uv.to_vec()
        };
    }

    if collinear {
        return clip_collinear(bucket, v, uv, inside_bucket, is_ortho, cull);
    }

    let corners = [
        Vec2::new(bucket.xmax, bucket.ymin),
        Vec2::new(bucket.xmax, bucket.ymax),
        Vec2::new(bucket.xmin, bucket.ymax),
        Vec2::new(bucket.xmin, bucket.ymin),
    ];
    let mut inside_face = 0u8;
    for (i, corner) in corners.iter().enumerate() {
        if isect_point_tri_limit(*corner, s1, s2, s3, 1.0 + GEOM_TOLERANCE) {
            inside_face |= 1 << i;
        }
    }

    let flip = (line_point_side_v2(s1, s2, s3) > 0.0) != (line_point_side_v2(uv[0], uv[1], uv[2]) > 0.0);

    if inside_face == ISECT_ALL4 {
        return rect_to_uv_space(bucket, v, uv, flip, is_ortho).to_vec();
    }

    // Partial overlap: gather every point of the clipped convex hull
    let mut points: Vec<Vec2> = Vec::with_capacity(10);
    for (i, corner) in corners.iter().enumerate() {
        if inside_face & (1 << i) != 0 {
            points.push(*corner);
        }
    }
    for (i, p) in [s1, s2, s3].iter().enumerate() {
        if inside_bucket & (1 << i) != 0 {
            points.push(*p);
        }
    }
    for (a, b) in [(0usize, 1usize), (1, 2), (2, 0)] {
        let (bit_a, bit_b) = (1u8 << a, 1u8 << b);
        if inside_bucket & (bit_a | bit_b) == (bit_a | bit_b) {
            continue;
        }
        let sv = [s1, s2, s3];
        if let Some((c1, c2)) = line_clip_rect(clip_rect, bucket, sv[a], sv[b]) {
            if inside_bucket & bit_a == 0 {
                points.push(c1);
            }
            if inside_bucket & bit_b == 0 {
                points.push(c2);
            }
        }
    }

    if points.len() < 3 {
        return Vec::new();
    }

    let cent = points.iter().copied().sum::<Vec2>() / points.len() as f32;
    let up = Vec2::new(cent.x, cent.y + 1.0);
    let mut sorted: Vec<(f32, Vec2)> = points
        .into_iter()
        .map(|p| {
            let d = p - cent;
            (up.perp_dot(d).atan2(up.dot(d)), p)
        })
        .collect();
    if flip {
        sorted.sort_by(|a, b| b.0.total_cmp(&a.0));
    } else {
        sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
    }
    let mut points: Vec<Vec2> = sorted.into_iter().map(|(_, p)| p).collect();

    remove_doubles(&mut points);
    if points.len() < 3 {
        return Vec::new();
    }

    points
        .into_iter()
        .map(|p| {
            let w = if is_ortho {
                barycentric_weights_v2(s1, s2, s3, p)
            } else {
                barycentric_weights_v2_persp(v[0], v[1], v[2], p)
            };
            interp_v2(uv[0], uv[1], uv[2], w)
        })
        .collect()
}

/// Drop consecutive (cyclic) points closer than the pixel tolerance
fn remove_doubles(points: &mut Vec<Vec2>) {
    let mut doubles = true;
    while doubles {
        doubles = false;
        let mut i = 0;
        while i < points.len() {
            let next = points[(i + 1) % points.len()];
            let d = (next - points[i]).abs();
            if d.x < PIXEL_TOLERANCE && d.y < PIXEL_TOLERANCE {
                points.remove(i);
                doubles = true;
                if points.len() < 3 {
                    return;
                }
            } else {
                i += 1;
            }
        }
    }
}

fn clip_collinear(
    bucket: &Rect,
    v: [Vec4; 3],
    uv: [Vec2; 3],
    inside_bucket: u8,
    is_ortho: bool,
    cull: bool,
) -> Vec<Vec2> {
    if cull {
        return Vec::new();
    }
    let mut out = Vec::with_capacity(6);
    for (a, b) in [(0usize, 1usize), (1, 2), (2, 0)] {
        let (bit_a, bit_b) = (1u8 << a, 1u8 << b);
        if inside_bucket & bit_a != 0 {
            out.push(uv[a]);
        }
        let flag = inside_bucket & (bit_a | bit_b);
        if flag != 0 && flag != (bit_a | bit_b) {
            if let Some(p) = line_rect_clip(bucket, v[a], v[b], uv[a], uv[b], is_ortho) {
                out.push(p);
            }
        }
    }
    if out.len() < 3 {
        // Most likely just outside the bucket through float precision
        return uv.to_vec();
    }
    out
}

/// Point inside a convex polygon wound the way the clipper emits it
pub fn isect_poly(pt: Vec2, uv: &[Vec2]) -> bool {
    let Some(&last) = uv.last() else {
        return false;
    };
    if line_point_side_v2(last, uv[0], pt) < 0.0 {
        return false;
    }
    uv.windows(2).all(|pair| line_point_side_v2(pair[0], pair[1], pt) >= 0.0)
}

/// Point inside a convex polygon of either winding
pub fn isect_poly_twoside(pt: Vec2, uv: &[Vec2]) -> bool {
    let Some(&last) = uv.last() else {
        return false;
    };
    let side = line_point_side_v2(last, uv[0], pt) > 0.0;
    uv.windows(2)
        .all(|pair| (line_point_side_v2(pair[0], pair[1], pt) > 0.0) == side)
}

/// Scale a triangle about its centroid
pub fn scale_tri(cos: [Vec3; 3], inset: f32) -> [Vec3; 3] {
    let cent = (cos[0] + cos[1] + cos[2]) * (1.0 / 3.0);
    cos.map(|co| (co - cent) * inset + cent)
}

/// Image pixel bounds of UV points (max exclusive), None when empty
pub fn pixel_bounds(uvs: &[Vec2], width: u32, height: u32) -> Option<IRect> {
    if uvs.is_empty() {
        return None;
    }
    let mut min = Vec2::splat(f32::MAX);
    let mut max = Vec2::splat(f32::MIN);
    for uv in uvs {
        min = min.min(*uv);
        max = max.max(*uv);
    }
    let bounds = IRect {
        xmin: (width as f32 * min.x) as i32,
        ymin: (height as f32 * min.y) as i32,
        xmax: (width as f32 * max.x) as i32 + 1,
        ymax: (height as f32 * max.y) as i32 + 1,
    };
    (bounds.xmin != bounds.xmax && bounds.ymin != bounds.ymax).then_some(bounds)
}
