//! Screen-space bucket grid
//!
//! The projected mesh bounds are split into a grid of rectangles sized from
//! the brush diameter. Each bucket lists the triangles that overlap it and,
//! once a stroke first reaches it, the paint pixels those triangles cover
//! inside it. Buckets are the unit of work handed to the worker pool.

use std::sync::OnceLock;

use glam::Vec2;

use crate::constants::{BUCKET_BRUSH_DIV, BUCKET_RECT_MAX, BUCKET_RECT_MIN};
use crate::geometry::{Rect, isect_point_tri_v2, isect_seg_seg_v2};
use crate::raster::PaintPixel;

/// Half-open range of bucket columns and rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BucketRange {
    pub min: [i32; 2],
    pub max: [i32; 2],
}

impl BucketRange {
    /// True when the range spans no bucket on some axis
    pub fn is_empty(&self) -> bool {
        self.min[0] == self.max[0] || self.min[1] == self.max[1]
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.min[0] && x < self.max[0] && y >= self.min[1] && y < self.max[1]
    }
}

/// One grid cell
#[derive(Debug, Default)]
pub struct Bucket {
    /// Triangles overlapping this bucket
    pub faces: Vec<u32>,
    /// Paint pixels, built by the first worker to reach the bucket
    pub pixels: OnceLock<Vec<PaintPixel>>,
}

impl Bucket {
    pub fn is_initialized(&self) -> bool {
        self.pixels.get().is_some()
    }
}

#[derive(Debug)]
pub struct BucketGrid {
    pub screen_min: Vec2,
    pub screen_max: Vec2,
    pub buckets_x: i32,
    pub buckets_y: i32,
    /// The brush asked for more buckets than the grid allows
    pub was_clamped: bool,
    buckets: Vec<Bucket>,
}

impl BucketGrid {
    /// Size the grid so a bucket edge is a quarter of the brush diameter.
    ///
    /// # Arguments
    /// * `screen_min`, `screen_max` - Projected mesh bounds
    /// * `diameter` - Brush diameter in pixels
    ///
    /// Bounds with a zero, negative or non-finite extent give an empty grid
    /// with no buckets, as does a non-positive diameter.
    pub fn new(screen_min: Vec2, screen_max: Vec2, diameter: f32) -> Self {
        let extent = screen_max - screen_min;
        let usable = extent.is_finite() && extent.x > 0.0 && extent.y > 0.0;
        if !usable || !(diameter.is_finite() && diameter > 0.0) {
            return Self {
                screen_min,
                screen_max,
                buckets_x: 0,
                buckets_y: 0,
                was_clamped: false,
                buckets: Vec::new(),
            };
        }
        let bucket_size = diameter / BUCKET_BRUSH_DIV;
        let raw_x = (extent.x / bucket_size) as i32;
        let raw_y = (extent.y / bucket_size) as i32;
        let was_clamped = raw_x > BUCKET_RECT_MAX || raw_y > BUCKET_RECT_MAX;
        let buckets_x = raw_x.clamp(BUCKET_RECT_MIN, BUCKET_RECT_MAX);
        let buckets_y = raw_y.clamp(BUCKET_RECT_MIN, BUCKET_RECT_MAX);

        let count = (buckets_x * buckets_y) as usize;
        let mut buckets = Vec::with_capacity(count);
        buckets.resize_with(count, Bucket::default);

        Self {
            screen_min,
            screen_max,
            buckets_x,
            buckets_y,
            was_clamped,
            buckets,
        }
    }

    #[inline]
    pub fn screen_width(&self) -> f32 {
        self.screen_max.x - self.screen_min.x
    }

    #[inline]
    pub fn screen_height(&self) -> f32 {
        self.screen_max.y - self.screen_min.y
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    #[inline]
    pub fn bucket(&self, index: usize) -> &Bucket {
        &self.buckets[index]
    }

    /// Column and row of a bucket index
    #[inline]
    pub fn bucket_xy(&self, index: usize) -> (i32, i32) {
        let y = index as i32 / self.buckets_x;
        (index as i32 - y * self.buckets_x, y)
    }

    /// Screen rectangle of a bucket
    pub fn bucket_bounds(&self, bucket_x: i32, bucket_y: i32) -> Rect {
        let step_x = self.screen_width() / self.buckets_x as f32;
        let step_y = self.screen_height() / self.buckets_y as f32;
        Rect::new(
            self.screen_min.x + bucket_x as f32 * step_x,
            self.screen_min.x + (bucket_x + 1) as f32 * step_x,
            self.screen_min.y + bucket_y as f32 * step_y,
            self.screen_min.y + (bucket_y + 1) as f32 * step_y,
        )
    }

    /// Buckets touched by a screen rectangle, clamped to the grid
    pub fn bounds_to_bucket_range(&self, min: Vec2, max: Vec2) -> BucketRange {
        if self.is_empty() {
            return self.full_range();
        }
        // Casts saturate, so points far off the grid clamp to its edges
        let fx = |v: f32| ((v - self.screen_min.x) / self.screen_width()) * self.buckets_x as f32;
        let fy = |v: f32| ((v - self.screen_min.y) / self.screen_height()) * self.buckets_y as f32;
        // The +0.5 truncates away while +1.5 rounds the max up by one bucket
        let lo_x = ((fx(min.x) as i32) as f32 + 0.5) as i32;
        let lo_y = ((fy(min.y) as i32) as f32 + 0.5) as i32;
        let hi_x = ((fx(max.x) as i32) as f32 + 1.5) as i32;
        let hi_y = ((fy(max.y) as i32) as f32 + 1.5) as i32;
        BucketRange {
            min: [lo_x.clamp(0, self.buckets_x), lo_y.clamp(0, self.buckets_y)],
            max: [hi_x.clamp(0, self.buckets_x), hi_y.clamp(0, self.buckets_y)],
        }
    }

    /// The whole grid
    pub fn full_range(&self) -> BucketRange {
        BucketRange {
            min: [0, 0],
            max: [self.buckets_x, self.buckets_y],
        }
    }

    /// Column and row of the bucket under a screen point, None off the grid
    #[inline]
    pub fn bucket_cell(&self, p: Vec2) -> Option<(i32, i32)> {
        if self.is_empty() {
            return None;
        }
        let fx = ((p.x - self.screen_min.x) / self.screen_width()) * self.buckets_x as f32;
        let fy = ((p.y - self.screen_min.y) / self.screen_height()) * self.buckets_y as f32;
        if !fx.is_finite() || !fy.is_finite() {
            return None;
        }
        let (x, y) = (fx as i32, fy as i32);
        if (0..self.buckets_x).contains(&x) && (0..self.buckets_y).contains(&y) {
            Some((x, y))
        } else {
            None
        }
    }

    /// Bucket index of a screen point, None off the grid
    #[inline]
    pub fn bucket_offset_safe(&self, p: Vec2) -> Option<usize> {
        self.bucket_cell(p).map(|(x, y)| (x + y * self.buckets_x) as usize)
    }

    /// Exact triangle/bucket overlap test in screen space
    pub fn face_intersects_bucket(&self, bucket_x: i32, bucket_y: i32, v: [Vec2; 3]) -> bool {
        let bounds = self.bucket_bounds(bucket_x, bucket_y);
        if v.iter().any(|&p| bounds.contains(p)) {
            return true;
        }

        let p1 = Vec2::new(bounds.xmin, bounds.ymin);
        let p2 = Vec2::new(bounds.xmin, bounds.ymax);
        let p3 = Vec2::new(bounds.xmax, bounds.ymax);
        let p4 = Vec2::new(bounds.xmax, bounds.ymin);
        let [v1, v2, v3] = v;

        if [p1, p2, p3, p4]
            .iter()
            .any(|&p| isect_point_tri_v2(p, v1, v2, v3) != 0)
        {
            return true;
        }

        // A crossing through v3-v1 always implies a second crossing
        [(p1, p2), (p2, p3), (p3, p4), (p4, p1)]
            .iter()
            .any(|&(a, b)| isect_seg_seg_v2(a, b, v1, v2) || isect_seg_seg_v2(a, b, v2, v3))
    }

    /// Add a triangle to every bucket it overlaps.
    ///
    /// Rows are scanned inside the triangle's bounding range; a row stops at
    /// the first miss after a hit, and the scan stops at the first empty row
    /// after a hit row.
    ///
    /// # Returns
    /// Number of buckets the triangle was added to.
    pub fn assign_face(&mut self, tri: u32, v: [Vec2; 3]) -> usize {
        let min = v[0].min(v[1]).min(v[2]);
        let max = v[0].max(v[1]).max(v[2]);
        let range = self.bounds_to_bucket_range(min, max);

        let mut added = 0;
        let mut has_isect = false;
        for bucket_y in range.min[1]..range.max[1] {
            let mut has_x_isect = false;
            for bucket_x in range.min[0]..range.max[0] {
                if self.face_intersects_bucket(bucket_x, bucket_y, v) {
                    let index = (bucket_x + bucket_y * self.buckets_x) as usize;
                    self.buckets[index].faces.push(tri);
                    added += 1;
                    has_x_isect = true;
                    has_isect = true;
                } else if has_x_isect {
                    break;
                }
            }
            if !has_x_isect && has_isect {
                break;
            }
        }
        added
    }
}

/// Does a circle reach a rectangle?
///
/// The circle's bounds are known to overlap the rectangle already, so only
/// the corner regions need a distance test.
pub fn isect_circle(centre: Vec2, radius_sq: f32, bounds: &Rect) -> bool {
    if (bounds.xmin <= centre.x && bounds.xmax >= centre.x)
        || (bounds.ymin <= centre.y && bounds.ymax >= centre.y)
    {
        return true;
    }

    let corner_x = if centre.x < bounds.xmin {
        bounds.xmin
    } else if centre.x > bounds.xmax {
        bounds.xmax
    } else {
        return false;
    };
    let corner_y = if centre.y < bounds.ymin {
        bounds.ymin
    } else if centre.y > bounds.ymax {
        bounds.ymax
    } else {
        return false;
    };
    centre.distance_squared(Vec2::new(corner_x, corner_y)) < radius_sq
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> BucketGrid {
        // 100 / (16 / 4) = 25 buckets per axis
        BucketGrid::new(Vec2::ZERO, Vec2::splat(100.0), 16.0)
    }

    #[test]
    fn test_grid_dimensions() {
        let grid = grid();
        assert_eq!(grid.buckets_x, 25);
        assert_eq!(grid.len(), 625);
        assert!(!grid.was_clamped);
    }

    #[test]
    fn test_grid_clamps() {
        let tiny = BucketGrid::new(Vec2::ZERO, Vec2::splat(10.0), 64.0);
        assert_eq!(tiny.buckets_x, BUCKET_RECT_MIN);
        assert!(!tiny.was_clamped);
        let huge = BucketGrid::new(Vec2::ZERO, Vec2::splat(4000.0), 4.0);
        assert_eq!(huge.buckets_x, BUCKET_RECT_MAX);
        assert!(huge.was_clamped);
    }

    #[test]
    fn test_bucket_bounds_tile_screen() {
        let grid = grid();
        let first = grid.bucket_bounds(0, 0);
        assert_eq!(first, Rect::new(0.0, 4.0, 0.0, 4.0));
        let last = grid.bucket_bounds(24, 24);
        assert!((last.xmax - 100.0).abs() < 1e-4);
    }

    #[test]
    fn test_bucket_range_rounds_max_up() {
        let grid = grid();
        let range = grid.bounds_to_bucket_range(Vec2::new(5.0, 5.0), Vec2::new(9.0, 9.0));
        assert_eq!(range.min, [1, 1]);
        assert_eq!(range.max, [3, 3]);
        let outside = grid.bounds_to_bucket_range(Vec2::splat(-50.0), Vec2::splat(-40.0));
        assert!(outside.is_empty());
    }

    #[test]
    fn test_bucket_offset_safe() {
        let grid = grid();
        assert_eq!(grid.bucket_offset_safe(Vec2::new(6.0, 1.0)), Some(1));
        assert_eq!(grid.bucket_offset_safe(Vec2::new(1.0, 6.0)), Some(25));
        assert_eq!(grid.bucket_offset_safe(Vec2::new(50.0, 150.0)), None);
    }

    #[test]
    fn test_bucket_offset_checks_each_axis() {
        let grid = grid();
        // Past the right edge but a row above the bottom: no wrap to the next row
        assert_eq!(grid.bucket_offset_safe(Vec2::new(101.0, 6.0)), None);
        assert_eq!(grid.bucket_cell(Vec2::new(99.0, 6.0)), Some((24, 1)));
        assert_eq!(grid.bucket_offset_safe(Vec2::new(1.0e30, -1.0e30)), None);
        assert_eq!(grid.bucket_offset_safe(Vec2::new(f32::MAX, 50.0)), None);
        assert_eq!(grid.bucket_offset_safe(Vec2::new(f32::NAN, 50.0)), None);
        assert_eq!(grid.bucket_offset_safe(Vec2::new(50.0, f32::INFINITY)), None);
    }

    #[test]
    fn test_degenerate_bounds_give_empty_grid() {
        let flat = BucketGrid::new(Vec2::new(10.0, 10.0), Vec2::new(10.0, 40.0), 16.0);
        assert!(flat.is_empty());
        assert_eq!((flat.buckets_x, flat.buckets_y), (0, 0));
        assert!(!flat.was_clamped);
        assert_eq!(flat.bucket_offset_safe(Vec2::new(10.0, 20.0)), None);
        assert!(flat.bounds_to_bucket_range(Vec2::ZERO, Vec2::splat(100.0)).is_empty());
        assert!(flat.full_range().is_empty());

        let unbounded = BucketGrid::new(Vec2::ZERO, Vec2::new(f32::INFINITY, 10.0), 16.0);
        assert!(unbounded.is_empty());
        let inverted = BucketGrid::new(Vec2::splat(50.0), Vec2::ZERO, 16.0);
        assert!(inverted.is_empty());
        let nan = BucketGrid::new(Vec2::ZERO, Vec2::new(f32::NAN, 10.0), 16.0);
        assert!(nan.is_empty());
        let no_brush = BucketGrid::new(Vec2::ZERO, Vec2::splat(100.0), 0.0);
        assert!(no_brush.is_empty());

        // Faces assigned to an empty grid land nowhere
        let mut grid = flat;
        assert_eq!(grid.assign_face(0, [Vec2::ZERO, Vec2::X, Vec2::Y]), 0);
    }

    #[test]
    fn test_range_of_far_bounds_clamps() {
        let grid = grid();
        let range = grid.bounds_to_bucket_range(Vec2::splat(-1.0e30), Vec2::splat(f32::MAX));
        assert_eq!(range, grid.full_range());
        let nan = grid.bounds_to_bucket_range(Vec2::splat(f32::NAN), Vec2::splat(f32::NAN));
        assert!(nan.max[0] <= grid.buckets_x && nan.max[1] <= grid.buckets_y);
    }

    #[test]
    fn test_isect_circle_corner() {
        let bounds = Rect::new(10.0, 20.0, 10.0, 20.0);
        assert!(isect_circle(Vec2::new(15.0, 0.0), 1.0, &bounds));
        assert!(isect_circle(Vec2::new(8.0, 8.0), 9.0, &bounds));
        assert!(!isect_circle(Vec2::new(5.0, 5.0), 9.0, &bounds));
    }

    #[test]
    fn test_face_footprint_fully_covered() {
        let triangles = [
            [Vec2::new(3.0, 3.0), Vec2::new(90.0, 12.0), Vec2::new(40.0, 80.0)],
            [Vec2::new(50.0, 50.0), Vec2::new(51.0, 50.5), Vec2::new(50.2, 51.3)],
            [Vec2::new(0.5, 99.0), Vec2::new(99.0, 98.0), Vec2::new(60.0, 0.5)],
            // Thin sliver across many buckets
            [Vec2::new(1.0, 1.0), Vec2::new(98.0, 97.0), Vec2::new(98.5, 98.0)],
        ];
        for (tri, v) in triangles.iter().enumerate() {
            let mut grid = grid();
            assert!(grid.assign_face(tri as u32, *v) > 0);
            // Every sample inside the triangle lands in a bucket listing it
            for sy in 0..200 {
                for sx in 0..200 {
                    let p = Vec2::new(sx as f32 * 0.5 + 0.25, sy as f32 * 0.5 + 0.25);
                    if isect_point_tri_v2(p, v[0], v[1], v[2]) == 0 {
                        continue;
                    }
                    let index = grid.bucket_offset_safe(p).unwrap();
                    assert!(
                        grid.bucket(index).faces.contains(&(tri as u32)),
                        "triangle {tri} missing from bucket {index} at {p}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_face_not_added_to_distant_buckets() {
        let mut grid = grid();
        grid.assign_face(0, [Vec2::new(2.0, 2.0), Vec2::new(3.0, 2.0), Vec2::new(2.0, 3.0)]);
        let with_face = (0..grid.len()).filter(|&i| !grid.bucket(i).faces.is_empty()).count();
        assert_eq!(with_face, 1);
    }
}
