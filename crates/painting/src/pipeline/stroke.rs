//! Painting one stroke step
//!
//! Every view paints the buckets under the brush. Workers claim buckets from
//! a shared cursor, rasterize a bucket the first time any stroke step reaches
//! it, and apply the brush operator to its paint pixels. Smear and soften
//! read neighbouring pixels, so their results are staged and committed only
//! after every worker has finished the pass.

use std::sync::atomic::{AtomicUsize, Ordering};

use glam::{Vec2, Vec3};
use projpaint_config::SampleInterpolation;
use tracing::debug;

use super::{
    PaintSession, ProjectionStroke, SharedPaintData, StrokeOutcome, StrokeSample, WorkerPool,
    raster_context,
};
use crate::blend::{OperatorContext, copy_original_alpha, operators};
use crate::brush::GradientMode;
use crate::bucket::{BucketRange, isect_circle};
use crate::constants::MASK_MAX;
use crate::geometry::interp_v3;
use crate::occlusion::{pick_color, pick_face};
use crate::raster::{PaintPixel, RasterContext, init_bucket};
use crate::surface::PixelValue;
use crate::tiles::{PartialRedraw, UndoTile};
use crate::types::{BlendMode, BrushKind, ProjectionSource};

/// A pixel value computed during the pass and written after it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StagedWrite {
    pub proj_image: u16,
    /// Index into the image buffer
    pub index: usize,
    /// Value before the stroke, for lock alpha
    pub orig: PixelValue,
    pub value: PixelValue,
}

/// Bucket indices handed out to workers, row by row
struct BucketCursor {
    next: AtomicUsize,
    end: usize,
    range: BucketRange,
    buckets_x: i32,
}

impl BucketCursor {
    fn new(range: BucketRange, buckets_x: i32) -> Self {
        let start = range.min[0] + range.min[1] * buckets_x;
        let end = range.max[0] + (range.max[1] - 1) * buckets_x;
        Self {
            next: AtomicUsize::new(start.max(0) as usize),
            end: end.max(0) as usize,
            range,
            buckets_x,
        }
    }

    /// Next bucket inside the range, None once the range is exhausted
    fn claim(&self, mut accept: impl FnMut(i32, i32) -> bool) -> Option<usize> {
        loop {
            let index = self.next.fetch_add(1, Ordering::Relaxed);
            if index >= self.end {
                return None;
            }
            let y = index as i32 / self.buckets_x;
            let x = index as i32 - y * self.buckets_x;
            if x >= self.range.min[0] && x < self.range.max[0] && accept(x, y) {
                return Some(index);
            }
        }
    }
}

/// What one worker produced during a pass
struct WorkerOutput {
    /// Dirty cells per projected image
    redraw: Vec<PartialRedraw>,
    staged: Vec<StagedWrite>,
}

/// One view's pass over its buckets
struct PaintPass<'a> {
    shared: &'a SharedPaintData,
    session: &'a PaintSession,
    ctx: RasterContext<'a>,
    ops: OperatorContext,
    lock_alpha: bool,
    sample: StrokeSample,
    cursor: BucketCursor,
}

impl PaintPass<'_> {
    fn run_worker(&self) -> WorkerOutput {
        let mut out = WorkerOutput {
            redraw: (0..self.shared.proj_images.len()).map(|_| PartialRedraw::new()).collect(),
            staged: Vec::new(),
        };
        let grid = &self.session.grid;
        let is_view = self.shared.source == ProjectionSource::View;
        let diameter = 2.0 * self.sample.radius;

        while let Some(index) = self.cursor.claim(|x, y| {
            !is_view || isect_circle(self.sample.pos, diameter * diameter, &grid.bucket_bounds(x, y))
        }) {
            let pixels = grid.bucket(index).pixels.get_or_init(|| init_bucket(&self.ctx, index));
            match self.shared.source {
                ProjectionSource::View => {
                    for p in pixels {
                        self.paint_brush_pixel(p, &mut out);
                    }
                }
                ProjectionSource::ViewFill => {
                    for p in pixels {
                        self.paint_fill_pixel(p, &mut out);
                    }
                }
                ProjectionSource::ImageCamera | ProjectionSource::ImageView => {
                    for p in pixels {
                        self.paint_reproject_pixel(p, &mut out);
                    }
                }
            }
        }
        out
    }

    fn undo_tile(&self, p: &PaintPixel) -> Option<&UndoTile> {
        self.shared.proj_images.get(p.proj_image as usize)?.undo.tile(p.tile as usize)
    }

    fn mark_painted(&self, p: &PaintPixel, tile: &UndoTile, out: &mut WorkerOutput) {
        tile.mark_valid();
        self.shared.proj_images[p.proj_image as usize].touch();
        out.redraw[p.proj_image as usize].expand(p.cell, p.x, p.y);
    }

    fn write(&self, p: &PaintPixel, orig: PixelValue, value: PixelValue) {
        let value = if self.lock_alpha { copy_original_alpha(value, orig) } else { value };
        self.shared.proj_images[p.proj_image as usize].buffer().write(p.index, value);
    }

    fn paint_brush_pixel(&self, p: &PaintPixel, out: &mut WorkerOutput) {
        let brush = &self.shared.brush;
        let radius = self.sample.radius;
        let dist_sq = p.screen.distance_squared(self.sample.pos);
        if dist_sq > radius * radius {
            return;
        }
        let falloff = brush.falloff.strength(dist_sq.sqrt(), radius);
        if falloff <= 0.0 {
            return;
        }
        let Some(tile) = self.undo_tile(p) else {
            return;
        };

        let mut custom = p.mask_factor();
        if let Some(texture) = &self.shared.mask_texture {
            custom *= texture.sample(p.screen.extend(0.0))[3].clamp(0.0, 1.0);
        }
        let texture_rgb = self.shared.color_texture.as_ref().map(|texture| {
            let co = if self.shared.world_coords { p.world } else { p.screen.extend(0.0) };
            let rgba = texture.sample(co);
            custom *= rgba[3];
            [rgba[0], rgba[1], rgba[2]]
        });

        let offset = p.tile_offset as usize;
        let mask = if self.ops.masking {
            let accum = tile.mask_accum(offset).unwrap_or(0);
            let value = operators::accumulated_mask(accum, brush.alpha * custom, falloff, brush.accumulate);
            if !tile.raise_mask(offset, value) {
                return;
            }
            value as f32 / MASK_MAX
        } else {
            brush.alpha * custom * falloff
        };
        if mask <= 0.0 {
            return;
        }

        self.mark_painted(p, tile, out);

        let buffer = self.shared.proj_images[p.proj_image as usize].buffer();
        let current = buffer.read(p.index);
        let orig = tile.original(offset);
        let painted = match self.shared.kind {
            BrushKind::Clone => p.clone.and_then(|sample| operators::clone(&self.ops, current, orig, sample, mask)),
            BrushKind::Smear => {
                let from = p.screen - (self.sample.pos - self.sample.last_pos);
                if let Some(picked) = self.pick(from) {
                    out.staged.push(StagedWrite {
                        proj_image: p.proj_image,
                        index: p.index,
                        orig,
                        value: operators::smear(current, picked, mask),
                    });
                }
                None
            }
            BrushKind::Soften => {
                if let Some(value) = self.soften(p, current, mask) {
                    out.staged.push(StagedWrite {
                        proj_image: p.proj_image,
                        index: p.index,
                        orig,
                        value,
                    });
                }
                None
            }
            BrushKind::Mask => Some(operators::stencil(&self.ops, current, orig, mask)),
            BrushKind::Draw | BrushKind::Fill => Some(operators::draw(
                &self.ops,
                current,
                orig,
                brush.color,
                texture_rgb,
                buffer.is_srgb(),
                mask,
                p.x as i32,
                p.y as i32,
            )),
        };
        if let Some(value) = painted {
            self.write(p, orig, value);
        }
    }

    fn pick(&self, pt: Vec2) -> Option<PixelValue> {
        pick_color(
            &self.ctx.view,
            &self.shared.targets,
            &self.shared.images,
            pt,
            SampleInterpolation::Linear,
        )
    }

    /// Kernel-weighted average of the surface around the pixel, then the
    /// soften operator. Taps that hit nothing carry no weight.
    fn soften(&self, p: &PaintPixel, current: PixelValue, mask: f32) -> Option<PixelValue> {
        let kernel = &self.shared.blur;
        let mut total = [0.0f32; 4];
        let mut weight_total = 0.0;
        for yk in 0..kernel.side {
            for xk in 0..kernel.side {
                let offset = Vec2::new(2.0 * xk as f32 - 1.0, 2.0 * yk as f32 - 1.0);
                let Some(picked) = self.pick(p.screen + offset) else {
                    continue;
                };
                let weight = kernel.weight(xk, yk);
                for (sum, c) in total.iter_mut().zip(picked.to_premul_float()) {
                    *sum += c * weight;
                }
                weight_total += weight;
            }
        }
        if weight_total == 0.0 {
            return None;
        }
        let blurred = total.map(|c| c / weight_total);
        operators::soften(&self.ops, current, blurred, mask)
    }

    fn paint_fill_pixel(&self, p: &PaintPixel, out: &mut WorkerOutput) {
        let Some(tile) = self.undo_tile(p) else {
            return;
        };
        let brush = &self.shared.brush;
        let mask = p.mask_factor() * brush.alpha;

        let color = match &brush.gradient {
            Some(gradient) => {
                let rel = p.screen - self.sample.last_pos;
                let tangent = self.sample.pos - self.sample.last_pos;
                let len_sq = tangent.length_squared();
                let f = if len_sq == 0.0 {
                    0.0
                } else {
                    match gradient.mode {
                        GradientMode::Linear => rel.dot(tangent) / len_sq,
                        GradientMode::Radial => rel.length() / len_sq.sqrt(),
                    }
                };
                let mut color = gradient.evaluate(f);
                color[3] *= mask;
                color
            }
            None => [brush.color[0], brush.color[1], brush.color[2], mask],
        };

        let orig = tile.original(p.tile_offset as usize);
        let buffer = self.shared.proj_images[p.proj_image as usize].buffer();
        let value = operators::fill(&self.ops, orig, color, buffer.is_srgb(), p.x as i32, p.y as i32);
        self.write(p, orig, value);
        self.mark_painted(p, tile, out);
    }

    fn paint_reproject_pixel(&self, p: &PaintPixel, out: &mut WorkerOutput) {
        let Some(source) = &self.shared.reproject_source else {
            return;
        };
        let Some(tile) = self.undo_tile(p) else {
            return;
        };
        let sample = source.sample_cubic_bspline(p.screen.x, p.screen.y);
        let orig = tile.original(p.tile_offset as usize);
        if let Some(value) = operators::reproject(orig, sample, p.mask_factor()) {
            self.shared.proj_images[p.proj_image as usize].buffer().write(p.index, value);
            self.mark_painted(p, tile, out);
        }
    }
}

/// Paint one view. Returns true when the pass left a dirty region.
pub(super) fn paint_session(
    shared: &SharedPaintData,
    session: &PaintSession,
    pool: &WorkerPool,
    ops: OperatorContext,
    lock_alpha: bool,
    sample: &StrokeSample,
) -> bool {
    let grid = &session.grid;
    if grid.is_empty() {
        return false;
    }
    let range = if shared.source == ProjectionSource::View {
        let r = Vec2::splat(sample.radius);
        let range = grid.bounds_to_bucket_range(sample.pos - r, sample.pos + r);
        if range.is_empty() {
            return false;
        }
        range
    } else {
        grid.full_range()
    };

    let pass = PaintPass {
        shared,
        session,
        ctx: raster_context(shared, session),
        ops,
        lock_alpha,
        sample: *sample,
        cursor: BucketCursor::new(range, grid.buckets_x),
    };
    let outputs = pool.run_workers(|_| pass.run_worker());

    // Every worker is done reading, staged values can land now
    let mut staged = 0;
    for write in outputs.iter().flat_map(|out| &out.staged) {
        let proj = &shared.proj_images[write.proj_image as usize];
        let value = if lock_alpha { copy_original_alpha(write.value, write.orig) } else { write.value };
        proj.buffer().write(write.index, value);
        staged += 1;
    }

    let mut touched = false;
    for out in &outputs {
        for (proj, redraw) in shared.proj_images.iter().zip(&out.redraw) {
            if redraw.is_dirty() {
                proj.merge_redraw(redraw);
                touched = true;
            }
        }
    }
    if staged > 0 {
        debug!("Committed {} staged pixel writes", staged);
    }
    touched
}

/// World position of the surface under the brush in one view
fn session_pivot(shared: &SharedPaintData, session: &PaintSession, pos: Vec2) -> Option<Vec3> {
    let (tri, w) = pick_face(&session.screen_view(&shared.mesh), pos)?;
    let [a, b, c] = shared.mesh.tri_positions(tri);
    Some(session.projector.obmat.transform_point3(interp_v3(a, b, c, w)))
}

impl ProjectionStroke {
    /// Paint one stroke step in every symmetry view.
    ///
    /// The eraser swaps the blend for erase alpha. Lock alpha keeps the
    /// original alpha of every written pixel, except for blends that edit
    /// alpha themselves.
    pub fn stroke_to(&mut self, sample: &StrokeSample) -> StrokeOutcome {
        let shared = &self.shared;
        let mut ops = shared.ops;
        if sample.eraser {
            ops.blend = BlendMode::EraseAlpha;
        }
        let lock_alpha = shared.brush.lock_alpha && !ops.blend.edits_alpha();

        let mut outcome = StrokeOutcome::default();
        let mut pivot_sum = Vec3::ZERO;
        let mut hits = 0;
        for session in &self.sessions {
            outcome.touched |= paint_session(shared, session, &self.pool, ops, lock_alpha, sample);
            if let Some(pivot) = session_pivot(shared, session, sample.pos) {
                pivot_sum += pivot;
                hits += 1;
            }
        }
        if hits > 0 {
            outcome.pivot = Some(pivot_sum / hits as f32);
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::super::StrokeRequest;
    use super::super::test_support::*;
    use std::f32::consts::FRAC_PI_2;

    use glam::Mat4;

    use super::*;
    use crate::brush::{FalloffCurve, Gradient};
    use crate::projection::ViewParams;
    use crate::surface::ImageBuffer;
    use crate::types::StrokeMode;

    fn begin(request: StrokeRequest) -> ProjectionStroke {
        ProjectionStroke::begin(request).unwrap()
    }

    fn red_brush(request: &mut StrokeRequest) {
        request.brush.color = [1.0, 0.0, 0.0];
        request.brush.falloff = FalloffCurve::Constant;
    }

    #[test]
    fn test_bucket_cursor_skips_columns_outside_range() {
        let range = BucketRange {
            min: [1, 1],
            max: [3, 3],
        };
        let cursor = BucketCursor::new(range, 4);
        let mut claimed = Vec::new();
        while let Some(index) = cursor.claim(|_, _| true) {
            claimed.push(index);
        }
        assert_eq!(claimed, vec![5, 6, 9, 10]);
    }

    #[test]
    fn test_draw_paints_under_brush_only() {
        let mut request = quad_request(ImageBuffer::new_byte(16, 16, [0, 0, 0, 255]));
        red_brush(&mut request);
        let canvas = canvas(&request);
        let mut stroke = begin(request);

        // Centre of the quad, radius covering about a quarter of it
        let outcome = stroke.stroke_to(&StrokeSample::dab(Vec2::new(32.0, 32.0), 4.0));
        assert!(outcome.touched);

        assert_eq!(canvas.get_pixel(8, 8), Some(PixelValue::Byte([255, 0, 0, 255])));
        assert_eq!(canvas.get_pixel(0, 0), Some(PixelValue::Byte([0, 0, 0, 255])));
        assert_eq!(canvas.get_pixel(15, 15), Some(PixelValue::Byte([0, 0, 0, 255])));
    }

    #[test]
    fn test_covering_dab_paints_exact_brush_colour() {
        let mut request = quad_request(ImageBuffer::new_byte(16, 16, [10, 200, 60, 255]));
        red_brush(&mut request);
        request.settings.normal_mask = false;
        let canvas = canvas(&request);
        let mut stroke = begin(request);

        // The quad spans 16..48 on screen, its corners are within 23px of the centre
        stroke.stroke_to(&StrokeSample::dab(Vec2::new(32.0, 32.0), 24.0));
        for y in 0..16 {
            for x in 0..16 {
                assert_eq!(canvas.get_pixel(x, y), Some(PixelValue::Byte([255, 0, 0, 255])));
            }
        }
    }

    #[test]
    fn test_single_thread_replay_is_identical() {
        let run = || {
            let buffer = ImageBuffer::new_byte(32, 32, [0, 0, 0, 255]);
            for x in 0..32 {
                buffer.set_pixel(x, 5, PixelValue::Byte([255, 255, 255, 255]));
            }
            let mut request = quad_request(buffer);
            request.settings.seam_bleed = 2;
            request.brush.color = [0.2, 0.6, 0.9];
            request.brush.alpha = 0.7;
            let canvas = canvas(&request);
            let mut stroke = begin(request);
            let mut last = Vec2::new(18.0, 20.0);
            for step in 0..12 {
                let pos = Vec2::new(18.0 + step as f32 * 2.5, 20.0 + step as f32 * 1.5);
                stroke.stroke_to(&StrokeSample {
                    last_pos: last,
                    pos,
                    radius: 5.0,
                    eraser: step % 5 == 4,
                });
                last = pos;
            }
            stroke.finish();
            canvas.to_byte_pixels()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_threaded_stroke_matches_single_thread() {
        let run = |threads: usize| {
            let buffer = ImageBuffer::new_byte(64, 64, [0, 0, 0, 255]);
            for x in 0..64 {
                buffer.set_pixel(x, 20, PixelValue::Byte([255, 255, 255, 255]));
            }
            let mut request = quad_request(buffer);
            red_brush(&mut request);
            request.settings.threads = Some(threads);
            request.settings.normal_mask = false;
            request.brush.alpha = 0.7;
            let canvas = canvas(&request);
            let mut stroke = begin(request);
            let mut last = Vec2::new(16.0, 18.0);
            for step in 0..16 {
                let pos = Vec2::new(16.0 + step as f32 * 2.0, 18.0 + step as f32 * 1.75);
                stroke.stroke_to(&StrokeSample {
                    last_pos: last,
                    pos,
                    radius: 7.0,
                    eraser: step % 6 == 5,
                });
                last = pos;
            }
            let undo = stroke.finish();
            (canvas.to_byte_pixels(), undo.records.len())
        };
        let single = run(1);
        assert_eq!(run(4), single);
        assert_eq!(run(3), single);
    }

    #[test]
    fn test_edge_on_mesh_paints_nothing() {
        let mut request = quad_request(ImageBuffer::new_byte(16, 16, [0, 0, 0, 255]));
        red_brush(&mut request);
        // The quad lies in the view direction and projects to a line
        request.object_to_world = Mat4::from_rotation_x(FRAC_PI_2);
        let canvas = canvas(&request);
        let mut stroke = begin(request);
        let outcome = stroke.stroke_to(&StrokeSample::dab(Vec2::new(32.0, 40.0), 4.0));
        assert!(!outcome.touched);
        assert_eq!(outcome.pivot, None);
        assert!(canvas.to_byte_pixels().iter().all(|px| *px == [0, 0, 0, 255]));
    }

    #[test]
    fn test_floor_behind_near_clip_paints_nothing() {
        let mut request = quad_request(ImageBuffer::new_byte(16, 16, [0, 0, 0, 255]));
        red_brush(&mut request);
        // A large floor running from in front of the camera to behind it
        request.view = ViewParams::new(
            Vec2::splat(64.0),
            Mat4::perspective_rh_gl(FRAC_PI_2, 1.0, 0.1, 100.0),
            Mat4::look_at_rh(Vec3::new(0.0, 1.0, 0.0), Vec3::new(0.0, 0.0, -5.0), Vec3::Y),
            0.1,
            100.0,
            false,
        );
        request.object_to_world = Mat4::from_scale(Vec3::splat(20.0)) * Mat4::from_rotation_x(-FRAC_PI_2);
        let mut stroke = begin(request);
        for pos in [Vec2::new(32.0, 40.0), Vec2::new(32.0, 10.0), Vec2::new(-500.0, 1.0e6)] {
            let outcome = stroke.stroke_to(&StrokeSample::dab(pos, 4.0));
            assert!(!outcome.touched);
            assert_eq!(outcome.pivot, None);
        }
    }

    #[test]
    fn test_dab_off_mesh_touches_nothing() {
        let mut request = quad_request(ImageBuffer::new_byte(16, 16, [0, 0, 0, 255]));
        red_brush(&mut request);
        let mut stroke = begin(request);
        let outcome = stroke.stroke_to(&StrokeSample::dab(Vec2::new(200.0, 200.0), 4.0));
        assert!(!outcome.touched);
        assert_eq!(outcome.pivot, None);
    }

    #[test]
    fn test_masked_dabs_never_exceed_brush_alpha() {
        let mut request = quad_request(ImageBuffer::new_byte(16, 16, [0, 0, 0, 255]));
        red_brush(&mut request);
        request.brush.alpha = 0.5;
        let canvas = canvas(&request);
        let mut stroke = begin(request);

        let dab = StrokeSample::dab(Vec2::new(32.0, 32.0), 4.0);
        stroke.stroke_to(&dab);
        let first = canvas.get_pixel(8, 8);
        stroke.stroke_to(&dab);
        stroke.stroke_to(&dab);
        // Blending against the original with a capped mask holds the value
        assert_eq!(canvas.get_pixel(8, 8), first);
        let Some(PixelValue::Byte([r, _, _, _])) = first else {
            panic!("byte pixel expected");
        };
        assert!((126..=129).contains(&r), "half strength red, got {}", r);
    }

    #[test]
    fn test_eraser_keeps_alpha_with_lock_alpha_off() {
        let mut request = quad_request(ImageBuffer::new_byte(16, 16, [40, 40, 40, 255]));
        red_brush(&mut request);
        let canvas = canvas(&request);
        let mut stroke = begin(request);

        let mut sample = StrokeSample::dab(Vec2::new(32.0, 32.0), 4.0);
        sample.eraser = true;
        stroke.stroke_to(&sample);
        let Some(PixelValue::Byte(px)) = canvas.get_pixel(8, 8) else {
            panic!("byte pixel expected");
        };
        assert_eq!(px[3], 0);
    }

    #[test]
    fn test_lock_alpha_keeps_original_alpha() {
        let mut request = quad_request(ImageBuffer::new_byte(16, 16, [0, 0, 0, 100]));
        red_brush(&mut request);
        request.brush.lock_alpha = true;
        let canvas = canvas(&request);
        let mut stroke = begin(request);

        stroke.stroke_to(&StrokeSample::dab(Vec2::new(32.0, 32.0), 4.0));
        let Some(PixelValue::Byte(px)) = canvas.get_pixel(8, 8) else {
            panic!("byte pixel expected");
        };
        assert_eq!(px[3], 100);
        assert!(px[0] > 0);
    }

    #[test]
    fn test_fill_covers_every_visible_pixel() {
        let mut request = quad_request(ImageBuffer::new_byte(16, 16, [0, 0, 0, 255]));
        request.brush.kind = BrushKind::Fill;
        request.brush.color = [0.0, 0.0, 1.0];
        let canvas = canvas(&request);
        let mut stroke = begin(request);

        let outcome = stroke.stroke_to(&StrokeSample::dab(Vec2::new(32.0, 32.0), 1.0));
        assert!(outcome.touched);
        assert_eq!(canvas.get_pixel(0, 0), Some(PixelValue::Byte([0, 0, 255, 255])));
        assert_eq!(canvas.get_pixel(15, 15), Some(PixelValue::Byte([0, 0, 255, 255])));
    }

    #[test]
    fn test_linear_gradient_fill_follows_drag() {
        let mut request = quad_request(ImageBuffer::new_float(16, 16, [0.0, 0.0, 0.0, 1.0]));
        request.brush.kind = BrushKind::Fill;
        request.brush.gradient = Some(Gradient::new(
            GradientMode::Linear,
            [0.0, 0.0, 0.0, 1.0],
            [1.0, 1.0, 1.0, 1.0],
        ));
        let canvas = canvas(&request);
        let mut stroke = begin(request);

        // Drag across the quad from its left edge to its right edge
        let sample = StrokeSample {
            last_pos: Vec2::new(16.0, 32.0),
            pos: Vec2::new(48.0, 32.0),
            radius: 1.0,
            eraser: false,
        };
        stroke.stroke_to(&sample);

        let left = canvas.get_pixel(1, 8).map(PixelValue::to_premul_float).unwrap();
        let right = canvas.get_pixel(14, 8).map(PixelValue::to_premul_float).unwrap();
        assert!(left[0] < 0.2, "left {:?}", left);
        assert!(right[0] > 0.8, "right {:?}", right);
    }

    #[test]
    fn test_smear_moves_colour_along_stroke() {
        let buffer = ImageBuffer::new_byte(16, 16, [0, 0, 0, 255]);
        for y in 0..16 {
            for x in 0..8 {
                buffer.set_pixel(x, y, PixelValue::Byte([255, 255, 255, 255]));
            }
        }
        let mut request = quad_request(buffer);
        request.brush.kind = BrushKind::Smear;
        request.brush.falloff = FalloffCurve::Constant;
        let canvas = canvas(&request);
        let mut stroke = begin(request);

        // Dragging right pulls the white half over the black half
        let sample = StrokeSample {
            last_pos: Vec2::new(28.0, 32.0),
            pos: Vec2::new(36.0, 32.0),
            radius: 3.0,
            eraser: false,
        };
        assert!(stroke.stroke_to(&sample).touched);
        let Some(PixelValue::Byte(px)) = canvas.get_pixel(9, 8) else {
            panic!("byte pixel expected");
        };
        assert!(px[0] > 128, "smeared pixel {:?}", px);
    }

    #[test]
    fn test_soften_flat_image_is_stable() {
        let mut request = quad_request(ImageBuffer::new_byte(16, 16, [90, 90, 90, 255]));
        request.mode = StrokeMode::Smooth;
        let canvas = canvas(&request);
        let mut stroke = begin(request);
        stroke.stroke_to(&StrokeSample::dab(Vec2::new(32.0, 32.0), 4.0));
        let Some(PixelValue::Byte(px)) = canvas.get_pixel(8, 8) else {
            panic!("byte pixel expected");
        };
        for c in &px[..3] {
            assert!((89..=91).contains(c), "softened {:?}", px);
        }
    }

    #[test]
    fn test_pivot_is_surface_under_brush() {
        let request = quad_request(ImageBuffer::new_byte(16, 16, [0, 0, 0, 255]));
        let mut stroke = begin(request);
        let outcome = stroke.stroke_to(&StrokeSample::dab(Vec2::new(32.0, 32.0), 4.0));
        let pivot = outcome.pivot.unwrap();
        assert!(pivot.truncate().length() < 0.05, "pivot {:?}", pivot);
        assert!(pivot.z.abs() < 1e-4);
    }
}
