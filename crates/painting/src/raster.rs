//! Face rasterization into paint pixels
//!
//! When a stroke first reaches a bucket, every triangle listed in it is
//! clipped to the bucket in UV space and the image pixels inside the clipped
//! polygon become [`PaintPixel`]s. Triangles with seam edges also rasterize
//! a strip outside those edges (seam bleed).
//!
//! A pixel is kept only when it is visible from the view and its mask is
//! non-zero:
//! - clipping planes reject points outside the clip volume
//! - occlusion rejects points hidden by another triangle of the bucket
//! - [`evaluate_mask`] combines the stencil layer, cavity and normal angle

use glam::{Vec2, Vec3, Vec4, Vec4Swizzles};
use projpaint_config::{CavityCurve, SampleInterpolation};

use crate::bucket::BucketGrid;
use crate::clip::{clip_face_to_bucket, isect_poly, isect_poly_twoside, line_clip_rect, pixel_bounds, scale_tri};
use crate::constants::{FACE_SCALE_SEAM, MASK_MAX, PIXEL_TOLERANCE};
use crate::geometry::{Rect, interp_v2, interp_v3, isect_point_quad_v2, isect_point_tri_v2, line_point_factor_v2, resolve_quad_u_v2};
use crate::image::{PaintImage, TriTarget};
use crate::mesh::ImageId;
use crate::occlusion::{ScreenView, pick_color, point_occluded};
use crate::projection::{screen_px_from_ortho, screen_px_from_persp};
use crate::seam::SeamData;
use crate::surface::{ImageBuffer, PixelValue};
use crate::tiles::{PartialRedraw, ProjectedImage};

/// One image pixel covered by a triangle inside a bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaintPixel {
    /// Index into the stroke's projected images
    pub proj_image: u16,
    pub x: u32,
    pub y: u32,
    /// Index into the image buffer
    pub index: usize,
    /// Undo tile holding the original value
    pub tile: u32,
    /// Offset inside the undo tile
    pub tile_offset: u16,
    /// Screen position
    pub screen: Vec2,
    /// Object space position (3D texture mapping only)
    pub world: Vec3,
    /// Fixed mask from stencil, cavity and normal angle (0-65535)
    pub mask: u16,
    /// Partial redraw cell
    pub cell: u8,
    /// Colour the clone brush paints, in the target's pixel format
    pub clone: Option<PixelValue>,
}

impl PaintPixel {
    #[inline]
    pub fn mask_factor(&self) -> f32 {
        self.mask as f32 / MASK_MAX
    }
}

// ============================================================================
// Mask inputs
// ============================================================================

/// Another image, mapped through its own UV layer, masking the paint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StencilLayer {
    pub image: ImageId,
    pub uv_layer: usize,
    /// White masks instead of black
    pub invert: bool,
}

/// Per-vertex cavity values remapped through a curve
#[derive(Debug, Clone)]
pub struct CavityMask {
    pub values: Vec<f32>,
    pub curve: CavityCurve,
}

/// Fade paint on faces turned away from the view.
///
/// Angles are in radians. Faces past `angle` get nothing, faces inside
/// `inner` get full strength, in between ramps linearly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalMask {
    pub angle: f32,
    pub angle_cos: f32,
    pub inner_cos: f32,
    pub range: f32,
}

impl NormalMask {
    /// Build from the configured cutoff in degrees.
    ///
    /// With `fade` the cutoff becomes the inner angle and the outer angle
    /// sits half way to 90 degrees. Returns the mask (None when there is no
    /// ramp) and the cosine used for vertex culling.
    pub fn from_degrees(normal_angle: f32, fade: bool) -> (Option<Self>, f32) {
        let (inner, outer) = if fade {
            (normal_angle, (normal_angle + 90.0) * 0.5)
        } else {
            (normal_angle, normal_angle)
        };
        let inner = inner.to_radians();
        let angle = outer.to_radians();
        let range = angle - inner;
        let angle_cos = angle.cos();
        let mask = (range > 0.0).then(|| Self {
            angle,
            angle_cos,
            inner_cos: inner.cos(),
            range,
        });
        (mask, angle_cos)
    }
}

/// Everything that scales a pixel's fixed mask
#[derive(Debug, Clone, Default)]
pub struct PixelMasks {
    pub stencil: Option<StencilLayer>,
    pub cavity: Option<CavityMask>,
    pub normal: Option<NormalMask>,
    /// Back faces get no paint (otherwise the normal mask uses |cos|)
    pub backface_cull: bool,
}

/// Where the clone brush reads its colour from
#[derive(Debug, Clone, Default)]
pub enum CloneSource {
    /// Not a clone stroke
    #[default]
    None,
    /// Each triangle samples its clone image through the clone UV layer
    Layer(Vec<Option<TriTarget>>),
    /// Colour picked from the mesh at the pixel's screen position minus
    /// the clone offset
    Picked,
}

// ============================================================================
// Rasterization
// ============================================================================

/// Read-only stroke state the rasterizer works from
#[derive(Debug, Clone, Copy)]
pub struct RasterContext<'a> {
    pub view: ScreenView<'a>,
    pub images: &'a [PaintImage],
    pub targets: &'a [Option<TriTarget>],
    /// Projected image of each triangle
    pub tri_image: &'a [Option<u16>],
    pub proj_images: &'a [ProjectedImage],
    pub masks: &'a PixelMasks,
    pub clone: &'a CloneSource,
    pub clone_offset: Vec2,
    pub seams: Option<&'a SeamData>,
    pub occlude: bool,
    pub backface_cull: bool,
    /// Store object space positions for 3D texture mapping
    pub world_coords: bool,
    pub interpolation: SampleInterpolation,
}

impl RasterContext<'_> {
    #[inline]
    fn grid(&self) -> &BucketGrid {
        self.view.grid
    }
}

/// Build the paint pixels of one bucket
pub fn init_bucket(ctx: &RasterContext<'_>, bucket_index: usize) -> Vec<PaintPixel> {
    let (bx, by) = ctx.grid().bucket_xy(bucket_index);
    let bucket_bounds = ctx.grid().bucket_bounds(bx, by);
    let clip_rect = bucket_bounds.expanded(PIXEL_TOLERANCE);
    let faces = &ctx.grid().bucket(bucket_index).faces;

    let mut pixels = Vec::new();
    for &tri in faces {
        let tri = tri as usize;
        if let Some(image) = ctx.tri_image.get(tri).copied().flatten() {
            init_face_pixels(ctx, faces, tri, image, &clip_rect, &bucket_bounds, &mut pixels);
        }
    }
    pixels
}

/// Per-triangle data shared by the main and seam scans
struct FaceScan<'a> {
    ctx: &'a RasterContext<'a>,
    faces: &'a [u32],
    tri: usize,
    image: u16,
    buffer: &'a ImageBuffer,
    positions: [Vec3; 3],
    screen: [Vec4; 3],
    uv_offset: [Vec2; 3],
    do_clip: bool,
}

impl FaceScan<'_> {
    fn screen_point(&self, uv: Vec2) -> (Vec4, Vec3) {
        if self.ctx.view.projector.is_ortho() {
            screen_px_from_ortho(uv, self.screen, self.uv_offset)
        } else {
            screen_px_from_persp(uv, self.screen, self.uv_offset)
        }
    }

    /// Object space position, None when it lies outside the clip planes
    fn world_point(&self, w: Vec3) -> Option<Vec3> {
        if !(self.do_clip || self.ctx.world_coords) {
            return Some(Vec3::ZERO);
        }
        let [a, b, c] = self.positions;
        let wco = interp_v3(a, b, c, w);
        if self.do_clip && self.ctx.view.projector.is_clipped(wco) {
            return None;
        }
        Some(wco)
    }

    fn occluded(&self, pt: Vec4) -> bool {
        self.ctx.occlude && point_occluded(&self.ctx.view, self.faces, self.tri, pt)
    }

    fn emit(&self, x: i32, y: i32, screen: Vec4, world: Vec3, w: Vec3, out: &mut Vec<PaintPixel>) {
        let mask = evaluate_mask(self.ctx, self.tri, w);
        if mask > 0.0 {
            out.push(init_pixel(self.ctx, self.tri, self.image, x, y, mask, screen, world, w));
        }
    }
}

/// Rasterize one triangle inside one bucket.
///
/// # Arguments
/// * `faces` - Triangles of the bucket, tested for occlusion
/// * `tri` - Triangle to rasterize
/// * `image` - Its projected image
/// * `clip_rect` - Bucket bounds grown by the pixel tolerance
/// * `bucket_bounds` - Bucket bounds
/// * `out` - Receives the pixels
pub fn init_face_pixels(
    ctx: &RasterContext<'_>,
    faces: &[u32],
    tri: usize,
    image: u16,
    clip_rect: &Rect,
    bucket_bounds: &Rect,
    out: &mut Vec<PaintPixel>,
) {
    let Some(target) = ctx.targets.get(tri).copied().flatten() else {
        return;
    };
    let Some(proj) = ctx.proj_images.get(image as usize) else {
        return;
    };
    let buffer = proj.buffer().as_ref();
    let projector = ctx.view.projector;
    let is_ortho = projector.is_ortho();
    let (width, height) = (buffer.width, buffer.height);
    let (wf, hf) = (width as f32, height as f32);

    // Half pixel offset applied to the UVs instead of every pixel, nudged so
    // pixel centres never fall exactly on pixel aligned UV edges
    let half_px = Vec2::new(
        (0.5 + PIXEL_TOLERANCE / 3.0) / wf,
        (0.5 + PIXEL_TOLERANCE / 4.0) / hf,
    );
    let uv_offset = ctx.view.mesh.tri_uvs(target.uv_layer, tri).map(|uv| uv - half_px);

    let scan = FaceScan {
        ctx,
        faces,
        tri,
        image,
        buffer,
        positions: ctx.view.mesh.tri_positions(tri),
        screen: ctx.view.tri_screen(tri),
        uv_offset,
        do_clip: projector.has_clipping(),
    };

    let uv_clip = clip_face_to_bucket(
        is_ortho,
        projector.is_flip_object,
        clip_rect,
        bucket_bounds,
        scan.screen,
        uv_offset,
        ctx.backface_cull || ctx.occlude,
    );

    if let Some(bounds) = pixel_bounds(&uv_clip, width, height) {
        for y in bounds.ymin..bounds.ymax {
            let v = y as f32 / hf;
            let mut has_x_isect = false;
            for x in bounds.xmin..bounds.xmax {
                let uv = Vec2::new(x as f32 / wf, v);
                let inside = if ctx.backface_cull {
                    isect_poly(uv, &uv_clip)
                } else {
                    isect_poly_twoside(uv, &uv_clip)
                };
                if !inside {
                    if has_x_isect {
                        // Convex polygon, the row will not be entered again
                        break;
                    }
                    continue;
                }
                has_x_isect = true;

                let (screen, w) = scan.screen_point(uv);
                let Some(world) = scan.world_point(w) else {
                    continue;
                };
                if scan.occluded(screen) {
                    continue;
                }
                scan.emit(x, y, screen, world, w, out);
            }
        }
    }

    if let Some(seams) = ctx.seams {
        if seams.bleed_px() > 0.0 {
            bleed_seams(&scan, seams, clip_rect, bucket_bounds, out);
        }
    }
}

/// Rasterize the outset strips of a triangle's seam edges
fn bleed_seams(
    scan: &FaceScan<'_>,
    seams: &SeamData,
    clip_rect: &Rect,
    bucket_bounds: &Rect,
    out: &mut Vec<PaintPixel>,
) {
    let (width, height) = (scan.buffer.width, scan.buffer.height);
    let Some(edges) = seams.tri_seams(scan.tri, scan.uv_offset, width, height) else {
        return;
    };

    let projector = scan.ctx.view.projector;
    let is_ortho = projector.is_ortho();
    let (wf, hf) = (width as f32, height as f32);
    let bleed_sq = seams.bleed_px() * seams.bleed_px();
    let tri_puv = scan.uv_offset.map(|uv| uv * Vec2::new(wf, hf));
    let screen_xy = scan.screen.map(|v| v.xy());

    // Inset so the edge points do not occlude against the neighbouring faces:
    // screen space in ortho, object space in perspective
    let inset = if is_ortho {
        scale_tri(scan.screen.map(|v| v.xyz()), FACE_SCALE_SEAM)
    } else {
        scale_tri(scan.positions, FACE_SCALE_SEAM)
    };

    for (f1, edge) in edges.iter().enumerate() {
        let Some(seam) = edge else {
            continue;
        };
        let f2 = (f1 + 1) % 3;
        let Some((clip0, clip1)) = line_clip_rect(clip_rect, bucket_bounds, screen_xy[f1], screen_xy[f2]) else {
            continue;
        };
        if screen_xy[f1].distance_squared(screen_xy[f2]) <= f32::EPSILON {
            continue;
        }

        let (fac1, fac2) = if is_ortho {
            (
                line_point_factor_v2(clip0, screen_xy[f1], screen_xy[f2]),
                line_point_factor_v2(clip1, screen_xy[f1], screen_xy[f2]),
            )
        } else {
            (
                projector.screen_px_line_point_factor_persp(clip0, scan.positions[f1], scan.positions[f2]),
                projector.screen_px_line_point_factor_persp(clip1, scan.positions[f1], scan.positions[f2]),
            )
        };

        let (uv1, uv2) = (scan.uv_offset[f1], scan.uv_offset[f2]);
        let subsection = [
            uv1.lerp(uv2, fac1),
            uv1.lerp(uv2, fac2),
            seam.seam_uvs[0].lerp(seam.seam_uvs[1], fac2),
            seam.seam_uvs[0].lerp(seam.seam_uvs[1], fac1),
        ];
        let edge_inset = [inset[f1].lerp(inset[f2], fac1), inset[f1].lerp(inset[f2], fac2)];
        let collapsed = seam.seam_uvs[0] == seam.seam_uvs[1];

        let Some(bounds) = pixel_bounds(&subsection, width, height) else {
            continue;
        };

        for y in bounds.ymin..bounds.ymax {
            let v = y as f32 / hf;
            for x in bounds.xmin..bounds.xmax {
                let uv = Vec2::new(x as f32 / wf, v);
                let puv = Vec2::new(x as f32, y as f32);

                let mut in_bounds = if collapsed {
                    isect_point_tri_v2(uv, subsection[0], subsection[1], subsection[2]) != 0
                } else {
                    isect_point_quad_v2(uv, subsection[0], subsection[1], subsection[2], subsection[3])
                };

                // Sharp corners: keep the strip from spilling past the corner wedge
                if in_bounds {
                    let near_corner = |i: usize, corner: Vec2| {
                        seam.corner_dist_sq[i] > 0.0
                            && puv.distance_squared(seam.seam_puvs[i]) < seam.corner_dist_sq[i]
                            && puv.distance_squared(corner) > bleed_sq
                    };
                    if near_corner(0, tri_puv[f1]) || near_corner(1, tri_puv[f2]) {
                        in_bounds = false;
                    }
                }
                if !in_bounds {
                    continue;
                }

                let (screen, w) = scan.screen_point(uv);

                // Occlusion is tested at the matching point on the edge
                let fac = resolve_quad_u_v2(uv, subsection[0], subsection[1], subsection[2], subsection[3]);
                let on_edge = edge_inset[0].lerp(edge_inset[1], fac);
                let on_edge = if is_ortho {
                    on_edge.extend(1.0)
                } else {
                    let p = projector.project_mat * on_edge.extend(1.0);
                    let half = projector.win_size * 0.5;
                    Vec4::new(half.x + half.x * p.x / p.w, half.y + half.y * p.y / p.w, p.z / p.w, 1.0)
                };
                if scan.occluded(on_edge) {
                    continue;
                }

                let Some(world) = scan.world_point(w) else {
                    continue;
                };
                scan.emit(x, y, screen, world, w, out);
            }
        }
    }
}

// ============================================================================
// Per-pixel mask and pixel records
// ============================================================================

/// Bilinear sample of another image at a triangle's interpolated UV
fn sample_face_pixel(buffer: &ImageBuffer, uvs: [Vec2; 3], w: Vec3) -> PixelValue {
    let uv = interp_v2(uvs[0], uvs[1], uvs[2], w);
    let x = uv.x * buffer.width as f32 - 0.5;
    let y = uv.y * buffer.height as f32 - 0.5;
    match buffer.sample_bilinear_wrap(x, y) {
        PixelValue::Float(f) => PixelValue::Float(f.map(|c| c.clamp(0.0, 1.0))),
        byte => byte,
    }
}

/// Fixed mask of a pixel from the stencil layer, cavity and normal angle.
///
/// # Arguments
/// * `tri` - Triangle the pixel belongs to
/// * `w` - Barycentric weights of the pixel in the triangle
///
/// # Returns
/// 0.0 to 1.0, where 0.0 means the pixel is not painted at all
pub fn evaluate_mask(ctx: &RasterContext<'_>, tri: usize, w: Vec3) -> f32 {
    let masks = ctx.masks;
    let mesh = ctx.view.mesh;
    let mut mask = 1.0;

    if let Some(stencil) = masks.stencil {
        let uvs = mesh.tri_uvs(stencil.uv_layer, tri);
        // The triangle's first corner picks the UDIM tile
        let buffer = ctx.images.get(stencil.image.0 as usize).and_then(|image| {
            image.tile_buffer(image.tile_number(uvs[0])).or_else(|| image.first_buffer())
        });
        let Some(buffer) = buffer else {
            return 0.0;
        };
        mask = match sample_face_pixel(buffer, uvs, w) {
            PixelValue::Float(f) => (f[0] + f[1] + f[2]) / 3.0 * f[3],
            PixelValue::Byte(b) => {
                (b[0] as f32 + b[1] as f32 + b[2] as f32) / (255.0 * 3.0) * (b[3] as f32 / 255.0)
            }
        };
        // White means full opacity
        if !stencil.invert {
            mask = 1.0 - mask;
        }
        if mask == 0.0 {
            return 0.0;
        }
    }

    let verts = mesh.tri_verts(tri);

    if let Some(cavity) = &masks.cavity {
        let ca = w.x * cavity.values[verts[0]] + w.y * cavity.values[verts[1]] + w.z * cavity.values[verts[2]];
        mask *= cavity.curve.evaluate(ca).clamp(0.0, 1.0);
    }

    if let Some(normal) = masks.normal {
        let projector = ctx.view.projector;
        let positions = mesh.tri_positions(tri);
        let face = mesh.tri_face(tri);

        let mut no = if mesh.face_smooth.get(face).copied().unwrap_or(true) {
            interp_v3(
                mesh.vert_normals[verts[0]],
                mesh.vert_normals[verts[1]],
                mesh.vert_normals[verts[2]],
                w,
            )
            .normalize_or_zero()
        } else {
            (positions[1] - positions[0])
                .cross(positions[2] - positions[0])
                .normalize_or_zero()
        };
        if projector.is_flip_object {
            no = -no;
        }

        let co = interp_v3(positions[0], positions[1], positions[2], w);
        let mut angle_cos = projector.view_dir_at(co).dot(no);
        if !masks.backface_cull {
            angle_cos = angle_cos.abs();
        }

        if angle_cos <= normal.angle_cos {
            return 0.0;
        }
        if angle_cos < normal.inner_cos {
            mask *= (normal.angle - angle_cos.acos()) / normal.range;
        }
    }

    mask
}

/// Create the record of one pixel, capturing its undo tile.
///
/// Coordinates wrap around the image, so UVs outside 0..1 paint the
/// repeated texture.
#[allow(clippy::too_many_arguments)]
pub fn init_pixel(
    ctx: &RasterContext<'_>,
    tri: usize,
    image: u16,
    x: i32,
    y: i32,
    mask: f32,
    screen: Vec4,
    world: Vec3,
    w: Vec3,
) -> PaintPixel {
    let proj = &ctx.proj_images[image as usize];
    let buffer = proj.buffer();
    let x = x.rem_euclid(buffer.width as i32) as u32;
    let y = y.rem_euclid(buffer.height as i32) as u32;

    let (tile, tile_offset) = proj.undo.ensure(x, y);

    let clone = match ctx.clone {
        CloneSource::None => None,
        CloneSource::Layer(targets) => Some(clone_layer_sample(ctx, targets, tri, w, buffer)),
        CloneSource::Picked => {
            let co = screen.xy() - ctx.clone_offset;
            let picked = pick_color(&ctx.view, ctx.targets, ctx.images, co, SampleInterpolation::Linear);
            Some(match picked {
                Some(value) => convert_format(value, buffer),
                None => transparent(buffer),
            })
        }
    };

    PaintPixel {
        proj_image: image,
        x,
        y,
        index: buffer.index(x, y),
        tile: tile as u32,
        tile_offset: tile_offset as u16,
        screen: screen.xy(),
        world: if ctx.world_coords { world } else { Vec3::ZERO },
        mask: (mask * MASK_MAX) as u16,
        cell: PartialRedraw::cell_index(x, y, buffer.width, buffer.height),
        clone,
    }
}

fn transparent(target: &ImageBuffer) -> PixelValue {
    if target.is_float() {
        PixelValue::Float([0.0; 4])
    } else {
        PixelValue::Byte([0; 4])
    }
}

/// A sample from another buffer in the target buffer's format
fn convert_format(value: PixelValue, target: &ImageBuffer) -> PixelValue {
    match (value, target.is_float()) {
        (PixelValue::Float(_), true) | (PixelValue::Byte(_), false) => value,
        (PixelValue::Byte(_), true) => PixelValue::Float(value.to_premul_float()),
        (PixelValue::Float(_), false) => PixelValue::Byte(value.to_straight_byte()),
    }
}

fn clone_layer_sample(
    ctx: &RasterContext<'_>,
    targets: &[Option<TriTarget>],
    tri: usize,
    w: Vec3,
    target: &ImageBuffer,
) -> PixelValue {
    let Some(clone) = targets.get(tri).copied().flatten() else {
        return transparent(target);
    };
    let Some(image) = ctx.images.get(clone.image.0 as usize) else {
        return transparent(target);
    };
    let Some(buffer) = image.tile_buffer(clone.tile).or_else(|| image.first_buffer()) else {
        return transparent(target);
    };
    let uvs = ctx.view.mesh.tri_uvs(clone.uv_layer, tri);
    convert_format(sample_face_pixel(buffer, uvs, w), target)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::Mat4;

    use super::*;
    use crate::bucket::BucketGrid;
    use crate::mesh::MeshSnapshot;
    use crate::projection::{Projector, ScreenCoords, ViewParams};
    use crate::types::{ProjectionSource, Symmetry};

    /// Orthographic view looking down -Z at the quad, filling a 64x64 window
    struct Fixture {
        mesh: MeshSnapshot,
        projector: Projector,
        coords: ScreenCoords,
        grid: BucketGrid,
        images: Vec<PaintImage>,
        targets: Vec<Option<TriTarget>>,
        tri_image: Vec<Option<u16>>,
        proj_images: Vec<ProjectedImage>,
        masks: PixelMasks,
        clone: CloneSource,
    }

    impl Fixture {
        fn new(mesh: MeshSnapshot, size: u32, margin: f32) -> Self {
            // Map -1-margin..1+margin onto the window
            let extent = 1.0 + margin;
            let winmat = Mat4::orthographic_rh_gl(-extent, extent, -extent, extent, 0.1, 10.0);
            let viewmat = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
            let view = ViewParams::new(Vec2::splat(64.0), winmat, viewmat, 0.1, 10.0, true);
            let projector = Projector::new(&view, Mat4::IDENTITY, Symmetry::NONE);
            let coords = ScreenCoords::compute(&mesh, &projector, ProjectionSource::View, 200.0);
            let mut grid = BucketGrid::new(coords.min, coords.max, 200.0);
            for tri in 0..mesh.tri_count() {
                let v = mesh.tri_verts(tri).map(|v| coords.get(v).xy());
                grid.assign_face(tri as u32, v);
            }

            let buffer = Arc::new(ImageBuffer::new_byte(size, size, [0, 0, 0, 255]));
            let images = vec![PaintImage::new("canvas", ImageBuffer::new_byte(1, 1, [0; 4]))];
            let targets = vec![
                Some(TriTarget {
                    image: ImageId(0),
                    uv_layer: 0,
                    tile: 0,
                });
                mesh.tri_count()
            ];
            Self {
                tri_image: vec![Some(0); mesh.tri_count()],
                proj_images: vec![ProjectedImage::new(ImageId(0), 0, buffer, true)],
                mesh,
                projector,
                coords,
                grid,
                images,
                targets,
                masks: PixelMasks {
                    backface_cull: true,
                    ..PixelMasks::default()
                },
                clone: CloneSource::None,
            }
        }

        fn ctx<'a>(&'a self, seams: Option<&'a SeamData>) -> RasterContext<'a> {
            RasterContext {
                view: ScreenView {
                    mesh: &self.mesh,
                    coords: &self.coords,
                    projector: &self.projector,
                    grid: &self.grid,
                },
                images: &self.images,
                targets: &self.targets,
                tri_image: &self.tri_image,
                proj_images: &self.proj_images,
                masks: &self.masks,
                clone: &self.clone,
                clone_offset: Vec2::ZERO,
                seams,
                occlude: true,
                backface_cull: true,
                world_coords: false,
                interpolation: SampleInterpolation::Linear,
            }
        }

        fn all_pixels(&self, seams: Option<&SeamData>) -> Vec<PaintPixel> {
            let ctx = self.ctx(seams);
            (0..self.grid.len()).flat_map(|i| init_bucket(&ctx, i)).collect()
        }
    }

    #[test]
    fn test_quad_covers_every_pixel_once() {
        let fixture = Fixture::new(MeshSnapshot::quad(), 32, 0.25);
        let pixels = fixture.all_pixels(None);

        let mut seen = vec![0u32; 32 * 32];
        for p in &pixels {
            seen[p.index] += 1;
            assert_eq!(p.mask, u16::MAX);
        }
        assert!(seen.iter().all(|&n| n == 1), "every texel exactly once");
    }

    #[test]
    fn test_pixels_capture_undo_tiles() {
        let fixture = Fixture::new(MeshSnapshot::quad(), 100, 0.25);
        let pixels = fixture.all_pixels(None);
        assert_eq!(pixels.len(), 100 * 100);

        let store = &fixture.proj_images[0].undo;
        assert_eq!(store.captured().count(), 4);
        let p = pixels.iter().find(|p| p.x == 70 && p.y == 5).unwrap();
        assert_eq!(p.tile as usize, store.tile_index(crate::tiles::TileCoord { x: 1, y: 0 }));
        assert_eq!(p.tile_offset, 6 + 5 * 64);
        assert_eq!(p.cell, PartialRedraw::cell_index(70, 5, 100, 100));
    }

    #[test]
    fn test_seam_bleed_extends_past_island() {
        // UVs cover the middle of the image, leaving room to bleed
        let mut mesh = MeshSnapshot::quad();
        for uv in mesh.uv_layers[0].uvs.iter_mut() {
            *uv = Vec2::splat(0.25) + *uv * 0.5;
        }
        let fixture = Fixture::new(mesh, 64, 0.5);
        let seams = SeamData::new(&fixture.mesh, &fixture.targets, 4.0);

        let painted = |pixels: &[PaintPixel], x: u32, y: u32| pixels.iter().any(|p| p.x == x && p.y == y);

        let without = fixture.all_pixels(None);
        assert!(painted(&without, 20, 32));
        assert!(!painted(&without, 13, 32));

        let with = fixture.all_pixels(Some(&seams));
        // The island spans 16..48, 3px out is inside the 4px bleed, 6px is not
        assert!(painted(&with, 13, 32));
        assert!(painted(&with, 32, 50));
        assert!(!painted(&with, 10, 32));
        assert!(!painted(&with, 32, 54));
    }

    #[test]
    fn test_normal_mask_ramp() {
        let (mask, cull_cos) = NormalMask::from_degrees(60.0, true);
        let mask = mask.unwrap();
        assert!((mask.angle - 75f32.to_radians()).abs() < 1e-5);
        assert!((cull_cos - 75f32.to_radians().cos()).abs() < 1e-6);
        assert!((mask.inner_cos - 0.5).abs() < 1e-6);

        let (none, _) = NormalMask::from_degrees(60.0, false);
        assert!(none.is_none());
    }

    #[test]
    fn test_stencil_masks_pixels() {
        let mut fixture = Fixture::new(MeshSnapshot::quad(), 16, 0.25);
        // Left half white, right half black
        let stencil: Vec<[u8; 4]> = (0..16 * 16)
            .map(|i| if i % 16 < 8 { [255, 255, 255, 255] } else { [0, 0, 0, 255] })
            .collect();
        fixture.images.push(PaintImage::new(
            "stencil",
            ImageBuffer::from_bytes(16, 16, &stencil).unwrap(),
        ));
        fixture.masks.stencil = Some(StencilLayer {
            image: ImageId(1),
            uv_layer: 0,
            invert: true,
        });

        let pixels = fixture.all_pixels(None);
        assert!(pixels.iter().any(|p| p.x == 2));
        assert!(pixels.iter().all(|p| p.x < 9));
    }

    #[test]
    fn test_stencil_reads_triangle_tile() {
        let mut fixture = Fixture::new(MeshSnapshot::quad(), 16, 0.25);
        fixture.images.push(PaintImage::new_tiled(
            "stencil",
            vec![
                (1001, ImageBuffer::new_byte(8, 8, [0, 0, 0, 255])),
                (1002, ImageBuffer::new_byte(8, 8, [255, 255, 255, 255])),
            ],
        ));
        fixture.masks.stencil = Some(StencilLayer {
            image: ImageId(1),
            uv_layer: 1,
            invert: true,
        });

        // Stencil UVs in the second tile, which is white and lets paint through
        let mut layer = fixture.mesh.uv_layers[0].clone();
        for uv in layer.uvs.iter_mut() {
            *uv = Vec2::new(1.0 + uv.x * 0.99, uv.y * 0.99);
        }
        fixture.mesh.uv_layers.push(layer);
        assert_eq!(fixture.all_pixels(None).len(), 16 * 16);

        // Moved into the black first tile, nothing is painted
        for uv in fixture.mesh.uv_layers[1].uvs.iter_mut() {
            uv.x -= 1.0;
        }
        assert!(fixture.all_pixels(None).is_empty());
    }

    #[test]
    fn test_clone_layer_sample_converts_format() {
        let mut fixture = Fixture::new(MeshSnapshot::quad(), 8, 0.25);
        fixture
            .images
            .push(PaintImage::new("source", ImageBuffer::new_float(8, 8, [0.0, 1.0, 0.0, 1.0])));
        fixture.clone = CloneSource::Layer(vec![
            Some(TriTarget {
                image: ImageId(1),
                uv_layer: 0,
                tile: 0,
            });
            2
        ]);

        let pixels = fixture.all_pixels(None);
        assert!(!pixels.is_empty());
        for p in &pixels {
            assert_eq!(p.clone, Some(PixelValue::Byte([0, 255, 0, 255])));
        }
    }
}
