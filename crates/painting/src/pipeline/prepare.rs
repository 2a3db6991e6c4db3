//! Stroke setup: target resolution, shared data and per-view sessions

use std::sync::Arc;

use glam::{Mat4, Vec2, Vec4, Vec4Swizzles};
use projpaint_config::{PaintSettings, PaintTargetMode};
use tracing::{debug, info, warn};

use crate::blend::OperatorContext;
use crate::brush::{BlurKernel, BrushSettings, BrushTexture, TextureMapping};
use crate::bucket::BucketGrid;
use crate::constants::MIN_BRUSH_DIAMETER;
use crate::geometry::line_point_side_v2;
use crate::image::{PaintImage, TriTarget};
use crate::mesh::{ImageId, MeshSnapshot, PaintSlot};
use crate::projection::{Projector, ScreenCoords, ViewParams, compute_vert_cull, is_behind_near_clip};
use crate::raster::{CavityMask, CloneSource, NormalMask, PixelMasks, StencilLayer};
use crate::seam::SeamData;
use crate::surface::ImageBuffer;
use crate::tiles::ProjectedImage;
use crate::types::{BrushKind, ProjectionSource, StrokeMode, Symmetry};
use crate::validation::{TargetImages, check_mesh_data};

use super::{
    PaintSession, PaintSetupError, ProjectionStroke, SharedPaintData, StrokeRequest, WorkerPool,
};

/// Inputs of the data shared by every view of a stroke
pub(super) struct SharedInput {
    pub mesh: MeshSnapshot,
    pub images: Vec<PaintImage>,
    pub targets: TargetImages,
    pub settings: PaintSettings,
    pub brush: BrushSettings,
    pub kind: BrushKind,
    pub source: ProjectionSource,
    pub ops: OperatorContext,
    pub stencil_uv_layer: Option<usize>,
    pub clone_uv_layer: Option<usize>,
    pub color_texture: Option<Arc<dyn BrushTexture>>,
    pub mask_texture: Option<Arc<dyn BrushTexture>>,
    pub reproject_source: Option<Arc<ImageBuffer>>,
}

impl ProjectionStroke {
    /// Validate the request and prepare every symmetry view.
    ///
    /// # Errors
    /// A malformed mesh, or a mesh missing UVs, materials, an editable
    /// texture or (for the mask brush) a stencil image.
    pub fn begin(request: StrokeRequest) -> Result<Self, PaintSetupError> {
        let StrokeRequest {
            mesh,
            images,
            targets,
            settings,
            brush,
            mode,
            view,
            object_to_world,
            symmetry,
            stencil_uv_layer,
            clone_uv_layer,
            color_texture,
            mask_texture,
            cursor,
            mouse,
        } = request;

        mesh.validate()?;
        check_mesh_data(&mesh, &images, &settings, &targets, brush.kind)?;

        let kind = if mode == StrokeMode::Smooth {
            BrushKind::Soften
        } else {
            brush.kind
        };
        let invert = mode == StrokeMode::Invert;
        let source = if kind == BrushKind::Fill {
            ProjectionSource::ViewFill
        } else {
            ProjectionSource::View
        };

        // Only the draw brush samples the colour texture
        let color_texture = color_texture.filter(|_| kind == BrushKind::Draw);
        let mapping = color_texture.as_ref().map(|tex| tex.mapping());

        let stencil_value = if invert ^ settings.stencil_invert {
            1.0 - brush.weight
        } else {
            brush.weight
        };
        let masking = BrushSettings {
            kind,
            ..brush.clone()
        }
        .uses_opacity_masking(mapping);
        let ops = OperatorContext {
            blend: brush.blend,
            masking,
            dither: settings.dither,
            stencil_value,
            sharpen: invert ^ brush.invert_direction,
            sharp_threshold: brush.sharp_threshold,
        };

        let diameter = brush.diameter().max(MIN_BRUSH_DIAMETER);
        let threads = settings.threads;
        let shared = build_shared(SharedInput {
            mesh,
            images,
            targets,
            settings,
            brush,
            kind,
            source,
            ops,
            stencil_uv_layer,
            clone_uv_layer,
            color_texture,
            mask_texture,
            reproject_source: None,
        });

        let views = symmetry.views();
        let multi_view = views.len() > 1;
        let sessions: Vec<PaintSession> = views
            .into_iter()
            .map(|view_symmetry| {
                let mut session =
                    build_session(&shared, &view, object_to_world, view_symmetry, diameter, multi_view);
                if kind == BrushKind::Clone {
                    session.clone_offset = mouse - session.projector.world_to_screen(cursor);
                }
                session
            })
            .collect();

        let pool = stroke_pool(threads, &sessions);
        info!(
            "Projection stroke started: {:?} brush, {} views, {} images, {} threads",
            kind,
            sessions.len(),
            shared.proj_images.len(),
            pool.thread_count()
        );

        Ok(Self {
            shared: Arc::new(shared),
            sessions,
            pool,
        })
    }
}

/// Worker pool for a stroke, one thread when any grid was clamped
pub(super) fn stroke_pool(threads: Option<usize>, sessions: &[PaintSession]) -> WorkerPool {
    if sessions.iter().any(|session| session.grid.was_clamped) {
        debug!("Bucket grid clamped, painting on one thread");
        return WorkerPool::new(Some(1));
    }
    WorkerPool::new(threads)
}

fn valid_layer(mesh: &MeshSnapshot, layer: Option<usize>) -> usize {
    layer
        .filter(|&layer| layer < mesh.uv_layers.len())
        .unwrap_or(mesh.active_uv)
}

fn is_editable(images: &[PaintImage], id: ImageId) -> bool {
    images.get(id.0 as usize).is_some_and(|image| image.editable)
}

/// Target of a triangle, with the UDIM tile its first corner falls in
fn tri_target(
    mesh: &MeshSnapshot,
    images: &[PaintImage],
    tri: usize,
    image: ImageId,
    uv_layer: usize,
) -> Option<TriTarget> {
    let first_corner = mesh.tris[tri][0] as usize;
    let uv = mesh.uv_layers.get(uv_layer)?.uvs[first_corner];
    let tile = images.get(image.0 as usize)?.tile_number(uv);
    Some(TriTarget { image, uv_layer, tile })
}

/// Whether a triangle may be painted: selected faces when face selection
/// masking is on, otherwise every visible face
fn is_paintable(mesh: &MeshSnapshot, settings: &PaintSettings, tri: usize) -> bool {
    let face = mesh.tri_face(tri);
    if settings.face_selection_mask {
        mesh.face_selected.get(face).copied().unwrap_or(false)
    } else {
        !mesh.face_hidden.get(face).copied().unwrap_or(false)
    }
}

/// Resolve targets and masks shared by all views
pub(super) fn build_shared(input: SharedInput) -> SharedPaintData {
    let SharedInput {
        mesh,
        images,
        targets: target_images,
        settings,
        brush,
        kind,
        source,
        ops,
        stencil_uv_layer,
        clone_uv_layer,
        color_texture,
        mask_texture,
        reproject_source,
    } = input;

    let fill = source == ProjectionSource::ViewFill;
    let backface_cull = settings.backface_cull && !fill;
    let occlude = settings.occlude && !fill;
    let (normal, _) = NormalMask::from_degrees(settings.normal_angle, settings.normal_mask && !fill);

    let tri_count = mesh.tri_count();
    let stencil_uv = valid_layer(&mesh, stencil_uv_layer);
    let layer_clone = kind == BrushKind::Clone && settings.layer_clone;
    let material_mode = settings.mode == PaintTargetMode::Material;

    let mut targets: Vec<Option<TriTarget>> = vec![None; tri_count];
    let mut clone_targets: Vec<Option<TriTarget>> = vec![None; tri_count];
    let mut tri_image: Vec<Option<u16>> = vec![None; tri_count];
    let mut proj_images: Vec<ProjectedImage> = Vec::new();

    for tri in 0..tri_count {
        let mut slot: Option<PaintSlot> = None;
        let (image, uv_layer) = if kind == BrushKind::Mask {
            match target_images.stencil {
                Some(id) => (id, stencil_uv),
                None => continue,
            }
        } else if material_mode {
            slot = mesh.tri_material(tri).and_then(|material| material.paint_slot);
            match slot {
                Some(slot) => (slot.image, valid_layer(&mesh, slot.uv_layer)),
                None => continue,
            }
        } else {
            match target_images.canvas {
                Some(id) => (id, mesh.active_uv),
                None => continue,
            }
        };

        // Linked images and the stencil image are never painted through a slot
        if slot.is_some() && (!is_editable(&images, image) || target_images.stencil == Some(image)) {
            continue;
        }
        let Some(target) = tri_target(&mesh, &images, tri, image, uv_layer) else {
            continue;
        };
        targets[tri] = Some(target);

        if layer_clone {
            let clone = if material_mode {
                let clone_slot = mesh.tri_material(tri).and_then(|material| material.clone_slot);
                match clone_slot {
                    Some(clone_slot) if Some(clone_slot) != slot => {
                        Some((clone_slot.image, valid_layer(&mesh, clone_slot.uv_layer)))
                    }
                    _ => continue,
                }
            } else if target_images.clone == target_images.canvas {
                continue;
            } else {
                target_images.clone.map(|id| (id, valid_layer(&mesh, clone_uv_layer)))
            };
            clone_targets[tri] = clone.and_then(|(id, layer)| tri_target(&mesh, &images, tri, id, layer));
        }

        if !is_paintable(&mesh, &settings, tri) {
            continue;
        }

        let existing = proj_images
            .iter()
            .position(|proj| proj.image == target.image && proj.tile_number == target.tile);
        let index = match existing {
            Some(index) => index,
            None => {
                let Some(buffer) = images
                    .get(target.image.0 as usize)
                    .and_then(|image| image.tile_buffer(target.tile))
                else {
                    continue;
                };
                proj_images.push(ProjectedImage::new(
                    target.image,
                    target.tile,
                    Arc::clone(buffer),
                    ops.masking,
                ));
                proj_images.len() - 1
            }
        };
        tri_image[tri] = Some(index as u16);
    }

    let seams = (settings.seam_bleed > 0).then(|| SeamData::new(&mesh, &targets, settings.seam_bleed_px()));

    let stencil = match target_images.stencil {
        Some(id) if settings.layer_stencil && kind != BrushKind::Mask => {
            if images.get(id.0 as usize).is_some_and(PaintImage::has_buffer) {
                Some(StencilLayer {
                    image: id,
                    uv_layer: stencil_uv,
                    invert: settings.stencil_invert,
                })
            } else {
                warn!("Stencil image {:?} has no pixels, stencil layer disabled", id);
                None
            }
        }
        _ => None,
    };
    let cavity = settings.cavity_mask.then(|| CavityMask {
        values: mesh.vertex_cavities(),
        curve: settings.cavity_curve.clone(),
    });

    if layer_clone && clone_targets.iter().all(Option::is_none) {
        warn!("Clone layer has no image to sample, the clone brush paints nothing");
    }
    let clone = match kind {
        BrushKind::Clone if layer_clone => CloneSource::Layer(clone_targets),
        BrushKind::Clone => CloneSource::Picked,
        _ => CloneSource::None,
    };

    let world_coords = color_texture
        .as_ref()
        .is_some_and(|tex| tex.mapping() == TextureMapping::ThreeD);

    debug!(
        "Stroke targets: {} of {} triangles painted into {} images",
        tri_image.iter().flatten().count(),
        tri_count,
        proj_images.len()
    );

    SharedPaintData {
        blur: BlurKernel::projection(brush.blur_kind),
        mesh,
        images,
        brush,
        kind,
        source,
        ops,
        color_texture,
        mask_texture,
        targets,
        tri_image,
        proj_images,
        clone,
        masks: PixelMasks {
            stencil,
            cavity,
            normal,
            backface_cull,
        },
        seams,
        reproject_source,
        occlude,
        backface_cull,
        world_coords,
        interpolation: settings.interpolation,
    }
}

/// Project the mesh for one view and bucket its visible triangles.
///
/// Culling is skipped when several views share the stroke, a triangle
/// facing away in one view faces the viewer in its mirror.
pub(super) fn build_session(
    shared: &SharedPaintData,
    view: &ViewParams,
    object_to_world: Mat4,
    symmetry: Symmetry,
    diameter: f32,
    multi_view: bool,
) -> PaintSession {
    let mesh = &shared.mesh;
    let projector = Projector::new(view, object_to_world, symmetry);
    let coords = ScreenCoords::compute(mesh, &projector, shared.source, diameter);

    let vert_cull = match shared.masks.normal {
        Some(normal) if shared.backface_cull => compute_vert_cull(mesh, &projector, normal.angle_cos),
        _ => Vec::new(),
    };

    let mut grid = BucketGrid::new(coords.min, coords.max, diameter);
    let mut assigned = 0;
    for tri in 0..mesh.tri_count() {
        if shared.tri_image[tri].is_none() {
            continue;
        }
        let v = mesh.tri_verts(tri).map(|vert| coords.get(vert));
        if !multi_view && is_culled(shared, &projector, &coords, &vert_cull, tri, v) {
            continue;
        }
        grid.assign_face(tri as u32, v.map(|p| p.xy()));
        assigned += 1;
    }

    debug!(
        "View {:?}: {}x{} buckets, {} triangles",
        symmetry, grid.buckets_x, grid.buckets_y, assigned
    );

    PaintSession {
        symmetry,
        projector,
        coords,
        vert_cull,
        grid,
        clone_offset: Vec2::ZERO,
    }
}

fn is_culled(
    shared: &SharedPaintData,
    projector: &Projector,
    coords: &ScreenCoords,
    vert_cull: &[bool],
    tri: usize,
    v: [Vec4; 3],
) -> bool {
    if !projector.is_ortho() && v.iter().any(|&p| is_behind_near_clip(p)) {
        return true;
    }

    let s = v.map(|p| p.xy());
    if shared.source != ProjectionSource::ViewFill {
        let (min, max) = (coords.min, coords.max);
        if s.iter().all(|p| p.x < min.x)
            || s.iter().all(|p| p.x > max.x)
            || s.iter().all(|p| p.y < min.y)
            || s.iter().all(|p| p.y > max.y)
        {
            return true;
        }
    }

    if !shared.backface_cull {
        return false;
    }
    if shared.masks.normal.is_some() {
        // The normal mask culls whole polygons
        let face = shared.mesh.tri_face(tri);
        return shared
            .mesh
            .face_verts(face)
            .iter()
            .all(|&vert| vert_cull[vert as usize]);
    }
    (line_point_side_v2(s[0], s[1], s[2]) < 0.0) != projector.is_flip_object
}
