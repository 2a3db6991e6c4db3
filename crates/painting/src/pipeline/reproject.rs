//! Re-projection of a rendered image back onto the mesh
//!
//! The source image is projected through the view it was rendered from:
//! the view data stored on the image when present, the scene camera
//! otherwise. Every bucket of the grid is painted in a single pass.

use std::sync::Arc;

use glam::{Mat4, Vec2};
use projpaint_config::PaintSettings;
use tracing::{debug, info};

use super::prepare::{SharedInput, build_session, build_shared, stroke_pool};
use super::{PaintSetupError, ProjectionStroke, StrokeSample};
use crate::blend::OperatorContext;
use crate::brush::BrushSettings;
use crate::constants::{REPROJECT_BRUSH_SIZE, VIEW_DATA_ID};
use crate::image::PaintImage;
use crate::mesh::{ImageId, MeshSnapshot};
use crate::projection::{ViewData, ViewParams};
use crate::tiles::{DirtyRegion, UndoHandoff};
use crate::types::{BlendMode, BrushKind, ProjectionSource, Symmetry};
use crate::validation::{TargetImages, check_mesh_data};

/// The scene camera, used when the source image carries no view data
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraParams {
    pub camera_to_world: Mat4,
    pub winmat: Mat4,
    pub clip_start: f32,
    pub clip_end: f32,
    pub is_ortho: bool,
    /// Render resolution in pixels
    pub render_size: Vec2,
}

/// Everything needed to project an image back onto a mesh
#[derive(Debug, Clone)]
pub struct ReprojectRequest {
    pub mesh: MeshSnapshot,
    pub images: Vec<PaintImage>,
    pub targets: TargetImages,
    pub settings: PaintSettings,
    pub object_to_world: Mat4,
    /// Image painted back onto the mesh
    pub source_image: ImageId,
    pub camera: Option<CameraParams>,
}

/// Result of a re-projection
#[derive(Debug)]
pub struct ReprojectOutcome {
    pub touched: bool,
    pub dirty: Vec<DirtyRegion>,
    pub undo: UndoHandoff,
}

/// Store the view an image was rendered from, so it can be projected back
/// later without a camera
pub fn store_view_data(image: &mut PaintImage, view: &ViewParams) {
    image.set_property(VIEW_DATA_ID, view.view_data().to_property());
}

/// Project `source_image` onto the mesh through the view it was rendered from.
///
/// # Errors
/// Missing mesh data, an unknown source image or one without pixels, view
/// data that does not parse, or no view data and no camera.
pub fn reproject_image(request: ReprojectRequest) -> Result<ReprojectOutcome, PaintSetupError> {
    let ReprojectRequest {
        mesh,
        images,
        targets,
        settings,
        object_to_world,
        source_image,
        camera,
    } = request;

    mesh.validate()?;
    check_mesh_data(&mesh, &images, &settings, &targets, BrushKind::Draw)?;

    let source = images
        .get(source_image.0 as usize)
        .ok_or(PaintSetupError::UnknownImage(source_image))?;
    let source_buffer = source
        .first_buffer()
        .cloned()
        .ok_or_else(|| PaintSetupError::NoImageData(source.name.clone()))?;

    let (view, projection) = match source.property(VIEW_DATA_ID) {
        Some(value) => {
            let data = ViewData::from_property(value)?;
            let size = Vec2::new(source_buffer.width as f32, source_buffer.height as f32);
            (ViewParams::from_view_data(&data, size), ProjectionSource::ImageView)
        }
        None => {
            let camera = camera.ok_or(PaintSetupError::MissingCamera)?;
            let view = ViewParams::from_camera(
                camera.camera_to_world,
                camera.winmat,
                camera.clip_start,
                camera.clip_end,
                camera.is_ortho,
                camera.render_size,
            );
            (view, ProjectionSource::ImageCamera)
        }
    };
    debug!("Re-projecting '{}' through {:?}", source.name, projection);

    let ops = OperatorContext {
        blend: BlendMode::Mix,
        masking: false,
        dither: settings.dither,
        ..OperatorContext::default()
    };
    let threads = settings.threads;
    let shared = build_shared(SharedInput {
        mesh,
        images,
        targets,
        settings,
        brush: BrushSettings::default(),
        kind: BrushKind::Draw,
        source: projection,
        ops,
        stencil_uv_layer: None,
        clone_uv_layer: None,
        color_texture: None,
        mask_texture: None,
        reproject_source: Some(Arc::clone(&source_buffer)),
    });

    let session = build_session(
        &shared,
        &view,
        object_to_world,
        Symmetry::NONE,
        REPROJECT_BRUSH_SIZE,
        false,
    );
    let sessions = vec![session];
    let pool = stroke_pool(threads, &sessions);
    let mut stroke = ProjectionStroke {
        shared: Arc::new(shared),
        sessions,
        pool,
    };

    // Re-projection ignores the brush position and paints every bucket
    let outcome = stroke.stroke_to(&StrokeSample::dab(Vec2::ZERO, REPROJECT_BRUSH_SIZE * 0.5));
    let dirty = stroke.refresh_tagged();
    let undo = stroke.finish();
    info!(
        "Re-projection done: {} regions, {} undo tiles",
        dirty.len(),
        undo.records.len()
    );

    Ok(ReprojectOutcome {
        touched: outcome.touched,
        dirty,
        undo,
    })
}
