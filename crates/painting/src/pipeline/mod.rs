//! Projection painting pipeline
//!
//! This module connects the engine's parts into a stroke:
//! - Setup (`prepare`): resolve the image of every triangle, build the
//!   shared stroke data and one [`PaintSession`] per symmetry view
//! - Painting (`stroke`): walk the buckets under the brush on a worker pool
//!   and apply the brush operator to every paint pixel
//! - Re-projection (`reproject`): paint a whole image back onto the mesh
//! - Undo (`undo`): hand the captured tiles over when the stroke ends
//!
//! The host owns the images. It keeps `Arc` handles to the image buffers
//! and sees the painted pixels through them, since every pixel write goes
//! straight into the shared buffer.

mod executor;
mod prepare;
mod reproject;
mod stroke;
mod undo;

use std::sync::Arc;

use glam::{Mat4, Vec2, Vec3};
use projpaint_config::{PaintSettings, SampleInterpolation};
use thiserror::Error;

use crate::blend::OperatorContext;
use crate::brush::{BlurKernel, BrushSettings, BrushTexture};
use crate::bucket::BucketGrid;
use crate::image::{PaintImage, TriTarget};
use crate::mesh::{ImageId, MeshError, MeshSnapshot};
use crate::occlusion::ScreenView;
use crate::projection::{Projector, ScreenCoords, ViewDataError, ViewParams};
use crate::raster::{CloneSource, PixelMasks, RasterContext};
use crate::seam::SeamData;
use crate::surface::ImageBuffer;
use crate::tiles::ProjectedImage;
use crate::types::{BrushKind, ProjectionSource, StrokeMode, Symmetry};
use crate::validation::{MissingDataError, TargetImages};

pub use executor::WorkerPool;
pub use reproject::{CameraParams, ReprojectOutcome, ReprojectRequest, reproject_image, store_view_data};
pub use stroke::StagedWrite;

/// Errors that prevent a stroke from starting
#[derive(Debug, Error)]
pub enum PaintSetupError {
    #[error(transparent)]
    MissingData(#[from] MissingDataError),
    #[error("Invalid mesh: {0}")]
    Mesh(#[from] MeshError),
    #[error(transparent)]
    ViewData(#[from] ViewDataError),
    #[error("Image {0:?} could not be found")]
    UnknownImage(ImageId),
    #[error("Image data could not be found for '{0}'")]
    NoImageData(String),
    #[error("No active camera set")]
    MissingCamera,
}

/// Everything needed to begin a stroke
#[derive(Debug, Clone)]
pub struct StrokeRequest {
    pub mesh: MeshSnapshot,
    pub images: Vec<PaintImage>,
    pub targets: TargetImages,
    pub settings: PaintSettings,
    pub brush: BrushSettings,
    pub mode: StrokeMode,
    pub view: ViewParams,
    pub object_to_world: Mat4,
    pub symmetry: Symmetry,
    /// UV layer the stencil image is mapped with (active layer when None)
    pub stencil_uv_layer: Option<usize>,
    /// UV layer the clone image is mapped with in image mode
    pub clone_uv_layer: Option<usize>,
    pub color_texture: Option<Arc<dyn BrushTexture>>,
    pub mask_texture: Option<Arc<dyn BrushTexture>>,
    /// World position of the 3D cursor, the clone brush's source point
    pub cursor: Vec3,
    /// Screen position where the stroke starts
    pub mouse: Vec2,
}

impl StrokeRequest {
    pub fn new(mesh: MeshSnapshot, images: Vec<PaintImage>, view: ViewParams) -> Self {
        Self {
            mesh,
            images,
            targets: TargetImages::default(),
            settings: PaintSettings::default(),
            brush: BrushSettings::default(),
            mode: StrokeMode::Normal,
            view,
            object_to_world: Mat4::IDENTITY,
            symmetry: Symmetry::NONE,
            stencil_uv_layer: None,
            clone_uv_layer: None,
            color_texture: None,
            mask_texture: None,
            cursor: Vec3::ZERO,
            mouse: Vec2::ZERO,
        }
    }
}

/// One step of the stroke, in screen pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StrokeSample {
    pub last_pos: Vec2,
    pub pos: Vec2,
    pub radius: f32,
    /// Paint with the erase alpha blend
    pub eraser: bool,
}

impl StrokeSample {
    /// A dab at `pos` that did not move since the last one
    pub fn dab(pos: Vec2, radius: f32) -> Self {
        Self {
            last_pos: pos,
            pos,
            radius,
            eraser: false,
        }
    }
}

/// Result of one stroke step
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StrokeOutcome {
    /// Any pixel was painted
    pub touched: bool,
    /// Mean world position of the surface under the brush across views
    pub pivot: Option<Vec3>,
}

/// Stroke state shared by every symmetry view
#[derive(Debug)]
pub struct SharedPaintData {
    pub mesh: MeshSnapshot,
    pub images: Vec<PaintImage>,
    pub brush: BrushSettings,
    /// Brush kind after stroke mode overrides
    pub kind: BrushKind,
    pub source: ProjectionSource,
    pub ops: OperatorContext,
    pub color_texture: Option<Arc<dyn BrushTexture>>,
    pub mask_texture: Option<Arc<dyn BrushTexture>>,
    /// Paint target of each triangle
    pub targets: Vec<Option<TriTarget>>,
    /// Projected image of each triangle, None for triangles not painted
    pub tri_image: Vec<Option<u16>>,
    pub proj_images: Vec<ProjectedImage>,
    pub clone: CloneSource,
    pub masks: PixelMasks,
    pub seams: Option<SeamData>,
    pub blur: BlurKernel,
    /// Image painted back by re-projection
    pub reproject_source: Option<Arc<ImageBuffer>>,
    pub occlude: bool,
    pub backface_cull: bool,
    /// The colour texture is sampled in object space
    pub world_coords: bool,
    pub interpolation: SampleInterpolation,
}

/// Projection state of one symmetry view
#[derive(Debug)]
pub struct PaintSession {
    pub symmetry: Symmetry,
    pub projector: Projector,
    pub coords: ScreenCoords,
    /// Vertices facing away past the normal angle
    pub vert_cull: Vec<bool>,
    pub grid: BucketGrid,
    /// Screen offset from a pixel to the point the clone brush samples
    pub clone_offset: Vec2,
}

impl PaintSession {
    pub fn screen_view<'a>(&'a self, mesh: &'a MeshSnapshot) -> ScreenView<'a> {
        ScreenView {
            mesh,
            coords: &self.coords,
            projector: &self.projector,
            grid: &self.grid,
        }
    }
}

fn raster_context<'a>(shared: &'a SharedPaintData, session: &'a PaintSession) -> RasterContext<'a> {
    RasterContext {
        view: session.screen_view(&shared.mesh),
        images: &shared.images,
        targets: &shared.targets,
        tri_image: &shared.tri_image,
        proj_images: &shared.proj_images,
        masks: &shared.masks,
        clone: &shared.clone,
        clone_offset: session.clone_offset,
        seams: shared.seams.as_ref(),
        occlude: shared.occlude,
        backface_cull: shared.backface_cull,
        world_coords: shared.world_coords,
        interpolation: shared.interpolation,
    }
}

/// A projection paint stroke in progress.
///
/// The lifecycle is:
/// 1. [`ProjectionStroke::begin`] validates the request and prepares every view
/// 2. [`ProjectionStroke::stroke_to`] paints one brush step
/// 3. [`ProjectionStroke::refresh_tagged`] collects regions to redraw
/// 4. [`ProjectionStroke::finish`] returns the undo tiles
pub struct ProjectionStroke {
    pub(crate) shared: Arc<SharedPaintData>,
    pub(crate) sessions: Vec<PaintSession>,
    pub(crate) pool: WorkerPool,
}

impl ProjectionStroke {
    pub fn shared(&self) -> &SharedPaintData {
        &self.shared
    }

    pub fn sessions(&self) -> &[PaintSession] {
        &self.sessions
    }

    /// Number of images (per UDIM tile) the stroke paints into
    pub fn projected_image_count(&self) -> usize {
        self.shared.proj_images.len()
    }

    pub fn thread_count(&self) -> usize {
        self.pool.thread_count()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use glam::{Mat4, Vec2, Vec3};

    use super::*;
    use crate::mesh::{MaterialSlot, PaintSlot};

    /// Orthographic view looking down -Z onto the quad, which fills the
    /// middle half of a 64x64 window
    pub fn ortho_view() -> ViewParams {
        let winmat = Mat4::orthographic_rh_gl(-2.0, 2.0, -2.0, 2.0, 0.1, 10.0);
        let viewmat = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO, Vec3::Y);
        ViewParams::new(Vec2::splat(64.0), winmat, viewmat, 0.1, 10.0, true)
    }

    /// A single byte image painted through the quad's material
    pub fn quad_request(buffer: ImageBuffer) -> StrokeRequest {
        let mesh = MeshSnapshot::quad().with_material(MaterialSlot {
            paint_slot: Some(PaintSlot {
                image: ImageId(0),
                uv_layer: None,
            }),
            clone_slot: None,
        });
        let images = vec![PaintImage::new("canvas", buffer)];
        let mut request = StrokeRequest::new(mesh, images, ortho_view());
        request.settings.threads = Some(1);
        request.settings.seam_bleed = 0;
        request
    }

    pub fn canvas(request: &StrokeRequest) -> Arc<ImageBuffer> {
        match request.images[0].first_buffer() {
            Some(buffer) => Arc::clone(buffer),
            None => panic!("canvas has a buffer"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::surface::PixelValue;

    #[test]
    fn test_setup_error_messages() {
        assert_eq!(PaintSetupError::MissingCamera.to_string(), "No active camera set");
        assert_eq!(
            PaintSetupError::NoImageData("render".into()).to_string(),
            "Image data could not be found for 'render'"
        );
    }

    #[test]
    fn test_stroke_sample_dab() {
        let sample = StrokeSample::dab(Vec2::new(3.0, 4.0), 5.0);
        assert_eq!(sample.last_pos, sample.pos);
        assert!(!sample.eraser);
    }

    #[test]
    fn test_raster_context_uses_session_view() {
        let request = quad_request(ImageBuffer::new_byte(16, 16, [0, 0, 0, 255]));
        let stroke = ProjectionStroke::begin(request).unwrap();
        let session = &stroke.sessions()[0];
        let ctx = raster_context(stroke.shared(), session);
        assert_eq!(ctx.proj_images.len(), 1);
        assert!(std::ptr::eq(ctx.view.grid, &session.grid));
        assert_eq!(ctx.tri_image, &[Some(0), Some(0)]);
        assert_eq!(
            stroke.shared().proj_images[0].buffer().get_pixel(0, 0),
            Some(PixelValue::Byte([0, 0, 0, 255]))
        );
    }
}
