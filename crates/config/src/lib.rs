//! Shared tool settings for projection painting
//!
//! This crate provides the single source of truth for the per-scene paint
//! settings a stroke reads when it begins: target selection, seam bleed,
//! occlusion and culling toggles, stencil/clone layers and the cavity mask.
//! Brush parameters live with the engine in `projpaint::brush`.

use serde::{Deserialize, Serialize};

/// Default seam bleed distance in pixels
pub const DEFAULT_SEAM_BLEED: u16 = 2;

/// Default normal cutoff angle in degrees
pub const DEFAULT_NORMAL_ANGLE: f32 = 80.0;

/// Default dither amount (0.0 = no dither)
pub const DEFAULT_DITHER: f32 = 0.0;

/// How the paint target image is chosen per face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum PaintTargetMode {
    /// Each face paints into the active slot of its material
    #[default]
    Material,
    /// Every face paints into one canvas image using the active UV map
    Image,
}

/// Sampling used when colors are picked back from the mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SampleInterpolation {
    #[default]
    Linear,
    Closest,
}

/// Piecewise linear curve remapping cavity values.
///
/// Points are `[x, y]` pairs sorted by `x`; evaluation clamps to the end
/// points outside the covered range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CavityCurve {
    pub points: Vec<[f32; 2]>,
}

impl Default for CavityCurve {
    fn default() -> Self {
        Self {
            points: vec![[0.0, 0.0], [1.0, 1.0]],
        }
    }
}

impl CavityCurve {
    /// Create a curve from control points, sorting them by x
    pub fn new(mut points: Vec<[f32; 2]>) -> Self {
        points.sort_by(|a, b| a[0].total_cmp(&b[0]));
        Self { points }
    }

    /// Evaluate the curve at `x`
    pub fn evaluate(&self, x: f32) -> f32 {
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return x;
        };
        if x <= first[0] {
            return first[1];
        }
        if x >= last[0] {
            return last[1];
        }
        for pair in self.points.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if x <= b[0] {
                let span = b[0] - a[0];
                if span <= f32::EPSILON {
                    return b[1];
                }
                let t = (x - a[0]) / span;
                return a[1] + (b[1] - a[1]) * t;
            }
        }
        last[1]
    }
}

/// Paint settings read once per stroke
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PaintSettings {
    /// Where faces get their target image from
    pub mode: PaintTargetMode,
    /// Pixels to extend paint past UV island seams (0 disables bleed)
    pub seam_bleed: u16,
    /// Faces angled further than this (degrees) from the view are not painted
    pub normal_angle: f32,
    /// Skip faces pointing away from the view
    pub backface_cull: bool,
    /// Test paint points against nearer geometry
    pub occlude: bool,
    /// Fade paint on faces angled away from the view
    pub normal_mask: bool,
    /// Use the stencil image on the stencil UV layer as a paint mask
    pub layer_stencil: bool,
    /// Invert the stencil mask
    pub stencil_invert: bool,
    /// Clone brushes sample the clone image through the clone UV layer
    pub layer_clone: bool,
    /// Mask paint by mesh cavity
    pub cavity_mask: bool,
    /// Remapping applied to cavity values
    pub cavity_curve: CavityCurve,
    /// Dither strength when painting into byte images
    pub dither: f32,
    /// Sampling for color picking
    pub interpolation: SampleInterpolation,
    /// Only paint faces selected in the original mesh
    pub face_selection_mask: bool,
    /// Worker thread override (None = detected core count)
    pub threads: Option<usize>,
}

impl Default for PaintSettings {
    fn default() -> Self {
        Self {
            mode: PaintTargetMode::Material,
            seam_bleed: DEFAULT_SEAM_BLEED,
            normal_angle: DEFAULT_NORMAL_ANGLE,
            backface_cull: true,
            occlude: true,
            normal_mask: true,
            layer_stencil: false,
            stencil_invert: false,
            layer_clone: false,
            cavity_mask: false,
            cavity_curve: CavityCurve::default(),
            dither: DEFAULT_DITHER,
            interpolation: SampleInterpolation::Linear,
            face_selection_mask: false,
            threads: None,
        }
    }
}

impl PaintSettings {
    /// Settings for painting through the whole mesh (x-ray, no culling)
    pub fn xray() -> Self {
        Self {
            backface_cull: false,
            occlude: false,
            normal_mask: false,
            ..Self::default()
        }
    }

    /// Seam bleed distance as a float pixel count
    pub fn seam_bleed_px(&self) -> f32 {
        self.seam_bleed as f32
    }
}
