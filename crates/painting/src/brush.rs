//! Brush parameters for projection strokes
//!
//! This module holds everything a stroke reads from the brush:
//! - [`BrushSettings`] - kind, blend mode, radius, strength and colour
//! - [`FalloffCurve`] - radial strength presets
//! - [`BlurKernel`] - weights for the soften brush
//! - [`Gradient`] - colour ramp for the gradient fill
//! - [`BrushTexture`] - colour and mask textures sampled per pixel

use std::fmt;

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::types::{BlendMode, BrushKind};

/// Radial falloff presets, evaluated on `p = 1 - dist / radius`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FalloffCurve {
    #[default]
    Smooth,
    Sphere,
    Root,
    Sharp,
    Linear,
    /// No falloff, full strength up to the radius
    Constant,
    Smoother,
    Pow4,
    InvSquare,
}

impl FalloffCurve {
    /// Strength at `dist` from the brush centre, clamped to 0..1.
    ///
    /// Returns 0 at and beyond the radius.
    pub fn strength(self, dist: f32, radius: f32) -> f32 {
        if radius <= 0.0 {
            return 0.0;
        }
        let p = dist / radius;
        if p >= 1.0 {
            return 0.0;
        }
        let p = 1.0 - p;
        let strength = match self {
            FalloffCurve::Smooth => 3.0 * p * p - 2.0 * p * p * p,
            FalloffCurve::Sphere => (2.0 * p - p * p).sqrt(),
            FalloffCurve::Root => p.sqrt(),
            FalloffCurve::Sharp => p * p,
            FalloffCurve::Linear => p,
            FalloffCurve::Constant => 1.0,
            FalloffCurve::Smoother => p * p * p * (p * (p * 6.0 - 15.0) + 10.0),
            FalloffCurve::Pow4 => p * p * p * p,
            FalloffCurve::InvSquare => p * (2.0 - p),
        };
        strength.clamp(0.0, 1.0)
    }
}

/// Weighting of the soften brush samples
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum BlurKind {
    #[default]
    Gaussian,
    Box,
}

/// Square kernel of sample weights, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct BlurKernel {
    pub side: usize,
    pub weights: Vec<f32>,
}

impl BlurKernel {
    /// The 2x2 kernel used by projection painting (radius of half a pixel)
    pub fn projection(kind: BlurKind) -> Self {
        let side = 2;
        let radius = 0.5f32;
        let weights = match kind {
            BlurKind::Box => vec![1.0; side * side],
            BlurKind::Gaussian => {
                // Three standard deviations reach the kernel edge
                let std_dev = radius / 3.0;
                let denom = -2.0 * std_dev * std_dev;
                let mut weights = vec![0.0; side * side];
                for j in 0..side {
                    for i in 0..side {
                        let idist = radius - i as f32;
                        let jdist = radius - j as f32;
                        weights[i + j * side] = ((idist * idist + jdist * jdist) / denom).exp();
                    }
                }
                weights
            }
        };
        Self { side, weights }
    }

    #[inline]
    pub fn weight(&self, x: usize, y: usize) -> f32 {
        self.weights[x + y * self.side]
    }
}

/// How the gradient factor is measured from the fill line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GradientMode {
    #[default]
    Linear,
    Radial,
}

/// A colour stop of a gradient ramp (linear RGBA, straight alpha)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    pub position: f32,
    pub color: [f32; 4],
}

/// Colour ramp painted by the gradient fill
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gradient {
    pub mode: GradientMode,
    pub stops: Vec<GradientStop>,
}

impl Gradient {
    /// Two stop gradient
    pub fn new(mode: GradientMode, from: [f32; 4], to: [f32; 4]) -> Self {
        Self {
            mode,
            stops: vec![
                GradientStop {
                    position: 0.0,
                    color: from,
                },
                GradientStop {
                    position: 1.0,
                    color: to,
                },
            ],
        }
    }

    /// Colour at factor `f`, clamped to the end stops
    pub fn evaluate(&self, f: f32) -> [f32; 4] {
        let (Some(first), Some(last)) = (self.stops.first(), self.stops.last()) else {
            return [0.0; 4];
        };
        if f <= first.position {
            return first.color;
        }
        if f >= last.position {
            return last.color;
        }
        for pair in self.stops.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if f <= b.position {
                let span = b.position - a.position;
                let t = if span > 0.0 { (f - a.position) / span } else { 1.0 };
                let mut out = [0.0; 4];
                for c in 0..4 {
                    out[c] = a.color[c] + (b.color[c] - a.color[c]) * t;
                }
                return out;
            }
        }
        last.color
    }
}

/// Coordinates a brush texture is sampled with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TextureMapping {
    /// Screen position, following the brush
    #[default]
    ViewPlane,
    Tiled,
    Stencil,
    /// Object space position of the pixel
    ThreeD,
}

/// A texture sampled per paint pixel.
///
/// Implementations must be thread safe, they are sampled from every worker.
pub trait BrushTexture: Send + Sync + fmt::Debug {
    fn mapping(&self) -> TextureMapping {
        TextureMapping::ViewPlane
    }

    /// RGBA at a screen position (`z = 0`) or object position for 3D mapping
    fn sample(&self, co: Vec3) -> [f32; 4];
}

/// Brush state captured when a stroke begins
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrushSettings {
    pub kind: BrushKind,
    pub blend: BlendMode,
    /// Radius in screen pixels
    pub radius: f32,
    /// Strength 0.0-1.0
    pub alpha: f32,
    pub falloff: FalloffCurve,
    /// Linear RGB paint colour
    pub color: [f32; 3],
    /// Let repeated dabs exceed the single dab strength
    pub accumulate: bool,
    /// Airbrush strokes paint continuously without opacity masking
    pub airbrush: bool,
    /// Keep the original alpha of painted pixels
    pub lock_alpha: bool,
    /// Stencil value written by the mask brush
    pub weight: f32,
    /// Edge threshold of the sharpen (inverted soften) brush
    pub sharp_threshold: f32,
    pub blur_kind: BlurKind,
    /// Soften brush defaults to sharpening
    pub invert_direction: bool,
    /// Gradient for the fill brush (None = flat colour)
    pub gradient: Option<Gradient>,
}

impl Default for BrushSettings {
    fn default() -> Self {
        Self {
            kind: BrushKind::Draw,
            blend: BlendMode::Mix,
            radius: 25.0,
            alpha: 1.0,
            falloff: FalloffCurve::Smooth,
            color: [1.0, 1.0, 1.0],
            accumulate: false,
            airbrush: false,
            lock_alpha: false,
            weight: 1.0,
            sharp_threshold: 0.0,
            blur_kind: BlurKind::Gaussian,
            invert_direction: false,
            gradient: None,
        }
    }
}

impl BrushSettings {
    /// A draw brush with the given linear colour and radius
    pub fn draw(color: [f32; 3], radius: f32) -> Self {
        Self {
            color,
            radius,
            ..Self::default()
        }
    }

    /// Radius times two, never below one pixel
    pub fn diameter(&self) -> f32 {
        (self.radius * 2.0).max(1.0)
    }

    /// Whether repeated dabs are limited through the per-pixel accumulation mask.
    ///
    /// Continuous or sampling brushes paint directly over the current pixels.
    pub fn uses_opacity_masking(&self, color_texture: Option<TextureMapping>) -> bool {
        if self.airbrush
            || self.gradient.is_some()
            || matches!(self.kind, BrushKind::Smear | BrushKind::Soften | BrushKind::Fill)
        {
            return false;
        }
        !matches!(color_texture, Some(TextureMapping::ViewPlane))
    }

    /// Lock alpha has no effect on the alpha editing blend modes
    pub fn locks_alpha(&self) -> bool {
        self.lock_alpha && !self.blend.edits_alpha()
    }
}
