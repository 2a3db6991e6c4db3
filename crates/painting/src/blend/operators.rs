//! Per-brush pixel operators
//!
//! Every operator is a pure function of the pixel's current value, its
//! original value from the undo tile and the effective mask. Operators that
//! sample neighbouring pixels (smear, soften) receive the sampled colour from
//! the caller and return a value to stage, never writing directly.

use super::{
    blend_byte, blend_float, blend_pixel, float_to_byte_dither_v3, interpolate_byte,
    interpolate_float, linear_to_srgb_v3, luminance, unit_float_to_uchar_clamp_v3,
};
use crate::constants::MASK_MAX;
use crate::surface::{PixelValue, unit_float_to_uchar_clamp};
use crate::types::BlendMode;

/// Stroke-wide inputs shared by the operators
#[derive(Debug, Clone, Copy)]
pub struct OperatorContext {
    pub blend: BlendMode,
    /// Blend against the original pixel instead of the current one
    pub masking: bool,
    /// Dither strength for byte targets
    pub dither: f32,
    /// Value painted by the mask brush
    pub stencil_value: f32,
    /// Soften sharpens instead of blurring
    pub sharpen: bool,
    pub sharp_threshold: f32,
}

impl Default for OperatorContext {
    fn default() -> Self {
        Self {
            blend: BlendMode::Mix,
            masking: true,
            dither: 0.0,
            stencil_value: 1.0,
            sharpen: false,
            sharp_threshold: 0.0,
        }
    }
}

impl OperatorContext {
    #[inline]
    fn base(&self, current: PixelValue, orig: PixelValue) -> PixelValue {
        if self.masking { orig } else { current }
    }
}

/// Paint colour as written into a byte image: sRGB encoded for sRGB images
pub fn byte_paint_color(linear: [f32; 3], srgb: bool) -> [f32; 3] {
    if srgb { linear_to_srgb_v3(linear) } else { linear }
}

fn to_bytes_rgb(rgb: [f32; 3], dither: f32, x: i32, y: i32) -> [u8; 3] {
    if dither > 0.0 {
        float_to_byte_dither_v3(rgb, dither, x, y)
    } else {
        unit_float_to_uchar_clamp_v3(rgb)
    }
}

/// Draw brush: brush colour (optionally times texture colour) at `mask` strength.
///
/// # Arguments
/// * `color` - Linear brush colour
/// * `texture_rgb` - Colour texture sample, if the brush has one
/// * `srgb` - Byte target stores sRGB values
/// * `x`, `y` - Pixel position, used for dithering
#[allow(clippy::too_many_arguments)]
pub fn draw(
    ctx: &OperatorContext,
    current: PixelValue,
    orig: PixelValue,
    color: [f32; 3],
    texture_rgb: Option<[f32; 3]>,
    srgb: bool,
    mask: f32,
    x: i32,
    y: i32,
) -> PixelValue {
    let base = ctx.base(current, orig);
    match current {
        PixelValue::Byte(_) => {
            let rgb = match texture_rgb {
                Some(tex) => byte_paint_color(
                    [tex[0] * color[0], tex[1] * color[1], tex[2] * color[2]],
                    srgb,
                ),
                None => byte_paint_color(color, srgb),
            };
            let [r, g, b] = to_bytes_rgb(rgb, ctx.dither, x, y);
            let paint = [r, g, b, unit_float_to_uchar_clamp(mask)];
            PixelValue::Byte(blend_byte(base.to_straight_byte(), paint, ctx.blend))
        }
        PixelValue::Float(_) => {
            let mut rgb = color;
            if let Some(tex) = texture_rgb {
                for c in 0..3 {
                    rgb[c] *= tex[c];
                }
            }
            let paint = [rgb[0] * mask, rgb[1] * mask, rgb[2] * mask, mask];
            PixelValue::Float(blend_float(base.to_premul_float(), paint, ctx.blend))
        }
    }
}

/// Clone brush: the clone sample with its alpha scaled by `mask`.
///
/// Returns None when the clone sample is fully transparent.
pub fn clone(
    ctx: &OperatorContext,
    current: PixelValue,
    orig: PixelValue,
    sample: PixelValue,
    mask: f32,
) -> Option<PixelValue> {
    let base = ctx.base(current, orig);
    match current {
        PixelValue::Byte(_) => {
            let mut paint = sample.to_straight_byte();
            if paint[3] == 0 {
                return None;
            }
            paint[3] = (paint[3] as f32 * mask) as u8;
            Some(PixelValue::Byte(blend_byte(base.to_straight_byte(), paint, ctx.blend)))
        }
        PixelValue::Float(_) => {
            let sample = sample.to_premul_float();
            if sample[3] == 0.0 {
                return None;
            }
            let paint = sample.map(|c| c * mask);
            Some(PixelValue::Float(blend_float(base.to_premul_float(), paint, ctx.blend)))
        }
    }
}

/// Smear brush: move the current pixel towards the colour picked behind the stroke
pub fn smear(current: PixelValue, picked: PixelValue, mask: f32) -> PixelValue {
    match current {
        PixelValue::Byte(b) => PixelValue::Byte(interpolate_byte(b, picked.to_straight_byte(), mask)),
        PixelValue::Float(f) => {
            PixelValue::Float(interpolate_float(f, picked.to_premul_float(), mask))
        }
    }
}

/// Soften brush given the kernel-weighted average of the neighbourhood
/// (premultiplied float).
///
/// Blurring interpolates towards the average. Sharpening adds the luminance
/// of the high-pass difference and returns None when it does not exceed the
/// sharpen threshold.
pub fn soften(
    ctx: &OperatorContext,
    current: PixelValue,
    blurred: [f32; 4],
    mask: f32,
) -> Option<PixelValue> {
    if ctx.sharpen {
        let pixel = current.to_premul_float();
        let lum = luminance([
            pixel[0] - blurred[0],
            pixel[1] - blurred[1],
            pixel[2] - blurred[2],
        ]);
        if lum.abs() <= ctx.sharp_threshold {
            return None;
        }
        let alpha = pixel[3];
        let edge = [lum, lum, lum, mask];
        let base = [pixel[0], pixel[1], pixel[2], mask];
        let mut sharpened = blend_float(base, edge, BlendMode::Add);
        sharpened[3] = alpha;
        return Some(match current {
            PixelValue::Byte(_) => PixelValue::Byte(PixelValue::Float(sharpened).to_straight_byte()),
            PixelValue::Float(_) => PixelValue::Float(sharpened),
        });
    }

    Some(match current {
        PixelValue::Byte(b) => {
            let blurred = PixelValue::Float(blurred).to_straight_byte();
            PixelValue::Byte(interpolate_byte(b, blurred, mask))
        }
        PixelValue::Float(f) => PixelValue::Float(interpolate_float(f, blurred, mask)),
    })
}

/// Mask brush: flat stencil value at `mask` strength
pub fn stencil(ctx: &OperatorContext, current: PixelValue, orig: PixelValue, mask: f32) -> PixelValue {
    let base = ctx.base(current, orig);
    match current {
        PixelValue::Byte(_) => {
            let v = (ctx.stencil_value * 255.0).clamp(0.0, 255.0) as u8;
            let paint = [v, v, v, unit_float_to_uchar_clamp(mask)];
            PixelValue::Byte(blend_byte(base.to_straight_byte(), paint, ctx.blend))
        }
        PixelValue::Float(_) => {
            let v = ctx.stencil_value;
            PixelValue::Float(blend_float(base.to_premul_float(), [v, v, v, mask], ctx.blend))
        }
    }
}

/// Fill brush: a straight alpha linear colour (flat or from a gradient)
/// blended against the original pixel
pub fn fill(
    ctx: &OperatorContext,
    orig: PixelValue,
    color: [f32; 4],
    srgb: bool,
    x: i32,
    y: i32,
) -> PixelValue {
    match orig {
        PixelValue::Byte(b) => {
            let rgb = byte_paint_color([color[0], color[1], color[2]], srgb);
            let [r, g, bl] = to_bytes_rgb(rgb, ctx.dither, x, y);
            let paint = [r, g, bl, unit_float_to_uchar_clamp(color[3])];
            PixelValue::Byte(blend_byte(b, paint, ctx.blend))
        }
        PixelValue::Float(f) => {
            let a = color[3];
            PixelValue::Float(blend_float(f, [color[0] * a, color[1] * a, color[2] * a, a], ctx.blend))
        }
    }
}

/// Candidate accumulated mask of a masked brush, as a 16-bit value.
///
/// `strength` is the brush alpha times the custom mask. Accumulating
/// brushes add the full dab strength, others add only what the falloff
/// leaves above the stored value. The caller stores the result only when
/// it exceeds `accum`, so the mask never decreases during a stroke.
pub fn accumulated_mask(accum: u16, strength: f32, falloff: f32, accumulate: bool) -> u16 {
    let accum = accum as f32;
    let max_mask = strength * falloff * MASK_MAX;
    let mask = if accumulate {
        accum + max_mask
    } else {
        accum + (max_mask - accum * falloff)
    };
    mask.clamp(0.0, MASK_MAX) as u16
}

/// Re-projection: the source sample scaled by `mask`, mixed over the
/// original pixel. None when the sample is fully transparent.
pub fn reproject(orig: PixelValue, sample: PixelValue, mask: f32) -> Option<PixelValue> {
    match orig {
        PixelValue::Byte(_) => {
            let mut paint = sample.to_straight_byte();
            if paint[3] == 0 {
                return None;
            }
            paint[3] = (paint[3] as f32 * mask) as u8;
            Some(blend_pixel(orig, PixelValue::Byte(paint), BlendMode::Mix))
        }
        PixelValue::Float(_) => {
            let paint = sample.to_premul_float();
            if paint[3] == 0.0 {
                return None;
            }
            Some(blend_pixel(
                orig,
                PixelValue::Float(paint.map(|c| c * mask)),
                BlendMode::Mix,
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_draw_full_mask_gives_brush_colour() {
        let ctx = OperatorContext::default();
        let orig = PixelValue::Byte([0, 0, 0, 255]);
        let out = draw(&ctx, orig, orig, [1.0, 0.0, 0.0], None, false, 1.0, 0, 0);
        assert_eq!(out, PixelValue::Byte([255, 0, 0, 255]));
    }

    #[test]
    fn test_draw_srgb_conversion() {
        let ctx = OperatorContext::default();
        let orig = PixelValue::Byte([0, 0, 0, 255]);
        let PixelValue::Byte(out) = draw(&ctx, orig, orig, [0.5; 3], None, true, 1.0, 0, 0) else {
            panic!("byte pixel expected");
        };
        // linear 0.5 is about 188 in sRGB
        assert!((out[0] as i32 - 188).abs() <= 1);
    }

    #[test]
    fn test_draw_float_premultiplies() {
        let ctx = OperatorContext::default();
        let orig = PixelValue::Float([0.0, 0.0, 0.0, 0.0]);
        let out = draw(&ctx, orig, orig, [1.0, 0.5, 0.0], None, false, 0.5, 0, 0);
        assert_eq!(out, PixelValue::Float([0.5, 0.25, 0.0, 0.5]));
    }

    #[test]
    fn test_masked_draw_blends_against_original() {
        let ctx = OperatorContext::default();
        let orig = PixelValue::Float([0.0, 0.0, 0.0, 1.0]);
        let current = PixelValue::Float([1.0, 1.0, 1.0, 1.0]);
        let out = draw(&ctx, current, orig, [1.0, 0.0, 0.0], None, false, 0.5, 0, 0);
        let PixelValue::Float(f) = out else { panic!() };
        assert!((f[0] - 0.5).abs() < 1e-6 && f[1].abs() < 1e-6);
    }

    #[test]
    fn test_clone_transparent_sample_skips() {
        let ctx = OperatorContext::default();
        let px = PixelValue::Byte([1, 2, 3, 255]);
        assert!(clone(&ctx, px, px, PixelValue::Byte([9, 9, 9, 0]), 1.0).is_none());
        assert!(clone(&ctx, px, px, PixelValue::Byte([9, 9, 9, 255]), 1.0).is_some());
    }

    #[test]
    fn test_soften_blur_moves_towards_average() {
        let ctx = OperatorContext::default();
        let out = soften(&ctx, PixelValue::Float([1.0, 1.0, 1.0, 1.0]), [0.0, 0.0, 0.0, 1.0], 0.5)
            .unwrap();
        let PixelValue::Float(f) = out else { panic!() };
        assert!((f[0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_sharpen_respects_threshold() {
        let ctx = OperatorContext {
            sharpen: true,
            sharp_threshold: 0.5,
            ..OperatorContext::default()
        };
        let flat = PixelValue::Float([0.5, 0.5, 0.5, 1.0]);
        assert!(soften(&ctx, flat, [0.4, 0.4, 0.4, 1.0], 1.0).is_none());
        let edge = PixelValue::Float([1.0, 1.0, 1.0, 1.0]);
        let out = soften(&ctx, edge, [0.2, 0.2, 0.2, 1.0], 1.0).unwrap();
        let PixelValue::Float(f) = out else { panic!() };
        assert!((f[0] - 1.8).abs() < 1e-5);
        assert_eq!(f[3], 1.0);
    }

    #[test]
    fn test_stencil_value() {
        let ctx = OperatorContext {
            stencil_value: 0.0,
            ..OperatorContext::default()
        };
        let px = PixelValue::Byte([255, 255, 255, 255]);
        assert_eq!(stencil(&ctx, px, px, 1.0), PixelValue::Byte([0, 0, 0, 255]));
    }

    #[test]
    fn test_accumulated_mask_never_decreases() {
        // Repeated dabs over one pixel with a weakening falloff
        let mut accum = 0u16;
        for falloff in [0.8, 0.3, 1.0, 0.1, 0.6] {
            let candidate = accumulated_mask(accum, 0.5, falloff, false);
            if candidate > accum {
                accum = candidate;
            }
            assert!(accum as f32 <= MASK_MAX);
        }
        let first = accumulated_mask(0, 0.5, 0.8, false);
        assert!(accum >= first);
    }

    #[test]
    fn test_accumulated_mask_limits_non_accumulating_brush() {
        // At full falloff a non-accumulating brush settles at its strength
        let half = accumulated_mask(0, 0.5, 1.0, false);
        assert_eq!(half, (0.5 * MASK_MAX) as u16);
        assert_eq!(accumulated_mask(half, 0.5, 1.0, false), half);
        // Accumulating brushes keep adding until saturation
        let more = accumulated_mask(half, 0.5, 1.0, true);
        assert!(more > half);
        assert_eq!(accumulated_mask(more, 0.5, 1.0, true), u16::MAX);
    }

    #[test]
    fn test_reproject_mixes_at_mask() {
        let orig = PixelValue::Float([0.0, 0.0, 0.0, 1.0]);
        let out = reproject(orig, PixelValue::Float([1.0, 1.0, 1.0, 1.0]), 1.0).unwrap();
        assert_eq!(out, PixelValue::Float([1.0, 1.0, 1.0, 1.0]));
        assert!(reproject(orig, PixelValue::Float([0.0; 4]), 1.0).is_none());
    }
}
