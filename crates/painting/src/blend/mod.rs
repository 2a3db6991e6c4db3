//! Pixel color math for projection painting
//!
//! Two families of functions mirror the two image storage formats:
//! - byte functions take straight alpha 8-bit RGBA
//! - float functions take premultiplied linear RGBA
//!
//! In every blend the first argument is the base pixel and the second the
//! paint colour whose alpha carries the per-pixel strength. A paint colour
//! with zero alpha leaves the base untouched.
//!
//! Per-brush operators built on top of this live in [`operators`].

pub mod operators;

pub use operators::OperatorContext;

use crate::surface::{PixelValue, unit_float_to_uchar_clamp};
use crate::types::BlendMode;

/// Alpha values closer than this to 0 or 1 snap when erasing or adding alpha
const EPS_ALPHA: f32 = 0.0005;

/// Integer division rounding half away from zero (positive operands)
#[inline]
fn divide_round(a: i32, b: i32) -> i32 {
    (2 * a + b) / (2 * b)
}

/// Blend two straight alpha byte colours
pub fn blend_byte(src1: [u8; 4], src2: [u8; 4], mode: BlendMode) -> [u8; 4] {
    if src2[3] == 0 {
        return src1;
    }
    let s1 = src1.map(i32::from);
    let s2 = src2.map(i32::from);
    let t = s2[3];
    let mt = 255 - t;

    match mode {
        BlendMode::Mix => {
            let alpha = mt * s1[3] + t * 255;
            let mut dst = [0u8; 4];
            for c in 0..3 {
                let value = mt * s1[3] * s1[c] + t * 255 * s2[c];
                dst[c] = divide_round(value, alpha) as u8;
            }
            dst[3] = divide_round(alpha, 255) as u8;
            dst
        }
        BlendMode::Add => {
            let mut dst = src1;
            for c in 0..3 {
                dst[c] = divide_round(s1[c] * 255 + s2[c] * t, 255).min(255) as u8;
            }
            dst
        }
        BlendMode::Subtract => {
            let mut dst = src1;
            for c in 0..3 {
                let value = s1[c] * 255 - s2[c] * t;
                dst[c] = if value <= 0 { 0 } else { divide_round(value, 255) as u8 };
            }
            dst
        }
        BlendMode::Multiply => {
            let mut dst = src1;
            for c in 0..3 {
                let value = mt * s1[c] * 255 + t * s1[c] * s2[c];
                dst[c] = divide_round(value, 255 * 255) as u8;
            }
            dst
        }
        BlendMode::Lighten => {
            let mut dst = src1;
            for c in 0..3 {
                dst[c] = divide_round(mt * s1[c] + t * s1[c].max(s2[c]), 255) as u8;
            }
            dst
        }
        BlendMode::Darken => {
            let mut dst = src1;
            for c in 0..3 {
                dst[c] = divide_round(mt * s1[c] + t * s1[c].min(s2[c]), 255) as u8;
            }
            dst
        }
        BlendMode::EraseAlpha => {
            let mut dst = src1;
            dst[3] = (s1[3] - t).max(0) as u8;
            dst
        }
        BlendMode::AddAlpha => {
            let mut dst = src1;
            dst[3] = (s1[3] + t).min(255) as u8;
            dst
        }
    }
}

/// Blend two premultiplied float colours
pub fn blend_float(src1: [f32; 4], src2: [f32; 4], mode: BlendMode) -> [f32; 4] {
    if src2[3] == 0.0 {
        return src1;
    }
    let t = src2[3];
    let mt = 1.0 - t;

    match mode {
        BlendMode::Mix => [
            mt * src1[0] + src2[0],
            mt * src1[1] + src2[1],
            mt * src1[2] + src2[2],
            mt * src1[3] + t,
        ],
        BlendMode::Add => [
            src1[0] + src2[0],
            src1[1] + src2[1],
            src1[2] + src2[2],
            src1[3],
        ],
        BlendMode::Subtract => [
            (src1[0] - src2[0]).max(0.0),
            (src1[1] - src2[1]).max(0.0),
            (src1[2] - src2[2]).max(0.0),
            src1[3],
        ],
        BlendMode::Multiply => [
            mt * src1[0] + src1[0] * src2[0],
            mt * src1[1] + src1[1] * src2[1],
            mt * src1[2] + src1[2] * src2[2],
            src1[3],
        ],
        BlendMode::Lighten | BlendMode::Darken => {
            // Remap the paint colour to the base alpha before comparing
            let m = src1[3] / t;
            let pick = |a: f32, b: f32| {
                if mode == BlendMode::Lighten { a.max(b) } else { a.min(b) }
            };
            [
                mt * src1[0] + t * pick(src1[0], src2[0] * m),
                mt * src1[1] + t * pick(src1[1], src2[1] * m),
                mt * src1[2] + t * pick(src1[2], src2[2] * m),
                src1[3],
            ]
        }
        BlendMode::EraseAlpha => {
            if src1[3] <= 0.0 {
                return src1;
            }
            let mut alpha = (src1[3] - t).max(0.0);
            if alpha <= EPS_ALPHA {
                alpha = 0.0;
            }
            let map = alpha / src1[3];
            [src1[0] * map, src1[1] * map, src1[2] * map, alpha]
        }
        BlendMode::AddAlpha => {
            if src1[3] >= 1.0 {
                return src1;
            }
            let mut alpha = (src1[3] + t).min(1.0);
            if alpha >= 1.0 - EPS_ALPHA {
                alpha = 1.0;
            }
            let map = if src1[3] > 0.0 { alpha / src1[3] } else { 0.0 };
            [src1[0] * map, src1[1] * map, src1[2] * map, alpha]
        }
    }
}

/// Blend a paint value into a base value of the same storage format
pub fn blend_pixel(base: PixelValue, paint: PixelValue, mode: BlendMode) -> PixelValue {
    match base {
        PixelValue::Byte(b) => PixelValue::Byte(blend_byte(b, paint.to_straight_byte(), mode)),
        PixelValue::Float(f) => PixelValue::Float(blend_float(f, paint.to_premul_float(), mode)),
    }
}

/// Interpolate straight byte colours in premultiplied space so that colour
/// from fully transparent pixels has no influence
pub fn interpolate_byte(src1: [u8; 4], src2: [u8; 4], ft: f32) -> [u8; 4] {
    let t = (255.0 * ft) as i32;
    let mt = 255 - t;
    let s1 = src1.map(i32::from);
    let s2 = src2.map(i32::from);
    let alpha = mt * s1[3] + t * s2[3];
    if alpha <= 0 {
        return src1;
    }
    let mut dst = [0u8; 4];
    for c in 0..3 {
        dst[c] = divide_round(mt * s1[c] * s1[3] + t * s2[c] * s2[3], alpha).clamp(0, 255) as u8;
    }
    dst[3] = divide_round(alpha, 255).clamp(0, 255) as u8;
    dst
}

/// Linear interpolation of premultiplied float colours
pub fn interpolate_float(src1: [f32; 4], src2: [f32; 4], t: f32) -> [f32; 4] {
    let mt = 1.0 - t;
    [
        mt * src1[0] + t * src2[0],
        mt * src1[1] + t * src2[1],
        mt * src1[2] + t * src2[2],
        mt * src1[3] + t * src2[3],
    ]
}

/// Rec.709 luminance of a linear colour
#[inline]
pub fn luminance(rgb: [f32; 3]) -> f32 {
    0.2126 * rgb[0] + 0.7152 * rgb[1] + 0.0722 * rgb[2]
}

/// Convert one linear channel to sRGB
#[inline]
pub fn linear_to_srgb(c: f32) -> f32 {
    if c < 0.003_130_8 {
        if c < 0.0 { 0.0 } else { c * 12.92 }
    } else {
        1.055 * c.powf(1.0 / 2.4) - 0.055
    }
}

/// Convert one sRGB channel to linear
#[inline]
pub fn srgb_to_linear(c: f32) -> f32 {
    if c < 0.04045 {
        if c < 0.0 { 0.0 } else { c * (1.0 / 12.92) }
    } else {
        ((c + 0.055) * (1.0 / 1.055)).powf(2.4)
    }
}

pub fn linear_to_srgb_v3(rgb: [f32; 3]) -> [f32; 3] {
    rgb.map(linear_to_srgb)
}

/// Per-pixel noise in 0..1 used to dither float to byte conversion
#[inline]
pub fn dither_random_value(s: f32, t: f32) -> f32 {
    let value = (s * 12.9898 + t * 78.233).sin() * 43758.5453;
    value - value.floor()
}

/// Convert a float colour to bytes, adding dither noise scaled by `dither`
pub fn float_to_byte_dither_v3(rgb: [f32; 3], dither: f32, x: i32, y: i32) -> [u8; 3] {
    let noise = dither_random_value(x as f32, y as f32) * 0.0033 * dither;
    rgb.map(|c| unit_float_to_uchar_clamp(c + noise))
}

pub fn unit_float_to_uchar_clamp_v3(rgb: [f32; 3]) -> [u8; 3] {
    rgb.map(unit_float_to_uchar_clamp)
}

/// Premultiplied to straight alpha (float)
pub fn premul_to_straight(c: [f32; 4]) -> [f32; 4] {
    if c[3] == 0.0 || c[3] == 1.0 {
        return c;
    }
    let inv = 1.0 / c[3];
    [c[0] * inv, c[1] * inv, c[2] * inv, c[3]]
}

/// Straight to premultiplied alpha (float)
pub fn straight_to_premul(c: [f32; 4]) -> [f32; 4] {
    [c[0] * c[3], c[1] * c[3], c[2] * c[3], c[3]]
}

/// Restore the alpha of `original` into `pixel`, keeping float pixels consistently premultiplied
pub fn copy_original_alpha(pixel: PixelValue, original: PixelValue) -> PixelValue {
    match pixel {
        PixelValue::Byte(mut b) => {
            b[3] = original.to_straight_byte()[3];
            PixelValue::Byte(b)
        }
        PixelValue::Float(f) => {
            let mut straight = premul_to_straight(f);
            straight[3] = original.to_premul_float()[3];
            PixelValue::Float(straight_to_premul(straight))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_context_reachable_from_blend() {
        let ctx = OperatorContext::default();
        assert_eq!(ctx.blend, BlendMode::Mix);
        let painted = operators::draw(
            &ctx,
            PixelValue::Byte([0, 0, 0, 255]),
            PixelValue::Byte([0, 0, 0, 255]),
            [1.0, 0.0, 0.0],
            None,
            false,
            1.0,
            0,
            0,
        );
        assert_eq!(painted, PixelValue::Byte([255, 0, 0, 255]));
    }

    #[test]
    fn test_mix_byte_full_strength_replaces() {
        let dst = blend_byte([10, 20, 30, 255], [200, 100, 50, 255], BlendMode::Mix);
        assert_eq!(dst, [200, 100, 50, 255]);
    }

    #[test]
    fn test_mix_byte_zero_alpha_keeps_base() {
        let base = [10, 20, 30, 40];
        assert_eq!(blend_byte(base, [255, 255, 255, 0], BlendMode::Mix), base);
    }

    #[test]
    fn test_mix_byte_half() {
        let dst = blend_byte([0, 0, 0, 255], [255, 255, 255, 128], BlendMode::Mix);
        assert_eq!(dst[3], 255);
        assert!((dst[0] as i32 - 128).abs() <= 1);
    }

    #[test]
    fn test_mix_float_premultiplied() {
        let dst = blend_float([1.0, 0.0, 0.0, 1.0], [0.0, 0.5, 0.0, 0.5], BlendMode::Mix);
        assert!((dst[0] - 0.5).abs() < 1e-6);
        assert!((dst[1] - 0.5).abs() < 1e-6);
        assert!((dst[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_add_and_subtract_byte() {
        let add = blend_byte([200, 0, 0, 255], [100, 0, 0, 255], BlendMode::Add);
        assert_eq!(add[0], 255);
        let sub = blend_byte([50, 0, 0, 255], [100, 0, 0, 255], BlendMode::Subtract);
        assert_eq!(sub[0], 0);
    }

    #[test]
    fn test_erase_alpha_float_remaps_rgb() {
        let dst = blend_float([0.5, 0.5, 0.5, 1.0], [0.0, 0.0, 0.0, 0.5], BlendMode::EraseAlpha);
        assert!((dst[3] - 0.5).abs() < 1e-6);
        assert!((dst[0] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_add_alpha_byte_saturates() {
        let dst = blend_byte([1, 2, 3, 200], [0, 0, 0, 100], BlendMode::AddAlpha);
        assert_eq!(dst, [1, 2, 3, 255]);
    }

    #[test]
    fn test_lighten_darken_float() {
        let base = [0.2, 0.8, 0.5, 1.0];
        let paint = [0.5, 0.5, 0.5, 1.0];
        let light = blend_float(base, paint, BlendMode::Lighten);
        let dark = blend_float(base, paint, BlendMode::Darken);
        assert!((light[0] - 0.5).abs() < 1e-6 && (light[1] - 0.8).abs() < 1e-6);
        assert!((dark[0] - 0.2).abs() < 1e-6 && (dark[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_interpolate_byte_ignores_transparent_colour() {
        let dst = interpolate_byte([255, 0, 0, 0], [0, 0, 255, 255], 0.5);
        assert_eq!(dst[0], 0);
        assert_eq!(dst[2], 255);
    }

    #[test]
    fn test_srgb_round_trip() {
        for c in [0.0, 0.001, 0.2, 0.5, 1.0] {
            assert!((srgb_to_linear(linear_to_srgb(c)) - c).abs() < 1e-5);
        }
    }

    #[test]
    fn test_dither_value_in_unit_range() {
        for i in 0..32 {
            let v = dither_random_value(i as f32, (i * 7) as f32);
            assert!((0.0..1.0).contains(&v));
        }
    }

    #[test]
    fn test_copy_original_alpha_float() {
        let restored = copy_original_alpha(
            PixelValue::Float([0.5, 0.25, 0.0, 0.5]),
            PixelValue::Float([0.0, 0.0, 0.0, 1.0]),
        );
        assert_eq!(restored, PixelValue::Float([1.0, 0.5, 0.0, 1.0]));
    }
}
