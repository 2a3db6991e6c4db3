//! CPU image buffers painted by projection strokes
//!
//! Pixels are stored in atomics so that worker threads can read and write
//! through a shared reference while buckets are processed in parallel:
//! - byte images hold one packed straight-alpha RGBA `u32` per pixel
//! - float images hold four `f32` bit patterns per pixel (premultiplied, linear)
//!
//! Each pixel is only ever modified by the thread owning its bucket, so
//! relaxed ordering is sufficient; the dispatcher's barrier publishes results.

use std::sync::atomic::{AtomicU32, Ordering};

use serde::{Deserialize, Serialize};

/// Storage format of an image buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit straight alpha
    Byte,
    /// 32-bit float premultiplied alpha
    Float,
}

/// How byte pixels are encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ByteColorSpace {
    /// sRGB encoded colour (paint colours are converted from linear)
    #[default]
    Srgb,
    /// Non-colour data, written without conversion
    NonColor,
}

/// A single pixel value in either storage format
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PixelValue {
    Byte([u8; 4]),
    Float([f32; 4]),
}

impl PixelValue {
    /// Convert to premultiplied float
    pub fn to_premul_float(self) -> [f32; 4] {
        match self {
            PixelValue::Byte(b) => straight_uchar_to_premul_float(b),
            PixelValue::Float(f) => f,
        }
    }

    /// Convert to straight byte
    pub fn to_straight_byte(self) -> [u8; 4] {
        match self {
            PixelValue::Byte(b) => b,
            PixelValue::Float(f) => premul_float_to_straight_uchar(f),
        }
    }

    /// Alpha as a 0..1 float
    pub fn alpha(self) -> f32 {
        match self {
            PixelValue::Byte(b) => b[3] as f32 / 255.0,
            PixelValue::Float(f) => f[3],
        }
    }
}

/// Convert straight 8-bit RGBA to premultiplied float
pub fn straight_uchar_to_premul_float(b: [u8; 4]) -> [f32; 4] {
    let alpha = b[3] as f32 / 255.0;
    let fac = alpha / 255.0;
    [b[0] as f32 * fac, b[1] as f32 * fac, b[2] as f32 * fac, alpha]
}

/// Convert premultiplied float RGBA to straight 8-bit
pub fn premul_float_to_straight_uchar(f: [f32; 4]) -> [u8; 4] {
    if f[3] == 0.0 || f[3] == 1.0 {
        return [
            unit_float_to_uchar_clamp(f[0]),
            unit_float_to_uchar_clamp(f[1]),
            unit_float_to_uchar_clamp(f[2]),
            unit_float_to_uchar_clamp(f[3]),
        ];
    }
    let inv = 1.0 / f[3];
    [
        unit_float_to_uchar_clamp(f[0] * inv),
        unit_float_to_uchar_clamp(f[1] * inv),
        unit_float_to_uchar_clamp(f[2] * inv),
        unit_float_to_uchar_clamp(f[3]),
    ]
}

/// Map 0..1 to 0..255 with rounding and clamping
#[inline]
pub fn unit_float_to_uchar_clamp(v: f32) -> u8 {
    if v <= 0.0 {
        0
    } else if v > 1.0 - 0.5 / 255.0 {
        255
    } else {
        (255.0 * v + 0.5) as u8
    }
}

#[derive(Debug)]
enum PixelStore {
    Byte(Vec<AtomicU32>),
    Float(Vec<[AtomicU32; 4]>),
}

/// An image (or one UDIM tile of an image) painted in place
#[derive(Debug)]
pub struct ImageBuffer {
    pub width: u32,
    pub height: u32,
    /// Encoding of byte pixels (ignored for float buffers)
    pub colorspace: ByteColorSpace,
    store: PixelStore,
}

impl ImageBuffer {
    /// Create a byte image filled with one colour
    pub fn new_byte(width: u32, height: u32, fill: [u8; 4]) -> Self {
        let packed = bytemuck::cast::<[u8; 4], u32>(fill);
        let count = (width as usize) * (height as usize);
        Self {
            width,
            height,
            colorspace: ByteColorSpace::Srgb,
            store: PixelStore::Byte((0..count).map(|_| AtomicU32::new(packed)).collect()),
        }
    }

    /// Create a float image filled with one premultiplied colour
    pub fn new_float(width: u32, height: u32, fill: [f32; 4]) -> Self {
        let count = (width as usize) * (height as usize);
        Self {
            width,
            height,
            colorspace: ByteColorSpace::NonColor,
            store: PixelStore::Float((0..count).map(|_| float_cell(fill)).collect()),
        }
    }

    /// Wrap existing byte pixels (row-major). Returns None if the length mismatches.
    pub fn from_bytes(width: u32, height: u32, pixels: &[[u8; 4]]) -> Option<Self> {
        if pixels.len() != (width as usize) * (height as usize) {
            return None;
        }
        Some(Self {
            width,
            height,
            colorspace: ByteColorSpace::Srgb,
            store: PixelStore::Byte(
                pixels
                    .iter()
                    .map(|p| AtomicU32::new(bytemuck::cast::<[u8; 4], u32>(*p)))
                    .collect(),
            ),
        })
    }

    /// Wrap existing premultiplied float pixels (row-major).
    pub fn from_floats(width: u32, height: u32, pixels: &[[f32; 4]]) -> Option<Self> {
        if pixels.len() != (width as usize) * (height as usize) {
            return None;
        }
        Some(Self {
            width,
            height,
            colorspace: ByteColorSpace::NonColor,
            store: PixelStore::Float(pixels.iter().map(|p| float_cell(*p)).collect()),
        })
    }

    /// Set the byte colour space (builder style)
    pub fn with_colorspace(mut self, colorspace: ByteColorSpace) -> Self {
        self.colorspace = colorspace;
        self
    }

    #[inline]
    pub fn format(&self) -> PixelFormat {
        match self.store {
            PixelStore::Byte(_) => PixelFormat::Byte,
            PixelStore::Float(_) => PixelFormat::Float,
        }
    }

    #[inline]
    pub fn is_float(&self) -> bool {
        matches!(self.store, PixelStore::Float(_))
    }

    /// True for sRGB byte images, where paint colours need conversion
    pub fn is_srgb(&self) -> bool {
        !self.is_float() && self.colorspace == ByteColorSpace::Srgb
    }

    #[inline]
    pub fn pixel_count(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Row-major pixel index
    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        (y as usize) * (self.width as usize) + (x as usize)
    }

    /// Read a pixel by index
    #[inline]
    pub fn read(&self, index: usize) -> PixelValue {
        match &self.store {
            PixelStore::Byte(px) => {
                PixelValue::Byte(bytemuck::cast::<u32, [u8; 4]>(px[index].load(Ordering::Relaxed)))
            }
            PixelStore::Float(px) => PixelValue::Float(load_float(&px[index])),
        }
    }

    /// Write a pixel by index, converting if the formats differ
    #[inline]
    pub fn write(&self, index: usize, value: PixelValue) {
        match &self.store {
            PixelStore::Byte(px) => {
                let bytes = value.to_straight_byte();
                px[index].store(bytemuck::cast::<[u8; 4], u32>(bytes), Ordering::Relaxed);
            }
            PixelStore::Float(px) => store_float(&px[index], value.to_premul_float()),
        }
    }

    /// Get a pixel at the given coordinates, None if out of bounds
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<PixelValue> {
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.read(self.index(x, y)))
    }

    /// Set a pixel at the given coordinates, ignored if out of bounds
    pub fn set_pixel(&self, x: u32, y: u32, value: PixelValue) {
        if x >= self.width || y >= self.height {
            return;
        }
        self.write(self.index(x, y), value);
    }

    /// Fill the whole image
    pub fn clear(&self, value: PixelValue) {
        for i in 0..self.pixel_count() {
            self.write(i, value);
        }
    }

    /// Copy the pixels out as straight 8-bit RGBA
    pub fn to_byte_pixels(&self) -> Vec<[u8; 4]> {
        (0..self.pixel_count()).map(|i| self.read(i).to_straight_byte()).collect()
    }

    /// Copy the pixels out as premultiplied float RGBA
    pub fn to_float_pixels(&self) -> Vec<[f32; 4]> {
        (0..self.pixel_count()).map(|i| self.read(i).to_premul_float()).collect()
    }

    /// Raw RGBA8 bytes for upload or comparison
    pub fn as_rgba8(&self) -> Vec<u8> {
        bytemuck::cast_slice(&self.to_byte_pixels()).to_vec()
    }

    /// A float copy of this buffer (used when a float target re-projects a byte source)
    pub fn to_float_buffer(&self) -> ImageBuffer {
        let pixels = self.to_float_pixels();
        Self {
            width: self.width,
            height: self.height,
            colorspace: ByteColorSpace::NonColor,
            store: PixelStore::Float(pixels.into_iter().map(float_cell).collect()),
        }
    }

    /// A byte copy of this buffer
    pub fn to_byte_buffer(&self) -> ImageBuffer {
        let pixels = self.to_byte_pixels();
        Self {
            width: self.width,
            height: self.height,
            colorspace: self.colorspace,
            store: PixelStore::Byte(
                pixels
                    .into_iter()
                    .map(|p| AtomicU32::new(bytemuck::cast::<[u8; 4], u32>(p)))
                    .collect(),
            ),
        }
    }

    /// Nearest sample with wrap-around in pixel coordinates
    pub fn sample_nearest_wrap(&self, x: f32, y: f32) -> PixelValue {
        let xi = wrap(x.floor() as i64, self.width);
        let yi = wrap(y.floor() as i64, self.height);
        self.read(self.index(xi, yi))
    }

    /// Bilinear sample with wrap-around in pixel coordinates (pixel centres at +0.5
    /// must already be removed by the caller)
    pub fn sample_bilinear_wrap(&self, x: f32, y: f32) -> PixelValue {
        if self.width == 0 || self.height == 0 {
            return match self.format() {
                PixelFormat::Byte => PixelValue::Byte([0; 4]),
                PixelFormat::Float => PixelValue::Float([0.0; 4]),
            };
        }
        let x0f = x.floor();
        let y0f = y.floor();
        let fx = x - x0f;
        let fy = y - y0f;
        let x0 = wrap(x0f as i64, self.width);
        let x1 = wrap(x0f as i64 + 1, self.width);
        let y0 = wrap(y0f as i64, self.height);
        let y1 = wrap(y0f as i64 + 1, self.height);

        let weights = [
            (1.0 - fx) * (1.0 - fy),
            fx * (1.0 - fy),
            (1.0 - fx) * fy,
            fx * fy,
        ];
        let taps = [
            self.index(x0, y0),
            self.index(x1, y0),
            self.index(x0, y1),
            self.index(x1, y1),
        ];

        let mut accum = [0.0f32; 4];
        for (tap, weight) in taps.iter().zip(weights) {
            let value = match self.read(*tap) {
                PixelValue::Byte(b) => [b[0] as f32, b[1] as f32, b[2] as f32, b[3] as f32],
                PixelValue::Float(f) => f,
            };
            for c in 0..4 {
                accum[c] += value[c] * weight;
            }
        }

        match self.format() {
            PixelFormat::Byte => PixelValue::Byte(accum.map(|c| (c + 0.5).clamp(0.0, 255.0) as u8)),
            PixelFormat::Float => PixelValue::Float(accum),
        }
    }

    /// Cubic B-spline sample at a pixel position (centres at +0.5).
    ///
    /// Taps outside the image contribute nothing, so edges fade towards zero.
    pub fn sample_cubic_bspline(&self, x: f32, y: f32) -> PixelValue {
        let u = x - 0.5;
        let v = y - 0.5;
        let x0 = u.floor();
        let y0 = v.floor();

        let mut accum = [0.0f32; 4];
        for j in -1..=2 {
            let ty = y0 + j as f32;
            let wy = bspline_weight(v - ty);
            let yi = ty as i64;
            if wy == 0.0 || yi < 0 || yi >= self.height as i64 {
                continue;
            }
            for i in -1..=2 {
                let tx = x0 + i as f32;
                let wx = bspline_weight(u - tx);
                let xi = tx as i64;
                if wx == 0.0 || xi < 0 || xi >= self.width as i64 {
                    continue;
                }
                let value = match self.read(self.index(xi as u32, yi as u32)) {
                    PixelValue::Byte(b) => [b[0] as f32, b[1] as f32, b[2] as f32, b[3] as f32],
                    PixelValue::Float(f) => f,
                };
                let w = wx * wy;
                for c in 0..4 {
                    accum[c] += value[c] * w;
                }
            }
        }

        match self.format() {
            PixelFormat::Byte => PixelValue::Byte(accum.map(|c| (c + 0.5).clamp(0.0, 255.0) as u8)),
            PixelFormat::Float => PixelValue::Float(accum),
        }
    }
}

#[inline]
fn bspline_weight(t: f32) -> f32 {
    let t = t.abs();
    if t < 1.0 {
        (4.0 - 6.0 * t * t + 3.0 * t * t * t) / 6.0
    } else if t < 2.0 {
        let s = 2.0 - t;
        s * s * s / 6.0
    } else {
        0.0
    }
}

#[inline]
fn wrap(v: i64, size: u32) -> u32 {
    v.rem_euclid(size.max(1) as i64) as u32
}

fn float_cell(value: [f32; 4]) -> [AtomicU32; 4] {
    value.map(|c| AtomicU32::new(c.to_bits()))
}

#[inline]
fn load_float(cell: &[AtomicU32; 4]) -> [f32; 4] {
    [
        f32::from_bits(cell[0].load(Ordering::Relaxed)),
        f32::from_bits(cell[1].load(Ordering::Relaxed)),
        f32::from_bits(cell[2].load(Ordering::Relaxed)),
        f32::from_bits(cell[3].load(Ordering::Relaxed)),
    ]
}

#[inline]
fn store_float(cell: &[AtomicU32; 4], value: [f32; 4]) {
    for (c, v) in cell.iter().zip(value) {
        c.store(v.to_bits(), Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_byte_image() {
        let image = ImageBuffer::new_byte(4, 2, [1, 2, 3, 4]);
        assert_eq!(image.pixel_count(), 8);
        assert_eq!(image.format(), PixelFormat::Byte);
        assert_eq!(image.get_pixel(3, 1), Some(PixelValue::Byte([1, 2, 3, 4])));
        assert_eq!(image.get_pixel(4, 0), None);
    }

    #[test]
    fn test_set_pixel_converts_format() {
        let image = ImageBuffer::new_float(2, 2, [0.0; 4]);
        image.set_pixel(1, 1, PixelValue::Byte([255, 0, 0, 255]));
        assert_eq!(image.get_pixel(1, 1), Some(PixelValue::Float([1.0, 0.0, 0.0, 1.0])));
    }

    #[test]
    fn test_premul_round_trip_half_alpha() {
        let straight = [200, 100, 50, 128];
        let premul = straight_uchar_to_premul_float(straight);
        assert!((premul[3] - 128.0 / 255.0).abs() < 1e-6);
        let back = premul_float_to_straight_uchar(premul);
        assert_eq!(back, straight);
    }

    #[test]
    fn test_bilinear_wrap_blends_edges() {
        let image = ImageBuffer::from_floats(
            2,
            1,
            &[[0.0, 0.0, 0.0, 1.0], [1.0, 1.0, 1.0, 1.0]],
        )
        .unwrap();
        let PixelValue::Float(mid) = image.sample_bilinear_wrap(0.5, 0.0) else {
            panic!("expected float sample");
        };
        assert!((mid[0] - 0.5).abs() < 1e-6);
        // Sampling past the right edge wraps back to pixel 0
        let PixelValue::Float(wrapped) = image.sample_bilinear_wrap(1.0, 0.0) else {
            panic!("expected float sample");
        };
        assert!((wrapped[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_as_rgba8_length() {
        let image = ImageBuffer::new_byte(3, 3, [0, 0, 0, 255]);
        assert_eq!(image.as_rgba8().len(), 36);
    }

    #[test]
    fn test_from_bytes_rejects_wrong_length() {
        assert!(ImageBuffer::from_bytes(2, 2, &[[0; 4]; 3]).is_none());
    }

    #[test]
    fn test_cubic_bspline_interior_is_smooth() {
        let image = ImageBuffer::new_float(8, 8, [0.5, 0.5, 0.5, 1.0]);
        let PixelValue::Float(sample) = image.sample_cubic_bspline(4.0, 4.0) else {
            panic!("expected float sample");
        };
        assert!((sample[0] - 0.5).abs() < 1e-5);
        assert!((sample[3] - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_cubic_bspline_fades_outside() {
        let image = ImageBuffer::new_byte(4, 4, [255, 255, 255, 255]);
        let PixelValue::Byte(edge) = image.sample_cubic_bspline(0.0, 2.0) else {
            panic!("expected byte sample");
        };
        assert!(edge[3] < 255 && edge[3] > 0);
        let PixelValue::Byte(far) = image.sample_cubic_bspline(-5.0, 2.0) else {
            panic!("expected byte sample");
        };
        assert_eq!(far, [0; 4]);
    }
}
