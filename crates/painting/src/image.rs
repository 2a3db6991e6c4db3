//! Paint target images
//!
//! A [`PaintImage`] groups one or more tile buffers (UDIM tiles for tiled
//! images, a single buffer otherwise) with the flags a stroke checks before
//! painting into it and a free-form property map, used to store view data
//! for re-projection.

use std::sync::Arc;

use glam::Vec2;
use serde_json::{Map, Value};

use crate::constants::UDIM_FIRST_TILE;
use crate::mesh::ImageId;
use crate::surface::ImageBuffer;

/// Where one triangle paints: its image, UV layer and UDIM tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriTarget {
    pub image: ImageId,
    pub uv_layer: usize,
    /// UDIM tile number (0 for non-tiled images)
    pub tile: u32,
}

/// One buffer of an image
#[derive(Debug, Clone)]
pub struct ImageTile {
    /// UDIM number (1001 and up), 0 for non-tiled images
    pub number: u32,
    /// Pixel data, None while the buffer is not loaded
    pub buffer: Option<Arc<ImageBuffer>>,
}

/// An image a stroke may paint into or sample from
#[derive(Debug, Clone)]
pub struct PaintImage {
    pub name: String,
    pub tiles: Vec<ImageTile>,
    /// UDIM tiled image
    pub tiled: bool,
    /// Linked or library override images are read-only
    pub editable: bool,
    pub properties: Map<String, Value>,
}

impl PaintImage {
    /// A single-buffer image
    pub fn new(name: impl Into<String>, buffer: ImageBuffer) -> Self {
        Self {
            name: name.into(),
            tiles: vec![ImageTile {
                number: 0,
                buffer: Some(Arc::new(buffer)),
            }],
            tiled: false,
            editable: true,
            properties: Map::new(),
        }
    }

    /// A UDIM image from `(tile number, buffer)` pairs
    pub fn new_tiled(name: impl Into<String>, tiles: Vec<(u32, ImageBuffer)>) -> Self {
        Self {
            name: name.into(),
            tiles: tiles
                .into_iter()
                .map(|(number, buffer)| ImageTile {
                    number,
                    buffer: Some(Arc::new(buffer)),
                })
                .collect(),
            tiled: true,
            editable: true,
            properties: Map::new(),
        }
    }

    /// An image with no loaded pixels
    pub fn unloaded(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tiles: vec![ImageTile {
                number: 0,
                buffer: None,
            }],
            tiled: false,
            editable: true,
            properties: Map::new(),
        }
    }

    /// Tile number a face with this first-corner UV paints into.
    ///
    /// Faces are assumed to lie within one tile.
    pub fn tile_number(&self, uv: Vec2) -> u32 {
        if !self.tiled {
            return 0;
        }
        let tx = uv.x as i32;
        let ty = uv.y as i32;
        (UDIM_FIRST_TILE as i32 + 10 * ty + tx).max(0) as u32
    }

    /// Buffer of a tile. Non-tiled images answer every number with their buffer.
    pub fn tile_buffer(&self, number: u32) -> Option<&Arc<ImageBuffer>> {
        if !self.tiled {
            return self.tiles.first().and_then(|tile| tile.buffer.as_ref());
        }
        self.tiles
            .iter()
            .find(|tile| tile.number == number)
            .and_then(|tile| tile.buffer.as_ref())
    }

    /// First loaded buffer, used when the image is sampled as a whole
    pub fn first_buffer(&self) -> Option<&Arc<ImageBuffer>> {
        self.tiles.iter().find_map(|tile| tile.buffer.as_ref())
    }

    pub fn has_buffer(&self) -> bool {
        self.first_buffer().is_some()
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: Value) {
        self.properties.insert(key.into(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_udim_tile_numbers() {
        let image = PaintImage::new_tiled(
            "udim",
            vec![
                (1001, ImageBuffer::new_byte(4, 4, [0; 4])),
                (1012, ImageBuffer::new_byte(4, 4, [0; 4])),
            ],
        );
        assert_eq!(image.tile_number(Vec2::new(0.5, 0.5)), 1001);
        assert_eq!(image.tile_number(Vec2::new(1.5, 1.25)), 1012);
        assert!(image.tile_buffer(1012).is_some());
        assert!(image.tile_buffer(1002).is_none());
    }

    #[test]
    fn test_single_image_ignores_tile_number() {
        let image = PaintImage::new("canvas", ImageBuffer::new_byte(2, 2, [0; 4]));
        assert_eq!(image.tile_number(Vec2::new(3.5, 2.0)), 0);
        assert!(image.tile_buffer(1001).is_some());
    }

    #[test]
    fn test_unloaded_has_no_buffer() {
        assert!(!PaintImage::unloaded("missing").has_buffer());
    }
}
