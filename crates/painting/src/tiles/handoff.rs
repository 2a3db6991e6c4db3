//! Captured tiles handed to an undo stack when a stroke ends

use std::sync::Arc;

use tracing::debug;

use super::{TileCoord, TilePixels, UndoTileStore};
use crate::constants::UNDO_TILE_SIZE;
use crate::mesh::ImageId;
use crate::surface::{ImageBuffer, PixelValue};

/// The pre-stroke pixels of one tile
#[derive(Debug, Clone)]
pub struct UndoRecord {
    pub image: ImageId,
    pub tile_number: u32,
    pub coord: TileCoord,
    /// The stroke changed at least one pixel of the tile
    pub valid: bool,
    pub original: TilePixels,
    buffer: Arc<ImageBuffer>,
}

impl UndoRecord {
    /// Write the original pixels back into the image
    pub fn restore(&self) {
        let tile_start_x = self.coord.x * UNDO_TILE_SIZE;
        let tile_start_y = self.coord.y * UNDO_TILE_SIZE;

        // Edge tiles are partially outside the image
        let tile_width = UNDO_TILE_SIZE.min(self.buffer.width.saturating_sub(tile_start_x));
        let tile_height = UNDO_TILE_SIZE.min(self.buffer.height.saturating_sub(tile_start_y));

        for dy in 0..tile_height {
            for dx in 0..tile_width {
                let offset = (dx + dy * UNDO_TILE_SIZE) as usize;
                let value = match &self.original {
                    TilePixels::Byte(px) => PixelValue::Byte(px[offset]),
                    TilePixels::Float(px) => PixelValue::Float(px[offset]),
                };
                self.buffer.set_pixel(tile_start_x + dx, tile_start_y + dy, value);
            }
        }
    }
}

/// Every tile captured during a stroke
#[derive(Debug, Clone, Default)]
pub struct UndoHandoff {
    pub records: Vec<UndoRecord>,
}

impl UndoHandoff {
    pub(crate) fn push_store(&mut self, image: ImageId, tile_number: u32, store: &UndoTileStore) {
        self.records.extend(store.captured().map(|tile| UndoRecord {
            image,
            tile_number,
            coord: tile.coord,
            valid: tile.is_valid(),
            original: tile.original_pixels().clone(),
            buffer: Arc::clone(store.buffer()),
        }));
    }

    /// Tiles the stroke actually changed
    pub fn valid_records(&self) -> impl Iterator<Item = &UndoRecord> {
        self.records.iter().filter(|record| record.valid)
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Undo the stroke by restoring every changed tile.
    ///
    /// Returns the number of tiles written.
    pub fn restore(&self) -> usize {
        let mut restored = 0;
        for record in self.valid_records() {
            record.restore();
            restored += 1;
        }
        debug!("Restored {} of {} captured tiles", restored, self.records.len());
        restored
    }
}
