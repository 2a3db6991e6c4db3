//! Undo tiles and per-image paint bookkeeping
//!
//! Every projected image is divided into 64x64 undo tiles. A tile is
//! captured the first time any worker initializes a pixel inside it and
//! holds the pixels as they were before the stroke, the accumulated mask of
//! masked brushes and a flag telling whether the stroke changed the tile.
//!
//! - [`TileSlot`] - lock-free "first caller creates" slot
//! - [`UndoTileStore`] - the slots of one image
//! - [`ProjectedImage`] - an image buffer targeted by the stroke
//! - [`PartialRedraw`] - 8x8 grid of dirty rectangles
//! - [`UndoHandoff`] - the captured tiles handed over when the stroke ends

mod dirty_tracking;
mod handoff;

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU16, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use crate::constants::{UNDO_TILE_BITS, UNDO_TILE_SIZE};
use crate::mesh::ImageId;
use crate::surface::{ImageBuffer, PixelValue};

pub use dirty_tracking::{DirtyRegion, PartialRedraw};
pub use handoff::{UndoHandoff, UndoRecord};

/// Tile coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    /// Tile containing an image pixel
    #[inline]
    pub fn of_pixel(x: u32, y: u32) -> Self {
        Self {
            x: x >> UNDO_TILE_BITS,
            y: y >> UNDO_TILE_BITS,
        }
    }

    /// Offset of an image pixel inside its tile (row stride is the tile size)
    #[inline]
    pub fn pixel_offset(x: u32, y: u32) -> usize {
        let mask = UNDO_TILE_SIZE - 1;
        ((x & mask) + (y & mask) * UNDO_TILE_SIZE) as usize
    }
}

/// Pixels of a tile as they were before the stroke, full tile size with
/// zeroes past the image edge
#[derive(Debug, Clone, PartialEq)]
pub enum TilePixels {
    Byte(Vec<[u8; 4]>),
    Float(Vec<[f32; 4]>),
}

impl TilePixels {
    #[inline]
    pub fn get(&self, offset: usize) -> PixelValue {
        match self {
            TilePixels::Byte(px) => PixelValue::Byte(px[offset]),
            TilePixels::Float(px) => PixelValue::Float(px[offset]),
        }
    }
}

/// Original pixels, mask accumulation and validity of one tile
#[derive(Debug)]
pub struct UndoTile {
    pub coord: TileCoord,
    original: TilePixels,
    mask_accum: Option<Vec<AtomicU16>>,
    valid: AtomicBool,
}

impl UndoTile {
    /// Copy a tile out of an image.
    ///
    /// # Arguments
    /// * `with_mask` - Allocate the mask accumulator (masked brushes only)
    pub fn capture(buffer: &ImageBuffer, coord: TileCoord, with_mask: bool) -> Self {
        let count = (UNDO_TILE_SIZE * UNDO_TILE_SIZE) as usize;
        let x0 = coord.x * UNDO_TILE_SIZE;
        let y0 = coord.y * UNDO_TILE_SIZE;
        let read = |i: usize| {
            let x = x0 + i as u32 % UNDO_TILE_SIZE;
            let y = y0 + i as u32 / UNDO_TILE_SIZE;
            buffer.get_pixel(x, y)
        };
        let original = if buffer.is_float() {
            TilePixels::Float(
                (0..count)
                    .map(|i| read(i).map_or([0.0; 4], PixelValue::to_premul_float))
                    .collect(),
            )
        } else {
            TilePixels::Byte(
                (0..count)
                    .map(|i| read(i).map_or([0; 4], PixelValue::to_straight_byte))
                    .collect(),
            )
        };
        let mask_accum = with_mask.then(|| (0..count).map(|_| AtomicU16::new(0)).collect());
        Self {
            coord,
            original,
            mask_accum,
            valid: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn original(&self, offset: usize) -> PixelValue {
        self.original.get(offset)
    }

    pub fn original_pixels(&self) -> &TilePixels {
        &self.original
    }

    /// Accumulated mask of a pixel, None for unmasked brushes
    #[inline]
    pub fn mask_accum(&self, offset: usize) -> Option<u16> {
        self.mask_accum
            .as_ref()
            .map(|accum| accum[offset].load(Ordering::Relaxed))
    }

    /// Raise the accumulated mask of a pixel.
    ///
    /// Returns false (and leaves the value alone) unless `value` is larger
    /// than what is stored.
    #[inline]
    pub fn raise_mask(&self, offset: usize, value: u16) -> bool {
        match &self.mask_accum {
            Some(accum) => accum[offset].fetch_max(value, Ordering::Relaxed) < value,
            None => false,
        }
    }

    /// Record that the stroke modified this tile
    #[inline]
    pub fn mark_valid(&self) {
        self.valid.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Relaxed)
    }
}

const SLOT_EMPTY: u8 = 0;
const SLOT_PENDING: u8 = 1;
const SLOT_READY: u8 = 2;

/// Slot holding one lazily captured tile.
///
/// The first caller claims the slot with a compare-exchange and runs the
/// capture; concurrent callers spin until the tile is published.
#[derive(Debug, Default)]
pub struct TileSlot {
    state: AtomicU8,
    tile: OnceLock<UndoTile>,
}

impl TileSlot {
    #[inline]
    pub fn get(&self) -> Option<&UndoTile> {
        self.tile.get()
    }

    pub fn is_ready(&self) -> bool {
        self.state.load(Ordering::Acquire) == SLOT_READY
    }

    /// Return the tile, running `create` if this caller is the first
    pub fn get_or_create(&self, create: impl FnOnce() -> UndoTile) -> &UndoTile {
        let mut create = Some(create);
        loop {
            if let Some(tile) = self.tile.get() {
                return tile;
            }
            if self
                .state
                .compare_exchange(SLOT_EMPTY, SLOT_PENDING, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                if let Some(create) = create.take() {
                    let _ = self.tile.set(create());
                }
                self.state.store(SLOT_READY, Ordering::Release);
            } else {
                std::hint::spin_loop();
            }
        }
    }
}

/// Undo tile slots of one image buffer
#[derive(Debug)]
pub struct UndoTileStore {
    buffer: Arc<ImageBuffer>,
    tiles_x: u32,
    tiles_y: u32,
    with_mask: bool,
    slots: Vec<TileSlot>,
}

impl UndoTileStore {
    pub fn new(buffer: Arc<ImageBuffer>, with_mask: bool) -> Self {
        let tiles_x = buffer.width.div_ceil(UNDO_TILE_SIZE);
        let tiles_y = buffer.height.div_ceil(UNDO_TILE_SIZE);
        let mut slots = Vec::with_capacity((tiles_x * tiles_y) as usize);
        slots.resize_with((tiles_x * tiles_y) as usize, TileSlot::default);
        Self {
            buffer,
            tiles_x,
            tiles_y,
            with_mask,
            slots,
        }
    }

    #[inline]
    pub fn buffer(&self) -> &Arc<ImageBuffer> {
        &self.buffer
    }

    #[inline]
    pub fn tile_index(&self, coord: TileCoord) -> usize {
        (coord.x + coord.y * self.tiles_x) as usize
    }

    pub fn tile_count(&self) -> usize {
        (self.tiles_x * self.tiles_y) as usize
    }

    /// Make sure the tile holding an image pixel is captured.
    ///
    /// # Returns
    /// The tile's index and the pixel's offset inside the tile.
    pub fn ensure(&self, x: u32, y: u32) -> (usize, usize) {
        let coord = TileCoord::of_pixel(x, y);
        let index = self.tile_index(coord);
        self.slots[index].get_or_create(|| UndoTile::capture(&self.buffer, coord, self.with_mask));
        (index, TileCoord::pixel_offset(x, y))
    }

    #[inline]
    pub fn tile(&self, index: usize) -> Option<&UndoTile> {
        self.slots.get(index).and_then(TileSlot::get)
    }

    /// Tiles captured so far
    pub fn captured(&self) -> impl Iterator<Item = &UndoTile> {
        self.slots.iter().filter_map(TileSlot::get)
    }
}

/// One image buffer painted by the stroke
#[derive(Debug)]
pub struct ProjectedImage {
    pub image: ImageId,
    /// UDIM tile number (0 for non-tiled images)
    pub tile_number: u32,
    pub undo: UndoTileStore,
    touch: AtomicBool,
    redraw: Mutex<PartialRedraw>,
}

impl ProjectedImage {
    pub fn new(image: ImageId, tile_number: u32, buffer: Arc<ImageBuffer>, with_mask: bool) -> Self {
        Self {
            image,
            tile_number,
            undo: UndoTileStore::new(buffer, with_mask),
            touch: AtomicBool::new(false),
            redraw: Mutex::new(PartialRedraw::new()),
        }
    }

    #[inline]
    pub fn buffer(&self) -> &Arc<ImageBuffer> {
        self.undo.buffer()
    }

    pub fn touch(&self) {
        self.touch.store(true, Ordering::Relaxed);
    }

    pub fn is_touched(&self) -> bool {
        self.touch.load(Ordering::Relaxed)
    }

    /// Merge a worker's cells into the image's cells.
    ///
    /// Returns true when any cell holds a dirty region afterwards.
    pub fn merge_redraw(&self, other: &PartialRedraw) -> bool {
        let mut redraw = self.redraw.lock().unwrap_or_else(|e| e.into_inner());
        let touched = redraw.merge(other);
        if touched {
            self.touch();
        }
        touched
    }

    /// Dirty regions since the last call, clearing them and the touch flag
    pub fn take_dirty(&self) -> Vec<DirtyRegion> {
        if !self.touch.swap(false, Ordering::Relaxed) {
            return Vec::new();
        }
        let mut redraw = self.redraw.lock().unwrap_or_else(|e| e.into_inner());
        redraw
            .take_dirty()
            .into_iter()
            .map(|rect| DirtyRegion {
                image: self.image,
                tile_number: self.tile_number,
                rect,
            })
            .collect()
    }
}
