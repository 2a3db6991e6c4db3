/// Brush diameter divisor used to size buckets (bucket edge = diameter / 4).
pub const BUCKET_BRUSH_DIV: f32 = 4.0;

/// Minimum buckets per axis.
pub const BUCKET_RECT_MIN: i32 = 4;

/// Maximum buckets per axis. Grids that would exceed this run single-threaded.
pub const BUCKET_RECT_MAX: i32 = 256;

/// Partial redraw cells per image axis.
pub const BOUNDBOX_DIV: u32 = 8;

/// Total partial redraw cells per image.
pub const BOUNDBOX_SQUARED: usize = (BOUNDBOX_DIV * BOUNDBOX_DIV) as usize;

/// Tolerance for UV comparisons and point-in-triangle limits.
pub const GEOM_TOLERANCE: f32 = 0.00075;

/// Tolerance in screen pixels for clipping and duplicate removal.
pub const PIXEL_TOLERANCE: f32 = 0.01;

/// Inset factor applied to a face before measuring seam pixel distance.
pub const FACE_SCALE_SEAM: f32 = 0.99;

/// Seam outsets never grow past this multiple of the bleed distance.
pub const SEAM_LENGTH_FACTOR_MAX: f32 = 10.0;

/// Undo tile edge in pixels (log2).
pub const UNDO_TILE_BITS: u32 = 6;

/// Undo tile edge in pixels.
pub const UNDO_TILE_SIZE: u32 = 1 << UNDO_TILE_BITS;

/// Largest value of a 16-bit paint mask.
pub const MASK_MAX: f32 = 65535.0;

/// Number of floats in stored view data: winmat, viewmat, clip start/end, ortho flag.
pub const VIEW_DATA_SIZE: usize = 16 + 16 + 3;

/// Image property key holding stored view data.
pub const VIEW_DATA_ID: &str = "view_data";

/// First UDIM tile number.
pub const UDIM_FIRST_TILE: u32 = 1001;

/// Brush radius used by re-projection so that each bucket is covered.
pub const REPROJECT_BRUSH_SIZE: f32 = 32.0;

/// Smallest brush diameter accepted for a stroke.
pub const MIN_BRUSH_DIAMETER: f32 = 2.0;
