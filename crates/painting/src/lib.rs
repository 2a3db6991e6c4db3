//! Projective texture painting
//!
//! Brush strokes made in screen space are painted into the UV-mapped images
//! of a triangle mesh. This crate provides:
//! - [`projection`] - Object to screen projection, symmetry views and stored view data
//! - [`bucket`] - Screen-space bucket grid with per-bucket face lists
//! - [`clip`] and [`raster`] - UV-space face clipping and paint pixel rasterization
//! - [`occlusion`] - Depth tests and surface picking
//! - [`seam`] - UV seam detection and seam bleed outsets
//! - [`tiles`] - Undo tiles, opacity masks and partial redraw tracking
//! - [`blend`] - Blend modes and per-brush pixel operators
//! - [`pipeline`] - Stroke setup, the threaded dispatcher and re-projection

pub mod blend;
pub mod brush;
pub mod bucket;
pub mod clip;
pub mod constants;
pub mod geometry;
pub mod image;
pub mod mesh;
pub mod occlusion;
pub mod pipeline;
pub mod projection;
pub mod raster;
pub mod seam;
pub mod surface;
pub mod tiles;
pub mod types;
pub mod validation;

pub use blend::*;
pub use brush::*;
pub use bucket::*;
pub use clip::*;
pub use constants::*;
pub use geometry::*;
pub use image::*;
pub use mesh::*;
pub use occlusion::*;
pub use pipeline::*;
pub use projection::*;
pub use raster::*;
pub use seam::*;
pub use surface::*;
pub use tiles::*;
pub use types::*;
pub use validation::*;
