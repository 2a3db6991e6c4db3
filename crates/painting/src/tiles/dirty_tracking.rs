//! Partial redraw tracking for incremental image updates

use crate::constants::{BOUNDBOX_DIV, BOUNDBOX_SQUARED};
use crate::geometry::IRect;
use crate::mesh::ImageId;

/// A changed pixel rectangle of one image buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyRegion {
    pub image: ImageId,
    pub tile_number: u32,
    pub rect: IRect,
}

/// An image split into 8x8 cells, each growing a dirty rectangle
#[derive(Debug, Clone, PartialEq)]
pub struct PartialRedraw {
    cells: [IRect; BOUNDBOX_SQUARED],
}

impl Default for PartialRedraw {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialRedraw {
    pub fn new() -> Self {
        Self {
            cells: [IRect::empty(); BOUNDBOX_SQUARED],
        }
    }

    /// Cell of a pixel in an image of the given size
    #[inline]
    pub fn cell_index(x: u32, y: u32, width: u32, height: u32) -> u8 {
        let div = BOUNDBOX_DIV as f32;
        let cx = ((x as f32 / width as f32) * div) as u32;
        let cy = ((y as f32 / height as f32) * div) as u32;
        (cx.min(BOUNDBOX_DIV - 1) + cy.min(BOUNDBOX_DIV - 1) * BOUNDBOX_DIV) as u8
    }

    /// Grow a cell to include a pixel
    #[inline]
    pub fn expand(&mut self, cell: u8, x: u32, y: u32) {
        let (x, y) = (x as i32, y as i32);
        self.cells[cell as usize].union(&IRect {
            xmin: x,
            xmax: x + 1,
            ymin: y,
            ymax: y + 1,
        });
    }

    /// Union another set of cells into this one.
    ///
    /// Returns true when any cell is non-empty afterwards.
    pub fn merge(&mut self, other: &PartialRedraw) -> bool {
        let mut touched = false;
        for (cell, other) in self.cells.iter_mut().zip(&other.cells) {
            cell.union(other);
            if cell.is_valid() {
                touched = true;
            }
        }
        touched
    }

    pub fn is_dirty(&self) -> bool {
        self.cells.iter().any(IRect::is_valid)
    }

    /// Valid cell rectangles, resetting every cell
    pub fn take_dirty(&mut self) -> Vec<IRect> {
        let dirty = self.cells.iter().copied().filter(IRect::is_valid).collect();
        self.cells = [IRect::empty(); BOUNDBOX_SQUARED];
        dirty
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cells_cover_image() {
        assert_eq!(PartialRedraw::cell_index(0, 0, 64, 64), 0);
        assert_eq!(PartialRedraw::cell_index(63, 63, 64, 64), 63);
        assert_eq!(PartialRedraw::cell_index(8, 0, 64, 64), 1);
        assert_eq!(PartialRedraw::cell_index(0, 8, 64, 64), 8);
    }

    #[test]
    fn test_merge_and_take() {
        let mut worker = PartialRedraw::new();
        worker.expand(0, 2, 3);
        worker.expand(0, 5, 1);

        let mut image = PartialRedraw::new();
        assert!(!image.is_dirty());
        assert!(image.merge(&worker));

        let dirty = image.take_dirty();
        assert_eq!(
            dirty,
            vec![IRect {
                xmin: 2,
                xmax: 6,
                ymin: 1,
                ymax: 4
            }]
        );
        assert!(!image.is_dirty());
        assert!(!image.merge(&PartialRedraw::new()));
    }
}
