use serde::{Deserialize, Serialize};

/// Brush behaviour selected per stroke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum BrushKind {
    #[default]
    Draw = 0,
    /// Gradient or flat fill over every visible face
    Fill = 1,
    Soften = 2,
    Smear = 3,
    Clone = 4,
    /// Paints a flat value into the stencil image
    Mask = 5,
}

impl BrushKind {
    /// Brushes that blend a colour taken from the brush settings
    pub fn uses_brush_color(self) -> bool {
        matches!(self, BrushKind::Draw | BrushKind::Fill)
    }

    /// Brushes that stage writes and commit them after the bucket pass
    pub fn stages_writes(self) -> bool {
        matches!(self, BrushKind::Smear | BrushKind::Soften)
    }
}

/// Blend modes for combining a paint colour with an image pixel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[repr(u8)]
pub enum BlendMode {
    #[default]
    Mix = 0,
    Add = 1,
    Subtract = 2,
    Multiply = 3,
    Lighten = 4,
    Darken = 5,
    /// Removes alpha (eraser)
    EraseAlpha = 6,
    /// Adds alpha without changing colour
    AddAlpha = 7,
}

impl BlendMode {
    /// Alpha editing modes ignore the lock-alpha brush option
    pub fn edits_alpha(self) -> bool {
        matches!(self, BlendMode::EraseAlpha | BlendMode::AddAlpha)
    }
}

/// Stroke modifier held while painting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum StrokeMode {
    #[default]
    Normal,
    /// Inverted stroke (sharpen for soften, inverted stencil value for mask)
    Invert,
    /// Temporary soften brush
    Smooth,
}

/// Where the projection comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ProjectionSource {
    /// Live viewport under the cursor
    #[default]
    View,
    /// Live viewport, fill every visible face
    ViewFill,
    /// Re-projection through a scene camera
    ImageCamera,
    /// Re-projection through view data stored on the source image
    ImageView,
}

impl ProjectionSource {
    /// Sources that paint from the live viewport with a brush
    pub fn is_view(self) -> bool {
        matches!(self, ProjectionSource::View)
    }

    /// Re-projection sources paint every bucket from a source image
    pub fn is_reprojection(self) -> bool {
        matches!(self, ProjectionSource::ImageCamera | ProjectionSource::ImageView)
    }
}

/// Symmetry axes, stored as bits X=1, Y=2, Z=4
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, Hash)]
pub struct Symmetry(pub u8);

impl Symmetry {
    pub const NONE: Symmetry = Symmetry(0);
    pub const X: Symmetry = Symmetry(1);
    pub const Y: Symmetry = Symmetry(2);
    pub const Z: Symmetry = Symmetry(4);

    #[inline]
    pub fn contains(self, axis: usize) -> bool {
        self.0 & (1 << axis) != 0
    }

    pub fn union(self, other: Symmetry) -> Symmetry {
        Symmetry(self.0 | other.0)
    }

    /// Every mirror combination enabled by these axes, identity first.
    ///
    /// With X and Y enabled this yields `[0, Y, X, X|Y]`.
    pub fn views(self) -> Vec<Symmetry> {
        let mut views = Vec::with_capacity(8);
        for x in 0..=(self.0 & 1) {
            for y in 0..=((self.0 >> 1) & 1) {
                for z in 0..=((self.0 >> 2) & 1) {
                    views.push(Symmetry(x | (y << 1) | (z << 2)));
                }
            }
        }
        views
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symmetry_view_count() {
        assert_eq!(Symmetry::NONE.views(), vec![Symmetry::NONE]);
        assert_eq!(Symmetry::X.views().len(), 2);
        assert_eq!(Symmetry::X.union(Symmetry::Y).union(Symmetry::Z).views().len(), 8);
    }

    #[test]
    fn test_symmetry_identity_first() {
        let views = Symmetry::X.union(Symmetry::Z).views();
        assert_eq!(views[0], Symmetry::NONE);
        assert!(views.contains(&Symmetry(5)));
    }

    #[test]
    fn test_source_classification() {
        assert!(ProjectionSource::View.is_view());
        assert!(!ProjectionSource::ViewFill.is_view());
        assert!(ProjectionSource::ImageView.is_reprojection());
        assert!(!ProjectionSource::ViewFill.is_reprojection());
    }
}
