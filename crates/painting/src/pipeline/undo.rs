//! Redraw and undo handoff for the painting pipeline

use tracing::debug;

use super::ProjectionStroke;
use crate::tiles::{DirtyRegion, UndoHandoff};

impl ProjectionStroke {
    /// Regions painted since the last call, for the host to refresh
    pub fn refresh_tagged(&self) -> Vec<DirtyRegion> {
        self.shared.proj_images.iter().flat_map(|proj| proj.take_dirty()).collect()
    }

    /// End the stroke and hand its captured tiles to the undo stack
    pub fn finish(self) -> UndoHandoff {
        let mut handoff = UndoHandoff::default();
        for proj in &self.shared.proj_images {
            handoff.push_store(proj.image, proj.tile_number, &proj.undo);
        }
        debug!(
            "Stroke finished: {} undo tiles, {} changed",
            handoff.records.len(),
            handoff.valid_records().count()
        );
        handoff
    }
}
