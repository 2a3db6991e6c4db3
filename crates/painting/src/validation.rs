//! Pre-stroke checks that the mesh carries everything painting needs

use std::fmt;

use projpaint_config::{PaintSettings, PaintTargetMode};
use thiserror::Error;

use crate::image::PaintImage;
use crate::mesh::{ImageId, MeshSnapshot};
use crate::types::BrushKind;

/// Which pieces of required data are absent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MissingData {
    pub uvs: bool,
    pub material: bool,
    pub texture: bool,
    pub stencil: bool,
}

impl MissingData {
    pub fn any(&self) -> bool {
        self.uvs || self.material || self.texture || self.stencil
    }
}

impl fmt::Display for MissingData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.uvs {
            parts.push("UVs");
        }
        if self.material {
            parts.push("Materials");
        }
        if self.texture {
            parts.push("Textures (or linked)");
        }
        if self.stencil {
            parts.push("Stencil");
        }
        write!(f, "{}", parts.join(", "))
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Missing {0} detected")]
pub struct MissingDataError(pub MissingData);

/// Images a stroke targets besides the per-material slots
#[derive(Debug, Clone, Copy, Default)]
pub struct TargetImages {
    /// Image painted in image mode
    pub canvas: Option<ImageId>,
    /// Stencil image (mask brush target and stencil layer)
    pub stencil: Option<ImageId>,
    /// Image sampled by the clone brush in image mode
    pub clone: Option<ImageId>,
}

/// Check that the mesh can be painted with the current settings.
///
/// # Returns
/// `Ok(())` when painting may begin, otherwise every missing item at once.
pub fn check_mesh_data(
    mesh: &MeshSnapshot,
    images: &[PaintImage],
    settings: &PaintSettings,
    targets: &TargetImages,
    brush: BrushKind,
) -> Result<(), MissingDataError> {
    let mut missing = MissingData::default();
    let editable = |id: ImageId| images.get(id.0 as usize).is_some_and(|image| image.editable);

    match settings.mode {
        PaintTargetMode::Material => {
            if mesh.materials.is_empty() {
                missing.material = true;
                missing.texture = true;
            } else {
                missing.texture = !mesh
                    .materials
                    .iter()
                    .filter_map(|material| material.paint_slot)
                    .any(|slot| editable(slot.image));
            }
        }
        PaintTargetMode::Image => {
            missing.texture = !targets.canvas.is_some_and(editable);
        }
    }

    if mesh.uv_layers.is_empty() {
        missing.uvs = true;
    }

    if brush == BrushKind::Mask && targets.stencil.is_none() {
        missing.stencil = true;
    }

    if missing.any() {
        return Err(MissingDataError(missing));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{MaterialSlot, PaintSlot};
    use crate::surface::ImageBuffer;

    fn canvas() -> Vec<PaintImage> {
        vec![PaintImage::new("canvas", ImageBuffer::new_byte(8, 8, [0; 4]))]
    }

    #[test]
    fn test_material_mode_without_materials() {
        let err = check_mesh_data(
            &MeshSnapshot::quad(),
            &canvas(),
            &PaintSettings::default(),
            &TargetImages::default(),
            BrushKind::Draw,
        )
        .unwrap_err();
        assert!(err.0.material && err.0.texture);
        assert!(!err.0.uvs);
        assert_eq!(err.to_string(), "Missing Materials, Textures (or linked) detected");
    }

    #[test]
    fn test_material_slot_satisfies_check() {
        let mesh = MeshSnapshot::quad().with_material(MaterialSlot {
            paint_slot: Some(PaintSlot {
                image: ImageId(0),
                uv_layer: None,
            }),
            clone_slot: None,
        });
        assert!(
            check_mesh_data(
                &mesh,
                &canvas(),
                &PaintSettings::default(),
                &TargetImages::default(),
                BrushKind::Draw
            )
            .is_ok()
        );
    }

    #[test]
    fn test_linked_canvas_is_missing_texture() {
        let mut images = canvas();
        images[0].editable = false;
        let settings = PaintSettings {
            mode: PaintTargetMode::Image,
            ..PaintSettings::default()
        };
        let targets = TargetImages {
            canvas: Some(ImageId(0)),
            ..TargetImages::default()
        };
        let err = check_mesh_data(&MeshSnapshot::quad(), &images, &settings, &targets, BrushKind::Draw)
            .unwrap_err();
        assert!(err.0.texture);
    }

    #[test]
    fn test_mask_brush_needs_stencil_and_uvs() {
        let mut mesh = MeshSnapshot::quad();
        mesh.uv_layers.clear();
        let settings = PaintSettings {
            mode: PaintTargetMode::Image,
            ..PaintSettings::default()
        };
        let targets = TargetImages {
            canvas: Some(ImageId(0)),
            ..TargetImages::default()
        };
        let err = check_mesh_data(&mesh, &canvas(), &settings, &targets, BrushKind::Mask).unwrap_err();
        assert_eq!(
            err.0,
            MissingData {
                uvs: true,
                material: false,
                texture: false,
                stencil: true,
            }
        );
    }
}
