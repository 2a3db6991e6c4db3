//! Geometry projector: mesh vertices to screen space
//!
//! A [`Projector`] is built once per view (one per symmetry pass) from the
//! view matrices and the object matrix. It provides:
//! - the orthographic and perspective projection strategies
//! - the object-space view direction and eye position used by normal tests
//! - object-space clipping planes
//!
//! [`ViewData`] is the positional float layout stored on images for
//! re-projection: window matrix (16), view matrix (16), clip start, clip end
//! and an orthographic flag.

use glam::{Mat3, Mat4, Vec2, Vec3, Vec4, Vec4Swizzles};
use serde_json::Value;
use thiserror::Error;

use crate::constants::VIEW_DATA_SIZE;
use crate::geometry::line_point_factor_v2;
use crate::mesh::MeshSnapshot;
use crate::types::{ProjectionSource, Symmetry};

#[derive(Debug, Error, PartialEq)]
pub enum ViewDataError {
    #[error("Image project data invalid: expected {VIEW_DATA_SIZE} floats, found {0}")]
    WrongLength(usize),
    #[error("Image project data invalid: not a float array")]
    NotAnArray,
    #[error("Image project data invalid: entry {0} is not a number")]
    NotANumber(usize),
}

/// Stored view projection of an image rendered from the viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewData {
    pub winmat: Mat4,
    pub viewmat: Mat4,
    pub clip_start: f32,
    pub clip_end: f32,
    pub is_ortho: bool,
}

impl ViewData {
    /// Parse the 35 float layout
    pub fn from_slice(data: &[f32]) -> Result<Self, ViewDataError> {
        if data.len() != VIEW_DATA_SIZE {
            return Err(ViewDataError::WrongLength(data.len()));
        }
        let mut winmat = [0.0; 16];
        let mut viewmat = [0.0; 16];
        winmat.copy_from_slice(&data[0..16]);
        viewmat.copy_from_slice(&data[16..32]);
        Ok(Self {
            winmat: Mat4::from_cols_array(&winmat),
            viewmat: Mat4::from_cols_array(&viewmat),
            clip_start: data[32],
            clip_end: data[33],
            is_ortho: data[34] != 0.0,
        })
    }

    /// Parse view data from an image property value
    pub fn from_property(value: &Value) -> Result<Self, ViewDataError> {
        let Value::Array(items) = value else {
            return Err(ViewDataError::NotAnArray);
        };
        if items.len() != VIEW_DATA_SIZE {
            return Err(ViewDataError::WrongLength(items.len()));
        }
        let floats = items
            .iter()
            .enumerate()
            .map(|(i, item)| item.as_f64().map(|v| v as f32).ok_or(ViewDataError::NotANumber(i)))
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_slice(&floats)
    }

    pub fn to_vec(&self) -> Vec<f32> {
        let mut data = Vec::with_capacity(VIEW_DATA_SIZE);
        data.extend_from_slice(&self.winmat.to_cols_array());
        data.extend_from_slice(&self.viewmat.to_cols_array());
        data.push(self.clip_start);
        data.push(self.clip_end);
        data.push(if self.is_ortho { 1.0 } else { 0.0 });
        data
    }

    /// The view data as an image property value
    pub fn to_property(&self) -> Value {
        Value::Array(
            self.to_vec()
                .into_iter()
                .map(|v| serde_json::Number::from_f64(v as f64).map_or(Value::Null, Value::Number))
                .collect(),
        )
    }
}

/// Everything the projector needs from a viewport or camera
#[derive(Debug, Clone, PartialEq)]
pub struct ViewParams {
    /// Window size in pixels
    pub win_size: Vec2,
    pub winmat: Mat4,
    pub viewmat: Mat4,
    pub clip_start: f32,
    pub clip_end: f32,
    pub is_ortho: bool,
    /// World space clipping planes (`n.x, n.y, n.z, d`); points with a
    /// non-positive side on any plane are clipped. Empty disables clipping.
    pub clip_planes: Vec<Vec4>,
}

impl ViewParams {
    /// Parameters for a live viewport
    pub fn new(win_size: Vec2, winmat: Mat4, viewmat: Mat4, clip_start: f32, clip_end: f32, is_ortho: bool) -> Self {
        Self {
            win_size,
            winmat,
            viewmat,
            clip_start,
            clip_end,
            is_ortho,
            clip_planes: Vec::new(),
        }
    }

    /// Parameters recovered from stored view data, sized to the source image
    pub fn from_view_data(data: &ViewData, win_size: Vec2) -> Self {
        Self::new(
            win_size,
            data.winmat,
            data.viewmat,
            data.clip_start,
            data.clip_end,
            data.is_ortho,
        )
    }

    /// Parameters for a scene camera. The camera matrix is normalized
    /// (scale removed) before inverting it into the view matrix.
    pub fn from_camera(
        camera_to_world: Mat4,
        winmat: Mat4,
        clip_start: f32,
        clip_end: f32,
        is_ortho: bool,
        win_size: Vec2,
    ) -> Self {
        let viewinv = Mat4::from_cols(
            camera_to_world.x_axis.xyz().normalize_or_zero().extend(camera_to_world.x_axis.w),
            camera_to_world.y_axis.xyz().normalize_or_zero().extend(camera_to_world.y_axis.w),
            camera_to_world.z_axis.xyz().normalize_or_zero().extend(camera_to_world.z_axis.w),
            camera_to_world.w_axis,
        );
        Self::new(win_size, winmat, viewinv.inverse(), clip_start, clip_end, is_ortho)
    }

    /// View data to store on an image rendered from this view
    pub fn view_data(&self) -> ViewData {
        ViewData {
            winmat: self.winmat,
            viewmat: self.viewmat,
            clip_start: self.clip_start,
            clip_end: self.clip_end,
            is_ortho: self.is_ortho,
        }
    }

    pub fn with_clip_planes(mut self, planes: Vec<Vec4>) -> Self {
        self.clip_planes = planes;
        self
    }
}

/// Projection strategy, fixed for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionKind {
    Ortho,
    Persp,
}

/// Per-view projection state
#[derive(Debug, Clone)]
pub struct Projector {
    pub obmat: Mat4,
    pub obmat_inv: Mat4,
    pub project_mat: Mat4,
    pub project_mat_inv: Mat4,
    /// Object space direction towards the viewer (orthographic)
    pub view_dir: Vec3,
    /// Object space eye position (perspective)
    pub view_pos: Vec3,
    /// Odd number of mirrored axes
    pub is_flip_object: bool,
    pub kind: ProjectionKind,
    pub win_size: Vec2,
    pub clip_start: f32,
    pub clip_end: f32,
    /// Clipping planes in object space
    pub clip_planes: Vec<Vec4>,
}

impl Projector {
    /// Build the projector of one symmetry view.
    ///
    /// A negatively scaled object starts flipped. Every axis set in
    /// `symmetry` negates that column of the object matrix and toggles
    /// `is_flip_object`.
    pub fn new(view: &ViewParams, object_to_world: Mat4, symmetry: Symmetry) -> Self {
        let mut obmat = object_to_world;
        let mut is_flip_object = object_to_world.determinant() < 0.0;
        for axis in 0..3 {
            if symmetry.contains(axis) {
                let col = obmat.col_mut(axis);
                *col = Vec4::new(-col.x, -col.y, -col.z, col.w);
                is_flip_object = !is_flip_object;
            }
        }
        let obmat_inv = obmat.inverse();
        let project_mat = view.winmat * view.viewmat * obmat;
        let viewinv = view.viewmat.inverse();

        let mut view_dir = Mat3::from_mat4(obmat_inv) * (Mat3::from_mat4(viewinv) * Vec3::Z);
        view_dir = view_dir.normalize_or_zero();
        if is_flip_object {
            view_dir = -view_dir;
        }
        let view_pos = obmat_inv.transform_point3(viewinv.w_axis.xyz());

        // Plane p with p . (x_world, 1) maps to M^T p in object space
        let obmat_t = obmat.transpose();
        let clip_planes = view.clip_planes.iter().map(|p| obmat_t * *p).collect();

        Self {
            obmat,
            obmat_inv,
            project_mat,
            project_mat_inv: project_mat.inverse(),
            view_dir,
            view_pos,
            is_flip_object,
            kind: if view.is_ortho {
                ProjectionKind::Ortho
            } else {
                ProjectionKind::Persp
            },
            win_size: view.win_size,
            clip_start: view.clip_start,
            clip_end: view.clip_end,
            clip_planes,
        }
    }

    #[inline]
    pub fn is_ortho(&self) -> bool {
        self.kind == ProjectionKind::Ortho
    }

    /// Project an object space position to screen space.
    ///
    /// Returns `(x, y, depth, w)`. In perspective, points at or behind the
    /// near clip distance get `x = f32::MAX`.
    #[inline]
    pub fn project(&self, co: Vec3) -> Vec4 {
        match self.kind {
            ProjectionKind::Ortho => project_ortho(&self.project_mat, self.win_size, co),
            ProjectionKind::Persp => {
                project_persp(&self.project_mat, self.win_size, self.clip_start, co)
            }
        }
    }

    /// Screen position of a world space point (homogeneous divide, no near clip test)
    pub fn world_to_screen(&self, world: Vec3) -> Vec2 {
        let local = self.obmat_inv.transform_point3(world);
        let p = self.project_mat * local.extend(1.0);
        let half = self.win_size * 0.5;
        Vec2::new(half.x + half.x * p.x / p.w, half.y + half.y * p.y / p.w)
    }

    /// True when an object space point lies outside the clipping planes
    pub fn is_clipped(&self, co: Vec3) -> bool {
        let p = co.extend(1.0);
        self.clip_planes.iter().any(|plane| plane.dot(p) <= 0.0)
    }

    #[inline]
    pub fn has_clipping(&self) -> bool {
        !self.clip_planes.is_empty()
    }

    /// Direction from a screen pixel into the scene (perspective), length undefined
    pub fn screen_px_to_vector_persp(&self, co_px: Vec2) -> Vec3 {
        let ndc = Vec3::new(
            2.0 * (co_px.x / self.win_size.x) - 1.0,
            2.0 * (co_px.y / self.win_size.y) - 1.0,
            -0.5,
        );
        self.project_mat_inv.project_point3(ndc) - self.view_pos
    }

    /// Factor of the screen point `p` along the object space segment `v1 v2`,
    /// measured in the plane perpendicular to the view ray through `p`
    pub fn screen_px_line_point_factor_persp(&self, p: Vec2, v1: Vec3, v2: Vec3) -> f32 {
        let dir = self.screen_px_to_vector_persp(p);
        let v1_proj = project_plane(v1 - self.view_pos, dir);
        let v2_proj = project_plane(v2 - self.view_pos, dir);
        line_point_factor_v3(Vec3::ZERO, v1_proj, v2_proj)
    }

    /// Object space direction from a point towards the viewer, flipped with the object
    pub fn view_dir_at(&self, co: Vec3) -> Vec3 {
        let dir = match self.kind {
            ProjectionKind::Ortho => return self.view_dir,
            ProjectionKind::Persp => (self.view_pos - co).normalize_or_zero(),
        };
        if self.is_flip_object { -dir } else { dir }
    }
}

/// Orthographic strategy: no perspective divide
#[inline]
pub fn project_ortho(project_mat: &Mat4, win_size: Vec2, co: Vec3) -> Vec4 {
    let p = project_mat.transform_point3(co);
    let half = win_size * 0.5;
    Vec4::new(half.x + half.x * p.x, half.y + half.y * p.y, p.z, 1.0)
}

/// Perspective strategy: divide by `w`, depth is `z / w`
#[inline]
pub fn project_persp(project_mat: &Mat4, win_size: Vec2, clip_start: f32, co: Vec3) -> Vec4 {
    let p = *project_mat * co.extend(1.0);
    if p.w > clip_start {
        let half = win_size * 0.5;
        Vec4::new(
            half.x + half.x * p.x / p.w,
            half.y + half.y * p.y / p.w,
            p.z / p.w,
            p.w,
        )
    } else {
        Vec4::new(f32::MAX, p.y, p.z, p.w)
    }
}

/// True for vertices left unprojected behind the near clip plane
#[inline]
pub fn is_behind_near_clip(v: Vec4) -> bool {
    v.x == f32::MAX
}

fn project_plane(v: Vec3, normal: Vec3) -> Vec3 {
    let len_sq = normal.length_squared();
    if len_sq == 0.0 {
        return v;
    }
    v - normal * (v.dot(normal) / len_sq)
}

fn line_point_factor_v3(p: Vec3, l1: Vec3, l2: Vec3) -> f32 {
    let u = l2 - l1;
    let dot = u.length_squared();
    if dot > 0.0 { u.dot(p - l1) / dot } else { 0.0 }
}

/// Projected vertices of one view with their screen bounds
#[derive(Debug, Clone)]
pub struct ScreenCoords {
    pub coords: Vec<Vec4>,
    pub min: Vec2,
    pub max: Vec2,
}

impl ScreenCoords {
    /// Project every mesh vertex.
    ///
    /// The bounds gain a small margin so faces with an edge on the bounds are
    /// not dropped. Live views clamp them to the window grown by the brush
    /// diameter, re-projection uses the window itself.
    pub fn compute(
        mesh: &MeshSnapshot,
        projector: &Projector,
        source: ProjectionSource,
        diameter: f32,
    ) -> Self {
        let mut min = Vec2::splat(f32::MAX);
        let mut max = Vec2::splat(f32::MIN);
        let coords: Vec<Vec4> = mesh
            .positions
            .iter()
            .map(|&co| {
                let v = projector.project(co);
                if !is_behind_near_clip(v) {
                    min = min.min(v.xy());
                    max = max.max(v.xy());
                }
                v
            })
            .collect();

        if min.x > max.x || min.y > max.y {
            min = Vec2::ZERO;
            max = Vec2::ZERO;
        }

        let margin = (max - min) * 0.000_001;
        min -= margin;
        max += margin;

        let win = projector.win_size;
        match source {
            ProjectionSource::View => {
                let lo = Vec2::splat(-diameter);
                let hi = win + Vec2::splat(diameter);
                min = min.clamp(lo, hi);
                max = max.clamp(lo, hi);
            }
            ProjectionSource::ViewFill => {}
            ProjectionSource::ImageCamera | ProjectionSource::ImageView => {
                min = Vec2::ZERO;
                max = win;
            }
        }

        Self { coords, min, max }
    }

    #[inline]
    pub fn get(&self, vert: usize) -> Vec4 {
        self.coords[vert]
    }

    pub fn width(&self) -> f32 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f32 {
        self.max.y - self.min.y
    }
}

/// Flag vertices whose normal faces further than the cutoff angle from the view.
///
/// A polygon whose vertices are all flagged is culled as a whole.
pub fn compute_vert_cull(mesh: &MeshSnapshot, projector: &Projector, normal_angle_cos: f32) -> Vec<bool> {
    mesh.positions
        .iter()
        .zip(&mesh.vert_normals)
        .map(|(&co, &normal)| {
            let no = if projector.is_flip_object { -normal } else { normal };
            projector.view_dir_at(co).dot(no) <= normal_angle_cos
        })
        .collect()
}

/// Screen position of a UV point inside a triangle (orthographic)
///
/// # Returns
/// The interpolated screen coordinate and the UV barycentric weights.
pub fn screen_px_from_ortho(uv: Vec2, v: [Vec4; 3], uv_tri: [Vec2; 3]) -> (Vec4, Vec3) {
    let w = crate::geometry::barycentric_weights_v2(uv_tri[0], uv_tri[1], uv_tri[2], uv);
    let co = v[0].xyz() * w.x + v[1].xyz() * w.y + v[2].xyz() * w.z;
    (co.extend(1.0), w)
}

/// Screen position of a UV point inside a triangle with perspective correction.
///
/// The returned weights are the UV weights, except for degenerate faces where
/// both are 1/3.
pub fn screen_px_from_persp(uv: Vec2, v: [Vec4; 3], uv_tri: [Vec2; 3]) -> (Vec4, Vec3) {
    let mut w = crate::geometry::barycentric_weights_v2(uv_tri[0], uv_tri[1], uv_tri[2], uv);
    let mut w_int = Vec3::new(w.x * v[0].w, w.y * v[1].w, w.z * v[2].w);
    let total = w_int.x + w_int.y + w_int.z;
    if total > 0.0 {
        w_int /= total;
    } else {
        w = Vec3::splat(1.0 / 3.0);
        w_int = w;
    }
    let co = v[0].xyz() * w_int.x + v[1].xyz() * w_int.y + v[2].xyz() * w_int.z;
    (co.extend(1.0), w)
}

/// Factor of a screen point along a screen edge, using the perspective
/// correct variant when needed
pub fn screen_line_point_factor(
    projector: &Projector,
    p: Vec2,
    s1: Vec2,
    s2: Vec2,
    co1: Vec3,
    co2: Vec3,
) -> f32 {
    match projector.kind {
        ProjectionKind::Ortho => line_point_factor_v2(p, s1, s2),
        ProjectionKind::Persp => projector.screen_px_line_point_factor_persp(p, co1, co2),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ortho_view(size: f32) -> ViewParams {
        // Maps x, y in -1..1 to the full window
        ViewParams::new(
            Vec2::splat(size),
            Mat4::IDENTITY,
            Mat4::IDENTITY,
            0.1,
            100.0,
            true,
        )
    }

    #[test]
    fn test_ortho_projection_centre() {
        let projector = Projector::new(&ortho_view(100.0), Mat4::IDENTITY, Symmetry::NONE);
        let v = projector.project(Vec3::new(0.0, 0.0, 0.5));
        assert!((v.x - 50.0).abs() < 1e-5 && (v.y - 50.0).abs() < 1e-5);
        assert!((v.z - 0.5).abs() < 1e-6);
        let corner = projector.project(Vec3::new(1.0, -1.0, 0.0));
        assert!((corner.x - 100.0).abs() < 1e-5 && corner.y.abs() < 1e-5);
    }

    #[test]
    fn test_persp_near_clip_sentinel() {
        let winmat = Mat4::perspective_rh_gl(1.0, 1.0, 0.1, 100.0);
        let viewmat = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
        let view = ViewParams::new(Vec2::splat(64.0), winmat, viewmat, 0.1, 100.0, false);
        let projector = Projector::new(&view, Mat4::IDENTITY, Symmetry::NONE);
        let visible = projector.project(Vec3::ZERO);
        assert!(!is_behind_near_clip(visible));
        assert!((visible.x - 32.0).abs() < 1e-4);
        let behind = projector.project(Vec3::new(0.0, 0.0, 10.0));
        assert!(is_behind_near_clip(behind));
    }

    #[test]
    fn test_symmetry_mirrors_and_flips() {
        let projector = Projector::new(&ortho_view(100.0), Mat4::IDENTITY, Symmetry::X);
        assert!(projector.is_flip_object);
        let v = projector.project(Vec3::new(0.5, 0.0, 0.0));
        assert!((v.x - 25.0).abs() < 1e-5);
        let both = Projector::new(&ortho_view(100.0), Mat4::IDENTITY, Symmetry(3));
        assert!(!both.is_flip_object);
    }

    #[test]
    fn test_view_dir_points_at_viewer() {
        let projector = Projector::new(&ortho_view(10.0), Mat4::IDENTITY, Symmetry::NONE);
        assert!((projector.view_dir - Vec3::Z).length() < 1e-6);
    }

    #[test]
    fn test_view_data_layout() {
        let mut data: Vec<f32> = (0..35).map(|i| i as f32).collect();
        data[34] = 1.0;
        let view = ViewData::from_slice(&data).unwrap();
        assert_eq!(view.winmat.x_axis, Vec4::new(0.0, 1.0, 2.0, 3.0));
        assert_eq!(view.viewmat.w_axis, Vec4::new(28.0, 29.0, 30.0, 31.0));
        assert_eq!(view.clip_start, 32.0);
        assert_eq!(view.clip_end, 33.0);
        assert!(view.is_ortho);
        assert_eq!(view.to_vec(), data);
    }

    #[test]
    fn test_view_data_rejects_bad_input() {
        assert_eq!(ViewData::from_slice(&[0.0; 34]), Err(ViewDataError::WrongLength(34)));
        assert_eq!(
            ViewData::from_property(&serde_json::json!({"winmat": 1})),
            Err(ViewDataError::NotAnArray)
        );
        let mut items = vec![serde_json::json!(0.0); 35];
        items[3] = serde_json::json!("x");
        assert_eq!(
            ViewData::from_property(&Value::Array(items)),
            Err(ViewDataError::NotANumber(3))
        );
    }

    #[test]
    fn test_view_data_property_round_trip() {
        let view = ortho_view(8.0).view_data();
        let parsed = ViewData::from_property(&view.to_property()).unwrap();
        assert_eq!(parsed, view);
    }

    #[test]
    fn test_camera_scale_is_removed() {
        let camera = Mat4::from_scale_rotation_translation(
            Vec3::splat(3.0),
            glam::Quat::IDENTITY,
            Vec3::new(0.0, 0.0, 5.0),
        );
        let view = ViewParams::from_camera(camera, Mat4::IDENTITY, 0.1, 10.0, true, Vec2::splat(4.0));
        let expected = Mat4::from_translation(Vec3::new(0.0, 0.0, -5.0));
        assert!(view.viewmat.abs_diff_eq(expected, 1e-5));
    }

    #[test]
    fn test_screen_bounds_reprojection_uses_window() {
        let mesh = MeshSnapshot::quad();
        let projector = Projector::new(&ortho_view(32.0), Mat4::from_scale(Vec3::splat(0.5)), Symmetry::NONE);
        let coords = ScreenCoords::compute(&mesh, &projector, ProjectionSource::ImageView, 64.0);
        assert_eq!(coords.min, Vec2::ZERO);
        assert_eq!(coords.max, Vec2::splat(32.0));
        let live = ScreenCoords::compute(&mesh, &projector, ProjectionSource::View, 64.0);
        assert!((live.min.x - 8.0).abs() < 1e-3 && (live.max.x - 24.0).abs() < 1e-3);
    }

    #[test]
    fn test_clip_planes_in_object_space() {
        let view = ortho_view(10.0).with_clip_planes(vec![Vec4::new(1.0, 0.0, 0.0, 0.0)]);
        let projector = Projector::new(&view, Mat4::from_translation(Vec3::new(2.0, 0.0, 0.0)), Symmetry::NONE);
        // Object origin sits at world x = 2, inside the plane
        assert!(!projector.is_clipped(Vec3::ZERO));
        assert!(projector.is_clipped(Vec3::new(-3.0, 0.0, 0.0)));
    }

    #[test]
    fn test_vert_cull_back_facing() {
        let mesh = MeshSnapshot::quad();
        let projector = Projector::new(&ortho_view(10.0), Mat4::IDENTITY, Symmetry::NONE);
        let cull = compute_vert_cull(&mesh, &projector, 0.1);
        assert!(cull.iter().all(|&c| !c));
        let flipped = Projector::new(&ortho_view(10.0), Mat4::IDENTITY, Symmetry::Z);
        let cull = compute_vert_cull(&mesh, &flipped, 0.1);
        // Mirroring z flips the view direction and the normal together
        assert!(cull.iter().all(|&c| !c));
    }

    #[test]
    fn test_screen_px_from_ortho_interpolates() {
        let v = [
            Vec4::new(0.0, 0.0, 0.0, 1.0),
            Vec4::new(10.0, 0.0, 1.0, 1.0),
            Vec4::new(0.0, 10.0, 0.0, 1.0),
        ];
        let uv = [Vec2::ZERO, Vec2::X, Vec2::Y];
        let (co, w) = screen_px_from_ortho(Vec2::new(0.5, 0.0), v, uv);
        assert!((co.x - 5.0).abs() < 1e-5 && (co.z - 0.5).abs() < 1e-5);
        assert!((w.y - 0.5).abs() < 1e-6);
    }
}
