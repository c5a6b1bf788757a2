// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for quadprep: photos, quadrat corners, camera
// parameters, and the display-to-image coordinate transform.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::config::ExportSettings;
use crate::error::{QuadprepError, Result};
use crate::geometry::{Mat3, Point, order_angular};

/// Distortion coefficient counts accepted for a camera model
/// (k1 k2 p1 p2 [k3 [k4 k5 k6 [s1 s2 s3 s4 [τx τy]]]]).
pub const VALID_COEFFICIENT_COUNTS: [usize; 5] = [4, 5, 8, 12, 14];

/// Maximum number of quadrat corners.
pub const MAX_CORNERS: usize = 4;

/// Unique identifier for a photo in a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PhotoId(pub Uuid);

impl PhotoId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PhotoId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PhotoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// -- Camera parameters --------------------------------------------------------

/// Camera intrinsics and lens distortion coefficients for one photo.
///
/// Validated on construction and on deserialization: the matrix must have
/// finite, non-zero focal lengths and the coefficient vector one of the
/// [`VALID_COEFFICIENT_COUNTS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCameraParameters")]
pub struct CameraParameters {
    matrix: Mat3,
    coefficients: Vec<f64>,
}

#[derive(Deserialize)]
struct RawCameraParameters {
    matrix: Mat3,
    coefficients: Vec<f64>,
}

impl TryFrom<RawCameraParameters> for CameraParameters {
    type Error = QuadprepError;

    fn try_from(raw: RawCameraParameters) -> Result<Self> {
        Self::new(raw.matrix, raw.coefficients)
    }
}

impl CameraParameters {
    pub fn new(matrix: Mat3, coefficients: Vec<f64>) -> Result<Self> {
        validate_camera(&matrix, &coefficients)?;
        Ok(Self {
            matrix,
            coefficients,
        })
    }

    /// The 3x3 intrinsic matrix.
    pub fn matrix(&self) -> &Mat3 {
        &self.matrix
    }

    /// The distortion coefficient vector.
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }
}

/// Check an intrinsic matrix and coefficient vector.
pub fn validate_camera(matrix: &Mat3, coefficients: &[f64]) -> Result<()> {
    if !VALID_COEFFICIENT_COUNTS.contains(&coefficients.len()) {
        return Err(QuadprepError::InvalidCameraParameters(format!(
            "expected {:?} distortion coefficients, got {}",
            VALID_COEFFICIENT_COUNTS,
            coefficients.len()
        )));
    }
    if matrix.iter().flatten().chain(coefficients).any(|v| !v.is_finite()) {
        return Err(QuadprepError::InvalidCameraParameters(
            "camera matrix and coefficients must be finite".into(),
        ));
    }
    if matrix[0][0].abs() < 1e-12 || matrix[1][1].abs() < 1e-12 {
        return Err(QuadprepError::InvalidCameraParameters(
            "focal lengths must be non-zero".into(),
        ));
    }
    Ok(())
}

// -- Quadrat corners ----------------------------------------------------------

/// An edit applied to a corner set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CornerEdit {
    Add(Point),
    Move { index: usize, to: Point },
    Remove(usize),
    Clear,
}

/// The change produced by applying a [`CornerEdit`].
#[derive(Debug, Clone, PartialEq)]
pub struct CornerDelta {
    pub before: Vec<Point>,
    pub after: Vec<Point>,
}

impl CornerDelta {
    pub fn changed(&self) -> bool {
        self.before != self.after
    }
}

/// Up to four quadrat corners in original-image pixel coordinates.
///
/// Once three or more points exist they are kept in angular order around
/// their centroid, starting at the top-left. A fifth point is rejected.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(try_from = "Vec<Point>", into = "Vec<Point>")]
pub struct QuadratCorners {
    points: Vec<Point>,
}

impl TryFrom<Vec<Point>> for QuadratCorners {
    type Error = QuadprepError;

    fn try_from(points: Vec<Point>) -> Result<Self> {
        Self::from_points(points)
    }
}

impl From<QuadratCorners> for Vec<Point> {
    fn from(corners: QuadratCorners) -> Self {
        corners.points
    }
}

impl QuadratCorners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from up to four points, ordering them when three or more.
    pub fn from_points(points: Vec<Point>) -> Result<Self> {
        if points.len() > MAX_CORNERS {
            return Err(QuadprepError::InvalidCorners(format!(
                "at most {MAX_CORNERS} corners allowed, got {}",
                points.len()
            )));
        }
        if let Some(bad) = points.iter().find(|p| !p.is_finite()) {
            return Err(QuadprepError::InvalidCorners(format!(
                "corner {bad:?} is not finite"
            )));
        }
        Ok(Self {
            points: reorder(points),
        })
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The ordered quad, when all four corners are set.
    pub fn quad(&self) -> Option<[Point; 4]> {
        <[Point; 4]>::try_from(self.points.as_slice()).ok()
    }

    /// Apply an edit and return what changed.
    pub fn apply(&mut self, edit: CornerEdit) -> Result<CornerDelta> {
        let before = self.points.clone();
        let mut next = before.clone();
        match edit {
            CornerEdit::Add(p) => {
                if next.len() >= MAX_CORNERS {
                    return Err(QuadprepError::InvalidCorners(format!(
                        "quadrat already has {MAX_CORNERS} corners"
                    )));
                }
                next.push(p);
            }
            CornerEdit::Move { index, to } => {
                let slot = next.get_mut(index).ok_or_else(|| {
                    QuadprepError::InvalidCorners(format!("no corner at index {index}"))
                })?;
                *slot = to;
            }
            CornerEdit::Remove(index) => {
                if index >= next.len() {
                    return Err(QuadprepError::InvalidCorners(format!(
                        "no corner at index {index}"
                    )));
                }
                next.remove(index);
            }
            CornerEdit::Clear => next.clear(),
        }
        *self = Self::from_points(next)?;
        Ok(CornerDelta {
            before,
            after: self.points.clone(),
        })
    }
}

fn reorder(points: Vec<Point>) -> Vec<Point> {
    if points.len() >= 3 {
        order_angular(&points)
    } else {
        points
    }
}

// -- Display transform --------------------------------------------------------

/// Maps image pixel coordinates to widget coordinates: `display = image ·
/// scale + offset`. Corners are always stored in image coordinates; UI
/// points must go through [`DisplayTransform::to_image`] first.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayTransform {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl DisplayTransform {
    /// Scale an image to fit inside a viewport, centred.
    pub fn fit(image_size: (u32, u32), viewport: (u32, u32)) -> Self {
        let (iw, ih) = (image_size.0.max(1) as f64, image_size.1.max(1) as f64);
        let (vw, vh) = (viewport.0 as f64, viewport.1 as f64);
        let scale = (vw / iw).min(vh / ih);
        Self {
            scale,
            offset_x: (vw - iw * scale) / 2.0,
            offset_y: (vh - ih * scale) / 2.0,
        }
    }

    pub fn to_display(&self, p: Point) -> Point {
        Point::new(p.x * self.scale + self.offset_x, p.y * self.scale + self.offset_y)
    }

    pub fn to_image(&self, p: Point) -> Point {
        Point::new(
            (p.x - self.offset_x) / self.scale,
            (p.y - self.offset_y) / self.scale,
        )
    }
}

// -- Photos and projects ------------------------------------------------------

/// One survey photo and its quadrat metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: PhotoId,
    pub path: PathBuf,
    #[serde(default)]
    pub corners: QuadratCorners,
    #[serde(default)]
    pub camera: Option<CameraParameters>,
    pub added_at: DateTime<Utc>,
}

impl Photo {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            id: PhotoId::new(),
            path: path.into(),
            corners: QuadratCorners::new(),
            camera: None,
            added_at: Utc::now(),
        }
    }
}

/// A set of photos plus the export settings applied to them.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Project {
    pub photos: Vec<Photo>,
    #[serde(default)]
    pub export: ExportSettings,
}

impl Project {
    /// Load a project from a JSON file. Corner and camera data are
    /// validated while parsing.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let project: Self = serde_json::from_str(&data)?;
        debug!(photos = project.photos.len(), "project loaded");
        Ok(project)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }

    pub fn photo(&self, id: PhotoId) -> Option<&Photo> {
        self.photos.iter().find(|p| p.id == id)
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const K: Mat3 = [[800.0, 0.0, 320.0], [0.0, 800.0, 240.0], [0.0, 0.0, 1.0]];

    #[test]
    fn camera_accepts_known_coefficient_counts() {
        for n in VALID_COEFFICIENT_COUNTS {
            assert!(CameraParameters::new(K, vec![0.0; n]).is_ok(), "count {n}");
        }
    }

    #[test]
    fn camera_rejects_other_coefficient_counts() {
        for n in [0, 3, 6, 13, 15] {
            let err = CameraParameters::new(K, vec![0.0; n]).unwrap_err();
            assert!(matches!(err, QuadprepError::InvalidCameraParameters(_)));
        }
    }

    #[test]
    fn camera_json_with_bad_length_fails_to_load() {
        let json = r#"{ "matrix": [[800,0,320],[0,800,240],[0,0,1]], "coefficients": [0.1, 0.0, 0.0] }"#;
        assert!(serde_json::from_str::<CameraParameters>(json).is_err());
    }

    #[test]
    fn corners_reorder_from_three_points() {
        let mut corners = QuadratCorners::new();
        corners.apply(CornerEdit::Add(Point::new(100.0, 100.0))).unwrap();
        corners.apply(CornerEdit::Add(Point::new(0.0, 0.0))).unwrap();
        assert_eq!(corners.points()[0], Point::new(100.0, 100.0));

        corners.apply(CornerEdit::Add(Point::new(100.0, 0.0))).unwrap();
        let delta = corners.apply(CornerEdit::Add(Point::new(0.0, 100.0))).unwrap();
        assert!(delta.changed());
        assert_eq!(
            corners.quad(),
            Some([
                Point::new(0.0, 0.0),
                Point::new(100.0, 0.0),
                Point::new(100.0, 100.0),
                Point::new(0.0, 100.0),
            ])
        );
    }

    #[test]
    fn fifth_corner_is_rejected() {
        let mut corners = QuadratCorners::from_points(vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ])
        .unwrap();
        assert!(corners.apply(CornerEdit::Add(Point::new(5.0, 5.0))).is_err());
        assert_eq!(corners.len(), 4);
    }

    #[test]
    fn five_corners_fail_to_deserialize() {
        let json = r#"[{"x":0,"y":0},{"x":1,"y":0},{"x":1,"y":1},{"x":0,"y":1},{"x":2,"y":2}]"#;
        assert!(serde_json::from_str::<QuadratCorners>(json).is_err());
    }

    #[test]
    fn moving_a_corner_keeps_order() {
        let mut corners = QuadratCorners::from_points(vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(10.0, 10.0),
            Point::new(0.0, 10.0),
        ])
        .unwrap();
        let delta = corners
            .apply(CornerEdit::Move {
                index: 2,
                to: Point::new(12.0, 11.0),
            })
            .unwrap();
        assert_eq!(delta.after[2], Point::new(12.0, 11.0));
        assert!(corners.apply(CornerEdit::Move { index: 7, to: Point::default() }).is_err());
    }

    #[test]
    fn remove_and_clear() {
        let mut corners =
            QuadratCorners::from_points(vec![Point::new(1.0, 1.0), Point::new(2.0, 2.0)]).unwrap();
        corners.apply(CornerEdit::Remove(0)).unwrap();
        assert_eq!(corners.points(), &[Point::new(2.0, 2.0)]);
        assert!(corners.apply(CornerEdit::Remove(3)).is_err());
        let delta = corners.apply(CornerEdit::Clear).unwrap();
        assert!(corners.is_empty());
        assert_eq!(delta.before.len(), 1);
    }

    #[test]
    fn display_transform_round_trips() {
        let t = DisplayTransform::fit((4000, 3000), (800, 800));
        assert!((t.scale - 0.2).abs() < 1e-12);
        assert!((t.offset_y - 100.0).abs() < 1e-9);
        let image_point = Point::new(1234.0, 567.0);
        let back = t.to_image(t.to_display(image_point));
        assert!(back.distance(&image_point) < 1e-9);
    }

    #[test]
    fn project_round_trips_through_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("project.json");

        let mut photo = Photo::new("reef/IMG_0001.jpg");
        photo.camera = Some(CameraParameters::new(K, vec![-0.2, 0.05, 0.0, 0.0, 0.0]).unwrap());
        photo
            .corners
            .apply(CornerEdit::Add(Point::new(12.0, 30.0)))
            .unwrap();
        let id = photo.id;
        let project = Project {
            photos: vec![photo],
            export: ExportSettings::default(),
        };
        project.save(&path).expect("save");

        let loaded = Project::load(&path).expect("load");
        assert_eq!(loaded, project);
        assert!(loaded.photo(id).is_some());
    }
}
