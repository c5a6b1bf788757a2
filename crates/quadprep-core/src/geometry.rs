// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Geometry primitives: points, polar lines, 3x3 matrices, and the pure
// functions the detection pipeline builds on (intersection, collinearity,
// polygon area, corner ordering).

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

/// Determinant below which two polar lines are treated as parallel.
pub const PARALLEL_DETERMINANT_EPS: f64 = 1e-10;

/// Relative cross-product magnitude below which three points are collinear.
pub const COLLINEAR_EPS: f64 = 1e-6;

/// A 3x3 row-major matrix (camera intrinsics, homographies).
pub type Mat3 = [[f64; 3]; 3];

/// The 3x3 identity matrix.
pub const IDENTITY: Mat3 = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];

/// A point in image pixel coordinates (x to the right, y down).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    pub fn distance(&self, other: &Point) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Multiply both coordinates by `factor`.
    pub fn scaled(&self, factor: f64) -> Point {
        Point::new(self.x * factor, self.y * factor)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f64, f64)> for Point {
    fn from((x, y): (f64, f64)) -> Self {
        Self::new(x, y)
    }
}

impl From<Point> for (f32, f32) {
    fn from(p: Point) -> Self {
        (p.x as f32, p.y as f32)
    }
}

/// A line in Hough normal form: `x·cos(theta) + y·sin(theta) = rho`.
///
/// `rho` is the signed perpendicular distance from the image origin and
/// `theta` the angle of the normal in radians, kept in `[0, π)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub rho: f64,
    pub theta: f64,
}

impl Line {
    /// Build a line, folding `theta` into `[0, π)` (negating `rho` when the
    /// normal flips).
    pub fn new(rho: f64, theta: f64) -> Self {
        let mut rho = rho;
        let mut theta = theta.rem_euclid(2.0 * PI);
        if theta >= PI {
            theta -= PI;
            rho = -rho;
        }
        Self { rho, theta }
    }

    /// Convert a segment into normal form.
    ///
    /// The normal is the segment direction `atan2(dy, dx)` rotated by a
    /// quarter turn; `rho` is the projection of the first endpoint onto it.
    pub fn from_segment(start: Point, end: Point) -> Self {
        let direction = line_angle(start, end);
        let theta = direction + PI / 2.0;
        let rho = start.x * theta.cos() + start.y * theta.sin();
        Self::new(rho, theta)
    }

    /// Two points on the line, `half_length` either side of the foot of the
    /// perpendicular from the origin. Used for drawing.
    pub fn endpoints(&self, half_length: f64) -> (Point, Point) {
        let (sin, cos) = self.theta.sin_cos();
        let foot = Point::new(self.rho * cos, self.rho * sin);
        (
            Point::new(foot.x - half_length * sin, foot.y + half_length * cos),
            Point::new(foot.x + half_length * sin, foot.y - half_length * cos),
        )
    }
}

/// Angle of the direction from `a` to `b`, in radians (`atan2(dy, dx)`).
pub fn line_angle(a: Point, b: Point) -> f64 {
    (b.y - a.y).atan2(b.x - a.x)
}

/// Length of the segment from `a` to `b`.
pub fn line_length(a: Point, b: Point) -> f64 {
    a.distance(&b)
}

/// Smallest angle between two line orientations, in `[0, π/2]`.
///
/// Orientations are compared modulo π, so 1° and 179° are 2° apart.
pub fn angular_difference(theta_a: f64, theta_b: f64) -> f64 {
    let diff = (theta_a - theta_b).abs().rem_euclid(PI);
    diff.min(PI - diff)
}

/// Intersection of two normal-form lines.
///
/// Solves the 2x2 system `[cos_a sin_a; cos_b sin_b]·[x y]ᵀ = [rho_a rho_b]ᵀ`.
/// Returns `None` when the determinant is below
/// [`PARALLEL_DETERMINANT_EPS`].
pub fn intersect(a: &Line, b: &Line) -> Option<Point> {
    let (sin_a, cos_a) = a.theta.sin_cos();
    let (sin_b, cos_b) = b.theta.sin_cos();

    let det = cos_a * sin_b - sin_a * cos_b;
    if det.abs() < PARALLEL_DETERMINANT_EPS {
        return None;
    }

    let x = (a.rho * sin_b - b.rho * sin_a) / det;
    let y = (b.rho * cos_a - a.rho * cos_b) / det;
    Some(Point::new(x, y))
}

/// Whether `a`, `b`, `c` lie on one line (coincident points count).
pub fn are_collinear(a: Point, b: Point, c: Point) -> bool {
    let ab = (b.x - a.x, b.y - a.y);
    let ac = (c.x - a.x, c.y - a.y);
    let cross = ab.0 * ac.1 - ab.1 * ac.0;
    let scale = line_length(a, b) * line_length(a, c);
    if scale == 0.0 {
        return true;
    }
    cross.abs() <= COLLINEAR_EPS * scale
}

/// Whether any three of the given points are collinear.
pub fn has_collinear_triple(points: &[Point]) -> bool {
    let n = points.len();
    for i in 0..n {
        for j in (i + 1)..n {
            for k in (j + 1)..n {
                if are_collinear(points[i], points[j], points[k]) {
                    return true;
                }
            }
        }
    }
    false
}

/// Signed polygon area via the shoelace formula. Positive when the vertices
/// wind clockwise on screen (y down).
pub fn signed_area(points: &[Point]) -> f64 {
    let n = points.len();
    if n < 3 {
        return 0.0;
    }
    let mut area = 0.0;
    for i in 0..n {
        let j = (i + 1) % n;
        area += points[i].x * points[j].y - points[j].x * points[i].y;
    }
    area / 2.0
}

/// Unsigned polygon area.
pub fn polygon_area(points: &[Point]) -> f64 {
    signed_area(points).abs()
}

/// Arithmetic mean of the points (the origin for an empty slice).
pub fn centroid(points: &[Point]) -> Point {
    if points.is_empty() {
        return Point::default();
    }
    let n = points.len() as f64;
    let (sx, sy) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    Point::new(sx / n, sy / n)
}

/// Whether the closed polygon is convex (all turns in one direction).
pub fn is_convex(points: &[Point]) -> bool {
    let n = points.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0.0f64;
    for i in 0..n {
        let a = points[i];
        let b = points[(i + 1) % n];
        let c = points[(i + 2) % n];
        let cross = (b.x - a.x) * (c.y - b.y) - (b.y - a.y) * (c.x - b.x);
        if cross.abs() < f64::EPSILON {
            continue;
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    sign != 0.0
}

/// Whether segments `p1-p2` and `q1-q2` properly cross each other.
pub fn segments_cross(p1: Point, p2: Point, q1: Point, q2: Point) -> bool {
    let orient = |a: Point, b: Point, c: Point| (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x);
    let d1 = orient(q1, q2, p1);
    let d2 = orient(q1, q2, p2);
    let d3 = orient(p1, p2, q1);
    let d4 = orient(p1, p2, q2);
    (d1 * d2 < 0.0) && (d3 * d4 < 0.0)
}

// -- Corner ordering ----------------------------------------------------------

/// Order four points as `[top_left, top_right, bottom_right, bottom_left]`
/// using coordinate sums and differences.
///
/// Top-left has the smallest `x + y`, bottom-right the largest; top-right
/// has the largest `x − y`, bottom-left the smallest. Only reliable for
/// near-axis-aligned quads. Any other count is returned unchanged.
pub fn order_axis_sum(points: &[Point]) -> Vec<Point> {
    if points.len() != 4 {
        return points.to_vec();
    }
    let by = |key: fn(&Point) -> f64, max: bool| -> Point {
        let iter = points.iter().copied();
        let cmp = |a: &Point, b: &Point| key(a).total_cmp(&key(b));
        if max {
            iter.max_by(cmp).unwrap_or_default()
        } else {
            iter.min_by(cmp).unwrap_or_default()
        }
    };
    let top_left = by(|p| p.x + p.y, false);
    let bottom_right = by(|p| p.x + p.y, true);
    let top_right = by(|p| p.x - p.y, true);
    let bottom_left = by(|p| p.x - p.y, false);
    vec![top_left, top_right, bottom_right, bottom_left]
}

/// Order points by angle around their centroid.
///
/// In image coordinates this walks clockwise on screen. The sequence is
/// rotated so the point nearest the top-left (smallest `x + y`) comes
/// first, giving `[tl, tr, br, bl]` for a convex quad at any rotation below
/// 45°. Fewer than three points are returned unchanged.
pub fn order_angular(points: &[Point]) -> Vec<Point> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let center = centroid(points);
    let mut ordered = points.to_vec();
    ordered.sort_by(|a, b| {
        let angle_a = (a.y - center.y).atan2(a.x - center.x);
        let angle_b = (b.y - center.y).atan2(b.x - center.x);
        angle_a.total_cmp(&angle_b)
    });

    let start = ordered
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| (a.x + a.y).total_cmp(&(b.x + b.y)))
        .map(|(i, _)| i)
        .unwrap_or(0);
    ordered.rotate_left(start);
    ordered
}

// -- 3x3 matrices -------------------------------------------------------------

/// Matrix product `a · b`.
pub fn mat3_mul(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut out = [[0.0; 3]; 3];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = (0..3).map(|k| a[i][k] * b[k][j]).sum();
        }
    }
    out
}

/// Matrix-vector product `m · v`.
pub fn mat3_apply(m: &Mat3, v: [f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

pub fn mat3_determinant(m: &Mat3) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Inverse via the adjugate. `None` for a singular matrix.
pub fn mat3_inverse(m: &Mat3) -> Option<Mat3> {
    let det = mat3_determinant(m);
    if !det.is_finite() || det.abs() < 1e-12 {
        return None;
    }
    let inv_det = 1.0 / det;
    Some([
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) * inv_det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) * inv_det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) * inv_det,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) * inv_det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) * inv_det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) * inv_det,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) * inv_det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) * inv_det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) * inv_det,
        ],
    ])
}

/// Homography mapping `src[i]` to `dst[i]` for four correspondences.
///
/// Solves the 8x8 direct linear system with `h33 = 1` by Gaussian
/// elimination with partial pivoting. `None` when the system is singular
/// or the resulting matrix is.
pub fn homography_from_points(src: &[Point; 4], dst: &[Point; 4]) -> Option<Mat3> {
    let mut a = [[0.0f64; 9]; 8];
    for i in 0..4 {
        let (x, y) = (src[i].x, src[i].y);
        let (u, v) = (dst[i].x, dst[i].y);
        a[2 * i] = [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y, u];
        a[2 * i + 1] = [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y, v];
    }

    for col in 0..8 {
        let pivot = (col..8).max_by(|&r1, &r2| a[r1][col].abs().total_cmp(&a[r2][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        for row in 0..8 {
            if row == col {
                continue;
            }
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..9 {
                a[row][k] -= factor * a[col][k];
            }
        }
    }

    let h: Vec<f64> = (0..8).map(|i| a[i][8] / a[i][i]).collect();
    let m = [[h[0], h[1], h[2]], [h[3], h[4], h[5]], [h[6], h[7], 1.0]];
    if mat3_determinant(&m).abs() < 1e-12 || m.iter().flatten().any(|v| !v.is_finite()) {
        return None;
    }
    Some(m)
}

/// Apply a homography to a point. `None` at infinity.
pub fn project(h: &Mat3, p: Point) -> Option<Point> {
    let [x, y, w] = mat3_apply(h, [p.x, p.y, 1.0]);
    if w.abs() < 1e-12 {
        return None;
    }
    let out = Point::new(x / w, y / w);
    out.is_finite().then_some(out)
}

// -- Tests --------------------------------------------------------------------
