// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Contour-based quad detection.
//
// The largest external contour of the mask is compressed, simplified with
// Douglas-Peucker at 2% of its perimeter and accepted when exactly four
// vertices remain. Anything else falls back to the contour's minimum-area
// rectangle, so a quad is returned whenever any contour exists.

use image::GrayImage;
use image::imageops::overlay;
use imageproc::contours::{BorderType, find_contours};
use imageproc::geometry::{approximate_polygon_dp, arc_length, min_area_rect};
use imageproc::point::Point as PixelPoint;
use quadprep_core::geometry::{Point, polygon_area};
use quadprep_core::params::ContourApproximation;
use tracing::{debug, instrument};

/// Douglas-Peucker tolerance as a fraction of the contour perimeter.
pub const APPROX_EPSILON_RATIO: f64 = 0.02;

/// Largest region of support examined by the dominant-point detectors.
const MAX_SUPPORT: usize = 7;

type Pixel = PixelPoint<i32>;

/// Find the quadrat outline in a binary mask. Non-zero pixels are
/// foreground. Returns `None` only when the mask has no contour at all.
#[instrument(skip(mask), fields(width = mask.width(), height = mask.height()))]
pub fn detect_contour_quad(mask: &GrayImage, approximation: ContourApproximation) -> Option<[Point; 4]> {
    // Border following only reports outer borders for regions surrounded by
    // background, so the mask gets a one-pixel zero frame.
    let contours = find_contours::<i32>(&pad_mask(mask));
    let largest: Vec<Pixel> = contours
        .iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| (pixel_area(&c.points), &c.points))
        .max_by(|(a, _), (b, _)| a.total_cmp(b))
        .map(|(_, points)| points.iter().map(|p| Pixel::new(p.x - 1, p.y - 1)).collect())?;
    let largest = largest.as_slice();

    debug!(
        contours = contours.len(),
        points = largest.len(),
        "Largest external contour selected"
    );

    let compressed = compress(largest, approximation);
    if let Some(quad) = approximate_quad(&compressed) {
        debug!("Contour approximated to four vertices");
        return Some(quad);
    }

    debug!("Falling back to minimum-area rectangle");
    Some(bounding_quad(largest))
}

fn pad_mask(mask: &GrayImage) -> GrayImage {
    let mut padded = GrayImage::new(mask.width() + 2, mask.height() + 2);
    overlay(&mut padded, mask, 1, 1);
    padded
}

/// Reduce a closed contour chain according to `approximation`.
pub fn compress(points: &[Pixel], approximation: ContourApproximation) -> Vec<Pixel> {
    match approximation {
        ContourApproximation::None => points.to_vec(),
        ContourApproximation::Simple => compress_runs(points),
        ContourApproximation::Tc89L1 => dominant_points(points, Curvature::L1),
        ContourApproximation::Tc89Kcos => dominant_points(points, Curvature::KCos),
    }
}

/// Drop points in the middle of straight horizontal, vertical or diagonal
/// runs.
fn compress_runs(points: &[Pixel]) -> Vec<Pixel> {
    let n = points.len();
    if n < 3 {
        return points.to_vec();
    }
    let step = |a: Pixel, b: Pixel| ((b.x - a.x).signum(), (b.y - a.y).signum());
    (0..n)
        .filter(|&i| {
            let prev = points[(i + n - 1) % n];
            let next = points[(i + 1) % n];
            step(prev, points[i]) != step(points[i], next)
        })
        .map(|i| points[i])
        .collect()
}

#[derive(Debug, Clone, Copy)]
enum Curvature {
    L1,
    KCos,
}

/// Teh-Chin style dominant points: each point gets a region of support that
/// grows while the chord across it keeps lengthening, a curvature measure
/// over that support, and survives if it is a local curvature maximum.
fn dominant_points(points: &[Pixel], curvature: Curvature) -> Vec<Pixel> {
    let n = points.len();
    if n < 2 * MAX_SUPPORT + 1 {
        return compress_runs(points);
    }
    let at = |i: isize| points[i.rem_euclid(n as isize) as usize];
    let chord = |i: isize, k: isize| {
        let (a, b) = (at(i - k), at(i + k));
        (((b.x - a.x).pow(2) + (b.y - a.y).pow(2)) as f64).sqrt()
    };

    let mut support = vec![1usize; n];
    let mut measure = vec![0.0f64; n];
    for i in 0..n {
        let ii = i as isize;
        let mut k = 1;
        while k < MAX_SUPPORT && chord(ii, k as isize + 1) > chord(ii, k as isize) {
            k += 1;
        }
        support[i] = k;

        let p = at(ii);
        let a = at(ii - k as isize);
        let b = at(ii + k as isize);
        let (ax, ay) = ((a.x - p.x) as f64, (a.y - p.y) as f64);
        let (bx, by) = ((b.x - p.x) as f64, (b.y - p.y) as f64);
        measure[i] = match curvature {
            Curvature::L1 => ((ax + bx).abs() + (ay + by).abs()) / k as f64,
            Curvature::KCos => {
                let norm = (ax.hypot(ay) * bx.hypot(by)).max(f64::EPSILON);
                (ax * bx + ay * by) / norm + 1.0
            }
        };
    }

    let kept: Vec<Pixel> = (0..n)
        .filter(|&i| {
            let reach = (support[i] / 2).max(1) as isize;
            measure[i] > 1e-6
                && (-reach..=reach).filter(|&d| d != 0).all(|d| {
                    let j = (i as isize + d).rem_euclid(n as isize) as usize;
                    // Ties go to the earlier point of a plateau.
                    measure[i] > measure[j] || (measure[i] == measure[j] && d > 0)
                })
        })
        .map(|i| points[i])
        .collect();

    if kept.len() < 3 { compress_runs(points) } else { kept }
}

/// Closed Douglas-Peucker: split the contour at its two mutually distant
/// points and simplify each half as an open curve.
fn approximate_quad(points: &[Pixel]) -> Option<[Point; 4]> {
    if points.len() < 4 {
        return None;
    }
    let epsilon = APPROX_EPSILON_RATIO * arc_length(points, true);
    if epsilon <= 0.0 {
        return None;
    }

    let dist2 = |a: &Pixel, b: &Pixel| (a.x - b.x).pow(2) + (a.y - b.y).pow(2);
    let farthest_from = |origin: &Pixel| {
        points
            .iter()
            .enumerate()
            .max_by_key(|(_, p)| dist2(origin, p))
            .map(|(i, _)| i)
            .unwrap_or(0)
    };
    let mean = polygon_centroid(points);
    let start = points
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| {
            let da = (a.x as f64 - mean.x).hypot(a.y as f64 - mean.y);
            let db = (b.x as f64 - mean.x).hypot(b.y as f64 - mean.y);
            da.total_cmp(&db)
        })
        .map(|(i, _)| i)
        .unwrap_or(0);

    let mut ring = points.to_vec();
    ring.rotate_left(start);
    let split = farthest_from(&ring[0]);
    if split == 0 {
        return None;
    }

    let mut second = ring[split..].to_vec();
    second.push(ring[0]);
    let mut first = approximate_polygon_dp(&ring[..=split], epsilon, false);
    let second = approximate_polygon_dp(&second, epsilon, false);
    first.pop();
    first.extend_from_slice(&second[..second.len().saturating_sub(1)]);
    first.dedup();

    match first.as_slice() {
        [a, b, c, d] => Some([to_point(a), to_point(b), to_point(c), to_point(d)]),
        _ => None,
    }
}

/// Minimum-area rectangle around the contour, or its bounding box when the
/// contour is too small for a hull.
fn bounding_quad(points: &[Pixel]) -> [Point; 4] {
    if points.len() >= 3 && pixel_area(points) > 0.0 {
        return min_area_rect(points).map(|p| to_point(&p));
    }
    let min_x = points.iter().map(|p| p.x).min().unwrap_or(0) as f64;
    let max_x = points.iter().map(|p| p.x).max().unwrap_or(0) as f64;
    let min_y = points.iter().map(|p| p.y).min().unwrap_or(0) as f64;
    let max_y = points.iter().map(|p| p.y).max().unwrap_or(0) as f64;
    [
        Point::new(min_x, min_y),
        Point::new(max_x, min_y),
        Point::new(max_x, max_y),
        Point::new(min_x, max_y),
    ]
}

fn to_point(p: &Pixel) -> Point {
    Point::new(p.x as f64, p.y as f64)
}

fn pixel_area(points: &[Pixel]) -> f64 {
    let converted: Vec<Point> = points.iter().map(to_point).collect();
    polygon_area(&converted)
}

fn polygon_centroid(points: &[Pixel]) -> Point {
    let converted: Vec<Point> = points.iter().map(to_point).collect();
    quadprep_core::geometry::centroid(&converted)
}
