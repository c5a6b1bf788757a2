// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Line-based corner extraction: pairwise intersections of detected lines,
// and selection of one quad from the (possibly noisy) intersection set.

use quadprep_core::geometry::{
    Line, Point, angular_difference, centroid, intersect, is_convex, order_angular, polygon_area,
};
use tracing::debug;

/// Line pairs closer than this in orientation are treated as parallel.
pub const PARALLEL_TOLERANCE_DEGREES: f64 = 20.0;

/// Intersections closer than this (pixels) are merged into one candidate.
pub const CLUSTER_RADIUS: f64 = 10.0;

/// Quad search is limited to the best-supported clusters.
const MAX_CANDIDATES: usize = 16;

/// Intersections of every non-parallel pair of lines that land inside
/// `[0, width) x [0, height)`.
///
/// Points are unordered and not deduplicated: lines through a common point
/// yield that point once per pair.
pub fn line_intersections(lines: &[Line], width: u32, height: u32) -> Vec<Point> {
    let tolerance = PARALLEL_TOLERANCE_DEGREES.to_radians();
    let (w, h) = (width as f64, height as f64);

    let mut points = Vec::new();
    for (i, a) in lines.iter().enumerate() {
        for b in &lines[i + 1..] {
            if angular_difference(a.theta, b.theta) < tolerance {
                continue;
            }
            let Some(p) = intersect(a, b) else {
                continue;
            };
            if p.x >= 0.0 && p.x < w && p.y >= 0.0 && p.y < h {
                points.push(p);
            }
        }
    }
    debug!(lines = lines.len(), intersections = points.len(), "Line intersections computed");
    points
}

/// A group of nearby intersections.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Cluster {
    pub center: Point,
    pub members: usize,
}

/// Greedy clustering: each point joins the first cluster whose centre is
/// within `radius`, and that centre is updated to the members' mean.
pub fn cluster_points(points: &[Point], radius: f64) -> Vec<Cluster> {
    let mut groups: Vec<Vec<Point>> = Vec::new();
    let mut centers: Vec<Point> = Vec::new();
    for &p in points {
        match centers.iter().position(|c| c.distance(&p) <= radius) {
            Some(i) => {
                groups[i].push(p);
                centers[i] = centroid(&groups[i]);
            }
            None => {
                groups.push(vec![p]);
                centers.push(p);
            }
        }
    }
    centers
        .into_iter()
        .zip(groups)
        .map(|(center, group)| Cluster {
            center,
            members: group.len(),
        })
        .collect()
}

/// Pick the quad formed by the intersection set.
///
/// Intersections are clustered; among the best-supported clusters the
/// convex four-point combination with the largest area wins. Returns the
/// corners in angular order, or `None` when fewer than four distinct
/// candidates exist or no combination is convex.
pub fn select_quad(points: &[Point]) -> Option<[Point; 4]> {
    let mut clusters = cluster_points(points, CLUSTER_RADIUS);
    if clusters.len() < 4 {
        return None;
    }
    clusters.sort_by(|a, b| b.members.cmp(&a.members));
    clusters.truncate(MAX_CANDIDATES);

    let n = clusters.len();
    let mut best: Option<([Point; 4], f64)> = None;
    for a in 0..n {
        for b in a + 1..n {
            for c in b + 1..n {
                for d in c + 1..n {
                    let candidate = [
                        clusters[a].center,
                        clusters[b].center,
                        clusters[c].center,
                        clusters[d].center,
                    ];
                    let ordered = order_angular(&candidate);
                    if !is_convex(&ordered) {
                        continue;
                    }
                    let area = polygon_area(&ordered);
                    if best.is_none_or(|(_, best_area)| area > best_area) {
                        best = Some(([ordered[0], ordered[1], ordered[2], ordered[3]], area));
                    }
                }
            }
        }
    }
    best.map(|(quad, _)| quad)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    fn grid_lines() -> Vec<Line> {
        vec![
            Line::new(100.0, FRAC_PI_2),
            Line::new(300.0, FRAC_PI_2),
            Line::new(120.0, 0.0),
            Line::new(280.0, 0.0),
        ]
    }

    fn contains(points: &[Point], x: f64, y: f64) -> bool {
        points.iter().any(|p| (p.x - x).abs() < 1e-6 && (p.y - y).abs() < 1e-6)
    }

    #[test]
    fn grid_yields_four_crossings() {
        let points = line_intersections(&grid_lines(), 400, 400);
        assert_eq!(points.len(), 4);
        for (x, y) in [(120.0, 100.0), (280.0, 100.0), (120.0, 300.0), (280.0, 300.0)] {
            assert!(contains(&points, x, y), "missing ({x}, {y}) in {points:?}");
        }
    }

    #[test]
    fn near_parallel_pairs_are_skipped() {
        let lines = [Line::new(100.0, FRAC_PI_2), Line::new(100.0, FRAC_PI_2 + 10f64.to_radians())];
        assert!(line_intersections(&lines, 400, 400).is_empty());
    }

    #[test]
    fn orientation_wraps_at_pi() {
        // 2° and 178° are 4° apart.
        let lines = [Line::new(50.0, 2f64.to_radians()), Line::new(-50.0, 178f64.to_radians())];
        assert!(line_intersections(&lines, 400, 400).is_empty());
    }

    #[test]
    fn points_outside_the_image_are_dropped() {
        let lines = [Line::new(500.0, 0.0), Line::new(100.0, FRAC_PI_2)];
        assert!(line_intersections(&lines, 400, 400).is_empty());
        // The right and bottom borders are exclusive.
        let lines = [Line::new(400.0, 0.0), Line::new(100.0, FRAC_PI_2)];
        assert!(line_intersections(&lines, 400, 400).is_empty());
    }

    #[test]
    fn concurrent_lines_are_not_deduplicated() {
        let diagonal = Line::new(50.0 * std::f64::consts::SQRT_2, 45f64.to_radians());
        let lines = [Line::new(50.0, 0.0), Line::new(50.0, FRAC_PI_2), diagonal];
        let points = line_intersections(&lines, 200, 200);
        assert_eq!(points.len(), 3);
        assert!(points.iter().all(|p| (p.x - 50.0).abs() < 1e-6 && (p.y - 50.0).abs() < 1e-6));
    }

    #[test]
    fn clustering_merges_nearby_points() {
        let points = [
            Point::new(10.0, 10.0),
            Point::new(12.0, 10.0),
            Point::new(100.0, 100.0),
        ];
        let clusters = cluster_points(&points, CLUSTER_RADIUS);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].members, 2);
        assert_eq!(clusters[0].center, Point::new(11.0, 10.0));
    }

    #[test]
    fn select_quad_prefers_the_largest_convex_frame() {
        let mut points = line_intersections(&grid_lines(), 400, 400);
        // Duplicates of one crossing plus an interior stray point.
        points.push(Point::new(121.0, 101.0));
        points.push(Point::new(200.0, 200.0));
        let quad = select_quad(&points).expect("quad");
        let expected = [(120.0, 100.0), (280.0, 100.0), (280.0, 300.0), (120.0, 300.0)];
        for (p, (x, y)) in quad.iter().zip(expected) {
            assert!((p.x - x).abs() <= 1.0 && (p.y - y).abs() <= 1.0, "{quad:?}");
        }
    }

    #[test]
    fn select_quad_needs_four_candidates() {
        let points = [Point::new(0.0, 0.0), Point::new(0.0, 2.0), Point::new(50.0, 0.0), Point::new(0.0, 50.0)];
        assert!(select_quad(&points).is_none());
        assert!(select_quad(&[]).is_none());
    }
}
