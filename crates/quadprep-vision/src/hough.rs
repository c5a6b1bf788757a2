// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Hough line detection on an edge or binary image.
//
// The standard transform votes every non-zero pixel into a (rho, theta)
// accumulator at the configured resolution and theta range, keeping local
// maxima above the vote threshold. `srn`/`stn` refine each peak on a finer
// grid. Probabilistic mode walks each peak line through the image and cuts
// it into segments, bridging gaps up to `max_line_gap` and keeping runs of
// at least `min_line_length`.

use std::f64::consts::PI;

use image::GrayImage;
use quadprep_core::geometry::{Line, Point};
use quadprep_core::params::HoughParams;
use tracing::{debug, instrument};

/// A detected line segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub start: Point,
    pub end: Point,
}

impl Segment {
    pub fn length(&self) -> f64 {
        self.start.distance(&self.end)
    }

    /// The infinite line through the segment, in normal form.
    pub fn to_line(&self) -> Line {
        Line::from_segment(self.start, self.end)
    }
}

/// A local maximum of the accumulator.
#[derive(Debug, Clone, Copy)]
struct Peak {
    line: Line,
    votes: u32,
}

/// Detect lines. In probabilistic mode each segment is converted to its
/// supporting line. No lines is an empty vector, not an error.
#[instrument(skip_all, fields(probabilistic = params.probabilistic))]
pub fn detect_lines(edges: &GrayImage, params: &HoughParams) -> Vec<Line> {
    if params.probabilistic {
        return detect_segments(edges, params)
            .iter()
            .map(Segment::to_line)
            .collect();
    }

    let points = edge_points(edges);
    let accumulator = Accumulator::vote(&points, edges.dimensions(), params);
    let peaks = accumulator.peaks(params.threshold);

    let lines: Vec<Line> = if params.multi_scale() {
        peaks
            .iter()
            .map(|peak| refine_peak(&points, peak.line, params))
            .collect()
    } else {
        peaks.iter().map(|peak| peak.line).collect()
    };

    debug!(edge_points = points.len(), lines = lines.len(), "Hough lines detected");
    lines
}

/// Detect line segments (probabilistic mode).
#[instrument(skip_all)]
pub fn detect_segments(edges: &GrayImage, params: &HoughParams) -> Vec<Segment> {
    let points = edge_points(edges);
    let accumulator = Accumulator::vote(&points, edges.dimensions(), params);
    let peaks = accumulator.peaks(params.threshold);

    let (w, h) = edges.dimensions();
    let mut used = vec![false; w as usize * h as usize];
    let mut segments = Vec::new();
    for peak in &peaks {
        segments.extend(trace_segments(edges, &mut used, peak.line, params));
    }

    debug!(peaks = peaks.len(), segments = segments.len(), "Hough segments detected");
    segments
}

fn edge_points(edges: &GrayImage) -> Vec<(u32, u32)> {
    edges
        .enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] > 0)
        .map(|(x, y, _)| (x, y))
        .collect()
}

// -- Accumulator --------------------------------------------------------------

struct Accumulator {
    rho_res: f64,
    min_theta: f64,
    theta_res: f64,
    num_rho: usize,
    num_angle: usize,
    /// Votes with a one-cell zero border: `(num_angle + 2) x (num_rho + 2)`.
    cells: Vec<u32>,
}

impl Accumulator {
    fn vote(points: &[(u32, u32)], (width, height): (u32, u32), params: &HoughParams) -> Self {
        let rho_res = params.rho;
        let theta_res = params.theta_degrees.to_radians();
        let min_theta = params.min_theta_degrees.to_radians();
        let max_theta = params.max_theta_degrees.to_radians();

        let mut num_angle = (((max_theta - min_theta) / theta_res) + 1e-9).floor() as usize + 1;
        // theta = π duplicates theta = 0.
        if num_angle > 1 && min_theta + (num_angle - 1) as f64 * theta_res >= PI - 1e-9 {
            num_angle -= 1;
        }
        let num_rho = ((((width + height) * 2 + 1) as f64) / rho_res).round().max(1.0) as usize;
        let offset = (num_rho as i64 - 1) / 2;

        let table: Vec<(f64, f64)> = (0..num_angle)
            .map(|n| {
                let theta = min_theta + n as f64 * theta_res;
                (theta.cos() / rho_res, theta.sin() / rho_res)
            })
            .collect();

        let stride = num_rho + 2;
        let mut cells = vec![0u32; (num_angle + 2) * stride];
        for &(x, y) in points {
            let (x, y) = (x as f64, y as f64);
            for (n, &(cos, sin)) in table.iter().enumerate() {
                let r = (x * cos + y * sin).round() as i64 + offset;
                if r < 0 || r >= num_rho as i64 {
                    continue;
                }
                cells[(n + 1) * stride + r as usize + 1] += 1;
            }
        }

        Self {
            rho_res,
            min_theta,
            theta_res,
            num_rho,
            num_angle,
            cells,
        }
    }

    /// Cells above `threshold` that beat their four neighbours, strongest
    /// first.
    fn peaks(&self, threshold: u32) -> Vec<Peak> {
        let stride = self.num_rho + 2;
        let offset = (self.num_rho as i64 - 1) / 2;
        let mut peaks = Vec::new();
        for n in 0..self.num_angle {
            for r in 0..self.num_rho {
                let base = (n + 1) * stride + r + 1;
                let v = self.cells[base];
                if v > threshold
                    && v > self.cells[base - 1]
                    && v >= self.cells[base + 1]
                    && v > self.cells[base - stride]
                    && v >= self.cells[base + stride]
                {
                    let rho = (r as i64 - offset) as f64 * self.rho_res;
                    let theta = self.min_theta + n as f64 * self.theta_res;
                    peaks.push(Peak {
                        line: Line::new(rho, theta),
                        votes: v,
                    });
                }
            }
        }
        peaks.sort_by(|a, b| b.votes.cmp(&a.votes));
        peaks
    }
}

/// Re-vote the pixels near a coarse peak on a grid `srn`/`stn` times finer
/// and return the best fine cell.
fn refine_peak(points: &[(u32, u32)], coarse: Line, params: &HoughParams) -> Line {
    let rho_res = params.rho;
    let theta_res = params.theta_degrees.to_radians();
    let fine_rho = rho_res / params.srn.max(1.0);
    let fine_theta = theta_res / params.stn.max(1.0);
    let rho_steps = (rho_res / fine_rho).round() as usize + 1;
    let theta_steps = (theta_res / fine_theta).round() as usize + 1;
    let min_theta = params.min_theta_degrees.to_radians();
    let max_theta = params.max_theta_degrees.to_radians();

    let (sin, cos) = coarse.theta.sin_cos();
    let band: Vec<(f64, f64)> = points
        .iter()
        .map(|&(x, y)| (x as f64, y as f64))
        .filter(|&(x, y)| (x * cos + y * sin - coarse.rho).abs() <= rho_res)
        .collect();

    let rho_start = coarse.rho - rho_res / 2.0;
    let mut best = (0usize, coarse);
    let mut hist = vec![0usize; rho_steps];
    for t in 0..theta_steps {
        let theta = coarse.theta - theta_res / 2.0 + t as f64 * fine_theta;
        if theta < min_theta || theta > max_theta {
            continue;
        }
        let (sin, cos) = theta.sin_cos();
        hist.iter_mut().for_each(|h| *h = 0);
        for &(x, y) in &band {
            let idx = ((x * cos + y * sin - rho_start) / fine_rho).round();
            if idx >= 0.0 && (idx as usize) < rho_steps {
                hist[idx as usize] += 1;
            }
        }
        for (i, &votes) in hist.iter().enumerate() {
            if votes > best.0 {
                best = (votes, Line::new(rho_start + i as f64 * fine_rho, theta));
            }
        }
    }
    best.1
}

// -- Segment tracing ----------------------------------------------------------

/// Walk along `line` and split its edge support into segments.
fn trace_segments(
    edges: &GrayImage,
    used: &mut [bool],
    line: Line,
    params: &HoughParams,
) -> Vec<Segment> {
    let (w, h) = edges.dimensions();
    let (sin, cos) = line.theta.sin_cos();
    let foot = (line.rho * cos, line.rho * sin);
    let direction = (-sin, cos);
    let reach = (w + h) as i64;

    let hit_at = |t: f64, used: &[bool]| -> Option<(u32, u32)> {
        let cx = foot.0 + t * direction.0;
        let cy = foot.1 + t * direction.1;
        for k in [0.0, -1.0, 1.0] {
            let x = (cx + k * cos).round();
            let y = (cy + k * sin).round();
            if x < 0.0 || y < 0.0 || x >= w as f64 || y >= h as f64 {
                continue;
            }
            let (x, y) = (x as u32, y as u32);
            let idx = y as usize * w as usize + x as usize;
            if edges.get_pixel(x, y).0[0] > 0 && !used[idx] {
                return Some((x, y));
            }
        }
        None
    };

    let mut segments = Vec::new();
    let mut run: Vec<(u32, u32)> = Vec::new();
    let mut last_hit = 0i64;
    for t in -reach..=reach {
        match hit_at(t as f64, used) {
            Some(pixel) => {
                if !run.is_empty() && (t - last_hit) as f64 > params.max_line_gap + 1.0 {
                    close_run(&mut run, used, w, params, &mut segments);
                }
                if run.last() != Some(&pixel) {
                    run.push(pixel);
                }
                last_hit = t;
            }
            None => {
                if !run.is_empty() && (t - last_hit) as f64 > params.max_line_gap + 1.0 {
                    close_run(&mut run, used, w, params, &mut segments);
                }
            }
        }
    }
    if !run.is_empty() {
        close_run(&mut run, used, w, params, &mut segments);
    }
    segments
}

fn close_run(
    run: &mut Vec<(u32, u32)>,
    used: &mut [bool],
    width: u32,
    params: &HoughParams,
    segments: &mut Vec<Segment>,
) {
    if let (Some(&first), Some(&last)) = (run.first(), run.last()) {
        let segment = Segment {
            start: Point::new(first.0 as f64, first.1 as f64),
            end: Point::new(last.0 as f64, last.1 as f64),
        };
        if segment.length() >= params.min_line_length {
            for &(x, y) in run.iter() {
                used[y as usize * width as usize + x as usize] = true;
            }
            segments.push(segment);
        }
    }
    run.clear();
}

// -- Tests --------------------------------------------------------------------
