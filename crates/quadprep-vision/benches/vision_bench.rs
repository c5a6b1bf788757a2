// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the detection and correction hot paths, run on
// synthetic frames so no fixtures are needed.

use criterion::{Criterion, black_box, criterion_group, criterion_main};
use image::{DynamicImage, GrayImage, Luma};

use quadprep_core::geometry::Point;
use quadprep_core::params::{DetectionParams, HoughParams};
use quadprep_vision::{correct_perspective, detect_quadrat, undistort};

/// 800x600 dark background with a bright, slightly rotated frame.
fn synthetic_frame() -> DynamicImage {
    let (cx, cy) = (400.0f64, 300.0f64);
    let (sin, cos) = 0.05f64.sin_cos();
    DynamicImage::ImageLuma8(GrayImage::from_fn(800, 600, |x, y| {
        let (dx, dy) = (x as f64 - cx, y as f64 - cy);
        let (u, v) = (dx * cos + dy * sin, -dx * sin + dy * cos);
        if u.abs() < 250.0 && v.abs() < 200.0 { Luma([240]) } else { Luma([30]) }
    }))
}

fn bench_detection(c: &mut Criterion) {
    let frame = synthetic_frame();
    let contour_only = DetectionParams::default();
    let with_hough = DetectionParams {
        hough: HoughParams {
            enabled: true,
            ..HoughParams::default()
        },
        ..DetectionParams::default()
    };

    c.bench_function("detect_quadrat contour (800x600)", |b| {
        b.iter(|| black_box(detect_quadrat(black_box(&frame), &contour_only)))
    });
    c.bench_function("detect_quadrat hough+contour (800x600)", |b| {
        b.iter(|| black_box(detect_quadrat(black_box(&frame), &with_hough)))
    });
}

fn bench_correction(c: &mut Criterion) {
    let frame = synthetic_frame();
    let corners = [
        Point::new(150.0, 100.0),
        Point::new(650.0, 110.0),
        Point::new(640.0, 500.0),
        Point::new(160.0, 490.0),
    ];
    let matrix = [[700.0, 0.0, 400.0], [0.0, 700.0, 300.0], [0.0, 0.0, 1.0]];
    let coefficients = [-0.12, 0.02, 0.0, 0.0, 0.0];

    c.bench_function("correct_perspective (1000x1000)", |b| {
        b.iter(|| black_box(correct_perspective(black_box(&frame), &corners, 1000, 1000)))
    });
    c.bench_function("undistort (800x600)", |b| {
        b.iter(|| black_box(undistort(black_box(&frame), &matrix, &coefficients)))
    });
}

criterion_group!(benches, bench_detection, bench_correction);
criterion_main!(benches);
