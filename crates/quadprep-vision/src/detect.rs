// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Quadrat detection entry point.
//
// Runs preprocessing, then the line-based path (Hough -> intersections ->
// quad selection) and the contour fallback independently. A line-based quad
// is preferred; the contour result is used otherwise. Corners are ordered
// and mapped back to original-image pixels before being returned.

use image::{DynamicImage, RgbImage};
use quadprep_core::error::Result;
use quadprep_core::geometry::{Line, Point, order_angular, order_axis_sum};
use quadprep_core::params::{CornerOrdering, DetectionParams};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::contour::detect_contour_quad;
use crate::corners::{line_intersections, select_quad};
use crate::hough::{Segment, detect_lines, detect_segments};
use crate::overlay::{OverlayStyle, draw_overlay};
use crate::preprocess::preprocess;

/// Which path produced the corners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionSource {
    Lines,
    Contour,
}

/// Everything one detection run produced. Never mutated after return.
#[derive(Debug, Clone)]
pub struct QuadratDetectionResult {
    /// The input image.
    pub original: DynamicImage,
    /// The single-channel working image the detectors ran on.
    pub processed: DynamicImage,
    /// Lines, intersections and quad drawn over the working-size image.
    pub overlay: RgbImage,
    /// `[tl, tr, br, bl]` in original-image pixels.
    pub corners: Option<[Point; 4]>,
    pub source: Option<DetectionSource>,
    /// Detected lines, in working-image coordinates.
    pub lines: Vec<Line>,
    /// Segments behind `lines` in probabilistic mode.
    pub segments: Vec<Segment>,
    /// Line intersections, in working-image coordinates.
    pub intersections: Vec<Point>,
    /// Working size divided by original size.
    pub scale: f64,
}

impl QuadratDetectionResult {
    pub fn found(&self) -> bool {
        self.corners.is_some()
    }
}

/// Locate the quadrat in `image`.
///
/// An image without a recognisable frame is not an error: the result simply
/// has no corners. Only invalid `params` fail.
#[instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub fn detect_quadrat(image: &DynamicImage, params: &DetectionParams) -> Result<QuadratDetectionResult> {
    let prepared = preprocess(image, params)?;
    let working = prepared.working();
    let (w, h) = working.dimensions();

    let mut lines = Vec::new();
    let mut segments = Vec::new();
    let mut intersections = Vec::new();
    let mut line_quad = None;
    if params.hough.enabled {
        if params.hough.probabilistic {
            segments = detect_segments(working, &params.hough);
            lines = segments.iter().map(Segment::to_line).collect();
        } else {
            lines = detect_lines(working, &params.hough);
        }
        intersections = line_intersections(&lines, w, h);
        line_quad = select_quad(&intersections);
        debug!(
            lines = lines.len(),
            intersections = intersections.len(),
            found = line_quad.is_some(),
            "Line-based path finished"
        );
    }

    let contour_quad = if params.contour.enabled {
        detect_contour_quad(&prepared.mask, params.contour.approximation)
    } else {
        None
    };

    let (working_quad, source) = match (line_quad, contour_quad) {
        (Some(quad), _) => (Some(quad), Some(DetectionSource::Lines)),
        (None, Some(quad)) => (Some(quad), Some(DetectionSource::Contour)),
        (None, None) => (None, None),
    };
    let working_quad = working_quad.map(|quad| order_corners(&quad, params.ordering));

    let overlay = draw_overlay(
        &prepared.color,
        &lines,
        &intersections,
        working_quad.as_ref(),
        &OverlayStyle::default(),
    );

    let corners = working_quad.map(|quad| to_original(&quad, prepared.scale, image.width(), image.height()));
    info!(found = corners.is_some(), source = ?source, "Quadrat detection finished");

    Ok(QuadratDetectionResult {
        original: image.clone(),
        processed: DynamicImage::ImageLuma8(working.clone()),
        overlay,
        corners,
        source,
        lines,
        segments,
        intersections,
        scale: prepared.scale,
    })
}

/// Put four corners into `[tl, tr, br, bl]` order.
pub fn order_corners(quad: &[Point; 4], ordering: CornerOrdering) -> [Point; 4] {
    let ordered = match ordering {
        CornerOrdering::Angular => order_angular(quad),
        CornerOrdering::AxisSum => order_axis_sum(quad),
    };
    match ordered.as_slice() {
        [a, b, c, d] => [*a, *b, *c, *d],
        _ => *quad,
    }
}

/// Undo the preprocessing downscale, clamping into the image.
fn to_original(quad: &[Point; 4], scale: f64, width: u32, height: u32) -> [Point; 4] {
    let max_x = width.saturating_sub(1) as f64;
    let max_y = height.saturating_sub(1) as f64;
    quad.map(|p| {
        let p = p.scaled(1.0 / scale);
        Point::new(p.x.clamp(0.0, max_x), p.y.clamp(0.0, max_y))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};
    use quadprep_core::params::{
        CannyParams, ContourApproximation, ContourParams, HoughParams, ThresholdMethod, ThresholdParams,
    };

    fn white_square(size: u32, offset: u32, side: u32) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(size, size, |x, y| {
            let inside = (offset..offset + side).contains(&x) && (offset..offset + side).contains(&y);
            Luma([if inside { 255 } else { 0 }])
        }))
    }

    fn assert_corners(corners: &[Point; 4], expected: [(f64, f64); 4], tol: f64) {
        for (p, (x, y)) in corners.iter().zip(expected) {
            assert!(
                (p.x - x).abs() <= tol && (p.y - y).abs() <= tol,
                "corner {p:?} not within {tol} of ({x}, {y}); all: {corners:?}"
            );
        }
    }

    #[test]
    fn contour_fallback_finds_a_square_with_defaults() {
        let img = white_square(600, 100, 400);
        let result = detect_quadrat(&img, &DetectionParams::default()).expect("detect");
        assert_eq!(result.source, Some(DetectionSource::Contour));
        assert!((result.scale - 400.0 / 600.0).abs() < 1e-9);
        let corners = result.corners.expect("corners");
        assert_corners(
            &corners,
            [(100.0, 100.0), (500.0, 100.0), (500.0, 500.0), (100.0, 500.0)],
            8.0,
        );
        assert_eq!((result.processed.width(), result.processed.height()), (400, 400));
        assert_eq!(result.overlay.dimensions(), (400, 400));
        assert_eq!((result.original.width(), result.original.height()), (600, 600));
    }

    #[test]
    fn line_path_wins_when_it_finds_a_quad() {
        let mut img = GrayImage::new(400, 400);
        for i in 0..400 {
            for (x, y) in [(i, 100), (i, 300), (120, i), (280, i)] {
                img.put_pixel(x, y, Luma([255]));
            }
        }
        let params = DetectionParams {
            threshold: quadprep_core::params::ThresholdParams {
                method: ThresholdMethod::Binary,
                value: 127.0,
                ..Default::default()
            },
            blur: quadprep_core::params::BlurParams {
                enabled: false,
                ..Default::default()
            },
            canny: quadprep_core::params::CannyParams {
                enabled: false,
                ..Default::default()
            },
            hough: HoughParams {
                enabled: true,
                threshold: 200,
                ..Default::default()
            },
            ..Default::default()
        };
        let result = detect_quadrat(&DynamicImage::ImageLuma8(img), &params).expect("detect");
        assert_eq!(result.lines.len(), 4);
        assert_eq!(result.intersections.len(), 4);
        assert_eq!(result.source, Some(DetectionSource::Lines));
        assert_corners(
            &result.corners.expect("corners"),
            [(120.0, 100.0), (280.0, 100.0), (280.0, 300.0), (120.0, 300.0)],
            1e-6,
        );
    }

    #[test]
    fn blank_image_has_no_corners() {
        let img = DynamicImage::ImageLuma8(GrayImage::new(200, 200));
        let params = DetectionParams {
            hough: HoughParams {
                enabled: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let result = detect_quadrat(&img, &params).expect("detect");
        assert!(!result.found());
        assert!(result.source.is_none());
        assert!(result.lines.is_empty());
    }

    #[test]
    fn disabled_paths_find_nothing() {
        let params = DetectionParams {
            contour: ContourParams {
                enabled: false,
                ..Default::default()
            },
            ..Default::default()
        };
        let result = detect_quadrat(&white_square(200, 50, 100), &params).expect("detect");
        assert!(result.corners.is_none());
    }

    #[test]
    fn corners_stay_inside_the_original_image() {
        // Frame touching the image border.
        let result = detect_quadrat(&white_square(300, 0, 300), &DetectionParams::default()).expect("detect");
        let corners = result.corners.expect("corners");
        assert!(corners.iter().all(|p| (0.0..300.0).contains(&p.x) && (0.0..300.0).contains(&p.y)));
    }

    #[test]
    fn invalid_params_are_rejected() {
        let mut params = DetectionParams::default();
        params.blur.kernel_size = 4;
        assert!(detect_quadrat(&white_square(50, 10, 20), &params).is_err());
    }

    #[test]
    fn axis_sum_and_angular_agree_on_upright_frames() {
        let quad = [
            Point::new(90.0, 95.0),
            Point::new(10.0, 12.0),
            Point::new(11.0, 88.0),
            Point::new(92.0, 9.0),
        ];
        assert_eq!(
            order_corners(&quad, CornerOrdering::Angular),
            order_corners(&quad, CornerOrdering::AxisSum)
        );
    }

    fn sweep_images() -> Vec<(&'static str, DynamicImage)> {
        let rotated = GrayImage::from_fn(500, 350, |x, y| {
            let (dx, dy) = (x as f64 - 250.0, y as f64 - 175.0);
            let (c, s) = (0.3f64.cos(), 0.3f64.sin());
            let (u, v) = (c * dx + s * dy, -s * dx + c * dy);
            Luma([if u.abs() < 150.0 && v.abs() < 100.0 { 240 } else { 30 }])
        });
        vec![
            ("centred", white_square(220, 40, 140)),
            ("border", DynamicImage::ImageLuma8(GrayImage::from_fn(240, 200, |x, y| {
                Luma([if x < 150 && y < 120 { 250 } else { 10 }])
            }))),
            ("rotated", DynamicImage::ImageLuma8(rotated)),
            ("blank", DynamicImage::ImageLuma8(GrayImage::new(180, 180))),
        ]
    }

    fn sweep_params() -> Vec<DetectionParams> {
        let methods = [
            ThresholdMethod::None,
            ThresholdMethod::Binary,
            ThresholdMethod::Truncate,
            ThresholdMethod::ToZero,
            ThresholdMethod::Mean,
            ThresholdMethod::Gaussian,
        ];
        let approximations = [
            ContourApproximation::None,
            ContourApproximation::Simple,
            ContourApproximation::Tc89L1,
            ContourApproximation::Tc89Kcos,
        ];
        let hough_modes = [
            HoughParams::default(),
            HoughParams { enabled: true, ..Default::default() },
            HoughParams { enabled: true, srn: 2.0, stn: 2.0, ..Default::default() },
            HoughParams {
                enabled: true,
                probabilistic: true,
                min_line_length: 30.0,
                max_line_gap: 5.0,
                ..Default::default()
            },
        ];

        let mut all = Vec::new();
        for method in methods {
            for (otsu, inverse) in [(false, false), (true, false), (false, true), (true, true)] {
                for hough in hough_modes {
                    let i = all.len();
                    all.push(DetectionParams {
                        threshold: ThresholdParams {
                            method,
                            otsu,
                            inverse,
                            ..Default::default()
                        },
                        // Hough over a filled mask votes every pixel, so it
                        // always gets edges here.
                        canny: CannyParams {
                            enabled: hough.enabled || i % 2 == 0,
                            aperture_size: [3, 5, 7][i % 3],
                            ..Default::default()
                        },
                        hough,
                        contour: ContourParams {
                            enabled: true,
                            approximation: approximations[i % 4],
                        },
                        ..Default::default()
                    });
                }
            }
        }
        all
    }

    #[test]
    fn valid_params_never_fail_and_keep_corners_in_bounds() {
        let images = sweep_images();
        for params in sweep_params() {
            params.validate().expect("sweep params are valid");
            for (name, img) in &images {
                let result = detect_quadrat(img, &params)
                    .unwrap_or_else(|err| panic!("{name}: {err} with {params:?}"));
                let (w, h) = (img.width() as f64, img.height() as f64);
                if let Some(corners) = result.corners {
                    assert!(
                        corners.iter().all(|p| p.is_finite() && (0.0..w).contains(&p.x) && (0.0..h).contains(&p.y)),
                        "{name}: {corners:?} with {params:?}"
                    );
                }
                if *name != "blank" && params.threshold.method == ThresholdMethod::Binary {
                    assert!(result.found(), "{name}: no quad with {params:?}");
                }
            }
        }
    }

    #[test]
    fn border_touching_frame_is_found_by_the_contour_path() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_fn(240, 200, |x, y| {
            Luma([if x < 150 && y < 120 { 255 } else { 0 }])
        }));
        let result = detect_quadrat(&img, &DetectionParams::default()).expect("detect");
        assert_eq!(result.source, Some(DetectionSource::Contour));
        assert_corners(
            &result.corners.expect("corners"),
            [(0.0, 0.0), (149.0, 0.0), (149.0, 119.0), (0.0, 119.0)],
            4.0,
        );
    }
}
