// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Perspective correction: warp the quadrat onto an axis-aligned rectangle of
// a fixed size.
//
// Corners must arrive as `[top_left, top_right, bottom_right, bottom_left]`
// and map to `(0,0), (W,0), (W,H), (0,H)` respectively. The order is not
// re-validated here; a wrong order yields a mirrored or rotated output.

use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage, Rgba, RgbaImage};
use imageproc::geometric_transformations::{Interpolation, Projection, warp_into};
use quadprep_core::error::{QuadprepError, Result};
use quadprep_core::geometry::{Mat3, Point, has_collinear_triple, homography_from_points};
use tracing::{info, instrument};

/// Target rectangle corners in the same order as the source corners.
pub fn target_corners(width: u32, height: u32) -> [Point; 4] {
    let (w, h) = (width as f64, height as f64);
    [
        Point::new(0.0, 0.0),
        Point::new(w, 0.0),
        Point::new(w, h),
        Point::new(0.0, h),
    ]
}

/// Homography taking the source quad onto the target rectangle.
///
/// Degenerate quads (three collinear corners, or a singular system) are
/// reported as [`QuadprepError::Geometry`].
pub fn perspective_transform(corners: &[Point; 4], target_width: u32, target_height: u32) -> Result<Mat3> {
    if target_width == 0 || target_height == 0 {
        return Err(QuadprepError::Config(format!(
            "target size must be at least 1x1, got {target_width}x{target_height}"
        )));
    }
    if corners.iter().any(|p| !p.is_finite()) {
        return Err(QuadprepError::Geometry("corner coordinates must be finite".into()));
    }
    if has_collinear_triple(corners) {
        return Err(QuadprepError::Geometry(
            "three or more quadrat corners are collinear".into(),
        ));
    }
    homography_from_points(corners, &target_corners(target_width, target_height))
        .ok_or_else(|| QuadprepError::Geometry("perspective transform is singular".into()))
}

/// Rectify the quad bounded by `corners` into a `target_width` x
/// `target_height` image using bilinear resampling.
#[instrument(skip(image, corners), fields(src_w = image.width(), src_h = image.height()))]
pub fn correct_perspective(
    image: &DynamicImage,
    corners: &[Point; 4],
    target_width: u32,
    target_height: u32,
) -> Result<DynamicImage> {
    let h = perspective_transform(corners, target_width, target_height)?;
    let matrix = [
        h[0][0] as f32, h[0][1] as f32, h[0][2] as f32,
        h[1][0] as f32, h[1][1] as f32, h[1][2] as f32,
        h[2][0] as f32, h[2][1] as f32, h[2][2] as f32,
    ];
    let projection = Projection::from_matrix(matrix)
        .ok_or_else(|| QuadprepError::Geometry("perspective transform is not invertible".into()))?;

    let output = match image {
        DynamicImage::ImageLuma8(gray) => {
            let mut out = GrayImage::new(target_width, target_height);
            warp_into(gray, &projection, Interpolation::Bilinear, Luma([0]), &mut out);
            DynamicImage::ImageLuma8(out)
        }
        DynamicImage::ImageRgba8(rgba) => {
            let mut out = RgbaImage::new(target_width, target_height);
            warp_into(rgba, &projection, Interpolation::Bilinear, Rgba([0, 0, 0, 255]), &mut out);
            DynamicImage::ImageRgba8(out)
        }
        other => {
            let rgb = other.to_rgb8();
            let mut out = RgbImage::new(target_width, target_height);
            warp_into(&rgb, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut out);
            DynamicImage::ImageRgb8(out)
        }
    };

    info!(target_width, target_height, "Perspective correction applied");
    Ok(output)
}
