// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Lens distortion correction.
//
// Coefficients follow the usual layout
// `k1, k2, p1, p2[, k3[, k4, k5, k6[, s1, s2, s3, s4[, tau_x, tau_y]]]]`:
// rational radial terms, tangential terms, thin prism terms and a tilted
// sensor. Shorter vectors are zero-padded to 14.

use std::borrow::Cow;

use image::{DynamicImage, ImageBuffer, Luma, Pixel, Rgb, Rgba};
use imageproc::definitions::{Clamp, Image};
use imageproc::geometric_transformations::{Interpolation, warp_into_with};
use quadprep_core::error::{QuadprepError, Result};
use quadprep_core::geometry::{Mat3, mat3_apply, mat3_inverse, mat3_mul};
use quadprep_core::types::{CameraParameters, validate_camera};
use tracing::{debug, info, instrument};

/// Free-scaling parameter for the new camera matrix. 1.0 keeps every
/// source pixel and accepts black borders.
pub const FREE_SCALING_ALPHA: f64 = 1.0;

/// Grid resolution used to find the undistorted image extent.
const EXTENT_GRID: usize = 9;

const UNDISTORT_MAX_ITERS: usize = 20;
const UNDISTORT_EPS: f64 = 1e-12;

/// Pinhole intrinsics, including skew.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Intrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub skew: f64,
}

impl Intrinsics {
    pub fn from_matrix(m: &Mat3) -> Self {
        Self {
            fx: m[0][0],
            fy: m[1][1],
            cx: m[0][2],
            cy: m[1][2],
            skew: m[0][1],
        }
    }

    pub fn matrix(&self) -> Mat3 {
        [
            [self.fx, self.skew, self.cx],
            [0.0, self.fy, self.cy],
            [0.0, 0.0, 1.0],
        ]
    }

    pub fn pixel_to_normalized(&self, [u, v]: [f64; 2]) -> [f64; 2] {
        let y = (v - self.cy) / self.fy;
        let x = (u - self.cx - self.skew * y) / self.fx;
        [x, y]
    }

    pub fn normalized_to_pixel(&self, [x, y]: [f64; 2]) -> [f64; 2] {
        [self.fx * x + self.skew * y + self.cx, self.fy * y + self.cy]
    }
}

/// Distortion coefficients padded to the full 14-term model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistortionModel {
    k: [f64; 14],
    /// Sensor tilt and its inverse; `None` when `tau_x = tau_y = 0`.
    tilt: Option<(Mat3, Mat3)>,
}

impl DistortionModel {
    pub fn new(coefficients: &[f64]) -> Result<Self> {
        if !quadprep_core::types::VALID_COEFFICIENT_COUNTS.contains(&coefficients.len()) {
            return Err(QuadprepError::InvalidCameraParameters(format!(
                "{} distortion coefficients",
                coefficients.len()
            )));
        }
        let mut k = [0.0; 14];
        k[..coefficients.len()].copy_from_slice(coefficients);

        let tilt = if k[12] != 0.0 || k[13] != 0.0 {
            let matrix = tilt_matrix(k[12], k[13]);
            let inverse = mat3_inverse(&matrix).ok_or_else(|| {
                QuadprepError::InvalidCameraParameters("sensor tilt is singular".into())
            })?;
            Some((matrix, inverse))
        } else {
            None
        };
        Ok(Self { k, tilt })
    }

    pub fn is_identity(&self) -> bool {
        self.k.iter().all(|&c| c == 0.0)
    }

    /// Apply distortion to normalized coordinates.
    pub fn distort(&self, [x, y]: [f64; 2]) -> Option<[f64; 2]> {
        let k = &self.k;
        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let numerator = 1.0 + k[0] * r2 + k[1] * r4 + k[4] * r6;
        let denominator = 1.0 + k[5] * r2 + k[6] * r4 + k[7] * r6;
        if denominator.abs() < f64::EPSILON {
            return None;
        }
        let radial = numerator / denominator;
        let xd = x * radial + 2.0 * k[2] * x * y + k[3] * (r2 + 2.0 * x * x) + k[8] * r2 + k[9] * r4;
        let yd = y * radial + k[2] * (r2 + 2.0 * y * y) + 2.0 * k[3] * x * y + k[10] * r2 + k[11] * r4;

        let out = match &self.tilt {
            Some((tilt, _)) => dehomogenize(mat3_apply(tilt, [xd, yd, 1.0]))?,
            None => [xd, yd],
        };
        (out[0].is_finite() && out[1].is_finite()).then_some(out)
    }

    /// Invert [`distort`](Self::distort) by fixed-point iteration.
    pub fn undistort(&self, [xd, yd]: [f64; 2]) -> Option<[f64; 2]> {
        let k = &self.k;
        let [x0, y0] = match &self.tilt {
            Some((_, inverse)) => dehomogenize(mat3_apply(inverse, [xd, yd, 1.0]))?,
            None => [xd, yd],
        };

        let (mut x, mut y) = (x0, y0);
        for _ in 0..UNDISTORT_MAX_ITERS {
            let r2 = x * x + y * y;
            let icdist = (1.0 + ((k[7] * r2 + k[6]) * r2 + k[5]) * r2)
                / (1.0 + ((k[4] * r2 + k[1]) * r2 + k[0]) * r2);
            if !icdist.is_finite() || icdist < 0.0 {
                return None;
            }
            let delta_x = 2.0 * k[2] * x * y + k[3] * (r2 + 2.0 * x * x) + k[8] * r2 + k[9] * r2 * r2;
            let delta_y = k[2] * (r2 + 2.0 * y * y) + 2.0 * k[3] * x * y + k[10] * r2 + k[11] * r2 * r2;
            let x_next = (x0 - delta_x) * icdist;
            let y_next = (y0 - delta_y) * icdist;

            let step = (x_next - x).hypot(y_next - y);
            x = x_next;
            y = y_next;
            if step <= UNDISTORT_EPS {
                break;
            }
        }
        (x.is_finite() && y.is_finite()).then_some([x, y])
    }
}

fn dehomogenize([x, y, w]: [f64; 3]) -> Option<[f64; 2]> {
    (w.abs() > f64::EPSILON).then(|| [x / w, y / w])
}

/// Projection matrix for a sensor tilted by `tau_x` about x then `tau_y`
/// about y.
fn tilt_matrix(tau_x: f64, tau_y: f64) -> Mat3 {
    let (sx, cx) = tau_x.sin_cos();
    let (sy, cy) = tau_y.sin_cos();
    let rot_x = [[1.0, 0.0, 0.0], [0.0, cx, sx], [0.0, -sx, cx]];
    let rot_y = [[cy, 0.0, -sy], [0.0, 1.0, 0.0], [sy, 0.0, cy]];
    let rot = mat3_mul(&rot_y, &rot_x);
    let proj_z = [
        [rot[2][2], 0.0, -rot[0][2]],
        [0.0, rot[2][2], -rot[1][2]],
        [0.0, 0.0, 1.0],
    ];
    mat3_mul(&proj_z, &rot)
}

/// Calibrated camera: intrinsics plus distortion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LensModel {
    pub intrinsics: Intrinsics,
    pub distortion: DistortionModel,
}

impl LensModel {
    pub fn new(matrix: &Mat3, coefficients: &[f64]) -> Result<Self> {
        validate_camera(matrix, coefficients)?;
        Ok(Self {
            intrinsics: Intrinsics::from_matrix(matrix),
            distortion: DistortionModel::new(coefficients)?,
        })
    }

    pub fn from_camera(camera: &CameraParameters) -> Result<Self> {
        Self::new(camera.matrix(), camera.coefficients())
    }

    /// Map an ideal pixel (same intrinsics, no distortion) to where the lens
    /// images it.
    pub fn distort_pixel(&self, pixel: [f64; 2]) -> Option<[f64; 2]> {
        let n = self.intrinsics.pixel_to_normalized(pixel);
        self.distortion
            .distort(n)
            .map(|d| self.intrinsics.normalized_to_pixel(d))
    }

    /// Camera matrix for the undistorted view of a `width` x `height` image.
    ///
    /// `alpha = 0` zooms in until only valid pixels remain; `alpha = 1`
    /// keeps every source pixel. Values in between blend the two.
    pub fn optimal_new_camera_matrix(&self, width: u32, height: u32, alpha: f64) -> Result<Mat3> {
        let (w, h) = (width as f64, height as f64);
        let n = EXTENT_GRID;

        let mut outer = [f64::MAX, f64::MAX, f64::MIN, f64::MIN];
        let mut inner = [f64::MIN, f64::MIN, f64::MAX, f64::MAX];
        for gy in 0..n {
            for gx in 0..n {
                // Pixel centres from the first to the last column and row.
                let pixel = [
                    gx as f64 * (w - 1.0) / (n - 1) as f64,
                    gy as f64 * (h - 1.0) / (n - 1) as f64,
                ];
                let [x, y] = self
                    .distortion
                    .undistort(self.intrinsics.pixel_to_normalized(pixel))
                    .ok_or_else(|| {
                        QuadprepError::InvalidCameraParameters(format!(
                            "distortion cannot be inverted at pixel ({:.0}, {:.0})",
                            pixel[0], pixel[1]
                        ))
                    })?;
                outer = [outer[0].min(x), outer[1].min(y), outer[2].max(x), outer[3].max(y)];
                if gx == 0 {
                    inner[0] = inner[0].max(x);
                }
                if gx == n - 1 {
                    inner[2] = inner[2].min(x);
                }
                if gy == 0 {
                    inner[1] = inner[1].max(y);
                }
                if gy == n - 1 {
                    inner[3] = inner[3].min(y);
                }
            }
        }

        let scale = |rect: [f64; 4]| -> Option<(f64, f64, f64, f64)> {
            let (rw, rh) = (rect[2] - rect[0], rect[3] - rect[1]);
            if !(rw > 0.0 && rh > 0.0) {
                return None;
            }
            let fx = (w - 1.0) / rw;
            let fy = (h - 1.0) / rh;
            Some((fx, fy, -fx * rect[0], -fy * rect[1]))
        };
        let invalid =
            || QuadprepError::InvalidCameraParameters("undistorted image has no extent".into());
        let (fx0, fy0, cx0, cy0) = scale(inner).ok_or_else(invalid)?;
        let (fx1, fy1, cx1, cy1) = scale(outer).ok_or_else(invalid)?;

        let blend = |a: f64, b: f64| a * (1.0 - alpha) + b * alpha;
        Ok([
            [blend(fx0, fx1), 0.0, blend(cx0, cx1)],
            [0.0, blend(fy0, fy1), blend(cy0, cy1)],
            [0.0, 0.0, 1.0],
        ])
    }
}

/// Undistort `image` using the calibration `matrix` and `coefficients`,
/// rendering into the optimal new camera matrix at the image's own size.
///
/// Output pixels with no source are black. The result depends only on the
/// inputs.
#[instrument(skip_all, fields(width = image.width(), height = image.height(), coefficients = coefficients.len()))]
pub fn undistort(image: &DynamicImage, matrix: &Mat3, coefficients: &[f64]) -> Result<DynamicImage> {
    let lens = LensModel::new(matrix, coefficients)?;
    let (w, h) = (image.width(), image.height());
    let new_matrix = lens.optimal_new_camera_matrix(w, h, FREE_SCALING_ALPHA)?;
    let target = Intrinsics::from_matrix(&new_matrix);
    debug!(fx = target.fx, fy = target.fy, cx = target.cx, cy = target.cy, "New camera matrix");

    let source = &lens;
    let target = &target;
    // Pre-images are shifted by one into the edge-padded source.
    let mapping = move |x: f32, y: f32| -> (f32, f32) {
        let n = target.pixel_to_normalized([x as f64, y as f64]);
        match source.distortion.distort(n) {
            Some(d) => {
                let [u, v] = source.intrinsics.normalized_to_pixel(d);
                (snap(u) as f32 + 1.0, snap(v) as f32 + 1.0)
            }
            None => (-1.0, -1.0),
        }
    };

    let output = match image {
        DynamicImage::ImageLuma8(gray) => DynamicImage::ImageLuma8(remap(gray, &mapping, Luma([0]))),
        DynamicImage::ImageRgba8(rgba) => {
            DynamicImage::ImageRgba8(remap(rgba, &mapping, Rgba([0, 0, 0, 255])))
        }
        other => DynamicImage::ImageRgb8(remap(&other.to_rgb8(), &mapping, Rgb([0, 0, 0]))),
    };

    info!("Lens distortion corrected");
    Ok(output)
}

/// Pre-images within this distance of a pixel centre sample it exactly.
const SNAP_TOLERANCE: f64 = 1e-6;

fn snap(v: f64) -> f64 {
    let r = v.round();
    if (v - r).abs() < SNAP_TOLERANCE { r } else { v }
}

/// Bilinear remap into an image of the source's size. The bilinear sampler
/// needs a right and bottom neighbour, so the source is padded by one
/// replicated pixel on each side and `mapping` must address the padded
/// buffer.
fn remap<P, F>(image: &Image<P>, mapping: &F, default: P) -> Image<P>
where
    P: Pixel + Send + Sync,
    P::Subpixel: Send + Sync + Into<f32> + Clamp<f32>,
    F: Fn(f32, f32) -> (f32, f32) + Send + Sync,
{
    let (w, h) = image.dimensions();
    if w == 0 || h == 0 {
        return image.clone();
    }
    let padded = ImageBuffer::from_fn(w + 2, h + 2, |x, y| {
        *image.get_pixel(x.saturating_sub(1).min(w - 1), y.saturating_sub(1).min(h - 1))
    });
    let mut out = ImageBuffer::new(w, h);
    warp_into_with(&padded, mapping, Interpolation::Bilinear, default, &mut out);
    out
}

/// Undistort when the photo carries calibration; otherwise pass the image
/// through untouched.
pub fn undistort_photo<'a>(
    image: &'a DynamicImage,
    camera: Option<&CameraParameters>,
) -> Result<Cow<'a, DynamicImage>> {
    match camera {
        Some(camera) => Ok(Cow::Owned(undistort(image, camera.matrix(), camera.coefficients())?)),
        None => Ok(Cow::Borrowed(image)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    const K: Mat3 = [[200.0, 0.0, 100.0], [0.0, 200.0, 100.0], [0.0, 0.0, 1.0]];

    fn close(a: [f64; 2], b: [f64; 2], tol: f64) -> bool {
        (a[0] - b[0]).abs() <= tol && (a[1] - b[1]).abs() <= tol
    }

    #[test]
    fn zero_coefficients_do_not_distort() {
        let model = DistortionModel::new(&[0.0; 5]).expect("model");
        assert!(model.is_identity());
        assert_eq!(model.distort([0.3, -0.2]), Some([0.3, -0.2]));
        assert_eq!(model.undistort([0.3, -0.2]), Some([0.3, -0.2]));
    }

    #[test]
    fn undistort_inverts_distort() {
        let five = DistortionModel::new(&[-0.12, 0.03, 0.001, -0.002, 0.004]).expect("model");
        let full = DistortionModel::new(&[
            -0.1, 0.02, 0.001, 0.001, 0.0, 0.01, 0.0, 0.0, 0.001, 0.0, -0.001, 0.0, 0.02, -0.01,
        ])
        .expect("model");
        for model in [five, full] {
            for p in [[0.0, 0.0], [0.25, -0.1], [-0.4, 0.35]] {
                let d = model.distort(p).expect("distort");
                let back = model.undistort(d).expect("undistort");
                assert!(close(back, p, 1e-8), "{p:?} -> {d:?} -> {back:?}");
            }
        }
    }

    #[test]
    fn rejects_bad_coefficient_counts() {
        for len in [0, 3, 6, 13, 15] {
            let err = DistortionModel::new(&vec![0.0; len]).unwrap_err();
            assert!(matches!(err, QuadprepError::InvalidCameraParameters(_)));
        }
        let img = DynamicImage::ImageLuma8(GrayImage::new(10, 10));
        assert!(undistort(&img, &K, &[0.0; 7]).is_err());
    }

    #[test]
    fn skew_round_trips_through_intrinsics() {
        let intrinsics = Intrinsics::from_matrix(&[[300.0, 2.5, 160.0], [0.0, 310.0, 120.0], [0.0, 0.0, 1.0]]);
        let pixel = [37.0, 201.0];
        let back = intrinsics.normalized_to_pixel(intrinsics.pixel_to_normalized(pixel));
        assert!(close(back, pixel, 1e-9));
    }

    #[test]
    fn new_matrix_without_distortion_spans_the_image() {
        let lens = LensModel::new(&K, &[0.0; 4]).expect("lens");
        let m = lens.optimal_new_camera_matrix(200, 200, 1.0).expect("matrix");
        assert!((m[0][0] - 200.0).abs() < 1e-9);
        assert!((m[1][1] - 200.0).abs() < 1e-9);
        assert!((m[0][2] - 100.0).abs() < 1e-9);
        assert!((m[1][2] - 100.0).abs() < 1e-9);
        assert_eq!(m[0][1], 0.0);
    }

    #[test]
    fn zero_coefficients_reproduce_the_image() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_fn(200, 200, |x, y| {
            Luma([if x < 100 { 0 } else { 255 - (y % 7) as u8 }])
        }));
        let out = undistort(&img, &K, &[0.0; 5]).expect("undistort");
        assert_eq!(out.as_bytes(), img.as_bytes());

        let off_centre: Mat3 = [[180.0, 0.0, 90.5], [0.0, 210.0, 110.0], [0.0, 0.0, 1.0]];
        let rgb = DynamicImage::ImageRgb8(image::RgbImage::from_fn(64, 48, |x, y| {
            Rgb([(x * 4) as u8, (y * 5) as u8, 77])
        }));
        let out = undistort(&rgb, &off_centre, &[0.0; 4]).expect("undistort");
        assert_eq!(out.as_bytes(), rgb.as_bytes());
    }

    #[test]
    fn keeping_all_pixels_shrinks_barrel_focal_length() {
        let lens = LensModel::new(&K, &[-0.1, 0.0, 0.0, 0.0]).expect("lens");
        let keep_all = lens.optimal_new_camera_matrix(200, 200, 1.0).expect("alpha 1");
        let crop = lens.optimal_new_camera_matrix(200, 200, 0.0).expect("alpha 0");
        assert!(keep_all[0][0] < crop[0][0]);
        assert!(keep_all[0][0] < K[0][0]);
    }

    #[test]
    fn barrel_correction_leaves_black_borders() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(200, 200, Luma([255])));
        let out = undistort(&img, &K, &[-0.1, 0.0, 0.0, 0.0]).expect("undistort").to_luma8();
        assert_eq!(out.dimensions(), (200, 200));
        assert_eq!(out.get_pixel(100, 0).0[0], 0);
        // Bilinear weights may truncate a white sample to 254.
        assert!(out.get_pixel(100, 100).0[0] >= 254);
    }

    #[test]
    fn undistort_is_deterministic() {
        let img = DynamicImage::ImageRgb8(image::RgbImage::from_fn(120, 90, |x, y| {
            Rgb([(x * 2) as u8, (y * 2) as u8, ((x + y) % 255) as u8])
        }));
        let coefficients = [-0.08, 0.01, 0.0005, 0.0, 0.0];
        let a = undistort(&img, &K, &coefficients).expect("first");
        let b = undistort(&img, &K, &coefficients).expect("second");
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn photos_without_calibration_pass_through() {
        let img = DynamicImage::ImageLuma8(GrayImage::from_pixel(8, 8, Luma([9])));
        let out = undistort_photo(&img, None).expect("pass-through");
        assert!(matches!(out, Cow::Borrowed(_)));

        let camera = CameraParameters::new(K, vec![0.0; 5]).expect("camera");
        let out = undistort_photo(&img, Some(&camera)).expect("undistort");
        assert!(matches!(out, Cow::Owned(_)));
    }
}
