// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Preprocessing stage: downscale, grayscale, Gaussian blur, thresholding and
// Canny edges. Every step returns a new buffer; `PreprocessOutput` keeps the
// whole chain so later stages and the debug overlay can pick what they need.

use image::{DynamicImage, GrayImage, Luma};
use imageproc::contrast::otsu_level;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::map::map_colors;
use quadprep_core::error::Result;
use quadprep_core::params::{
    BlurParams, CannyParams, DetectionParams, DownscaleParams, ThresholdMethod, ThresholdParams,
    kernel_sigma,
};
use tracing::{debug, info, instrument, warn};

/// Every intermediate buffer of one preprocessing run.
#[derive(Debug, Clone)]
pub struct PreprocessOutput {
    /// Colour image at working resolution (used for the debug overlay).
    pub color: DynamicImage,
    /// Working size divided by original size (1.0 when not downscaled).
    pub scale: f64,
    pub gray: GrayImage,
    pub blurred: GrayImage,
    /// Threshold output; input of the contour fallback.
    pub mask: GrayImage,
    /// Canny output, when enabled.
    pub edges: Option<GrayImage>,
}

impl PreprocessOutput {
    /// The image the line detector runs on: edges when Canny is enabled,
    /// otherwise the threshold mask.
    pub fn working(&self) -> &GrayImage {
        self.edges.as_ref().unwrap_or(&self.mask)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.gray.dimensions()
    }
}

/// Run the full preprocessing chain.
#[instrument(skip_all, fields(width = image.width(), height = image.height()))]
pub fn preprocess(image: &DynamicImage, params: &DetectionParams) -> Result<PreprocessOutput> {
    params.validate()?;

    let (color, scale) = downscale(image, &params.downscale);
    let gray = color.to_luma8();
    let blurred = blur(&gray, &params.blur);
    let mask = threshold(&blurred, &params.threshold);
    let edges = params
        .canny
        .enabled
        .then(|| canny_edges(&blurred, &params.canny));

    info!(
        work_w = gray.width(),
        work_h = gray.height(),
        scale,
        edges = edges.is_some(),
        "Preprocessing complete"
    );

    Ok(PreprocessOutput {
        color,
        scale,
        gray,
        blurred,
        mask,
        edges,
    })
}

// -- Downscale ----------------------------------------------------------------

/// Shrink the image so its longer side is at most `max_size`, preserving the
/// aspect ratio with area averaging. Never upscales. Returns the image and
/// the applied scale factor.
pub fn downscale(image: &DynamicImage, params: &DownscaleParams) -> (DynamicImage, f64) {
    let (w, h) = (image.width(), image.height());
    let longer = w.max(h);
    if !params.enabled || longer <= params.max_size || longer == 0 {
        return (image.clone(), 1.0);
    }

    let scale = params.max_size as f64 / longer as f64;
    let new_w = (w as f64 * scale).round() as u32;
    let new_h = (h as f64 * scale).round() as u32;
    if !scale.is_finite() || new_w == 0 || new_h == 0 {
        warn!(w, h, scale, "Invalid downscale target; keeping original size");
        return (image.clone(), 1.0);
    }

    let resized = image.thumbnail_exact(new_w, new_h);
    // Effective scale from the rounded size, so corners map back exactly.
    let effective = resized.width().max(resized.height()) as f64 / longer as f64;
    debug!(from_w = w, from_h = h, new_w, new_h, effective, "Downscaled");
    (resized, effective)
}

// -- Blur ---------------------------------------------------------------------

/// Gaussian blur with the configured odd kernel; identity when disabled or
/// for a 1x1 kernel.
pub fn blur(gray: &GrayImage, params: &BlurParams) -> GrayImage {
    if !params.enabled || params.kernel_size <= 1 {
        return gray.clone();
    }
    let sigma = params.sigma();
    debug!(kernel = params.kernel_size, sigma, "Gaussian blur");
    gaussian_blur_f32(gray, sigma)
}

// -- Threshold ----------------------------------------------------------------

/// Apply the configured thresholding method.
pub fn threshold(gray: &GrayImage, params: &ThresholdParams) -> GrayImage {
    let max = params.max_value.clamp(0.0, 255.0) as u8;
    match params.method {
        ThresholdMethod::None => gray.clone(),
        ThresholdMethod::Binary | ThresholdMethod::Truncate | ThresholdMethod::ToZero => {
            let cutoff = if params.otsu {
                let level = otsu_level(gray);
                debug!(level, "Otsu threshold computed");
                level
            } else {
                params.value.clamp(0.0, 255.0).floor() as u8
            };
            let inverse = params.inverse && params.method.supports_inverse();
            global_threshold(gray, params.method, cutoff, max, inverse)
        }
        ThresholdMethod::Mean => {
            let integral = IntegralImage::new(gray);
            let radius = params.block_size / 2;
            adaptive_threshold(gray, max, params.c, |x, y| integral.mean(x, y, radius))
        }
        ThresholdMethod::Gaussian => {
            let local = gaussian_blur_f32(gray, kernel_sigma(params.block_size));
            adaptive_threshold(gray, max, params.c, |x, y| local.get_pixel(x, y).0[0] as f64)
        }
    }
}

fn global_threshold(
    gray: &GrayImage,
    method: ThresholdMethod,
    cutoff: u8,
    max: u8,
    inverse: bool,
) -> GrayImage {
    map_colors(gray, |Luma([v])| {
        let above = v > cutoff;
        let out = match (method, inverse) {
            (ThresholdMethod::Binary, false) => if above { max } else { 0 },
            (ThresholdMethod::Binary, true) => if above { 0 } else { max },
            (ThresholdMethod::Truncate, _) => if above { cutoff } else { v },
            (ThresholdMethod::ToZero, false) => if above { v } else { 0 },
            (ThresholdMethod::ToZero, true) => if above { 0 } else { v },
            _ => v,
        };
        Luma([out])
    })
}

/// Pixels brighter than `local_mean(x, y) − c` become `max`, others 0.
fn adaptive_threshold(
    gray: &GrayImage,
    max: u8,
    c: f64,
    local_mean: impl Fn(u32, u32) -> f64,
) -> GrayImage {
    let (width, height) = gray.dimensions();
    GrayImage::from_fn(width, height, |x, y| {
        let cutoff = local_mean(x, y) - c;
        let v = gray.get_pixel(x, y).0[0] as f64;
        Luma([if v > cutoff { max } else { 0 }])
    })
}

/// Summed-area table with a zero first row and column, so the sum over
/// `[x1, x2) x [y1, y2)` needs four lookups.
struct IntegralImage {
    width: u32,
    height: u32,
    sums: Vec<u64>,
}

impl IntegralImage {
    fn new(gray: &GrayImage) -> Self {
        let (width, height) = gray.dimensions();
        let stride = width as usize + 1;
        let mut sums = vec![0u64; stride * (height as usize + 1)];
        for (y, row) in gray.rows().enumerate() {
            let mut running = 0u64;
            for (x, px) in row.enumerate() {
                running += px.0[0] as u64;
                sums[(y + 1) * stride + x + 1] = running + sums[y * stride + x + 1];
            }
        }
        Self { width, height, sums }
    }

    /// Mean over the `(2r + 1)`-sided square around `(x, y)`, cut to the image.
    fn mean(&self, x: u32, y: u32, r: u32) -> f64 {
        let stride = self.width as usize + 1;
        let (x1, y1) = (x.saturating_sub(r) as usize, y.saturating_sub(r) as usize);
        let x2 = (x.saturating_add(r + 1)).min(self.width) as usize;
        let y2 = (y.saturating_add(r + 1)).min(self.height) as usize;
        let at = |xx: usize, yy: usize| self.sums[yy * stride + xx] as f64;
        let count = ((x2 - x1) * (y2 - y1)) as f64;
        (at(x2, y2) - at(x2, y1) - at(x1, y2) + at(x1, y1)) / count
    }
}

// -- Canny --------------------------------------------------------------------

/// Gradient gain of a `k`x`k` Sobel aperture relative to the 3x3 operator.
///
/// The aperture is a length-`k` binomial smoother (weights sum `2^(k-1)`)
/// times a derivative built from a length-`k-2` binomial, whose response to
/// a unit ramp is `2^(k-2)`. The full response is `2^(2k-3)`: 8, 128 and
/// 2048 for apertures 3, 5 and 7.
fn aperture_gain(aperture: u32) -> f32 {
    let ramp_response = |k: u32| 2f32.powi(2 * k as i32 - 3);
    ramp_response(aperture.max(3)) / ramp_response(3)
}

/// Canny edge detection.
///
/// Thresholds are on the gradient scale of the chosen aperture: a 5x5 or 7x7
/// aperture smooths the image further and yields proportionally larger
/// gradients, so the same thresholds keep more edges. Edge maps are not
/// scale-invariant; results on a downscaled preview may differ at full size.
pub fn canny_edges(gray: &GrayImage, params: &CannyParams) -> GrayImage {
    let gain = aperture_gain(params.aperture_size);
    let smoothed;
    let input = if params.aperture_size > 3 {
        smoothed = gaussian_blur_f32(gray, kernel_sigma(params.aperture_size));
        &smoothed
    } else {
        gray
    };
    let low = params.threshold1.min(params.threshold2) / gain;
    let high = params.threshold1.max(params.threshold2) / gain;
    debug!(low, high, aperture = params.aperture_size, "Canny edge detection");
    canny(input, low, high)
}

// -- Tests --------------------------------------------------------------------
