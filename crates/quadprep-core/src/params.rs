// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Quadrat detection parameters.
//
// One struct per pipeline stage, grouped into `DetectionParams`. Defaults
// describe a bright frame on a dark background: downscale to 400 px,
// 5x5 blur, binary threshold at 225, Canny 50/150 with a 5x5 aperture,
// Hough disabled and the contour fallback enabled.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::{QuadprepError, Result};

/// Uniform downscaling applied before any other stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownscaleParams {
    pub enabled: bool,
    /// Longest allowed image side in pixels.
    pub max_size: u32,
}

impl Default for DownscaleParams {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size: 400,
        }
    }
}

/// Gaussian blur with a square kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlurParams {
    pub enabled: bool,
    /// Odd kernel side length, at least 1.
    pub kernel_size: u32,
}

impl Default for BlurParams {
    fn default() -> Self {
        Self {
            enabled: true,
            kernel_size: 5,
        }
    }
}

impl BlurParams {
    /// Gaussian sigma for the kernel size, using the usual
    /// `0.3·((k − 1)·0.5 − 1) + 0.8` rule.
    pub fn sigma(&self) -> f32 {
        kernel_sigma(self.kernel_size)
    }
}

/// Sigma matching a Gaussian kernel of side `kernel_size`.
pub fn kernel_sigma(kernel_size: u32) -> f32 {
    0.3 * ((kernel_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Thresholding method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdMethod {
    /// Leave the blurred grayscale image as it is.
    None,
    /// `value > cutoff ? max : 0`.
    Binary,
    /// `value > cutoff ? cutoff : value`.
    Truncate,
    /// `value > cutoff ? value : 0`.
    ToZero,
    /// Adaptive, cutoff is the local box mean minus `c`.
    Mean,
    /// Adaptive, cutoff is the local Gaussian-weighted mean minus `c`.
    Gaussian,
}

impl ThresholdMethod {
    /// Whether the `inverse` flag changes the output of this method.
    pub fn supports_inverse(&self) -> bool {
        matches!(self, Self::Binary | Self::ToZero)
    }

    /// Whether this method uses a fixed (possibly Otsu) cutoff.
    pub fn is_global(&self) -> bool {
        matches!(self, Self::Binary | Self::Truncate | Self::ToZero)
    }

    pub fn is_adaptive(&self) -> bool {
        matches!(self, Self::Mean | Self::Gaussian)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdParams {
    pub method: ThresholdMethod,
    /// Swap foreground and background (Binary and ToZero only).
    pub inverse: bool,
    /// Fixed cutoff for the global methods.
    pub value: f64,
    /// Output value for pixels above the cutoff.
    pub max_value: f64,
    /// Odd neighbourhood side for the adaptive methods, at least 3.
    pub block_size: u32,
    /// Constant subtracted from the local mean.
    pub c: f64,
    /// Replace `value` with Otsu's cutoff (global methods only).
    pub otsu: bool,
}

impl Default for ThresholdParams {
    fn default() -> Self {
        Self {
            method: ThresholdMethod::Binary,
            inverse: false,
            value: 225.0,
            max_value: 255.0,
            block_size: 11,
            c: 2.0,
            otsu: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CannyParams {
    pub enabled: bool,
    /// Lower hysteresis threshold.
    pub threshold1: f32,
    /// Upper hysteresis threshold.
    pub threshold2: f32,
    /// Odd gradient aperture, one of 3, 5 or 7.
    pub aperture_size: u32,
}

impl Default for CannyParams {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold1: 50.0,
            threshold2: 150.0,
            aperture_size: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoughParams {
    pub enabled: bool,
    /// Extract segments instead of infinite lines.
    pub probabilistic: bool,
    /// Distance resolution in pixels.
    pub rho: f64,
    /// Angle resolution in degrees.
    pub theta_degrees: f64,
    /// Minimum accumulator votes for a line.
    pub threshold: u32,
    /// Distance refinement divisor (0 disables multi-scale refinement).
    pub srn: f64,
    /// Angle refinement divisor (0 disables multi-scale refinement).
    pub stn: f64,
    pub min_theta_degrees: f64,
    pub max_theta_degrees: f64,
    /// Shortest segment kept (probabilistic mode only).
    pub min_line_length: f64,
    /// Largest gap bridged inside a segment (probabilistic mode only).
    pub max_line_gap: f64,
}

impl Default for HoughParams {
    fn default() -> Self {
        Self {
            enabled: false,
            probabilistic: false,
            rho: 1.0,
            theta_degrees: 1.0,
            threshold: 100,
            srn: 0.0,
            stn: 0.0,
            min_theta_degrees: 0.0,
            max_theta_degrees: 180.0,
            min_line_length: 50.0,
            max_line_gap: 10.0,
        }
    }
}

impl HoughParams {
    /// Whether `srn`/`stn` request the refined multi-scale variant.
    pub fn multi_scale(&self) -> bool {
        !self.probabilistic && (self.srn > 0.0 || self.stn > 0.0)
    }
}

/// How contour points are compressed before polygon approximation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContourApproximation {
    /// Keep every border pixel.
    None,
    /// Collapse horizontal, vertical and diagonal runs to their end points.
    Simple,
    /// Teh-Chin dominant points, L1 curvature.
    Tc89L1,
    /// Teh-Chin dominant points, k-cosine curvature.
    Tc89Kcos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContourParams {
    pub enabled: bool,
    pub approximation: ContourApproximation,
}

impl Default for ContourParams {
    fn default() -> Self {
        Self {
            enabled: true,
            approximation: ContourApproximation::Simple,
        }
    }
}

/// How detected corners are put into `[tl, tr, br, bl]` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CornerOrdering {
    /// Sort by angle around the centroid. Tolerates rotated frames.
    #[default]
    Angular,
    /// Coordinate sum/difference extremes. Axis-aligned frames only.
    AxisSum,
}

/// Full parameter set for one `detect_quadrat` call.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionParams {
    pub downscale: DownscaleParams,
    pub blur: BlurParams,
    pub threshold: ThresholdParams,
    pub canny: CannyParams,
    pub hough: HoughParams,
    pub contour: ContourParams,
    pub ordering: CornerOrdering,
}

impl DetectionParams {
    /// Check every group for values the pipeline cannot run with.
    ///
    /// Failures are configuration errors: they indicate a programming bug or
    /// a corrupted preset, never a property of the image.
    pub fn validate(&self) -> Result<()> {
        if self.downscale.enabled && self.downscale.max_size == 0 {
            return Err(config_error("downscale max_size must be at least 1"));
        }

        if self.blur.enabled && (self.blur.kernel_size == 0 || self.blur.kernel_size % 2 == 0) {
            return Err(config_error(format!(
                "blur kernel_size must be odd and at least 1, got {}",
                self.blur.kernel_size
            )));
        }

        let t = &self.threshold;
        if t.method.is_global() && !(0.0..=255.0).contains(&t.value) {
            return Err(config_error(format!("threshold value {} outside 0..=255", t.value)));
        }
        if t.method != ThresholdMethod::None && !(0.0..=255.0).contains(&t.max_value) {
            return Err(config_error(format!(
                "threshold max_value {} outside 0..=255",
                t.max_value
            )));
        }
        if t.method.is_adaptive() && (t.block_size < 3 || t.block_size % 2 == 0) {
            return Err(config_error(format!(
                "adaptive block_size must be odd and at least 3, got {}",
                t.block_size
            )));
        }

        let c = &self.canny;
        if c.enabled && !matches!(c.aperture_size, 3 | 5 | 7) {
            return Err(config_error(format!(
                "Canny aperture_size must be 3, 5 or 7, got {}",
                c.aperture_size
            )));
        }
        if c.enabled && (c.threshold1 < 0.0 || c.threshold2 < 0.0) {
            return Err(config_error("Canny thresholds must be non-negative"));
        }

        let h = &self.hough;
        if h.enabled {
            if h.rho <= 0.0 || h.theta_degrees <= 0.0 {
                return Err(config_error("Hough rho and theta must be positive"));
            }
            if h.min_theta_degrees < 0.0
                || h.max_theta_degrees > 180.0
                || h.min_theta_degrees >= h.max_theta_degrees
            {
                return Err(config_error(format!(
                    "Hough theta range [{}, {}] must lie within [0, 180] and be non-empty",
                    h.min_theta_degrees, h.max_theta_degrees
                )));
            }
            if h.srn < 0.0 || h.stn < 0.0 {
                return Err(config_error("Hough srn/stn must be non-negative"));
            }
            if h.probabilistic && (h.min_line_length < 0.0 || h.max_line_gap < 0.0) {
                return Err(config_error(
                    "Hough min_line_length and max_line_gap must be non-negative",
                ));
            }
        }

        Ok(())
    }

    /// Load a parameter preset from a JSON file and validate it.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let params: Self = serde_json::from_str(&data)?;
        params.validate()?;
        debug!("detection parameters loaded");
        Ok(params)
    }

    /// Write the preset as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json)?;
        Ok(())
    }
}

fn config_error(msg: impl Into<String>) -> QuadprepError {
    QuadprepError::Config(msg.into())
}

// -- Tests --------------------------------------------------------------------
