// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for quadprep.

use thiserror::Error;

/// Top-level error type for all quadprep operations.
///
/// An empty detection (no lines, no contour, too few corners) is not an
/// error: it is reported as a detection result without a quad.
#[derive(Debug, Error)]
pub enum QuadprepError {
    // -- Configuration --
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid camera parameters: {0}")]
    InvalidCameraParameters(String),

    #[error("invalid quadrat corners: {0}")]
    InvalidCorners(String),

    // -- Geometry --
    #[error("degenerate geometry: {0}")]
    Geometry(String),

    // -- Image I/O --
    #[error("failed to load image: {0}")]
    ImageLoad(String),

    #[error("failed to save image: {0}")]
    ImageSave(String),

    // -- Storage / persistence --
    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // -- Export worker --
    #[error("export cancelled after {completed} photo(s)")]
    Cancelled { completed: usize },

    #[error("export worker failed: {0}")]
    Worker(String),
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, QuadprepError>;
