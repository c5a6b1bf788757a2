// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// quadprep: Core types, geometry primitives, detection parameters and error
// definitions shared across all crates.

pub mod config;
pub mod error;
pub mod geometry;
pub mod human_errors;
pub mod params;
pub mod types;

pub use config::{AppConfig, ExportSettings};
pub use error::{QuadprepError, Result};
pub use geometry::{Line, Mat3, Point};
pub use params::DetectionParams;
pub use types::*;
