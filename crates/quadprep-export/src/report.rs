// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Progress events and the final export report.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use quadprep_core::types::PhotoId;
use serde::Serialize;

/// Progress reported by the export worker, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExportEvent {
    Started { total: usize },
    PhotoStarted { index: usize, total: usize, id: PhotoId },
    PhotoExported { index: usize, total: usize, output: PathBuf },
    PhotoFailed { index: usize, total: usize, error: String },
    Cancelled { completed: usize },
    Finished { exported: usize, failed: usize },
}

/// One successfully written photo.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportedPhoto {
    pub id: PhotoId,
    pub source: PathBuf,
    pub output: PathBuf,
    /// Lens correction was applied.
    pub undistorted: bool,
    /// Perspective correction was applied.
    pub rectified: bool,
}

/// A photo that could not be exported.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportFailure {
    pub id: PhotoId,
    pub source: PathBuf,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExportReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub exported: Vec<ExportedPhoto>,
    pub failed: Vec<ExportFailure>,
}

impl ExportReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            finished_at: started_at,
            exported: Vec::new(),
            failed: Vec::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}
