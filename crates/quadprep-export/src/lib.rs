// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// quadprep-export: writes lens- and perspective-corrected copies of every
// photo in a project.

pub mod report;
pub mod worker;

pub use report::{ExportEvent, ExportFailure, ExportReport, ExportedPhoto};
pub use worker::{ExportHandle, export_photo, output_path, run_export, spawn_export};
