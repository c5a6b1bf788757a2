// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Export worker.
//
// Photos are processed one at a time: load, undistort when calibration
// exists, rectify when four corners exist, write a JPEG. The cancellation
// flag is only checked between photos, so a photo in flight always
// finishes. `spawn_export` moves the loop onto a blocking thread and streams
// progress over a channel.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use quadprep_core::config::ExportSettings;
use quadprep_core::error::{QuadprepError, Result};
use quadprep_core::types::{Photo, Project};
use quadprep_vision::{correct_perspective, load_image, save_image, undistort_photo};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::report::{ExportEvent, ExportFailure, ExportReport, ExportedPhoto};

/// Where the export of `photo` is written inside `out_dir`.
pub fn output_path(photo: &Photo, settings: &ExportSettings, out_dir: &Path) -> PathBuf {
    let stem = photo
        .path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| photo.id.to_string());
    out_dir.join(format!("{stem}{}.jpg", settings.file_suffix))
}

/// Export a single photo. `source` is the photo's resolved image path.
#[instrument(skip_all, fields(photo = %photo.id))]
pub fn export_photo(
    photo: &Photo,
    source: &Path,
    settings: &ExportSettings,
    out_dir: &Path,
) -> Result<ExportedPhoto> {
    let image = load_image(source)?;
    let corrected = undistort_photo(&image, photo.camera.as_ref())?;

    let quad = photo.corners.quad();
    let output = match &quad {
        Some(corners) => correct_perspective(&corrected, corners, settings.target_width, settings.target_height)?,
        None => {
            warn!("Photo has no complete quadrat; exporting without perspective correction");
            corrected.into_owned()
        }
    };

    let path = output_path(photo, settings, out_dir);
    save_image(&output, &path, settings.jpeg_quality)?;

    Ok(ExportedPhoto {
        id: photo.id,
        source: source.to_path_buf(),
        output: path,
        undistorted: photo.camera.is_some(),
        rectified: quad.is_some(),
    })
}

/// Export every photo of `project`. Relative photo paths and the output
/// directory are resolved against `base_dir`.
///
/// Per-photo failures are recorded in the report and the loop continues.
/// Returns [`QuadprepError::Cancelled`] when `cancel` is raised between
/// photos.
#[instrument(skip_all, fields(photos = project.photos.len()))]
pub fn run_export(
    project: &Project,
    base_dir: &Path,
    cancel: &AtomicBool,
    mut on_event: impl FnMut(ExportEvent),
) -> Result<ExportReport> {
    let settings = &project.export;
    settings.validate()?;
    let out_dir = base_dir.join(&settings.output_dir);
    std::fs::create_dir_all(&out_dir)?;

    let total = project.photos.len();
    let mut report = ExportReport::new(Utc::now());
    on_event(ExportEvent::Started { total });
    info!(total, out_dir = %out_dir.display(), "Export started");

    for (index, photo) in project.photos.iter().enumerate() {
        if cancel.load(Ordering::SeqCst) {
            let completed = report.exported.len();
            warn!(completed, "Export cancelled");
            on_event(ExportEvent::Cancelled { completed });
            return Err(QuadprepError::Cancelled { completed });
        }

        on_event(ExportEvent::PhotoStarted {
            index,
            total,
            id: photo.id,
        });
        let source = base_dir.join(&photo.path);
        match export_photo(photo, &source, settings, &out_dir) {
            Ok(exported) => {
                on_event(ExportEvent::PhotoExported {
                    index,
                    total,
                    output: exported.output.clone(),
                });
                report.exported.push(exported);
            }
            Err(err) => {
                error!(photo = %photo.id, error = %err, "Photo export failed");
                on_event(ExportEvent::PhotoFailed {
                    index,
                    total,
                    error: err.to_string(),
                });
                report.failed.push(ExportFailure {
                    id: photo.id,
                    source,
                    error: err.to_string(),
                });
            }
        }
    }

    report.finished_at = Utc::now();
    info!(
        exported = report.exported.len(),
        failed = report.failed.len(),
        "Export finished"
    );
    on_event(ExportEvent::Finished {
        exported: report.exported.len(),
        failed: report.failed.len(),
    });
    Ok(report)
}

/// A running export.
pub struct ExportHandle {
    cancel: Arc<AtomicBool>,
    events: mpsc::UnboundedReceiver<ExportEvent>,
    task: JoinHandle<Result<ExportReport>>,
}

impl ExportHandle {
    /// Ask the worker to stop before the next photo.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::SeqCst);
    }

    /// Next progress event; `None` once the worker has finished.
    pub async fn next_event(&mut self) -> Option<ExportEvent> {
        self.events.recv().await
    }

    /// Wait for the worker and return its report.
    pub async fn join(self) -> Result<ExportReport> {
        self.task
            .await
            .map_err(|err| QuadprepError::Worker(err.to_string()))?
    }
}

/// Run [`run_export`] on the blocking thread pool. Must be called from
/// within a tokio runtime.
pub fn spawn_export(project: Project, base_dir: PathBuf) -> ExportHandle {
    let cancel = Arc::new(AtomicBool::new(false));
    let (tx, events) = mpsc::unbounded_channel();

    let flag = Arc::clone(&cancel);
    let task = tokio::task::spawn_blocking(move || {
        run_export(&project, &base_dir, &flag, |event| {
            // The receiver may already be gone; the report is still returned.
            let _ = tx.send(event);
        })
    });

    ExportHandle {
        cancel,
        events,
        task,
    }
}
