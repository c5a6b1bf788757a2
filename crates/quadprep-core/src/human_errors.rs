// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for the photo preparation UI.
//
// Every pipeline error is mapped to plain English with a clear suggestion
// before it crosses into the interface layer.

use crate::error::QuadprepError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Disk or worker hiccup; trying again may succeed.
    Transient,
    /// The user must change something (move corners, pick another file).
    ActionRequired,
    /// Broken settings or corrupted project data; retrying will not help.
    Permanent,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary (shown as a heading).
    pub message: String,
    /// What the user should try (shown as body text).
    pub suggestion: String,
    /// Whether retrying the same operation can succeed.
    pub retriable: bool,
    /// Severity level (drives icon/colour in UI).
    pub severity: Severity,
}

/// Convert a `QuadprepError` into a `HumanError` for display.
pub fn humanize_error(err: &QuadprepError) -> HumanError {
    match err {
        // -- Configuration --
        QuadprepError::Config(detail) => HumanError {
            message: "The detection settings are not valid.".into(),
            suggestion: format!("Reset the settings to their defaults, then adjust them again. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        QuadprepError::InvalidCameraParameters(detail) => HumanError {
            message: "The lens calibration for this photo is damaged.".into(),
            suggestion: format!("Remove the camera parameters from the photo or import them again. ({detail})"),
            retriable: false,
            severity: Severity::Permanent,
        },

        QuadprepError::InvalidCorners(detail) => HumanError {
            message: "The quadrat corners could not be changed.".into(),
            suggestion: format!("A quadrat has at most four corners. Remove one before adding another. ({detail})"),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        // -- Geometry --
        QuadprepError::Geometry(_) => HumanError {
            message: "The quadrat corners don't form a usable frame.".into(),
            suggestion: "Three of the corners lie on one line. Move the corners onto the four corners of the frame and try again.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        // -- Image I/O --
        QuadprepError::ImageLoad(_) => HumanError {
            message: "This photo couldn't be opened.".into(),
            suggestion: "The file may be missing, damaged, or in an unusual format. Try saving it as a JPEG or PNG first.".into(),
            retriable: false,
            severity: Severity::ActionRequired,
        },

        QuadprepError::ImageSave(_) => HumanError {
            message: "The corrected photo couldn't be saved.".into(),
            suggestion: "Check that the export folder exists and that there is enough free disk space.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        // -- Storage / persistence --
        QuadprepError::Io(_) => HumanError {
            message: "A file couldn't be read or written.".into(),
            suggestion: "Check that the file still exists and that you have permission to use it.".into(),
            retriable: true,
            severity: Severity::Transient,
        },

        QuadprepError::Serialization(_) => HumanError {
            message: "The project file is damaged.".into(),
            suggestion: "Open a backup copy of the project, or create a new project and add the photos again.".into(),
            retriable: false,
            severity: Severity::Permanent,
        },

        // -- Export worker --
        QuadprepError::Cancelled { completed } => HumanError {
            message: "Export was cancelled.".into(),
            suggestion: format!("{completed} photo(s) were exported before stopping. Start the export again to finish the rest."),
            retriable: true,
            severity: Severity::ActionRequired,
        },

        QuadprepError::Worker(_) => HumanError {
            message: "The export stopped unexpectedly.".into(),
            suggestion: "Start the export again. Photos that were already exported will be written again.".into(),
            retriable: true,
            severity: Severity::Transient,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_errors_are_permanent() {
        let human = humanize_error(&QuadprepError::Config("blur kernel_size 4".into()));
        assert_eq!(human.severity, Severity::Permanent);
        assert!(!human.retriable);
        assert!(human.suggestion.contains("blur kernel_size 4"));
    }

    #[test]
    fn degenerate_corners_need_user_action() {
        let human = humanize_error(&QuadprepError::Geometry("collinear".into()));
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(!human.retriable);
    }

    #[test]
    fn load_failure_is_distinct_from_geometry() {
        let load = humanize_error(&QuadprepError::ImageLoad("missing".into()));
        let geometry = humanize_error(&QuadprepError::Geometry("collinear".into()));
        assert_ne!(load.message, geometry.message);
    }

    #[test]
    fn cancelled_export_reports_progress() {
        let human = humanize_error(&QuadprepError::Cancelled { completed: 3 });
        assert!(human.suggestion.starts_with("3 photo(s)"));
        assert!(human.retriable);
    }
}
