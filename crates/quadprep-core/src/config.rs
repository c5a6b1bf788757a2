// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Application configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{QuadprepError, Result};
use crate::params::DetectionParams;

/// File name of the configuration stored next to a project.
pub const CONFIG_FILE_NAME: &str = "quadprep.json";

/// How rectified photos are written out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    /// Width of the rectified quadrat in pixels.
    pub target_width: u32,
    /// Height of the rectified quadrat in pixels.
    pub target_height: u32,
    /// Directory receiving the exported images.
    pub output_dir: PathBuf,
    /// JPEG quality (1-100) for `.jpg`/`.jpeg` outputs.
    pub jpeg_quality: u8,
    /// Appended to the source file stem, e.g. `IMG_0001_quadrat.jpg`.
    pub file_suffix: String,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            target_width: 1000,
            target_height: 1000,
            output_dir: PathBuf::from("export"),
            jpeg_quality: 92,
            file_suffix: "_quadrat".into(),
        }
    }
}

impl ExportSettings {
    pub fn validate(&self) -> Result<()> {
        if self.target_width == 0 || self.target_height == 0 {
            return Err(QuadprepError::Config(format!(
                "export target size must be at least 1x1, got {}x{}",
                self.target_width, self.target_height
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(QuadprepError::Config(format!(
                "JPEG quality must be 1-100, got {}",
                self.jpeg_quality
            )));
        }
        Ok(())
    }
}

/// Persistent application settings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Parameters used when detecting a quadrat.
    pub detection: DetectionParams,
    /// Export defaults for new projects.
    pub export: ExportSettings,
}

impl AppConfig {
    /// Load the configuration from `dir`, falling back to defaults when the
    /// file is missing or unreadable.
    pub fn load_or_default(dir: impl AsRef<Path>) -> Self {
        let path = dir.as_ref().join(CONFIG_FILE_NAME);
        match Self::load(&path) {
            Ok(config) => config,
            Err(QuadprepError::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
                Self::default()
            }
            Err(err) => {
                warn!(error = %err, path = %path.display(), "ignoring unreadable config");
                Self::default()
            }
        }
    }

    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&data)?;
        config.detection.validate()?;
        config.export.validate()?;
        Ok(config)
    }

    /// Write the configuration into `dir`.
    pub fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        std::fs::create_dir_all(dir.as_ref())?;
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(dir.as_ref().join(CONFIG_FILE_NAME), json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_config_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert_eq!(AppConfig::load_or_default(dir.path()), AppConfig::default());
    }

    #[test]
    fn config_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = AppConfig::default();
        config.export.target_width = 2048;
        config.detection.hough.enabled = true;
        config.save(dir.path()).expect("save");
        assert_eq!(AppConfig::load_or_default(dir.path()), config);
    }

    #[test]
    fn zero_target_size_is_invalid() {
        let settings = ExportSettings {
            target_height: 0,
            ..ExportSettings::default()
        };
        assert!(matches!(settings.validate(), Err(QuadprepError::Config(_))));
    }
}
