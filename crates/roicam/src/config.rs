//! Camera configuration loaded from TOML.
//!
//! The file carries one `[Rgb]` table with the capture device, frame
//! geometry, fisheye calibration, and the startup auto-exposure mode.
//! All validation happens here, before any device is touched.

use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

use roicam_core::{CalibrationError, CalibrationParams};
use roicam_hw::exposure::DEFAULT_ROI_WINDOW;
use roicam_hw::AutoExposureMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("{name} must be positive, got {value}")]
    InvalidDimension { name: &'static str, value: i64 },
    #[error("window size must be positive")]
    InvalidWindowSize,
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
    #[error("unknown auto-exposure mode {0:?}")]
    InvalidMode(String),
}

fn default_mode() -> String {
    "centered".to_string()
}

fn default_window() -> u8 {
    DEFAULT_ROI_WINDOW
}

/// Validated camera configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    /// V4L2 device node, e.g. `/dev/video2`.
    pub device_id: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    #[serde(flatten)]
    pub calibration: CalibrationParams,
    /// Startup auto-exposure mode name (default "centered").
    #[serde(default = "default_mode")]
    pub auto_exposure: String,
    /// ROI averaging window size (default 4).
    #[serde(default = "default_window")]
    pub roi_window_size: u8,
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(alias = "Rgb")]
    rgb: CameraConfig,
}

impl CameraConfig {
    /// Load and validate a configuration file.
    pub fn from_toml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let file: ConfigFile = toml::from_str(&text)?;
        let config = file.rgb;
        config.validate()?;
        Ok(config)
    }

    /// Check dimensions, calibration, and the mode name.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("width", self.width),
            ("height", self.height),
            ("fps", self.fps),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidDimension {
                    name,
                    value: value as i64,
                });
            }
        }
        if self.roi_window_size == 0 {
            return Err(ConfigError::InvalidWindowSize);
        }
        self.calibration.validate()?;
        self.initial_mode()?;
        Ok(())
    }

    /// The startup mode this configuration requests, with the configured
    /// window size applied. Rejected here, before any device I/O.
    pub fn initial_mode(&self) -> Result<AutoExposureMode, ConfigError> {
        let mode = AutoExposureMode::from_str(&self.auto_exposure)
            .map_err(|_| ConfigError::InvalidMode(self.auto_exposure.clone()))?;
        Ok(match mode {
            AutoExposureMode::Roi { anchor, .. } => AutoExposureMode::Roi {
                anchor,
                window_size: self.roi_window_size,
            },
            AutoExposureMode::LowerCenter { .. } => AutoExposureMode::LowerCenter {
                window_size: self.roi_window_size,
            },
            other => other,
        })
    }
}
