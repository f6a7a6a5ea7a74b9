//! roicam-core — Fisheye calibration model and undistortion remap.

pub mod calibration;
pub mod undistort;

pub use calibration::{CalibrationError, CalibrationParams};
pub use undistort::UndistortionMap;
