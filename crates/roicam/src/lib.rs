//! roicam — See3CAM CU20 session layer.
//!
//! Ties configuration, V4L2 capture, the latest-frame buffer, fisheye
//! undistortion, and ROI auto-exposure control into one session handle.

pub mod config;
pub mod session;

pub use config::{CameraConfig, ConfigError};
pub use session::{CameraSession, SessionError};
