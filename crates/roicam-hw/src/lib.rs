//! roicam-hw — Hardware abstraction for the See3CAM CU20.
//!
//! Provides V4L2-based frame capture, the hidraw control channel with
//! its 65-byte vendor command protocol, and ROI auto-exposure control.

pub mod capture;
pub mod discover;
pub mod exposure;
pub mod frame;
pub mod hid;
pub mod protocol;

pub use capture::{CaptureError, CaptureSource, V4lCapture};
pub use exposure::{AutoExposureController, AutoExposureMode, ExposureError};
pub use frame::{Frame, FrameBuffer};
pub use hid::{ControlTransport, HidChannel, HidError};
