//! High-level auto-exposure ROI control.
//!
//! Every mode change is one full command/response round trip on the HID
//! channel; the cached mode only moves after the device confirms SUCCESS,
//! so it always reflects confirmed device state, never a pending request.

use std::str::FromStr;

use thiserror::Error;

use crate::hid::{ControlTransport, HidError};
use crate::protocol::{
    self, map_to_control_range, ProtocolError, MODE_CENTERED, MODE_DISABLED, MODE_MANUAL,
};

/// Default averaging window for centered mode.
pub const DEFAULT_CENTERED_WINDOW: u8 = 8;
/// Default averaging window for manual ROI modes.
pub const DEFAULT_ROI_WINDOW: u8 = 4;

/// Requested auto-exposure behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoExposureMode {
    /// Average over the centered region.
    Centered,
    /// Average around an anchor point, in pixel coordinates. A parsed
    /// "roi" mode with no anchor yet defaults to the frame center when
    /// applied.
    Roi {
        anchor: Option<(i32, i32)>,
        window_size: u8,
    },
    /// Fixed anchor at (width/2, height*3/4).
    LowerCenter { window_size: u8 },
    /// ROI-based auto exposure off.
    Disabled,
}

impl AutoExposureMode {
    /// Configuration name of this mode.
    pub fn name(&self) -> &'static str {
        match self {
            AutoExposureMode::Centered => "centered",
            AutoExposureMode::Roi { .. } => "roi",
            AutoExposureMode::LowerCenter { .. } => "lower_center",
            AutoExposureMode::Disabled => "disabled",
        }
    }

    /// Wire mode code for this mode.
    pub fn code(&self) -> u8 {
        match self {
            AutoExposureMode::Centered => MODE_CENTERED,
            AutoExposureMode::Roi { .. } | AutoExposureMode::LowerCenter { .. } => MODE_MANUAL,
            AutoExposureMode::Disabled => MODE_DISABLED,
        }
    }
}

impl FromStr for AutoExposureMode {
    type Err = ExposureError;

    /// Parse a configuration mode name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "centered" => Ok(AutoExposureMode::Centered),
            "roi" => Ok(AutoExposureMode::Roi {
                anchor: None,
                window_size: DEFAULT_ROI_WINDOW,
            }),
            "lower_center" => Ok(AutoExposureMode::LowerCenter {
                window_size: DEFAULT_ROI_WINDOW,
            }),
            "disabled" => Ok(AutoExposureMode::Disabled),
            other => Err(ExposureError::InvalidMode(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum ExposureError {
    #[error("unknown auto-exposure mode {0:?} (expected centered, roi, lower_center, or disabled)")]
    InvalidMode(String),
    #[error(transparent)]
    Channel(#[from] HidError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Auto-exposure ROI controller for one camera.
///
/// Owns the control transport for its lifetime; operations are
/// synchronous and must not overlap on the same device (the channel is a
/// single-consumer request/response stream).
pub struct AutoExposureController<T: ControlTransport> {
    transport: T,
    frame_width: i32,
    frame_height: i32,
    current_mode: Option<AutoExposureMode>,
}

impl<T: ControlTransport> AutoExposureController<T> {
    /// Create a controller for a sensor of the given dimensions.
    pub fn new(transport: T, frame_width: u32, frame_height: u32) -> Self {
        Self {
            transport,
            frame_width: frame_width as i32,
            frame_height: frame_height as i32,
            current_mode: None,
        }
    }

    /// Last mode confirmed by the device, if any set call has succeeded.
    pub fn current_mode(&self) -> Option<AutoExposureMode> {
        self.current_mode
    }

    /// Enable centered auto exposure.
    pub fn enable_centered(&mut self) -> Result<(), ExposureError> {
        self.set_mode(AutoExposureMode::Centered, None, DEFAULT_CENTERED_WINDOW)
    }

    /// Enable ROI auto exposure anchored at pixel `(x, y)`.
    ///
    /// Coordinates from external sources (mouse, config) are clamped into
    /// the frame before mapping into the control range.
    pub fn enable_roi_at(&mut self, x: i32, y: i32, window_size: u8) -> Result<(), ExposureError> {
        let x = x.clamp(0, self.frame_width - 1);
        let y = y.clamp(0, self.frame_height - 1);
        let mapped = (
            map_to_control_range(x, self.frame_width - 1),
            map_to_control_range(y, self.frame_height - 1),
        );
        self.set_mode(
            AutoExposureMode::Roi {
                anchor: Some((x, y)),
                window_size,
            },
            Some(mapped),
            window_size,
        )
    }

    /// Enable ROI auto exposure with the fixed lower-center anchor.
    ///
    /// The anchor is `(width / 2, height * 3 / 4)` with truncating integer
    /// division, clamped to the valid index range.
    pub fn enable_lower_center(&mut self, window_size: u8) -> Result<(), ExposureError> {
        let x = (self.frame_width / 2).min(self.frame_width - 1);
        let y = (self.frame_height * 3 / 4).min(self.frame_height - 1);
        let mapped = (
            map_to_control_range(x, self.frame_width - 1),
            map_to_control_range(y, self.frame_height - 1),
        );
        self.set_mode(
            AutoExposureMode::LowerCenter { window_size },
            Some(mapped),
            window_size,
        )
    }

    /// Disable ROI-based auto exposure.
    pub fn disable(&mut self) -> Result<(), ExposureError> {
        self.set_mode(AutoExposureMode::Disabled, None, 0)
    }

    /// Apply a parsed mode. ROI mode without an explicit anchor falls
    /// back to the frame center.
    pub fn apply(&mut self, mode: AutoExposureMode) -> Result<(), ExposureError> {
        match mode {
            AutoExposureMode::Centered => self.enable_centered(),
            AutoExposureMode::Roi { anchor, window_size } => {
                let (x, y) =
                    anchor.unwrap_or((self.frame_width / 2, self.frame_height / 2));
                self.enable_roi_at(x, y, window_size)
            }
            AutoExposureMode::LowerCenter { window_size } => {
                self.enable_lower_center(window_size)
            }
            AutoExposureMode::Disabled => self.disable(),
        }
    }

    /// Query the device's current mode code and window size.
    pub fn query(&mut self) -> Result<(u8, u8), ExposureError> {
        self.transport.send(&protocol::encode_get())?;
        let response = self.transport.recv()?;
        let (mode, window) = protocol::decode_get_response(&response)?;
        Ok((mode, window))
    }

    fn set_mode(
        &mut self,
        mode: AutoExposureMode,
        xy: Option<(u8, u8)>,
        window_size: u8,
    ) -> Result<(), ExposureError> {
        let command = protocol::encode_set(mode.code(), xy, window_size);
        self.transport.send(&command)?;
        let response = self.transport.recv()?;
        protocol::decode_set_response(&response)?;

        // Only a confirmed SUCCESS moves the cached mode.
        self.current_mode = Some(mode);
        tracing::info!(mode = mode.name(), window = window_size, "auto-exposure mode set");
        Ok(())
    }
}
