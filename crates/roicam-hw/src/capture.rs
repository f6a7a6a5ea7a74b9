//! V4L2 frame capture via the `v4l` crate.

use std::path::Path;
use std::time::SystemTime;

use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::capture::parameters::Parameters;
use v4l::video::Capture;
use v4l::FourCC;

use crate::frame::{self, Frame};

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("property {prop} did not confirm: requested {requested}, device reports {actual}")]
    PropertyMismatch {
        prop: &'static str,
        requested: u32,
        actual: u32,
    },
    #[error("capture failed: {0}")]
    CaptureFailed(String),
}

/// Source of captured frames. [`V4lCapture`] is the hardware
/// implementation; tests substitute canned frames.
pub trait CaptureSource {
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;
}

/// Negotiated pixel format for the camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel, extract Y channel).
    Yuyv,
    /// 8-bit grayscale (1 byte/pixel).
    Grey,
}

/// V4L2 video capture handle with confirmed width/height/fps.
pub struct V4lCapture {
    device: Device,
    width: u32,
    height: u32,
    pixel_format: PixelFormat,
}

impl V4lCapture {
    /// Open a V4L2 device and negotiate the requested geometry and rate.
    ///
    /// Each of width, height, and fps must read back from the driver
    /// exactly as requested; a silent driver substitution would desync
    /// the ROI coordinate mapping, so any mismatch is fatal.
    pub fn open(device_path: &str, width: u32, height: u32, fps: u32) -> Result<Self, CaptureError> {
        if !Path::new(device_path).exists() {
            return Err(CaptureError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CaptureError::DeviceBusy
            } else {
                CaptureError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CaptureError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened camera"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CaptureError::StreamingNotSupported);
        }

        let mut fmt = device.format().map_err(|e| {
            CaptureError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = width;
        fmt.height = height;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CaptureError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let pixel_format = if negotiated.fourcc == FourCC::new(b"YUYV") {
            PixelFormat::Yuyv
        } else if negotiated.fourcc == FourCC::new(b"GREY") {
            PixelFormat::Grey
        } else {
            return Err(CaptureError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {:?} (need YUYV or GREY)",
                negotiated.fourcc
            )));
        };

        if negotiated.width != width {
            return Err(CaptureError::PropertyMismatch {
                prop: "width",
                requested: width,
                actual: negotiated.width,
            });
        }
        if negotiated.height != height {
            return Err(CaptureError::PropertyMismatch {
                prop: "height",
                requested: height,
                actual: negotiated.height,
            });
        }

        device
            .set_params(&Parameters::with_fps(fps))
            .map_err(|e| CaptureError::FormatNegotiationFailed(format!("failed to set fps: {e}")))?;
        let params = device.params().map_err(|e| {
            CaptureError::FormatNegotiationFailed(format!("failed to read fps back: {e}"))
        })?;
        let actual_fps = if params.interval.numerator > 0 {
            params.interval.denominator / params.interval.numerator
        } else {
            0
        };
        if actual_fps != fps {
            return Err(CaptureError::PropertyMismatch {
                prop: "fps",
                requested: fps,
                actual: actual_fps,
            });
        }

        tracing::info!(width, height, fps, fourcc = ?negotiated.fourcc, "negotiated format");

        Ok(Self {
            device,
            width,
            height,
            pixel_format,
        })
    }

    /// Convert a raw buffer to grayscale based on the negotiated format.
    fn buf_to_grayscale(&self, buf: &[u8]) -> Result<Vec<u8>, CaptureError> {
        let pixels = (self.width * self.height) as usize;

        match self.pixel_format {
            PixelFormat::Grey => {
                if buf.len() < pixels {
                    return Err(CaptureError::CaptureFailed(format!(
                        "GREY buffer too short: expected {pixels}, got {}",
                        buf.len()
                    )));
                }
                Ok(buf[..pixels].to_vec())
            }
            PixelFormat::Yuyv => frame::yuyv_to_grayscale(buf, self.width, self.height)
                .map_err(|e| CaptureError::CaptureFailed(format!("YUYV conversion failed: {e}"))),
        }
    }
}

impl CaptureSource for V4lCapture {
    /// Dequeue one frame, converting to grayscale.
    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        let mut stream =
            MmapStream::with_buffers(&self.device, BufType::VideoCapture, 4).map_err(|e| {
                CaptureError::CaptureFailed(format!("failed to create mmap stream: {e}"))
            })?;

        let (buf, _meta) = stream
            .next()
            .map_err(|e| CaptureError::CaptureFailed(format!("failed to dequeue buffer: {e}")))?;

        let gray = self.buf_to_grayscale(buf)?;

        Ok(Frame {
            data: gray,
            width: self.width,
            height: self.height,
            captured_at: SystemTime::now(),
        })
    }
}
