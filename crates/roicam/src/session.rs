//! Camera session: capture, latest-frame buffer, undistortion, and
//! auto-exposure control behind one handle.
//!
//! One thread drives [`update`](CameraSession::update); any number of
//! readers may take [`image`](CameraSession::image) /
//! [`remap_image`](CameraSession::remap_image) snapshots concurrently.
//! Control operations are synchronous round trips and must not overlap.

use thiserror::Error;

use roicam_core::UndistortionMap;
use roicam_hw::capture::CaptureSource;
use roicam_hw::hid::ControlTransport;
use roicam_hw::{
    discover, AutoExposureController, CaptureError, ExposureError, Frame, FrameBuffer, HidChannel,
    HidError, V4lCapture,
};

use crate::config::{CameraConfig, ConfigError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Discover(#[from] discover::DiscoverError),
    #[error(transparent)]
    Channel(#[from] HidError),
    #[error(transparent)]
    Exposure(#[from] ExposureError),
}

/// An opened camera: capture source, frame buffer, undistortion map, and
/// exposure controller, all living for the session's lifetime.
pub struct CameraSession<C: CaptureSource, T: ControlTransport> {
    capture: C,
    buffer: FrameBuffer,
    map: UndistortionMap,
    controller: AutoExposureController<T>,
}

impl CameraSession<V4lCapture, HidChannel> {
    /// Open capture and control channels per the configuration, build the
    /// undistortion map, and apply the configured startup exposure mode.
    ///
    /// Any failure here is fatal: a session either comes up with every
    /// resource confirmed or not at all.
    pub fn open(config: &CameraConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let initial_mode = config.initial_mode()?;

        let capture = V4lCapture::open(&config.device_id, config.width, config.height, config.fps)?;

        let hidraw = discover::hidraw_for_video_device(&config.device_id)?;
        let channel = HidChannel::open(&hidraw)?;
        let mut controller = AutoExposureController::new(channel, config.width, config.height);
        controller.apply(initial_mode)?;

        let map = UndistortionMap::build(&config.calibration, config.width, config.height);

        tracing::info!(
            device = %config.device_id,
            mode = initial_mode.name(),
            "camera session started"
        );

        Ok(Self {
            capture,
            buffer: FrameBuffer::new(),
            map,
            controller,
        })
    }
}

impl<C: CaptureSource, T: ControlTransport> CameraSession<C, T> {
    /// Assemble a session from pre-built parts.
    pub fn from_parts(
        capture: C,
        map: UndistortionMap,
        controller: AutoExposureController<T>,
    ) -> Self {
        Self {
            capture,
            buffer: FrameBuffer::new(),
            map,
            controller,
        }
    }

    /// Pull one frame from the capture source into the buffer.
    ///
    /// Returns false on capture failure, leaving the previous snapshot
    /// untouched; callers detect staleness via the unchanged timestamp.
    pub fn update(&mut self) -> bool {
        match self.capture.read_frame() {
            Ok(frame) => {
                self.buffer.put(frame);
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "frame capture failed, keeping previous snapshot");
                false
            }
        }
    }

    /// Latest captured frame, if any.
    pub fn image(&self) -> Option<Frame> {
        self.buffer.snapshot()
    }

    /// Latest captured frame with fisheye undistortion applied.
    ///
    /// The remap runs fresh on every call; only the lookup tables are
    /// precomputed.
    pub fn remap_image(&self) -> Option<Frame> {
        self.buffer.snapshot().map(|frame| Frame {
            data: self.map.remap(&frame.data),
            ..frame
        })
    }

    /// Switch auto-exposure to a named mode ("centered", "roi",
    /// "lower_center", "disabled"). Unknown names are rejected before any
    /// device I/O.
    pub fn set_auto_exposure_mode(&mut self, name: &str) -> Result<(), SessionError> {
        let mode: roicam_hw::AutoExposureMode = name.parse()?;
        self.controller.apply(mode)?;
        Ok(())
    }

    /// Anchor ROI auto exposure at pixel `(x, y)` with the given window.
    pub fn set_roi_properties(&mut self, x: i32, y: i32, window_size: u8) -> Result<(), SessionError> {
        self.controller.enable_roi_at(x, y, window_size)?;
        Ok(())
    }

    /// Query the device's current `(mode_code, window_size)`.
    pub fn auto_exposure_setting(&mut self) -> Result<(u8, u8), SessionError> {
        Ok(self.controller.query()?)
    }

    /// Name of the last mode the device confirmed, if any.
    pub fn auto_exposure_mode(&self) -> Option<&'static str> {
        self.controller.current_mode().map(|m| m.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roicam_core::CalibrationParams;
    use roicam_hw::protocol::{
        ControlFrame, CAMERA_CONTROL_ID, FRAME_LEN, OP_SET_AE_ROI, STATUS_SUCCESS,
    };
    use std::time::SystemTime;

    struct CannedCapture {
        frames: Vec<Result<Frame, CaptureError>>,
    }

    impl CaptureSource for CannedCapture {
        fn read_frame(&mut self) -> Result<Frame, CaptureError> {
            if self.frames.is_empty() {
                Err(CaptureError::CaptureFailed("end of stream".into()))
            } else {
                self.frames.remove(0)
            }
        }
    }

    struct AlwaysOkTransport {
        sent: std::rc::Rc<std::cell::Cell<usize>>,
    }

    impl ControlTransport for AlwaysOkTransport {
        fn send(&mut self, _frame: &ControlFrame) -> Result<(), HidError> {
            self.sent.set(self.sent.get() + 1);
            Ok(())
        }

        fn recv(&mut self) -> Result<ControlFrame, HidError> {
            let mut frame: ControlFrame = [0; FRAME_LEN];
            frame[0] = CAMERA_CONTROL_ID;
            frame[1] = OP_SET_AE_ROI;
            frame[6] = STATUS_SUCCESS;
            Ok(frame)
        }
    }

    fn test_frame(value: u8, at_secs: u64) -> Frame {
        Frame {
            data: vec![value; 8 * 6],
            width: 8,
            height: 6,
            captured_at: SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(at_secs),
        }
    }

    fn test_session(
        frames: Vec<Result<Frame, CaptureError>>,
    ) -> (
        CameraSession<CannedCapture, AlwaysOkTransport>,
        std::rc::Rc<std::cell::Cell<usize>>,
    ) {
        let sent = std::rc::Rc::new(std::cell::Cell::new(0));
        let params = CalibrationParams {
            fx: 10.0,
            fy: 10.0,
            cx: 4.0,
            cy: 3.0,
            k1: 0.01,
            k2: 0.0,
            k3: 0.0,
            k4: 0.0,
            k5: None,
            k6: None,
        };
        let session = CameraSession::from_parts(
            CannedCapture { frames },
            UndistortionMap::build(&params, 8, 6),
            AutoExposureController::new(
                AlwaysOkTransport {
                    sent: std::rc::Rc::clone(&sent),
                },
                8,
                6,
            ),
        );
        (session, sent)
    }

    #[test]
    fn test_update_stores_frame() {
        let (mut session, _) = test_session(vec![Ok(test_frame(9, 100))]);
        assert!(session.image().is_none());
        assert!(session.update());

        let snap = session.image().unwrap();
        assert_eq!(snap.data[0], 9);
    }

    #[test]
    fn test_failed_update_keeps_previous_snapshot() {
        let (mut session, _) = test_session(vec![
            Ok(test_frame(1, 100)),
            Err(CaptureError::CaptureFailed("gone".into())),
        ]);
        assert!(session.update());
        let before = session.image().unwrap();

        assert!(!session.update());
        let after = session.image().unwrap();
        assert_eq!(after.data, before.data);
        assert_eq!(after.captured_at, before.captured_at);
    }

    #[test]
    fn test_remap_image_preserves_dims_and_timestamp() {
        let (mut session, _) = test_session(vec![Ok(test_frame(200, 42))]);
        session.update();

        let remapped = session.remap_image().unwrap();
        assert_eq!(remapped.width, 8);
        assert_eq!(remapped.height, 6);
        assert_eq!(remapped.data.len(), 8 * 6);
        assert_eq!(
            remapped.captured_at,
            SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(42)
        );
    }

    #[test]
    fn test_set_mode_by_name_and_report() {
        let (mut session, _) = test_session(vec![]);
        assert_eq!(session.auto_exposure_mode(), None);

        session.set_auto_exposure_mode("lower_center").unwrap();
        assert_eq!(session.auto_exposure_mode(), Some("lower_center"));

        session.set_roi_properties(3, 2, 4).unwrap();
        assert_eq!(session.auto_exposure_mode(), Some("roi"));
    }

    #[test]
    fn test_unknown_mode_rejected_without_io() {
        let (mut session, sent) = test_session(vec![]);
        let err = session.set_auto_exposure_mode("spot").unwrap_err();
        assert!(matches!(
            err,
            SessionError::Exposure(ExposureError::InvalidMode(_))
        ));
        // Rejected before any frame hit the transport.
        assert_eq!(sent.get(), 0);
    }
}
