//! See3CAM CU20 HID control protocol — frame layout, op-codes, codec.
//!
//! The camera's onboard controller speaks a fixed 65-byte command/response
//! protocol over its hidraw node, separate from the video streaming path.
//! Byte 0 of an outbound frame is the HID report id (always 0); the kernel
//! strips it from inbound reads, so response fields sit one byte earlier
//! than their command counterparts.
//!
//! Command layout:  [1]=class id, [2]=op-code, [3]=mode, [4]=x, [5]=y,
//! [6]=window size, remainder zero.
//! Response layout: [0]=class id, [1]=op-code, [2]=mode (get), [5]=window
//! (get), [6]=status.

use thiserror::Error;

/// Total length of every command and response frame, report id included.
pub const FRAME_LEN: usize = 65;

/// Device-class id identifying the CU20 control endpoint.
pub const CAMERA_CONTROL_ID: u8 = 0x86;

/// Op-code: query the current auto-exposure ROI mode.
pub const OP_GET_AE_ROI: u8 = 0x05;
/// Op-code: set the auto-exposure ROI mode.
pub const OP_SET_AE_ROI: u8 = 0x06;

/// Mode code: average over the full centered region.
pub const MODE_CENTERED: u8 = 0x01;
/// Mode code: average around a caller-supplied anchor point.
pub const MODE_MANUAL: u8 = 0x02;
/// Mode code: ROI-based auto exposure off.
pub const MODE_DISABLED: u8 = 0x03;

/// Response status byte values.
pub const STATUS_SUCCESS: u8 = 0x01;
pub const STATUS_FAIL: u8 = 0x00;

/// A raw 65-byte control frame.
pub type ControlFrame = [u8; FRAME_LEN];

/// A response frame's field did not match what the request expected.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("wrong device class: expected {expected:#04x}, got {actual:#04x}")]
    DeviceClass { expected: u8, actual: u8 },
    #[error("wrong op-code: expected {expected:#04x}, got {actual:#04x}")]
    OpCode { expected: u8, actual: u8 },
    #[error("device reported failure (status {status:#04x})")]
    Failed { status: u8 },
}

/// Build a set-mode command frame.
///
/// `xy` carries the protocol-range anchor coordinates for manual mode;
/// centered/disabled commands send none.
pub fn encode_set(mode_code: u8, xy: Option<(u8, u8)>, window_size: u8) -> ControlFrame {
    let mut frame: ControlFrame = [0; FRAME_LEN];
    frame[1] = CAMERA_CONTROL_ID;
    frame[2] = OP_SET_AE_ROI;
    frame[3] = mode_code;
    if let Some((x, y)) = xy {
        frame[4] = x;
        frame[5] = y;
    }
    frame[6] = window_size;
    frame
}

/// Build a get-mode command frame.
pub fn encode_get() -> ControlFrame {
    let mut frame: ControlFrame = [0; FRAME_LEN];
    frame[1] = CAMERA_CONTROL_ID;
    frame[2] = OP_GET_AE_ROI;
    frame
}

/// Validate a response's class id, op-code, and status byte.
fn check_response(frame: &ControlFrame, expected_op: u8) -> Result<(), ProtocolError> {
    if frame[0] != CAMERA_CONTROL_ID {
        return Err(ProtocolError::DeviceClass {
            expected: CAMERA_CONTROL_ID,
            actual: frame[0],
        });
    }
    if frame[1] != expected_op {
        return Err(ProtocolError::OpCode {
            expected: expected_op,
            actual: frame[1],
        });
    }
    if frame[6] != STATUS_SUCCESS {
        return Err(ProtocolError::Failed { status: frame[6] });
    }
    Ok(())
}

/// Decode the response to a set-mode command.
pub fn decode_set_response(frame: &ControlFrame) -> Result<(), ProtocolError> {
    check_response(frame, OP_SET_AE_ROI)
}

/// Decode the response to a get-mode command into `(mode_code, window_size)`.
pub fn decode_get_response(frame: &ControlFrame) -> Result<(u8, u8), ProtocolError> {
    check_response(frame, OP_GET_AE_ROI)?;
    Ok((frame[2], frame[5]))
}

/// Linearly scale a pixel coordinate from `[0, axis_max]` into the
/// protocol's 0–255 control range, truncating toward zero.
///
/// Callers must clamp externally-derived coordinates into range first;
/// out-of-range input is a contract violation, not a recoverable error.
pub fn map_to_control_range(coord: i32, axis_max: i32) -> u8 {
    debug_assert!(axis_max > 0, "axis_max must be positive");
    debug_assert!(
        (0..=axis_max).contains(&coord),
        "coordinate {coord} outside [0, {axis_max}]"
    );
    (coord as i64 * 255 / axis_max as i64) as u8
}
