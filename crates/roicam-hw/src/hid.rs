//! Raw hidraw control channel for the camera's onboard controller.
//!
//! The CU20 exposes its vendor control protocol on a hidraw node next to
//! the video device. Writes get a bounded retry on transient pipe/busy
//! errors (the device NAKs while its controller is mid-command); reads
//! wait on `poll(2)` with a fixed timeout for the matching response.

use std::fs::File;
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::thread::sleep;
use std::time::Duration;

use thiserror::Error;

use crate::protocol::{ControlFrame, FRAME_LEN};

/// Maximum write attempts per frame.
const WRITE_ATTEMPTS: u32 = 3;
/// Backoff between transient-failure write attempts.
const WRITE_BACKOFF: Duration = Duration::from_millis(100);
/// How long to wait for the device's response frame.
const READ_TIMEOUT: Duration = Duration::from_millis(2000);

#[derive(Debug, Error)]
pub enum HidError {
    #[error("failed to open {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },
    #[error("short write: wrote {actual} bytes of expected {expected}")]
    ShortWrite { expected: usize, actual: usize },
    #[error("short read: got {actual} bytes of expected {expected}")]
    ShortRead { expected: usize, actual: usize },
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("exceptional condition on control channel")]
    Exceptional,
    #[error("control channel I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Request/response seam over the control channel.
///
/// [`HidChannel`] is the hardware implementation; tests substitute a
/// scripted transport.
pub trait ControlTransport {
    fn send(&mut self, frame: &ControlFrame) -> Result<(), HidError>;
    fn recv(&mut self) -> Result<ControlFrame, HidError>;
}

/// An opened hidraw control channel. The node is held open for the
/// channel's lifetime and released on drop.
pub struct HidChannel {
    file: File,
    path: String,
}

impl HidChannel {
    /// Open a hidraw node (e.g. `/dev/hidraw3`) for command/response use.
    pub fn open(path: &str) -> Result<Self, HidError> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| HidError::Open {
                path: path.to_string(),
                source,
            })?;

        tracing::debug!(device = %path, "opened HID control channel");

        Ok(Self {
            file,
            path: path.to_string(),
        })
    }

    /// Path of the underlying hidraw node.
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl ControlTransport for HidChannel {
    fn send(&mut self, frame: &ControlFrame) -> Result<(), HidError> {
        write_frame(&mut self.file, frame)
    }

    fn recv(&mut self) -> Result<ControlFrame, HidError> {
        let fd = self.file.as_raw_fd();
        let mut pollfd = libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        };

        // SAFETY: pollfd points at one valid, initialized struct for the
        // duration of the call.
        let ret = unsafe { libc::poll(&mut pollfd, 1, READ_TIMEOUT.as_millis() as libc::c_int) };
        if ret < 0 {
            return Err(HidError::Io(std::io::Error::last_os_error()));
        }
        if ret == 0 {
            return Err(HidError::Timeout(READ_TIMEOUT));
        }
        if pollfd.revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            return Err(HidError::Exceptional);
        }

        let mut frame: ControlFrame = [0; FRAME_LEN];
        let n = self.file.read(&mut frame)?;
        if n != FRAME_LEN {
            return Err(HidError::ShortRead {
                expected: FRAME_LEN,
                actual: n,
            });
        }
        Ok(frame)
    }
}

/// Write one control frame with bounded retry on transient failure.
///
/// Generic over `io::Write` so the retry behavior is testable without a
/// device node.
fn write_frame<W: Write>(writer: &mut W, frame: &ControlFrame) -> Result<(), HidError> {
    let mut written = 0usize;

    for attempt in 1..=WRITE_ATTEMPTS {
        match writer.write(frame) {
            Ok(n) => {
                written = n;
                break;
            }
            Err(e) if is_transient(&e) => {
                tracing::debug!(attempt, error = %e, "transient write failure, backing off");
                if attempt < WRITE_ATTEMPTS {
                    sleep(WRITE_BACKOFF);
                }
            }
            Err(e) => return Err(HidError::Io(e)),
        }
    }

    if written != FRAME_LEN {
        return Err(HidError::ShortWrite {
            expected: FRAME_LEN,
            actual: written,
        });
    }
    Ok(())
}

/// Transient write failures eligible for retry: the device drops the pipe
/// or reports busy while its controller is servicing a prior command.
fn is_transient(e: &std::io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(libc::EPIPE) | Some(libc::EBUSY) | Some(libc::EAGAIN)
    )
}
