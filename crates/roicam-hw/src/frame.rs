//! Frame type, YUYV conversion, and the latest-frame buffer.

use std::sync::Mutex;
use std::time::SystemTime;

/// A captured grayscale camera frame.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes, row-major).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Wall-clock capture time.
    pub captured_at: SystemTime,
}

impl Frame {
    /// Average pixel brightness (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&b| b as f32).sum::<f32>() / self.data.len() as f32
    }
}

/// Convert packed YUYV (4:2:2) to grayscale by extracting the Y channel.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V].
/// Grayscale = every even-indexed byte.
pub fn yuyv_to_grayscale(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }
    Ok(yuyv[..expected].iter().step_by(2).copied().collect())
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

/// Thread-safe holder of the most recent captured frame.
///
/// One producer replaces the snapshot wholesale with [`put`](Self::put);
/// any number of readers clone it out with [`snapshot`](Self::snapshot).
/// A single mutex guards the whole frame so pixel data and timestamp
/// always travel together — readers can never observe a frame paired
/// with another frame's timestamp.
#[derive(Default)]
pub struct FrameBuffer {
    latest: Mutex<Option<Frame>>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new frame, replacing the previous snapshot.
    pub fn put(&self, frame: Frame) {
        let mut guard = self.latest.lock().expect("frame buffer lock poisoned");
        *guard = Some(frame);
    }

    /// Clone out the most recent frame, or `None` before the first put.
    pub fn snapshot(&self) -> Option<Frame> {
        let guard = self.latest.lock().expect("frame buffer lock poisoned");
        guard.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    fn frame_of(value: u8, captured_at: SystemTime) -> Frame {
        Frame {
            data: vec![value; 16],
            width: 4,
            height: 4,
            captured_at,
        }
    }

    #[test]
    fn test_yuyv_to_grayscale() {
        // 2x1 image: [Y0=100, U=128, Y1=200, V=128]
        let yuyv = vec![100, 128, 200, 128];
        let gray = yuyv_to_grayscale(&yuyv, 2, 1).unwrap();
        assert_eq!(gray, vec![100, 200]);
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let yuyv = vec![100, 128]; // too short for 2x1
        assert!(yuyv_to_grayscale(&yuyv, 2, 1).is_err());
    }

    #[test]
    fn test_snapshot_empty_before_first_put() {
        let buffer = FrameBuffer::new();
        assert!(buffer.snapshot().is_none());
    }

    #[test]
    fn test_put_then_snapshot_pairs_data_and_timestamp() {
        let buffer = FrameBuffer::new();
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(1000);
        buffer.put(frame_of(42, t));

        let snap = buffer.snapshot().unwrap();
        assert_eq!(snap.data, vec![42; 16]);
        assert_eq!(snap.captured_at, t);
    }

    #[test]
    fn test_put_replaces_wholesale() {
        let buffer = FrameBuffer::new();
        let t1 = SystemTime::UNIX_EPOCH + Duration::from_secs(1);
        let t2 = SystemTime::UNIX_EPOCH + Duration::from_secs(2);
        buffer.put(frame_of(1, t1));
        buffer.put(frame_of(2, t2));

        let snap = buffer.snapshot().unwrap();
        assert_eq!(snap.data[0], 2);
        assert_eq!(snap.captured_at, t2);
    }

    #[test]
    fn test_concurrent_readers_never_see_mixed_pairs() {
        let buffer = Arc::new(FrameBuffer::new());
        let writer = {
            let buffer = Arc::clone(&buffer);
            std::thread::spawn(move || {
                for i in 0..500u32 {
                    // Frame value and timestamp derive from the same
                    // counter, so a torn pair would be detectable below.
                    let t = SystemTime::UNIX_EPOCH + Duration::from_secs(i as u64);
                    buffer.put(frame_of((i % 256) as u8, t));
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let buffer = Arc::clone(&buffer);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        if let Some(snap) = buffer.snapshot() {
                            let secs = snap
                                .captured_at
                                .duration_since(SystemTime::UNIX_EPOCH)
                                .unwrap()
                                .as_secs();
                            assert_eq!(snap.data[0] as u64, secs % 256);
                        }
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for r in readers {
            r.join().unwrap();
        }
    }
}
