//! Single-slot frame cell shared by the capture thread and the sender

use parking_lot::Mutex;

use super::frame::VideoFrame;

#[derive(Debug, Default)]
struct Slot {
    capture_succeeded: bool,
    frame: Option<VideoFrame>,
}

/// Latest-wins frame cell
///
/// A successful capture replaces the stored frame; a failed one only clears
/// the success flag, so the last good frame is always what a reader gets.
/// The lock only guards a swap or a clone of a refcounted frame, so neither
/// side waits on the other's I/O.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    slot: Mutex<Slot>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store one capture result (`None` = the capture failed)
    pub fn write(&self, frame: Option<VideoFrame>) {
        let mut slot = self.slot.lock();
        slot.capture_succeeded = frame.is_some();
        if frame.is_some() {
            slot.frame = frame;
        }
    }

    /// Whether the latest capture succeeded, and the last good frame
    pub fn read(&self) -> (bool, Option<VideoFrame>) {
        let slot = self.slot.lock();
        (slot.capture_succeeded, slot.frame.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::Resolution;
    use bytes::Bytes;

    fn frame(seq: u64) -> VideoFrame {
        VideoFrame::h264(Bytes::from_static(&[0, 0, 0, 1, 0x41]), Resolution::VGA, seq)
    }

    #[test]
    fn test_empty_buffer() {
        let (ok, frame) = FrameBuffer::new().read();
        assert!(!ok);
        assert!(frame.is_none());
    }

    #[test]
    fn test_latest_write_wins() {
        let buffer = FrameBuffer::new();
        buffer.write(Some(frame(1)));
        buffer.write(Some(frame(2)));
        buffer.write(Some(frame(3)));

        let (ok, latest) = buffer.read();
        assert!(ok);
        assert_eq!(latest.unwrap().sequence, 3);
        // Reading does not consume
        assert_eq!(buffer.read().1.unwrap().sequence, 3);
    }

    #[test]
    fn test_failed_capture_keeps_last_good_frame() {
        let buffer = FrameBuffer::new();
        buffer.write(Some(frame(1)));
        buffer.write(None);
        buffer.write(None);

        let (ok, held) = buffer.read();
        assert!(!ok);
        assert_eq!(held.unwrap().sequence, 1);

        buffer.write(Some(frame(2)));
        let (ok, latest) = buffer.read();
        assert!(ok);
        assert_eq!(latest.unwrap().sequence, 2);
    }
}
