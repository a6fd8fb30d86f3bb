//! Bounded frame queue between a decode producer and its displaying worker.
//!
//! The producer never drops or overwrites buffered frames: while the queue is
//! at capacity `push_timeout` waits, then hands the frame back on timeout so
//! the caller can check its stop signal and retry. The consumer blocks while
//! the queue is empty.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendTimeoutError, Sender, bounded};

use super::types::Frame;

/// Default capacity. A buffered 32x32 RGB frame is about 3 KB, so a full
/// buffer stays inside a 500 MB per-buffer budget.
pub const DEFAULT_CAPACITY: usize = 100_000;

pub struct FrameBuffer {
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
}

impl FrameBuffer {
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self { tx, rx }
    }

    /// Insert a frame, waiting up to `timeout` for space.
    ///
    /// Returns the frame back when the queue stayed full for the whole wait.
    pub fn push_timeout(&self, frame: Frame, timeout: Duration) -> Result<(), Frame> {
        // Both ends live in `self`, so the channel never disconnects
        self.tx.send_timeout(frame, timeout).map_err(|e| match e {
            SendTimeoutError::Timeout(frame) | SendTimeoutError::Disconnected(frame) => frame,
        })
    }

    /// Take the oldest frame, waiting up to `timeout` for one to arrive.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Frame> {
        match self.rx.recv_timeout(timeout) {
            Ok(frame) => Some(frame),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Take the oldest frame if one is buffered.
    pub fn try_pop(&self) -> Option<Frame> {
        self.rx.try_recv().ok()
    }
}
