//! One-shot cooperative signals used for worker start, kill and decoder stop.
//!
//! A signal is a crossbeam channel that never carries a message: firing drops
//! the sending half, and a disconnected channel stays disconnected, so every
//! listener observes the signal from then on. Dropping an unfired [`Trigger`]
//! fires it too, which means a handle going out of scope always cancels its
//! task.

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};

/// Sending half of a signal.
pub struct Trigger {
    tx: Option<Sender<()>>,
}

/// Receiving half of a signal.
#[derive(Clone)]
pub struct Listener {
    rx: Receiver<()>,
}

/// Create a connected trigger/listener pair.
pub fn signal() -> (Trigger, Listener) {
    let (tx, rx) = bounded(0);
    (Trigger { tx: Some(tx) }, Listener { rx })
}

impl Trigger {
    /// Fire the signal. Idempotent; never blocks.
    pub fn fire(&mut self) {
        self.tx.take();
    }
}

impl Listener {
    /// True once the signal was fired or its trigger dropped.
    pub fn is_fired(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Block for at most `timeout`; returns true if the signal fired meanwhile.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.rx.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => false,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        }
    }

    /// Underlying receiver, for use in `select!`. A ready operation on it
    /// means the signal fired.
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }
}
