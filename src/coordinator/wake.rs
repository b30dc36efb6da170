//! Counting wake signal
//!
//! Every producer-side event worth a wake-up (a queued command, an accepted
//! frame, a shutdown request) adds one permit. The worker takes one permit
//! per wake-up and re-checks its queues, so surplus permits only cause
//! harmless empty wake-ups.
//!
//! Permits are carried by an unbounded crossbeam channel of `()`: a send
//! never blocks and `recv` blocks until a permit is available.

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::time::Duration;

/// Semaphore-like wake primitive shared by producers and the worker
#[derive(Debug, Clone)]
pub struct WakeSignal {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl Default for WakeSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl WakeSignal {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Release one permit. Never blocks.
    pub fn signal(&self) {
        // Both ends live in `self`, the channel cannot be disconnected
        let _ = self.tx.send(());
    }

    /// Block until a permit is available and take it
    pub fn wait(&self) {
        let _ = self.rx.recv();
    }

    /// Take a permit if one is available
    pub fn try_wait(&self) -> bool {
        self.rx.try_recv().is_ok()
    }

    /// Take a permit, giving up after `timeout`
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.rx.recv_timeout(timeout).is_ok()
    }

    /// Number of permits currently available
    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}
