//! Single-shot exit notification.
//!
//! Firing is a best-effort handoff to a listener that is blocked in
//! [`ExitListener::wait`] at that moment. Nobody waiting means the signal is
//! dropped; it is never buffered for later listeners.

use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};

#[derive(Debug, Clone)]
pub(crate) struct ExitSignal {
    tx: Sender<()>,
    rx: Receiver<()>,
}

impl ExitSignal {
    pub(crate) fn new() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self { tx, rx }
    }

    /// Hands the signal to a waiting listener. Never blocks.
    ///
    /// Returns whether a listener received it.
    pub(crate) fn fire(&self) -> bool {
        self.tx.try_send(()).is_ok()
    }

    pub(crate) fn listener(&self) -> ExitListener {
        ExitListener {
            rx: self.rx.clone(),
        }
    }
}

/// Host-side handle for waiting on tray shutdown.
#[derive(Debug, Clone)]
pub struct ExitListener {
    rx: Receiver<()>,
}

impl ExitListener {
    /// Blocks until the tray signals exit.
    pub fn wait(&self) {
        let _ = self.rx.recv();
    }

    /// Blocks for at most `timeout`; returns `true` if exit was signalled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.rx.recv_timeout(timeout).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn fire_without_listener_does_not_block() {
        let signal = ExitSignal::new();
        assert!(!signal.fire());
    }

    #[test]
    fn unheard_signal_is_not_replayed() {
        let signal = ExitSignal::new();
        let listener = signal.listener();

        signal.fire();
        assert!(!listener.wait_timeout(Duration::from_millis(50)));
    }

    #[test]
    fn waiting_listener_receives_signal() {
        let signal = ExitSignal::new();
        let listener = signal.listener();
        let waiter = thread::spawn(move || listener.wait_timeout(Duration::from_secs(5)));

        // Retry until the waiter is parked in recv.
        let mut delivered = false;
        for _ in 0..500 {
            if signal.fire() {
                delivered = true;
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }

        assert!(delivered);
        assert!(waiter.join().unwrap());
    }
}
