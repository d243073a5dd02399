//! Per-connection inactivity timer running on its own thread.

use std::io;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::warn;

use super::SESSION_TARGET;

enum Signal {
    Reset,
    Stop,
}

/// Fires a one-shot callback when `timeout` passes without a reset.
///
/// The countdown restarts on every [`reset`](Self::reset). Once the callback
/// has run, or [`stop`](Self::stop) was called, the watchdog is inert.
pub(crate) struct Watchdog {
    control: Option<Sender<Signal>>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub(crate) fn start<F>(name: String, timeout: Duration, on_expiry: F) -> io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (control, signals) = mpsc::channel();
        let handle = thread::Builder::new().name(name).spawn(move || {
            loop {
                match signals.recv_timeout(timeout) {
                    Ok(Signal::Reset) => {}
                    Ok(Signal::Stop) | Err(RecvTimeoutError::Disconnected) => return,
                    Err(RecvTimeoutError::Timeout) => {
                        on_expiry();
                        return;
                    }
                }
            }
        })?;
        Ok(Self {
            control: Some(control),
            handle: Some(handle),
        })
    }

    /// Restarts the countdown. Ignored after expiry.
    pub(crate) fn reset(&self) {
        if let Some(control) = &self.control {
            // A send error means the timer already fired; nothing to reset.
            let _ = control.send(Signal::Reset);
        }
    }

    /// Stops the timer and waits for its thread, including a callback that is
    /// already running. Safe to call more than once.
    pub(crate) fn stop(&mut self) {
        if let Some(control) = self.control.take() {
            let _ = control.send(Signal::Stop);
        }
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!(target: SESSION_TARGET, "inactivity watchdog thread panicked");
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}
