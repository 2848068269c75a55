//! Cooperative cancellation for in-flight calls.
//!
//! A [`CancelHandle`] owns the trigger; any number of [`CancelSignal`]s observe it.
//! Every suspension point of the executor and the rate limiter races its work
//! against the signal and returns [`ErrorKind::Cancelled`](crate::ErrorKind::Cancelled)
//! once it fires.
//!
//! ```rust
//! use azure_devops_core::CancelHandle;
//!
//! let handle = CancelHandle::new();
//! let signal = handle.signal();
//! assert!(!signal.is_cancelled());
//! handle.cancel();
//! assert!(signal.is_cancelled());
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;

use crate::Error;

/// Triggers cancellation for every signal derived from it.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Creates a handle in the not-cancelled state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Returns a signal observing this handle.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }

    /// Fires the signal. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Returns `true` once [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Observes a [`CancelHandle`].
///
/// A signal whose handle was dropped without cancelling never fires.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    /// Returns `true` if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once cancellation is requested.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Runs `fut` to completion unless cancellation fires first.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, Error> {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(Error::cancelled()),
            out = fut => Ok(out),
        }
    }

    /// Sleeps for `duration` unless cancellation fires first.
    pub async fn sleep(&self, duration: Duration) -> Result<(), Error> {
        self.guard(tokio::time::sleep(duration)).await
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::never()
    }
}
