//! Request-scoped cancellation.
//!
//! A ListObjects request owns one [`Canceller`]; every producer holds a
//! [`CancellationToken`] cloned from it. Firing the canceller (or dropping
//! it) stops producers from scheduling further reads and checks.

use tokio::sync::watch;

/// Creates a linked canceller/token pair.
pub(crate) fn cancellation() -> (Canceller, CancellationToken) {
    let (tx, rx) = watch::channel(false);
    (Canceller { tx }, CancellationToken { rx })
}

/// Fires the cancellation signal. Dropping it also cancels.
#[derive(Debug)]
pub(crate) struct Canceller {
    tx: watch::Sender<bool>,
}

impl Canceller {
    /// Signals every token. Idempotent.
    pub(crate) fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

impl Drop for Canceller {
    fn drop(&mut self) {
        self.tx.send_replace(true);
    }
}

/// Observes a [`Canceller`].
#[derive(Debug, Clone)]
pub(crate) struct CancellationToken {
    rx: watch::Receiver<bool>,
}

impl CancellationToken {
    pub(crate) fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes once cancellation has been signalled.
    pub(crate) async fn cancelled(mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            // Sender gone: nobody can observe further results.
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}
