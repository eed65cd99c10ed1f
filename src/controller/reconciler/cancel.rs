//! # Cancellation
//!
//! Shutdown signal carried by every reconciliation. A cancelled signal aborts lock
//! waits and in-flight store calls with [`ReconcilerError::Cancelled`].

use super::types::ReconcilerError;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// Sending half; flips every derived [`CancellationSignal`]
#[derive(Debug, Clone)]
pub struct CancellationHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancellationHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Receiving half, cheap to clone
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    rx: watch::Receiver<bool>,
}

/// Create a linked handle and signal
#[must_use]
pub fn cancellation() -> (CancellationHandle, CancellationSignal) {
    let (tx, rx) = watch::channel(false);
    (
        CancellationHandle { tx: Arc::new(tx) },
        CancellationSignal { rx },
    )
}

impl CancellationSignal {
    /// A signal that never fires
    #[must_use]
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancelled; pending forever if the handle is dropped uncancelled
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Drive `fut` unless cancellation wins first
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, ReconcilerError>
    where
        F: Future,
    {
        if self.is_cancelled() {
            return Err(ReconcilerError::Cancelled);
        }
        tokio::select! {
            biased;
            () = self.cancelled() => Err(ReconcilerError::Cancelled),
            output = fut => Ok(output),
        }
    }

    /// [`run`](Self::run) for fallible futures, flattening the error
    pub async fn guard<F, T, E>(&self, fut: F) -> Result<T, ReconcilerError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<ReconcilerError>,
    {
        self.run(fut).await?.map_err(Into::into)
    }
}
