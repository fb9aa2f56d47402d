//! Cancellation signals.
//!
//! A cancellation scope is a `watch` channel carrying `bool`: the owner keeps
//! the [`CancelHandle`], tasks get receivers. Dropping the handle cancels the
//! scope as well, so a task can never outlive the owner that spawned it.

use std::future::Future;

use tokio::sync::watch;

/// Receiving side of a cancellation scope.
pub type CancelSignal = watch::Receiver<bool>;

/// Owning side of a cancellation scope.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn new() -> (Self, CancelSignal) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, rx)
    }

    /// A new receiver for this scope.
    pub fn signal(&self) -> CancelSignal {
        self.tx.subscribe()
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new().0
    }
}

/// Resolves once the scope is cancelled or its handle is dropped.
pub async fn cancelled(signal: &mut CancelSignal) {
    loop {
        if *signal.borrow_and_update() {
            return;
        }
        if signal.changed().await.is_err() {
            return;
        }
    }
}

/// Runs `fut` unless the scope is cancelled first.
///
/// Returns `None` without polling `fut` if the scope is already cancelled.
pub async fn cancellable<F: Future>(signal: &mut CancelSignal, fut: F) -> Option<F::Output> {
    if *signal.borrow() {
        return None;
    }
    tokio::select! {
        biased;
        _ = cancelled(signal) => None,
        out = fut => Some(out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancellable_completes_when_not_cancelled() {
        let (_handle, mut signal) = CancelHandle::new();
        assert_eq!(cancellable(&mut signal, async { 7 }).await, Some(7));
    }

    #[tokio::test]
    async fn cancel_interrupts_pending_future() {
        let (handle, mut signal) = CancelHandle::new();
        let task = tokio::spawn(async move {
            cancellable(&mut signal, tokio::time::sleep(Duration::from_secs(3600))).await
        });
        handle.cancel();
        let out = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn dropping_handle_cancels() {
        let (handle, mut signal) = CancelHandle::new();
        drop(handle);
        tokio::time::timeout(Duration::from_secs(1), cancelled(&mut signal))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn already_cancelled_scope_skips_future() {
        let (handle, mut signal) = CancelHandle::new();
        handle.cancel();
        assert!(handle.is_cancelled());
        assert_eq!(cancellable(&mut signal, async { 1 }).await, None);
    }
}
