//! Per-connection cancellation for the agent runner's streaming mode.
//!
//! Simplified from the teacher's `CancelMap`, which cascades cancellation
//! across a tree of sub-agent delegations: this spec has no sub-agent
//! delegation, so one flat token per client WebSocket is enough, held
//! locally by the connection handler rather than threaded through shared
//! state.
//!
//! Built on `watch` rather than `Notify`: `Notify::notify_waiters` only
//! wakes tasks already waiting, so a `cancel()` that races ahead of the
//! first `cancelled().await` would be lost. A `watch` channel retains its
//! last value, so `cancelled()` can check it before ever awaiting a change.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx: Arc::new(tx), rx }
    }

    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once `cancel()` has been called — immediately, if it
    /// already has been.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if *rx.borrow() {
            return;
        }
        let _ = rx.changed().await;
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancelled_resolves_after_cancel_is_called() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());

        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });

        token.cancel();
        handle.await.unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_resolves_immediately_if_already_cancelled() {
        let token = CancelToken::new();
        token.cancel();
        tokio::time::timeout(std::time::Duration::from_millis(200), token.cancelled())
            .await
            .expect("cancelled() should return immediately once already cancelled");
    }

    #[tokio::test]
    async fn select_prefers_cancellation_over_a_pending_future() {
        let token = CancelToken::new();
        token.cancel();

        let never = std::future::pending::<()>();
        tokio::select! {
            _ = token.cancelled() => {}
            _ = never => panic!("should have taken the cancellation branch"),
        }
    }
}
