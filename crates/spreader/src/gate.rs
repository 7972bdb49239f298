//! Completion gate - one-shot, multi-waiter "producer is done" latch

use tokio::sync::watch;

/// Set-once latch
///
/// Once set it stays set: every current waiter wakes and every later
/// `wait` returns immediately. There is no re-arm.
#[derive(Debug)]
pub struct CompletionGate {
    tx: watch::Sender<bool>,
}

impl CompletionGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    /// Set the gate. Returns `true` only for the call that actually set it.
    pub fn finish(&self) -> bool {
        !self.tx.send_replace(true)
    }

    pub fn is_finished(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the gate is set
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|finished| *finished).await;
    }
}

impl Default for CompletionGate {
    fn default() -> Self {
        Self::new()
    }
}
