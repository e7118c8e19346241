//! One-shot reasoning handoff
//!
//! The single-slot rendezvous between the reasoning stage and the answer
//! stage. Sending consumes the sender, so the write-at-most-once invariant
//! holds structurally; a sender dropped without sending (producer failure)
//! resolves the receiver to the empty-string sentinel instead of blocking
//! forever.

use tokio::sync::oneshot;

/// Create a linked handoff pair.
pub fn handoff() -> (HandoffSender, HandoffReceiver) {
    let (tx, rx) = oneshot::channel();
    (HandoffSender { tx }, HandoffReceiver { rx })
}

/// Write-once producer half
#[derive(Debug)]
pub struct HandoffSender {
    tx: oneshot::Sender<String>,
}

impl HandoffSender {
    /// Hand the accumulated reasoning text to the answer stage.
    ///
    /// A receiver that already went away (cancelled run) is not an error.
    pub fn send(self, reasoning: String) {
        let _ = self.tx.send(reasoning);
    }
}

/// Blocking consumer half
#[derive(Debug)]
pub struct HandoffReceiver {
    rx: oneshot::Receiver<String>,
}

impl HandoffReceiver {
    /// Wait for the reasoning text.
    ///
    /// Resolves to the empty string when the producer was dropped without
    /// writing, so the answer stage degrades instead of deadlocking.
    pub async fn recv(self) -> String {
        self.rx.await.unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_written_value() {
        let (tx, rx) = handoff();
        tx.send("r1r2".to_string());
        assert_eq!(rx.recv().await, "r1r2");
    }

    #[tokio::test]
    async fn abandoned_sender_yields_empty_sentinel() {
        let (tx, rx) = handoff();
        drop(tx);
        assert_eq!(rx.recv().await, "");
    }

    #[tokio::test]
    async fn send_into_dropped_receiver_is_silent() {
        let (tx, rx) = handoff();
        drop(rx);
        tx.send("late".to_string());
    }
}
