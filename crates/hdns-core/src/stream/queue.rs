//! Outgoing message queue
//!
//! Decouples callers from the socket lifecycle: `enqueue` never blocks and
//! never fails loudly. The lifecycle manager drains the queue into the live
//! socket, or discards what arrives while no socket is live.

use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;

/// Create a connected queue pair
pub(crate) fn outgoing_queue() -> (OutgoingQueue, QueueReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        OutgoingQueue {
            tx: Mutex::new(Some(tx)),
        },
        QueueReceiver { rx },
    )
}

/// Caller side of the queue
pub(crate) struct OutgoingQueue {
    tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl OutgoingQueue {
    /// Enqueue an encoded message
    ///
    /// Returns `false` when the queue is closed or the lifecycle manager has
    /// stopped; the message is discarded in that case.
    pub(crate) fn enqueue(&self, text: String) -> bool {
        let guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        guard.as_ref().is_some_and(|tx| tx.send(text).is_ok())
    }

    /// Complete the queue
    ///
    /// The receiver yields the already-queued messages and then `None`.
    /// Returns `true` only for the call that actually closed the queue.
    pub(crate) fn close(&self) -> bool {
        let mut guard = self.tx.lock().unwrap_or_else(PoisonError::into_inner);
        guard.take().is_some()
    }

    /// Whether [`OutgoingQueue::close`] has been called
    pub(crate) fn is_closed(&self) -> bool {
        self.tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

/// Lifecycle side of the queue
pub(crate) struct QueueReceiver {
    rx: mpsc::UnboundedReceiver<String>,
}

impl QueueReceiver {
    /// Next queued message; `None` once the queue is closed and drained
    ///
    /// Cancellation safe.
    pub(crate) async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_order_then_completes_after_close() {
        let (queue, mut rx) = outgoing_queue();
        assert!(queue.enqueue("a".to_string()));
        assert!(queue.enqueue("b".to_string()));

        assert!(queue.close());
        assert!(!queue.close(), "second close must be a no-op");
        assert!(queue.is_closed());
        assert!(!queue.enqueue("c".to_string()));

        assert_eq!(rx.recv().await.as_deref(), Some("a"));
        assert_eq!(rx.recv().await.as_deref(), Some("b"));
        assert_eq!(rx.recv().await, None);
    }

    #[test]
    fn enqueue_fails_quietly_once_receiver_is_gone() {
        let (queue, rx) = outgoing_queue();
        drop(rx);
        assert!(!queue.enqueue("lost".to_string()));
        assert!(!queue.is_closed());
    }
}
