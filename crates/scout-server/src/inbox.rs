//! Inbox: bounded queue of decoded webhook messages for an explicit consumer
//!
//! The webhook never waits on the inbox: when it is full, or nobody took the
//! receiving half, the message is dropped and logged.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};

use scout_agentverse::InboundMessage;

/// Receiving half, handed out once by [`crate::AgentServer::take_inbox`]
#[derive(Debug)]
pub struct Inbox {
    rx: mpsc::Receiver<InboundMessage>,
}

impl Inbox {
    /// Next message; `None` once the server has stopped and the queue is empty
    pub async fn recv(&mut self) -> Option<InboundMessage> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<InboundMessage> {
        self.rx.try_recv().ok()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct InboxSender {
    tx: mpsc::Sender<InboundMessage>,
}

impl InboxSender {
    /// Enqueue without waiting; returns false when the message was dropped
    pub(crate) fn offer(&self, message: InboundMessage) -> bool {
        match self.tx.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                warn!("Inbox full, dropping message from {}", message.sender);
                false
            }
            Err(TrySendError::Closed(message)) => {
                debug!("No inbox consumer, dropping message from {}", message.sender);
                false
            }
        }
    }
}

pub(crate) fn channel(capacity: usize) -> (InboxSender, Inbox) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (InboxSender { tx }, Inbox { rx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(sender: &str) -> InboundMessage {
        InboundMessage {
            sender: sender.to_string(),
            payload: json!({}),
        }
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let (tx, mut inbox) = channel(8);
        assert!(tx.offer(message("a")));
        assert!(tx.offer(message("b")));
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox.recv().await.unwrap().sender, "a");
        assert_eq!(inbox.recv().await.unwrap().sender, "b");
        assert!(inbox.try_recv().is_none());
    }

    #[test]
    fn test_full_inbox_drops() {
        let (tx, inbox) = channel(1);
        assert!(tx.offer(message("first")));
        assert!(!tx.offer(message("second")));
        assert_eq!(inbox.len(), 1);
    }

    #[test]
    fn test_closed_inbox_drops() {
        let (tx, inbox) = channel(4);
        drop(inbox);
        assert!(!tx.offer(message("nobody listening")));
    }

    #[tokio::test]
    async fn test_recv_ends_when_senders_gone() {
        let (tx, mut inbox) = channel(4);
        tx.offer(message("last"));
        drop(tx);
        assert_eq!(inbox.recv().await.unwrap().sender, "last");
        assert!(inbox.recv().await.is_none());
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let (tx, _inbox) = channel(0);
        assert!(tx.offer(message("fits")));
    }
}
