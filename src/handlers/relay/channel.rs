//! Outbound half of a relay session.

use std::sync::Arc;
use tokio::sync::mpsc;

use super::messages::{RelayMessageRoute, RelayOutgoingMessage};
use crate::errors::{RelayError, RelayResult};

/// Ordered outbound queue for one connection.
///
/// Events are drained by the connection's writer task in the order they were
/// queued. Once the writer is gone every send fails with
/// [`RelayError::Transport`].
#[derive(Debug, Clone)]
pub struct SessionChannel {
    session_id: Arc<str>,
    tx: mpsc::Sender<RelayMessageRoute>,
}

impl SessionChannel {
    pub fn new(session_id: impl Into<Arc<str>>, tx: mpsc::Sender<RelayMessageRoute>) -> Self {
        Self {
            session_id: session_id.into(),
            tx,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Queue one event for the client.
    pub async fn send(&self, message: RelayOutgoingMessage) -> RelayResult<()> {
        self.tx
            .send(RelayMessageRoute::Outgoing(message))
            .await
            .map_err(|_| {
                RelayError::Transport(format!("session {} channel closed", self.session_id))
            })
    }

    /// Ask the writer to close the socket after everything queued so far.
    pub async fn close(&self) -> RelayResult<()> {
        self.tx.send(RelayMessageRoute::Close).await.map_err(|_| {
            RelayError::Transport(format!("session {} channel closed", self.session_id))
        })
    }

    /// True once the writer has stopped accepting events.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_preserves_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let channel = SessionChannel::new("s-1", tx);

        channel
            .send(RelayOutgoingMessage::PartialTranscript {
                text: "one".to_string(),
            })
            .await
            .unwrap();
        channel
            .send(RelayOutgoingMessage::ConversationReset)
            .await
            .unwrap();
        channel.close().await.unwrap();

        assert!(matches!(
            rx.recv().await,
            Some(RelayMessageRoute::Outgoing(RelayOutgoingMessage::PartialTranscript { .. }))
        ));
        assert!(matches!(
            rx.recv().await,
            Some(RelayMessageRoute::Outgoing(RelayOutgoingMessage::ConversationReset))
        ));
        assert!(matches!(rx.recv().await, Some(RelayMessageRoute::Close)));
    }

    #[tokio::test]
    async fn test_send_after_writer_gone_is_transport_error() {
        let (tx, rx) = mpsc::channel(1);
        let channel = SessionChannel::new("s-2", tx);
        drop(rx);

        assert!(channel.is_closed());
        let err = channel
            .send(RelayOutgoingMessage::ConversationReset)
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Transport(msg) if msg.contains("s-2")));
    }
}
