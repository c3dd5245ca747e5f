use tracing::debug;

use super::channel::SessionChannel;
use super::messages::RelayOutgoingMessage;
use crate::errors::RelayResult;
use crate::utils::rfc3339_now;

/// Emits assistant replies as `ai-response` events.
#[derive(Debug, Clone)]
pub struct ResponseDispatcher {
    channel: SessionChannel,
}

impl ResponseDispatcher {
    pub fn new(channel: SessionChannel) -> Self {
        Self { channel }
    }

    /// Send one reply. The timestamp is taken at the moment of emission.
    pub async fn dispatch(&self, text: &str) -> RelayResult<()> {
        let timestamp = rfc3339_now();
        debug!(
            session_id = %self.channel.session_id(),
            timestamp = %timestamp,
            chars = text.chars().count(),
            "Dispatching ai-response"
        );

        self.channel
            .send(RelayOutgoingMessage::AiResponse {
                text: text.to_string(),
                timestamp,
            })
            .await
    }
}
