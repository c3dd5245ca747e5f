//! Relay WebSocket message types
//!
//! Every event is one JSON text frame tagged by `type`.

use serde::{Deserialize, Serialize};

use crate::core::transcript::TranscriptEvent;

/// Maximum allowed size for transcript text (50 KB)
pub const MAX_TEXT_SIZE: usize = 50 * 1024;

// =============================================================================
// Incoming Messages (Client -> Server)
// =============================================================================

/// Incoming WebSocket messages from client
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum RelayIncomingMessage {
    /// Recognized speech, either a running partial or a finished utterance
    #[serde(rename = "speech-text")]
    SpeechText {
        text: String,
        #[serde(rename = "isFinal", default)]
        is_final: bool,
    },

    /// Clear the conversation
    #[serde(rename = "reset-conversation")]
    ResetConversation,
}

impl From<TranscriptEvent> for RelayIncomingMessage {
    fn from(event: TranscriptEvent) -> Self {
        RelayIncomingMessage::SpeechText {
            text: event.text,
            is_final: event.is_final,
        }
    }
}

// =============================================================================
// Outgoing Messages (Server -> Client)
// =============================================================================

/// Outgoing WebSocket messages to client
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum RelayOutgoingMessage {
    /// Assistant reply, ready for speech synthesis
    #[serde(rename = "ai-response")]
    AiResponse {
        text: String,
        /// ISO-8601 time the reply was emitted
        timestamp: String,
    },

    /// Echo of a partial transcript for live captioning
    #[serde(rename = "partial-transcript")]
    PartialTranscript { text: String },

    /// Acknowledges a reset
    #[serde(rename = "conversation-reset")]
    ConversationReset,

    /// Non-fatal failure
    #[serde(rename = "error")]
    Error { message: String },
}

impl RelayOutgoingMessage {
    pub fn error(message: impl Into<String>) -> Self {
        RelayOutgoingMessage::Error {
            message: message.into(),
        }
    }
}

// =============================================================================
// Message Routing
// =============================================================================

/// What the writer task should do next
#[derive(Debug)]
pub enum RelayMessageRoute {
    /// JSON text message
    Outgoing(RelayOutgoingMessage),
    /// Close connection
    Close,
}

// =============================================================================
// Validation
// =============================================================================

/// Error type for message validation failures
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayValidationError {
    /// Text content exceeds maximum allowed size
    TextTooLarge { size: usize, max: usize },
}

impl std::fmt::Display for RelayValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TextTooLarge { size, max } => {
                write!(f, "Text too large: {} bytes (max: {} bytes)", size, max)
            }
        }
    }
}

impl std::error::Error for RelayValidationError {}

impl RelayIncomingMessage {
    /// Validates message field sizes to prevent resource exhaustion.
    pub fn validate_size(&self) -> Result<(), RelayValidationError> {
        match self {
            RelayIncomingMessage::SpeechText { text, .. } => {
                let size = text.len();
                if size > MAX_TEXT_SIZE {
                    return Err(RelayValidationError::TextTooLarge {
                        size,
                        max: MAX_TEXT_SIZE,
                    });
                }
            }
            RelayIncomingMessage::ResetConversation => {}
        }
        Ok(())
    }
}
