use thiserror::Error;

use crate::core::completion::CompletionError;
use crate::core::conversation::ConversationError;

/// Generic text shown to a client when handling one of its events fails.
pub const GENERIC_CLIENT_ERROR: &str = "Speech processing failed";

/// Shown when a session's command queue is full.
pub const BUSY_CLIENT_ERROR: &str = "Too many pending requests, please wait for a reply";

/// Session-scoped failures of the relay.
///
/// None of these variants is fatal to the process; each one affects only the
/// session whose event triggered it.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Empty finalized transcript; dropped without touching history
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Outbound event could not be delivered to the client
    #[error("Transport error: {0}")]
    Transport(String),

    /// Remote model failure; absorbed into the fallback reply
    #[error("Completion failure: {0}")]
    Completion(#[from] CompletionError),

    /// Session queue is full; the event was not accepted
    #[error("Session busy: {0}")]
    Busy(String),

    /// Anything else raised while handling a client event
    #[error("Unexpected server error: {0}")]
    Unexpected(String),
}

impl RelayError {
    /// Message surfaced to the client in an `error` event, if any.
    ///
    /// Only busy and unexpected failures are surfaced; invalid input is dropped
    /// silently, transport failures cannot reach the client, and completion
    /// failures already produced a spoken fallback.
    pub fn client_message(&self) -> Option<&'static str> {
        match self {
            RelayError::Busy(_) => Some(BUSY_CLIENT_ERROR),
            RelayError::Unexpected(_) => Some(GENERIC_CLIENT_ERROR),
            _ => None,
        }
    }
}

impl From<ConversationError> for RelayError {
    fn from(err: ConversationError) -> Self {
        match err {
            ConversationError::InvalidInput(msg) => RelayError::InvalidInput(msg),
        }
    }
}

/// Result type for relay handlers.
pub type RelayResult<T> = Result<T, RelayError>;
