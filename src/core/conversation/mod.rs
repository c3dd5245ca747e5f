//! Conversation state for a single relay session.
//!
//! A session's history moves between two states:
//!
//! ```text
//!   Empty --append--> Accumulating --append--> Accumulating
//!     ^                    |
//!     +-------reset--------+
//! ```

mod history;

pub use history::{
    ASSISTANT_LABEL, ConversationError, ConversationHistory, ConversationResult,
    ConversationState, HUMAN_LABEL, MAX_HISTORY_TURNS, Role, Turn,
};
