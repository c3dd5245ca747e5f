//! Bounded conversation history.
//!
//! The history is a sliding window over the turns of one session. Every append
//! is followed by eviction from the oldest end so that at most
//! [`MAX_HISTORY_TURNS`] turns are retained. User and assistant turns are not
//! paired for eviction: the window is a plain FIFO over individual turns.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum number of turns retained per session (ten exchanges).
pub const MAX_HISTORY_TURNS: usize = 20;

/// Prompt label for user turns.
pub const HUMAN_LABEL: &str = "Human:";

/// Prompt label for assistant turns.
pub const ASSISTANT_LABEL: &str = "Assistant:";

/// Errors raised by conversation mutations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConversationError {
    /// A finalized user transcript was empty after trimming
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for conversation operations.
pub type ConversationResult<T> = Result<T, ConversationError>;

/// Speaker of a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human speaking into the microphone
    User,
    /// The completion model
    Assistant,
}

impl Role {
    /// Label used when rendering this role into a prompt.
    pub fn label(self) -> &'static str {
        match self {
            Role::User => HUMAN_LABEL,
            Role::Assistant => ASSISTANT_LABEL,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single immutable utterance in the conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    role: Role,
    content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// Observable lifecycle state of a history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConversationState {
    /// No turns stored (fresh session or just reset)
    #[default]
    Empty,
    /// At least one turn stored
    Accumulating,
}

impl fmt::Display for ConversationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConversationState::Empty => write!(f, "Empty"),
            ConversationState::Accumulating => write!(f, "Accumulating"),
        }
    }
}

/// Sliding-window history of turns owned by exactly one session.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: VecDeque<Turn>,
    capacity: usize,
}

impl Default for ConversationHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationHistory {
    /// Create an empty history holding at most [`MAX_HISTORY_TURNS`] turns.
    pub fn new() -> Self {
        Self::with_capacity(MAX_HISTORY_TURNS)
    }

    /// Create an empty history with a custom window size.
    ///
    /// A capacity of zero is treated as one so the latest turn is always kept.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            turns: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Append a finalized user utterance.
    ///
    /// Fails without touching the history when the text is blank.
    pub fn append_user(&mut self, text: &str) -> ConversationResult<()> {
        if text.trim().is_empty() {
            return Err(ConversationError::InvalidInput(
                "user turn must contain non-whitespace text".to_string(),
            ));
        }
        self.push(Turn::user(text));
        Ok(())
    }

    /// Append an assistant reply. Always recorded, fallback text included.
    pub fn append_assistant(&mut self, text: &str) {
        self.push(Turn::assistant(text));
    }

    /// Render the retained history into a single prompt.
    ///
    /// Each turn becomes `"<label> <content>"`; turns are separated by a blank
    /// line and trailing whitespace is trimmed. An empty history renders to an
    /// empty string.
    pub fn build_prompt(&self) -> String {
        let mut prompt = String::new();
        for turn in &self.turns {
            prompt.push_str(turn.role.label());
            prompt.push(' ');
            prompt.push_str(&turn.content);
            prompt.push_str("\n\n");
        }
        prompt.trim_end().to_string()
    }

    /// Clear all turns. Idempotent.
    pub fn reset(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn state(&self) -> ConversationState {
        if self.turns.is_empty() {
            ConversationState::Empty
        } else {
            ConversationState::Accumulating
        }
    }

    /// Iterate over retained turns, oldest first.
    pub fn turns(&self) -> impl ExactSizeIterator<Item = &Turn> {
        self.turns.iter()
    }

    fn push(&mut self, turn: Turn) {
        self.turns.push_back(turn);
        while self.turns.len() > self.capacity {
            self.turns.pop_front();
        }
    }
}
