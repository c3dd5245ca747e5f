//! Relay core: conversation state, completion model access and client-side
//! transcript production.

pub mod completion;
pub mod conversation;
pub mod transcript;

// Re-export commonly used types for convenience
pub use completion::{
    BedrockCompletion, CompletionConfig, CompletionError, CompletionGateway, CompletionModel,
    CompletionRequest, CompletionResult, FALLBACK_RESPONSE, SharedCompletionModel,
};
pub use conversation::{ConversationError, ConversationHistory, ConversationState, Role, Turn};
pub use transcript::{
    RecognitionBatch, RestartDecision, RestartPolicy, RestartTracker, TranscriptEvent,
    TranscriptSegmenter, segment_stream,
};
