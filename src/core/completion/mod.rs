//! Completion model integration.
//!
//! - `base` - provider trait and error taxonomy
//! - `bedrock` - Amazon Bedrock (Anthropic messages) provider
//! - `gateway` - single-attempt invocation with deadline and fallback reply

pub mod base;
pub mod bedrock;
pub mod config;
pub mod gateway;
pub mod messages;

pub use base::{
    CompletionError, CompletionModel, CompletionRequest, CompletionResult, SharedCompletionModel,
};
pub use bedrock::BedrockCompletion;
pub use config::CompletionConfig;
pub use gateway::{CompletionGateway, FALLBACK_RESPONSE};
