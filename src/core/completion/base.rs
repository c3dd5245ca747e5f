//! Base trait and types for completion model providers.
//!
//! A completion model is treated as a plain request/response capability: it
//! receives a system instruction and a fully rendered prompt and returns the
//! generated text as one unit. No token streaming is modelled.

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur while invoking a completion model.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// The call did not finish before the configured deadline
    #[error("Completion timed out after {0}s")]
    Timeout(u64),

    /// Transport-level failure reaching the provider
    #[error("Network error: {0}")]
    Network(String),

    /// Provider throttled the request or the quota is exhausted
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// Provider answered but the body could not be interpreted
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Missing or inconsistent provider configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Any other provider-side failure
    #[error("Provider error: {0}")]
    Provider(String),
}

/// Result type for completion operations.
pub type CompletionResult<T> = Result<T, CompletionError>;

// =============================================================================
// Request
// =============================================================================

/// A single completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// System instruction (persona, tone)
    pub system: String,
    /// Rendered conversation prompt
    pub prompt: String,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
        }
    }
}

// =============================================================================
// Base Trait
// =============================================================================

/// Remote completion capability.
///
/// Implementations perform exactly one attempt per call; retry and fallback
/// policy belong to the caller.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Generate a reply for the request.
    async fn complete(&self, request: CompletionRequest) -> CompletionResult<String>;

    /// Short identifier for logs (e.g. the model id).
    fn name(&self) -> &str;
}

/// Shared handle to a completion model.
pub type SharedCompletionModel = Arc<dyn CompletionModel>;
