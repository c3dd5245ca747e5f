//! Anthropic messages payloads as accepted by Bedrock `InvokeModel`.

use serde::{Deserialize, Serialize};

use super::base::{CompletionError, CompletionResult};

/// Version tag required by Bedrock for Anthropic models.
pub const ANTHROPIC_VERSION: &str = "bedrock-2023-05-31";

/// Request body for an Anthropic model on Bedrock.
#[derive(Debug, Clone, Serialize)]
pub struct InvokeRequestBody<'a> {
    pub anthropic_version: &'static str,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub system: &'a str,
    pub messages: Vec<ChatMessage<'a>>,
}

/// A single chat message in the request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

/// Response body returned by the model.
#[derive(Debug, Clone, Deserialize)]
pub struct InvokeResponseBody {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default)]
    pub stop_reason: Option<String>,
}

/// Content block of a model response.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlock {
    #[serde(rename = "type", default)]
    pub block_type: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

impl<'a> InvokeRequestBody<'a> {
    /// Build a request carrying the whole conversation as one user message.
    pub fn new(
        system: &'a str,
        prompt: &'a str,
        max_tokens: u32,
        temperature: f32,
        top_p: f32,
    ) -> Self {
        Self {
            anthropic_version: ANTHROPIC_VERSION,
            max_tokens,
            temperature,
            top_p,
            system,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        }
    }
}

impl InvokeResponseBody {
    /// Parse a raw response body.
    pub fn parse(raw: &[u8]) -> CompletionResult<Self> {
        serde_json::from_slice(raw)
            .map_err(|e| CompletionError::MalformedResponse(format!("invalid JSON body: {e}")))
    }

    /// Text of the first content block.
    pub fn first_text(self) -> CompletionResult<String> {
        self.content
            .into_iter()
            .next()
            .and_then(|block| block.text)
            .ok_or_else(|| {
                CompletionError::MalformedResponse("response has no text content".to_string())
            })
    }
}
