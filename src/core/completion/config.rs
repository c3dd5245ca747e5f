//! Completion provider configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default Bedrock model identifier.
pub const DEFAULT_MODEL_ID: &str = "anthropic.claude-3-haiku-20240307-v1:0";

/// Default AWS region for Bedrock.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default assistant persona.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are DrVibe, a helpful and engaging AI assistant. \
Keep your responses conversational, natural, and concise as this is a voice conversation. \
Respond as if you're having a friendly chat.";

pub const DEFAULT_MAX_TOKENS: u32 = 500;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_TOP_P: f32 = 0.9;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Settings for the remote completion model and its gateway.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    /// Bedrock model identifier
    pub model_id: String,
    /// AWS region hosting the model
    pub region: String,
    /// Explicit AWS access key (default credential chain when absent)
    #[serde(default)]
    pub aws_access_key_id: Option<String>,
    /// Explicit AWS secret key
    #[serde(default)]
    pub aws_secret_access_key: Option<String>,
    /// Optional session token for temporary credentials
    #[serde(default)]
    pub aws_session_token: Option<String>,
    /// System instruction sent with every request
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    /// Upper bound on a single completion call
    pub timeout_secs: u64,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model_id: DEFAULT_MODEL_ID.to_string(),
            region: DEFAULT_REGION.to_string(),
            aws_access_key_id: None,
            aws_secret_access_key: None,
            aws_session_token: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            top_p: DEFAULT_TOP_P,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl CompletionConfig {
    /// True when both halves of an explicit key pair are present.
    pub fn has_explicit_credentials(&self) -> bool {
        self.aws_access_key_id.is_some() && self.aws_secret_access_key.is_some()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
