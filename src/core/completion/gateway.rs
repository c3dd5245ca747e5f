//! Completion gateway.
//!
//! Wraps a [`CompletionModel`] with the relay's failure policy: a single
//! attempt per user turn, bounded by a deadline, with every failure (timeout,
//! provider error, malformed body, even a panicking provider) absorbed into
//! [`FALLBACK_RESPONSE`]. Callers always receive text they can append to the
//! conversation and speak to the user.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::{info, warn};

use super::base::{CompletionError, CompletionRequest, CompletionResult, SharedCompletionModel};

/// Reply substituted for any failed completion.
pub const FALLBACK_RESPONSE: &str =
    "I'm sorry, I'm having trouble processing your request right now. Could you please try again?";

/// Single-attempt completion invoker with fallback.
#[derive(Clone)]
pub struct CompletionGateway {
    model: SharedCompletionModel,
    timeout: Duration,
    system_prompt: Arc<str>,
}

impl CompletionGateway {
    pub fn new(model: SharedCompletionModel, system_prompt: &str, timeout: Duration) -> Self {
        Self {
            model,
            timeout,
            system_prompt: Arc::from(system_prompt),
        }
    }

    /// Default system instruction for this gateway.
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn model_name(&self) -> &str {
        self.model.name()
    }

    /// Invoke the model once. Never fails: errors become the fallback text.
    pub async fn invoke(&self, prompt: &str, system_instruction: &str) -> String {
        match self.try_invoke(prompt, system_instruction).await {
            Ok(text) => text,
            Err(e) => {
                warn!(model = %self.model.name(), error = %e, "Completion failed, using fallback reply");
                FALLBACK_RESPONSE.to_string()
            }
        }
    }

    /// Invoke the model once and report the outcome.
    pub async fn try_invoke(
        &self,
        prompt: &str,
        system_instruction: &str,
    ) -> CompletionResult<String> {
        let request = CompletionRequest::new(system_instruction, prompt);
        let call = AssertUnwindSafe(self.model.complete(request)).catch_unwind();

        let started = std::time::Instant::now();
        let outcome = match tokio::time::timeout(self.timeout, call).await {
            Err(_) => Err(CompletionError::Timeout(self.timeout.as_secs())),
            Ok(Err(_panic)) => Err(CompletionError::Provider(
                "completion provider panicked".to_string(),
            )),
            Ok(Ok(result)) => result,
        };

        if outcome.is_ok() {
            info!(
                model = %self.model.name(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Completion succeeded"
            );
        }
        outcome
    }
}
