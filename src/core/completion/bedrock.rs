//! Amazon Bedrock completion provider.
//!
//! Invokes an Anthropic model through the Bedrock runtime `InvokeModel`
//! operation using the AWS SDK for Rust. The whole conversation is sent as a
//! single user message whose content is the rendered prompt; the persona goes
//! into the `system` field.
//!
//! # Authentication
//!
//! AWS credentials can be provided via:
//! 1. `aws_access_key_id` / `aws_secret_access_key` in [`CompletionConfig`]
//! 2. Environment variables: `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`
//! 3. AWS credentials file (`~/.aws/credentials`)
//! 4. IAM instance profile

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_bedrockruntime::Client as BedrockClient;
use aws_sdk_bedrockruntime::config::Builder as BedrockConfigBuilder;
use aws_sdk_bedrockruntime::error::{DisplayErrorContext, SdkError};
use aws_sdk_bedrockruntime::operation::invoke_model::InvokeModelError;
use aws_sdk_bedrockruntime::primitives::Blob;
use tracing::{debug, error, info};

use super::base::{CompletionError, CompletionModel, CompletionRequest, CompletionResult};
use super::config::CompletionConfig;
use super::messages::{InvokeRequestBody, InvokeResponseBody};

/// Provider name reported in credentials and logs
const PROVIDER_NAME: &str = "voice-relay";

/// Bedrock-backed completion model.
pub struct BedrockCompletion {
    config: CompletionConfig,
    client: BedrockClient,
    request_counter: AtomicU64,
}

impl BedrockCompletion {
    /// Build the Bedrock client from configuration.
    ///
    /// Explicit credentials take precedence; otherwise the default AWS
    /// credential chain is loaded for the configured region.
    pub async fn connect(config: CompletionConfig) -> CompletionResult<Self> {
        let region = Region::new(config.region.clone());

        let client = if config.has_explicit_credentials() {
            let access_key = config.aws_access_key_id.as_deref().ok_or_else(|| {
                CompletionError::InvalidConfiguration("Missing AWS access key".into())
            })?;
            let secret_key = config.aws_secret_access_key.as_deref().ok_or_else(|| {
                CompletionError::InvalidConfiguration("Missing AWS secret key".into())
            })?;

            let credentials = Credentials::new(
                access_key,
                secret_key,
                config.aws_session_token.clone(),
                None,
                PROVIDER_NAME,
            );

            let bedrock_config = BedrockConfigBuilder::new()
                .behavior_version(BehaviorVersion::latest())
                .region(region)
                .credentials_provider(credentials)
                .build();

            BedrockClient::from_conf(bedrock_config)
        } else {
            let shared = aws_config::defaults(BehaviorVersion::latest())
                .region(region)
                .load()
                .await;
            BedrockClient::new(&shared)
        };

        info!(
            model_id = %config.model_id,
            region = %config.region,
            explicit_credentials = config.has_explicit_credentials(),
            "Bedrock completion client initialized"
        );

        Ok(Self {
            config,
            client,
            request_counter: AtomicU64::new(0),
        })
    }
}

#[async_trait]
impl CompletionModel for BedrockCompletion {
    async fn complete(&self, request: CompletionRequest) -> CompletionResult<String> {
        let request_id = self.request_counter.fetch_add(1, Ordering::Relaxed) + 1;

        let body = InvokeRequestBody::new(
            &request.system,
            &request.prompt,
            self.config.max_tokens,
            self.config.temperature,
            self.config.top_p,
        );
        let payload = serde_json::to_vec(&body).map_err(|e| {
            CompletionError::Provider(format!("Failed to serialize request body: {e}"))
        })?;

        debug!(
            request_id = request_id,
            prompt_len = request.prompt.len(),
            model_id = %self.config.model_id,
            "Invoking Bedrock model"
        );

        let response = self
            .client
            .invoke_model()
            .model_id(&self.config.model_id)
            .content_type("application/json")
            .accept("application/json")
            .body(Blob::new(payload))
            .send()
            .await
            .map_err(|e| {
                error!(request_id = request_id, error = %DisplayErrorContext(&e), "Bedrock API error");
                classify_sdk_error(e)
            })?;

        let text = InvokeResponseBody::parse(response.body.as_ref())?.first_text()?;

        debug!(
            request_id = request_id,
            reply_len = text.len(),
            "Bedrock model replied"
        );

        Ok(text)
    }

    fn name(&self) -> &str {
        &self.config.model_id
    }
}

/// Map an SDK failure onto the completion error taxonomy.
fn classify_sdk_error(err: SdkError<InvokeModelError>) -> CompletionError {
    let detail = DisplayErrorContext(&err).to_string();

    if let Some(service_err) = err.as_service_error() {
        if service_err.is_throttling_exception()
            || service_err.is_service_quota_exceeded_exception()
        {
            return CompletionError::RateLimited(detail);
        }
        return CompletionError::Provider(detail);
    }

    match err {
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) => {
            CompletionError::Network(detail)
        }
        SdkError::ResponseError(_) => CompletionError::MalformedResponse(detail),
        _ => CompletionError::Provider(detail),
    }
}
