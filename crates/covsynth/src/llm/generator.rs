//! Blocking [`TestGenerator`] over the async chat client.

use super::client::{ChatMessage, LlmClient, LlmClientError};
use super::prompt;
use crate::collaborator::{GeneratedTests, GenerationRequest, TestGenerator};
use crate::error::GenerationError;
use serde::{Deserialize, Serialize};
use tokio::runtime::Runtime;

/// Connection and sampling settings for [`LlmTestGenerator`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    /// Server base URL; `/v1/chat/completions` is appended
    pub base_url: String,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    /// Module name the generated tests import from
    pub module: String,
    pub temperature: f64,
    pub max_tokens: Option<u32>,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o".to_string(),
            api_key: None,
            module: "code_under_test".to_string(),
            temperature: 0.2,
            max_tokens: Some(4096),
        }
    }
}

/// Generates pytest code by prompting a chat completion model
#[derive(Debug)]
pub struct LlmTestGenerator {
    client: LlmClient,
    settings: LlmSettings,
    runtime: Runtime,
}

impl LlmTestGenerator {
    pub fn new(settings: LlmSettings) -> Result<Self, GenerationError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| GenerationError::other(format!("failed to start runtime: {e}")))?;
        // Per-request deadlines come from the engine via tokio::time::timeout.
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| GenerationError::other(format!("failed to build HTTP client: {e}")))?;
        let client = LlmClient::with_client(settings.base_url.clone(), settings.model.clone(), http)
            .with_api_key(settings.api_key.clone());
        Ok(Self {
            client,
            settings,
            runtime,
        })
    }

    #[must_use]
    pub const fn settings(&self) -> &LlmSettings {
        &self.settings
    }
}

impl TestGenerator for LlmTestGenerator {
    fn generate(&mut self, request: &GenerationRequest<'_>) -> Result<GeneratedTests, GenerationError> {
        let (system, user) = prompt::build(request, &self.settings.module);
        let messages = vec![ChatMessage::system(system), ChatMessage::user(user)];
        tracing::debug!(
            iteration = request.iteration,
            attempt = request.attempt,
            model = %self.settings.model,
            "requesting tests"
        );

        let call = self.client.chat_completion(
            messages,
            Some(self.settings.temperature),
            self.settings.max_tokens,
        );
        let response = self
            .runtime
            .block_on(async { tokio::time::timeout(request.timeout, call).await })
            .map_err(|_| GenerationError::Timeout {
                seconds: request.timeout.as_secs(),
            })?
            .map_err(classify)?;

        let code = prompt::extract_code(response.content().unwrap_or_default());
        if code.is_empty() {
            return Err(GenerationError::EmptyOutput);
        }
        Ok(GeneratedTests::new(code))
    }
}

/// Maps client failures onto the retryable/non-retryable taxonomy
fn classify(err: LlmClientError) -> GenerationError {
    match err {
        LlmClientError::ApiError { status: 429, body } => GenerationError::RateLimited { message: body },
        LlmClientError::ApiError { status, body } if status >= 500 => {
            GenerationError::Upstream { status, body }
        }
        LlmClientError::ApiError { status, body } => GenerationError::Rejected { status, body },
        LlmClientError::Http(e) if e.is_decode() => {
            GenerationError::other(format!("malformed completion response: {e}"))
        }
        LlmClientError::Http(e) => GenerationError::transport(e.to_string()),
    }
}
