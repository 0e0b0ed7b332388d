//! Language-model capability
//!
//! Question generation and summaries go through this opaque capability:
//! `generate(prompt) -> text`. The interview must keep moving when the model
//! is slow or down, so `LlmHandle::generate_or` retries exactly once after a
//! short delay and then substitutes a deterministic canned response - the
//! candidate always hears something.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

/// Spoken when the model cannot be reached at all
pub const SERVICE_UNAVAILABLE_MESSAGE: &str = "I'm sorry, AI services are currently unavailable. \
     Please try again later or contact support for assistance.";

/// Delay before the single retry
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Result type for language model operations
pub type LlmResult<T> = Result<T, LlmError>;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("completion request failed: {0}")]
    RequestFailed(String),

    #[error("provider returned status {status}: {body}")]
    ProviderStatus { status: u16, body: String },

    #[error("model returned an empty completion")]
    EmptyCompletion,

    #[error("completion timed out after {0:?}")]
    Timeout(Duration),
}

/// The opaque text-generation capability
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> LlmResult<String>;

    fn model_name(&self) -> &str;
}

/// OpenAI chat completion endpoint
pub const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// OpenAI-backed language model
pub struct OpenAiLlm {
    client: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
    timeout: Duration,
}

impl OpenAiLlm {
    pub fn new(api_key: impl Into<String>) -> LlmResult<Self> {
        Self::with_endpoint(api_key, OPENAI_CHAT_URL)
    }

    pub fn with_endpoint(api_key: impl Into<String>, endpoint: impl Into<String>) -> LlmResult<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(LlmError::AuthenticationFailed(
                "OpenAI API key is required".to_string(),
            ));
        }
        let timeout = Duration::from_secs(30);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;
        Ok(Self {
            client,
            api_key,
            model: DEFAULT_MODEL.to_string(),
            endpoint: endpoint.into(),
            timeout,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiLlm {
    async fn generate(&self, prompt: &str) -> LlmResult<String> {
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(self.timeout)
                } else {
                    LlmError::RequestFailed(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ProviderStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| LlmError::RequestFailed(e.to_string()))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        if text.trim().is_empty() {
            return Err(LlmError::EmptyCompletion);
        }
        Ok(text)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Generated text plus whether the canned fallback was used
#[derive(Debug, Clone)]
pub struct GeneratedText {
    pub text: String,
    pub degraded: bool,
}

/// Handle the interview logic talks to.
///
/// Wraps an optional backend: a deployment without a model key still runs,
/// every generation just resolves to its caller-supplied fallback.
#[derive(Clone)]
pub struct LlmHandle {
    backend: Option<Arc<dyn LanguageModel>>,
}

impl LlmHandle {
    pub fn new(backend: Arc<dyn LanguageModel>) -> Self {
        Self {
            backend: Some(backend),
        }
    }

    pub fn disabled() -> Self {
        Self { backend: None }
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    /// Generate text, retrying once after a short delay, then falling back
    /// to the supplied deterministic response.
    pub async fn generate_or(&self, prompt: &str, fallback: &str) -> GeneratedText {
        let Some(backend) = &self.backend else {
            return GeneratedText {
                text: fallback.to_string(),
                degraded: true,
            };
        };

        match backend.generate(prompt).await {
            Ok(text) => {
                return GeneratedText {
                    text,
                    degraded: false,
                };
            }
            Err(e) => {
                warn!(model = backend.model_name(), error = %e, "generation failed, retrying once");
            }
        }

        tokio::time::sleep(RETRY_DELAY).await;

        match backend.generate(prompt).await {
            Ok(text) => {
                debug!(model = backend.model_name(), "generation retry succeeded");
                GeneratedText {
                    text,
                    degraded: false,
                }
            }
            Err(e) => {
                warn!(model = backend.model_name(), error = %e, "generation retry failed, using fallback");
                GeneratedText {
                    text: fallback.to_string(),
                    degraded: true,
                }
            }
        }
    }

    /// Generate text or report failure after the single retry; used where
    /// the caller substitutes something structured rather than a sentence.
    pub async fn try_generate(&self, prompt: &str) -> Option<String> {
        let backend = self.backend.as_ref()?;
        match backend.generate(prompt).await {
            Ok(text) => return Some(text),
            Err(e) => {
                warn!(model = backend.model_name(), error = %e, "generation failed, retrying once");
            }
        }
        tokio::time::sleep(RETRY_DELAY).await;
        match backend.generate(prompt).await {
            Ok(text) => Some(text),
            Err(e) => {
                warn!(model = backend.model_name(), error = %e, "generation retry failed");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyModel {
        calls: AtomicU32,
        succeed_on: u32,
    }

    #[async_trait]
    impl LanguageModel for FlakyModel {
        async fn generate(&self, _prompt: &str) -> LlmResult<String> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.succeed_on {
                Ok("generated".to_string())
            } else {
                Err(LlmError::RequestFailed("connection reset".into()))
            }
        }

        fn model_name(&self) -> &str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn test_disabled_handle_uses_fallback() {
        let handle = LlmHandle::disabled();
        let out = handle.generate_or("prompt", "canned").await;
        assert!(out.degraded);
        assert_eq!(out.text, "canned");
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_once_then_succeed() {
        let model = Arc::new(FlakyModel {
            calls: AtomicU32::new(0),
            succeed_on: 2,
        });
        let handle = LlmHandle::new(Arc::clone(&model) as Arc<dyn LanguageModel>);
        let out = handle.generate_or("prompt", "canned").await;
        assert!(!out.degraded);
        assert_eq!(out.text, "generated");
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_after_two_failures() {
        let model = Arc::new(FlakyModel {
            calls: AtomicU32::new(0),
            succeed_on: 10,
        });
        let handle = LlmHandle::new(Arc::clone(&model) as Arc<dyn LanguageModel>);
        let out = handle.generate_or("prompt", "canned").await;
        assert!(out.degraded);
        assert_eq!(out.text, "canned");
        // one retry, no more
        assert_eq!(model.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_empty_api_key_rejected() {
        assert!(matches!(
            OpenAiLlm::new(""),
            Err(LlmError::AuthenticationFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_openai_llm_against_mock() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "choices": [{"message": {"content": "1. Tell me about your last project?"}}]
            })))
            .mount(&server)
            .await;

        let llm = OpenAiLlm::with_endpoint("test_key", server.uri()).unwrap();
        let text = llm.generate("generate one question").await.unwrap();
        assert!(text.contains("last project"));
    }
}
