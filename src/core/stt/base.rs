//! Base trait and shared types for speech-to-text providers

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Result type for STT operations
pub type SttResult<T> = Result<T, SttError>;

/// Errors that can occur during speech recognition
#[derive(Debug, Error)]
pub enum SttError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("recognition request failed: {0}")]
    RequestFailed(String),

    #[error("provider returned status {status}: {body}")]
    ProviderStatus { status: u16, body: String },

    #[error("recognition timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected provider response: {0}")]
    InvalidResponse(String),
}

/// Markers that classify a provider failure as worth retrying.
/// The list is fixed: anything not matching is treated as permanent for the
/// current call and degrades to an empty recognition instead of halting the
/// interview.
const TRANSIENT_MARKERS: &[&str] = &[
    "timeout",
    "timed out",
    "rate limit",
    "too many requests",
    "connection",
    "network",
    "server error",
    "internal",
    "temporarily",
    "unavailable",
];

/// Keyword classifier for error text from providers that only hand back a
/// message string.
pub fn is_transient_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    TRANSIENT_MARKERS.iter().any(|marker| lower.contains(marker))
}

impl SttError {
    /// Whether this failure should be retried with backoff before the
    /// fallback chain advances.
    pub fn is_transient(&self) -> bool {
        match self {
            SttError::Timeout(_) => true,
            SttError::ProviderStatus { status, .. } => *status == 429 || *status >= 500,
            SttError::RequestFailed(msg) => is_transient_message(msg),
            SttError::AuthenticationFailed(_)
            | SttError::InvalidConfiguration(_)
            | SttError::InvalidResponse(_) => false,
        }
    }
}

/// Configuration shared by all STT providers
#[derive(Debug, Clone)]
pub struct SttConfig {
    pub provider: String,
    pub api_key: String,
    pub language: String,
    /// Provider-specific model name, empty for the provider default
    pub model: String,
    pub sample_rate: u32,
    pub punctuation: bool,
    /// Per-attempt request timeout
    pub timeout: Duration,
    /// Override the provider's default API endpoint (tests, proxies)
    pub endpoint: Option<String>,
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            api_key: String::new(),
            language: "en".to_string(),
            model: String::new(),
            sample_rate: 16000,
            punctuation: true,
            timeout: Duration::from_secs(20),
            endpoint: None,
        }
    }
}

/// One recognition result
#[derive(Debug, Clone)]
pub struct SttTranscript {
    pub text: String,
    /// Provider confidence, 1.0 when the provider does not report one
    pub confidence: f32,
}

/// Unified interface every STT backend must satisfy
#[async_trait]
pub trait BaseStt: Send + Sync {
    /// Recognize one chunk of encoded audio into text.
    ///
    /// An empty transcript is a valid result (silence); retry and fallback
    /// policy live in the speech facade, not in the backend.
    async fn recognize(&self, audio: &[u8]) -> SttResult<SttTranscript>;

    /// Stable provider name used in chain configuration and logs
    fn provider_name(&self) -> &'static str;
}

/// Boxed STT provider for dynamic dispatch
pub type BoxedStt = Box<dyn BaseStt>;

/// Map a reqwest failure onto the STT error taxonomy
pub(crate) fn map_request_error(err: reqwest::Error, timeout: Duration) -> SttError {
    if err.is_timeout() {
        SttError::Timeout(timeout)
    } else {
        SttError::RequestFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification_by_status() {
        assert!(
            SttError::ProviderStatus {
                status: 500,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            SttError::ProviderStatus {
                status: 429,
                body: String::new()
            }
            .is_transient()
        );
        assert!(
            !SttError::ProviderStatus {
                status: 401,
                body: String::new()
            }
            .is_transient()
        );
    }

    #[test]
    fn test_transient_classification_by_message() {
        assert!(SttError::RequestFailed("connection reset by peer".into()).is_transient());
        assert!(SttError::RequestFailed("rate limit exceeded".into()).is_transient());
        assert!(!SttError::RequestFailed("invalid audio encoding".into()).is_transient());
    }

    #[test]
    fn test_auth_errors_never_transient() {
        assert!(!SttError::AuthenticationFailed("bad key".into()).is_transient());
        assert!(!SttError::InvalidConfiguration("no model".into()).is_transient());
    }

    #[test]
    fn test_timeout_is_transient() {
        assert!(SttError::Timeout(Duration::from_secs(20)).is_transient());
    }
}
