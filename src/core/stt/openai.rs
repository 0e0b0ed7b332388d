//! OpenAI Whisper STT provider implementation.
//!
//! # API Reference
//!
//! - Endpoint: `POST https://api.openai.com/v1/audio/transcriptions`
//! - Models: whisper-1, gpt-4o-mini-transcribe
//! - Input: multipart form with an encoded audio file part

use async_trait::async_trait;
use serde::Deserialize;

use super::base::{BaseStt, SttConfig, SttError, SttResult, SttTranscript, map_request_error};

/// OpenAI STT API endpoint
pub const OPENAI_STT_URL: &str = "https://api.openai.com/v1/audio/transcriptions";

const DEFAULT_MODEL: &str = "whisper-1";

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

/// OpenAI Whisper STT provider using the transcription REST API
pub struct OpenAiStt {
    client: reqwest::Client,
    config: SttConfig,
    endpoint: String,
    model: String,
}

impl OpenAiStt {
    pub fn new(config: SttConfig) -> SttResult<Self> {
        if config.api_key.is_empty() {
            return Err(SttError::AuthenticationFailed(
                "OpenAI API key is required".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SttError::InvalidConfiguration(e.to_string()))?;

        let model = if config.model.is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            config.model.clone()
        };
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| OPENAI_STT_URL.to_string());

        Ok(Self {
            client,
            config,
            endpoint,
            model,
        })
    }
}

#[async_trait]
impl BaseStt for OpenAiStt {
    async fn recognize(&self, audio: &[u8]) -> SttResult<SttTranscript> {
        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| SttError::InvalidConfiguration(e.to_string()))?;

        let form = reqwest::multipart::Form::new()
            .text("model", self.model.clone())
            .text("language", self.config.language.clone())
            .part("file", part);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| map_request_error(e, self.config.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SttError::ProviderStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| SttError::InvalidResponse(e.to_string()))?;

        Ok(SttTranscript {
            text: parsed.text,
            // Whisper's REST API reports no per-utterance confidence
            confidence: 1.0,
        })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}
