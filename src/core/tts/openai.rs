//! OpenAI TTS provider implementation.
//!
//! # API Reference
//!
//! - Endpoint: `POST https://api.openai.com/v1/audio/speech`
//! - Models: tts-1, tts-1-hd, gpt-4o-mini-tts
//! - Voices: alloy, ash, ballad, coral, echo, fable, onyx, nova, sage, shimmer, verse
//! - Output: mp3, opus, aac, flac, wav, pcm (24kHz)

use async_trait::async_trait;
use serde_json::json;

use super::base::{AudioData, BaseTts, TtsConfig, TtsError, TtsResult, map_request_error};

/// OpenAI TTS API endpoint
pub const OPENAI_TTS_URL: &str = "https://api.openai.com/v1/audio/speech";

const DEFAULT_MODEL: &str = "tts-1";
const DEFAULT_VOICE: &str = "alloy";
const DEFAULT_FORMAT: &str = "mp3";

/// OpenAI TTS provider using the Audio Speech REST API
pub struct OpenAiTts {
    client: reqwest::Client,
    config: TtsConfig,
    endpoint: String,
    model: String,
    voice: String,
    format: String,
}

impl OpenAiTts {
    pub fn new(config: TtsConfig) -> TtsResult<Self> {
        if config.api_key.is_empty() {
            return Err(TtsError::AuthenticationFailed(
                "OpenAI API key is required".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TtsError::InvalidConfiguration(e.to_string()))?;

        let model = if config.model.is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            config.model.clone()
        };
        let voice = config
            .voice_id
            .clone()
            .unwrap_or_else(|| DEFAULT_VOICE.to_string());
        let format = config
            .audio_format
            .clone()
            .unwrap_or_else(|| DEFAULT_FORMAT.to_string());
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| OPENAI_TTS_URL.to_string());

        Ok(Self {
            client,
            config,
            endpoint,
            model,
            voice,
            format,
        })
    }

    pub fn voice(&self) -> &str {
        &self.voice
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl BaseTts for OpenAiTts {
    async fn synthesize(&self, text: &str) -> TtsResult<AudioData> {
        let body = json!({
            "model": self.model,
            "input": text,
            "voice": self.voice,
            "response_format": self.format,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| map_request_error(e, self.config.timeout))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TtsError::ProviderStatus {
                status: status.as_u16(),
                body,
            });
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| map_request_error(e, self.config.timeout))?;

        Ok(AudioData {
            data,
            format: self.format.clone(),
            // OpenAI emits 24kHz regardless of container format
            sample_rate: self.config.sample_rate.unwrap_or(24000),
        })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creation_defaults() {
        let config = TtsConfig {
            provider: "openai".to_string(),
            api_key: "test_key".to_string(),
            ..Default::default()
        };
        let tts = OpenAiTts::new(config).unwrap();
        assert_eq!(tts.model(), "tts-1");
        assert_eq!(tts.voice(), "alloy");
        assert_eq!(tts.provider_name(), "openai");
    }

    #[test]
    fn test_creation_with_overrides() {
        let config = TtsConfig {
            provider: "openai".to_string(),
            api_key: "test_key".to_string(),
            voice_id: Some("nova".to_string()),
            model: "tts-1-hd".to_string(),
            ..Default::default()
        };
        let tts = OpenAiTts::new(config).unwrap();
        assert_eq!(tts.model(), "tts-1-hd");
        assert_eq!(tts.voice(), "nova");
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let result = OpenAiTts::new(TtsConfig::default());
        assert!(matches!(result, Err(TtsError::AuthenticationFailed(_))));
    }

    #[tokio::test]
    async fn test_synthesize_against_mock() {
        use wiremock::matchers::{body_partial_json, method};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"input": "Hello"})))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3, 4]))
            .mount(&server)
            .await;

        let config = TtsConfig {
            provider: "openai".to_string(),
            api_key: "test_key".to_string(),
            endpoint: Some(server.uri()),
            ..Default::default()
        };
        let tts = OpenAiTts::new(config).unwrap();
        let audio = tts.synthesize("Hello").await.unwrap();
        assert_eq!(audio.data.len(), 4);
        assert_eq!(audio.sample_rate, 24000);
    }

    #[tokio::test]
    async fn test_synthesize_surfaces_provider_status() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let config = TtsConfig {
            provider: "openai".to_string(),
            api_key: "test_key".to_string(),
            endpoint: Some(server.uri()),
            ..Default::default()
        };
        let tts = OpenAiTts::new(config).unwrap();
        let err = tts.synthesize("Hello").await.unwrap_err();
        assert!(matches!(err, TtsError::ProviderStatus { status: 500, .. }));
    }
}
