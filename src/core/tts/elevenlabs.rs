//! ElevenLabs TTS provider implementation.
//!
//! # API Reference
//!
//! - Endpoint: `POST https://api.elevenlabs.io/v1/text-to-speech/{voice_id}`
//! - Auth: `xi-api-key` header
//! - Output: mp3 (44.1kHz) by default

use async_trait::async_trait;
use serde_json::json;

use super::base::{AudioData, BaseTts, TtsConfig, TtsError, TtsResult, map_request_error};

/// ElevenLabs TTS API base endpoint (voice id is appended per request)
pub const ELEVENLABS_TTS_URL: &str = "https://api.elevenlabs.io/v1/text-to-speech";

const DEFAULT_MODEL: &str = "eleven_turbo_v2";
/// "Rachel", the ElevenLabs default voice
const DEFAULT_VOICE: &str = "21m00Tcm4TlvDq8ikWAM";

/// ElevenLabs TTS provider
pub struct ElevenLabsTts {
    client: reqwest::Client,
    config: TtsConfig,
    url: String,
    model: String,
}

impl ElevenLabsTts {
    pub fn new(config: TtsConfig) -> TtsResult<Self> {
        if config.api_key.is_empty() {
            return Err(TtsError::AuthenticationFailed(
                "ElevenLabs API key is required".to_string(),
            ));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TtsError::InvalidConfiguration(e.to_string()))?;

        let voice = config
            .voice_id
            .clone()
            .unwrap_or_else(|| DEFAULT_VOICE.to_string());
        let base = config
            .endpoint
            .clone()
            .unwrap_or_else(|| ELEVENLABS_TTS_URL.to_string());
        let url = format!("{base}/{voice}");
        let model = if config.model.is_empty() {
            DEFAULT_MODEL.to_string()
        } else {
            config.model.clone()
        };

        Ok(Self {
            client,
            config,
            url,
            model,
        })
    }
}

#[async_trait]
impl BaseTts for ElevenLabsTts {
    async fn synthesize(&self, text: &str) -> TtsResult<AudioData> {
        let body = json!({
            "text": text,
            "model_id": self.model,
        });

        let response = self
            .client
            .post(&self.url)
            .header("xi-api-key", &self.config.api_key)
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
            format: self
                .config
                .audio_format
                .clone()
                .unwrap_or_else(|| "mp3".to_string()),
            sample_rate: self.config.sample_rate.unwrap_or(44100),
        })
    }

    fn provider_name(&self) -> &'static str {
        "elevenlabs"
    }
}
