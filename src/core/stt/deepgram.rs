//! Deepgram STT provider implementation.
//!
//! # API Reference
//!
//! - Endpoint: `POST https://api.deepgram.com/v1/listen`
//! - Auth: `Authorization: Token <api key>`
//! - Model: nova-3 with punctuation and smart formatting

use async_trait::async_trait;
use serde::Deserialize;

use super::base::{BaseStt, SttConfig, SttError, SttResult, SttTranscript, map_request_error};

/// Deepgram prerecorded STT API endpoint
pub const DEEPGRAM_STT_URL: &str = "https://api.deepgram.com/v1/listen";

const DEFAULT_MODEL: &str = "nova-3";

#[derive(Debug, Deserialize)]
struct ListenResponse {
    results: ListenResults,
}

#[derive(Debug, Deserialize)]
struct ListenResults {
    channels: Vec<Channel>,
}

#[derive(Debug, Deserialize)]
struct Channel {
    alternatives: Vec<Alternative>,
}

#[derive(Debug, Deserialize)]
struct Alternative {
    transcript: String,
    #[serde(default)]
    confidence: f32,
}

/// Deepgram STT provider using the prerecorded REST API
pub struct DeepgramStt {
    client: reqwest::Client,
    config: SttConfig,
    endpoint: String,
    model: String,
}

impl DeepgramStt {
    pub fn new(config: SttConfig) -> SttResult<Self> {
        if config.api_key.is_empty() {
            return Err(SttError::AuthenticationFailed(
                "Deepgram API key is required".to_string(),
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
            .unwrap_or_else(|| DEEPGRAM_STT_URL.to_string());

        Ok(Self {
            client,
            config,
            endpoint,
            model,
        })
    }
}

#[async_trait]
impl BaseStt for DeepgramStt {
    async fn recognize(&self, audio: &[u8]) -> SttResult<SttTranscript> {
        let punctuate = if self.config.punctuation { "true" } else { "false" };
        let response = self
            .client
            .post(&self.endpoint)
            .query(&[
                ("model", self.model.as_str()),
                ("language", self.config.language.as_str()),
                ("punctuate", punctuate),
                ("smart_format", "true"),
            ])
            .header("Authorization", format!("Token {}", self.config.api_key))
            .header("Content-Type", "audio/wav")
            .body(audio.to_vec())
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

        let parsed: ListenResponse = response
            .json()
            .await
            .map_err(|e| SttError::InvalidResponse(e.to_string()))?;

        let alternative = parsed
            .results
            .channels
            .first()
            .and_then(|c| c.alternatives.first());

        match alternative {
            Some(alt) => Ok(SttTranscript {
                text: alt.transcript.clone(),
                confidence: alt.confidence,
            }),
            // A response without alternatives means the chunk held no speech
            None => Ok(SttTranscript {
                text: String::new(),
                confidence: 0.0,
            }),
        }
    }

    fn provider_name(&self) -> &'static str {
        "deepgram"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creation_defaults() {
        let config = SttConfig {
            provider: "deepgram".to_string(),
            api_key: "test_key".to_string(),
            ..Default::default()
        };
        let stt = DeepgramStt::new(config).unwrap();
        assert_eq!(stt.model, "nova-3");
        assert_eq!(stt.provider_name(), "deepgram");
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let result = DeepgramStt::new(SttConfig::default());
        assert!(matches!(result, Err(SttError::AuthenticationFailed(_))));
    }

    #[tokio::test]
    async fn test_recognize_against_mock() {
        use wiremock::matchers::{method, query_param};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(query_param("model", "nova-3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": {
                    "channels": [{
                        "alternatives": [{
                            "transcript": "My approach to testing is incremental.",
                            "confidence": 0.97
                        }]
                    }]
                }
            })))
            .mount(&server)
            .await;

        let config = SttConfig {
            provider: "deepgram".to_string(),
            api_key: "test_key".to_string(),
            endpoint: Some(server.uri()),
            ..Default::default()
        };
        let stt = DeepgramStt::new(config).unwrap();
        let transcript = stt.recognize(&[0u8; 320]).await.unwrap();
        assert_eq!(transcript.text, "My approach to testing is incremental.");
        assert!(transcript.confidence > 0.9);
    }

    #[tokio::test]
    async fn test_recognize_empty_channels_is_silence() {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({"results": {"channels": []}})),
            )
            .mount(&server)
            .await;

        let config = SttConfig {
            provider: "deepgram".to_string(),
            api_key: "test_key".to_string(),
            endpoint: Some(server.uri()),
            ..Default::default()
        };
        let stt = DeepgramStt::new(config).unwrap();
        let transcript = stt.recognize(&[0u8; 320]).await.unwrap();
        assert!(transcript.text.is_empty());
    }
}
