mod base;
pub mod elevenlabs;
pub mod openai;

pub use base::{AudioData, BaseTts, BoxedTts, TtsConfig, TtsError, TtsResult};
pub use elevenlabs::{ELEVENLABS_TTS_URL, ElevenLabsTts};
pub use openai::{OPENAI_TTS_URL, OpenAiTts};

/// Factory function to create a TTS provider.
///
/// # Supported Providers
///
/// - `"openai"` - OpenAI TTS API (tts-1, tts-1-hd, gpt-4o-mini-tts)
/// - `"elevenlabs"` - ElevenLabs TTS API
pub fn create_tts_provider(provider_type: &str, config: TtsConfig) -> TtsResult<BoxedTts> {
    match provider_type.to_lowercase().as_str() {
        "openai" => Ok(Box::new(OpenAiTts::new(config)?)),
        "elevenlabs" | "eleven-labs" | "eleven_labs" => Ok(Box::new(ElevenLabsTts::new(config)?)),
        _ => Err(TtsError::InvalidConfiguration(format!(
            "Unsupported TTS provider: {provider_type}. Supported providers: openai, elevenlabs"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key() -> TtsConfig {
        TtsConfig {
            api_key: "test_key".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_tts_provider() {
        assert!(create_tts_provider("openai", config_with_key()).is_ok());
        assert!(create_tts_provider("elevenlabs", config_with_key()).is_ok());

        let invalid = create_tts_provider("invalid", config_with_key());
        assert!(invalid.is_err());
    }

    #[test]
    fn test_create_tts_provider_case_insensitive() {
        assert!(create_tts_provider("OpenAI", config_with_key()).is_ok());
        assert!(create_tts_provider("ELEVENLABS", config_with_key()).is_ok());
    }

    #[test]
    fn test_invalid_provider_error_lists_supported() {
        match create_tts_provider("hume", config_with_key()) {
            Err(TtsError::InvalidConfiguration(msg)) => {
                assert!(msg.contains("openai"));
                assert!(msg.contains("elevenlabs"));
            }
            other => panic!("Expected InvalidConfiguration error, got: {:?}", other.is_ok()),
        }
    }
}
