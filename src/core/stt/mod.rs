mod base;
pub mod deepgram;
pub mod openai;

pub use base::{
    BaseStt, BoxedStt, SttConfig, SttError, SttResult, SttTranscript, is_transient_message,
};
pub use deepgram::{DEEPGRAM_STT_URL, DeepgramStt};
pub use openai::{OPENAI_STT_URL, OpenAiStt};

/// Factory function to create STT providers by name
///
/// # Supported Providers
///
/// - `"openai"` - OpenAI Whisper STT REST API
/// - `"deepgram"` - Deepgram prerecorded STT API (nova-3)
pub fn create_stt_provider(provider: &str, config: SttConfig) -> SttResult<BoxedStt> {
    match provider.to_lowercase().as_str() {
        "openai" => Ok(Box::new(OpenAiStt::new(config)?)),
        "deepgram" => Ok(Box::new(DeepgramStt::new(config)?)),
        _ => Err(SttError::InvalidConfiguration(format!(
            "Unsupported STT provider: {provider}. Supported providers: openai, deepgram"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_key() -> SttConfig {
        SttConfig {
            api_key: "test_key".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_create_stt_provider() {
        assert!(create_stt_provider("openai", config_with_key()).is_ok());
        assert!(create_stt_provider("deepgram", config_with_key()).is_ok());
        assert!(create_stt_provider("invalid", config_with_key()).is_err());
    }

    #[test]
    fn test_create_stt_provider_case_insensitive() {
        assert!(create_stt_provider("Deepgram", config_with_key()).is_ok());
        assert!(create_stt_provider("OPENAI", config_with_key()).is_ok());
    }

    #[test]
    fn test_create_stt_provider_empty_key() {
        let result = create_stt_provider("deepgram", SttConfig::default());
        assert!(matches!(result, Err(SttError::AuthenticationFailed(_))));
    }
}
