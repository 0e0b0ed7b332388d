use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::errors::app_error::{AppError, AppResult};

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration; anything left out
/// falls back to environment variables and then to defaults.
///
/// # Example YAML structure
/// ```yaml
/// livekit:
///   url: "ws://localhost:7880"
///   api_key: "your-api-key"
///   api_secret: "your-api-secret"
///
/// providers:
///   openai_api_key: "sk-..."
///   elevenlabs_api_key: "your-elevenlabs-key"
///   deepgram_api_key: "your-deepgram-key"
///   anam_api_key: "your-anam-key"
///
/// speech:
///   tts_chain: ["openai", "elevenlabs"]
///   stt_chain: ["openai", "deepgram"]
///
/// interview:
///   question_count: 5
///   silence_threshold_secs: 2.0
///   answer_timeout_secs: 45
///
/// sessions:
///   dir: "interview_sessions"
///
/// backend:
///   url: "http://localhost:5000"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub livekit: Option<LiveKitYaml>,
    pub providers: Option<ProvidersYaml>,
    pub speech: Option<SpeechYaml>,
    pub interview: Option<InterviewYaml>,
    pub sessions: Option<SessionsYaml>,
    pub backend: Option<BackendYaml>,
    pub avatar: Option<AvatarYaml>,
}

/// LiveKit configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LiveKitYaml {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    /// Seconds an empty room stays alive before the media service reaps it
    pub room_empty_timeout: Option<u32>,
    pub room_max_participants: Option<u32>,
    /// Remote-call retry ceiling
    pub max_retries: Option<u32>,
    /// Base backoff delay in seconds (doubled per attempt)
    pub retry_delay_secs: Option<u64>,
}

/// Provider API keys from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersYaml {
    /// OpenAI API key for STT (Whisper), TTS and the language model
    pub openai_api_key: Option<String>,
    /// ElevenLabs API key for fallback TTS
    pub elevenlabs_api_key: Option<String>,
    /// Deepgram API key for fallback STT
    pub deepgram_api_key: Option<String>,
    /// Anam API key for the visual avatar (optional capability)
    pub anam_api_key: Option<String>,
}

/// Speech facade configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SpeechYaml {
    /// Ordered TTS fallback chain, first entry is primary
    pub tts_chain: Option<Vec<String>>,
    /// Ordered STT fallback chain, first entry is primary
    pub stt_chain: Option<Vec<String>>,
    pub tts_voice: Option<String>,
}

/// Interview flow tunables from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct InterviewYaml {
    pub question_count: Option<usize>,
    /// Seconds of captured silence after which an answer is complete
    pub silence_threshold_secs: Option<f64>,
    /// Seconds to wait for any usable answer before counting a no-response
    pub answer_timeout_secs: Option<u64>,
}

/// Session store configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SessionsYaml {
    pub dir: Option<PathBuf>,
}

/// Backend session API configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct BackendYaml {
    pub url: Option<String>,
}

/// Avatar configuration from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AvatarYaml {
    pub persona_id: Option<String>,
    pub api_url: Option<String>,
}

/// Load and parse a YAML configuration file
pub fn load_yaml_config(path: &Path) -> AppResult<YamlConfig> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        AppError::Configuration(format!("cannot read config file {}: {e}", path.display()))
    })?;
    serde_yaml::from_str(&contents)
        .map_err(|e| AppError::Configuration(format!("invalid YAML in {}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_partial_yaml() {
        let yaml = r#"
livekit:
  url: "ws://localhost:7880"
  api_key: "devkey"
speech:
  tts_chain: ["openai"]
"#;
        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();
        let livekit = config.livekit.unwrap();
        assert_eq!(livekit.url.as_deref(), Some("ws://localhost:7880"));
        assert_eq!(livekit.api_key.as_deref(), Some("devkey"));
        assert!(livekit.api_secret.is_none());
        assert_eq!(config.speech.unwrap().tts_chain.unwrap(), vec!["openai"]);
        assert!(config.backend.is_none());
    }

    #[test]
    fn test_parse_empty_yaml() {
        let config: YamlConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.livekit.is_none());
        assert!(config.providers.is_none());
    }
}
