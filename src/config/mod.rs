//! Configuration module for the Voxhire agent
//!
//! Configuration is assembled from three sources: YAML files, environment
//! variables, and `.env` values loaded by the binary. Priority:
//! YAML > ENV vars > defaults.
//!
//! # Example
//! ```rust,no_run
//! use voxhire::config::ServerConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = ServerConfig::from_env()?;
//!
//! // Load from YAML file with environment variable fallback
//! let config_path = PathBuf::from("config.yaml");
//! let config = ServerConfig::from_file(&config_path)?;
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::warn;

use crate::errors::app_error::{AppError, AppResult};
use crate::utils::url_validation::validate_service_url;

mod yaml;

pub use yaml::{load_yaml_config, YamlConfig};

/// Default ordered TTS fallback chain
pub const DEFAULT_TTS_CHAIN: &[&str] = &["openai", "elevenlabs"];

/// Default ordered STT fallback chain
pub const DEFAULT_STT_CHAIN: &[&str] = &["openai", "deepgram"];

/// Server configuration
///
/// Contains everything needed to run the interview agent:
/// - LiveKit room service settings (url, credentials, retry policy)
/// - Provider API keys (OpenAI, ElevenLabs, Deepgram, Anam)
/// - Speech facade chains and voice selection
/// - Interview flow tunables (question count, silence threshold)
/// - Session store location and backend push URL
#[derive(Debug, Clone)]
pub struct ServerConfig {
    // LiveKit settings
    pub livekit_url: String,
    pub livekit_api_key: Option<String>,
    pub livekit_api_secret: Option<String>,
    /// Seconds an empty room stays alive before the media service reaps it
    pub room_empty_timeout: u32,
    pub room_max_participants: u32,
    /// Remote-call retry ceiling for room service operations
    pub max_retries: u32,
    /// Base backoff delay, doubled per attempt
    pub retry_delay: Duration,

    // Provider API keys
    /// OpenAI API key for STT (Whisper), TTS and the language model
    pub openai_api_key: Option<String>,
    /// ElevenLabs API key for fallback TTS
    pub elevenlabs_api_key: Option<String>,
    /// Deepgram API key for fallback STT
    pub deepgram_api_key: Option<String>,
    /// Anam API key; when absent the avatar capability is disabled
    pub anam_api_key: Option<String>,

    // Speech facade
    /// Ordered TTS fallback chain, first entry is primary
    pub tts_chain: Vec<String>,
    /// Ordered STT fallback chain, first entry is primary
    pub stt_chain: Vec<String>,
    pub tts_voice: String,

    // Interview flow
    pub question_count: usize,
    /// Captured silence after which an in-progress answer is complete
    pub silence_threshold: Duration,
    /// How long to wait for any usable answer before counting a no-response
    pub answer_timeout: Duration,

    // Session store
    pub sessions_dir: PathBuf,

    // External backend session API (optional)
    pub backend_url: Option<String>,

    // Avatar
    pub avatar_persona_id: String,
    pub avatar_api_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            livekit_url: "ws://localhost:7880".to_string(),
            livekit_api_key: None,
            livekit_api_secret: None,
            room_empty_timeout: 3600,
            room_max_participants: 10,
            max_retries: 5,
            retry_delay: Duration::from_secs(2),
            openai_api_key: None,
            elevenlabs_api_key: None,
            deepgram_api_key: None,
            anam_api_key: None,
            tts_chain: DEFAULT_TTS_CHAIN.iter().map(|s| s.to_string()).collect(),
            stt_chain: DEFAULT_STT_CHAIN.iter().map(|s| s.to_string()).collect(),
            tts_voice: "alloy".to_string(),
            question_count: 5,
            silence_threshold: Duration::from_secs(2),
            answer_timeout: Duration::from_secs(45),
            sessions_dir: PathBuf::from("interview_sessions"),
            backend_url: None,
            avatar_persona_id: "30fa96d0-26c4-4e55-94a0-517025942e18".to_string(),
            avatar_api_url: "https://api.anam.ai/v1".to_string(),
        }
    }
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_string(key).and_then(|v| v.parse().ok())
}

fn env_list(key: &str) -> Option<Vec<String>> {
    env_string(key).map(|v| {
        v.split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    })
}

impl ServerConfig {
    /// Load configuration from environment variables only
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, with environment variables
    /// filling anything the file leaves unset
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let yaml = load_yaml_config(path)?;
        let mut config = Self::default();
        config.apply_env();
        config.apply_yaml(yaml);
        config.validate()?;
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(url) = env_string("LIVEKIT_URL") {
            self.livekit_url = url;
        }
        self.livekit_api_key = env_string("LIVEKIT_API_KEY").or(self.livekit_api_key.take());
        self.livekit_api_secret =
            env_string("LIVEKIT_API_SECRET").or(self.livekit_api_secret.take());
        self.openai_api_key = env_string("OPENAI_API_KEY").or(self.openai_api_key.take());
        self.elevenlabs_api_key =
            env_string("ELEVENLABS_API_KEY").or(self.elevenlabs_api_key.take());
        self.deepgram_api_key = env_string("DEEPGRAM_API_KEY").or(self.deepgram_api_key.take());
        self.anam_api_key = env_string("ANAM_API_KEY").or(self.anam_api_key.take());
        self.backend_url = env_string("BACKEND_URL").or(self.backend_url.take());

        if let Some(chain) = env_list("VOXHIRE_TTS_CHAIN") {
            self.tts_chain = chain;
        }
        if let Some(chain) = env_list("VOXHIRE_STT_CHAIN") {
            self.stt_chain = chain;
        }
        if let Some(voice) = env_string("VOXHIRE_TTS_VOICE") {
            self.tts_voice = voice;
        }
        if let Some(dir) = env_string("VOXHIRE_SESSIONS_DIR") {
            self.sessions_dir = PathBuf::from(dir);
        }
        if let Some(count) = env_parse::<usize>("VOXHIRE_QUESTION_COUNT") {
            self.question_count = count;
        }
        if let Some(secs) = env_parse::<f64>("VOXHIRE_SILENCE_THRESHOLD_SECS") {
            self.silence_threshold = Duration::from_secs_f64(secs);
        }
        if let Some(secs) = env_parse::<u64>("VOXHIRE_ANSWER_TIMEOUT_SECS") {
            self.answer_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = env_parse::<u32>("VOXHIRE_MAX_RETRIES") {
            self.max_retries = retries;
        }
        if let Some(secs) = env_parse::<u64>("VOXHIRE_RETRY_DELAY_SECS") {
            self.retry_delay = Duration::from_secs(secs);
        }
    }

    fn apply_yaml(&mut self, yaml: YamlConfig) {
        if let Some(livekit) = yaml.livekit {
            if let Some(url) = livekit.url {
                self.livekit_url = url;
            }
            if livekit.api_key.is_some() {
                self.livekit_api_key = livekit.api_key;
            }
            if livekit.api_secret.is_some() {
                self.livekit_api_secret = livekit.api_secret;
            }
            if let Some(timeout) = livekit.room_empty_timeout {
                self.room_empty_timeout = timeout;
            }
            if let Some(max) = livekit.room_max_participants {
                self.room_max_participants = max;
            }
            if let Some(retries) = livekit.max_retries {
                self.max_retries = retries;
            }
            if let Some(secs) = livekit.retry_delay_secs {
                self.retry_delay = Duration::from_secs(secs);
            }
        }
        if let Some(providers) = yaml.providers {
            if providers.openai_api_key.is_some() {
                self.openai_api_key = providers.openai_api_key;
            }
            if providers.elevenlabs_api_key.is_some() {
                self.elevenlabs_api_key = providers.elevenlabs_api_key;
            }
            if providers.deepgram_api_key.is_some() {
                self.deepgram_api_key = providers.deepgram_api_key;
            }
            if providers.anam_api_key.is_some() {
                self.anam_api_key = providers.anam_api_key;
            }
        }
        if let Some(speech) = yaml.speech {
            if let Some(chain) = speech.tts_chain {
                self.tts_chain = chain;
            }
            if let Some(chain) = speech.stt_chain {
                self.stt_chain = chain;
            }
            if let Some(voice) = speech.tts_voice {
                self.tts_voice = voice;
            }
        }
        if let Some(interview) = yaml.interview {
            if let Some(count) = interview.question_count {
                self.question_count = count;
            }
            if let Some(secs) = interview.silence_threshold_secs {
                self.silence_threshold = Duration::from_secs_f64(secs);
            }
            if let Some(secs) = interview.answer_timeout_secs {
                self.answer_timeout = Duration::from_secs(secs);
            }
        }
        if let Some(sessions) = yaml.sessions {
            if let Some(dir) = sessions.dir {
                self.sessions_dir = dir;
            }
        }
        if let Some(backend) = yaml.backend {
            if backend.url.is_some() {
                self.backend_url = backend.url;
            }
        }
        if let Some(avatar) = yaml.avatar {
            if let Some(persona) = avatar.persona_id {
                self.avatar_persona_id = persona;
            }
            if let Some(url) = avatar.api_url {
                self.avatar_api_url = url;
            }
        }
    }

    /// Validate the configuration
    ///
    /// LiveKit credentials are required: without them no room can be secured
    /// and no token issued, so the agent cannot run at all. Provider keys are
    /// validated lazily by the speech facade so that a partially-degraded
    /// deployment can still start with whatever chain remains.
    pub fn validate(&self) -> AppResult<()> {
        validate_service_url(&self.livekit_url, &["ws", "wss", "http", "https"])
            .map_err(|e| AppError::Configuration(format!("LIVEKIT_URL: {e}")))?;

        let mut missing = Vec::new();
        if self.livekit_api_key.is_none() {
            missing.push("LIVEKIT_API_KEY");
        }
        if self.livekit_api_secret.is_none() {
            missing.push("LIVEKIT_API_SECRET");
        }
        if !missing.is_empty() {
            return Err(AppError::Configuration(format!(
                "missing required configuration: {}",
                missing.join(", ")
            )));
        }

        if let Some(url) = &self.backend_url {
            validate_service_url(url, &["http", "https"])
                .map_err(|e| AppError::Configuration(format!("BACKEND_URL: {e}")))?;
        }

        if self.tts_chain.is_empty() || self.stt_chain.is_empty() {
            return Err(AppError::Configuration(
                "tts_chain and stt_chain must each name at least one provider".to_string(),
            ));
        }

        if self.question_count == 0 {
            return Err(AppError::Configuration(
                "question_count must be at least 1".to_string(),
            ));
        }

        if self.openai_api_key.is_none() {
            warn!("OPENAI_API_KEY not set - primary speech providers and question generation will fall back");
        }
        if self.anam_api_key.is_none() {
            warn!("ANAM_API_KEY not set - avatar will not be available");
        }

        Ok(())
    }
}
