//! Base trait and shared types for text-to-speech providers

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Result type for TTS operations
pub type TtsResult<T> = Result<T, TtsError>;

/// Errors that can occur during speech synthesis
#[derive(Debug, Error)]
pub enum TtsError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("synthesis request failed: {0}")]
    RequestFailed(String),

    #[error("provider returned status {status}: {body}")]
    ProviderStatus { status: u16, body: String },

    #[error("synthesis timed out after {0:?}")]
    Timeout(Duration),
}

/// Configuration shared by all TTS providers
#[derive(Debug, Clone)]
pub struct TtsConfig {
    pub provider: String,
    pub api_key: String,
    /// Provider-specific voice identifier; each provider has its own default
    pub voice_id: Option<String>,
    /// Provider-specific model name, empty for the provider default
    pub model: String,
    pub audio_format: Option<String>,
    pub sample_rate: Option<u32>,
    /// Per-attempt request timeout
    pub timeout: Duration,
    /// Override the provider's default API endpoint (tests, proxies)
    pub endpoint: Option<String>,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            provider: String::new(),
            api_key: String::new(),
            voice_id: None,
            model: String::new(),
            audio_format: None,
            sample_rate: None,
            timeout: Duration::from_secs(20),
            endpoint: None,
        }
    }
}

/// One synthesized audio clip
#[derive(Debug, Clone)]
pub struct AudioData {
    pub data: Bytes,
    /// Encoding of `data`, e.g. "mp3" or "pcm"
    pub format: String,
    pub sample_rate: u32,
}

impl AudioData {
    /// Split the clip into fixed-size frames for streaming out to the room.
    /// The final frame may be shorter.
    pub fn frames(&self, frame_bytes: usize) -> impl Iterator<Item = Bytes> + '_ {
        let chunk = frame_bytes.max(1);
        (0..self.data.len())
            .step_by(chunk)
            .map(move |start| self.data.slice(start..(start + chunk).min(self.data.len())))
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Unified interface every TTS backend must satisfy
#[async_trait]
pub trait BaseTts: Send + Sync {
    /// Synthesize `text` into one audio clip.
    ///
    /// One call maps to one provider request; retry and fallback policy
    /// live in the speech facade, not in the backend.
    async fn synthesize(&self, text: &str) -> TtsResult<AudioData>;

    /// Stable provider name used in chain configuration and logs
    fn provider_name(&self) -> &'static str;
}

/// Boxed TTS provider for dynamic dispatch
pub type BoxedTts = Box<dyn BaseTts>;

/// Map a reqwest failure onto the TTS error taxonomy
pub(crate) fn map_request_error(err: reqwest::Error, timeout: Duration) -> TtsError {
    if err.is_timeout() {
        TtsError::Timeout(timeout)
    } else {
        TtsError::RequestFailed(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_frames_chunking() {
        let audio = AudioData {
            data: Bytes::from(vec![0u8; 2500]),
            format: "pcm".to_string(),
            sample_rate: 24000,
        };
        let frames: Vec<_> = audio.frames(960).collect();
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].len(), 960);
        assert_eq!(frames[2].len(), 580);
    }

    #[test]
    fn test_audio_frames_empty_clip() {
        let audio = AudioData {
            data: Bytes::new(),
            format: "mp3".to_string(),
            sample_rate: 24000,
        };
        assert_eq!(audio.frames(960).count(), 0);
        assert!(audio.is_empty());
    }
}
