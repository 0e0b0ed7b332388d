//! Speech facade: unified synthesis and recognition over provider chains
//!
//! The facade owns one ordered fallback chain per capability. Callers never
//! see provider errors - `synthesize` either produces audio or reports that
//! no audio could be produced, and `recognize` either yields filtered text
//! or silence. Per-provider health walks a one-way ladder
//! (untried -> active -> degraded -> abandoned); once a provider degrades,
//! later calls within the session prefer the next provider in the chain.
//!
//! Retry shapes differ deliberately: synthesis blocks further speech, so it
//! retries on a short fixed delay; recognition is fire-and-forget per audio
//! chunk, so transient errors back off exponentially up to a small cap and
//! everything else degrades to an empty result.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::core::stt::{BaseStt, SttConfig, create_stt_provider};
use crate::core::tts::{AudioData, BaseTts, TtsConfig, create_tts_provider};
use crate::core::vad::is_likely_speech;
use crate::errors::app_error::{AppError, AppResult};

/// Total chain attempts per synthesis call
pub const SYNTHESIS_ATTEMPTS: u32 = 3;
/// Fixed delay between synthesis attempts (synthesis blocks further speech,
/// so backing off exponentially would only stretch the dead air)
const SYNTHESIS_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Total chain attempts per recognition call
const RECOGNITION_ATTEMPTS: u32 = 3;
/// Base backoff for transient recognition errors, doubled per attempt
const RECOGNITION_BACKOFF_BASE: Duration = Duration::from_millis(100);
/// Cap on the recognition backoff
const RECOGNITION_BACKOFF_CAP: Duration = Duration::from_secs(2);
/// How long an overlapping speak attempt waits before being dropped
const SPEAKING_QUEUE_WAIT: Duration = Duration::from_secs(1);

/// Health of one provider in a chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderHealth {
    Untried,
    Active,
    Degraded,
    Abandoned,
}

impl ProviderHealth {
    fn on_failure(self) -> Self {
        match self {
            ProviderHealth::Degraded | ProviderHealth::Abandoned => ProviderHealth::Abandoned,
            _ => ProviderHealth::Degraded,
        }
    }

    fn usable(self) -> bool {
        !matches!(self, ProviderHealth::Abandoned)
    }

    fn preferred(self) -> bool {
        matches!(self, ProviderHealth::Untried | ProviderHealth::Active)
    }
}

struct TtsLane {
    name: String,
    backend: Arc<dyn BaseTts>,
    health: ProviderHealth,
}

struct SttLane {
    name: String,
    backend: Arc<dyn BaseStt>,
    health: ProviderHealth,
}

/// Result of one synthesis call
#[derive(Debug)]
pub enum SynthesisOutcome {
    Spoken(SpokenAudio),
    /// Empty input or an overlapping speak attempt; nothing was synthesized
    Dropped,
    /// Every provider attempt failed; no audio produced
    Unavailable,
}

#[derive(Debug)]
pub struct SpokenAudio {
    pub audio: AudioData,
    pub provider: String,
    pub fallback_used: bool,
}

/// Result of one recognition call
#[derive(Debug)]
pub enum RecognitionOutcome {
    Accepted(RecognizedUtterance),
    /// The recognizer produced text but the activity filter rejected it
    Discarded(String),
    /// No usable speech: silence, empty result, or a permanent provider error
    Silent,
}

#[derive(Debug)]
pub struct RecognizedUtterance {
    pub text: String,
    pub provider: String,
    pub confidence: f32,
}

/// Snapshot of chain health for the periodic status log
#[derive(Debug, Clone)]
pub struct SpeechHealth {
    pub tts: Vec<(String, ProviderHealth)>,
    pub stt: Vec<(String, ProviderHealth)>,
}

/// Unified speech synthesis and recognition with ordered provider fallback
pub struct SpeechRouter {
    tts_lanes: Mutex<Vec<TtsLane>>,
    stt_lanes: Mutex<Vec<SttLane>>,
    speaking: AtomicBool,
}

impl std::fmt::Debug for SpeechRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpeechRouter")
            .field("speaking", &self.speaking)
            .finish_non_exhaustive()
    }
}

impl SpeechRouter {
    /// Build both chains from configuration.
    ///
    /// Providers with no configured API key are skipped with a warning; if a
    /// whole capability ends up with zero usable providers the session must
    /// not start, because voice interaction is the product's core function.
    pub fn from_config(config: &ServerConfig) -> AppResult<Self> {
        let mut tts_lanes = Vec::new();
        for name in &config.tts_chain {
            let Some(api_key) = tts_key_for(name, config) else {
                warn!(provider = %name, "skipping TTS provider: no API key configured");
                continue;
            };
            let tts_config = TtsConfig {
                provider: name.clone(),
                api_key,
                voice_id: Some(config.tts_voice.clone()),
                ..Default::default()
            };
            match create_tts_provider(name, tts_config) {
                Ok(backend) => {
                    info!(provider = %name, "TTS provider initialized");
                    tts_lanes.push(TtsLane {
                        name: name.clone(),
                        backend: Arc::from(backend),
                        health: ProviderHealth::Untried,
                    });
                }
                Err(e) => warn!(provider = %name, error = %e, "TTS provider failed to initialize"),
            }
        }

        let mut stt_lanes = Vec::new();
        for name in &config.stt_chain {
            let Some(api_key) = stt_key_for(name, config) else {
                warn!(provider = %name, "skipping STT provider: no API key configured");
                continue;
            };
            let stt_config = SttConfig {
                provider: name.clone(),
                api_key,
                ..Default::default()
            };
            match create_stt_provider(name, stt_config) {
                Ok(backend) => {
                    info!(provider = %name, "STT provider initialized");
                    stt_lanes.push(SttLane {
                        name: name.clone(),
                        backend: Arc::from(backend),
                        health: ProviderHealth::Untried,
                    });
                }
                Err(e) => warn!(provider = %name, error = %e, "STT provider failed to initialize"),
            }
        }

        Self::from_lanes(tts_lanes, stt_lanes)
    }

    /// Build a router from pre-constructed backends (used by tests)
    pub fn with_backends(
        tts: Vec<(String, Arc<dyn BaseTts>)>,
        stt: Vec<(String, Arc<dyn BaseStt>)>,
    ) -> AppResult<Self> {
        let tts_lanes = tts
            .into_iter()
            .map(|(name, backend)| TtsLane {
                name,
                backend,
                health: ProviderHealth::Untried,
            })
            .collect();
        let stt_lanes = stt
            .into_iter()
            .map(|(name, backend)| SttLane {
                name,
                backend,
                health: ProviderHealth::Untried,
            })
            .collect();
        Self::from_lanes(tts_lanes, stt_lanes)
    }

    fn from_lanes(tts_lanes: Vec<TtsLane>, stt_lanes: Vec<SttLane>) -> AppResult<Self> {
        if tts_lanes.is_empty() {
            return Err(AppError::CapabilityUnavailable(
                "no usable TTS provider configured - cannot start voice session".into(),
            ));
        }
        if stt_lanes.is_empty() {
            return Err(AppError::CapabilityUnavailable(
                "no usable STT provider configured - cannot start voice session".into(),
            ));
        }
        Ok(Self {
            tts_lanes: Mutex::new(tts_lanes),
            stt_lanes: Mutex::new(stt_lanes),
            speaking: AtomicBool::new(false),
        })
    }

    /// Whether a synthesis call is currently outstanding
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    pub fn health(&self) -> SpeechHealth {
        SpeechHealth {
            tts: self
                .tts_lanes
                .lock()
                .iter()
                .map(|l| (l.name.clone(), l.health))
                .collect(),
            stt: self
                .stt_lanes
                .lock()
                .iter()
                .map(|l| (l.name.clone(), l.health))
                .collect(),
        }
    }

    fn pick_tts(&self) -> Option<(usize, String, Arc<dyn BaseTts>)> {
        let lanes = self.tts_lanes.lock();
        lanes
            .iter()
            .position(|l| l.health.preferred())
            .or_else(|| lanes.iter().position(|l| l.health.usable()))
            .map(|i| (i, lanes[i].name.clone(), Arc::clone(&lanes[i].backend)))
    }

    fn mark_tts(&self, index: usize, success: bool) {
        let mut lanes = self.tts_lanes.lock();
        if let Some(lane) = lanes.get_mut(index) {
            lane.health = if success {
                ProviderHealth::Active
            } else {
                let next = lane.health.on_failure();
                warn!(provider = %lane.name, health = ?next, "TTS provider demoted");
                next
            };
        }
    }

    fn pick_stt(&self) -> Option<(usize, String, Arc<dyn BaseStt>)> {
        let lanes = self.stt_lanes.lock();
        lanes
            .iter()
            .position(|l| l.health.preferred())
            .or_else(|| lanes.iter().position(|l| l.health.usable()))
            .map(|i| (i, lanes[i].name.clone(), Arc::clone(&lanes[i].backend)))
    }

    fn mark_stt(&self, index: usize, success: bool) {
        let mut lanes = self.stt_lanes.lock();
        if let Some(lane) = lanes.get_mut(index) {
            lane.health = if success {
                ProviderHealth::Active
            } else {
                let next = lane.health.on_failure();
                warn!(provider = %lane.name, health = ?next, "STT provider demoted");
                next
            };
        }
    }

    /// Synthesize one utterance.
    ///
    /// Empty or whitespace text is a no-op. While a synthesis is
    /// outstanding, a second caller waits once briefly and is then dropped
    /// with a warning rather than producing overlapping audio.
    pub async fn synthesize(&self, text: &str) -> SynthesisOutcome {
        if text.trim().is_empty() {
            debug!("empty text passed to synthesize, skipping");
            return SynthesisOutcome::Dropped;
        }

        if self.speaking.swap(true, Ordering::SeqCst) {
            warn!("already speaking, queueing one utterance briefly");
            tokio::time::sleep(SPEAKING_QUEUE_WAIT).await;
            if self.speaking.swap(true, Ordering::SeqCst) {
                warn!(text = %truncate(text, 50), "still speaking, dropping utterance");
                return SynthesisOutcome::Dropped;
            }
        }
        let _guard = SpeakingGuard(&self.speaking);

        let mut fallback_used = false;
        for attempt in 0..SYNTHESIS_ATTEMPTS {
            let Some((index, name, backend)) = self.pick_tts() else {
                break;
            };
            if index > 0 {
                fallback_used = true;
            }
            match backend.synthesize(text).await {
                Ok(audio) if !audio.is_empty() => {
                    self.mark_tts(index, true);
                    debug!(
                        provider = %name,
                        bytes = audio.data.len(),
                        "synthesis succeeded"
                    );
                    return SynthesisOutcome::Spoken(SpokenAudio {
                        audio,
                        provider: name,
                        fallback_used,
                    });
                }
                Ok(_) => {
                    warn!(provider = %name, attempt = attempt + 1, "provider returned empty audio");
                    self.mark_tts(index, false);
                }
                Err(e) => {
                    warn!(provider = %name, attempt = attempt + 1, error = %e, "synthesis failed");
                    self.mark_tts(index, false);
                }
            }
            if attempt + 1 < SYNTHESIS_ATTEMPTS {
                tokio::time::sleep(SYNTHESIS_RETRY_DELAY).await;
            }
        }

        error!(
            attempts = SYNTHESIS_ATTEMPTS,
            "no audio produced: all synthesis attempts failed"
        );
        SynthesisOutcome::Unavailable
    }

    /// Recognize one chunk of candidate audio.
    ///
    /// Transient provider errors retry with capped exponential backoff;
    /// anything else yields `Silent` so a single bad recognition never halts
    /// the interview. Non-empty results pass the activity filter before they
    /// are accepted.
    pub async fn recognize(&self, audio: &[u8]) -> RecognitionOutcome {
        if audio.is_empty() {
            return RecognitionOutcome::Silent;
        }

        let mut fallback_used = false;
        for attempt in 0..RECOGNITION_ATTEMPTS {
            let Some((index, name, backend)) = self.pick_stt() else {
                warn!("no usable STT provider remains");
                return RecognitionOutcome::Silent;
            };
            if index > 0 {
                fallback_used = true;
            }
            match backend.recognize(audio).await {
                Ok(transcript) => {
                    self.mark_stt(index, true);
                    let text = transcript.text.trim().to_string();
                    if text.is_empty() {
                        return RecognitionOutcome::Silent;
                    }
                    if is_likely_speech(&text) {
                        if fallback_used {
                            debug!(provider = %name, "recognition used fallback provider");
                        }
                        return RecognitionOutcome::Accepted(RecognizedUtterance {
                            text,
                            provider: name,
                            confidence: transcript.confidence,
                        });
                    }
                    debug!(text = %truncate(&text, 30), "speech detected but filtered");
                    return RecognitionOutcome::Discarded(text);
                }
                Err(e) if e.is_transient() && attempt + 1 < RECOGNITION_ATTEMPTS => {
                    let wait = recognition_backoff(attempt);
                    warn!(
                        provider = %name,
                        attempt = attempt + 1,
                        error = %e,
                        "transient recognition error, retrying in {wait:?}"
                    );
                    self.mark_stt(index, false);
                    tokio::time::sleep(wait).await;
                }
                Err(e) => {
                    error!(provider = %name, attempt = attempt + 1, error = %e, "recognition failed");
                    self.mark_stt(index, false);
                    return RecognitionOutcome::Silent;
                }
            }
        }
        RecognitionOutcome::Silent
    }
}

/// Clears the speaking flag when the synthesis call leaves scope, including
/// on early returns and cancellation.
struct SpeakingGuard<'a>(&'a AtomicBool);

impl Drop for SpeakingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn recognition_backoff(attempt: u32) -> Duration {
    (RECOGNITION_BACKOFF_BASE * 2u32.saturating_pow(attempt)).min(RECOGNITION_BACKOFF_CAP)
}

fn tts_key_for(provider: &str, config: &ServerConfig) -> Option<String> {
    match provider.to_lowercase().as_str() {
        "openai" => config.openai_api_key.clone(),
        "elevenlabs" | "eleven-labs" | "eleven_labs" => config.elevenlabs_api_key.clone(),
        _ => None,
    }
}

fn stt_key_for(provider: &str, config: &ServerConfig) -> Option<String> {
    match provider.to_lowercase().as_str() {
        "openai" => config.openai_api_key.clone(),
        "deepgram" => config.deepgram_api_key.clone(),
        _ => None,
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::stt::{SttError, SttResult, SttTranscript};
    use crate::core::tts::{TtsError, TtsResult};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::atomic::AtomicU32;

    struct ScriptedTts {
        calls: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl BaseTts for ScriptedTts {
        async fn synthesize(&self, _text: &str) -> TtsResult<AudioData> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(TtsError::RequestFailed("connection refused".into()))
            } else {
                Ok(AudioData {
                    data: Bytes::from_static(b"audio"),
                    format: "pcm".into(),
                    sample_rate: 24000,
                })
            }
        }

        fn provider_name(&self) -> &'static str {
            "scripted"
        }
    }

    struct ScriptedStt {
        text: &'static str,
        error: Option<fn() -> SttError>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl BaseStt for ScriptedStt {
        async fn recognize(&self, _audio: &[u8]) -> SttResult<SttTranscript> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.error {
                Some(make) => Err(make()),
                None => Ok(SttTranscript {
                    text: self.text.to_string(),
                    confidence: 0.9,
                }),
            }
        }

        fn provider_name(&self) -> &'static str {
            "scripted"
        }
    }

    fn stt_ok(text: &'static str) -> Arc<ScriptedStt> {
        Arc::new(ScriptedStt {
            text,
            error: None,
            calls: AtomicU32::new(0),
        })
    }

    fn router_with(
        tts: Vec<(&str, Arc<ScriptedTts>)>,
        stt: Vec<(&str, Arc<ScriptedStt>)>,
    ) -> SpeechRouter {
        SpeechRouter::with_backends(
            tts.into_iter()
                .map(|(n, b)| (n.to_string(), b as Arc<dyn BaseTts>))
                .collect(),
            stt.into_iter()
                .map(|(n, b)| (n.to_string(), b as Arc<dyn BaseStt>))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn test_empty_chain_is_capability_unavailable() {
        let err = SpeechRouter::with_backends(Vec::new(), Vec::new()).unwrap_err();
        assert!(matches!(err, AppError::CapabilityUnavailable(_)));
    }

    #[tokio::test]
    async fn test_empty_text_is_noop() {
        let tts = Arc::new(ScriptedTts {
            calls: AtomicU32::new(0),
            fail: false,
        });
        let router = router_with(vec![("openai", Arc::clone(&tts))], vec![("openai", stt_ok("x"))]);
        assert!(matches!(
            router.synthesize("   ").await,
            SynthesisOutcome::Dropped
        ));
        assert_eq!(tts.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_providers_failing_yields_unavailable_after_three_attempts() {
        let a = Arc::new(ScriptedTts {
            calls: AtomicU32::new(0),
            fail: true,
        });
        let b = Arc::new(ScriptedTts {
            calls: AtomicU32::new(0),
            fail: true,
        });
        let c = Arc::new(ScriptedTts {
            calls: AtomicU32::new(0),
            fail: true,
        });
        let router = router_with(
            vec![
                ("openai", Arc::clone(&a)),
                ("elevenlabs", Arc::clone(&b)),
                ("azure", Arc::clone(&c)),
            ],
            vec![("openai", stt_ok("x"))],
        );

        let outcome = router.synthesize("Hello candidate").await;
        assert!(matches!(outcome, SynthesisOutcome::Unavailable));

        let total = a.calls.load(Ordering::SeqCst)
            + b.calls.load(Ordering::SeqCst)
            + c.calls.load(Ordering::SeqCst);
        assert_eq!(total, SYNTHESIS_ATTEMPTS);
        assert!(!router.is_speaking());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fallback_to_second_provider() {
        let primary = Arc::new(ScriptedTts {
            calls: AtomicU32::new(0),
            fail: true,
        });
        let secondary = Arc::new(ScriptedTts {
            calls: AtomicU32::new(0),
            fail: false,
        });
        let router = router_with(
            vec![
                ("openai", Arc::clone(&primary)),
                ("elevenlabs", Arc::clone(&secondary)),
            ],
            vec![("openai", stt_ok("x"))],
        );

        match router.synthesize("Tell me about yourself").await {
            SynthesisOutcome::Spoken(spoken) => {
                assert!(spoken.fallback_used);
                assert_eq!(spoken.provider, "elevenlabs");
            }
            other => panic!("expected Spoken, got {other:?}"),
        }
        // Primary tried once, demoted, secondary took over
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 1);

        let health = router.health();
        assert_eq!(health.tts[0].1, ProviderHealth::Degraded);
        assert_eq!(health.tts[1].1, ProviderHealth::Active);
    }

    #[tokio::test]
    async fn test_recognize_applies_activity_filter() {
        let router = router_with(
            vec![(
                "openai",
                Arc::new(ScriptedTts {
                    calls: AtomicU32::new(0),
                    fail: false,
                }),
            )],
            vec![("openai", stt_ok("um ok yeah"))],
        );
        match router.recognize(&[1u8; 320]).await {
            RecognitionOutcome::Discarded(text) => assert_eq!(text, "um ok yeah"),
            other => panic!("expected Discarded, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_recognize_accepts_real_speech() {
        let router = router_with(
            vec![(
                "openai",
                Arc::new(ScriptedTts {
                    calls: AtomicU32::new(0),
                    fail: false,
                }),
            )],
            vec![("openai", stt_ok("I led a team of four engineers."))],
        );
        match router.recognize(&[1u8; 320]).await {
            RecognitionOutcome::Accepted(utterance) => {
                assert_eq!(utterance.text, "I led a team of four engineers.");
                assert_eq!(utterance.provider, "openai");
            }
            other => panic!("expected Accepted, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_recognize_transient_error_retries_then_falls_back() {
        let failing = Arc::new(ScriptedStt {
            text: "",
            error: Some(|| SttError::ProviderStatus {
                status: 500,
                body: "internal".into(),
            }),
            calls: AtomicU32::new(0),
        });
        let backup = stt_ok("My approach is test driven.");
        let router = router_with(
            vec![(
                "openai",
                Arc::new(ScriptedTts {
                    calls: AtomicU32::new(0),
                    fail: false,
                }),
            )],
            vec![("openai", Arc::clone(&failing)), ("deepgram", Arc::clone(&backup))],
        );

        match router.recognize(&[1u8; 320]).await {
            RecognitionOutcome::Accepted(utterance) => {
                assert_eq!(utterance.provider, "deepgram");
            }
            other => panic!("expected Accepted, got {other:?}"),
        }
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_recognize_non_transient_error_is_silent() {
        let failing = Arc::new(ScriptedStt {
            text: "",
            error: Some(|| SttError::InvalidResponse("garbage".into())),
            calls: AtomicU32::new(0),
        });
        let router = router_with(
            vec![(
                "openai",
                Arc::new(ScriptedTts {
                    calls: AtomicU32::new(0),
                    fail: false,
                }),
            )],
            vec![("openai", failing)],
        );
        assert!(matches!(
            router.recognize(&[1u8; 320]).await,
            RecognitionOutcome::Silent
        ));
    }

    #[test]
    fn test_recognition_backoff_is_capped() {
        assert_eq!(recognition_backoff(0), Duration::from_millis(100));
        assert_eq!(recognition_backoff(1), Duration::from_millis(200));
        assert_eq!(recognition_backoff(10), Duration::from_secs(2));
    }

    #[test]
    fn test_health_ladder() {
        assert_eq!(ProviderHealth::Untried.on_failure(), ProviderHealth::Degraded);
        assert_eq!(ProviderHealth::Active.on_failure(), ProviderHealth::Degraded);
        assert_eq!(ProviderHealth::Degraded.on_failure(), ProviderHealth::Abandoned);
        assert_eq!(ProviderHealth::Abandoned.on_failure(), ProviderHealth::Abandoned);
    }
}
