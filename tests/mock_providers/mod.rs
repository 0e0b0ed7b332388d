//! Shared mock backends for integration tests

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

use voxhire::core::stt::{BaseStt, SttResult, SttTranscript};
use voxhire::core::tts::{AudioData, BaseTts, TtsResult};
use voxhire::errors::app_error::AppResult;
use voxhire::livekit::{
    EnsuredRoom, ParticipantSummary, RoomDetails, RoomLifecycle, TokenRequest,
};

/// Room service double: first ensure creates, later ensures report the room
/// as pre-existing; deletes are idempotent.
#[derive(Default)]
pub struct MockRoomService {
    pub ensure_calls: AtomicU32,
    pub delete_calls: AtomicU32,
    pub token_calls: AtomicU32,
}

#[async_trait]
impl RoomLifecycle for MockRoomService {
    async fn ensure_room(
        &self,
        room_name: &str,
        _empty_timeout: u32,
        _max_participants: u32,
    ) -> AppResult<EnsuredRoom> {
        let call = self.ensure_calls.fetch_add(1, Ordering::SeqCst);
        Ok(EnsuredRoom {
            room_name: room_name.to_string(),
            room_sid: "RM_mock".to_string(),
            already_existed: call > 0,
        })
    }

    async fn delete_room(&self, _room_name: &str) -> AppResult<()> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn list_participants(&self, _room_name: &str) -> Vec<ParticipantSummary> {
        Vec::new()
    }

    async fn room_info(&self, _room_name: &str) -> Option<RoomDetails> {
        None
    }

    fn issue_token(&self, request: TokenRequest<'_>) -> AppResult<String> {
        self.token_calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("mock-token-{}-{}", request.role, request.identity))
    }
}

/// TTS double producing a tiny fixed clip instantly
pub struct InstantTts {
    pub calls: AtomicU32,
}

impl InstantTts {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
        })
    }
}

#[async_trait]
impl BaseTts for InstantTts {
    async fn synthesize(&self, _text: &str) -> TtsResult<AudioData> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AudioData {
            data: Bytes::from_static(b"pcm-frames"),
            format: "pcm".to_string(),
            sample_rate: 24000,
        })
    }

    fn provider_name(&self) -> &'static str {
        "instant"
    }
}

/// STT double returning scripted utterances in order, then silence
pub struct ScriptedStt {
    responses: Mutex<VecDeque<String>>,
}

impl ScriptedStt {
    pub fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
        })
    }
}

#[async_trait]
impl BaseStt for ScriptedStt {
    async fn recognize(&self, _audio: &[u8]) -> SttResult<SttTranscript> {
        let text = self.responses.lock().pop_front().unwrap_or_default();
        Ok(SttTranscript {
            text,
            confidence: 0.95,
        })
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }
}
