//! Session orchestrator
//!
//! One orchestrator drives one interview room end to end: it secures the
//! room and tokens, brings up the speech facade, attaches the avatar
//! best-effort, walks the interview state machine, and guarantees that the
//! session record reaches a terminal status. Concurrency follows one rule:
//! everything spawned for a session hangs off that session's cancellation
//! token, and the transcript store is the only cross-task rendezvous.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::avatar::{AvatarClient, AvatarStatus, AvatarSupervisor};
use crate::backend::BackendClient;
use crate::config::ServerConfig;
use crate::core::llm::{LlmHandle, OpenAiLlm};
use crate::core::speech::{RecognitionOutcome, SpeechRouter, SynthesisOutcome};
use crate::errors::app_error::{AppError, AppResult};
use crate::livekit::{AccessManager, Role, RoomLifecycle, TokenRequest};
use crate::media::{AUDIO_FRAME_BYTES, MediaLink};
use crate::session::{EntryKind, NewSession, Session, SessionStatus, SessionStore, TranscriptEntry};

use super::machine::{AdvanceResult, InterviewMachine};
use super::questions::{analyze_documents, build_final_assessment_prompt, generate_questions};
use super::registry::RoomRegistry;

/// Spoken immediately after the room stabilizes
pub const GREETING_TEXT: &str =
    "Hello! I'm your interviewer today. It's great to meet you. Are you ready to begin?";

/// Spoken when a question times out with nothing usable captured
const MOVE_ON_TEXT: &str = "That's alright, let's move on to the next question.";

/// Spoken when finalization is refused for lack of candidate responses
const INCOMPLETE_INTERVIEW_TEXT: &str =
    "The interview appears to be incomplete with very limited candidate responses. \
     I recommend continuing the interview for a better evaluation, or an explicit \
     override can finalize it with the available data.";

/// Substituted when the final assessment cannot be generated
const ASSESSMENT_FALLBACK_TEXT: &str =
    "A detailed AI assessment is unavailable at this time. The interview has been \
     recorded in full and the transcript is available for manual review.";

/// Spoken as the interview closes
const CLOSING_TEXT: &str =
    "Thank you for participating in this interview. The interview is now complete and \
     your responses have been saved for review. Thank you for your time and candor.";

/// Join token lifetime for freshly secured rooms
const TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Cadence of the periodic session status log
const STATUS_INTERVAL: Duration = Duration::from_secs(30);

/// How one interview run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed { summary_degraded: bool },
    /// Finalization refused; the session stays non-terminal
    Incomplete { candidate_entries: usize },
}

enum AnswerCollection {
    Answered,
    NoResponse,
    ChannelClosed,
}

/// Wires the per-session component stack into one cooperating unit
pub struct Orchestrator {
    config: ServerConfig,
    store: Arc<SessionStore>,
    rooms: Arc<dyn RoomLifecycle>,
    speech: Arc<SpeechRouter>,
    llm: LlmHandle,
    avatar: Option<Arc<dyn AvatarClient>>,
    backend: Option<Arc<BackendClient>>,
    registry: Arc<RoomRegistry>,
}

impl Orchestrator {
    /// Build the production stack from configuration.
    ///
    /// Fails fast on anything the session could never recover from: missing
    /// room credentials, or a speech capability with no provider at all.
    pub fn from_config(config: ServerConfig) -> AppResult<Self> {
        let store = Arc::new(SessionStore::new(&config.sessions_dir)?);
        let rooms: Arc<dyn RoomLifecycle> = Arc::new(AccessManager::new(&config)?);
        let speech = Arc::new(SpeechRouter::from_config(&config)?);

        let llm = match &config.openai_api_key {
            Some(key) => match OpenAiLlm::new(key.clone()) {
                Ok(model) => LlmHandle::new(Arc::new(model)),
                Err(e) => {
                    warn!(error = %e, "language model unavailable, canned responses only");
                    LlmHandle::disabled()
                }
            },
            None => LlmHandle::disabled(),
        };

        let avatar = config.anam_api_key.as_ref().and_then(|key| {
            match crate::avatar::AnamAvatar::new(
                config.avatar_api_url.as_str(),
                key.as_str(),
                config.avatar_persona_id.as_str(),
            ) {
                Ok(client) => Some(Arc::new(client) as Arc<dyn AvatarClient>),
                Err(e) => {
                    warn!(error = %e, "avatar unavailable for this deployment");
                    None
                }
            }
        });

        let backend = config
            .backend_url
            .clone()
            .map(|url| Arc::new(BackendClient::new(url)));

        Ok(Self {
            config,
            store,
            rooms,
            speech,
            llm,
            avatar,
            backend,
            registry: Arc::new(RoomRegistry::new()),
        })
    }

    /// Assemble an orchestrator from pre-built parts (tests, embedders)
    #[allow(clippy::too_many_arguments)]
    pub fn with_dependencies(
        config: ServerConfig,
        store: Arc<SessionStore>,
        rooms: Arc<dyn RoomLifecycle>,
        speech: Arc<SpeechRouter>,
        llm: LlmHandle,
        avatar: Option<Arc<dyn AvatarClient>>,
        backend: Option<Arc<BackendClient>>,
    ) -> Self {
        Self {
            config,
            store,
            rooms,
            speech,
            llm,
            avatar,
            backend,
            registry: Arc::new(RoomRegistry::new()),
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Create a session record, secure its room, and issue both join
    /// tokens. On any failure the partial work is undone so no orphan
    /// session or room is left behind.
    pub async fn create_complete_session(&self, profile: NewSession) -> AppResult<Session> {
        let mut session = self.store.create(profile).await?;

        let ensured = match self
            .rooms
            .ensure_room(
                &session.room_name,
                self.config.room_empty_timeout,
                self.config.room_max_participants,
            )
            .await
        {
            Ok(ensured) => ensured,
            Err(e) => {
                error!(session_id = %session.session_id, error = %e, "room creation failed");
                let _ = self.store.delete(&session.session_id).await;
                return Err(e);
            }
        };
        session.room_sid = Some(ensured.room_sid);

        match self.issue_token_pair(&session) {
            Ok((candidate, agent)) => {
                session.candidate_token = Some(candidate);
                session.agent_token = Some(agent);
            }
            Err(e) => {
                error!(session_id = %session.session_id, error = %e, "token generation failed");
                let _ = self.rooms.delete_room(&session.room_name).await;
                let _ = self.store.delete(&session.session_id).await;
                return Err(e);
            }
        }

        session.status = SessionStatus::Ready;
        self.store.save(&mut session).await?;
        info!(session_id = %session.session_id, room = %session.room_name, "session ready");
        Ok(session)
    }

    /// Delete the room and the session record
    pub async fn cleanup_session(&self, session_id: &str) -> AppResult<()> {
        let session = self.store.load(session_id).await?;
        self.rooms.delete_room(&session.room_name).await?;
        self.store.delete(session_id).await?;
        Ok(())
    }

    /// Run one interview session to a terminal state.
    ///
    /// `override_incomplete` finalizes even when fewer than the required
    /// candidate responses were captured.
    pub async fn run_session(
        &self,
        session_id: &str,
        mut media: MediaLink,
        override_incomplete: bool,
    ) -> AppResult<SessionOutcome> {
        let mut session = self.store.load(session_id).await?;
        if session.status.is_terminal() {
            return Err(AppError::Validation(format!(
                "session {session_id} is already {}",
                session.status
            )));
        }

        // One room, one live session
        let _claim = self
            .registry
            .claim(&session.room_name, &session.session_id)?;

        // Secure room and tokens; this is the only fatal setup step
        match self
            .rooms
            .ensure_room(
                &session.room_name,
                self.config.room_empty_timeout,
                self.config.room_max_participants,
            )
            .await
        {
            Ok(ensured) => {
                session.room_sid = Some(ensured.room_sid);
                if ensured.already_existed {
                    info!(room = %session.room_name, "joined pre-existing room");
                }
            }
            Err(e) => {
                error!(session_id, error = %e, "room setup failed, marking session failed");
                self.mark_failed(session_id).await;
                return Err(e);
            }
        }

        if session.candidate_token.is_none() || session.agent_token.is_none() {
            match self.issue_token_pair(&session) {
                Ok((candidate, agent)) => {
                    session.candidate_token = Some(candidate);
                    session.agent_token = Some(agent);
                }
                Err(e) => {
                    error!(session_id, error = %e, "token setup failed, marking session failed");
                    self.mark_failed(session_id).await;
                    return Err(e);
                }
            }
        }

        if session.status == SessionStatus::Created {
            session.status = SessionStatus::Ready;
        }
        if let Err(e) = self.store.save(&mut session).await {
            warn!(session_id, error = %e, "session persistence degraded, continuing in memory");
        }

        // Everything spawned below dies with this token
        let cancel = CancellationToken::new();
        let _cancel_guard = cancel.clone().drop_guard();

        let (avatar_status, avatar_task) = match &self.avatar {
            Some(client) => {
                let (status, task) = AvatarSupervisor::spawn(
                    Arc::clone(client),
                    session.room_name.clone(),
                    cancel.child_token(),
                );
                (Some(status), Some(task))
            }
            None => {
                info!("avatar not configured for this deployment");
                (None, None)
            }
        };

        let status_task = tokio::spawn(status_loop(
            Arc::clone(&self.rooms),
            session.room_name.clone(),
            avatar_status,
            Arc::clone(&self.speech),
            cancel.child_token(),
        ));

        let result = self
            .drive_interview(&mut session, &mut media, override_incomplete)
            .await;

        cancel.cancel();
        if let Some(task) = avatar_task {
            let _ = task.await;
        }
        let _ = status_task.await;

        result
    }

    /// The interview itself: questions in, answers accumulated, terminal
    /// status out.
    async fn drive_interview(
        &self,
        session: &mut Session,
        media: &mut MediaLink,
        override_incomplete: bool,
    ) -> AppResult<SessionOutcome> {
        if session.questions.is_empty() {
            let (questions, degraded) = generate_questions(
                &self.llm,
                &session.jd_full,
                &session.resume_full,
                self.config.question_count,
            )
            .await;
            if degraded {
                info!("interviewing with fallback question set");
            }
            session.questions = questions;
            if let Err(e) = self.store.save(session).await {
                warn!(error = %e, "question persistence degraded, continuing in memory");
            }
        } else {
            info!(count = session.questions.len(), "using cached questions");
        }

        if session.analysis.is_none() && self.llm.is_available() {
            session.analysis =
                Some(analyze_documents(&self.llm, &session.jd_full, &session.resume_full).await);
            if let Err(e) = self.store.save(session).await {
                warn!(error = %e, "analysis persistence degraded, continuing in memory");
            }
        }

        let mut machine =
            InterviewMachine::new(session.questions.clone(), self.config.silence_threshold);

        self.say(session, media, GREETING_TEXT, EntryKind::Greeting)
            .await;

        self.transition(session, SessionStatus::Interviewing).await;
        self.push_backend(session).await;

        while let Some(question) = machine.ask_current() {
            let spoken = format!("Question {}: {}", question.id, question.text);
            self.say(session, media, &spoken, EntryKind::Question).await;

            match self.collect_answer(&mut machine, session, media).await {
                AnswerCollection::Answered => {
                    machine.note_usable_answer();
                    info!(
                        question = question.id,
                        answer_chars = machine.current_answer().len(),
                        "answer captured"
                    );
                }
                AnswerCollection::NoResponse => {
                    let at_ceiling = machine.note_no_response();
                    if at_ceiling {
                        info!(question = question.id, "proceeding past unanswered questions");
                    }
                    self.say(session, media, MOVE_ON_TEXT, EntryKind::Message)
                        .await;
                }
                AnswerCollection::ChannelClosed => {
                    warn!("candidate audio stream ended, wrapping up early");
                    break;
                }
            }

            if machine.advance() == AdvanceResult::Exhausted {
                break;
            }
        }

        let candidate_entries = session.candidate_entry_count();
        if let Err(refusal) = machine.can_finalize(candidate_entries, override_incomplete) {
            warn!(%refusal, "refusing to finalize incomplete interview");
            self.say(session, media, INCOMPLETE_INTERVIEW_TEXT, EntryKind::Message)
                .await;
            self.push_backend(session).await;
            return Ok(SessionOutcome::Incomplete { candidate_entries });
        }

        let prompt = build_final_assessment_prompt(&session.questions, &session.transcript);
        let assessment = self.llm.generate_or(&prompt, ASSESSMENT_FALLBACK_TEXT).await;
        if assessment.degraded {
            warn!("final assessment degraded to canned text");
        }
        session.evaluation = Some(assessment.text.clone());
        if let Err(e) = self.store.save(session).await {
            warn!(error = %e, "assessment persistence degraded, continuing in memory");
        }

        self.say(session, media, CLOSING_TEXT, EntryKind::Message).await;
        machine.end();

        self.transition(session, SessionStatus::Completed).await;
        self.push_backend(session).await;

        info!(
            session_id = %session.session_id,
            transcript_entries = session.transcript.len(),
            "interview completed"
        );
        Ok(SessionOutcome::Completed {
            summary_degraded: assessment.degraded,
        })
    }

    /// Listen for candidate audio until the current answer completes, the
    /// per-question timeout lapses, or the media channel closes.
    async fn collect_answer(
        &self,
        machine: &mut InterviewMachine,
        session: &mut Session,
        media: &mut MediaLink,
    ) -> AnswerCollection {
        let deadline = Instant::now() + self.config.answer_timeout;
        loop {
            let now = Instant::now();
            if machine.answer_complete(now) {
                return AnswerCollection::Answered;
            }
            if now >= deadline {
                return if machine.answer_in_progress() {
                    AnswerCollection::Answered
                } else {
                    AnswerCollection::NoResponse
                };
            }

            let until_deadline = deadline.duration_since(now);
            let wait = match machine.silence_remaining(now) {
                Some(remaining) => remaining + Duration::from_millis(50),
                None => until_deadline,
            }
            .min(until_deadline);

            match tokio::time::timeout(wait, media.incoming.recv()).await {
                Ok(Some(chunk)) => match self.speech.recognize(&chunk).await {
                    RecognitionOutcome::Accepted(utterance) => {
                        machine.record_fragment(&utterance.text, Instant::now());
                        let entry = TranscriptEntry::candidate(utterance.text);
                        session.transcript.push(entry.clone());
                        if let Err(e) = self.store.append(&session.session_id, entry).await {
                            warn!(error = %e, "transcript persistence degraded, continuing in memory");
                        }
                    }
                    RecognitionOutcome::Discarded(_) | RecognitionOutcome::Silent => {}
                },
                Ok(None) => return AnswerCollection::ChannelClosed,
                Err(_) => {
                    // Quiet interval elapsed; loop around and re-evaluate
                }
            }
        }
    }

    /// Capture agent speech at dispatch time, then synthesize and stream it.
    ///
    /// The transcript entry is appended before synthesis: the utterance is
    /// part of the interview record even if audio production degrades.
    async fn say(&self, session: &mut Session, media: &mut MediaLink, text: &str, kind: EntryKind) {
        let entry = TranscriptEntry::agent(text, kind);
        session.transcript.push(entry.clone());
        if let Err(e) = self.store.append(&session.session_id, entry).await {
            warn!(error = %e, "transcript persistence degraded, continuing in memory");
        }

        match self.speech.synthesize(text).await {
            SynthesisOutcome::Spoken(spoken) => {
                if spoken.fallback_used {
                    info!(provider = %spoken.provider, "spoke via fallback provider");
                }
                for frame in spoken.audio.frames(AUDIO_FRAME_BYTES) {
                    if media.outgoing.send(frame).await.is_err() {
                        warn!("agent audio channel closed");
                        break;
                    }
                }
            }
            SynthesisOutcome::Dropped => {}
            SynthesisOutcome::Unavailable => {
                error!(text = %text.chars().take(50).collect::<String>(), "no audio produced for agent utterance");
            }
        }
    }

    fn issue_token_pair(&self, session: &Session) -> AppResult<(String, String)> {
        let candidate = self.rooms.issue_token(TokenRequest {
            room_name: &session.room_name,
            identity: &session.candidate_name,
            role: Role::Candidate,
            ttl: TOKEN_TTL,
            metadata: None,
        })?;
        let agent = self.rooms.issue_token(TokenRequest {
            room_name: &session.room_name,
            identity: "interview_agent",
            role: Role::Agent,
            ttl: TOKEN_TTL,
            metadata: None,
        })?;
        Ok((candidate, agent))
    }

    /// Persist a status transition, falling back to in-memory state when the
    /// store is degraded.
    async fn transition(&self, session: &mut Session, status: SessionStatus) {
        match self.store.update_status(&session.session_id, status).await {
            Ok(updated) => {
                session.status = updated.status;
                session.completed_at = updated.completed_at;
                session.updated_at = updated.updated_at;
            }
            Err(e) => {
                warn!(
                    session_id = %session.session_id,
                    error = %e,
                    "status persistence degraded, continuing in memory"
                );
                if session.status.can_transition_to(status) {
                    session.status = status;
                    if status == SessionStatus::Completed {
                        session.completed_at = Some(crate::utils::rfc3339_now());
                    }
                }
            }
        }
    }

    async fn mark_failed(&self, session_id: &str) {
        if let Err(e) = self
            .store
            .update_status(session_id, SessionStatus::Failed)
            .await
        {
            error!(session_id, error = %e, "could not record session failure");
        }
    }

    async fn push_backend(&self, session: &Session) {
        if let Some(backend) = &self.backend {
            let payload = serde_json::json!({
                "status": session.status,
                "transcript_entries": session.transcript.len(),
                "updated_at": session.updated_at,
            });
            backend.push_progress(&session.session_id, &payload).await;
        }
    }
}

/// Periodic session heartbeat: room occupancy, avatar state, chain health
async fn status_loop(
    rooms: Arc<dyn RoomLifecycle>,
    room_name: String,
    avatar: Option<AvatarStatus>,
    speech: Arc<SpeechRouter>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(STATUS_INTERVAL) => {}
        }
        let participants = rooms.list_participants(&room_name).await;
        let avatar_state = match &avatar {
            Some(status) if status.is_connected() => "connected",
            Some(status) if status.is_abandoned() => "abandoned",
            Some(_) => "disconnected",
            None => "disabled",
        };
        let health = speech.health();
        info!(
            room = %room_name,
            participants = participants.len(),
            avatar = avatar_state,
            speaking = speech.is_speaking(),
            tts_health = ?health.tts,
            stt_health = ?health.stt,
            "session status"
        );
    }
}
