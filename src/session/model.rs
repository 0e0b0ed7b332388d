//! Session data model
//!
//! One `Session` is the unit of work for one candidate interview. The
//! on-disk representation is a single JSON document read by the dashboard
//! and report components, so field names here are a wire contract.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::livekit::room_name_for_session;
use crate::utils::rfc3339_now;

/// Session lifecycle status.
///
/// Progression is monotonic forward; `Failed` is reachable from any
/// non-terminal state and, like `Completed`, is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Created,
    Ready,
    Interviewing,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }

    fn rank(self) -> u8 {
        match self {
            SessionStatus::Created => 0,
            SessionStatus::Ready => 1,
            SessionStatus::Interviewing => 2,
            SessionStatus::Completed => 3,
            // Failed is terminal but outside the forward ladder
            SessionStatus::Failed => u8::MAX,
        }
    }

    /// Whether moving to `next` respects the monotonic ladder.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == SessionStatus::Failed {
            return true;
        }
        next.rank() > self.rank()
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionStatus::Created => "created",
            SessionStatus::Ready => "ready",
            SessionStatus::Interviewing => "interviewing",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// Who produced a transcript entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Agent,
    Candidate,
}

/// Transcript entry flavor, kept for dashboard rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Greeting,
    Question,
    Message,
}

/// One timestamped utterance, appended in capture order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub text: String,
    /// Fractional unix seconds at capture time
    pub timestamp: f64,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

impl TranscriptEntry {
    pub fn agent(text: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            speaker: Speaker::Agent,
            text: text.into(),
            timestamp: crate::utils::unix_now(),
            kind,
        }
    }

    pub fn candidate(text: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Candidate,
            text: text.into(),
            timestamp: crate::utils::unix_now(),
            kind: EntryKind::Message,
        }
    }
}

/// One interview question. Immutable once generated; questions are produced
/// wholesale, never partially.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub id: u32,
    #[serde(alias = "question")]
    pub text: String,
}

/// Pre-interview document analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub match_score: u8,
    pub key_skills: Vec<String>,
    pub gaps: Vec<String>,
    pub assessment: String,
}

impl Analysis {
    /// Deterministic stand-in when the language model is unavailable
    pub fn basic() -> Self {
        Self {
            match_score: 7,
            key_skills: vec!["Communication".to_string(), "Problem Solving".to_string()],
            gaps: vec!["Specific technical skills may need verification".to_string()],
            assessment: "Basic analysis completed - detailed AI analysis not available"
                .to_string(),
        }
    }
}

/// Immutable candidate profile captured at session creation
#[derive(Debug, Clone)]
pub struct NewSession {
    pub candidate_name: String,
    pub position: String,
    pub email: String,
    pub jd_full: String,
    pub resume_full: String,
}

/// The full session record, persisted as one JSON document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub candidate_name: String,
    pub position: String,
    pub email: String,

    /// Derived from the session id; shared naming contract with the
    /// dashboard and join links
    pub room_name: String,
    #[serde(default)]
    pub room_sid: Option<String>,
    #[serde(default)]
    pub candidate_token: Option<String>,
    #[serde(default)]
    pub agent_token: Option<String>,

    #[serde(default)]
    pub jd_full: String,
    #[serde(default)]
    pub resume_full: String,

    #[serde(default)]
    pub questions: Vec<Question>,
    #[serde(default)]
    pub transcript: Vec<TranscriptEntry>,
    #[serde(default)]
    pub analysis: Option<Analysis>,
    /// Final assessment text produced at interview end
    #[serde(default)]
    pub evaluation: Option<String>,

    pub status: SessionStatus,
    pub created_at: String,
    pub updated_at: String,
    #[serde(default)]
    pub completed_at: Option<String>,
}

impl Session {
    pub fn new(profile: NewSession) -> Self {
        let session_id = Uuid::new_v4().to_string();
        let now = rfc3339_now();
        Self {
            room_name: room_name_for_session(&session_id),
            session_id,
            candidate_name: profile.candidate_name,
            position: profile.position,
            email: profile.email,
            room_sid: None,
            candidate_token: None,
            agent_token: None,
            jd_full: profile.jd_full,
            resume_full: profile.resume_full,
            questions: Vec::new(),
            transcript: Vec::new(),
            analysis: None,
            evaluation: None,
            status: SessionStatus::Created,
            created_at: now.clone(),
            updated_at: now,
            completed_at: None,
        }
    }

    /// Refresh the update timestamp; called on every mutation before write
    pub fn touch(&mut self) {
        self.updated_at = rfc3339_now();
    }

    /// Count of candidate-attributed transcript entries; the finalize gate
    pub fn candidate_entry_count(&self) -> usize {
        self.transcript
            .iter()
            .filter(|e| e.speaker == Speaker::Candidate)
            .count()
    }
}
