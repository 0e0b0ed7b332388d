//! Transcript and session persistence
//!
//! One JSON document per session under a flat directory. Two rules keep the
//! files sane under concurrent writers and crashes:
//!
//! - every write goes to a uniquely-named temp file and is renamed over the
//!   target, so no reader ever observes a partially-written record;
//! - all writes through one store instance are serialized by a single async
//!   mutex, so two concurrent read-modify-write cycles (live transcript
//!   capture vs. a status update) cannot clobber each other.
//!
//! A failed write is retried a few times with short backoff and then
//! surfaced as `Persistence`; the caller keeps its in-memory state and keeps
//! interviewing. That trade (possible loss on process crash over halting a
//! live interview) is deliberate.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::app_error::{AppError, AppResult};

use super::model::{NewSession, Session, SessionStatus, TranscriptEntry};
use crate::utils::rfc3339_now;

const WRITE_ATTEMPTS: u32 = 3;
const WRITE_BACKOFF_STEP: Duration = Duration::from_millis(100);

/// Append-only transcript plus mutable session record store
pub struct SessionStore {
    dir: PathBuf,
    /// Serializes every read-modify-write cycle through this store instance.
    /// Per-store, not global: independent stores (and therefore independent
    /// session directories) never contend.
    write_lock: Mutex<()>,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> AppResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|e| {
            AppError::Persistence(format!("cannot create sessions dir {}: {e}", dir.display()))
        })?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, session_id: &str) -> PathBuf {
        self.dir.join(format!("{session_id}.json"))
    }

    /// Create and persist a fresh session record
    pub async fn create(&self, profile: NewSession) -> AppResult<Session> {
        let session = Session::new(profile);
        let _guard = self.write_lock.lock().await;
        self.write_atomic(&session).await?;
        info!(session_id = %session.session_id, "created session");
        Ok(session)
    }

    /// Load a session by id
    pub async fn load(&self, session_id: &str) -> AppResult<Session> {
        let path = self.path_for(session_id);
        let contents = match tokio::fs::read_to_string(&path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppError::SessionNotFound(session_id.to_string()));
            }
            Err(e) => {
                return Err(AppError::Persistence(format!(
                    "cannot read session {session_id}: {e}"
                )));
            }
        };
        serde_json::from_str(&contents).map_err(|e| {
            AppError::Persistence(format!("corrupt session record {session_id}: {e}"))
        })
    }

    /// Persist a full session record, refreshing its update timestamp
    pub async fn save(&self, session: &mut Session) -> AppResult<()> {
        session.touch();
        let _guard = self.write_lock.lock().await;
        self.write_atomic(session).await
    }

    /// Append one transcript entry.
    ///
    /// Full read-modify-write of the record under the store lock; callers
    /// on the live path treat a `Persistence` error as log-and-continue.
    pub async fn append(&self, session_id: &str, entry: TranscriptEntry) -> AppResult<()> {
        let _guard = self.write_lock.lock().await;
        let mut session = self.load(session_id).await?;
        session.transcript.push(entry);
        session.touch();
        self.write_atomic(&session).await?;
        debug!(
            session_id,
            entries = session.transcript.len(),
            "appended transcript entry"
        );
        Ok(())
    }

    /// Transition session status, stamping `completed_at` on completion.
    ///
    /// Violating the monotonic ladder is a `Validation` error, not a write.
    pub async fn update_status(
        &self,
        session_id: &str,
        status: SessionStatus,
    ) -> AppResult<Session> {
        let _guard = self.write_lock.lock().await;
        let mut session = self.load(session_id).await?;
        if session.status == status {
            return Ok(session);
        }
        if !session.status.can_transition_to(status) {
            return Err(AppError::Validation(format!(
                "illegal status transition {} -> {status} for session {session_id}",
                session.status
            )));
        }
        session.status = status;
        if status == SessionStatus::Completed {
            session.completed_at = Some(rfc3339_now());
        }
        session.touch();
        self.write_atomic(&session).await?;
        info!(session_id, status = %status, "updated session status");
        Ok(session)
    }

    /// List every session record in the store
    pub async fn list(&self) -> AppResult<Vec<Session>> {
        let mut sessions = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| AppError::Persistence(format!("cannot list sessions dir: {e}")))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(session_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match self.load(session_id).await {
                Ok(session) => sessions.push(session),
                Err(e) => warn!(session_id, error = %e, "skipping unreadable session record"),
            }
        }
        Ok(sessions)
    }

    /// Delete a session record; `false` when it did not exist
    pub async fn delete(&self, session_id: &str) -> AppResult<bool> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(self.path_for(session_id)).await {
            Ok(()) => {
                info!(session_id, "deleted session");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(AppError::Persistence(format!(
                "cannot delete session {session_id}: {e}"
            ))),
        }
    }

    /// Locate the session bound to a room, scanning most recent files first.
    ///
    /// The agent is handed a room name at startup and finds its own session
    /// record this way.
    pub async fn find_by_room(&self, room_name: &str) -> AppResult<Option<Session>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| AppError::Persistence(format!("cannot list sessions dir: {e}")))?;

        let mut candidates: Vec<(std::time::SystemTime, String)> = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| AppError::Persistence(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(session_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let modified = entry
                .metadata()
                .await
                .and_then(|m| m.modified())
                .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
            candidates.push((modified, session_id.to_string()));
        }

        candidates.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, session_id) in candidates {
            match self.load(&session_id).await {
                Ok(session) if session.room_name == room_name => return Ok(Some(session)),
                Ok(_) => {}
                Err(e) => warn!(session_id = %session_id, error = %e, "skipping unreadable session record"),
            }
        }
        Ok(None)
    }

    /// Write the record to a unique temp file, then rename over the target.
    /// Retried with short fixed-step backoff.
    async fn write_atomic(&self, session: &Session) -> AppResult<()> {
        let path = self.path_for(&session.session_id);
        let data = serde_json::to_vec_pretty(session)?;

        let mut last_error = String::new();
        for attempt in 0..WRITE_ATTEMPTS {
            let temp = self
                .dir
                .join(format!("{}.{}.tmp", session.session_id, Uuid::new_v4().simple()));
            let result = async {
                tokio::fs::write(&temp, &data).await?;
                tokio::fs::rename(&temp, &path).await
            }
            .await;

            match result {
                Ok(()) => return Ok(()),
                Err(e) => {
                    last_error = e.to_string();
                    // Best effort: do not leave temp droppings behind
                    let _ = tokio::fs::remove_file(&temp).await;
                    if attempt + 1 < WRITE_ATTEMPTS {
                        warn!(
                            session_id = %session.session_id,
                            attempt = attempt + 1,
                            error = %last_error,
                            "session write failed, retrying"
                        );
                        tokio::time::sleep(WRITE_BACKOFF_STEP * (attempt + 1)).await;
                    }
                }
            }
        }

        error!(
            session_id = %session.session_id,
            attempts = WRITE_ATTEMPTS,
            error = %last_error,
            "session write failed; continuing with in-memory state only"
        );
        Err(AppError::Persistence(format!(
            "failed to persist session {} after {WRITE_ATTEMPTS} attempts: {last_error}",
            session.session_id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::model::{EntryKind, Speaker};
    use tempfile::tempdir;

    fn profile() -> NewSession {
        NewSession {
            candidate_name: "Jane Doe".to_string(),
            position: "Backend Engineer".to_string(),
            email: "jane@example.com".to_string(),
            jd_full: String::new(),
            resume_full: String::new(),
        }
    }

    #[tokio::test]
    async fn test_create_then_load_round_trip() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();

        let created = store.create(profile()).await.unwrap();
        let loaded = store.load(&created.session_id).await.unwrap();
        assert_eq!(loaded, created);
    }

    #[tokio::test]
    async fn test_save_refreshes_updated_at_only() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();

        let mut session = store.create(profile()).await.unwrap();
        session.questions.push(crate::session::Question {
            id: 1,
            text: "Why Rust?".to_string(),
        });
        store.save(&mut session).await.unwrap();

        let loaded = store.load(&session.session_id).await.unwrap();
        assert_eq!(loaded.questions.len(), 1);
        assert_eq!(loaded, session);
        assert_eq!(loaded.created_at, session.created_at);
    }

    #[tokio::test]
    async fn test_load_missing_session() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        let err = store.load("nope").await.unwrap_err();
        assert!(matches!(err, AppError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn test_append_accumulates_in_order() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        let session = store.create(profile()).await.unwrap();

        store
            .append(
                &session.session_id,
                TranscriptEntry::agent("Hello!", EntryKind::Greeting),
            )
            .await
            .unwrap();
        store
            .append(
                &session.session_id,
                TranscriptEntry::candidate("Hi, I'm ready."),
            )
            .await
            .unwrap();

        let loaded = store.load(&session.session_id).await.unwrap();
        assert_eq!(loaded.transcript.len(), 2);
        assert_eq!(loaded.transcript[0].speaker, Speaker::Agent);
        assert_eq!(loaded.transcript[1].speaker, Speaker::Candidate);
    }

    #[tokio::test]
    async fn test_update_status_stamps_completion() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        let session = store.create(profile()).await.unwrap();

        store
            .update_status(&session.session_id, SessionStatus::Interviewing)
            .await
            .unwrap();
        let completed = store
            .update_status(&session.session_id, SessionStatus::Completed)
            .await
            .unwrap();
        assert!(completed.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_update_status_rejects_backwards_move() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        let session = store.create(profile()).await.unwrap();

        store
            .update_status(&session.session_id, SessionStatus::Interviewing)
            .await
            .unwrap();
        let err = store
            .update_status(&session.session_id, SessionStatus::Ready)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_is_reported_idempotently() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        let session = store.create(profile()).await.unwrap();

        assert!(store.delete(&session.session_id).await.unwrap());
        assert!(!store.delete(&session.session_id).await.unwrap());
    }

    #[tokio::test]
    async fn test_find_by_room() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        let a = store.create(profile()).await.unwrap();
        let b = store.create(profile()).await.unwrap();

        let found = store.find_by_room(&b.room_name).await.unwrap().unwrap();
        assert_eq!(found.session_id, b.session_id);
        let found = store.find_by_room(&a.room_name).await.unwrap().unwrap();
        assert_eq!(found.session_id, a.session_id);
        assert!(store.find_by_room("interview_missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = tempdir().unwrap();
        let store = SessionStore::new(dir.path()).unwrap();
        let mut session = store.create(profile()).await.unwrap();
        store.save(&mut session).await.unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
