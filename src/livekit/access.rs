//! Room lifecycle operations with bounded retry
//!
//! The room service is reached over the network and fails independently of
//! the interview itself, so every operation here is wrapped in the same
//! discipline: per-attempt timeout, exponential backoff between attempts,
//! and a typed failure once the ceiling is hit. Connection-level errors are
//! retried; missing credentials are fatal immediately.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use livekit_api::services::room::{CreateRoomOptions, RoomClient};
use livekit_protocol as proto;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::ServerConfig;
use crate::errors::app_error::{AppError, AppResult};

use super::token::{self, Role, TokenRequest};

/// Per-attempt timeout for the connectivity probe
const PROBE_TIMEOUT: Duration = Duration::from_secs(15);
/// Per-attempt timeout for room creation
const CREATE_TIMEOUT: Duration = Duration::from_secs(30);
/// Per-attempt timeout for room deletion
const DELETE_TIMEOUT: Duration = Duration::from_secs(15);
/// Per-attempt timeout for read-only listing calls
const LIST_TIMEOUT: Duration = Duration::from_secs(10);

/// Outcome of `ensure_room`
#[derive(Debug, Clone, Serialize)]
pub struct EnsuredRoom {
    pub room_name: String,
    pub room_sid: String,
    pub already_existed: bool,
}

/// Read-only room details for dashboards and diagnostics
#[derive(Debug, Clone, Serialize)]
pub struct RoomDetails {
    pub name: String,
    pub sid: String,
    pub empty_timeout: u32,
    pub max_participants: u32,
    pub creation_time: i64,
    pub metadata: String,
    pub num_participants: u32,
    pub num_publishers: u32,
    pub active_recording: bool,
}

impl From<&proto::Room> for RoomDetails {
    fn from(room: &proto::Room) -> Self {
        Self {
            name: room.name.clone(),
            sid: room.sid.clone(),
            empty_timeout: room.empty_timeout,
            max_participants: room.max_participants,
            creation_time: room.creation_time,
            metadata: room.metadata.clone(),
            num_participants: room.num_participants,
            num_publishers: room.num_publishers,
            active_recording: room.active_recording,
        }
    }
}

/// Read-only participant details
#[derive(Debug, Clone, Serialize)]
pub struct ParticipantSummary {
    pub identity: String,
    pub name: String,
    pub sid: String,
    pub joined_at: i64,
    pub is_publisher: bool,
    pub can_publish: Option<bool>,
    pub can_subscribe: Option<bool>,
    pub can_publish_data: Option<bool>,
}

impl From<&proto::ParticipantInfo> for ParticipantSummary {
    fn from(p: &proto::ParticipantInfo) -> Self {
        Self {
            identity: p.identity.clone(),
            name: p.name.clone(),
            sid: p.sid.clone(),
            joined_at: p.joined_at,
            is_publisher: p.is_publisher,
            can_publish: p.permission.as_ref().map(|perm| perm.can_publish),
            can_subscribe: p.permission.as_ref().map(|perm| perm.can_subscribe),
            can_publish_data: p.permission.as_ref().map(|perm| perm.can_publish_data),
        }
    }
}

/// Room lifecycle manager for the external media service
///
/// Owns its credentials and constructs short-lived API clients on demand;
/// a client is probed before it is trusted, and is never shared across
/// concurrent calls without that probe.
#[derive(Debug)]
pub struct AccessManager {
    api_url: String,
    api_key: String,
    api_secret: String,
    max_retries: u32,
    retry_delay: Duration,
}

impl AccessManager {
    /// Build a manager from configuration.
    ///
    /// Missing credentials are a `Configuration` error: there is no point
    /// retrying a call that can never be signed.
    pub fn new(config: &ServerConfig) -> AppResult<Self> {
        let api_key = config
            .livekit_api_key
            .clone()
            .ok_or_else(|| AppError::Configuration("LIVEKIT_API_KEY is required".into()))?;
        let api_secret = config
            .livekit_api_secret
            .clone()
            .ok_or_else(|| AppError::Configuration("LIVEKIT_API_SECRET is required".into()))?;

        Ok(Self {
            api_url: http_api_url(&config.livekit_url),
            api_key,
            api_secret,
            max_retries: config.max_retries.max(1),
            retry_delay: config.retry_delay,
        })
    }

    /// Open a client and validate it with a cheap list call before use.
    ///
    /// The probe is retried with exponential backoff; only a probe that
    /// answers within its timeout yields a client trusted for real work.
    async fn connect(&self) -> AppResult<RoomClient> {
        let mut last_error = String::new();
        for attempt in 0..self.max_retries {
            let client = RoomClient::with_api_key(&self.api_url, &self.api_key, &self.api_secret);
            match tokio::time::timeout(PROBE_TIMEOUT, client.list_rooms(Vec::new())).await {
                Ok(Ok(_)) => {
                    debug!(attempt = attempt + 1, "room service connection probe succeeded");
                    return Ok(client);
                }
                Ok(Err(e)) => {
                    last_error = e.to_string();
                    warn!(
                        attempt = attempt + 1,
                        error = %last_error,
                        "room service connection probe failed"
                    );
                }
                Err(_) => {
                    last_error = format!("probe timed out after {PROBE_TIMEOUT:?}");
                    warn!(attempt = attempt + 1, "room service connection probe timed out");
                }
            }
            if attempt + 1 < self.max_retries {
                tokio::time::sleep(self.backoff(attempt)).await;
            }
        }
        Err(AppError::TransientProvider(format!(
            "room service unreachable after {} attempts: {last_error}",
            self.max_retries
        )))
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.retry_delay * 2u32.saturating_pow(attempt)
    }

    /// Run one remote call with per-attempt timeout and backoff between
    /// attempts, surfacing a typed failure after the ceiling.
    async fn with_retry<T, Fut>(
        &self,
        operation: &'static str,
        timeout: Duration,
        mut call: impl FnMut() -> Fut,
    ) -> AppResult<T>
    where
        Fut: Future<Output = Result<T, livekit_api::services::ServiceError>>,
    {
        let mut last_error = String::new();
        for attempt in 0..self.max_retries {
            match tokio::time::timeout(timeout, call()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(e)) => {
                    last_error = e.to_string();
                    warn!(
                        operation,
                        attempt = attempt + 1,
                        error = %last_error,
                        "room service call failed"
                    );
                }
                Err(_) => {
                    last_error = format!("timed out after {timeout:?}");
                    warn!(operation, attempt = attempt + 1, "room service call timed out");
                }
            }
            if attempt + 1 < self.max_retries {
                tokio::time::sleep(self.backoff(attempt)).await;
            }
        }
        Err(AppError::TransientProvider(format!(
            "{operation} failed after {} attempts: {last_error}",
            self.max_retries
        )))
    }

    /// Idempotently create a room.
    ///
    /// If a room with this name already exists its identity is returned with
    /// `already_existed = true`; a pre-existing room is never an error. The
    /// existence check itself is best-effort - if listing fails we proceed to
    /// create and let the service resolve the race.
    pub async fn ensure_room(
        &self,
        room_name: &str,
        empty_timeout: u32,
        max_participants: u32,
    ) -> AppResult<EnsuredRoom> {
        if room_name.trim().is_empty() {
            return Err(AppError::Validation("room name is required".into()));
        }

        let client = self.connect().await?;

        match tokio::time::timeout(LIST_TIMEOUT, client.list_rooms(vec![room_name.to_string()]))
            .await
        {
            Ok(Ok(rooms)) => {
                if let Some(room) = rooms.iter().find(|r| r.name == room_name) {
                    info!(room = room_name, sid = %room.sid, "room already exists");
                    return Ok(EnsuredRoom {
                        room_name: room.name.clone(),
                        room_sid: room.sid.clone(),
                        already_existed: true,
                    });
                }
            }
            Ok(Err(e)) => warn!(room = room_name, error = %e, "could not check existing rooms"),
            Err(_) => warn!(room = room_name, "existing-room check timed out"),
        }

        let options = || CreateRoomOptions {
            empty_timeout,
            max_participants,
            ..Default::default()
        };
        let room = self
            .with_retry("create_room", CREATE_TIMEOUT, || {
                client.create_room(room_name, options())
            })
            .await?;

        info!(room = %room.name, sid = %room.sid, "created room");
        Ok(EnsuredRoom {
            room_name: room.name,
            room_sid: room.sid,
            already_existed: false,
        })
    }

    /// Delete a room; deleting a room that does not exist is a success.
    pub async fn delete_room(&self, room_name: &str) -> AppResult<()> {
        let client = self.connect().await?;

        match tokio::time::timeout(LIST_TIMEOUT, client.list_rooms(vec![room_name.to_string()]))
            .await
        {
            Ok(Ok(rooms)) if !rooms.iter().any(|r| r.name == room_name) => {
                info!(room = room_name, "room does not exist, no deletion needed");
                return Ok(());
            }
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!(room = room_name, error = %e, "could not verify room existence"),
            Err(_) => warn!(room = room_name, "room existence check timed out"),
        }

        self.with_retry("delete_room", DELETE_TIMEOUT, || {
            client.delete_room(room_name)
        })
        .await?;

        info!(room = room_name, "deleted room");
        Ok(())
    }

    /// List participants currently in a room.
    ///
    /// Read-only callers (dashboards, the periodic status log) can proceed
    /// without this data, so failure degrades to an empty list instead of
    /// propagating.
    pub async fn list_participants(&self, room_name: &str) -> Vec<ParticipantSummary> {
        let client = match self.connect().await {
            Ok(client) => client,
            Err(e) => {
                warn!(room = room_name, error = %e, "participant listing unavailable");
                return Vec::new();
            }
        };

        match self
            .with_retry("list_participants", LIST_TIMEOUT, || {
                client.list_participants(room_name)
            })
            .await
        {
            Ok(participants) => {
                debug!(
                    room = room_name,
                    count = participants.len(),
                    "listed participants"
                );
                participants.iter().map(ParticipantSummary::from).collect()
            }
            Err(e) => {
                warn!(room = room_name, error = %e, "failed to list participants");
                Vec::new()
            }
        }
    }

    /// Fetch details for a single room, `None` when absent or unreachable.
    pub async fn room_info(&self, room_name: &str) -> Option<RoomDetails> {
        let client = match self.connect().await {
            Ok(client) => client,
            Err(e) => {
                warn!(room = room_name, error = %e, "room info unavailable");
                return None;
            }
        };

        match self
            .with_retry("list_rooms", LIST_TIMEOUT, || {
                client.list_rooms(vec![room_name.to_string()])
            })
            .await
        {
            Ok(rooms) => rooms
                .iter()
                .find(|r| r.name == room_name)
                .map(RoomDetails::from),
            Err(e) => {
                warn!(room = room_name, error = %e, "failed to fetch room info");
                None
            }
        }
    }

    /// Issue a signed, role-scoped join token for this deployment's keys.
    pub fn issue_token(&self, request: TokenRequest<'_>) -> AppResult<String> {
        token::issue_token(&self.api_key, &self.api_secret, request)
    }

    /// Convenience pair used when securing a fresh interview room: one
    /// candidate token and one agent token.
    pub fn issue_interview_tokens(
        &self,
        room_name: &str,
        candidate_identity: &str,
        ttl: Duration,
    ) -> AppResult<(String, String)> {
        let candidate = self.issue_token(TokenRequest {
            room_name,
            identity: candidate_identity,
            role: Role::Candidate,
            ttl,
            metadata: None,
        })?;
        let agent = self.issue_token(TokenRequest {
            room_name,
            identity: "interview_agent",
            role: Role::Agent,
            ttl,
            metadata: None,
        })?;
        Ok((candidate, agent))
    }
}

/// The room-service contract the orchestrator consumes. `AccessManager` is
/// the production implementation; tests substitute their own.
#[async_trait]
pub trait RoomLifecycle: Send + Sync {
    async fn ensure_room(
        &self,
        room_name: &str,
        empty_timeout: u32,
        max_participants: u32,
    ) -> AppResult<EnsuredRoom>;

    async fn delete_room(&self, room_name: &str) -> AppResult<()>;

    async fn list_participants(&self, room_name: &str) -> Vec<ParticipantSummary>;

    async fn room_info(&self, room_name: &str) -> Option<RoomDetails>;

    fn issue_token(&self, request: TokenRequest<'_>) -> AppResult<String>;
}

#[async_trait]
impl RoomLifecycle for AccessManager {
    async fn ensure_room(
        &self,
        room_name: &str,
        empty_timeout: u32,
        max_participants: u32,
    ) -> AppResult<EnsuredRoom> {
        AccessManager::ensure_room(self, room_name, empty_timeout, max_participants).await
    }

    async fn delete_room(&self, room_name: &str) -> AppResult<()> {
        AccessManager::delete_room(self, room_name).await
    }

    async fn list_participants(&self, room_name: &str) -> Vec<ParticipantSummary> {
        AccessManager::list_participants(self, room_name).await
    }

    async fn room_info(&self, room_name: &str) -> Option<RoomDetails> {
        AccessManager::room_info(self, room_name).await
    }

    fn issue_token(&self, request: TokenRequest<'_>) -> AppResult<String> {
        AccessManager::issue_token(self, request)
    }
}

/// The server API speaks HTTP even when the signalling URL is ws/wss.
fn http_api_url(livekit_url: &str) -> String {
    if let Some(rest) = livekit_url.strip_prefix("wss://") {
        format!("https://{rest}")
    } else if let Some(rest) = livekit_url.strip_prefix("ws://") {
        format!("http://{rest}")
    } else {
        livekit_url.to_string()
    }
}
