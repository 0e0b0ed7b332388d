//! Visual avatar supervision
//!
//! The avatar is a best-effort companion to the interview: its failure never
//! blocks or ends the session. A single supervision task owns the avatar
//! lifecycle, which also guarantees that at most one reconnect is ever in
//! flight. Reconnects back off exponentially up to a cap and stop for good
//! after a fixed attempt ceiling; a coarse periodic health pass detects
//! silent disconnects and feeds the same loop.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Result type for avatar operations
pub type AvatarResult<T> = Result<T, AvatarError>;

#[derive(Debug, Error)]
pub enum AvatarError {
    #[error("avatar is not configured")]
    NotConfigured,

    #[error("avatar session start failed: {0}")]
    StartFailed(String),

    #[error("avatar request failed: {0}")]
    RequestFailed(String),

    #[error("avatar provider returned status {status}: {body}")]
    ProviderStatus { status: u16, body: String },
}

/// Capability interface every avatar backend must satisfy.
///
/// Backends that do not support a call implement it as a no-op rather than
/// being probed for optional methods at runtime.
#[async_trait]
pub trait AvatarClient: Send + Sync {
    /// Start (or restart) an avatar session bound to the given room
    async fn start(&self, room_name: &str) -> AvatarResult<()>;

    /// Tear down the current avatar session, if any
    async fn stop(&self);

    /// Liveness probe for the current avatar session
    async fn is_alive(&self) -> bool;

    fn provider_name(&self) -> &'static str;
}

#[derive(Debug, Deserialize)]
struct AnamSessionResponse {
    session_id: String,
}

/// Anam persona avatar over its HTTP session API
pub struct AnamAvatar {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    persona_id: String,
    session_id: Mutex<Option<String>>,
}

impl AnamAvatar {
    pub fn new(
        api_url: impl Into<String>,
        api_key: impl Into<String>,
        persona_id: impl Into<String>,
    ) -> AvatarResult<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(AvatarError::NotConfigured);
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| AvatarError::RequestFailed(e.to_string()))?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key,
            persona_id: persona_id.into(),
            session_id: Mutex::new(None),
        })
    }
}

#[async_trait]
impl AvatarClient for AnamAvatar {
    async fn start(&self, room_name: &str) -> AvatarResult<()> {
        let body = json!({
            "persona_id": self.persona_id,
            "room_name": room_name,
        });
        let response = self
            .client
            .post(format!("{}/sessions", self.api_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AvatarError::StartFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AvatarError::ProviderStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: AnamSessionResponse = response
            .json()
            .await
            .map_err(|e| AvatarError::StartFailed(e.to_string()))?;
        *self.session_id.lock() = Some(parsed.session_id);
        Ok(())
    }

    async fn stop(&self) {
        let session_id = self.session_id.lock().take();
        if let Some(session_id) = session_id {
            let result = self
                .client
                .delete(format!("{}/sessions/{session_id}", self.api_url))
                .bearer_auth(&self.api_key)
                .send()
                .await;
            if let Err(e) = result {
                warn!(error = %e, "avatar session teardown failed");
            }
        }
    }

    async fn is_alive(&self) -> bool {
        let session_id = match self.session_id.lock().clone() {
            Some(id) => id,
            None => return false,
        };
        match self
            .client
            .get(format!("{}/sessions/{session_id}", self.api_url))
            .bearer_auth(&self.api_key)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    fn provider_name(&self) -> &'static str {
        "anam"
    }
}

/// Supervision tunables; defaults match production behavior
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub max_reconnect_attempts: u32,
    pub backoff_cap: Duration,
    pub health_interval: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 3,
            backoff_cap: Duration::from_secs(30),
            health_interval: Duration::from_secs(30),
        }
    }
}

/// Shared view of supervision state for the status log
#[derive(Clone)]
pub struct AvatarStatus {
    connected: Arc<AtomicBool>,
    gave_up: Arc<AtomicBool>,
}

impl AvatarStatus {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// True once the attempt ceiling was hit and the avatar is marked absent
    /// for the remainder of the session
    pub fn is_abandoned(&self) -> bool {
        self.gave_up.load(Ordering::SeqCst)
    }
}

/// Supervisor owning the avatar lifecycle for one session
pub struct AvatarSupervisor;

impl AvatarSupervisor {
    /// Spawn the supervision task. Returns a status view plus the join
    /// handle; the task exits when `cancel` fires and tears the avatar down.
    pub fn spawn(
        client: Arc<dyn AvatarClient>,
        room_name: String,
        cancel: CancellationToken,
    ) -> (AvatarStatus, tokio::task::JoinHandle<()>) {
        Self::spawn_with_config(client, room_name, cancel, SupervisorConfig::default())
    }

    pub fn spawn_with_config(
        client: Arc<dyn AvatarClient>,
        room_name: String,
        cancel: CancellationToken,
        config: SupervisorConfig,
    ) -> (AvatarStatus, tokio::task::JoinHandle<()>) {
        let status = AvatarStatus {
            connected: Arc::new(AtomicBool::new(false)),
            gave_up: Arc::new(AtomicBool::new(false)),
        };
        let view = status.clone();
        let task = tokio::spawn(async move {
            supervise(client, room_name, cancel, config, status).await;
        });
        (view, task)
    }
}

async fn supervise(
    client: Arc<dyn AvatarClient>,
    room_name: String,
    cancel: CancellationToken,
    config: SupervisorConfig,
    status: AvatarStatus,
) {
    let mut attempts: u32 = 0;

    match client.start(&room_name).await {
        Ok(()) => {
            info!(provider = client.provider_name(), room = %room_name, "avatar session started");
            status.connected.store(true, Ordering::SeqCst);
        }
        Err(e) => {
            warn!(provider = client.provider_name(), error = %e, "avatar failed to start");
        }
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(config.health_interval) => {}
        }

        if status.connected.load(Ordering::SeqCst) {
            if client.is_alive().await {
                continue;
            }
            warn!(provider = client.provider_name(), "avatar disconnected");
            status.connected.store(false, Ordering::SeqCst);
        }

        if status.gave_up.load(Ordering::SeqCst) {
            continue;
        }
        if attempts >= config.max_reconnect_attempts {
            error!(
                provider = client.provider_name(),
                attempts, "max avatar reconnection attempts reached, giving up"
            );
            status.gave_up.store(true, Ordering::SeqCst);
            continue;
        }

        attempts += 1;
        let delay = reconnect_delay(attempts, config.backoff_cap);
        info!(
            provider = client.provider_name(),
            attempt = attempts,
            max = config.max_reconnect_attempts,
            "avatar reconnection scheduled in {delay:?}"
        );
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }

        match client.start(&room_name).await {
            Ok(()) => {
                info!(provider = client.provider_name(), "avatar reconnection successful");
                status.connected.store(true, Ordering::SeqCst);
                attempts = 0;
            }
            Err(e) => {
                warn!(provider = client.provider_name(), error = %e, "avatar reconnection failed");
            }
        }
    }

    client.stop().await;
    status.connected.store(false, Ordering::SeqCst);
}

/// `min(2^attempts, cap)` seconds
fn reconnect_delay(attempts: u32, cap: Duration) -> Duration {
    Duration::from_secs(2u64.saturating_pow(attempts)).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct ScriptedAvatar {
        start_calls: AtomicU32,
        succeed_from_call: u32,
        alive: AtomicBool,
        stopped: AtomicBool,
    }

    impl ScriptedAvatar {
        fn new(succeed_from_call: u32) -> Arc<Self> {
            Arc::new(Self {
                start_calls: AtomicU32::new(0),
                succeed_from_call,
                alive: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl AvatarClient for ScriptedAvatar {
        async fn start(&self, _room_name: &str) -> AvatarResult<()> {
            let call = self.start_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call >= self.succeed_from_call {
                self.alive.store(true, Ordering::SeqCst);
                Ok(())
            } else {
                Err(AvatarError::StartFailed("connection refused".into()))
            }
        }

        async fn stop(&self) {
            self.stopped.store(true, Ordering::SeqCst);
            self.alive.store(false, Ordering::SeqCst);
        }

        async fn is_alive(&self) -> bool {
            self.alive.load(Ordering::SeqCst)
        }

        fn provider_name(&self) -> &'static str {
            "scripted"
        }
    }

    fn fast_config() -> SupervisorConfig {
        SupervisorConfig {
            max_reconnect_attempts: 3,
            backoff_cap: Duration::from_secs(30),
            health_interval: Duration::from_millis(50),
        }
    }

    #[test]
    fn test_reconnect_delay_is_capped() {
        let cap = Duration::from_secs(30);
        assert_eq!(reconnect_delay(1, cap), Duration::from_secs(2));
        assert_eq!(reconnect_delay(2, cap), Duration::from_secs(4));
        assert_eq!(reconnect_delay(3, cap), Duration::from_secs(8));
        assert_eq!(reconnect_delay(10, cap), cap);
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_start_success() {
        let client = ScriptedAvatar::new(1);
        let cancel = CancellationToken::new();
        let (status, task) = AvatarSupervisor::spawn_with_config(
            Arc::clone(&client) as Arc<dyn AvatarClient>,
            "interview_ab12cd34".into(),
            cancel.clone(),
            fast_config(),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(status.is_connected());

        cancel.cancel();
        task.await.unwrap();
        assert!(client.stopped.load(Ordering::SeqCst));
        assert!(!status.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_after_initial_failure() {
        let client = ScriptedAvatar::new(2);
        let cancel = CancellationToken::new();
        let (status, task) = AvatarSupervisor::spawn_with_config(
            Arc::clone(&client) as Arc<dyn AvatarClient>,
            "interview_ab12cd34".into(),
            cancel.clone(),
            fast_config(),
        );

        // First start fails; one health tick plus the 2s backoff later the
        // retry succeeds
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(status.is_connected());
        assert!(!status.is_abandoned());
        assert_eq!(client.start_calls.load(Ordering::SeqCst), 2);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_attempt_ceiling() {
        let client = ScriptedAvatar::new(u32::MAX);
        let cancel = CancellationToken::new();
        let (status, task) = AvatarSupervisor::spawn_with_config(
            Arc::clone(&client) as Arc<dyn AvatarClient>,
            "interview_ab12cd34".into(),
            cancel.clone(),
            fast_config(),
        );

        // Enough virtual time for every backoff (2 + 4 + 8s) plus ticks
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!status.is_connected());
        assert!(status.is_abandoned());
        // Initial start + 3 reconnect attempts, then no more
        assert_eq!(client.start_calls.load(Ordering::SeqCst), 4);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_health_pass_detects_disconnect() {
        let client = ScriptedAvatar::new(1);
        let cancel = CancellationToken::new();
        let (status, task) = AvatarSupervisor::spawn_with_config(
            Arc::clone(&client) as Arc<dyn AvatarClient>,
            "interview_ab12cd34".into(),
            cancel.clone(),
            fast_config(),
        );

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(status.is_connected());

        // Simulate a silent drop; the next health tick notices and the loop
        // restarts the session
        client.alive.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(status.is_connected());
        assert!(client.start_calls.load(Ordering::SeqCst) >= 2);

        cancel.cancel();
        task.await.unwrap();
    }
}
