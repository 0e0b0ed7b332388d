//! Backend session API client
//!
//! The dashboard's HTTP layer keeps its own view of session progress; the
//! agent pushes updates to it with `PUT /api/session/{id}`. These pushes are
//! strictly best-effort: three attempts with a fixed one second pause, then
//! a logged failure. A dead backend never harms a live interview.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, warn};

const PUSH_ATTEMPTS: u32 = 3;
const PUSH_RETRY_DELAY: Duration = Duration::from_secs(1);
const PUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for the external session CRUD layer
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(PUSH_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Push a progress update for a session. Returns whether any attempt
    /// succeeded; failure is logged, never propagated.
    pub async fn push_progress(&self, session_id: &str, data: &Value) -> bool {
        let url = format!("{}/api/session/{session_id}", self.base_url);
        for attempt in 0..PUSH_ATTEMPTS {
            match self.client.put(&url).json(data).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(session_id, attempt = attempt + 1, "backend update pushed");
                    return true;
                }
                Ok(response) => {
                    warn!(
                        session_id,
                        attempt = attempt + 1,
                        status = response.status().as_u16(),
                        "backend update rejected"
                    );
                }
                Err(e) => {
                    warn!(session_id, attempt = attempt + 1, error = %e, "backend update failed");
                }
            }
            if attempt + 1 < PUSH_ATTEMPTS {
                tokio::time::sleep(PUSH_RETRY_DELAY).await;
            }
        }
        warn!(
            session_id,
            attempts = PUSH_ATTEMPTS,
            "backend update failed after all attempts"
        );
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_push_progress_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/session/s-1"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri());
        assert!(
            client
                .push_progress("s-1", &json!({"status": "interviewing"}))
                .await
        );
    }

    #[tokio::test]
    async fn test_push_progress_retries_then_reports_failure() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri());
        assert!(!client.push_progress("s-1", &json!({"x": 1})).await);
    }

    #[tokio::test]
    async fn test_push_progress_recovers_mid_retry() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = BackendClient::new(server.uri());
        assert!(client.push_progress("s-1", &json!({"x": 1})).await);
    }
}
