//! Role-scoped access token issuance
//!
//! Tokens are short-lived JWTs granting media capabilities inside exactly
//! one room. A candidate can publish and subscribe but holds no
//! administrative capability at all; the agent carries the same media grants
//! plus the `agent` marker, and room-admin/create/list/record are withheld
//! explicitly so a leaked agent token cannot touch other rooms.

use std::str::FromStr;
use std::time::Duration;

use livekit_api::access_token::{AccessToken, VideoGrants};
use tracing::{debug, error};

use crate::errors::app_error::{AppError, AppResult};

/// Participant role used to scope token grants
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Candidate,
    Agent,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Candidate => write!(f, "candidate"),
            Role::Agent => write!(f, "agent"),
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "candidate" | "participant" => Ok(Role::Candidate),
            "agent" | "interviewer" => Ok(Role::Agent),
            other => Err(AppError::Validation(format!(
                "unknown role: {other}. Supported roles: candidate, agent"
            ))),
        }
    }
}

/// Inputs for one token
#[derive(Debug, Clone)]
pub struct TokenRequest<'a> {
    pub room_name: &'a str,
    pub identity: &'a str,
    pub role: Role,
    pub ttl: Duration,
    pub metadata: Option<&'a str>,
}

fn grants_for(role: Role, room_name: &str) -> VideoGrants {
    VideoGrants {
        room_join: true,
        room: room_name.to_string(),
        can_publish: true,
        can_subscribe: true,
        can_publish_data: true,
        can_update_own_metadata: true,
        agent: matches!(role, Role::Agent),
        // Administrative room capabilities are withheld for both roles
        room_admin: false,
        room_create: false,
        room_list: false,
        room_record: false,
        ..Default::default()
    }
}

/// Issue a signed join token.
///
/// Every required input is checked before signing; a token is never issued
/// without a room scope or an identity.
pub fn issue_token(api_key: &str, api_secret: &str, request: TokenRequest<'_>) -> AppResult<String> {
    if api_key.is_empty() || api_secret.is_empty() {
        return Err(AppError::Configuration(
            "room service credentials are required for token generation".into(),
        ));
    }
    if request.room_name.trim().is_empty() {
        return Err(AppError::Validation("room name is required".into()));
    }
    if request.identity.trim().is_empty() {
        return Err(AppError::Validation(
            "participant identity is required".into(),
        ));
    }

    let mut token = AccessToken::with_api_key(api_key, api_secret)
        .with_identity(request.identity)
        .with_name(request.identity)
        .with_ttl(request.ttl)
        .with_grants(grants_for(request.role, request.room_name));

    if let Some(metadata) = request.metadata {
        if !metadata.is_empty() {
            token = token.with_metadata(metadata);
        }
    }

    let jwt = token.to_jwt().map_err(|e| {
        error!(identity = request.identity, error = %e, "token generation failed");
        AppError::Configuration(format!("token generation failed: {e}"))
    })?;

    debug!(
        identity = request.identity,
        role = %request.role,
        room = request.room_name,
        ttl_secs = request.ttl.as_secs(),
        "generated access token"
    );
    Ok(jwt)
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &str = "devkey";
    const SECRET: &str = "devsecret-devsecret-devsecret-00";

    fn request(role: Role) -> TokenRequest<'static> {
        TokenRequest {
            room_name: "interview_ab12cd34",
            identity: "Jane Doe",
            role,
            ttl: Duration::from_secs(3600),
            metadata: None,
        }
    }

    #[test]
    fn test_issue_candidate_token() {
        let jwt = issue_token(KEY, SECRET, request(Role::Candidate)).unwrap();
        // Signed JWT: header.payload.signature
        assert_eq!(jwt.split('.').count(), 3);
    }

    #[test]
    fn test_agent_and_candidate_tokens_differ() {
        let candidate = issue_token(KEY, SECRET, request(Role::Candidate)).unwrap();
        let agent = issue_token(KEY, SECRET, request(Role::Agent)).unwrap();
        assert_ne!(candidate, agent);
    }

    #[test]
    fn test_missing_identity_is_rejected() {
        let mut req = request(Role::Candidate);
        req.identity = " ";
        let err = issue_token(KEY, SECRET, req).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_missing_room_is_rejected() {
        let mut req = request(Role::Candidate);
        req.room_name = "";
        assert!(issue_token(KEY, SECRET, req).is_err());
    }

    #[test]
    fn test_missing_credentials_are_fatal() {
        let err = issue_token("", "", request(Role::Candidate)).unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[test]
    fn test_grants_scoping() {
        let candidate = grants_for(Role::Candidate, "room-1");
        assert!(candidate.room_join && candidate.can_publish && candidate.can_subscribe);
        assert!(!candidate.agent);
        assert!(!candidate.room_admin && !candidate.room_create);
        assert!(!candidate.room_list && !candidate.room_record);

        let agent = grants_for(Role::Agent, "room-1");
        assert!(agent.agent);
        assert!(!agent.room_admin && !agent.room_create);
        assert_eq!(agent.room, "room-1");
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("candidate".parse::<Role>().unwrap(), Role::Candidate);
        assert_eq!("Agent".parse::<Role>().unwrap(), Role::Agent);
        assert!("admin".parse::<Role>().is_err());
    }
}
