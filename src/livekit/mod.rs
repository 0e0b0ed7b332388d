//! LiveKit room service integration
//!
//! This module owns everything the agent does against the external media
//! service at the API level: idempotent room creation and deletion, read-only
//! room inspection, and signed role-scoped access tokens. Every remote call
//! is time-bounded and retried with exponential backoff; a freshly opened
//! client connection is probed with a cheap list call before it is trusted
//! for real work.
//!
//! Media transport itself (audio tracks in and out of the room) is not
//! handled here - participants connect to the media service directly with
//! the tokens issued by this module.

mod access;
mod token;

pub use access::{AccessManager, EnsuredRoom, ParticipantSummary, RoomDetails, RoomLifecycle};
pub use token::{Role, TokenRequest, issue_token};

/// Derive the room name bound to a session.
///
/// The format is shared with the dashboard and the join links the backend
/// hands out, so it must be reproduced exactly: `interview_` followed by the
/// first eight characters of the session id.
pub fn room_name_for_session(session_id: &str) -> String {
    let prefix: String = session_id.chars().take(8).collect();
    format!("interview_{prefix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_room_name_derivation() {
        assert_eq!(
            room_name_for_session("a1b2c3d4-e5f6-7890-abcd-ef0123456789"),
            "interview_a1b2c3d4"
        );
    }

    #[test]
    fn test_room_name_short_id() {
        // Degenerate ids still derive deterministically
        assert_eq!(room_name_for_session("abc"), "interview_abc");
    }

    #[test]
    fn test_room_name_is_stable() {
        let id = "0d9f8a7b-1234-5678-9abc-def012345678";
        assert_eq!(room_name_for_session(id), room_name_for_session(id));
    }
}
