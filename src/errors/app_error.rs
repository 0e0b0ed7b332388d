//! Application-level error taxonomy
//!
//! Every component boundary translates its transport- or provider-specific
//! failures into one of these variants. The interview loop itself only ever
//! sees typed outcomes; raw provider errors stop at the facade that produced
//! them.
//!
//! Retry discipline by variant:
//! - `Configuration`: fatal immediately, never retried (missing credentials,
//!   malformed config files).
//! - `TransientProvider`: retried with backoff by the issuing component, then
//!   surfaced once the attempt budget is exhausted.
//! - `Validation`: caller error, never retried.
//! - `Persistence`: retried briefly by the store, then degraded to
//!   memory-only continuation.
//! - `CapabilityUnavailable`: the session cannot start (e.g. no speech
//!   provider at all); fatal at session start only.

use thiserror::Error;

/// Result type used throughout the crate
pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    /// Missing or invalid configuration. Fatal, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A remote provider failed in a way that was retried and still failed.
    #[error("provider error: {0}")]
    TransientProvider(String),

    /// Caller-supplied input was rejected. Never retried.
    #[error("validation error: {0}")]
    Validation(String),

    /// Session file persistence failed after its retry budget.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A whole capability (speech synthesis, recognition) has no usable
    /// provider left, so the interview cannot proceed.
    #[error("capability unavailable: {0}")]
    CapabilityUnavailable(String),

    /// A room is already bound to another live session.
    #[error("room {room} is already bound to session {session_id}")]
    RoomBusy { room: String, session_id: String },

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AppError {
    /// Whether the failure is terminal for session startup.
    pub fn is_fatal_at_start(&self) -> bool {
        matches!(
            self,
            AppError::Configuration(_) | AppError::CapabilityUnavailable(_) | AppError::RoomBusy { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(AppError::Configuration("missing key".into()).is_fatal_at_start());
        assert!(AppError::CapabilityUnavailable("no stt".into()).is_fatal_at_start());
        assert!(!AppError::TransientProvider("timeout".into()).is_fatal_at_start());
        assert!(!AppError::Persistence("disk".into()).is_fatal_at_start());
    }

    #[test]
    fn test_display_messages() {
        let err = AppError::Validation("candidate name is required".into());
        assert_eq!(err.to_string(), "validation error: candidate name is required");

        let err = AppError::RoomBusy {
            room: "interview_ab12cd34".into(),
            session_id: "s-1".into(),
        };
        assert!(err.to_string().contains("interview_ab12cd34"));
    }
}
