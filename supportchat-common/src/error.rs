// ================================================================
// File: supportchat-common/src/error.rs
// ================================================================

use thiserror::Error;
use uuid::Uuid;

use crate::models::session::SessionState;

#[derive(Debug, Error)]
pub enum Error {
    // Domain outcomes. Every one of these is an expected result of
    // concurrent multi-party use and is returned, never panicked on.
    #[error("Not found error: {0}")]
    NotFound(String),

    #[error("Session {0} is closed")]
    SessionClosed(Uuid),

    #[error("Invalid transition: cannot {action} a session in state {state}")]
    InvalidTransition {
        state: SessionState,
        action: &'static str,
    },

    #[error("Session {session_id} was already claimed by {claimed_by}")]
    AlreadyClaimed {
        session_id: Uuid,
        claimed_by: String,
    },

    #[error("Customer already has open session {0}; join it instead")]
    AlreadyHasOpenSession(Uuid),

    #[error("Bot unavailable: {0}")]
    BotUnavailable(String),

    // Infrastructure:
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Timeout error: {0}")]
    Timeout(#[from] tokio::time::error::Elapsed),

    #[error("Uuid error: {0}")]
    Uuid(#[from] uuid::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Event bus error: {0}")]
    EventBus(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl Error {
    /// True for the domain outcomes a caller is expected to handle
    /// (lost claim race, closed session, ...), false for infrastructure failures.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Error::NotFound(_)
                | Error::SessionClosed(_)
                | Error::InvalidTransition { .. }
                | Error::AlreadyClaimed { .. }
                | Error::AlreadyHasOpenSession(_)
                | Error::BotUnavailable(_)
        )
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Parse(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Parse(s.to_string())
    }
}

impl From<anyhow::Error> for Error {
    fn from(e: anyhow::Error) -> Self {
        Error::Parse(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_errors_are_expected() {
        let id = Uuid::new_v4();
        assert!(Error::SessionClosed(id).is_expected());
        assert!(Error::AlreadyClaimed { session_id: id, claimed_by: "staff-1".into() }.is_expected());
        assert!(Error::InvalidTransition { state: SessionState::Closed, action: "accept" }.is_expected());
        assert!(!Error::Config("bad".into()).is_expected());
    }

    #[test]
    fn test_invalid_transition_message() {
        let err = Error::InvalidTransition { state: SessionState::PendingHuman, action: "request a human for" };
        assert_eq!(
            err.to_string(),
            "Invalid transition: cannot request a human for a session in state pending_human"
        );
    }
}
