// File: supportchat-core/src/state_machine.rs
//
// Legal lifecycle moves for a single session:
//
//   (create) -> BOT -> PENDING_HUMAN -> ACTIVE -> CLOSED
//                 \           \___________________^
//                  \______________________________^
//
// Every function here is pure: it takes the committed session and returns the
// session as it would look after the move, or the reason the move is illegal.
// The caller holds the session's write lock, which is what turns `accept` into
// a compare-and-swap.

use chrono::{DateTime, Utc};
use supportchat_common::Error;
use supportchat_common::models::{ChatSession, SessionMode, SessionState, SessionStatus};

/// Result of a transition that may legitimately do nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Applied(ChatSession),
    NoOp,
}

pub struct SessionStateMachine;

impl SessionStateMachine {
    /// BOT -> PENDING_HUMAN.
    pub fn request_human(session: &ChatSession) -> Result<ChatSession, Error> {
        match session.state() {
            SessionState::Bot => {
                let mut next = session.clone();
                next.mode = SessionMode::Human;
                next.status = SessionStatus::Pending;
                Ok(next)
            }
            state @ (SessionState::PendingHuman | SessionState::Active | SessionState::Closed) => {
                Err(Error::InvalidTransition { state, action: "request a human for" })
            }
        }
    }

    /// PENDING_HUMAN -> ACTIVE. First acceptor wins; anyone arriving after the
    /// commit gets `AlreadyClaimed` naming the winner.
    pub fn accept(session: &ChatSession, staff_id: &str) -> Result<ChatSession, Error> {
        match session.state() {
            SessionState::PendingHuman => {
                let mut next = session.clone();
                next.status = SessionStatus::Active;
                next.assigned_staff_id = Some(staff_id.to_string());
                next.handled_by = Some(staff_id.to_string());
                Ok(next)
            }
            SessionState::Active => Err(Error::AlreadyClaimed {
                session_id: session.id,
                claimed_by: session.assigned_staff_id.clone().unwrap_or_default(),
            }),
            SessionState::Closed => Err(Error::SessionClosed(session.id)),
            state @ SessionState::Bot => Err(Error::InvalidTransition { state, action: "accept" }),
        }
    }

    /// Any open state -> CLOSED. Closing twice is a no-op, not an error.
    ///
    /// The staff assignment is released on close so that `assigned_staff_id`
    /// stays non-null exactly while the session is active; `handled_by` keeps
    /// the history.
    pub fn close(session: &ChatSession, at: DateTime<Utc>) -> Transition {
        match session.state() {
            SessionState::Closed => Transition::NoOp,
            SessionState::Bot | SessionState::PendingHuman | SessionState::Active => {
                let mut next = session.clone();
                next.status = SessionStatus::Closed;
                next.assigned_staff_id = None;
                next.closed_at = Some(at);
                Transition::Applied(next)
            }
        }
    }

    /// Guard for the ledger: terminal sessions accept no further messages.
    pub fn ensure_accepts_messages(session: &ChatSession) -> Result<(), Error> {
        if session.is_closed() {
            return Err(Error::SessionClosed(session.id));
        }
        Ok(())
    }

    /// Checks the structural invariants of a session. Returns a description of
    /// the first violation found.
    pub fn check_invariants(session: &ChatSession) -> Result<(), String> {
        let active = session.status == SessionStatus::Active;
        if active != session.assigned_staff_id.is_some() {
            return Err(format!(
                "session {}: assigned_staff_id={:?} with status={}",
                session.id, session.assigned_staff_id, session.status
            ));
        }
        if matches!(session.status, SessionStatus::Pending | SessionStatus::Active)
            && session.mode != SessionMode::Human
        {
            return Err(format!("session {}: status={} in bot mode", session.id, session.status));
        }
        if session.last_message_at < session.created_at {
            return Err(format!("session {}: last_message_at before created_at", session.id));
        }
        if session.is_closed() != session.closed_at.is_some() {
            return Err(format!("session {}: closed_at out of sync with status", session.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending() -> ChatSession {
        let s = ChatSession::new("cust-1", "Ada");
        SessionStateMachine::request_human(&s).unwrap()
    }

    #[test]
    fn test_happy_path_keeps_invariants() {
        let bot = ChatSession::new("cust-1", "Ada");
        SessionStateMachine::check_invariants(&bot).unwrap();

        let pending = SessionStateMachine::request_human(&bot).unwrap();
        assert_eq!(pending.state(), SessionState::PendingHuman);
        SessionStateMachine::check_invariants(&pending).unwrap();

        let active = SessionStateMachine::accept(&pending, "staff-1").unwrap();
        assert_eq!(active.state(), SessionState::Active);
        assert_eq!(active.assigned_staff_id.as_deref(), Some("staff-1"));
        SessionStateMachine::check_invariants(&active).unwrap();

        let Transition::Applied(closed) = SessionStateMachine::close(&active, Utc::now()) else {
            panic!("close of an active session must apply");
        };
        assert_eq!(closed.state(), SessionState::Closed);
        assert!(closed.assigned_staff_id.is_none());
        assert_eq!(closed.handled_by.as_deref(), Some("staff-1"));
        SessionStateMachine::check_invariants(&closed).unwrap();
    }

    #[test]
    fn test_second_accept_reports_winner() {
        let active = SessionStateMachine::accept(&pending(), "staff-1").unwrap();
        match SessionStateMachine::accept(&active, "staff-2") {
            Err(Error::AlreadyClaimed { claimed_by, .. }) => assert_eq!(claimed_by, "staff-1"),
            other => panic!("expected AlreadyClaimed, got {:?}", other),
        }
    }

    #[test]
    fn test_request_human_twice_is_invalid() {
        let err = SessionStateMachine::request_human(&pending()).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { state: SessionState::PendingHuman, .. }));
    }

    #[test]
    fn test_accept_in_bot_mode_is_invalid() {
        let bot = ChatSession::new("cust-1", "Ada");
        let err = SessionStateMachine::accept(&bot, "staff-1").unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { state: SessionState::Bot, .. }));
    }

    #[test]
    fn test_closed_is_terminal() {
        let Transition::Applied(closed) = SessionStateMachine::close(&pending(), Utc::now()) else {
            panic!("close must apply");
        };
        assert_eq!(SessionStateMachine::close(&closed, Utc::now()), Transition::NoOp);
        assert!(matches!(SessionStateMachine::accept(&closed, "s"), Err(Error::SessionClosed(_))));
        assert!(matches!(
            SessionStateMachine::request_human(&closed),
            Err(Error::InvalidTransition { state: SessionState::Closed, .. })
        ));
        assert!(SessionStateMachine::ensure_accepts_messages(&closed).is_err());
        assert!(closed.assigned_staff_id.is_none());
    }
}
