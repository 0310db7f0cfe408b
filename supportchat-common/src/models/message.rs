// File: supportchat-common/src/models/message.rs

use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Author class of a message. Closed set: unread routing and the bot trigger
/// match on it exhaustively.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SenderRole {
    Customer,
    Staff,
    Bot,
    System,
}

impl fmt::Display for SenderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SenderRole::Customer => write!(f, "customer"),
            SenderRole::Staff => write!(f, "staff"),
            SenderRole::Bot => write!(f, "bot"),
            SenderRole::System => write!(f, "system"),
        }
    }
}

impl FromStr for SenderRole {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "customer" => Ok(SenderRole::Customer),
            "staff" => Ok(SenderRole::Staff),
            "bot" => Ok(SenderRole::Bot),
            "system" => Ok(SenderRole::System),
            _ => Err(format!("Unknown sender role: {}", s)),
        }
    }
}

/// One immutable entry of a session's ledger.
///
/// `seq` is the ordering key: assigned by the ledger, strictly increasing
/// within a session, starting at 1.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub id: Uuid,
    pub session_id: Uuid,
    pub seq: u64,
    pub sender_id: String,
    pub sender_role: SenderRole,
    pub content: String,
    pub sent_at: DateTime<Utc>,
}

/// One page of a session's history plus the cursor to continue from.
#[derive(Debug, Clone, PartialEq)]
pub struct MessagePage {
    pub messages: Vec<ChatMessage>,
    /// `seq` of the last message in this page; `None` when the page is empty.
    pub next_cursor: Option<u64>,
}
