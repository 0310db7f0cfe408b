// File: supportchat-common/src/models/session.rs

use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who is currently answering the customer.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    Bot,
    Human,
}

/// Staffing state of a session.
///
/// `Open` is the bot track: the session exists but has never been put into the
/// staff queue. `Pending`/`Active` only ever occur together with `SessionMode::Human`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Open,
    Pending,
    Active,
    Closed,
}

/// The four lifecycle states, derived from `(mode, status)`.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Bot,
    PendingHuman,
    Active,
    Closed,
}

/// The two sides that read a conversation and carry their own unread counter.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Eq, PartialEq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Audience {
    Customer,
    Staff,
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionMode::Bot => write!(f, "bot"),
            SessionMode::Human => write!(f, "human"),
        }
    }
}

impl FromStr for SessionMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bot" => Ok(SessionMode::Bot),
            "human" => Ok(SessionMode::Human),
            _ => Err(format!("Unknown session mode: {}", s)),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionStatus::Open => write!(f, "open"),
            SessionStatus::Pending => write!(f, "pending"),
            SessionStatus::Active => write!(f, "active"),
            SessionStatus::Closed => write!(f, "closed"),
        }
    }
}

impl FromStr for SessionStatus {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "open" => Ok(SessionStatus::Open),
            "pending" => Ok(SessionStatus::Pending),
            "active" => Ok(SessionStatus::Active),
            "closed" => Ok(SessionStatus::Closed),
            _ => Err(format!("Unknown session status: {}", s)),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Bot => write!(f, "bot"),
            SessionState::PendingHuman => write!(f, "pending_human"),
            SessionState::Active => write!(f, "active"),
            SessionState::Closed => write!(f, "closed"),
        }
    }
}

impl fmt::Display for Audience {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Audience::Customer => write!(f, "customer"),
            Audience::Staff => write!(f, "staff"),
        }
    }
}

impl FromStr for Audience {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "customer" => Ok(Audience::Customer),
            "staff" => Ok(Audience::Staff),
            _ => Err(format!("Unknown audience: {}", s)),
        }
    }
}

/// One customer's support conversation.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatSession {
    pub id: Uuid,
    pub customer_id: String,
    pub customer_display_name: String,
    pub mode: SessionMode,
    pub status: SessionStatus,
    pub assigned_staff_id: Option<String>,
    /// Staff member who claimed the session. Unlike `assigned_staff_id` this
    /// survives the close.
    pub handled_by: Option<String>,
    pub last_message_preview: String,
    pub last_message_at: DateTime<Utc>,
    pub unread_for_staff: u32,
    pub unread_for_customer: u32,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}

impl ChatSession {
    /// A fresh bot-track session. `last_message_at` starts at `created_at`
    /// and only moves forward from there.
    pub fn new(customer_id: &str, customer_display_name: &str) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            customer_id: customer_id.to_string(),
            customer_display_name: customer_display_name.to_string(),
            mode: SessionMode::Bot,
            status: SessionStatus::Open,
            assigned_staff_id: None,
            handled_by: None,
            last_message_preview: String::new(),
            last_message_at: now,
            unread_for_staff: 0,
            unread_for_customer: 0,
            created_at: now,
            closed_at: None,
        }
    }

    pub fn state(&self) -> SessionState {
        match (self.status, self.mode) {
            (SessionStatus::Closed, _) => SessionState::Closed,
            (SessionStatus::Active, _) => SessionState::Active,
            (SessionStatus::Pending, _) => SessionState::PendingHuman,
            (SessionStatus::Open, SessionMode::Human) => SessionState::PendingHuman,
            (SessionStatus::Open, SessionMode::Bot) => SessionState::Bot,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.status == SessionStatus::Closed
    }

    pub fn unread_for(&self, audience: Audience) -> u32 {
        match audience {
            Audience::Customer => self.unread_for_customer,
            Audience::Staff => self.unread_for_staff,
        }
    }
}

/// Someone observing a session: a customer widget or a staff console tab.
#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq, Hash)]
pub struct Viewer {
    pub viewer_id: String,
    pub audience: Audience,
}

impl Viewer {
    pub fn customer(viewer_id: &str) -> Self {
        Self { viewer_id: viewer_id.to_string(), audience: Audience::Customer }
    }

    pub fn staff(viewer_id: &str) -> Self {
        Self { viewer_id: viewer_id.to_string(), audience: Audience::Staff }
    }
}
