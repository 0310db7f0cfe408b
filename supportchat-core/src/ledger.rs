// File: supportchat-core/src/ledger.rs

use std::sync::Arc;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use supportchat_common::Error;
use supportchat_common::models::{ChatMessage, ChatSession, MessagePage, SenderRole};
use crate::directory::SessionEntry;

/// Append-only, ordered log of one session's messages.
///
/// The ledger alone hands out `seq` values; callers never supply one.
/// `seq` starts at 1 and grows by one per append, and `sent_at` never moves
/// backwards even if the wall clock does.
#[derive(Debug, Clone)]
pub struct MessageLedger {
    session_id: Uuid,
    messages: Vec<ChatMessage>,
}

impl MessageLedger {
    pub fn new(session_id: Uuid) -> Self {
        Self { session_id, messages: Vec::new() }
    }

    /// Rebuilds a ledger from stored messages (e.g. on restore). Rejects
    /// foreign or out-of-order entries.
    pub fn from_messages(session_id: Uuid, messages: Vec<ChatMessage>) -> Result<Self, Error> {
        let mut last_seq = 0;
        for m in &messages {
            if m.session_id != session_id {
                return Err(Error::Parse(format!(
                    "message {} belongs to session {}, not {}",
                    m.id, m.session_id, session_id
                )));
            }
            if m.seq <= last_seq {
                return Err(Error::Parse(format!(
                    "message {} in session {} is out of order (seq {} after {})",
                    m.id, session_id, m.seq, last_seq
                )));
            }
            last_seq = m.seq;
        }
        Ok(Self { session_id, messages })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last_seq(&self) -> u64 {
        self.messages.last().map(|m| m.seq).unwrap_or(0)
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Builds the message the next append would store, without storing it.
    /// Used so the caller can persist first and only then `push`.
    pub fn draft(
        &self,
        sender_id: &str,
        sender_role: SenderRole,
        content: &str,
        now: DateTime<Utc>,
    ) -> ChatMessage {
        let sent_at = match self.messages.last() {
            Some(last) if last.sent_at > now => last.sent_at,
            _ => now,
        };
        ChatMessage {
            id: Uuid::new_v4(),
            session_id: self.session_id,
            seq: self.last_seq() + 1,
            sender_id: sender_id.to_string(),
            sender_role,
            content: content.to_string(),
            sent_at,
        }
    }

    /// Stores a message produced by `draft`. Must be called under the same
    /// session write lock as the `draft`.
    pub fn push(&mut self, message: ChatMessage) {
        debug_assert_eq!(message.session_id, self.session_id);
        debug_assert_eq!(message.seq, self.last_seq() + 1);
        self.messages.push(message);
    }

    /// Messages with `seq > after`, ascending, at most `limit` of them.
    pub fn page(&self, after: Option<u64>, limit: Option<usize>) -> MessagePage {
        let after = after.unwrap_or(0);
        let start = self.messages.partition_point(|m| m.seq <= after);
        let rest = &self.messages[start..];
        let taken = match limit {
            Some(n) => &rest[..n.min(rest.len())],
            None => rest,
        };
        MessagePage {
            messages: taken.to_vec(),
            next_cursor: taken.last().map(|m| m.seq),
        }
    }
}

/// Mirrors a freshly drafted message into the session's denormalized fields.
pub fn apply_preview(session: &mut ChatSession, message: &ChatMessage, preview_chars: usize) {
    session.last_message_preview = preview_of(&message.content, preview_chars);
    if message.sent_at > session.last_message_at {
        session.last_message_at = message.sent_at;
    }
}

/// First `max_chars` characters of `content`, with an ellipsis if cut.
pub fn preview_of(content: &str, max_chars: usize) -> String {
    match content.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}…", &content[..byte_idx]),
        None => content.to_string(),
    }
}

/// Restartable reader over one session's history.
///
/// Each call to `next_page` returns what was appended after the last message
/// it handed out, so a reader that catches up and calls again later picks up
/// new messages without re-reading old ones. `cursor()` can be stored and fed
/// back into `ChatEngine::list_messages` (or a new reader) to resume.
pub struct MessageHistory {
    entry: Arc<SessionEntry>,
    cursor: Option<u64>,
    page_size: usize,
}

impl MessageHistory {
    pub(crate) fn new(entry: Arc<SessionEntry>, cursor: Option<u64>, page_size: usize) -> Self {
        Self { entry, cursor, page_size: page_size.max(1) }
    }

    /// Next batch of at most `page_size` messages; empty once caught up.
    pub fn next_page(&mut self) -> Vec<ChatMessage> {
        let page = self.entry.read(|rec| rec.ledger.page(self.cursor, Some(self.page_size)));
        if let Some(seq) = page.next_cursor {
            self.cursor = Some(seq);
        }
        page.messages
    }

    pub fn cursor(&self) -> Option<u64> {
        self.cursor
    }
}
