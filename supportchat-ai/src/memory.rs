use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::MemoryEntry;
use crate::traits::PromptMessage;

#[derive(Default)]
struct MemoryState {
    turns: HashMap<Uuid, Vec<MemoryEntry>>,
    /// Sessions that left the bot track. They never come back, so nothing is
    /// stored for them again, even by a reply that was already in flight.
    forgotten: HashSet<Uuid>,
}

/// Recent turns of each bot-track conversation, kept so the model sees
/// context. Bounded per session; oldest turns fall off first.
pub struct ConversationMemory {
    state: Arc<RwLock<MemoryState>>,
    max_entries_per_session: usize,
}

impl ConversationMemory {
    pub fn new(max_entries_per_session: usize) -> Self {
        Self {
            state: Arc::new(RwLock::new(MemoryState::default())),
            max_entries_per_session: max_entries_per_session.max(1),
        }
    }

    /// Stores one turn. Returns `false` if the session was forgotten.
    pub async fn store(&self, session_id: Uuid, message: PromptMessage) -> bool {
        self.store_all(session_id, vec![message]).await
    }

    /// Stores a customer turn and the reply to it as one unit.
    pub async fn store_exchange(&self, session_id: Uuid, user: PromptMessage, assistant: PromptMessage) -> bool {
        self.store_all(session_id, vec![user, assistant]).await
    }

    async fn store_all(&self, session_id: Uuid, messages: Vec<PromptMessage>) -> bool {
        let mut state = self.state.write().await;
        if state.forgotten.contains(&session_id) {
            return false;
        }
        let now = Utc::now();
        let entries = state.turns.entry(session_id).or_insert_with(Vec::new);
        entries.extend(messages.into_iter().map(|message| MemoryEntry { session_id, timestamp: now, message }));

        // Trim if exceeding max capacity
        if entries.len() > self.max_entries_per_session {
            let excess = entries.len() - self.max_entries_per_session;
            entries.drain(..excess);
        }
        true
    }

    /// The latest `limit` turns, oldest first.
    pub async fn retrieve(&self, session_id: Uuid, limit: usize) -> Vec<PromptMessage> {
        let state = self.state.read().await;
        let Some(entries) = state.turns.get(&session_id) else {
            return Vec::new();
        };
        let start = entries.len().saturating_sub(limit);
        entries[start..].iter().map(|e| e.message.clone()).collect()
    }

    /// Drops the session's turns and refuses any later store for it.
    /// Returns whether anything was stored.
    pub async fn clear(&self, session_id: Uuid) -> bool {
        let mut state = self.state.write().await;
        state.forgotten.insert(session_id);
        state.turns.remove(&session_id).is_some()
    }

    pub async fn is_forgotten(&self, session_id: Uuid) -> bool {
        self.state.read().await.forgotten.contains(&session_id)
    }

    pub async fn session_count(&self) -> usize {
        self.state.read().await.turns.len()
    }
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::new(40)
    }
}
