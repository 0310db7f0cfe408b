use async_trait::async_trait;
use uuid::Uuid;
use crate::error::Error;
use crate::models::{ChatMessage, ChatSession};

/// Durable write-through store for sessions and their ledgers.
///
/// The engine's in-memory directory stays authoritative for reads; the archive
/// is written inside the session's critical section before a change becomes
/// visible, and read back once at startup.
#[async_trait]
pub trait ChatArchive: Send + Sync {
    /// Upsert the session row (state transitions, read acknowledgements).
    async fn save_session(&self, session: &ChatSession) -> Result<(), Error>;

    /// Insert the message and upsert the session's denormalized fields
    /// in one transaction.
    async fn record_append(&self, session: &ChatSession, message: &ChatMessage) -> Result<(), Error>;

    async fn load_sessions(&self) -> Result<Vec<ChatSession>, Error>;

    /// Messages of one session in ascending `seq` order.
    async fn load_messages(&self, session_id: Uuid) -> Result<Vec<ChatMessage>, Error>;
}
