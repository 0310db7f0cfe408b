use async_trait::async_trait;
use uuid::Uuid;
use crate::error::Error;
use crate::models::ChatMessage;

/// Produces the automated assistant's reply to a customer message.
///
/// The engine calls this off the caller's path (in a spawned task) and appends
/// whatever comes back as a `bot` message. The content is never inspected.
/// Any `Err` counts as a failed attempt and is retried per the engine's policy.
#[async_trait]
pub trait BotResponder: Send + Sync {
    async fn generate_reply(
        &self,
        session_id: Uuid,
        latest_customer_message: &ChatMessage,
    ) -> Result<String, Error>;

    /// Called once a session leaves the bot track (escalated or closed) so
    /// stateful responders can drop whatever they keep per session.
    async fn forget_session(&self, _session_id: Uuid) {}
}
