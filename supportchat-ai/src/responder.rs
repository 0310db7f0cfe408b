// File: supportchat-ai/src/responder.rs

use std::sync::Arc;
use async_trait::async_trait;
use tracing::{debug, warn};
use uuid::Uuid;

use supportchat_common::Error;
use supportchat_common::models::ChatMessage;
use supportchat_common::traits::BotResponder;

use crate::memory::ConversationMemory;
use crate::traits::{ModelProvider, PromptMessage};

/// Answers bot-track messages with a chat model, remembering the recent turns
/// of each session.
pub struct AssistantResponder {
    provider: Arc<dyn ModelProvider>,
    memory: ConversationMemory,
    history_limit: usize,
}

impl AssistantResponder {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider,
            memory: ConversationMemory::default(),
            history_limit: 20,
        }
    }

    pub fn with_history_limit(mut self, history_limit: usize) -> Self {
        self.history_limit = history_limit.max(1);
        self
    }

    pub fn memory(&self) -> &ConversationMemory {
        &self.memory
    }
}

#[async_trait]
impl BotResponder for AssistantResponder {
    async fn generate_reply(&self, session_id: Uuid, latest_customer_message: &ChatMessage) -> Result<String, Error> {
        // Nothing is stored until the model answers, so a retried turn is sent once.
        let turn = PromptMessage::user(&latest_customer_message.content);
        let mut prompt = self
            .memory
            .retrieve(session_id, self.history_limit.saturating_sub(1))
            .await;
        prompt.push(turn.clone());

        debug!(
            "Asking {} for a reply in session {} ({} turn(s) of context)",
            self.provider.name(),
            session_id,
            prompt.len()
        );
        let reply = self.provider.chat(prompt).await.map_err(|e| {
            warn!("{} failed for session {}: {:#}", self.provider.name(), session_id, e);
            Error::BotUnavailable(format!("{}: {}", self.provider.name(), e))
        })?;

        if !self
            .memory
            .store_exchange(session_id, turn, PromptMessage::assistant(&reply))
            .await
        {
            debug!("Session {} was forgotten while {} was answering", session_id, self.provider.name());
        }
        Ok(reply)
    }

    async fn forget_session(&self, session_id: Uuid) {
        if self.memory.clear(session_id).await {
            debug!("Dropped assistant memory for session {}", session_id);
        }
    }
}

/// Keyword-matched canned answers. Deterministic, needs no network; used for
/// demos and as the default responder when no model is configured.
pub struct CannedResponder {
    rules: Vec<(Vec<String>, String)>,
    fallback: String,
}

impl CannedResponder {
    pub fn new(fallback: &str) -> Self {
        Self { rules: Vec::new(), fallback: fallback.to_string() }
    }

    /// Adds a rule: if the message contains any of `keywords`
    /// (case-insensitive), reply with `reply`. Rules are tried in order.
    pub fn with_rule(mut self, keywords: &[&str], reply: &str) -> Self {
        self.rules.push((keywords.iter().map(|k| k.to_lowercase()).collect(), reply.to_string()));
        self
    }

    pub fn reply_for(&self, content: &str) -> &str {
        let lowered = content.to_lowercase();
        self.rules
            .iter()
            .find(|(keywords, _)| keywords.iter().any(|k| lowered.contains(k.as_str())))
            .map(|(_, reply)| reply.as_str())
            .unwrap_or(self.fallback.as_str())
    }
}

impl Default for CannedResponder {
    fn default() -> Self {
        CannedResponder::new(
            "Thanks for your message! I can help with orders, shipping, refunds and passwords. \
             If you'd rather talk to a person, just ask for an agent.",
        )
        .with_rule(
            &["refund", "return"],
            "Refunds are issued to the original payment method within 5 business days of us receiving the item.",
        )
        .with_rule(
            &["shipping", "delivery", "parcel", "package", "arrive"],
            "Most orders ship within 24 hours. You'll find the tracking link in your confirmation email.",
        )
        .with_rule(
            &["password", "login", "log in", "sign in"],
            "You can reset your password from the sign-in page using 'Forgot password'.",
        )
    }
}

#[async_trait]
impl BotResponder for CannedResponder {
    async fn generate_reply(&self, _session_id: Uuid, latest_customer_message: &ChatMessage) -> Result<String, Error> {
        Ok(self.reply_for(&latest_customer_message.content).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canned_rules_in_order() {
        let bot = CannedResponder::default();
        assert!(bot.reply_for("Where is my PARCEL?").contains("tracking"));
        assert!(bot.reply_for("I want a refund for my delivery").starts_with("Refunds"));
        assert!(bot.reply_for("hello").contains("agent"));
    }
}
