// File: supportchat-core/src/services/bot_dispatch.rs
//
// Runs the assistant off the caller's path. The customer's `send_message`
// has already returned by the time any of this happens; the outcome reaches
// the widget through the session's event stream like any other append.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use supportchat_common::Error;
use supportchat_common::models::{ChatMessage, SenderRole, SessionState};
use supportchat_common::traits::BotResponder;

use crate::services::chat_engine::ChatEngine;

/// Whether appending a message from `role` to a session in `state` asks the
/// assistant for a reply.
pub fn should_trigger(role: SenderRole, state: SessionState) -> bool {
    match role {
        SenderRole::Customer => state == SessionState::Bot,
        SenderRole::Staff | SenderRole::Bot | SenderRole::System => false,
    }
}

pub(crate) fn spawn_bot_reply(
    engine: ChatEngine,
    responder: Arc<dyn BotResponder>,
    trigger: ChatMessage,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        run_bot_reply(&engine, responder.as_ref(), &trigger).await;
    })
}

/// Tries the responder up to `bot_max_attempts` times, each bounded by
/// `bot_timeout`. On success the reply is appended as a `bot` message; when
/// every attempt fails a `system` notice is appended instead, so the customer
/// is never left waiting on nothing. Either append is skipped if the session
/// left the bot track in the meantime.
async fn run_bot_reply(engine: &ChatEngine, responder: &dyn BotResponder, trigger: &ChatMessage) {
    let session_id = trigger.session_id;
    let cfg = engine.config().clone();
    let attempts = cfg.bot_max_attempts.max(1);
    let mut last_failure = String::new();

    for attempt in 1..=attempts {
        if !engine.is_bot_track(session_id) {
            debug!("Session {} left the bot track; dropping reply to seq {}", session_id, trigger.seq);
            return;
        }

        match timeout(cfg.bot_timeout(), responder.generate_reply(session_id, trigger)).await {
            Ok(Ok(content)) => {
                deliver(engine, session_id, &cfg.bot_sender_id, SenderRole::Bot, &content).await;
                return;
            }
            Ok(Err(e)) => {
                warn!("Bot attempt {}/{} for session {} failed: {}", attempt, attempts, session_id, e);
                last_failure = e.to_string();
            }
            Err(elapsed) => {
                warn!(
                    "Bot attempt {}/{} for session {} timed out after {:?}",
                    attempt, attempts, session_id, cfg.bot_timeout()
                );
                last_failure = Error::Timeout(elapsed).to_string();
            }
        }

        if attempt < attempts {
            sleep(cfg.bot_retry_backoff() * attempt).await;
        }
    }

    let unavailable = Error::BotUnavailable(format!(
        "no reply for session {} after {} attempt(s): {}",
        session_id, attempts, last_failure
    ));
    warn!("{}", unavailable);
    deliver(engine, session_id, &cfg.system_sender_id, SenderRole::System, &cfg.bot_unavailable_notice).await;
}

async fn deliver(engine: &ChatEngine, session_id: Uuid, sender_id: &str, role: SenderRole, content: &str) {
    match engine.append_if_bot_track(session_id, sender_id, role, content).await {
        Ok(Some(message)) => info!("Appended {} message seq {} to session {}", role, message.seq, session_id),
        Ok(None) => debug!("{} message for session {} discarded", role, session_id),
        Err(e) if e.is_expected() => debug!("{} message for session {} not appended: {}", role, session_id, e),
        Err(e) => error!("Failed to append {} message to session {}: {}", role, session_id, e),
    }
}
