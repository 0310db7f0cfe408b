// File: supportchat-core/src/test_utils/helpers.rs

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;

use supportchat_common::Error;
use supportchat_common::traits::BotResponder;
use crate::config::EngineConfig;
use crate::eventbus::{ChatEvent, EventBus};
use crate::services::ChatEngine;

/// How long helpers wait for an event before giving up.
pub const EVENT_WAIT: Duration = Duration::from_secs(2);

/// Config with short bot deadlines so failure paths finish quickly in tests.
pub fn fast_config() -> EngineConfig {
    EngineConfig {
        bot_max_attempts: 2,
        bot_timeout_ms: 200,
        bot_retry_backoff_ms: 10,
        ..EngineConfig::default()
    }
}

/// Engine with no assistant and no archive.
pub fn test_engine() -> ChatEngine {
    test_engine_with_config(fast_config())
}

pub fn test_engine_with_config(config: EngineConfig) -> ChatEngine {
    let bus = Arc::new(EventBus::with_buffer_size(config.subscriber_buffer));
    ChatEngine::new(config, bus, None, None)
}

pub fn test_engine_with_bot(config: EngineConfig, bot: Arc<dyn BotResponder>) -> ChatEngine {
    let bus = Arc::new(EventBus::with_buffer_size(config.subscriber_buffer));
    ChatEngine::new(config, bus, Some(bot), None)
}

/// Next event, or an error if none arrives within `EVENT_WAIT`.
pub async fn next_event(rx: &mut mpsc::Receiver<ChatEvent>) -> Result<ChatEvent, Error> {
    match timeout(EVENT_WAIT, rx.recv()).await? {
        Some(evt) => Ok(evt),
        None => Err(Error::EventBus("event stream closed".into())),
    }
}

/// Skips events until one satisfies `pred`.
pub async fn wait_for_event<P>(rx: &mut mpsc::Receiver<ChatEvent>, mut pred: P) -> Result<ChatEvent, Error>
where
    P: FnMut(&ChatEvent) -> bool,
{
    loop {
        let evt = next_event(rx).await?;
        if pred(&evt) {
            return Ok(evt);
        }
    }
}

/// Connects to the test database (`TEST_DATABASE_URL`, else a local default),
/// applies migrations and wipes the chat tables.
pub async fn setup_test_database() -> Result<crate::db::Database, Error> {
    let url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgres://supportchat@localhost/supportchat_test".to_string());
    let db = crate::db::Database::new(&url).await?;
    db.migrate().await?;
    sqlx::query("TRUNCATE chat_session_messages, chat_sessions CASCADE")
        .execute(db.pool())
        .await?;
    Ok(db)
}
