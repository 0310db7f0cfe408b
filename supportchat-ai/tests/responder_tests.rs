// tests/responder_tests.rs

use std::sync::Arc;
use async_trait::async_trait;
use chrono::Utc;
use mockall::mock;
use mockall::predicate::*;
use mockall::Sequence;
use tokio::sync::Notify;
use uuid::Uuid;

use supportchat_ai::{AssistantResponder, CannedResponder, ModelProvider, PromptMessage};
use supportchat_common::models::{ChatMessage, SenderRole};
use supportchat_common::traits::BotResponder;
use supportchat_common::Error;

mock! {
    Provider {}
    #[async_trait]
    impl ModelProvider for Provider {
        fn name(&self) -> &str;
        async fn chat(&self, messages: Vec<PromptMessage>) -> anyhow::Result<String>;
    }
}

fn customer_message(session_id: Uuid, seq: u64, content: &str) -> ChatMessage {
    ChatMessage {
        id: Uuid::new_v4(),
        session_id,
        seq,
        sender_id: "cust-1".to_string(),
        sender_role: SenderRole::Customer,
        content: content.to_string(),
        sent_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_assistant_sends_conversation_history() -> Result<(), Error> {
    let session_id = Uuid::new_v4();
    let mut provider = MockProvider::new();
    provider.expect_name().return_const("mock".to_string());
    provider
        .expect_chat()
        .with(eq(vec![PromptMessage::user("hi")]))
        .times(1)
        .returning(|_| Ok("Hello! How can I help?".to_string()));
    provider
        .expect_chat()
        .with(eq(vec![
            PromptMessage::user("hi"),
            PromptMessage::assistant("Hello! How can I help?"),
            PromptMessage::user("my order is late"),
        ]))
        .times(1)
        .returning(|_| Ok("Sorry to hear that.".to_string()));

    let responder = AssistantResponder::new(Arc::new(provider));
    let first = responder.generate_reply(session_id, &customer_message(session_id, 1, "hi")).await?;
    assert_eq!(first, "Hello! How can I help?");
    let second = responder
        .generate_reply(session_id, &customer_message(session_id, 3, "my order is late"))
        .await?;
    assert_eq!(second, "Sorry to hear that.");

    responder.forget_session(session_id).await;
    assert_eq!(responder.memory().session_count().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_provider_failure_becomes_bot_unavailable() {
    let session_id = Uuid::new_v4();
    let mut provider = MockProvider::new();
    provider.expect_name().return_const("mock".to_string());
    provider
        .expect_chat()
        .returning(|_| Err(anyhow::anyhow!("API error: model overloaded")));

    let responder = AssistantResponder::new(Arc::new(provider));
    let err = responder
        .generate_reply(session_id, &customer_message(session_id, 1, "hello"))
        .await
        .unwrap_err();
    assert!(err.is_expected());
    match err {
        Error::BotUnavailable(msg) => assert!(msg.contains("model overloaded")),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test]
async fn test_canned_responder_is_deterministic() -> Result<(), Error> {
    let session_id = Uuid::new_v4();
    let bot = CannedResponder::new("fallback").with_rule(&["invoice"], "Invoices are under Account > Orders.");
    let msg = customer_message(session_id, 1, "Where can I download my INVOICE?");
    assert_eq!(bot.generate_reply(session_id, &msg).await?, "Invoices are under Account > Orders.");
    assert_eq!(bot.generate_reply(session_id, &msg).await?, "Invoices are under Account > Orders.");
    let other = customer_message(session_id, 2, "hello");
    assert_eq!(bot.generate_reply(session_id, &other).await?, "fallback");
    Ok(())
}

#[tokio::test]
async fn test_retried_turn_is_sent_and_remembered_once() -> Result<(), Error> {
    let session_id = Uuid::new_v4();
    let mut seq = Sequence::new();
    let mut provider = MockProvider::new();
    provider.expect_name().return_const("mock".to_string());
    provider
        .expect_chat()
        .with(eq(vec![PromptMessage::user("where is my order")]))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Err(anyhow::anyhow!("connection reset")));
    provider
        .expect_chat()
        .with(eq(vec![PromptMessage::user("where is my order")]))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok("It ships today.".to_string()));

    let responder = AssistantResponder::new(Arc::new(provider));
    let msg = customer_message(session_id, 1, "where is my order");
    assert!(responder.generate_reply(session_id, &msg).await.is_err());
    assert_eq!(responder.memory().session_count().await, 0);

    assert_eq!(responder.generate_reply(session_id, &msg).await?, "It ships today.");
    assert_eq!(
        responder.memory().retrieve(session_id, 10).await,
        vec![PromptMessage::user("where is my order"), PromptMessage::assistant("It ships today.")]
    );
    Ok(())
}

/// Holds every call until released.
struct GatedProvider {
    release: Arc<Notify>,
    started: Arc<Notify>,
}

#[async_trait]
impl ModelProvider for GatedProvider {
    fn name(&self) -> &str {
        "gated"
    }

    async fn chat(&self, _messages: Vec<PromptMessage>) -> anyhow::Result<String> {
        self.started.notify_one();
        self.release.notified().await;
        Ok("late answer".to_string())
    }
}

#[tokio::test]
async fn test_reply_finishing_after_forget_is_not_remembered() -> Result<(), Error> {
    let session_id = Uuid::new_v4();
    let release = Arc::new(Notify::new());
    let started = Arc::new(Notify::new());
    let responder = Arc::new(AssistantResponder::new(Arc::new(GatedProvider {
        release: release.clone(),
        started: started.clone(),
    })));

    let in_flight = {
        let responder = responder.clone();
        let msg = customer_message(session_id, 1, "hello?");
        tokio::spawn(async move { responder.generate_reply(session_id, &msg).await })
    };
    started.notified().await;
    responder.forget_session(session_id).await;
    release.notify_one();

    let reply = in_flight.await.expect("task panicked")?;
    assert_eq!(reply, "late answer");
    assert_eq!(responder.memory().session_count().await, 0);
    assert!(responder.memory().retrieve(session_id, 10).await.is_empty());
    Ok(())
}
