use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A message in the shape chat completion APIs expect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptMessage {
    /// "system", "user" or "assistant"
    pub role: String,
    pub content: String,
}

impl PromptMessage {
    pub fn system(content: &str) -> Self {
        Self { role: "system".to_string(), content: content.to_string() }
    }

    pub fn user(content: &str) -> Self {
        Self { role: "user".to_string(), content: content.to_string() }
    }

    pub fn assistant(content: &str) -> Self {
        Self { role: "assistant".to_string(), content: content.to_string() }
    }
}

/// A chat model behind some API.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the model's reply to the conversation so far.
    async fn chat(&self, messages: Vec<PromptMessage>) -> anyhow::Result<String>;
}
