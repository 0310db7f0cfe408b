use serde::{Serialize, Deserialize};

pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are the first-line support assistant for an online shop. \
Answer briefly and politely. If you cannot resolve the problem, tell the customer they can ask to talk to a person.";

/// Configuration for an OpenAI-compatible chat completion endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Base URL for API requests (defaults to the public OpenAI API)
    pub api_base: Option<String>,

    /// API key for authentication
    pub api_key: String,

    /// Model to request
    pub default_model: String,

    /// Prepended to every conversation unless the prompt already carries one
    pub system_prompt: Option<String>,

    pub max_tokens: u32,
}

impl ProviderConfig {
    pub fn new(api_key: &str, default_model: &str) -> Self {
        Self {
            api_base: None,
            api_key: api_key.to_string(),
            default_model: default_model.to_string(),
            system_prompt: Some(DEFAULT_SYSTEM_PROMPT.to_string()),
            max_tokens: 500,
        }
    }

    /// Reads `OPENAI_API_KEY`, plus optional `SUPPORTCHAT_AI_MODEL` and
    /// `SUPPORTCHAT_AI_API_BASE`. Returns `None` when no key is set.
    pub fn from_env() -> Option<Self> {
        let key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.trim().is_empty())?;
        let model = std::env::var("SUPPORTCHAT_AI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
        let mut cfg = Self::new(&key, &model);
        cfg.api_base = std::env::var("SUPPORTCHAT_AI_API_BASE").ok();
        Some(cfg)
    }

    pub fn api_base(&self) -> &str {
        self.api_base.as_deref().unwrap_or(DEFAULT_API_BASE)
    }
}

/// One remembered turn of a session's conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub session_id: uuid::Uuid,

    /// Timestamp of when this memory was created
    pub timestamp: chrono::DateTime<chrono::Utc>,

    pub message: crate::traits::PromptMessage,
}
