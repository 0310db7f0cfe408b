use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use crate::models::ProviderConfig;
use crate::traits::{ModelProvider, PromptMessage};

/// OpenAI-compatible chat completion provider
pub struct OpenAIProvider {
    config: ProviderConfig,
    client: Client,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider with the given configuration
    pub fn new(config: ProviderConfig) -> Self {
        let client = Client::new();
        Self { config, client }
    }

    /// Builds the `/chat/completions` payload, adding the configured system
    /// prompt if the conversation does not start with one.
    pub fn build_payload(&self, messages: &[PromptMessage]) -> Value {
        let has_system_message = messages.iter().any(|msg| msg.role == "system");

        let mut all_messages = Vec::with_capacity(messages.len() + 1);
        if !has_system_message {
            if let Some(system_prompt) = &self.config.system_prompt {
                all_messages.push(json!({
                    "role": "system",
                    "content": system_prompt
                }));
            }
        }
        all_messages.extend(messages.iter().map(|msg| {
            json!({
                "role": msg.role,
                "content": msg.content
            })
        }));

        json!({
            "model": self.config.default_model,
            "messages": all_messages,
            "max_tokens": self.config.max_tokens,
        })
    }
}

/// Pulls the first choice's content out of a chat completion response body.
pub fn parse_chat_response(response_text: &str) -> anyhow::Result<String> {
    let data = match serde_json::from_str::<Value>(response_text) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!("Failed to parse API response as JSON: {:?}", e);
            return Err(anyhow::anyhow!("API returned non-JSON response: {}", e));
        }
    };

    // Check for API errors
    if let Some(error) = data.get("error") {
        tracing::error!("API returned error: {:?}", error);
        let error_message = error.get("message").and_then(|m| m.as_str()).unwrap_or("Unknown error");
        return Err(anyhow::anyhow!("API error: {}", error_message));
    }

    let choices = data
        .get("choices")
        .and_then(|c| c.as_array())
        .ok_or_else(|| anyhow::anyhow!("Response missing 'choices' array"))?;

    let first = choices.first().ok_or_else(|| anyhow::anyhow!("No completions returned"))?;

    let content = first
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(|c| c.as_str())
        .ok_or_else(|| anyhow::anyhow!("Response message missing 'content'"))?
        .trim()
        .to_string();

    if content.is_empty() {
        return Err(anyhow::anyhow!("Model returned an empty reply"));
    }
    Ok(content)
}

#[async_trait]
impl ModelProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn chat(&self, messages: Vec<PromptMessage>) -> anyhow::Result<String> {
        let api_base = self.config.api_base();
        let request_payload = self.build_payload(&messages);

        tracing::debug!(
            "Making API call to {}/chat/completions ({} message(s), model={})",
            api_base,
            messages.len(),
            self.config.default_model
        );

        let response = self.client
            .post(format!("{}/chat/completions", api_base))
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&request_payload)
            .send()
            .await?;

        let status = response.status();
        // Get the raw response text first for better error handling
        let response_text = response.text().await?;
        tracing::debug!("Raw API response ({}): {}", status, response_text);

        if !status.is_success() && !response_text.contains("\"error\"") {
            return Err(anyhow::anyhow!("API returned HTTP {}", status));
        }
        parse_chat_response(&response_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_added_once() {
        let provider = OpenAIProvider::new(ProviderConfig::new("sk-test", "gpt-4o-mini"));

        let payload = provider.build_payload(&[PromptMessage::user("hi")]);
        let msgs = payload["messages"].as_array().unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0]["role"], "system");
        assert_eq!(msgs[1]["content"], "hi");
        assert_eq!(payload["model"], "gpt-4o-mini");

        let payload = provider.build_payload(&[PromptMessage::system("custom"), PromptMessage::user("hi")]);
        let msgs = payload["messages"].as_array().unwrap();
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0]["content"], "custom");
    }

    #[test]
    fn test_parse_chat_response() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"  Your parcel ships today. "}}]}"#;
        assert_eq!(parse_chat_response(body).unwrap(), "Your parcel ships today.");

        let err = parse_chat_response(r#"{"error":{"message":"rate limited"}}"#).unwrap_err();
        assert!(err.to_string().contains("rate limited"));

        assert!(parse_chat_response(r#"{"choices":[]}"#).is_err());
        assert!(parse_chat_response("<html>bad gateway</html>").is_err());
        assert!(parse_chat_response(r#"{"choices":[{"message":{"content":""}}]}"#).is_err());
    }
}
