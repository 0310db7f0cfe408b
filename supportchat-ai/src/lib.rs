pub mod memory;
pub mod models;
pub mod provider;
pub mod responder;
pub mod traits;

// Re-export public APIs
pub use memory::ConversationMemory;
pub use models::ProviderConfig;
pub use provider::OpenAIProvider;
pub use responder::{AssistantResponder, CannedResponder};
pub use traits::{ModelProvider, PromptMessage};
