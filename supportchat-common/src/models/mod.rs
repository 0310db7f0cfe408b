// File: supportchat-common/src/models/mod.rs
pub mod session;
pub mod message;

pub use session::{Audience, ChatSession, SessionMode, SessionState, SessionStatus, Viewer};
pub use message::{ChatMessage, MessagePage, SenderRole};
