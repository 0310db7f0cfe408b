// File: src/services/mod.rs

pub mod chat_engine;
pub mod bot_dispatch;

pub use chat_engine::{ChatEngine, JoinedSession};
