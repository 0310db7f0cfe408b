// File: supportchat-common/src/traits/mod.rs
pub mod bot_traits;
pub mod repository_traits;

pub use bot_traits::BotResponder;
pub use repository_traits::ChatArchive;
