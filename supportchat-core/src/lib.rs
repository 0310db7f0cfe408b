// src/lib.rs

pub mod config;
pub mod db;
pub mod directory;
pub mod eventbus;
pub mod ledger;
pub mod repositories;
pub mod services;
pub mod state_machine;
pub mod tasks;
pub mod test_utils;
pub mod unread;

pub use config::EngineConfig;
pub use db::Database;
pub use directory::{SessionDirectory, StaffFilter};
pub use eventbus::{ChatEvent, EventBus, SessionChange};
pub use ledger::{MessageHistory, MessageLedger};
pub use services::{ChatEngine, JoinedSession};
pub use state_machine::SessionStateMachine;
pub use unread::UnreadTracker;
pub use supportchat_common::Error;
