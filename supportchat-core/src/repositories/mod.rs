// src/repositories/mod.rs

pub mod postgres;

pub use supportchat_common::traits::ChatArchive;
pub use postgres::PostgresChatArchive;
