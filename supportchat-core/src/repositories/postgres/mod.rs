// src/repositories/postgres/mod.rs

pub mod chat_archive;

pub use chat_archive::PostgresChatArchive;
