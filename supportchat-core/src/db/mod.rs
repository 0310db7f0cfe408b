// supportchat-core/src/db/mod.rs

//! Postgres connection for the optional chat archive.
//!
//! One pool serves the whole process. Every session write-through borrows a
//! connection from it while holding that session's lock, so the pool size caps
//! how many sessions can be writing to the archive at the same moment.

use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use tracing::info;

use crate::repositories::postgres::PostgresChatArchive;
use crate::Error;

/// Pool size used by `Database::new`.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Clone)]
pub struct Database {
    pool: Pool<Postgres>,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, Error> {
        Self::connect_with(database_url, DEFAULT_MAX_CONNECTIONS).await
    }

    pub async fn connect_with(database_url: &str, max_connections: u32) -> Result<Self, Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect(database_url)
            .await?;

        info!("Connected to Postgres (pool of {}).", max_connections.max(1));
        Ok(Self { pool })
    }

    /// Applies the chat schema from the workspace `migrations/` folder.
    pub async fn migrate(&self) -> Result<(), Error> {
        info!("Applying chat archive migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Chat archive schema is up to date.");
        Ok(())
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }

    /// Archive backed by this pool.
    pub fn archive(&self) -> PostgresChatArchive {
        PostgresChatArchive::new(self.pool.clone())
    }
}
