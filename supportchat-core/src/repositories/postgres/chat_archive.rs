// src/repositories/postgres/chat_archive.rs

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use supportchat_common::models::{ChatMessage, ChatSession, SenderRole, SessionMode, SessionStatus};
pub use supportchat_common::traits::ChatArchive;
use crate::Error;

#[derive(Clone)]
pub struct PostgresChatArchive {
    pool: Pool<Postgres>,
}

impl PostgresChatArchive {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

const UPSERT_SESSION: &str = r#"
    INSERT INTO chat_sessions (
        session_id, customer_id, customer_display_name, mode, status,
        assigned_staff_id, handled_by, last_message_preview, last_message_at,
        unread_for_staff, unread_for_customer, created_at, closed_at
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
    ON CONFLICT (session_id) DO UPDATE SET
        mode = EXCLUDED.mode,
        status = EXCLUDED.status,
        assigned_staff_id = EXCLUDED.assigned_staff_id,
        handled_by = EXCLUDED.handled_by,
        last_message_preview = EXCLUDED.last_message_preview,
        last_message_at = EXCLUDED.last_message_at,
        unread_for_staff = EXCLUDED.unread_for_staff,
        unread_for_customer = EXCLUDED.unread_for_customer,
        closed_at = EXCLUDED.closed_at
"#;

async fn upsert_session<'e, E>(executor: E, s: &ChatSession) -> Result<(), Error>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query(UPSERT_SESSION)
        .bind(s.id)
        .bind(&s.customer_id)
        .bind(&s.customer_display_name)
        .bind(s.mode.to_string())
        .bind(s.status.to_string())
        .bind(&s.assigned_staff_id)
        .bind(&s.handled_by)
        .bind(&s.last_message_preview)
        .bind(s.last_message_at)
        .bind(i64::from(s.unread_for_staff))
        .bind(i64::from(s.unread_for_customer))
        .bind(s.created_at)
        .bind(s.closed_at)
        .execute(executor)
        .await?;
    Ok(())
}

fn session_from_row(row: &PgRow) -> Result<ChatSession, Error> {
    let mode: String = row.try_get("mode")?;
    let status: String = row.try_get("status")?;
    let unread_for_staff: i64 = row.try_get("unread_for_staff")?;
    let unread_for_customer: i64 = row.try_get("unread_for_customer")?;
    Ok(ChatSession {
        id: row.try_get("session_id")?,
        customer_id: row.try_get("customer_id")?,
        customer_display_name: row.try_get("customer_display_name")?,
        mode: mode.parse::<SessionMode>()?,
        status: status.parse::<SessionStatus>()?,
        assigned_staff_id: row.try_get("assigned_staff_id")?,
        handled_by: row.try_get("handled_by")?,
        last_message_preview: row.try_get("last_message_preview")?,
        last_message_at: row.try_get("last_message_at")?,
        unread_for_staff: counter_from_db(unread_for_staff),
        unread_for_customer: counter_from_db(unread_for_customer),
        created_at: row.try_get("created_at")?,
        closed_at: row.try_get("closed_at")?,
    })
}

/// Unread counters are `BIGINT` columns; anything outside `u32` is clamped.
fn counter_from_db(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}

fn message_from_row(row: &PgRow) -> Result<ChatMessage, Error> {
    let seq: i64 = row.try_get("seq")?;
    let role: String = row.try_get("sender_role")?;
    Ok(ChatMessage {
        id: row.try_get("message_id")?,
        session_id: row.try_get("session_id")?,
        seq: seq.max(0) as u64,
        sender_id: row.try_get("sender_id")?,
        sender_role: role.parse::<SenderRole>()?,
        content: row.try_get("content")?,
        sent_at: row.try_get("sent_at")?,
    })
}

#[async_trait]
impl ChatArchive for PostgresChatArchive {
    async fn save_session(&self, session: &ChatSession) -> Result<(), Error> {
        upsert_session(&self.pool, session).await
    }

    async fn record_append(&self, session: &ChatSession, message: &ChatMessage) -> Result<(), Error> {
        let mut tx = self.pool.begin().await?;
        upsert_session(&mut *tx, session).await?;
        sqlx::query(
            r#"
            INSERT INTO chat_session_messages (
                message_id, session_id, seq, sender_id, sender_role, content, sent_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
            .bind(message.id)
            .bind(message.session_id)
            .bind(message.seq as i64)
            .bind(&message.sender_id)
            .bind(message.sender_role.to_string())
            .bind(&message.content)
            .bind(message.sent_at)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn load_sessions(&self) -> Result<Vec<ChatSession>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT session_id, customer_id, customer_display_name, mode, status,
                   assigned_staff_id, handled_by, last_message_preview, last_message_at,
                   unread_for_staff, unread_for_customer, created_at, closed_at
            FROM chat_sessions
            ORDER BY created_at ASC
            "#,
        )
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(session_from_row).collect()
    }

    async fn load_messages(&self, session_id: Uuid) -> Result<Vec<ChatMessage>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT message_id, session_id, seq, sender_id, sender_role, content, sent_at
            FROM chat_session_messages
            WHERE session_id = $1
            ORDER BY seq ASC
            "#,
        )
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(message_from_row).collect()
    }
}
