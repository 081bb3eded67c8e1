use sqlx::Row;

use chatrelay_core::domain::conversation::SenderId;
use chatrelay_core::domain::message::{MessageDirection, MessageId, MessageKind, StoredMessage};

use super::{decode_error, format_timestamp, parse_timestamp, MessageRepository, RepositoryError};
use crate::DbPool;

pub struct SqlMessageRepository {
    pool: DbPool,
}

impl SqlMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<StoredMessage, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let sender_id: String = row.try_get("sender_id").map_err(decode_error)?;
    let direction: String = row.try_get("direction").map_err(decode_error)?;
    let kind: String = row.try_get("kind").map_err(decode_error)?;
    let content: String = row.try_get("content").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;

    let direction = MessageDirection::parse(&direction)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown direction `{direction}`")))?;
    let kind = MessageKind::parse(&kind)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown message kind `{kind}`")))?;

    Ok(StoredMessage {
        id: MessageId(id),
        sender_id: SenderId(sender_id),
        direction,
        kind,
        content,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

#[async_trait::async_trait]
impl MessageRepository for SqlMessageRepository {
    async fn save(&self, message: &StoredMessage) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO message (id, sender_id, direction, kind, content, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&message.id.0)
        .bind(&message.sender_id.0)
        .bind(message.direction.as_str())
        .bind(message.kind.as_str())
        .bind(&message.content)
        .bind(format_timestamp(&message.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_for_sender(
        &self,
        sender_id: &SenderId,
        limit: u32,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, sender_id, direction, kind, content, created_at
             FROM message
             WHERE sender_id = ?
             ORDER BY created_at DESC, rowid DESC
             LIMIT ?",
        )
        .bind(&sender_id.0)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_message).collect()
    }
}
