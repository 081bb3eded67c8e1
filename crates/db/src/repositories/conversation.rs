use sqlx::Row;

use chatrelay_core::domain::conversation::{Conversation, ConversationId, SenderId};

use super::{
    decode_error, format_timestamp, parse_timestamp, ConversationRepository, RepositoryError,
};
use crate::DbPool;

pub struct SqlConversationRepository {
    pool: DbPool,
}

impl SqlConversationRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_conversation(row: &sqlx::sqlite::SqliteRow) -> Result<Conversation, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let sender_id: String = row.try_get("sender_id").map_err(decode_error)?;
    let last_message: String = row.try_get("last_message").map_err(decode_error)?;
    let message_count: i64 = row.try_get("message_count").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;
    let updated_at: String = row.try_get("updated_at").map_err(decode_error)?;

    let message_count = u32::try_from(message_count).map_err(|_| {
        RepositoryError::Decode(format!("message_count out of range: {message_count}"))
    })?;

    Ok(Conversation {
        id: ConversationId(id),
        sender_id: SenderId(sender_id),
        last_message,
        message_count,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

#[async_trait::async_trait]
impl ConversationRepository for SqlConversationRepository {
    async fn find_by_sender(
        &self,
        sender_id: &SenderId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, sender_id, last_message, message_count, created_at, updated_at
             FROM conversation WHERE sender_id = ?",
        )
        .bind(&sender_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_conversation).transpose()
    }

    async fn get_or_create(&self, sender_id: &SenderId) -> Result<Conversation, RepositoryError> {
        let fresh = Conversation::new(sender_id.clone());

        // A concurrent insert for the same sender loses quietly; the re-read returns the winner.
        sqlx::query(
            "INSERT INTO conversation (id, sender_id, last_message, message_count, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(sender_id) DO NOTHING",
        )
        .bind(&fresh.id.0)
        .bind(&fresh.sender_id.0)
        .bind(&fresh.last_message)
        .bind(i64::from(fresh.message_count))
        .bind(format_timestamp(&fresh.created_at))
        .bind(format_timestamp(&fresh.updated_at))
        .execute(&self.pool)
        .await?;

        self.find_by_sender(sender_id).await?.ok_or_else(|| {
            RepositoryError::Decode(format!("conversation for `{sender_id}` vanished after insert"))
        })
    }

    async fn update(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE conversation
             SET last_message = ?, message_count = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(&conversation.last_message)
        .bind(i64::from(conversation.message_count))
        .bind(format_timestamp(&conversation.updated_at))
        .bind(&conversation.id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
