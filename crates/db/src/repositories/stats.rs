use sqlx::Row;

use super::{decode_error, RepositoryError, StatsRepository, StoreCounts};
use crate::DbPool;

pub struct SqlStatsRepository {
    pool: DbPool,
}

impl SqlStatsRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn non_negative(column: &str, value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| RepositoryError::Decode(format!("{column} is negative")))
}

#[async_trait::async_trait]
impl StatsRepository for SqlStatsRepository {
    async fn counts(&self) -> Result<StoreCounts, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                 (SELECT COUNT(*) FROM message) AS messages,
                 (SELECT COUNT(*) FROM conversation) AS conversations,
                 (SELECT COUNT(*) FROM tool_execution) AS tool_executions",
        )
        .fetch_one(&self.pool)
        .await?;

        let messages: i64 = row.try_get("messages").map_err(decode_error)?;
        let conversations: i64 = row.try_get("conversations").map_err(decode_error)?;
        let tool_executions: i64 = row.try_get("tool_executions").map_err(decode_error)?;

        Ok(StoreCounts {
            messages: non_negative("messages", messages)?,
            conversations: non_negative("conversations", conversations)?,
            tool_executions: non_negative("tool_executions", tool_executions)?,
        })
    }
}
