use sqlx::Row;

use chatrelay_core::domain::message::MessageId;
use chatrelay_core::domain::tool::{ToolExecutionId, ToolExecutionRecord};

use super::{
    decode_error, format_timestamp, parse_timestamp, RepositoryError, ToolExecutionRepository,
};
use crate::DbPool;

pub struct SqlToolExecutionRepository {
    pool: DbPool,
}

impl SqlToolExecutionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> Result<ToolExecutionRecord, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode_error)?;
    let correlation_id: String = row.try_get("correlation_id").map_err(decode_error)?;
    let call_id: String = row.try_get("call_id").map_err(decode_error)?;
    let tool_name: String = row.try_get("tool_name").map_err(decode_error)?;
    let arguments_json: String = row.try_get("arguments_json").map_err(decode_error)?;
    let result_json: Option<String> = row.try_get("result_json").map_err(decode_error)?;
    let error_message: Option<String> = row.try_get("error_message").map_err(decode_error)?;
    let success: bool = row.try_get("success").map_err(decode_error)?;
    let duration_ms: i64 = row.try_get("duration_ms").map_err(decode_error)?;
    let created_at: String = row.try_get("created_at").map_err(decode_error)?;

    let duration_ms = u64::try_from(duration_ms)
        .map_err(|_| RepositoryError::Decode(format!("negative duration_ms: {duration_ms}")))?;

    Ok(ToolExecutionRecord {
        id: ToolExecutionId(id),
        correlation_id: MessageId(correlation_id),
        call_id,
        tool_name,
        arguments_json,
        result_json,
        error_message,
        success,
        duration_ms,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

#[async_trait::async_trait]
impl ToolExecutionRepository for SqlToolExecutionRepository {
    async fn save(&self, record: &ToolExecutionRecord) -> Result<(), RepositoryError> {
        let duration_ms = i64::try_from(record.duration_ms).unwrap_or(i64::MAX);

        sqlx::query(
            "INSERT INTO tool_execution (id, correlation_id, call_id, tool_name, arguments_json,
                                         result_json, error_message, success, duration_ms, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&record.id.0)
        .bind(&record.correlation_id.0)
        .bind(&record.call_id)
        .bind(&record.tool_name)
        .bind(&record.arguments_json)
        .bind(&record.result_json)
        .bind(&record.error_message)
        .bind(record.success)
        .bind(duration_ms)
        .bind(format_timestamp(&record.created_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_correlation(
        &self,
        correlation_id: &MessageId,
    ) -> Result<Vec<ToolExecutionRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, correlation_id, call_id, tool_name, arguments_json, result_json,
                    error_message, success, duration_ms, created_at
             FROM tool_execution
             WHERE correlation_id = ?
             ORDER BY created_at ASC, rowid ASC",
        )
        .bind(&correlation_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_record).collect()
    }
}
