use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;

use chatrelay_core::domain::conversation::{Conversation, SenderId};
use chatrelay_core::domain::message::{MessageId, StoredMessage};
use chatrelay_core::domain::tool::ToolExecutionRecord;

use crate::DbPool;

pub mod conversation;
pub mod memory;
pub mod message;
pub mod stats;
pub mod tool_execution;

pub use conversation::SqlConversationRepository;
pub use memory::{
    InMemoryConversationRepository, InMemoryMessageRepository, InMemoryToolExecutionRepository,
};
pub use message::SqlMessageRepository;
pub use stats::SqlStatsRepository;
pub use tool_execution::SqlToolExecutionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ConversationRepository: Send + Sync {
    async fn find_by_sender(
        &self,
        sender_id: &SenderId,
    ) -> Result<Option<Conversation>, RepositoryError>;

    /// Returns the sender's conversation, creating an empty one on first contact.
    async fn get_or_create(&self, sender_id: &SenderId) -> Result<Conversation, RepositoryError>;

    async fn update(&self, conversation: &Conversation) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn save(&self, message: &StoredMessage) -> Result<(), RepositoryError>;

    /// Newest first, at most `limit` rows.
    async fn recent_for_sender(
        &self,
        sender_id: &SenderId,
        limit: u32,
    ) -> Result<Vec<StoredMessage>, RepositoryError>;
}

#[async_trait]
pub trait ToolExecutionRepository: Send + Sync {
    async fn save(&self, record: &ToolExecutionRecord) -> Result<(), RepositoryError>;

    async fn list_for_correlation(
        &self,
        correlation_id: &MessageId,
    ) -> Result<Vec<ToolExecutionRecord>, RepositoryError>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StoreCounts {
    pub messages: u64,
    pub conversations: u64,
    pub tool_executions: u64,
}

#[async_trait]
pub trait StatsRepository: Send + Sync {
    async fn counts(&self) -> Result<StoreCounts, RepositoryError>;
}

/// The full set of stores one turn touches, shared across tasks.
#[derive(Clone)]
pub struct Repositories {
    pub conversations: Arc<dyn ConversationRepository>,
    pub messages: Arc<dyn MessageRepository>,
    pub tool_executions: Arc<dyn ToolExecutionRepository>,
    pub stats: Arc<dyn StatsRepository>,
}

impl Repositories {
    pub fn sql(pool: DbPool) -> Self {
        Self {
            conversations: Arc::new(SqlConversationRepository::new(pool.clone())),
            messages: Arc::new(SqlMessageRepository::new(pool.clone())),
            tool_executions: Arc::new(SqlToolExecutionRepository::new(pool.clone())),
            stats: Arc::new(SqlStatsRepository::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        let conversations = Arc::new(InMemoryConversationRepository::default());
        let messages = Arc::new(InMemoryMessageRepository::default());
        let tool_executions = Arc::new(InMemoryToolExecutionRepository::default());
        let stats = Arc::new(memory::InMemoryStats::new(
            conversations.clone(),
            messages.clone(),
            tool_executions.clone(),
        ));
        Self { conversations, messages, tool_executions, stats }
    }
}

pub(crate) fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column} `{raw}`: {error}")))
}

pub(crate) fn decode_error(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Decode(error.to_string())
}
