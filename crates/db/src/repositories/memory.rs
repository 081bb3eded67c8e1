use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use chatrelay_core::domain::conversation::{Conversation, SenderId};
use chatrelay_core::domain::message::{MessageId, StoredMessage};
use chatrelay_core::domain::tool::ToolExecutionRecord;

use super::{
    ConversationRepository, MessageRepository, RepositoryError, StatsRepository, StoreCounts,
    ToolExecutionRepository,
};

#[derive(Default)]
pub struct InMemoryConversationRepository {
    conversations: RwLock<HashMap<SenderId, Conversation>>,
}

#[async_trait::async_trait]
impl ConversationRepository for InMemoryConversationRepository {
    async fn find_by_sender(
        &self,
        sender_id: &SenderId,
    ) -> Result<Option<Conversation>, RepositoryError> {
        let conversations = self.conversations.read().await;
        Ok(conversations.get(sender_id).cloned())
    }

    async fn get_or_create(&self, sender_id: &SenderId) -> Result<Conversation, RepositoryError> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .entry(sender_id.clone())
            .or_insert_with(|| Conversation::new(sender_id.clone()));
        Ok(conversation.clone())
    }

    async fn update(&self, conversation: &Conversation) -> Result<(), RepositoryError> {
        let mut conversations = self.conversations.write().await;
        conversations.insert(conversation.sender_id.clone(), conversation.clone());
        Ok(())
    }
}

/// Insertion-ordered; the last element is the newest.
#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<Vec<StoredMessage>>,
}

#[async_trait::async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn save(&self, message: &StoredMessage) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;
        if messages.iter().any(|existing| existing.id == message.id) {
            return Err(RepositoryError::Decode(format!("duplicate message id `{}`", message.id.0)));
        }
        messages.push(message.clone());
        Ok(())
    }

    async fn recent_for_sender(
        &self,
        sender_id: &SenderId,
        limit: u32,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        let messages = self.messages.read().await;
        Ok(messages
            .iter()
            .rev()
            .filter(|message| &message.sender_id == sender_id)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryToolExecutionRepository {
    records: RwLock<Vec<ToolExecutionRecord>>,
}

#[async_trait::async_trait]
impl ToolExecutionRepository for InMemoryToolExecutionRepository {
    async fn save(&self, record: &ToolExecutionRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        records.push(record.clone());
        Ok(())
    }

    async fn list_for_correlation(
        &self,
        correlation_id: &MessageId,
    ) -> Result<Vec<ToolExecutionRecord>, RepositoryError> {
        let records = self.records.read().await;
        Ok(records.iter().filter(|record| &record.correlation_id == correlation_id).cloned().collect())
    }
}

pub struct InMemoryStats {
    conversations: Arc<InMemoryConversationRepository>,
    messages: Arc<InMemoryMessageRepository>,
    tool_executions: Arc<InMemoryToolExecutionRepository>,
}

impl InMemoryStats {
    pub fn new(
        conversations: Arc<InMemoryConversationRepository>,
        messages: Arc<InMemoryMessageRepository>,
        tool_executions: Arc<InMemoryToolExecutionRepository>,
    ) -> Self {
        Self { conversations, messages, tool_executions }
    }
}

#[async_trait::async_trait]
impl StatsRepository for InMemoryStats {
    async fn counts(&self) -> Result<StoreCounts, RepositoryError> {
        Ok(StoreCounts {
            messages: self.messages.messages.read().await.len() as u64,
            conversations: self.conversations.conversations.read().await.len() as u64,
            tool_executions: self.tool_executions.records.read().await.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use chatrelay_core::domain::conversation::SenderId;
    use chatrelay_core::domain::message::{MessageId, StoredMessage};
    use chatrelay_core::domain::tool::{
        ExecutionOutcome, ToolExecutionRecord, ToolInvocationRequest,
    };

    use crate::repositories::{
        ConversationRepository, InMemoryConversationRepository, InMemoryMessageRepository,
        MessageRepository, Repositories, StoreCounts,
    };

    #[tokio::test]
    async fn in_memory_conversation_get_or_create_reuses_entry() {
        let repo = InMemoryConversationRepository::default();
        let sender = SenderId("628".to_string());

        let mut conversation = repo.get_or_create(&sender).await.expect("create");
        conversation.record_turn("hello");
        repo.update(&conversation).await.expect("update");

        let again = repo.get_or_create(&sender).await.expect("reuse");
        assert_eq!(again.id, conversation.id);
        assert_eq!(again.message_count, 1);
    }

    #[tokio::test]
    async fn in_memory_messages_are_newest_first() {
        let repo = InMemoryMessageRepository::default();
        let sender = SenderId("628".to_string());

        for content in ["one", "two", "three"] {
            repo.save(&StoredMessage::inbound(MessageId::generate(), sender.clone(), content))
                .await
                .expect("save");
        }

        let recent = repo.recent_for_sender(&sender, 2).await.expect("recent");
        let contents: Vec<&str> = recent.iter().map(|message| message.content.as_str()).collect();
        assert_eq!(contents, vec!["three", "two"]);
    }

    #[tokio::test]
    async fn in_memory_bundle_reports_counts() {
        let repos = Repositories::in_memory();
        let sender = SenderId("628".to_string());
        let request = ToolInvocationRequest {
            correlation_id: MessageId("msg-1".to_string()),
            call_id: "call_1".to_string(),
            tool_name: "generate_image".to_string(),
            raw_arguments: "{}".to_string(),
        };
        let outcome = ExecutionOutcome::succeeded("generate_image", json!({}), 1);

        repos.conversations.get_or_create(&sender).await.expect("conversation");
        repos.messages.save(&StoredMessage::outbound(sender, "hi")).await.expect("message");
        repos
            .tool_executions
            .save(&ToolExecutionRecord::from_outcome(&request, &outcome))
            .await
            .expect("record");

        let counts = repos.stats.counts().await.expect("counts");
        assert_eq!(counts, StoreCounts { messages: 1, conversations: 1, tool_executions: 1 });
    }
}
