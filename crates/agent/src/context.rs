use std::sync::Arc;

use tracing::warn;

use chatrelay_core::domain::conversation::{ConversationTurn, SenderId};
use chatrelay_db::repositories::MessageRepository;

/// Assembles the prompt for one turn from stored history.
pub struct ContextBuilder {
    messages: Arc<dyn MessageRepository>,
    system_prompt: String,
    history_limit: u32,
}

impl ContextBuilder {
    pub fn new(
        messages: Arc<dyn MessageRepository>,
        system_prompt: impl Into<String>,
        history_limit: u32,
    ) -> Self {
        Self { messages, system_prompt: system_prompt.into(), history_limit }
    }

    /// A storage failure degrades to an empty history; the turn goes on.
    pub async fn build(&self, sender_id: &SenderId, inbound_text: &str) -> ConversationTurn {
        let (history, history_degraded) =
            match self.messages.recent_for_sender(sender_id, self.history_limit).await {
                Ok(mut recent) => {
                    recent.reverse();
                    (recent.iter().map(|message| message.to_chat_message()).collect(), false)
                }
                Err(error) => {
                    warn!(
                        event_name = "turn.context.degraded",
                        sender_id = %sender_id,
                        error = %error,
                        "history unavailable, continuing without it"
                    );
                    (Vec::new(), true)
                }
            };

        ConversationTurn {
            sender_id: sender_id.clone(),
            system_prompt: self.system_prompt.clone(),
            history,
            inbound_text: inbound_text.to_string(),
            history_degraded,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chatrelay_core::domain::conversation::SenderId;
    use chatrelay_core::domain::message::{ChatMessage, ChatRole, MessageId, StoredMessage};
    use chatrelay_db::repositories::{InMemoryMessageRepository, MessageRepository};

    use super::ContextBuilder;
    use crate::test_support::FailingMessageRepository;

    #[tokio::test]
    async fn prompt_is_system_then_chronological_history_then_inbound() {
        let repo = Arc::new(InMemoryMessageRepository::default());
        let sender = SenderId("628100".to_string());
        repo.save(&StoredMessage::inbound(MessageId::generate(), sender.clone(), "T1"))
            .await
            .expect("T1");
        repo.save(&StoredMessage::outbound(sender.clone(), "T2")).await.expect("T2");
        repo.save(&StoredMessage::inbound(MessageId::generate(), sender.clone(), "T3"))
            .await
            .expect("T3");

        let builder = ContextBuilder::new(repo, "system text", 10);
        let turn = builder.build(&sender, "new").await;

        assert!(!turn.history_degraded);
        assert_eq!(
            turn.prompt(),
            vec![
                ChatMessage::system("system text"),
                ChatMessage::user("T1"),
                ChatMessage::assistant("T2"),
                ChatMessage::user("T3"),
                ChatMessage::user("new"),
            ]
        );
    }

    #[tokio::test]
    async fn history_is_capped_to_the_newest_entries() {
        let repo = Arc::new(InMemoryMessageRepository::default());
        let sender = SenderId("628100".to_string());
        for content in ["old", "mid", "recent"] {
            repo.save(&StoredMessage::outbound(sender.clone(), content)).await.expect("save");
        }
        repo.save(&StoredMessage::outbound(SenderId("other".to_string()), "foreign"))
            .await
            .expect("save other");

        let turn = ContextBuilder::new(repo, "sys", 2).build(&sender, "now").await;

        let contents: Vec<&str> =
            turn.history.iter().map(|message| message.content.as_str()).collect();
        assert_eq!(contents, vec!["mid", "recent"]);
        assert!(turn.history.iter().all(|message| message.role == ChatRole::Assistant));
    }

    #[tokio::test]
    async fn storage_failure_degrades_to_empty_history() {
        let builder = ContextBuilder::new(Arc::new(FailingMessageRepository), "sys", 10);

        let turn = builder.build(&SenderId("628100".to_string()), "hello").await;

        assert!(turn.history_degraded);
        assert_eq!(turn.prompt(), vec![ChatMessage::system("sys"), ChatMessage::user("hello")]);
    }
}
