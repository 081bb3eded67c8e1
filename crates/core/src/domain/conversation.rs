use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::message::ChatMessage;

/// Gateway-level identity of the person on the other end (a phone number for WhatsApp).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SenderId(pub String);

impl fmt::Display for SenderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub String);

/// Running summary of everything exchanged with one sender.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub sender_id: SenderId,
    pub last_message: String,
    pub message_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(sender_id: SenderId) -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId(format!("conv-{}", Uuid::new_v4())),
            sender_id,
            last_message: String::new(),
            message_count: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn record_turn(&mut self, inbound_text: &str) {
        self.last_message = inbound_text.to_string();
        self.message_count = self.message_count.saturating_add(1);
        self.updated_at = Utc::now();
    }
}

/// Everything the completion service sees for one turn. Built per turn and
/// never stored as a unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConversationTurn {
    pub sender_id: SenderId,
    pub system_prompt: String,
    /// Prior messages in chronological order.
    pub history: Vec<ChatMessage>,
    pub inbound_text: String,
    pub history_degraded: bool,
}

impl ConversationTurn {
    /// `[system, history.., user]`
    pub fn prompt(&self) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(ChatMessage::system(self.system_prompt.clone()));
        messages.extend(self.history.iter().cloned());
        messages.push(ChatMessage::user(self.inbound_text.clone()));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::{Conversation, ConversationTurn, SenderId};
    use crate::domain::message::{ChatMessage, ChatRole};

    #[test]
    fn record_turn_updates_summary_and_counter() {
        let mut conversation = Conversation::new(SenderId("628111".to_string()));
        let created_at = conversation.created_at;

        conversation.record_turn("first");
        conversation.record_turn("second");

        assert_eq!(conversation.last_message, "second");
        assert_eq!(conversation.message_count, 2);
        assert!(conversation.updated_at >= created_at);
    }

    #[test]
    fn counter_saturates_instead_of_wrapping() {
        let mut conversation = Conversation::new(SenderId("628111".to_string()));
        conversation.message_count = u32::MAX;

        conversation.record_turn("again");

        assert_eq!(conversation.message_count, u32::MAX);
    }

    #[test]
    fn prompt_wraps_history_between_system_and_inbound() {
        let turn = ConversationTurn {
            sender_id: SenderId("628111".to_string()),
            system_prompt: "be nice".to_string(),
            history: vec![ChatMessage::user("hi"), ChatMessage::assistant("hello")],
            inbound_text: "draw a cat".to_string(),
            history_degraded: false,
        };

        let prompt = turn.prompt();
        let roles: Vec<ChatRole> = prompt.iter().map(|message| message.role).collect();

        assert_eq!(
            roles,
            vec![ChatRole::System, ChatRole::User, ChatRole::Assistant, ChatRole::User]
        );
        assert_eq!(prompt[0].content, "be nice");
        assert_eq!(prompt[3].content, "draw a cat");
    }
}
