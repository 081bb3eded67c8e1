use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use chatrelay_core::domain::message::ChatMessage;
use chatrelay_core::domain::tool::ToolDescriptor;

/// A tool call the model asked for, with arguments left as raw JSON text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCallRequest {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompletionChoice {
    pub text: String,
    pub tool_calls: Vec<ToolCallRequest>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Completion {
    pub choices: Vec<CompletionChoice>,
    pub usage: Option<TokenUsage>,
}

impl Completion {
    pub fn first_choice(&self) -> Option<&CompletionChoice> {
        self.choices.first()
    }
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request timed out after {0:?}")]
    Timeout(Duration),
    #[error("completion transport error: {0}")]
    Transport(String),
    #[error("completion service rejected the configured credentials")]
    Unauthorized,
    #[error("completion service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("could not decode completion response: {0}")]
    Decode(String),
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDescriptor],
    ) -> Result<Completion, CompletionError>;
}
