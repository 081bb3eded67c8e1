use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::Value;

use chatrelay_core::domain::conversation::SenderId;
use chatrelay_core::domain::message::{ChatMessage, MessageId, StoredMessage};
use chatrelay_core::domain::schema::{ParameterSchema, ToolArgs};
use chatrelay_core::domain::tool::{ToolDescriptor, ToolExecutionRecord};
use chatrelay_db::repositories::{MessageRepository, RepositoryError, ToolExecutionRepository};

use crate::gateway::{DeliveryReceipt, GatewayError, MessagingGateway};
use crate::llm::{Completion, CompletionChoice, CompletionClient, CompletionError};
use crate::tools::Tool;

pub struct ScriptedCompletion {
    outcome: Result<Completion, String>,
    delay: Option<Duration>,
    pub calls: AtomicUsize,
    requests: Mutex<Vec<(Vec<ChatMessage>, Vec<String>)>>,
}

impl ScriptedCompletion {
    pub fn new(outcome: Result<Completion, CompletionError>) -> Self {
        Self {
            outcome: outcome.map_err(|error| error.to_string()),
            delay: None,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(text: &str) -> Self {
        Self::with_choice(CompletionChoice { text: text.to_string(), tool_calls: Vec::new() })
    }

    pub fn with_choice(choice: CompletionChoice) -> Self {
        Self::new(Ok(Completion { choices: vec![choice], usage: None }))
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Prompt contents and advertised tool names, per call.
    pub fn requests(&self) -> Vec<(Vec<ChatMessage>, Vec<String>)> {
        self.requests.lock().expect("requests lock").clone()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDescriptor],
    ) -> Result<Completion, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().expect("requests lock").push((
            messages.to_vec(),
            tools.iter().map(|descriptor| descriptor.name.clone()).collect(),
        ));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.outcome {
            Ok(completion) => Ok(completion.clone()),
            Err(message) => Err(CompletionError::Transport(message.clone())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sent {
    Text(String),
    Image { url: String, caption: String },
}

/// Keeps every message that was delivered successfully.
#[derive(Default)]
pub struct RecordingGateway {
    sent: Mutex<Vec<(SenderId, Sent)>>,
    fail_images: bool,
}

impl RecordingGateway {
    pub fn failing_images() -> Self {
        Self { fail_images: true, ..Self::default() }
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().expect("sent lock").iter().map(|(_, sent)| sent.clone()).collect()
    }

    fn record(&self, target: &SenderId, sent: Sent) -> DeliveryReceipt {
        let mut log = self.sent.lock().expect("sent lock");
        log.push((target.clone(), sent));
        DeliveryReceipt { message_id: Some(format!("fake-{}", log.len())), detail: "sent".to_string() }
    }
}

#[async_trait]
impl MessagingGateway for RecordingGateway {
    async fn send_text(
        &self,
        target: &SenderId,
        text: &str,
    ) -> Result<DeliveryReceipt, GatewayError> {
        Ok(self.record(target, Sent::Text(text.to_string())))
    }

    async fn send_image(
        &self,
        target: &SenderId,
        image_url: &str,
        caption: &str,
    ) -> Result<DeliveryReceipt, GatewayError> {
        if self.fail_images {
            return Err(GatewayError::Rejected("media sending disabled".to_string()));
        }
        Ok(self.record(
            target,
            Sent::Image { url: image_url.to_string(), caption: caption.to_string() },
        ))
    }
}

/// Tool with a fixed answer and a `prompt` string parameter.
pub struct ScriptedTool {
    name: &'static str,
    outcome: Result<Value, &'static str>,
    schema: ParameterSchema,
    calls: Arc<AtomicUsize>,
}

impl ScriptedTool {
    pub fn succeeding(name: &'static str, value: Value) -> Self {
        Self::build(name, Ok(value))
    }

    pub fn failing(name: &'static str, message: &'static str) -> Self {
        Self::build(name, Err(message))
    }

    fn build(name: &'static str, outcome: Result<Value, &'static str>) -> Self {
        Self {
            name,
            outcome,
            schema: ParameterSchema::object().property("prompt", ParameterSchema::string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn requiring(mut self, field: &str) -> Self {
        self.schema = self.schema.require(field);
        self
    }

    pub fn calls(&self) -> Arc<AtomicUsize> {
        self.calls.clone()
    }
}

#[async_trait]
impl Tool for ScriptedTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Scripted test tool"
    }

    fn parameters(&self) -> ParameterSchema {
        self.schema.clone()
    }

    async fn execute(&self, _args: &ToolArgs) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.outcome {
            Ok(value) => Ok(value.clone()),
            Err(message) => Err(anyhow!(*message)),
        }
    }
}

pub struct SlowTool {
    pub name: &'static str,
    pub delay: Duration,
}

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Sleeps before answering"
    }

    fn parameters(&self) -> ParameterSchema {
        ParameterSchema::object()
    }

    async fn execute(&self, _args: &ToolArgs) -> Result<Value> {
        tokio::time::sleep(self.delay).await;
        Ok(Value::Null)
    }
}

pub struct FailingMessageRepository;

#[async_trait]
impl MessageRepository for FailingMessageRepository {
    async fn save(&self, _message: &StoredMessage) -> Result<(), RepositoryError> {
        Err(RepositoryError::Decode("message store offline".to_string()))
    }

    async fn recent_for_sender(
        &self,
        _sender_id: &SenderId,
        _limit: u32,
    ) -> Result<Vec<StoredMessage>, RepositoryError> {
        Err(RepositoryError::Decode("message store offline".to_string()))
    }
}

pub struct FailingToolExecutionRepository;

#[async_trait]
impl ToolExecutionRepository for FailingToolExecutionRepository {
    async fn save(&self, _record: &ToolExecutionRecord) -> Result<(), RepositoryError> {
        Err(RepositoryError::Decode("audit store offline".to_string()))
    }

    async fn list_for_correlation(
        &self,
        _correlation_id: &MessageId,
    ) -> Result<Vec<ToolExecutionRecord>, RepositoryError> {
        Ok(Vec::new())
    }
}
