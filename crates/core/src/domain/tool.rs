use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::domain::message::MessageId;
use crate::domain::schema::ParameterSchema;

/// Declarative description of a tool as advertised to the completion service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: ParameterSchema,
}

impl ToolDescriptor {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: ParameterSchema,
    ) -> Self {
        Self { name: name.into(), description: description.into(), parameters }
    }

    /// Function-calling form used by OpenAI-compatible chat APIs.
    pub fn to_function_json(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters.to_json_schema(),
            }
        })
    }
}

/// One tool call found in a completion response.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocationRequest {
    /// Id of the inbound message that triggered the turn.
    pub correlation_id: MessageId,
    /// Id the completion service assigned to this call.
    pub call_id: String,
    pub tool_name: String,
    /// Argument object exactly as the model produced it.
    pub raw_arguments: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolFailureKind {
    NotFound,
    InvalidArguments,
    ExecutionFailed,
}

impl ToolFailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "tool_not_found",
            Self::InvalidArguments => "invalid_arguments",
            Self::ExecutionFailed => "tool_execution_failed",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolFailure {
    pub kind: ToolFailureKind,
    pub message: String,
}

/// Result of one dispatch, handed straight back to the orchestrator.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub tool_name: String,
    pub success: bool,
    pub result: Option<Value>,
    pub failure: Option<ToolFailure>,
    pub duration_ms: u64,
}

impl ExecutionOutcome {
    pub fn succeeded(tool_name: impl Into<String>, result: Value, duration_ms: u64) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: true,
            result: Some(result),
            failure: None,
            duration_ms,
        }
    }

    pub fn failed(
        tool_name: impl Into<String>,
        kind: ToolFailureKind,
        message: impl Into<String>,
        duration_ms: u64,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            success: false,
            result: None,
            failure: Some(ToolFailure { kind, message: message.into() }),
            duration_ms,
        }
    }

    pub fn error_text(&self) -> Option<&str> {
        self.failure.as_ref().map(|failure| failure.message.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ToolExecutionId(pub String);

/// Append-only audit row written once per invocation attempt.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolExecutionRecord {
    pub id: ToolExecutionId,
    pub correlation_id: MessageId,
    pub call_id: String,
    pub tool_name: String,
    pub arguments_json: String,
    pub result_json: Option<String>,
    pub error_message: Option<String>,
    pub success: bool,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
}

impl ToolExecutionRecord {
    pub fn from_outcome(request: &ToolInvocationRequest, outcome: &ExecutionOutcome) -> Self {
        Self {
            id: ToolExecutionId(format!("exec-{}", Uuid::new_v4())),
            correlation_id: request.correlation_id.clone(),
            call_id: request.call_id.clone(),
            tool_name: request.tool_name.clone(),
            arguments_json: request.raw_arguments.clone(),
            result_json: outcome.result.as_ref().map(Value::to_string),
            error_message: outcome.error_text().map(str::to_string),
            success: outcome.success,
            duration_ms: outcome.duration_ms,
            created_at: Utc::now(),
        }
    }
}
