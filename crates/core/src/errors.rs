use thiserror::Error;

use crate::domain::tool::{ToolFailure, ToolFailureKind};

/// Everything that can go wrong inside a single turn.
///
/// Only the orchestrator turns these into user-visible text; lower layers
/// report them as values and keep going.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TurnError {
    #[error("conversation history unavailable: {0}")]
    ContextDegraded(String),
    #[error("completion service unavailable: {0}")]
    ModelUnavailable(String),
    #[error("completion service returned no choices")]
    EmptyModelResponse,
    #[error("tool `{tool}` is not registered")]
    ToolNotFound { tool: String },
    #[error("invalid arguments for tool `{tool}`: {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("tool `{tool}` failed: {reason}")]
    ToolExecutionFailed { tool: String, reason: String },
    #[error("result of tool `{tool}` could not be interpreted: {reason}")]
    ResultUnparseable { tool: String, reason: String },
    #[error("reply delivery failed: {0}")]
    DeliveryFailed(String),
    #[error("persistence failure: {0}")]
    PersistenceFailed(String),
}

pub const MODEL_UNAVAILABLE_REPLY: &str =
    "Sorry, I'm having trouble processing your message right now.";
pub const EMPTY_RESPONSE_REPLY: &str = "Sorry, I couldn't generate a response.";
pub const IMAGE_FAILED_REPLY: &str =
    "Sorry, I couldn't generate the image. Please try again with a different prompt.";
pub const IMAGE_UNPARSEABLE_REPLY: &str = "Sorry, there was an error processing the generated image.";
pub const IMAGE_DELIVERY_REPLY: &str = "Sorry, I couldn't send the generated image.";

impl TurnError {
    pub fn from_tool_failure(tool: impl Into<String>, failure: &ToolFailure) -> Self {
        let tool = tool.into();
        let reason = failure.message.clone();
        match failure.kind {
            ToolFailureKind::NotFound => Self::ToolNotFound { tool },
            ToolFailureKind::InvalidArguments => Self::InvalidArguments { tool, reason },
            ToolFailureKind::ExecutionFailed => Self::ToolExecutionFailed { tool, reason },
        }
    }

    /// Text sent back to the sender, if the failure is user-visible at all.
    pub fn user_message(&self) -> Option<String> {
        match self {
            Self::ContextDegraded(_) | Self::PersistenceFailed(_) => None,
            Self::ModelUnavailable(_) => Some(MODEL_UNAVAILABLE_REPLY.to_owned()),
            Self::EmptyModelResponse => Some(EMPTY_RESPONSE_REPLY.to_owned()),
            Self::ToolNotFound { tool }
            | Self::InvalidArguments { tool, .. }
            | Self::ToolExecutionFailed { tool, .. } => {
                Some(format!("Sorry, I couldn't execute the {tool} tool."))
            }
            Self::ResultUnparseable { .. } => Some(IMAGE_UNPARSEABLE_REPLY.to_owned()),
            Self::DeliveryFailed(_) => Some(IMAGE_DELIVERY_REPLY.to_owned()),
        }
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::ContextDegraded(_) => "context_degraded",
            Self::ModelUnavailable(_) => "model_unavailable",
            Self::EmptyModelResponse => "empty_model_response",
            Self::ToolNotFound { .. } => "tool_not_found",
            Self::InvalidArguments { .. } => "invalid_arguments",
            Self::ToolExecutionFailed { .. } => "tool_execution_failed",
            Self::ResultUnparseable { .. } => "result_unparseable",
            Self::DeliveryFailed(_) => "delivery_failed",
            Self::PersistenceFailed(_) => "persistence_failed",
        }
    }
}
