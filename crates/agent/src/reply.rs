use serde_json::Value;

use chatrelay_core::domain::tool::{ExecutionOutcome, ToolFailure, ToolFailureKind};
use chatrelay_core::errors::{TurnError, IMAGE_FAILED_REPLY};

use crate::tools::{ImageGenerationResult, IMAGE_TOOL_NAME};

pub const DEFAULT_IMAGE_CAPTION: &str = "Here's your generated image!";

/// One message the orchestrator sends back to the sender.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundReply {
    Text(String),
    Image { url: String, caption: String },
    Apology { error: TurnError, text: String },
}

impl OutboundReply {
    pub fn apology(error: TurnError) -> Self {
        let text = error.user_message().unwrap_or_else(|| error.to_string());
        Self::Apology { error, text }
    }

    pub fn is_apology(&self) -> bool {
        matches!(self, Self::Apology { .. })
    }
}

/// Decides what the sender sees for one tool call.
pub fn render_tool_outcome(outcome: &ExecutionOutcome, model_text: &str) -> OutboundReply {
    let tool = outcome.tool_name.as_str();

    if !outcome.success {
        let failure = outcome.failure.clone().unwrap_or_else(|| ToolFailure {
            kind: ToolFailureKind::ExecutionFailed,
            message: "tool reported failure without detail".to_string(),
        });
        let error = TurnError::from_tool_failure(tool, &failure);
        if tool == IMAGE_TOOL_NAME && failure.kind == ToolFailureKind::ExecutionFailed {
            return OutboundReply::Apology { error, text: IMAGE_FAILED_REPLY.to_string() };
        }
        return OutboundReply::apology(error);
    }

    if tool == IMAGE_TOOL_NAME {
        return render_image(outcome.result.as_ref(), model_text);
    }

    match &outcome.result {
        Some(Value::String(text)) if !text.trim().is_empty() => OutboundReply::Text(text.clone()),
        _ => OutboundReply::Text(format!("Tool {tool} executed successfully")),
    }
}

fn render_image(result: Option<&Value>, model_text: &str) -> OutboundReply {
    let unparseable = |reason: String| {
        OutboundReply::apology(TurnError::ResultUnparseable {
            tool: IMAGE_TOOL_NAME.to_string(),
            reason,
        })
    };

    let Some(result) = result else {
        return unparseable("result is missing".to_string());
    };

    match serde_json::from_value::<ImageGenerationResult>(result.clone()) {
        Ok(image) if !image.image_url.trim().is_empty() => {
            let caption = if model_text.trim().is_empty() {
                DEFAULT_IMAGE_CAPTION.to_string()
            } else {
                model_text.to_string()
            };
            OutboundReply::Image { url: image.image_url, caption }
        }
        Ok(_) => unparseable("image_url is empty".to_string()),
        Err(error) => unparseable(error.to_string()),
    }
}
