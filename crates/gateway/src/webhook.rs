use serde::Deserialize;
use thiserror::Error;

use chatrelay_core::domain::conversation::SenderId;
use chatrelay_core::domain::message::InboundMessage;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook body is not valid JSON: {0}")]
    Malformed(String),
}

/// Payload Fonnte posts for every incoming WhatsApp message.
///
/// Only `sender` and `message` drive a turn; the rest is kept for logging.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WebhookMessage {
    pub device: String,
    pub sender: String,
    pub message: String,
    pub member: String,
    pub name: String,
    pub location: String,
    pub file: String,
    pub filename: String,
}

impl WebhookMessage {
    pub fn parse(body: &[u8]) -> Result<Self, WebhookError> {
        serde_json::from_slice(body).map_err(|error| WebhookError::Malformed(error.to_string()))
    }

    pub fn sender_id(&self) -> SenderId {
        SenderId(self.sender.trim().to_string())
    }

    pub fn into_inbound(self) -> InboundMessage {
        InboundMessage::new(self.sender_id(), self.message)
    }
}
