use async_trait::async_trait;
use thiserror::Error;

use chatrelay_core::domain::conversation::SenderId;

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub message_id: Option<String>,
    pub detail: String,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway request timed out")]
    Timeout,
    #[error("gateway transport error: {0}")]
    Transport(String),
    #[error("gateway returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("gateway rejected the message: {0}")]
    Rejected(String),
    #[error("could not decode gateway response: {0}")]
    Decode(String),
}

impl GatewayError {
    /// Transport trouble and 5xx answers may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) => true,
            Self::Status { status, .. } => *status >= 500,
            Self::Rejected(_) | Self::Decode(_) => false,
        }
    }
}

/// Outbound side of the chat gateway.
#[async_trait]
pub trait MessagingGateway: Send + Sync {
    async fn send_text(&self, target: &SenderId, text: &str)
        -> Result<DeliveryReceipt, GatewayError>;

    async fn send_image(
        &self,
        target: &SenderId,
        image_url: &str,
        caption: &str,
    ) -> Result<DeliveryReceipt, GatewayError>;
}
