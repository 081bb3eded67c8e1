use std::time::Instant;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use chatrelay_agent::gateway::{DeliveryReceipt, GatewayError, MessagingGateway};
use chatrelay_core::config::GatewayConfig;
use chatrelay_core::domain::conversation::SenderId;

use crate::retry::RetryPolicy;

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum SendRequest<'a> {
    Text { target: &'a str, message: &'a str },
    Image { target: &'a str, file: &'a str, caption: &'a str },
}

impl SendRequest<'_> {
    fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
        }
    }
}

#[derive(Deserialize)]
struct SendResponse {
    #[serde(default)]
    status: bool,
    #[serde(default, alias = "reason", alias = "detail")]
    message: Option<String>,
    #[serde(default)]
    id: Option<Value>,
}

/// Fonnte answers with a string id, a list of ids, or a bare number.
fn receipt_id(id: Option<Value>) -> Option<String> {
    match id? {
        Value::String(id) => Some(id),
        Value::Number(id) => Some(id.to_string()),
        Value::Array(ids) => ids.into_iter().find_map(|id| receipt_id(Some(id))),
        _ => None,
    }
}

/// WhatsApp delivery through the Fonnte `send` API.
pub struct FonnteClient {
    client: Client,
    api_key: SecretString,
    send_url: String,
    retry: RetryPolicy,
}

impl FonnteClient {
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        Self::with_policy(config, RetryPolicy::with_max_retries(config.max_retries))
    }

    pub fn with_policy(config: &GatewayConfig, retry: RetryPolicy) -> Result<Self, GatewayError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|error| GatewayError::Transport(error.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            send_url: format!("{}/send", config.base_url.trim_end_matches('/')),
            retry,
        })
    }

    async fn post_once(&self, request: &SendRequest<'_>) -> Result<DeliveryReceipt, GatewayError> {
        let started = Instant::now();
        let response = self
            .client
            .post(&self.send_url)
            .header("Authorization", self.api_key.expose_secret())
            .json(request)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    GatewayError::Timeout
                } else {
                    GatewayError::Transport(error.to_string())
                }
            })?;

        let status = response.status();
        let body =
            response.text().await.map_err(|error| GatewayError::Transport(error.to_string()))?;
        if !status.is_success() {
            return Err(GatewayError::Status { status: status.as_u16(), body });
        }

        let parsed: SendResponse =
            serde_json::from_str(&body).map_err(|error| GatewayError::Decode(error.to_string()))?;
        let message_id = receipt_id(parsed.id);

        info!(
            event_name = "gateway.send.completed",
            kind = request.kind(),
            accepted = parsed.status,
            message_id = message_id.as_deref().unwrap_or(""),
            duration_ms = started.elapsed().as_millis() as u64,
            "fonnte send completed"
        );

        let detail = parsed.message.unwrap_or_default();
        if !parsed.status {
            return Err(GatewayError::Rejected(detail));
        }

        Ok(DeliveryReceipt { message_id, detail })
    }

    async fn send(
        &self,
        operation: &str,
        request: SendRequest<'_>,
    ) -> Result<DeliveryReceipt, GatewayError> {
        self.retry.run(operation, || self.post_once(&request)).await
    }
}

#[async_trait]
impl MessagingGateway for FonnteClient {
    async fn send_text(
        &self,
        target: &SenderId,
        text: &str,
    ) -> Result<DeliveryReceipt, GatewayError> {
        debug!(event_name = "gateway.send.text", target = %target, "sending text via fonnte");
        self.send("send_text", SendRequest::Text { target: &target.0, message: text }).await
    }

    async fn send_image(
        &self,
        target: &SenderId,
        image_url: &str,
        caption: &str,
    ) -> Result<DeliveryReceipt, GatewayError> {
        debug!(
            event_name = "gateway.send.image",
            target = %target,
            image_url,
            "sending image via fonnte"
        );
        self.send(
            "send_image",
            SendRequest::Image { target: &target.0, file: image_url, caption },
        )
        .await
    }
}
