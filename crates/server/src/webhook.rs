use axum::{body::Bytes, extract::State, http::StatusCode, Json};
use chatrelay_gateway::WebhookMessage;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::routes::AppState;

/// Acknowledges immediately; the turn runs on the sender's queue worker.
pub async fn receive(State(state): State<AppState>, body: Bytes) -> (StatusCode, Json<Value>) {
    let webhook = match WebhookMessage::parse(&body) {
        Ok(webhook) => webhook,
        Err(error) => {
            warn!(
                event_name = "ingress.webhook.rejected",
                body_len = body.len(),
                error = %error,
                "webhook body rejected"
            );
            return (StatusCode::BAD_REQUEST, Json(json!({"error": "invalid JSON"})));
        }
    };

    info!(
        event_name = "ingress.webhook.received",
        sender_id = %webhook.sender_id(),
        device = %webhook.device,
        has_file = !webhook.file.is_empty(),
        "webhook received"
    );

    state.queue.submit(webhook.into_inbound());
    (StatusCode::OK, Json(json!({"status": "received"})))
}
