use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use chatrelay_agent::TurnQueue;
use chatrelay_db::{repositories::StatsRepository, DbPool};

use crate::{health, webhook};

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub stats: Arc<dyn StatsRepository>,
    pub queue: TurnQueue,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook/fonnte", post(webhook::receive))
        .route("/health", get(health::health))
        .route("/stats", get(health::stats))
        .with_state(state)
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::router;
    use super::test_support::{app_state, RecordingHandler};

    async fn read_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn webhook_request(body: &'static str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/webhook/fonnte")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .expect("request")
    }

    #[tokio::test]
    async fn webhook_acknowledges_and_enqueues_the_turn() {
        let handler = Arc::new(RecordingHandler::default());
        let state = app_state(handler.clone()).await;
        let queue = state.queue.clone();

        let response = router(state)
            .oneshot(webhook_request(r#"{"device":"628990","sender":"628123","message":"hi"}"#))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await, json!({"status": "received"}));

        assert!(queue.drain(Duration::from_secs(2)).await);
        let received = handler.received();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].sender_id.0, "628123");
        assert_eq!(received[0].text, "hi");
    }

    #[tokio::test]
    async fn malformed_webhook_body_is_rejected() {
        let handler = Arc::new(RecordingHandler::default());
        let state = app_state(handler.clone()).await;

        let response =
            router(state).oneshot(webhook_request("sender=628123")).await.expect("response");

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await, json!({"error": "invalid JSON"}));
        assert!(handler.received().is_empty());
    }

    #[tokio::test]
    async fn stats_reports_store_counts() {
        let state = app_state(Arc::new(RecordingHandler::default())).await;

        let response = router(state)
            .oneshot(Request::builder().uri("/stats").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = read_json(response).await;
        assert_eq!(body["messages"], 0);
        assert_eq!(body["conversations"], 0);
        assert_eq!(body["tool_executions"], 0);
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn health_route_is_mounted() {
        let state = app_state(Arc::new(RecordingHandler::default())).await;

        let response = router(state)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(read_json(response).await["status"], "ready");
    }
}
