use axum::{extract::State, http::StatusCode, Json};
use chatrelay_db::DbPool;
use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::error;

use crate::routes::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub checked_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StatsResponse {
    pub messages: u64,
    pub conversations: u64,
    pub tool_executions: u64,
    pub timestamp: String,
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        service: HealthCheck {
            status: "ready",
            detail: "chatrelay-server runtime initialized".to_string(),
        },
        database,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

pub async fn stats(
    State(state): State<AppState>,
) -> Result<Json<StatsResponse>, (StatusCode, Json<Value>)> {
    match state.stats.counts().await {
        Ok(counts) => Ok(Json(StatsResponse {
            messages: counts.messages,
            conversations: counts.conversations,
            tool_executions: counts.tool_executions,
            timestamp: Utc::now().to_rfc3339(),
        })),
        Err(error) => {
            error!(event_name = "system.stats.failed", error = %error, "store counts unavailable");
            Err((StatusCode::INTERNAL_SERVER_ERROR, Json(json!({"error": "stats unavailable"}))))
        }
    }
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match chatrelay_db::ping(pool).await {
        Ok(()) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, Json};

    use crate::health::{health, stats};
    use crate::routes::test_support::{app_state, RecordingHandler};

    #[tokio::test]
    async fn health_returns_ready_when_database_is_reachable() {
        let state = app_state(Arc::new(RecordingHandler::default())).await;
        let pool = state.db_pool.clone();

        let (status, Json(payload)) = health(State(state)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.database.status, "ready");
        assert_eq!(payload.service.status, "ready");
        assert_eq!(payload.version, env!("CARGO_PKG_VERSION"));

        pool.close().await;
    }

    #[tokio::test]
    async fn health_returns_service_unavailable_when_database_is_unavailable() {
        let state = app_state(Arc::new(RecordingHandler::default())).await;
        state.db_pool.close().await;

        let (status, Json(payload)) = health(State(state)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database.status, "degraded");
        assert_eq!(payload.service.status, "ready");
    }

    #[tokio::test]
    async fn stats_fails_with_server_error_when_database_is_closed() {
        let state = app_state(Arc::new(RecordingHandler::default())).await;
        state.db_pool.close().await;

        let (status, Json(body)) = stats(State(state)).await.expect_err("closed pool");

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "stats unavailable");
    }
}
