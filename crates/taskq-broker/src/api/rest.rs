use crate::{Broker, BrokerStats};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use taskq_core::{TaskFailure, TaskResult};
use uuid::Uuid;

/// REST API routes
pub fn create_rest_api(broker: Arc<Broker>) -> Router {
    Router::new()
        .route("/api/v1/invocations/:invocation_id", get(get_invocation))
        .route("/api/v1/stats", get(get_stats))
        .route("/api/v1/workers", get(list_workers))
        .route("/health", get(health_check))
        .with_state(broker)
}

/// Prometheus scrape endpoint, served on its own port
pub fn create_metrics_api(broker: Arc<Broker>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(broker)
}

#[derive(Debug, Serialize)]
struct InvocationResponse {
    invocation_id: Uuid,
    task_name: String,
    state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    attempt: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    submitted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    worker_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<ResultResponse>,
}

#[derive(Debug, Serialize)]
struct ResultResponse {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<TaskFailure>,
    attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
    completed_at: DateTime<Utc>,
}

impl From<TaskResult> for ResultResponse {
    fn from(result: TaskResult) -> Self {
        ResultResponse {
            status: result.status.as_str().to_string(),
            value: result.value_json(),
            error: result.error,
            attempts: result.attempts,
            started_at: result.started_at,
            completed_at: result.completed_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    connected_workers: usize,
    queued_invocations: usize,
}

/// Get an invocation and, once terminal, its result
async fn get_invocation(
    State(broker): State<Arc<Broker>>,
    Path(invocation_id): Path<Uuid>,
) -> Result<Json<InvocationResponse>, ApiError> {
    let record = broker
        .store()
        .lookup(&invocation_id)
        .map_err(|e| ApiError::Internal(e.to_string()))?
        .ok_or(ApiError::NotFound)?;
    let (state, invocation, result) = (record.state, record.invocation, record.result);

    let task_name = invocation
        .as_ref()
        .map(|inv| inv.task_name.clone())
        .or_else(|| result.as_ref().map(|r| r.task_name.clone()))
        .unwrap_or_default();

    Ok(Json(InvocationResponse {
        invocation_id,
        task_name,
        state: state.as_str().to_string(),
        args: invocation
            .as_ref()
            .and_then(|inv| inv.decode_args::<serde_json::Value>().ok()),
        attempt: invocation.as_ref().map(|inv| inv.attempt),
        submitted_at: invocation.as_ref().map(|inv| inv.submitted_at),
        worker_id: invocation
            .and_then(|inv| inv.worker_id)
            .or_else(|| result.as_ref().and_then(|r| r.worker_id.clone())),
        result: result.map(ResultResponse::from),
    }))
}

async fn get_stats(State(broker): State<Arc<Broker>>) -> Result<Json<BrokerStats>, ApiError> {
    broker
        .stats()
        .map(Json)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

async fn list_workers(State(broker): State<Arc<Broker>>) -> Json<serde_json::Value> {
    let response: Vec<serde_json::Value> = broker
        .workers()
        .all_workers()
        .into_iter()
        .map(|w| {
            serde_json::json!({
                "worker_id": w.worker_id,
                "registered_at": w.registered_at,
                "last_heartbeat": w.last_heartbeat,
                "current_invocations": w.current_invocations.len(),
                "cpu_usage_percent": w.cpu_usage_percent,
                "memory_usage_mb": w.memory_usage_mb,
            })
        })
        .collect();

    Json(serde_json::json!(response))
}

async fn health_check(State(broker): State<Arc<Broker>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        connected_workers: broker.workers().count_alive(),
        queued_invocations: broker.queue().len(),
    })
}

async fn metrics_handler(State(broker): State<Arc<Broker>>) -> Result<String, ApiError> {
    broker
        .metrics()
        .render()
        .map_err(|e| ApiError::Internal(e.to_string()))
}

/// API error types
#[derive(Debug)]
enum ApiError {
    NotFound,
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
