//! HTTP handlers for the recommender API

use crate::api::{
    CreateSessionRequest, ErrorResponse, HealthCheckResponse, SessionStatusResponse,
    StopSessionRequest, StopSessionResponse,
};
use crate::coordinator::SessionCoordinator;
use axum::{
    extract::{Json as ExtractJson, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use fir_common::Error;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Application state shared across handlers
pub type AppState = Arc<SessionCoordinator>;

/// Create the router with all endpoints
pub fn create_router(coordinator: AppState) -> Router {
    Router::new()
        .route(
            "/v1/optimization/sessions",
            post(create_session).get(list_sessions),
        )
        .route("/v1/optimization/sessions/:id", get(get_session))
        .route("/v1/optimization/sessions/:id/stop", post(stop_session))
        .route("/v1/health", get(health_check))
        .with_state(coordinator)
}

/// POST /v1/optimization/sessions
async fn create_session(
    State(coordinator): State<AppState>,
    ExtractJson(request): ExtractJson<CreateSessionRequest>,
) -> Response {
    match coordinator.create_session(request).await {
        Ok(session) => {
            info!(id = %session.id, "accepted session");
            (
                StatusCode::ACCEPTED,
                Json(SessionStatusResponse::from(&session)),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// GET /v1/optimization/sessions
async fn list_sessions(State(coordinator): State<AppState>) -> Response {
    let sessions = coordinator.list_sessions().await;
    let statuses: Vec<SessionStatusResponse> =
        sessions.iter().map(SessionStatusResponse::from).collect();
    Json(statuses).into_response()
}

/// GET /v1/optimization/sessions/{id}
async fn get_session(
    State(coordinator): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match coordinator.get_session(&id).await {
        Some(session) => Json(SessionStatusResponse::from(&session)).into_response(),
        None => error_response(Error::NotFound(format!("session {id}"))),
    }
}

/// POST /v1/optimization/sessions/{id}/stop
async fn stop_session(
    State(coordinator): State<AppState>,
    Path(id): Path<String>,
    request: Option<ExtractJson<StopSessionRequest>>,
) -> Response {
    let reason = request
        .and_then(|ExtractJson(body)| body.reason)
        .unwrap_or_else(|| "requested by caller".to_string());

    match coordinator.stop_session(&id).await {
        Ok(session) => {
            info!(id = %session.id, reason = %reason, "stop acknowledged");
            (
                StatusCode::ACCEPTED,
                Json(StopSessionResponse {
                    id: session.id.clone(),
                    status: session.status.to_string(),
                    message: format!("stop acknowledged: {reason}"),
                }),
            )
                .into_response()
        }
        Err(e) => error_response(e),
    }
}

/// GET /v1/health
async fn health_check(State(coordinator): State<AppState>) -> Response {
    let executor_available = coordinator.executor_available().await;
    let counts = coordinator.status_counts().await;

    let mut details: HashMap<String, serde_json::Value> = HashMap::new();
    details.insert(
        "sessions".to_string(),
        serde_json::to_value(&counts).unwrap_or_default(),
    );

    let status = if executor_available { "healthy" } else { "degraded" };
    Json(HealthCheckResponse {
        status: status.to_string(),
        timestamp: Utc::now().to_rfc3339(),
        executor_available,
        details,
    })
    .into_response()
}

/// Map internal errors onto HTTP statuses with a structured body
fn error_response(error: Error) -> Response {
    let status = match &error {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        warn!(error = %error, "request failed");
    }
    (
        status,
        Json(ErrorResponse::new(error.category(), error.to_string())),
    )
        .into_response()
}
