//! HTTP API handlers

use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use std::sync::Arc;

use crate::network::{StatusSnapshot, StreamStatus};
use crate::ui::server::AppState;

/// API response wrapper
#[derive(serde::Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

/// Source status plus process uptime
#[derive(serde::Serialize)]
pub struct SystemStatus {
    #[serde(flatten)]
    pub snapshot: StatusSnapshot,
    pub uptime_seconds: u64,
}

pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<ApiResponse<SystemStatus>> {
    let uptime = Utc::now() - state.started_at;
    Json(ApiResponse::ok(SystemStatus {
        snapshot: state.control.status(),
        uptime_seconds: uptime.num_seconds().max(0) as u64,
    }))
}

/// Restart the source with a fresh session
pub async fn retry(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ApiResponse<()>>) {
    if state.control.status().status == StreamStatus::Stopped {
        return (
            StatusCode::CONFLICT,
            Json(ApiResponse::error("source has been stopped")),
        );
    }
    state.control.retry();
    (StatusCode::ACCEPTED, Json(ApiResponse::ok(())))
}

/// Tear the source down
pub async fn stop(State(state): State<Arc<AppState>>) -> (StatusCode, Json<ApiResponse<()>>) {
    state.control.teardown();
    (StatusCode::ACCEPTED, Json(ApiResponse::ok(())))
}
