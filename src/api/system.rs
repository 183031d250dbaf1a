//! Status, health probes and the persisted event log.

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState, SystemStatus};
use crate::constants::limits::DEFAULT_LOG_LIMIT;
use crate::db::SystemLog;

#[derive(Debug, Serialize)]
pub struct HealthLiveResponse {
    pub status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct HealthReadyResponse {
    pub ready: bool,
    pub database: bool,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_page_size")]
    pub page_size: u64,
    pub level: Option<String>,
    pub event_type: Option<String>,
}

const fn default_page() -> u64 {
    1
}

const fn default_page_size() -> u64 {
    DEFAULT_LOG_LIMIT
}

#[derive(Debug, Serialize)]
pub struct LogResponse {
    pub logs: Vec<SystemLog>,
    pub total_pages: u64,
}

/// `GET /api/system/status`
pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<SystemStatus>>, ApiError> {
    let anime_count = state.catalog().list().await?.len();
    let running_batches = state
        .transfers()
        .list_batches()
        .await
        .iter()
        .filter(|b| !b.state.is_finished())
        .count();

    let (storage_configured, drive_configured) = {
        let config = state.config().read().await;
        (
            config.storage.is_configured(),
            config.drive.access_token.is_some() || config.drive.api_key.is_some(),
        )
    };

    Ok(Json(ApiResponse::success(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime: state.start_time.elapsed().as_secs(),
        anime_count,
        running_batches,
        storage_configured,
        drive_configured,
    })))
}

/// `GET /api/system/health/live`
pub async fn health_live() -> impl IntoResponse {
    Json(ApiResponse::success(HealthLiveResponse { status: "alive" }))
}

/// `GET /api/system/health/ready`
///
/// Ready once the database answers.
pub async fn health_ready(State(state): State<Arc<AppState>>) -> Response {
    let database = state.store().ping().await.is_ok();
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(ApiResponse::success(HealthReadyResponse {
            ready: database,
            database,
        })),
    )
        .into_response()
}

pub async fn get_logs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<ApiResponse<LogResponse>>, ApiError> {
    let (logs, total_pages) = state
        .store()
        .get_logs(query.page, query.page_size, query.level, query.event_type)
        .await?;

    Ok(Json(ApiResponse::success(LogResponse { logs, total_pages })))
}

pub async fn clear_logs(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<bool>>, ApiError> {
    state.store().clear_logs().await?;
    Ok(Json(ApiResponse::success(true)))
}
