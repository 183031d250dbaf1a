//! Bulk transfer endpoints.
//!
//! `POST /anime/{id}/bulk-upload` answers as soon as the folder has been
//! listed; progress is then observable through the batch endpoints and the
//! event stream.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::Deserialize;
use std::sync::Arc;

use super::{
    ApiError, ApiResponse, AppState, BulkTransferRequest, FolderFileDto, FolderListingDto,
};
use crate::domain::AnimeId;
use crate::models::transfer::BatchStatus;
use crate::services::TransferAccepted;

#[derive(Debug, Deserialize)]
pub struct FolderQuery {
    pub folder: String,
}

pub async fn start_bulk_transfer(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<BulkTransferRequest>,
) -> Result<(StatusCode, Json<ApiResponse<TransferAccepted>>), ApiError> {
    if payload.folder_id.trim().is_empty() {
        return Err(ApiError::validation("folderId is required"));
    }

    let started = state
        .transfers()
        .start_bulk_transfer(
            &AnimeId::new(id),
            payload.season_number,
            &payload.folder_id,
            payload.defaults,
        )
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse::success(started.accepted)),
    ))
}

pub async fn preview_folder(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FolderQuery>,
) -> Result<Json<ApiResponse<FolderListingDto>>, ApiError> {
    let (folder_id, files) = state.transfers().preview_folder(&query.folder).await?;
    Ok(Json(ApiResponse::success(FolderListingDto {
        folder_id,
        files: files.into_iter().map(FolderFileDto::from).collect(),
    })))
}

pub async fn list_batches(
    State(state): State<Arc<AppState>>,
) -> Json<ApiResponse<Vec<BatchStatus>>> {
    Json(ApiResponse::success(state.transfers().list_batches().await))
}

pub async fn list_for_anime(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<ApiResponse<Vec<BatchStatus>>> {
    Json(ApiResponse::success(
        state.transfers().batches_for_anime(&id).await,
    ))
}

pub async fn get_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<BatchStatus>>, ApiError> {
    let status = state.transfers().get_batch(&id).await?;
    Ok(Json(ApiResponse::success(status)))
}

pub async fn cancel_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<BatchStatus>>, ApiError> {
    let status = state.transfers().cancel_batch(&id).await?;
    Ok(Json(ApiResponse::success(status)))
}
