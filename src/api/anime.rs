use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use std::sync::Arc;

use super::{AnimeSummaryDto, ApiError, ApiResponse, AppState};
use crate::domain::AnimeId;
use crate::models::anime::AnimeDocument;
use crate::services::{NewAnime, NewEpisode, NewSeason};

pub async fn list_anime(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ApiResponse<Vec<AnimeSummaryDto>>>, ApiError> {
    let documents = state.catalog().list().await?;
    let summaries = documents.iter().map(AnimeSummaryDto::from).collect();
    Ok(Json(ApiResponse::success(summaries)))
}

pub async fn get_anime(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<AnimeDocument>>, ApiError> {
    let document = state.catalog().get(&AnimeId::new(id)).await?;
    Ok(Json(ApiResponse::success(document)))
}

pub async fn create_anime(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<NewAnime>,
) -> Result<(StatusCode, Json<ApiResponse<AnimeDocument>>), ApiError> {
    let document = state.catalog().create_anime(payload).await?;
    tracing::info!(anime_id = %document.id, title = %document.display_title(), "Anime created");
    Ok((StatusCode::CREATED, Json(ApiResponse::success(document))))
}

pub async fn delete_anime(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    state.catalog().delete_anime(&AnimeId::new(id)).await?;
    Ok(Json(ApiResponse::success(())))
}

pub async fn add_season(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(payload): Json<NewSeason>,
) -> Result<(StatusCode, Json<ApiResponse<AnimeDocument>>), ApiError> {
    let document = state
        .catalog()
        .add_season(&AnimeId::new(id), payload)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(document))))
}

pub async fn remove_season(
    State(state): State<Arc<AppState>>,
    Path((id, season)): Path<(String, i32)>,
) -> Result<Json<ApiResponse<AnimeDocument>>, ApiError> {
    let document = state
        .catalog()
        .remove_season(&AnimeId::new(id), season)
        .await?;
    Ok(Json(ApiResponse::success(document)))
}

pub async fn add_episode(
    State(state): State<Arc<AppState>>,
    Path((id, season)): Path<(String, i32)>,
    Json(payload): Json<NewEpisode>,
) -> Result<(StatusCode, Json<ApiResponse<AnimeDocument>>), ApiError> {
    let document = state
        .catalog()
        .add_episode(&AnimeId::new(id), season, payload)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(document))))
}

pub async fn remove_episode(
    State(state): State<Arc<AppState>>,
    Path((id, season, episode)): Path<(String, i32, u32)>,
) -> Result<Json<ApiResponse<AnimeDocument>>, ApiError> {
    let document = state
        .catalog()
        .remove_episode(&AnimeId::new(id), season, episode)
        .await?;
    Ok(Json(ApiResponse::success(document)))
}
