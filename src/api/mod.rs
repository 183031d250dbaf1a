use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{delete, get, post},
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::Store;
use crate::domain::events::NotificationEvent;
use crate::services::{CatalogService, TransferService};
use crate::state::SharedState;

mod anime;
pub mod auth;
mod error;
pub mod events;
mod observability;
mod system;
mod transfers;
mod types;

pub use error::ApiError;
pub use types::*;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

impl AppState {
    #[must_use]
    pub fn config(&self) -> &Arc<RwLock<Config>> {
        &self.shared.config
    }

    #[must_use]
    pub fn store(&self) -> &Store {
        &self.shared.store
    }

    #[must_use]
    pub fn event_bus(&self) -> &tokio::sync::broadcast::Sender<NotificationEvent> {
        &self.shared.event_bus
    }

    #[must_use]
    pub fn catalog(&self) -> &Arc<CatalogService> {
        &self.shared.catalog
    }

    #[must_use]
    pub fn transfers(&self) -> &Arc<TransferService> {
        &self.shared.transfers
    }
}

#[must_use]
pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

pub async fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.config().read().await.server.cors_allowed_origins.clone();

    let api_router = Router::new()
        .merge(create_protected_router(state.clone()))
        .route("/system/health/live", get(system::health_live))
        .route("/system/health/ready", get(system::health_ready))
        .with_state(state);

    let cors_layer = if cors_origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::logging_middleware))
}

fn create_protected_router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/anime", get(anime::list_anime).post(anime::create_anime))
        .route(
            "/anime/{id}",
            get(anime::get_anime).delete(anime::delete_anime),
        )
        .route("/anime/{id}/seasons", post(anime::add_season))
        .route(
            "/anime/{id}/seasons/{season}",
            delete(anime::remove_season),
        )
        .route(
            "/anime/{id}/seasons/{season}/episodes",
            post(anime::add_episode),
        )
        .route(
            "/anime/{id}/seasons/{season}/episodes/{episode}",
            delete(anime::remove_episode),
        )
        .route("/anime/{id}/bulk-upload", post(transfers::start_bulk_transfer))
        .route("/anime/{id}/transfers", get(transfers::list_for_anime))
        .route("/drive/files", get(transfers::preview_folder))
        .route("/transfers", get(transfers::list_batches))
        .route("/transfers/{id}", get(transfers::get_batch))
        .route("/transfers/{id}/cancel", post(transfers::cancel_batch))
        .route("/system/status", get(system::get_status))
        .route(
            "/system/logs",
            get(system::get_logs).delete(system::clear_logs),
        )
        .route("/metrics", get(observability::get_metrics))
        .merge(events::router())
        .route_layer(middleware::from_fn_with_state(state, auth::auth_middleware))
}
