use std::sync::Arc;
use tokio::sync::{RwLock, broadcast};
use tracing::{info, warn};

use crate::clients::bunny::BunnyClient;
use crate::clients::drive::DriveClient;
use crate::config::Config;
use crate::db::Store;
use crate::domain::events::NotificationEvent;
use crate::services::{
    BunnyStorage, CatalogService, DriveSource, LogService, ObjectStorage, RemoteSource,
    SeaOrmCatalogStore, TransferService,
};

/// Shared HTTP client for the drive and storage clients. No global timeout:
/// uploads of large files run for a long time, so limits are applied per
/// request or through the stall timeout.
fn build_shared_http_client() -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!("anikura/", env!("CARGO_PKG_VERSION")))
        .connect_timeout(std::time::Duration::from_secs(30))
        .pool_max_idle_per_host(10)
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build shared HTTP client: {e}"))
}

#[derive(Clone)]
pub struct SharedState {
    pub config: Arc<RwLock<Config>>,

    pub store: Store,

    pub event_bus: broadcast::Sender<NotificationEvent>,

    pub log_service: Arc<LogService>,

    pub catalog: Arc<CatalogService>,

    pub transfers: Arc<TransferService>,
}

impl SharedState {
    /// Wires the drive folder source and the Bunny storage zone from config.
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        let http_client = build_shared_http_client()?;
        let source = Arc::new(DriveSource::new(DriveClient::new(
            http_client.clone(),
            config.drive.clone(),
        ))) as Arc<dyn RemoteSource>;
        let storage = Arc::new(BunnyStorage::new(BunnyClient::new(
            http_client,
            config.storage.clone(),
        ))) as Arc<dyn ObjectStorage>;

        Self::with_backends(config, source, storage).await
    }

    /// Builds the state around caller-provided source and storage backends.
    pub async fn with_backends(
        config: Config,
        source: Arc<dyn RemoteSource>,
        storage: Arc<dyn ObjectStorage>,
    ) -> anyhow::Result<Self> {
        let (event_bus, _) = broadcast::channel(config.general.event_bus_buffer_size.max(1));

        let store = Store::with_pool_options(
            &config.general.database_path,
            config.general.max_db_connections,
            config.general.min_db_connections,
        )
        .await?;

        match store.abort_unfinished_batches().await {
            Ok(0) => {}
            Ok(count) => warn!(count, "Marked batches interrupted by restart as aborted"),
            Err(e) => warn!(error = %e, "Failed to clean up unfinished batches"),
        }

        if config.general.log_retention_days > 0 {
            match store.prune_logs(config.general.log_retention_days).await {
                Ok(0) => {}
                Ok(count) => info!(count, "Pruned old system logs"),
                Err(e) => warn!(error = %e, "Failed to prune system logs"),
            }
        }

        let config = Arc::new(RwLock::new(config));

        let log_service = Arc::new(LogService::new(store.clone(), event_bus.clone()));
        log_service.clone().start_listener();

        let catalog = Arc::new(CatalogService::new(Arc::new(SeaOrmCatalogStore::new(
            store.clone(),
        ))));

        let transfers = Arc::new(TransferService::new(
            catalog.clone(),
            source,
            storage,
            store.clone(),
            config.clone(),
            event_bus.clone(),
        ));

        info!("Shared state initialized");

        Ok(Self {
            config,
            store,
            event_bus,
            log_service,
            catalog,
            transfers,
        })
    }

    pub async fn config(&self) -> Config {
        self.config.read().await.clone()
    }
}
