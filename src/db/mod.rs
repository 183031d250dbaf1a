use crate::entities::transfer_batches;
use crate::models::anime::AnimeDocument;
use crate::models::transfer::BatchStatus;
use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

pub mod migrator;
pub mod repositories;

pub use crate::entities::system_logs::Model as SystemLog;
pub use crate::entities::transfer_batches::Model as BatchRecord;
pub use repositories::anime::VersionedDocument;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn anime_repo(&self) -> repositories::anime::AnimeDocumentRepository {
        repositories::anime::AnimeDocumentRepository::new(self.conn.clone())
    }

    fn batch_repo(&self) -> repositories::batch::BatchRepository {
        repositories::batch::BatchRepository::new(self.conn.clone())
    }

    fn logs_repo(&self) -> repositories::logs::LogRepository {
        repositories::logs::LogRepository::new(self.conn.clone())
    }

    // ========== Catalog documents ==========

    pub async fn insert_anime(&self, document: &AnimeDocument) -> Result<()> {
        self.anime_repo().insert(document).await
    }

    pub async fn get_anime(&self, id: &str) -> Result<Option<VersionedDocument>> {
        self.anime_repo().get(id).await
    }

    pub async fn list_anime(&self) -> Result<Vec<AnimeDocument>> {
        self.anime_repo().list().await
    }

    pub async fn update_anime_if_version(
        &self,
        document: &AnimeDocument,
        expected_version: i64,
    ) -> Result<bool> {
        self.anime_repo()
            .compare_and_swap(document, expected_version)
            .await
    }

    pub async fn delete_anime(&self, id: &str) -> Result<bool> {
        self.anime_repo().delete(id).await
    }

    // ========== Transfer batches ==========

    pub async fn save_batch(&self, status: &BatchStatus) -> Result<()> {
        self.batch_repo().upsert(status).await
    }

    pub async fn get_batch(&self, id: &str) -> Result<Option<transfer_batches::Model>> {
        self.batch_repo().get(id).await
    }

    pub async fn recent_batches(&self, limit: u64) -> Result<Vec<transfer_batches::Model>> {
        self.batch_repo().recent(limit).await
    }

    pub async fn batches_for_anime(&self, anime_id: &str) -> Result<Vec<transfer_batches::Model>> {
        self.batch_repo().for_anime(anime_id).await
    }

    pub async fn abort_unfinished_batches(&self) -> Result<u64> {
        self.batch_repo().abort_unfinished().await
    }

    // ========== System logs ==========

    pub async fn add_log(
        &self,
        event_type: &str,
        level: &str,
        message: &str,
        details: Option<String>,
    ) -> Result<()> {
        self.logs_repo()
            .add(event_type, level, message, details)
            .await
    }

    pub async fn get_logs(
        &self,
        page: u64,
        page_size: u64,
        level_filter: Option<String>,
        event_type_filter: Option<String>,
    ) -> Result<(Vec<SystemLog>, u64)> {
        self.logs_repo()
            .get_logs(page, page_size, level_filter, event_type_filter)
            .await
    }

    pub async fn clear_logs(&self) -> Result<()> {
        self.logs_repo().clear_logs().await
    }

    pub async fn prune_logs(&self, older_than_days: u32) -> Result<u64> {
        self.logs_repo().prune_logs(older_than_days).await
    }
}
