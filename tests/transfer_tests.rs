//! End-to-end tests of the bulk transfer pipeline against in-process
//! source and storage backends.

use anikura::config::Config;
use anikura::db::Store;
use anikura::domain::AnimeId;
use anikura::models::anime::{AnimeDocument, AnimeTitle, Quality, Season, SourceKind};
use anikura::models::transfer::{BatchState, FileOutcome, RemoteFile, VideoSourceDefaults};
use anikura::services::source::select_video_files;
use anikura::db::VersionedDocument;
use anikura::services::{
    ByteStream, CatalogError, CatalogService, CatalogStore, ObjectStorage, RemoteSource,
    SeaOrmCatalogStore, SourceError, StorageError, TransferError, TransferService,
};
use anikura::state::SharedState;
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt, future, stream};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore, broadcast};

const FOLDER: &str = "1AbCdEfGhIjKlMnOpQrStUvWxYz";

struct FakeSource {
    files: Vec<(RemoteFile, Vec<u8>)>,
    /// Ids whose download never produces a response.
    unresponsive: Vec<String>,
}

impl FakeSource {
    fn new(entries: &[(&str, &str, usize)]) -> Self {
        let files = entries
            .iter()
            .map(|(name, mime, size)| {
                (
                    RemoteFile {
                        id: format!("id-{name}"),
                        name: (*name).to_string(),
                        size: Some(*size as u64),
                        mime_type: (*mime).to_string(),
                    },
                    vec![7u8; *size],
                )
            })
            .collect();
        Self {
            files,
            unresponsive: Vec::new(),
        }
    }
}

#[async_trait]
impl RemoteSource for FakeSource {
    async fn list_video_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>, SourceError> {
        match folder_id {
            FOLDER => Ok(select_video_files(
                self.files.iter().map(|(f, _)| f.clone()).collect(),
            )),
            "plain-file" => Err(SourceError::NotAFolder(folder_id.to_string())),
            _ => Err(SourceError::NotFound(folder_id.to_string())),
        }
    }

    async fn open_stream(&self, file_id: &str) -> Result<ByteStream, SourceError> {
        if self.unresponsive.iter().any(|id| id == file_id) {
            future::pending::<()>().await;
        }

        let data = self
            .files
            .iter()
            .find(|(f, _)| f.id == file_id)
            .map(|(_, data)| data.clone())
            .ok_or_else(|| SourceError::NotFound(file_id.to_string()))?;

        let chunks: Vec<Result<Bytes, std::io::Error>> = data
            .chunks(1024)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }
}

#[derive(Default)]
struct FakeStorage {
    objects: Mutex<HashMap<String, usize>>,
    failing_paths: Vec<String>,
    /// Paths whose upload drains the body and then never answers.
    silent_paths: Vec<String>,
    gate: Option<Arc<Semaphore>>,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn upload_stream(
        &self,
        path: &str,
        body: ByteStream,
        _content_length: Option<u64>,
    ) -> Result<String, StorageError> {
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }

        let chunks: Vec<Bytes> = body
            .try_collect()
            .await
            .map_err(|e| StorageError::Transport(e.to_string()))?;
        if self.silent_paths.iter().any(|p| p == path) {
            future::pending::<()>().await;
        }
        if self.failing_paths.iter().any(|p| p == path) {
            return Err(StorageError::Rejected {
                status: 500,
                message: "upload refused".to_string(),
            });
        }

        let size = chunks.iter().map(Bytes::len).sum();
        self.objects.lock().unwrap().insert(path.to_string(), size);
        Ok(format!("https://cdn.test/{path}"))
    }
}

fn test_config() -> Config {
    let db_path =
        std::env::temp_dir().join(format!("anikura-transfer-test-{}.db", uuid::Uuid::new_v4()));

    let mut config = Config::default();
    config.general.database_path = format!("sqlite:{}", db_path.display());
    config.transfer.persist_retry_base_ms = 1;
    config
}

async fn seed_demo_show(store: &Store) {
    let mut doc = AnimeDocument::new(AnimeId::new("A1"), AnimeTitle::romaji("Demo Show"));
    doc.cover_image = "https://img.test/demo.jpg".to_string();
    doc.add_season(Season::new(1)).unwrap();
    store.insert_anime(&doc).await.unwrap();
}

async fn setup(source: FakeSource, storage: Arc<FakeStorage>) -> Arc<SharedState> {
    setup_with(test_config(), source, storage).await
}

async fn setup_with(
    config: Config,
    source: FakeSource,
    storage: Arc<FakeStorage>,
) -> Arc<SharedState> {
    let state = SharedState::with_backends(config, Arc::new(source), storage)
        .await
        .expect("failed to build state");
    seed_demo_show(&state.store).await;
    Arc::new(state)
}

fn demo_folder() -> FakeSource {
    FakeSource::new(&[
        ("01.mp4", "video/mp4", 4096),
        ("02.mp4", "video/mp4", 3000),
        ("notes.txt", "text/plain", 10),
        ("03.mp4", "video/mp4", 2048),
    ])
}

#[tokio::test]
async fn test_demo_scenario() {
    let storage = Arc::new(FakeStorage {
        failing_paths: vec!["demo-show/sezon-1/3.mp4".to_string()],
        ..FakeStorage::default()
    });
    let state = setup(demo_folder(), storage.clone()).await;

    let defaults = VideoSourceDefaults {
        quality: Quality::P1080,
        ..VideoSourceDefaults::default()
    };
    let started = state
        .transfers
        .start_bulk_transfer(&AnimeId::new("A1"), 1, FOLDER, defaults)
        .await
        .unwrap();

    assert_eq!(started.accepted.total_files, 3);
    assert_eq!(started.accepted.files, vec!["01.mp4", "02.mp4", "03.mp4"]);

    let status = started.worker.await.unwrap();
    assert_eq!(status.state, BatchState::Completed);
    assert_eq!(status.stats.total, 3);
    assert_eq!(status.stats.processed, 3);
    assert_eq!(status.stats.successful, 2);
    assert_eq!(status.stats.failed, 1);
    assert_eq!(status.stats.skipped, 0);
    assert_eq!(status.files[2].outcome, FileOutcome::Failed);

    let doc = state.catalog.get(&AnimeId::new("A1")).await.unwrap();
    let season = doc.season(1).unwrap();
    let numbers: Vec<u32> = season.episodes.iter().map(|e| e.episode_number).collect();
    assert_eq!(numbers, vec![1, 2]);

    let source = &season.episodes[0].video_sources[0];
    assert_eq!(source.url, "https://cdn.test/demo-show/sezon-1/1.mp4");
    assert_eq!(source.source, SourceKind::Bunny);
    assert_eq!(source.quality, Quality::P1080);
    assert_eq!(
        season.episodes[1].video_sources[0].url,
        "https://cdn.test/demo-show/sezon-1/2.mp4"
    );
    assert_eq!(season.episodes[0].thumbnail, "https://img.test/demo.jpg");
    assert!(doc.source.is_some());

    let objects = storage.objects.lock().unwrap();
    assert_eq!(objects.get("demo-show/sezon-1/1.mp4"), Some(&4096));
    assert_eq!(objects.get("demo-show/sezon-1/2.mp4"), Some(&3000));
}

#[tokio::test]
async fn test_rerun_skips_existing_episodes() {
    let storage = Arc::new(FakeStorage::default());
    let state = setup(demo_folder(), storage.clone()).await;
    let anime = AnimeId::new("A1");

    let first = state
        .transfers
        .start_bulk_transfer(&anime, 1, FOLDER, VideoSourceDefaults::default())
        .await
        .unwrap();
    let first = first.worker.await.unwrap();
    assert_eq!(first.stats.successful, 3);

    let second = state
        .transfers
        .start_bulk_transfer(&anime, 1, FOLDER, VideoSourceDefaults::default())
        .await
        .unwrap();
    let second = second.worker.await.unwrap();
    assert_eq!(second.stats.successful, 0);
    assert_eq!(second.stats.skipped, 3);
    assert!(
        second
            .files
            .iter()
            .all(|f| f.outcome == FileOutcome::SkippedDuplicate)
    );

    let doc = state.catalog.get(&anime).await.unwrap();
    assert_eq!(doc.season(1).unwrap().episodes.len(), 3);
}

#[tokio::test]
async fn test_file_without_digits_is_skipped() {
    let source = FakeSource::new(&[
        ("finale.mkv", "video/x-matroska", 100),
        ("05.mkv", "video/x-matroska", 100),
    ]);
    let storage = Arc::new(FakeStorage::default());
    let state = setup(source, storage.clone()).await;

    let started = state
        .transfers
        .start_bulk_transfer(&AnimeId::new("A1"), 1, FOLDER, VideoSourceDefaults::default())
        .await
        .unwrap();
    let status = started.worker.await.unwrap();

    assert_eq!(status.stats.successful, 1);
    assert_eq!(status.stats.skipped, 1);
    assert_eq!(status.stats.failed, 0);

    let skipped = status
        .files
        .iter()
        .find(|f| f.file_name == "finale.mkv")
        .unwrap();
    assert_eq!(skipped.outcome, FileOutcome::SkippedNoEpisodeNumber);
    assert_eq!(storage.objects.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_cancel_stops_before_next_file() {
    let gate = Arc::new(Semaphore::new(0));
    let storage = Arc::new(FakeStorage {
        gate: Some(gate.clone()),
        ..FakeStorage::default()
    });
    let state = setup(demo_folder(), storage).await;

    let started = state
        .transfers
        .start_bulk_transfer(&AnimeId::new("A1"), 1, FOLDER, VideoSourceDefaults::default())
        .await
        .unwrap();
    let batch_id = started.accepted.batch_id.clone();

    let requested = state.transfers.cancel_batch(&batch_id).await.unwrap();
    assert!(requested.cancel_requested);
    gate.add_permits(3);

    let status = started.worker.await.unwrap();
    assert_eq!(status.state, BatchState::Cancelled);
    assert!(status.stats.processed < status.stats.total);
    assert_eq!(
        status.stats.processed,
        status.stats.successful + status.stats.failed + status.stats.skipped
    );

    let stored = state.transfers.get_batch(&batch_id).await.unwrap();
    assert_eq!(stored.state, BatchState::Cancelled);
}

#[tokio::test]
async fn test_finished_batch_is_persisted() {
    let storage = Arc::new(FakeStorage::default());
    let state = setup(demo_folder(), storage).await;

    let started = state
        .transfers
        .start_bulk_transfer(&AnimeId::new("A1"), 1, FOLDER, VideoSourceDefaults::default())
        .await
        .unwrap();
    let batch_id = started.accepted.batch_id.clone();
    started.worker.await.unwrap();

    let record = state.store.get_batch(&batch_id).await.unwrap().unwrap();
    assert_eq!(record.state, "completed");
    assert_eq!(record.successful, 3);
    assert_eq!(record.anime_title, "Demo Show");
    assert!(record.finished_at.is_some());

    let listed = state.transfers.batches_for_anime("A1").await;
    assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn test_validation_happens_before_work() {
    let storage = Arc::new(FakeStorage::default());
    let state = setup(demo_folder(), storage.clone()).await;
    let defaults = VideoSourceDefaults::default;

    let missing_anime = state
        .transfers
        .start_bulk_transfer(&AnimeId::new("nope"), 1, FOLDER, defaults())
        .await;
    assert!(matches!(missing_anime, Err(TransferError::AnimeNotFound(_))));

    let missing_season = state
        .transfers
        .start_bulk_transfer(&AnimeId::new("A1"), 9, FOLDER, defaults())
        .await;
    assert!(matches!(
        missing_season,
        Err(TransferError::SeasonNotFound { season: 9, .. })
    ));

    let not_folder = state
        .transfers
        .start_bulk_transfer(&AnimeId::new("A1"), 1, "plain-file", defaults())
        .await;
    assert!(matches!(not_folder, Err(TransferError::NotAFolder(_))));

    let missing_folder = state
        .transfers
        .start_bulk_transfer(&AnimeId::new("A1"), 1, "gone", defaults())
        .await;
    assert!(matches!(missing_folder, Err(TransferError::FolderNotFound(_))));

    assert!(state.transfers.list_batches().await.is_empty());
    assert!(storage.objects.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_folder_is_rejected() {
    let source = FakeSource::new(&[("readme.txt", "text/plain", 5)]);
    let state = setup(source, Arc::new(FakeStorage::default())).await;

    let result = state
        .transfers
        .start_bulk_transfer(&AnimeId::new("A1"), 1, FOLDER, VideoSourceDefaults::default())
        .await;
    assert!(matches!(result, Err(TransferError::NoVideoFiles(_))));
}

#[tokio::test]
async fn test_unresponsive_source_fails_the_file() {
    let mut source = FakeSource::new(&[
        ("01.mp4", "video/mp4", 100),
        ("02.mp4", "video/mp4", 100),
    ]);
    source.unresponsive.push("id-01.mp4".to_string());
    let storage = Arc::new(FakeStorage::default());

    let mut config = test_config();
    config.transfer.stall_timeout_seconds = 1;
    let state = setup_with(config, source, storage.clone()).await;

    let started = state
        .transfers
        .start_bulk_transfer(&AnimeId::new("A1"), 1, FOLDER, VideoSourceDefaults::default())
        .await
        .unwrap();
    let status = tokio::time::timeout(Duration::from_secs(10), started.worker)
        .await
        .expect("batch hung on an unresponsive source")
        .unwrap();

    assert_eq!(status.state, BatchState::Completed);
    assert_eq!(status.stats.failed, 1);
    assert_eq!(status.stats.successful, 1);
    assert_eq!(status.files[0].outcome, FileOutcome::Failed);
    assert!(status.files[0].detail.as_deref().unwrap().contains("did not respond"));
    assert_eq!(storage.objects.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_upload_without_response_fails_the_file() {
    let storage = Arc::new(FakeStorage {
        silent_paths: vec!["demo-show/sezon-1/1.mp4".to_string()],
        ..FakeStorage::default()
    });
    let source = FakeSource::new(&[
        ("01.mp4", "video/mp4", 100),
        ("02.mp4", "video/mp4", 100),
    ]);

    let mut config = test_config();
    config.transfer.stall_timeout_seconds = 1;
    let state = setup_with(config, source, storage.clone()).await;

    let started = state
        .transfers
        .start_bulk_transfer(&AnimeId::new("A1"), 1, FOLDER, VideoSourceDefaults::default())
        .await
        .unwrap();
    let status = tokio::time::timeout(Duration::from_secs(10), started.worker)
        .await
        .expect("batch hung waiting for the storage response")
        .unwrap();

    assert_eq!(status.stats.failed, 1);
    assert_eq!(status.stats.successful, 1);
    assert_eq!(status.files[0].outcome, FileOutcome::Failed);

    let doc = state.catalog.get(&AnimeId::new("A1")).await.unwrap();
    let numbers: Vec<u32> = doc
        .season(1)
        .unwrap()
        .episodes
        .iter()
        .map(|e| e.episode_number)
        .collect();
    assert_eq!(numbers, vec![2]);
}

/// Catalog store whose saves fail while they would record `broken_episode`.
struct FailingSaves {
    inner: SeaOrmCatalogStore,
    broken_episode: u32,
    failed_saves: AtomicUsize,
}

#[async_trait]
impl CatalogStore for FailingSaves {
    async fn load(&self, id: &AnimeId) -> Result<VersionedDocument, CatalogError> {
        self.inner.load(id).await
    }

    async fn save(
        &self,
        document: &AnimeDocument,
        expected_version: i64,
    ) -> Result<i64, CatalogError> {
        let records_broken = document
            .season(1)
            .is_some_and(|s| s.has_episode(self.broken_episode));
        if records_broken {
            self.failed_saves.fetch_add(1, Ordering::SeqCst);
            return Err(CatalogError::Database("disk I/O error".to_string()));
        }
        self.inner.save(document, expected_version).await
    }

    async fn create(&self, document: &AnimeDocument) -> Result<(), CatalogError> {
        self.inner.create(document).await
    }

    async fn list(&self) -> Result<Vec<AnimeDocument>, CatalogError> {
        self.inner.list().await
    }

    async fn delete(&self, id: &AnimeId) -> Result<(), CatalogError> {
        self.inner.delete(id).await
    }
}

#[tokio::test]
async fn test_catalog_write_failure_is_retried_then_reported() {
    let config = test_config();
    let retries = config.transfer.persist_retries as usize;
    let store = Store::new(&config.general.database_path).await.unwrap();
    seed_demo_show(&store).await;

    let catalog_store = Arc::new(FailingSaves {
        inner: SeaOrmCatalogStore::new(store.clone()),
        broken_episode: 1,
        failed_saves: AtomicUsize::new(0),
    });
    let catalog = Arc::new(CatalogService::new(catalog_store.clone()));
    let storage = Arc::new(FakeStorage::default());
    let (event_bus, _) = broadcast::channel(64);
    let transfers = Arc::new(TransferService::new(
        catalog.clone(),
        Arc::new(demo_folder()),
        storage.clone(),
        store,
        Arc::new(RwLock::new(config)),
        event_bus,
    ));

    let started = transfers
        .start_bulk_transfer(&AnimeId::new("A1"), 1, FOLDER, VideoSourceDefaults::default())
        .await
        .unwrap();
    let status = started.worker.await.unwrap();

    assert_eq!(catalog_store.failed_saves.load(Ordering::SeqCst), retries);
    assert_eq!(status.state, BatchState::Completed);
    assert_eq!(status.stats.processed, 3);
    assert_eq!(status.stats.failed, 1);
    assert_eq!(status.stats.successful, 2);
    assert_eq!(status.files[0].outcome, FileOutcome::PersistFailed);
    assert_eq!(status.files[1].outcome, FileOutcome::Successful);

    // The object was uploaded even though it could not be recorded.
    assert!(
        storage
            .objects
            .lock()
            .unwrap()
            .contains_key("demo-show/sezon-1/1.mp4")
    );

    let doc = catalog.get(&AnimeId::new("A1")).await.unwrap();
    let numbers: Vec<u32> = doc
        .season(1)
        .unwrap()
        .episodes
        .iter()
        .map(|e| e.episode_number)
        .collect();
    assert_eq!(numbers, vec![2, 3]);
}
