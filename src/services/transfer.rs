//! Bulk transfer of a remote folder into one season of an anime.
//!
//! A batch is validated and listed synchronously, then processed by a
//! detached task, one file at a time in listing order. Each file is streamed
//! from the source straight into object storage and recorded in the catalog
//! before the next one starts. Live state is kept in an in-memory registry
//! and the final summary is written to `transfer_batches`.

use anyhow::Context;
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt, stream};
use serde::Serialize;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{Config, TransferConfig};
use crate::constants::transfer::PERSIST_RETRY_MAX_DELAY;
use crate::db::{BatchRecord, Store};
use crate::domain::events::NotificationEvent;
use crate::domain::{AnimeId, BatchId};
use crate::models::anime::{AnimeDocument, Episode, SourceKind, VideoSource};
use crate::models::transfer::{
    BatchState, BatchStatus, FileOutcome, FileReport, RemoteFile, TransferStats,
    VideoSourceDefaults,
};
use crate::parser::episode::extract_episode_number;
use crate::parser::naming::destination_path;
use crate::services::catalog::{CatalogError, CatalogService};
use crate::services::retry::calculate_backoff;
use crate::services::source::{ByteStream, RemoteSource, SourceError};
use crate::services::source_id::generate_source_id;
use crate::services::storage::ObjectStorage;

const PERSISTED_HISTORY_LIMIT: u64 = 50;

#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Anime not found: {0}")]
    AnimeNotFound(AnimeId),

    #[error("Season {season} not found for anime {anime_id}")]
    SeasonNotFound { anime_id: AnimeId, season: i32 },

    #[error("folder not found or inaccessible")]
    FolderNotFound(String),

    #[error("not a folder: {0}")]
    NotAFolder(String),

    #[error("no video files found in folder {0}")]
    NoVideoFiles(String),

    #[error("object storage is not configured")]
    StorageNotConfigured,

    #[error("Batch not found: {0}")]
    BatchNotFound(String),

    #[error("{0}")]
    Source(String),

    #[error(transparent)]
    Catalog(CatalogError),
}

impl From<SourceError> for TransferError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NotFound(id) => Self::FolderNotFound(id),
            SourceError::NotAFolder(id) => Self::NotAFolder(id),
            SourceError::Other(message) => Self::Source(message),
        }
    }
}

impl From<CatalogError> for TransferError {
    fn from(err: CatalogError) -> Self {
        match err {
            CatalogError::NotFound(id) => Self::AnimeNotFound(id),
            CatalogError::SeasonNotFound { anime_id, season } => {
                Self::SeasonNotFound { anime_id, season }
            }
            other => Self::Catalog(other),
        }
    }
}

/// Immediate answer to a bulk transfer request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferAccepted {
    pub message: String,
    pub total_files: usize,
    pub files: Vec<String>,
    pub batch_id: String,
}

/// A batch that passed validation. `worker` resolves to the final status.
pub struct StartedBatch {
    pub accepted: TransferAccepted,
    pub worker: JoinHandle<BatchStatus>,
}

#[derive(Debug, Clone, Copy)]
struct TransferSettings {
    stall_timeout: Duration,
    persist_attempts: u32,
    persist_retry_base_ms: u64,
    progress_interval_bytes: u64,
}

impl From<&TransferConfig> for TransferSettings {
    fn from(config: &TransferConfig) -> Self {
        Self {
            stall_timeout: Duration::from_secs(config.stall_timeout_seconds.max(1)),
            persist_attempts: config.persist_retries.max(1),
            persist_retry_base_ms: config.persist_retry_base_ms,
            progress_interval_bytes: config
                .progress_log_interval_mb
                .max(1)
                .saturating_mul(1024 * 1024),
        }
    }
}

struct BatchPlan {
    batch_id: BatchId,
    anime_id: AnimeId,
    anime_title: String,
    season_number: i32,
    files: Vec<RemoteFile>,
    defaults: VideoSourceDefaults,
}

/// Live state of one batch, shared between its worker and the status
/// endpoints.
pub struct BatchHandle {
    status: RwLock<BatchStatus>,
    current_bytes: AtomicU64,
    finished: AtomicBool,
    cancel: CancellationToken,
    started: Instant,
}

impl BatchHandle {
    fn new(status: BatchStatus) -> Self {
        Self {
            status: RwLock::new(status),
            current_bytes: AtomicU64::new(0),
            finished: AtomicBool::new(false),
            cancel: CancellationToken::new(),
            started: Instant::now(),
        }
    }

    pub async fn snapshot(&self) -> BatchStatus {
        let mut status = self.status.read().await.clone();
        if !status.state.is_finished() {
            status.elapsed_seconds = self.started.elapsed().as_secs();
            status.current_bytes = self.current_bytes.load(Ordering::Relaxed);
        }
        status.percent = status.stats.percent();
        status.cancel_requested = self.cancel.is_cancelled();
        status
    }

    async fn begin_file(&self, file_name: &str) {
        self.current_bytes.store(0, Ordering::Relaxed);
        self.status.write().await.current_file = Some(file_name.to_string());
    }

    async fn finish_file(&self, report: FileReport) -> TransferStats {
        let mut status = self.status.write().await;
        status.stats.record(report.outcome);
        status.current_file = None;
        status.files.push(report);
        status.stats
    }

    async fn finish(&self, state: BatchState, error: Option<String>) -> BatchStatus {
        {
            let mut status = self.status.write().await;
            status.state = state;
            status.error = error;
            status.current_file = None;
            status.current_bytes = 0;
            status.finished_at = Some(Utc::now());
            status.elapsed_seconds = self.started.elapsed().as_secs();
        }
        self.finished.store(true, Ordering::Release);
        self.snapshot().await
    }
}

struct FileResult {
    episode_number: Option<u32>,
    outcome: FileOutcome,
    detail: Option<String>,
    bytes: u64,
}

impl FileResult {
    fn new(episode_number: Option<u32>, outcome: FileOutcome, detail: Option<String>) -> Self {
        Self {
            episode_number,
            outcome,
            detail,
            bytes: 0,
        }
    }

    fn failed(episode_number: Option<u32>, detail: impl Into<String>) -> Self {
        Self::new(episode_number, FileOutcome::Failed, Some(detail.into()))
    }
}

pub struct TransferService {
    catalog: Arc<CatalogService>,
    source: Arc<dyn RemoteSource>,
    storage: Arc<dyn ObjectStorage>,
    store: Store,
    config: Arc<RwLock<Config>>,
    event_bus: broadcast::Sender<NotificationEvent>,
    batches: RwLock<HashMap<BatchId, Arc<BatchHandle>>>,
}

impl TransferService {
    #[must_use]
    pub fn new(
        catalog: Arc<CatalogService>,
        source: Arc<dyn RemoteSource>,
        storage: Arc<dyn ObjectStorage>,
        store: Store,
        config: Arc<RwLock<Config>>,
        event_bus: broadcast::Sender<NotificationEvent>,
    ) -> Self {
        Self {
            catalog,
            source,
            storage,
            store,
            config,
            event_bus,
            batches: RwLock::new(HashMap::new()),
        }
    }

    /// Validates the target, lists the folder and starts the batch worker.
    ///
    /// Everything that can be rejected is rejected here, before any work
    /// is spawned.
    ///
    /// # Errors
    ///
    /// - [`TransferError::AnimeNotFound`] / [`TransferError::SeasonNotFound`]
    /// - [`TransferError::FolderNotFound`] when the folder is missing or not shared
    /// - [`TransferError::NotAFolder`] when the reference names a plain file
    /// - [`TransferError::NoVideoFiles`] when nothing in the folder looks like video
    pub async fn start_bulk_transfer(
        self: &Arc<Self>,
        anime_id: &AnimeId,
        season_number: i32,
        folder_ref: &str,
        defaults: VideoSourceDefaults,
    ) -> Result<StartedBatch, TransferError> {
        let document = self.catalog.get(anime_id).await?;
        if document.season(season_number).is_none() {
            return Err(TransferError::SeasonNotFound {
                anime_id: anime_id.clone(),
                season: season_number,
            });
        }

        let folder_id = self.source.normalize_folder_ref(folder_ref);
        if folder_id.is_empty() {
            return Err(TransferError::NotAFolder(folder_ref.to_string()));
        }

        if !self.storage.is_configured() {
            return Err(TransferError::StorageNotConfigured);
        }

        let files = self.source.list_video_files(&folder_id).await?;
        if files.is_empty() {
            return Err(TransferError::NoVideoFiles(folder_id));
        }

        let batch_id = BatchId::new();
        let names: Vec<String> = files.iter().map(|f| f.name.clone()).collect();
        let plan = BatchPlan {
            batch_id,
            anime_id: anime_id.clone(),
            anime_title: document.display_title().to_string(),
            season_number,
            files,
            defaults,
        };

        let handle = Arc::new(BatchHandle::new(BatchStatus {
            id: batch_id.to_string(),
            anime_id: anime_id.to_string(),
            anime_title: plan.anime_title.clone(),
            season_number,
            folder_id: folder_id.clone(),
            state: BatchState::Running,
            stats: TransferStats::new(names.len()),
            percent: 0.0,
            current_file: None,
            current_bytes: 0,
            started_at: Utc::now(),
            finished_at: None,
            elapsed_seconds: 0,
            cancel_requested: false,
            error: None,
            files: Vec::new(),
        }));

        if let Err(e) = self.store.save_batch(&handle.snapshot().await).await {
            warn!(batch_id = %batch_id, error = %e, "Failed to record batch start");
        }
        self.register(batch_id, handle.clone()).await;

        let service = Arc::clone(self);
        let worker = tokio::spawn(async move { service.run_batch(handle, plan).await });

        Ok(StartedBatch {
            accepted: TransferAccepted {
                message: format!(
                    "Transfer of {} files started for season {season_number}",
                    names.len()
                ),
                total_files: names.len(),
                files: names,
                batch_id: batch_id.to_string(),
            },
            worker,
        })
    }

    /// Lists the video files of a folder without transferring anything.
    pub async fn preview_folder(
        &self,
        folder_ref: &str,
    ) -> Result<(String, Vec<RemoteFile>), TransferError> {
        let folder_id = self.source.normalize_folder_ref(folder_ref);
        let files = self.source.list_video_files(&folder_id).await?;
        Ok((folder_id, files))
    }

    /// Live batches first, then finished ones from the database, newest
    /// first.
    pub async fn list_batches(&self) -> Vec<BatchStatus> {
        let handles: Vec<Arc<BatchHandle>> = self.batches.read().await.values().cloned().collect();

        let mut statuses = Vec::with_capacity(handles.len());
        for handle in handles {
            statuses.push(handle.snapshot().await);
        }

        match self.store.recent_batches(PERSISTED_HISTORY_LIMIT).await {
            Ok(records) => {
                for record in records {
                    if !statuses.iter().any(|s| s.id == record.id) {
                        statuses.push(status_from_record(record));
                    }
                }
            }
            Err(e) => warn!(error = %e, "Failed to load batch history"),
        }

        statuses.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        statuses
    }

    /// Every known batch that targeted `anime_id`, newest first.
    pub async fn batches_for_anime(&self, anime_id: &str) -> Vec<BatchStatus> {
        let handles: Vec<Arc<BatchHandle>> = self.batches.read().await.values().cloned().collect();

        let mut statuses = Vec::new();
        for handle in handles {
            let status = handle.snapshot().await;
            if status.anime_id == anime_id {
                statuses.push(status);
            }
        }

        match self.store.batches_for_anime(anime_id).await {
            Ok(records) => {
                for record in records {
                    if !statuses.iter().any(|s| s.id == record.id) {
                        statuses.push(status_from_record(record));
                    }
                }
            }
            Err(e) => warn!(anime_id, error = %e, "Failed to load batch history"),
        }

        statuses.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        statuses
    }

    pub async fn get_batch(&self, id: &str) -> Result<BatchStatus, TransferError> {
        let batch_id =
            BatchId::parse(id).map_err(|_| TransferError::BatchNotFound(id.to_string()))?;

        let handle = self.batches.read().await.get(&batch_id).cloned();
        if let Some(handle) = handle {
            return Ok(handle.snapshot().await);
        }

        self.store
            .get_batch(&batch_id.to_string())
            .await
            .map_err(|e| TransferError::Catalog(CatalogError::from(e)))?
            .map(status_from_record)
            .ok_or_else(|| TransferError::BatchNotFound(id.to_string()))
    }

    /// Requests a stop. The worker honours it before starting the next
    /// file; the file in flight is finished normally.
    pub async fn cancel_batch(&self, id: &str) -> Result<BatchStatus, TransferError> {
        let batch_id =
            BatchId::parse(id).map_err(|_| TransferError::BatchNotFound(id.to_string()))?;

        let handle = self.batches.read().await.get(&batch_id).cloned();
        match handle {
            Some(handle) => {
                if !handle.finished.load(Ordering::Acquire) {
                    handle.cancel.cancel();
                    info!(batch_id = %batch_id, "Cancellation requested");
                }
                Ok(handle.snapshot().await)
            }
            None => self.get_batch(id).await,
        }
    }

    async fn register(&self, batch_id: BatchId, handle: Arc<BatchHandle>) {
        let keep = self.config.read().await.transfer.max_retained_batches.max(1);
        let mut batches = self.batches.write().await;
        batches.insert(batch_id, handle);

        if batches.len() > keep {
            let mut finished: Vec<(Instant, BatchId)> = batches
                .iter()
                .filter(|(_, h)| h.finished.load(Ordering::Acquire))
                .map(|(id, h)| (h.started, *id))
                .collect();
            finished.sort_by_key(|(started, _)| *started);

            let excess = batches.len() - keep;
            for (_, id) in finished.into_iter().take(excess) {
                batches.remove(&id);
            }
        }
    }

    async fn run_batch(self: Arc<Self>, handle: Arc<BatchHandle>, plan: BatchPlan) -> BatchStatus {
        let settings = TransferSettings::from(&self.config.read().await.transfer);
        let batch_id = plan.batch_id.to_string();
        let total = plan.files.len();

        let _ = self.event_bus.send(NotificationEvent::TransferStarted {
            batch_id: batch_id.clone(),
            anime_id: plan.anime_id.to_string(),
            title: plan.anime_title.clone(),
            season_number: plan.season_number,
            total,
        });
        info!(
            event = "transfer_batch_started",
            batch_id = %batch_id,
            anime_id = %plan.anime_id,
            season = plan.season_number,
            total,
            "Bulk transfer started"
        );

        let mut cancelled = false;
        for file in &plan.files {
            if handle.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            handle.begin_file(&file.name).await;
            let started = Instant::now();
            let result = self.process_file(&plan, &handle, file, settings).await;
            let duration = started.elapsed();

            metrics::counter!("transfer_files_total", "outcome" => result.outcome.as_str())
                .increment(1);
            metrics::histogram!("transfer_file_duration_seconds").record(duration.as_secs_f64());

            let stats = handle
                .finish_file(FileReport {
                    file_name: file.name.clone(),
                    episode_number: result.episode_number,
                    outcome: result.outcome,
                    detail: result.detail.clone(),
                    bytes: result.bytes,
                    duration_ms: u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                })
                .await;

            info!(
                event = "transfer_file_finished",
                batch_id = %batch_id,
                file = %file.name,
                episode = ?result.episode_number,
                outcome = result.outcome.as_str(),
                detail = result.detail.as_deref().unwrap_or(""),
                bytes = result.bytes,
                duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                processed = stats.processed,
                total = stats.total,
                "File processed"
            );
            let _ = self.event_bus.send(NotificationEvent::TransferFileFinished {
                batch_id: batch_id.clone(),
                file_name: file.name.clone(),
                episode_number: result.episode_number,
                outcome: result.outcome,
                stats,
            });
        }

        let state = if cancelled {
            BatchState::Cancelled
        } else {
            BatchState::Completed
        };
        let status = handle.finish(state, None).await;
        let stats = status.stats;

        info!(
            event = "transfer_batch_finished",
            batch_id = %batch_id,
            anime_id = %plan.anime_id,
            state = state.as_str(),
            total = stats.total,
            processed = stats.processed,
            successful = stats.successful,
            failed = stats.failed,
            skipped = stats.skipped,
            elapsed_seconds = status.elapsed_seconds,
            "Bulk transfer finished"
        );
        metrics::counter!("transfer_batches_total", "result" => state.as_str()).increment(1);

        if let Err(e) = self.store.save_batch(&status).await {
            error!(batch_id = %batch_id, error = %e, "Failed to persist batch summary");
        }

        let event = if cancelled {
            NotificationEvent::TransferCancelled {
                batch_id,
                stats,
            }
        } else {
            NotificationEvent::TransferFinished {
                batch_id,
                anime_id: plan.anime_id.to_string(),
                title: plan.anime_title.clone(),
                stats,
                elapsed_seconds: status.elapsed_seconds,
            }
        };
        let _ = self.event_bus.send(event);

        status
    }

    async fn process_file(
        &self,
        plan: &BatchPlan,
        handle: &Arc<BatchHandle>,
        file: &RemoteFile,
        settings: TransferSettings,
    ) -> FileResult {
        let Some(episode_number) = extract_episode_number(&file.name) else {
            return FileResult::new(
                None,
                FileOutcome::SkippedNoEpisodeNumber,
                Some("no episode number in file name".to_string()),
            );
        };
        let episode = Some(episode_number);

        match self.catalog.get(&plan.anime_id).await {
            Ok(document) => match document.season(plan.season_number) {
                Some(season) if season.has_episode(episode_number) => {
                    return FileResult::new(
                        episode,
                        FileOutcome::SkippedDuplicate,
                        Some("episode already exists".to_string()),
                    );
                }
                Some(_) => {}
                None => return FileResult::failed(episode, "season no longer exists"),
            },
            Err(e) => return FileResult::failed(episode, e.to_string()),
        }

        let path = destination_path(&plan.anime_title, plan.season_number, episode_number);
        let (url, bytes) = match self.transfer_file(plan, handle, file, &path, settings).await {
            Ok(done) => done,
            Err(e) => {
                warn!(
                    batch_id = %plan.batch_id,
                    file = %file.name,
                    error = %format!("{e:#}"),
                    "File transfer failed"
                );
                return FileResult::failed(episode, format!("{e:#}"));
            }
        };

        let (outcome, detail) = self
            .persist_episode(plan, episode_number, &url, settings)
            .await;
        FileResult {
            episode_number: episode,
            outcome,
            detail,
            bytes,
        }
    }

    /// Pipes the source stream into storage. Returns the public URL and the
    /// number of bytes that passed through.
    async fn transfer_file(
        &self,
        plan: &BatchPlan,
        handle: &Arc<BatchHandle>,
        file: &RemoteFile,
        path: &str,
        settings: TransferSettings,
    ) -> anyhow::Result<(String, u64)> {
        let opening = self.source.open_stream(&file.id);
        let source = tokio::time::timeout(settings.stall_timeout, opening)
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "source did not respond within {}s",
                    settings.stall_timeout.as_secs()
                )
            })?
            .with_context(|| format!("Failed to open {}", file.name))?;

        let transferred = Arc::new(AtomicU64::new(0));
        let body = track_progress(
            with_stall_timeout(source, settings.stall_timeout),
            ProgressTracker {
                transferred: transferred.clone(),
                handle: handle.clone(),
                event_bus: self.event_bus.clone(),
                batch_id: plan.batch_id.to_string(),
                file_name: file.name.clone(),
                total_bytes: file.size,
                interval: settings.progress_interval_bytes,
            },
        );

        debug!(batch_id = %plan.batch_id, file = %file.name, path, "Uploading");
        let upload = self.storage.upload_stream(path, body, file.size);
        let url = guard_upload(upload, &transferred, settings.stall_timeout)
            .await
            .with_context(|| format!("Failed to upload {path}"))?;

        let bytes = transferred.load(Ordering::Relaxed);
        metrics::counter!("transfer_bytes_total").increment(bytes);
        Ok((url, bytes))
    }

    /// Records the uploaded episode, retrying transient catalog failures
    /// with backoff.
    async fn persist_episode(
        &self,
        plan: &BatchPlan,
        episode_number: u32,
        url: &str,
        settings: TransferSettings,
    ) -> (FileOutcome, Option<String>) {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let result = self
                .catalog
                .update(&plan.anime_id, |document| {
                    add_transferred_episode(
                        document,
                        plan.season_number,
                        episode_number,
                        url,
                        &plan.defaults,
                    )
                })
                .await;

            match result {
                Ok(_) => return (FileOutcome::Successful, None),
                Err(CatalogError::DuplicateEpisode { .. }) => {
                    return (
                        FileOutcome::SkippedDuplicate,
                        Some("episode was added while uploading".to_string()),
                    );
                }
                Err(e) if e.is_transient() && attempt < settings.persist_attempts => {
                    let delay = calculate_backoff(
                        attempt,
                        settings.persist_retry_base_ms,
                        PERSIST_RETRY_MAX_DELAY,
                    );
                    warn!(
                        batch_id = %plan.batch_id,
                        episode = episode_number,
                        attempt,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        error = %e,
                        "Catalog update failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    error!(
                        batch_id = %plan.batch_id,
                        episode = episode_number,
                        url,
                        attempts = attempt,
                        error = %e,
                        "Uploaded episode could not be recorded"
                    );
                    return (FileOutcome::PersistFailed, Some(e.to_string()));
                }
            }
        }
    }
}

/// Appends a freshly uploaded episode to a season, keeping episodes ordered
/// and the provenance tag set.
///
/// # Errors
///
/// [`CatalogError::SeasonNotFound`] or [`CatalogError::DuplicateEpisode`];
/// the document is left untouched in both cases.
pub fn add_transferred_episode(
    document: &mut AnimeDocument,
    season_number: i32,
    episode_number: u32,
    cdn_url: &str,
    defaults: &VideoSourceDefaults,
) -> Result<(), CatalogError> {
    let source_id = generate_source_id(SourceKind::Bunny.as_str(), &document.source_ids());
    let episode = Episode {
        episode_number,
        title: format!("Bölüm {episode_number}"),
        description: format!("{} {episode_number}. Bölüm", document.display_title()),
        thumbnail: document.cover_image.clone(),
        duration: 0,
        video_sources: vec![VideoSource {
            url: cdn_url.to_string(),
            quality: defaults.quality,
            language: defaults.language,
            kind: defaults.kind,
            fansub: defaults.fansub.clone(),
            source: SourceKind::Bunny,
            source_id,
        }],
        release_date: Utc::now(),
    };

    let anime_id = document.id.clone();
    let season = document
        .season_mut(season_number)
        .ok_or(CatalogError::SeasonNotFound {
            anime_id,
            season: season_number,
        })?;
    season
        .insert_episode(episode)
        .map_err(|e| CatalogError::DuplicateEpisode {
            season: season_number,
            episode: e.episode_number,
        })?;
    document.ensure_source();
    Ok(())
}

/// Fails the stream when no chunk arrives within `limit`.
fn with_stall_timeout(inner: ByteStream, limit: Duration) -> ByteStream {
    stream::unfold(Some(inner), move |state| async move {
        let mut inner = state?;
        match tokio::time::timeout(limit, inner.next()).await {
            Ok(Some(chunk)) => Some((chunk, Some(inner))),
            Ok(None) => None,
            Err(_) => Some((
                Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no data received for {}s", limit.as_secs()),
                )),
                None,
            )),
        }
    })
    .boxed()
}

/// Drives an upload for as long as bytes keep moving through its body.
/// A full `limit` window without new bytes fails it, which also bounds the
/// wait for the response once the body has been sent.
async fn guard_upload<F, T, E>(
    upload: F,
    transferred: &AtomicU64,
    limit: Duration,
) -> anyhow::Result<T>
where
    F: Future<Output = Result<T, E>>,
    E: std::error::Error + Send + Sync + 'static,
{
    tokio::pin!(upload);
    let mut seen = transferred.load(Ordering::Relaxed);
    loop {
        tokio::select! {
            result = &mut upload => return Ok(result?),
            () = tokio::time::sleep(limit) => {
                let now = transferred.load(Ordering::Relaxed);
                if now == seen {
                    anyhow::bail!("upload made no progress for {}s", limit.as_secs());
                }
                seen = now;
            }
        }
    }
}

struct ProgressTracker {
    transferred: Arc<AtomicU64>,
    handle: Arc<BatchHandle>,
    event_bus: broadcast::Sender<NotificationEvent>,
    batch_id: String,
    file_name: String,
    total_bytes: Option<u64>,
    interval: u64,
}

fn track_progress(inner: ByteStream, tracker: ProgressTracker) -> ByteStream {
    let interval = tracker.interval.max(1);
    let mut next_mark = interval;

    inner
        .inspect_ok(move |chunk| {
            let len = u64::try_from(chunk.len()).unwrap_or(u64::MAX);
            let transferred = tracker.transferred.fetch_add(len, Ordering::Relaxed) + len;
            tracker
                .handle
                .current_bytes
                .store(transferred, Ordering::Relaxed);

            if transferred >= next_mark {
                next_mark = transferred.saturating_add(interval);
                debug!(
                    batch_id = %tracker.batch_id,
                    file = %tracker.file_name,
                    transferred,
                    total = ?tracker.total_bytes,
                    "Transfer progress"
                );
                let _ = tracker.event_bus.send(NotificationEvent::TransferProgress {
                    batch_id: tracker.batch_id.clone(),
                    file_name: tracker.file_name.clone(),
                    uploaded_bytes: transferred,
                    total_bytes: tracker.total_bytes,
                });
            }
        })
        .boxed()
}

fn status_from_record(record: BatchRecord) -> BatchStatus {
    let count = |v: i64| usize::try_from(v).unwrap_or(0);
    let parse_time = |raw: &str| {
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .ok()
    };

    let stats = TransferStats {
        total: count(record.total),
        processed: count(record.processed),
        successful: count(record.successful),
        failed: count(record.failed),
        skipped: count(record.skipped),
    };
    let started_at = parse_time(&record.started_at).unwrap_or_default();
    let finished_at = record.finished_at.as_deref().and_then(parse_time);
    let elapsed_seconds = finished_at
        .map(|end| u64::try_from((end - started_at).num_seconds()).unwrap_or(0))
        .unwrap_or(0);

    BatchStatus {
        id: record.id,
        anime_id: record.anime_id,
        anime_title: record.anime_title,
        season_number: record.season_number,
        folder_id: record.folder_id,
        state: BatchState::parse(&record.state),
        percent: stats.percent(),
        stats,
        current_file: None,
        current_bytes: 0,
        started_at,
        finished_at,
        elapsed_seconds,
        cancel_requested: false,
        error: record.error,
        files: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::anime::{AnimeTitle, CatalogProvider, Quality, Season};
    use bytes::Bytes;

    fn document() -> AnimeDocument {
        let mut doc = AnimeDocument::new(AnimeId::new("A1"), AnimeTitle::romaji("Demo Show"));
        doc.cover_image = "https://img.example.com/cover.jpg".to_string();
        doc.add_season(Season::new(1)).unwrap();
        doc
    }

    #[test]
    fn test_transferred_episode_shape() {
        let mut doc = document();
        let defaults = VideoSourceDefaults {
            quality: Quality::P1080,
            fansub: Some("fansub-1".to_string()),
            ..VideoSourceDefaults::default()
        };

        add_transferred_episode(&mut doc, 1, 2, "https://cdn/2.mp4", &defaults).unwrap();
        add_transferred_episode(&mut doc, 1, 1, "https://cdn/1.mp4", &defaults).unwrap();

        let season = doc.season(1).unwrap();
        assert_eq!(season.episodes[0].episode_number, 1);
        assert_eq!(season.episodes[1].episode_number, 2);

        let episode = &season.episodes[0];
        assert_eq!(episode.title, "Bölüm 1");
        assert_eq!(episode.description, "Demo Show 1. Bölüm");
        assert_eq!(episode.thumbnail, "https://img.example.com/cover.jpg");

        let source = &episode.video_sources[0];
        assert_eq!(source.url, "https://cdn/1.mp4");
        assert_eq!(source.quality, Quality::P1080);
        assert_eq!(source.source, SourceKind::Bunny);
        assert_eq!(source.fansub.as_deref(), Some("fansub-1"));
        assert!(source.source_id.starts_with("bunny-"));

        assert_eq!(doc.source.unwrap().name, CatalogProvider::Custom);
    }

    #[test]
    fn test_transferred_episode_rejections_leave_document_alone() {
        let mut doc = document();
        let defaults = VideoSourceDefaults::default();
        add_transferred_episode(&mut doc, 1, 1, "https://cdn/1.mp4", &defaults).unwrap();
        let before = doc.clone();

        assert!(matches!(
            add_transferred_episode(&mut doc, 1, 1, "https://cdn/1b.mp4", &defaults),
            Err(CatalogError::DuplicateEpisode { .. })
        ));
        assert!(matches!(
            add_transferred_episode(&mut doc, 7, 1, "https://cdn/1.mp4", &defaults),
            Err(CatalogError::SeasonNotFound { season: 7, .. })
        ));
        assert_eq!(doc, before);
    }

    #[tokio::test]
    async fn test_stall_timeout_fails_silent_stream() {
        let silent: ByteStream = stream::pending().boxed();
        let mut guarded = with_stall_timeout(silent, Duration::from_millis(20));

        let err = guarded.next().await.unwrap().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::TimedOut);
        assert!(guarded.next().await.is_none());
    }

    #[tokio::test]
    async fn test_stall_timeout_passes_live_stream() {
        let chunks: ByteStream = stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Ok(Bytes::from_static(b"de")),
        ])
        .boxed();
        let collected: Vec<Bytes> = with_stall_timeout(chunks, Duration::from_secs(1))
            .try_collect()
            .await
            .unwrap();
        assert_eq!(collected.concat(), b"abcde");
    }

    #[test]
    fn test_status_from_record() {
        let record = BatchRecord {
            id: "b1".to_string(),
            anime_id: "A1".to_string(),
            anime_title: "Demo Show".to_string(),
            season_number: 1,
            folder_id: "folder".to_string(),
            state: "completed".to_string(),
            total: 3,
            processed: 3,
            successful: 2,
            failed: 1,
            skipped: 0,
            started_at: "2026-03-01T10:00:00+00:00".to_string(),
            finished_at: Some("2026-03-01T10:02:00+00:00".to_string()),
            error: None,
        };
        let status = status_from_record(record);
        assert_eq!(status.state, BatchState::Completed);
        assert_eq!(status.stats.successful, 2);
        assert_eq!(status.elapsed_seconds, 120);
        assert!((status.percent - 100.0).abs() < f64::EPSILON);
    }
}
