//! Catalog documents: whole-document load/save plus the edits the admin
//! surface and the transfer pipeline make to them.
//!
//! Every write goes through [`CatalogService::update`], which serializes
//! writers of one anime behind an async mutex and saves with a version
//! check, so concurrent batches cannot drop each other's episodes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::db::{Store, VersionedDocument};
use crate::domain::AnimeId;
use crate::models::anime::{
    AnimeDocument, AnimeSource, AnimeTitle, Episode, Language, Quality, Season, SourceKind,
    SubtitleKind, VideoSource,
};
use crate::services::source_id::generate_source_id;

/// Conflicts tolerated inside one `update` call before giving up. Writers in
/// this process are already serialized, so conflicts only come from outside.
const MAX_VERSION_CONFLICTS: usize = 3;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Anime not found: {0}")]
    NotFound(AnimeId),

    #[error("Season {season} not found for anime {anime_id}")]
    SeasonNotFound { anime_id: AnimeId, season: i32 },

    #[error("Episode {episode} not found in season {season}")]
    EpisodeNotFound { season: i32, episode: u32 },

    #[error("Season {0} already exists")]
    DuplicateSeason(i32),

    #[error("Episode {episode} already exists in season {season}")]
    DuplicateEpisode { season: i32, episode: u32 },

    #[error("Anime already exists: {0}")]
    AlreadyExists(AnimeId),

    #[error("Document {0} was modified concurrently")]
    VersionConflict(AnimeId),

    #[error("Invalid catalog data: {0}")]
    InvalidData(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl CatalogError {
    /// Whether repeating the same write may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::VersionConflict(_) | Self::Database(_))
    }
}

impl From<anyhow::Error> for CatalogError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(format!("{err:#}"))
    }
}

impl From<sea_orm::DbErr> for CatalogError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

/// Whole-document persistence of anime catalog entries.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// # Errors
    ///
    /// Returns [`CatalogError::NotFound`] when no document has this id.
    async fn load(&self, id: &AnimeId) -> Result<VersionedDocument, CatalogError>;

    /// Overwrites the document if it is still at `expected_version` and
    /// returns the new version.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::VersionConflict`] when another write landed
    /// first.
    async fn save(
        &self,
        document: &AnimeDocument,
        expected_version: i64,
    ) -> Result<i64, CatalogError>;

    async fn create(&self, document: &AnimeDocument) -> Result<(), CatalogError>;

    async fn list(&self) -> Result<Vec<AnimeDocument>, CatalogError>;

    async fn delete(&self, id: &AnimeId) -> Result<(), CatalogError>;
}

pub struct SeaOrmCatalogStore {
    store: Store,
}

impl SeaOrmCatalogStore {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl CatalogStore for SeaOrmCatalogStore {
    async fn load(&self, id: &AnimeId) -> Result<VersionedDocument, CatalogError> {
        self.store
            .get_anime(id.as_str())
            .await?
            .ok_or_else(|| CatalogError::NotFound(id.clone()))
    }

    async fn save(
        &self,
        document: &AnimeDocument,
        expected_version: i64,
    ) -> Result<i64, CatalogError> {
        if self
            .store
            .update_anime_if_version(document, expected_version)
            .await?
        {
            Ok(expected_version + 1)
        } else {
            Err(CatalogError::VersionConflict(document.id.clone()))
        }
    }

    async fn create(&self, document: &AnimeDocument) -> Result<(), CatalogError> {
        if self.store.get_anime(document.id.as_str()).await?.is_some() {
            return Err(CatalogError::AlreadyExists(document.id.clone()));
        }
        self.store.insert_anime(document).await?;
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AnimeDocument>, CatalogError> {
        Ok(self.store.list_anime().await?)
    }

    async fn delete(&self, id: &AnimeId) -> Result<(), CatalogError> {
        if self.store.delete_anime(id.as_str()).await? {
            Ok(())
        } else {
            Err(CatalogError::NotFound(id.clone()))
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAnime {
    pub title: AnimeTitle,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cover_image: String,
    #[serde(default)]
    pub source: Option<AnimeSource>,
    /// Seasons created empty alongside the anime.
    #[serde(default)]
    pub seasons: Vec<i32>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSeason {
    pub season_number: i32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVideoSource {
    pub url: String,
    #[serde(default)]
    pub quality: Quality,
    #[serde(default)]
    pub language: Language,
    #[serde(rename = "type", default)]
    pub kind: SubtitleKind,
    #[serde(default)]
    pub fansub: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEpisode {
    pub episode_number: u32,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumbnail: String,
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub release_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub video_sources: Vec<NewVideoSource>,
}

pub struct CatalogService {
    store: Arc<dyn CatalogStore>,
    locks: Mutex<HashMap<AnimeId, Arc<Mutex<()>>>>,
}

impl CatalogService {
    #[must_use]
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Exclusive write access to one anime document.
    pub async fn lock(&self, id: &AnimeId) -> OwnedMutexGuard<()> {
        let mutex = {
            let mut locks = self.locks.lock().await;
            if locks.len() > 256 {
                locks.retain(|_, m| Arc::strong_count(m) > 1);
            }
            locks.entry(id.clone()).or_default().clone()
        };
        mutex.lock_owned().await
    }

    pub async fn get(&self, id: &AnimeId) -> Result<AnimeDocument, CatalogError> {
        Ok(self.store.load(id).await?.document)
    }

    pub async fn list(&self) -> Result<Vec<AnimeDocument>, CatalogError> {
        self.store.list().await
    }

    /// Read-modify-write of one document under its lock.
    ///
    /// `edit` runs against a freshly loaded copy and may run again if the
    /// save hits a version conflict. Nothing is written when `edit` fails.
    pub async fn update<T, F>(
        &self,
        id: &AnimeId,
        mut edit: F,
    ) -> Result<(AnimeDocument, T), CatalogError>
    where
        F: FnMut(&mut AnimeDocument) -> Result<T, CatalogError> + Send,
        T: Send,
    {
        let _guard = self.lock(id).await;

        let mut conflicts = 0;
        loop {
            let VersionedDocument {
                mut document,
                version,
            } = self.store.load(id).await?;
            let output = edit(&mut document)?;

            match self.store.save(&document, version).await {
                Ok(new_version) => {
                    debug!(anime_id = %id, version = new_version, "Saved anime document");
                    return Ok((document, output));
                }
                Err(CatalogError::VersionConflict(_)) if conflicts < MAX_VERSION_CONFLICTS => {
                    conflicts += 1;
                    warn!(anime_id = %id, conflicts, "Version conflict, reloading document");
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn create_anime(&self, input: NewAnime) -> Result<AnimeDocument, CatalogError> {
        if input.title.romaji.trim().is_empty() {
            return Err(CatalogError::InvalidData("title.romaji is required".into()));
        }

        let mut document = AnimeDocument::new(AnimeId::generate(), input.title);
        document.description = input.description;
        document.cover_image = input.cover_image;
        document.source = input.source;
        for season_number in input.seasons {
            document
                .add_season(Season::new(season_number))
                .map_err(|s| CatalogError::DuplicateSeason(s.season_number))?;
        }

        self.store.create(&document).await?;
        Ok(document)
    }

    pub async fn delete_anime(&self, id: &AnimeId) -> Result<(), CatalogError> {
        let _guard = self.lock(id).await;
        self.store.delete(id).await
    }

    pub async fn add_season(
        &self,
        id: &AnimeId,
        input: NewSeason,
    ) -> Result<AnimeDocument, CatalogError> {
        let (document, ()) = self
            .update(id, |doc| {
                let mut season = Season::new(input.season_number);
                season.title.clone_from(&input.title);
                season.description.clone_from(&input.description);
                doc.add_season(season)
                    .map_err(|s| CatalogError::DuplicateSeason(s.season_number))
            })
            .await?;
        Ok(document)
    }

    pub async fn remove_season(
        &self,
        id: &AnimeId,
        season_number: i32,
    ) -> Result<AnimeDocument, CatalogError> {
        let (document, ()) = self
            .update(id, |doc| {
                if doc.remove_season(season_number) {
                    Ok(())
                } else {
                    Err(CatalogError::SeasonNotFound {
                        anime_id: doc.id.clone(),
                        season: season_number,
                    })
                }
            })
            .await?;
        Ok(document)
    }

    /// Adds one episode by hand. Each video source is tagged with the kind
    /// its URL implies and gets a fresh `sourceId`.
    pub async fn add_episode(
        &self,
        id: &AnimeId,
        season_number: i32,
        input: NewEpisode,
    ) -> Result<AnimeDocument, CatalogError> {
        if input.episode_number == 0 {
            return Err(CatalogError::InvalidData(
                "episodeNumber must be greater than 0".into(),
            ));
        }
        if input.video_sources.iter().any(|s| s.url.trim().is_empty()) {
            return Err(CatalogError::InvalidData(
                "every video source needs a url".into(),
            ));
        }

        let (document, ()) = self
            .update(id, |doc| {
                let mut taken = doc.source_ids();
                let video_sources = input
                    .video_sources
                    .iter()
                    .map(|s| {
                        let kind = SourceKind::from_url(&s.url);
                        let source_id = generate_source_id(kind.as_str(), &taken);
                        taken.insert(source_id.clone());
                        VideoSource {
                            url: s.url.clone(),
                            quality: s.quality,
                            language: s.language,
                            kind: s.kind,
                            fansub: s.fansub.clone(),
                            source: kind,
                            source_id,
                        }
                    })
                    .collect();

                let episode = Episode {
                    episode_number: input.episode_number,
                    title: input
                        .title
                        .clone()
                        .unwrap_or_else(|| format!("Bölüm {}", input.episode_number)),
                    description: input.description.clone(),
                    thumbnail: input.thumbnail.clone(),
                    duration: input.duration,
                    video_sources,
                    release_date: input.release_date.unwrap_or_else(Utc::now),
                };

                let anime_id = doc.id.clone();
                let season =
                    doc.season_mut(season_number)
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
                doc.ensure_source();
                Ok(())
            })
            .await?;
        Ok(document)
    }

    pub async fn remove_episode(
        &self,
        id: &AnimeId,
        season_number: i32,
        episode_number: u32,
    ) -> Result<AnimeDocument, CatalogError> {
        let (document, ()) = self
            .update(id, |doc| {
                let anime_id = doc.id.clone();
                let season =
                    doc.season_mut(season_number)
                        .ok_or(CatalogError::SeasonNotFound {
                            anime_id,
                            season: season_number,
                        })?;
                if season.remove_episode(episode_number) {
                    Ok(())
                } else {
                    Err(CatalogError::EpisodeNotFound {
                        season: season_number,
                        episode: episode_number,
                    })
                }
            })
            .await?;
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::anime::CatalogProvider;

    async fn service() -> CatalogService {
        let store = Store::with_pool_options("sqlite::memory:", 1, 1)
            .await
            .unwrap();
        CatalogService::new(Arc::new(SeaOrmCatalogStore::new(store)))
    }

    fn new_anime() -> NewAnime {
        NewAnime {
            title: AnimeTitle::romaji("Demo Show"),
            description: String::new(),
            cover_image: "https://img.example.com/demo.jpg".to_string(),
            source: None,
            seasons: vec![1],
        }
    }

    fn new_episode(number: u32, url: &str) -> NewEpisode {
        NewEpisode {
            episode_number: number,
            title: None,
            description: String::new(),
            thumbnail: String::new(),
            duration: 0,
            release_date: None,
            video_sources: vec![NewVideoSource {
                url: url.to_string(),
                quality: Quality::P1080,
                language: Language::Turkish,
                kind: SubtitleKind::Subbed,
                fansub: None,
            }],
        }
    }

    #[tokio::test]
    async fn test_manual_episode_tags_sources() {
        let catalog = service().await;
        let anime = catalog.create_anime(new_anime()).await.unwrap();
        assert!(anime.source.is_none());

        let doc = catalog
            .add_episode(&anime.id, 1, new_episode(2, "https://youtu.be/abc"))
            .await
            .unwrap();
        let doc = catalog
            .add_episode(&doc.id, 1, new_episode(1, "https://files.example.com/1.mp4"))
            .await
            .unwrap();

        let season = doc.season(1).unwrap();
        let numbers: Vec<u32> = season.episodes.iter().map(|e| e.episode_number).collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(season.episodes[0].title, "Bölüm 1");
        assert_eq!(season.episodes[0].video_sources[0].source, SourceKind::Direct);
        assert_eq!(season.episodes[1].video_sources[0].source, SourceKind::Youtube);
        assert!(
            season.episodes[1].video_sources[0]
                .source_id
                .starts_with("youtube-")
        );

        let source = doc.source.unwrap();
        assert_eq!(source.name, CatalogProvider::Custom);
        assert!(source.id.starts_with("custom-"));
    }

    #[tokio::test]
    async fn test_duplicates_are_rejected() {
        let catalog = service().await;
        let anime = catalog.create_anime(new_anime()).await.unwrap();

        let err = catalog
            .add_season(
                &anime.id,
                NewSeason {
                    season_number: 1,
                    title: String::new(),
                    description: String::new(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateSeason(1)));

        catalog
            .add_episode(&anime.id, 1, new_episode(1, "https://a.example.com/1.mp4"))
            .await
            .unwrap();
        let err = catalog
            .add_episode(&anime.id, 1, new_episode(1, "https://a.example.com/1b.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CatalogError::DuplicateEpisode {
                season: 1,
                episode: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_targets() {
        let catalog = service().await;
        let anime = catalog.create_anime(new_anime()).await.unwrap();

        let err = catalog
            .add_episode(&anime.id, 9, new_episode(1, "https://a.example.com/1.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::SeasonNotFound { season: 9, .. }));

        let err = catalog.get(&AnimeId::new("missing")).await.unwrap_err();
        assert!(matches!(err, CatalogError::NotFound(_)));

        let err = catalog.remove_episode(&anime.id, 1, 4).await.unwrap_err();
        assert!(matches!(err, CatalogError::EpisodeNotFound { .. }));
    }

    #[tokio::test]
    async fn test_concurrent_updates_are_not_lost() {
        let catalog = Arc::new(service().await);
        let anime = catalog.create_anime(new_anime()).await.unwrap();

        let mut handles = Vec::new();
        for n in 1..=8u32 {
            let catalog = catalog.clone();
            let id = anime.id.clone();
            handles.push(tokio::spawn(async move {
                catalog
                    .add_episode(&id, 1, new_episode(n, "https://a.example.com/x.mp4"))
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let doc = catalog.get(&anime.id).await.unwrap();
        assert_eq!(doc.season(1).unwrap().episodes.len(), 8);
        assert_eq!(doc.source_ids().len(), 8);
    }
}
