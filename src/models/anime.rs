use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::domain::AnimeId;

/// The whole catalog entry for one anime: seasons, episodes and their video
/// sources are owned by the document and always persisted together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimeDocument {
    pub id: AnimeId,
    pub title: AnimeTitle,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub cover_image: String,
    #[serde(default)]
    pub source: Option<AnimeSource>,
    #[serde(default)]
    pub seasons: Vec<Season>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimeTitle {
    pub romaji: String,
    #[serde(default)]
    pub english: Option<String>,
    #[serde(default)]
    pub native: Option<String>,
}

impl AnimeTitle {
    #[must_use]
    pub fn romaji(romaji: impl Into<String>) -> Self {
        Self {
            romaji: romaji.into(),
            english: None,
            native: None,
        }
    }
}

/// Provenance of a catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimeSource {
    pub name: CatalogProvider,
    pub id: String,
}

impl AnimeSource {
    #[must_use]
    pub fn custom() -> Self {
        Self {
            name: CatalogProvider::Custom,
            id: format!("custom-{}", Utc::now().timestamp_millis()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatalogProvider {
    AniList,
    MyAnimeList,
    #[serde(rename = "TMDB")]
    Tmdb,
    Manual,
    Custom,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Season {
    pub season_number: i32,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub episodes: Vec<Episode>,
}

impl Season {
    #[must_use]
    pub fn new(season_number: i32) -> Self {
        Self {
            season_number,
            title: String::new(),
            description: String::new(),
            episodes: Vec::new(),
        }
    }

    #[must_use]
    pub fn has_episode(&self, episode_number: u32) -> bool {
        self.episodes
            .iter()
            .any(|e| e.episode_number == episode_number)
    }

    /// Inserts an episode and keeps the list ordered by episode number.
    ///
    /// Returns the episode back when the number is already taken.
    pub fn insert_episode(&mut self, episode: Episode) -> Result<(), Box<Episode>> {
        if self.has_episode(episode.episode_number) {
            return Err(Box::new(episode));
        }
        self.episodes.push(episode);
        self.episodes.sort_by_key(|e| e.episode_number);
        Ok(())
    }

    pub fn remove_episode(&mut self, episode_number: u32) -> bool {
        let before = self.episodes.len();
        self.episodes.retain(|e| e.episode_number != episode_number);
        self.episodes.len() != before
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Episode {
    pub episode_number: u32,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub thumbnail: String,
    /// Runtime in seconds, 0 when unknown.
    #[serde(default)]
    pub duration: u32,
    #[serde(default)]
    pub video_sources: Vec<VideoSource>,
    #[serde(default = "Utc::now")]
    pub release_date: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoSource {
    pub url: String,
    #[serde(default)]
    pub quality: Quality,
    #[serde(default)]
    pub language: Language,
    #[serde(rename = "type", default)]
    pub kind: SubtitleKind,
    /// Reference to a fansub group; never embedded.
    #[serde(default)]
    pub fansub: Option<String>,
    #[serde(default)]
    pub source: SourceKind,
    #[serde(default)]
    pub source_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Quality {
    #[serde(rename = "360p")]
    P360,
    #[serde(rename = "480p")]
    P480,
    #[default]
    #[serde(rename = "720p")]
    P720,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "4K")]
    K4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    #[serde(rename = "TR")]
    Turkish,
    #[serde(rename = "JP")]
    Japanese,
    #[serde(rename = "EN")]
    English,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SubtitleKind {
    #[default]
    #[serde(rename = "Altyazılı", alias = "subbed")]
    Subbed,
    #[serde(rename = "Dublaj", alias = "dubbed")]
    Dubbed,
}

/// Which pathway produced a video source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Bunny,
    Drive,
    Youtube,
    #[default]
    Direct,
}

impl SourceKind {
    /// Classifies a manually supplied video URL.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        if url.contains("youtube.com") || url.contains("youtu.be") {
            Self::Youtube
        } else if url.contains("drive.google.com") {
            Self::Drive
        } else {
            Self::Direct
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bunny => "bunny",
            Self::Drive => "drive",
            Self::Youtube => "youtube",
            Self::Direct => "direct",
        }
    }
}

impl AnimeDocument {
    #[must_use]
    pub fn new(id: AnimeId, title: AnimeTitle) -> Self {
        Self {
            id,
            title,
            description: String::new(),
            cover_image: String::new(),
            source: None,
            seasons: Vec::new(),
        }
    }

    #[must_use]
    pub fn display_title(&self) -> &str {
        &self.title.romaji
    }

    #[must_use]
    pub fn season(&self, season_number: i32) -> Option<&Season> {
        self.seasons
            .iter()
            .find(|s| s.season_number == season_number)
    }

    pub fn season_mut(&mut self, season_number: i32) -> Option<&mut Season> {
        self.seasons
            .iter_mut()
            .find(|s| s.season_number == season_number)
    }

    /// Adds a season, keeping seasons ordered. Fails when the number exists.
    pub fn add_season(&mut self, season: Season) -> Result<(), Box<Season>> {
        if self.season(season.season_number).is_some() {
            return Err(Box::new(season));
        }
        self.seasons.push(season);
        self.seasons.sort_by_key(|s| s.season_number);
        Ok(())
    }

    pub fn remove_season(&mut self, season_number: i32) -> bool {
        let before = self.seasons.len();
        self.seasons.retain(|s| s.season_number != season_number);
        self.seasons.len() != before
    }

    /// Every `sourceId` currently present anywhere in the episode tree.
    #[must_use]
    pub fn source_ids(&self) -> HashSet<String> {
        self.seasons
            .iter()
            .flat_map(|s| &s.episodes)
            .flat_map(|e| &e.video_sources)
            .filter(|v| !v.source_id.is_empty())
            .map(|v| v.source_id.clone())
            .collect()
    }

    /// Once episodes exist the provenance tag must be set.
    pub fn ensure_source(&mut self) {
        let missing = self.source.as_ref().is_none_or(|s| s.id.is_empty());
        if missing {
            self.source = Some(AnimeSource::custom());
        }
    }

    #[must_use]
    pub fn episode_count(&self) -> usize {
        self.seasons.iter().map(|s| s.episodes.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(number: u32) -> Episode {
        Episode {
            episode_number: number,
            title: format!("Bölüm {number}"),
            description: String::new(),
            thumbnail: String::new(),
            duration: 0,
            video_sources: vec![],
            release_date: Utc::now(),
        }
    }

    #[test]
    fn insert_keeps_episodes_sorted() {
        let mut season = Season::new(1);
        for n in [3, 1, 2] {
            season.insert_episode(episode(n)).unwrap();
            let numbers: Vec<u32> = season.episodes.iter().map(|e| e.episode_number).collect();
            let mut sorted = numbers.clone();
            sorted.sort_unstable();
            assert_eq!(numbers, sorted);
        }
        assert_eq!(season.episodes.len(), 3);
    }

    #[test]
    fn insert_rejects_duplicate_numbers() {
        let mut season = Season::new(1);
        season.insert_episode(episode(5)).unwrap();
        let rejected = season.insert_episode(episode(5)).unwrap_err();
        assert_eq!(rejected.episode_number, 5);
        assert_eq!(season.episodes.len(), 1);
    }

    #[test]
    fn duplicate_seasons_are_rejected() {
        let mut anime = AnimeDocument::new(AnimeId::new("a"), AnimeTitle::romaji("Demo"));
        anime.add_season(Season::new(2)).unwrap();
        anime.add_season(Season::new(1)).unwrap();
        assert!(anime.add_season(Season::new(1)).is_err());
        assert_eq!(anime.seasons[0].season_number, 1);
    }

    #[test]
    fn ensure_source_defaults_to_custom() {
        let mut anime = AnimeDocument::new(AnimeId::new("a"), AnimeTitle::romaji("Demo"));
        anime.ensure_source();
        let source = anime.source.clone().unwrap();
        assert_eq!(source.name, CatalogProvider::Custom);
        assert!(source.id.starts_with("custom-"));

        anime.source = Some(AnimeSource {
            name: CatalogProvider::AniList,
            id: "154587".to_string(),
        });
        anime.ensure_source();
        assert_eq!(anime.source.unwrap().name, CatalogProvider::AniList);
    }

    #[test]
    fn video_source_wire_format() {
        let json = serde_json::json!({
            "url": "https://cdn/x.mp4",
            "quality": "1080p",
            "language": "JP",
            "type": "Dublaj",
            "fansub": "f1",
            "source": "bunny",
            "sourceId": "bunny-1-abc"
        });
        let source: VideoSource = serde_json::from_value(json).unwrap();
        assert_eq!(source.quality, Quality::P1080);
        assert_eq!(source.language, Language::Japanese);
        assert_eq!(source.kind, SubtitleKind::Dubbed);
        assert_eq!(source.source, SourceKind::Bunny);
    }

    #[test]
    fn source_kind_from_url() {
        assert_eq!(
            SourceKind::from_url("https://www.youtube.com/watch?v=x"),
            SourceKind::Youtube
        );
        assert_eq!(SourceKind::from_url("https://youtu.be/x"), SourceKind::Youtube);
        assert_eq!(
            SourceKind::from_url("https://drive.google.com/file/d/abc/view"),
            SourceKind::Drive
        );
        assert_eq!(SourceKind::from_url("https://cdn.example/x.mp4"), SourceKind::Direct);
    }
}
