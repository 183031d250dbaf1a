use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::anime::{Language, Quality, SubtitleKind};

/// Caller-supplied values copied onto every video source a batch creates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoSourceDefaults {
    #[serde(default)]
    pub quality: Quality,
    #[serde(default)]
    pub language: Language,
    #[serde(rename = "type", default)]
    pub kind: SubtitleKind,
    #[serde(default)]
    pub fansub: Option<String>,
}

/// A video file discovered in a remote folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub size: Option<u64>,
    pub mime_type: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileOutcome {
    Successful,
    /// Download, upload or file access failed.
    Failed,
    /// The upload finished but the catalog could not be updated.
    PersistFailed,
    SkippedNoEpisodeNumber,
    SkippedDuplicate,
}

impl FileOutcome {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Successful => "successful",
            Self::Failed => "failed",
            Self::PersistFailed => "persist_failed",
            Self::SkippedNoEpisodeNumber => "skipped_no_episode_number",
            Self::SkippedDuplicate => "skipped_duplicate",
        }
    }

    #[must_use]
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::SkippedNoEpisodeNumber | Self::SkippedDuplicate)
    }
}

/// Running counters of a batch. `processed` is always the sum of the three
/// outcome counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferStats {
    pub total: usize,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl TransferStats {
    #[must_use]
    pub const fn new(total: usize) -> Self {
        Self {
            total,
            processed: 0,
            successful: 0,
            failed: 0,
            skipped: 0,
        }
    }

    pub fn record(&mut self, outcome: FileOutcome) {
        match outcome {
            FileOutcome::Successful => self.successful += 1,
            FileOutcome::Failed | FileOutcome::PersistFailed => self.failed += 1,
            FileOutcome::SkippedNoEpisodeNumber | FileOutcome::SkippedDuplicate => {
                self.skipped += 1;
            }
        }
        self.processed += 1;
    }

    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.processed as f64 / self.total as f64) * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Running,
    Completed,
    Cancelled,
    /// The worker stopped before every file was visited.
    Aborted,
}

impl BatchState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Aborted => "aborted",
        }
    }

    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "running" => Self::Running,
            "completed" => Self::Completed,
            "cancelled" => Self::Cancelled,
            _ => Self::Aborted,
        }
    }

    #[must_use]
    pub const fn is_finished(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReport {
    pub file_name: String,
    pub episode_number: Option<u32>,
    pub outcome: FileOutcome,
    pub detail: Option<String>,
    pub bytes: u64,
    pub duration_ms: u64,
}

/// Point-in-time view of a batch, as returned by the status endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchStatus {
    pub id: String,
    pub anime_id: String,
    pub anime_title: String,
    pub season_number: i32,
    pub folder_id: String,
    pub state: BatchState,
    pub stats: TransferStats,
    pub percent: f64,
    pub current_file: Option<String>,
    pub current_bytes: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub elapsed_seconds: u64,
    pub cancel_requested: bool,
    pub error: Option<String>,
    pub files: Vec<FileReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processed_is_sum_of_outcomes() {
        let mut stats = TransferStats::new(5);
        for outcome in [
            FileOutcome::Successful,
            FileOutcome::Failed,
            FileOutcome::PersistFailed,
            FileOutcome::SkippedDuplicate,
            FileOutcome::SkippedNoEpisodeNumber,
        ] {
            stats.record(outcome);
            assert_eq!(
                stats.processed,
                stats.successful + stats.failed + stats.skipped
            );
        }
        assert_eq!(stats.successful, 1);
        assert_eq!(stats.failed, 2);
        assert_eq!(stats.skipped, 2);
        assert!((stats.percent() - 100.0).abs() < f64::EPSILON);
    }

    #[test]
    fn defaults_deserialize_from_partial_body() {
        let defaults: VideoSourceDefaults =
            serde_json::from_value(serde_json::json!({ "quality": "1080p" })).unwrap();
        assert_eq!(defaults.quality, Quality::P1080);
        assert_eq!(defaults.language, Language::Turkish);
        assert_eq!(defaults.fansub, None);
    }

    #[test]
    fn batch_state_parse() {
        assert_eq!(BatchState::parse("completed"), BatchState::Completed);
        assert_eq!(BatchState::parse("bogus"), BatchState::Aborted);
        assert!(!BatchState::Running.is_finished());
    }
}
