use serde::{Deserialize, Serialize};

use crate::models::anime::AnimeDocument;
use crate::models::transfer::{RemoteFile, VideoSourceDefaults};
use crate::parser::episode::extract_episode_number;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Catalog listing row; the full tree is only returned by `GET /anime/{id}`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnimeSummaryDto {
    pub id: String,
    pub title: String,
    pub cover_image: String,
    pub seasons: Vec<i32>,
    pub episode_count: usize,
}

impl From<&AnimeDocument> for AnimeSummaryDto {
    fn from(doc: &AnimeDocument) -> Self {
        Self {
            id: doc.id.to_string(),
            title: doc.display_title().to_string(),
            cover_image: doc.cover_image.clone(),
            seasons: doc.seasons.iter().map(|s| s.season_number).collect(),
            episode_count: doc.episode_count(),
        }
    }
}

/// Body of `POST /anime/{id}/bulk-upload`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkTransferRequest {
    /// Form clients send this as a string.
    #[serde(deserialize_with = "number_or_numeric_string")]
    pub season_number: i32,
    pub folder_id: String,
    #[serde(flatten)]
    pub defaults: VideoSourceDefaults,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(i32),
    Text(String),
}

fn number_or_numeric_string<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::Text(text) => text
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid season number: {text:?}"))),
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderFileDto {
    pub id: String,
    pub name: String,
    pub size: Option<u64>,
    pub mime_type: String,
    pub episode_number: Option<u32>,
}

impl From<RemoteFile> for FolderFileDto {
    fn from(file: RemoteFile) -> Self {
        Self {
            episode_number: extract_episode_number(&file.name),
            id: file.id,
            name: file.name,
            size: file.size,
            mime_type: file.mime_type,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderListingDto {
    pub folder_id: String,
    pub files: Vec<FolderFileDto>,
}

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime: u64,
    pub anime_count: usize,
    pub running_batches: usize,
    pub storage_configured: bool,
    pub drive_configured: bool,
}
