use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use regex::Regex;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::config::DriveConfig;
use crate::constants::FOLDER_MIME_TYPE;
use crate::models::transfer::RemoteFile;

const LIST_FIELDS: &str = "nextPageToken,files(id,name,size,mimeType)";
const METADATA_FIELDS: &str = "id,name,mimeType,size";

#[derive(Debug, Error)]
pub enum DriveError {
    #[error("folder not found or inaccessible: {0}")]
    NotFound(String),

    #[error("not a folder: {0}")]
    NotAFolder(String),

    #[error("drive credentials are not configured")]
    MissingCredentials,

    #[error("drive request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("drive returned {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    /// The API encodes sizes as decimal strings.
    #[serde(default)]
    pub size: Option<String>,
}

impl DriveFile {
    #[must_use]
    pub fn is_folder(&self) -> bool {
        self.mime_type == FOLDER_MIME_TYPE
    }

    #[must_use]
    pub fn into_remote(self) -> RemoteFile {
        RemoteFile {
            size: self.size.as_deref().and_then(|s| s.parse().ok()),
            id: self.id,
            name: self.name,
            mime_type: self.mime_type,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

fn drive_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[-\w]{25,}").expect("Invalid regex pattern defined in code"))
}

/// Accepts either a bare folder id or a full share URL and returns the id.
///
/// The first run of 25+ id characters wins; anything else is passed through
/// trimmed.
#[must_use]
pub fn extract_folder_id(reference: &str) -> String {
    let reference = reference.trim();
    drive_id_pattern()
        .find(reference)
        .map_or_else(|| reference.to_string(), |m| m.as_str().to_string())
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: ErrorDetail,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    errors: Vec<ErrorReason>,
}

#[derive(Debug, Deserialize)]
struct ErrorReason {
    #[serde(default)]
    reason: String,
}

/// 404 and permission 403s mean the item is missing for this caller. A 403
/// whose reason is a rate or quota limit stays a plain status error.
fn classify_failure(status: StatusCode, body: String, id: &str) -> DriveError {
    let throttled = || {
        serde_json::from_str::<ErrorBody>(&body)
            .unwrap_or_default()
            .error
            .errors
            .iter()
            .any(|e| {
                let reason = e.reason.to_ascii_lowercase();
                reason.contains("limit") || reason.contains("quota")
            })
    };

    if status == StatusCode::NOT_FOUND || (status == StatusCode::FORBIDDEN && !throttled()) {
        return DriveError::NotFound(id.to_string());
    }
    DriveError::Status {
        status: status.as_u16(),
        body,
    }
}

/// Client for the cloud-drive v3 REST API.
#[derive(Debug, Clone)]
pub struct DriveClient {
    client: Client,
    config: DriveConfig,
}

impl DriveClient {
    #[must_use]
    pub const fn new(client: Client, config: DriveConfig) -> Self {
        Self { client, config }
    }

    fn authorize(&self, request: RequestBuilder) -> Result<RequestBuilder, DriveError> {
        if let Some(token) = self.config.access_token.as_deref().filter(|t| !t.is_empty()) {
            return Ok(request.bearer_auth(token));
        }
        if let Some(key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            return Ok(request.query(&[("key", key)]));
        }
        Err(DriveError::MissingCredentials)
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.request_timeout_seconds.max(1))
    }

    fn file_url(&self, file_id: &str) -> String {
        format!(
            "{}/files/{}",
            self.config.api_base_url.trim_end_matches('/'),
            urlencoding::encode(file_id)
        )
    }

    async fn check_status(
        response: reqwest::Response,
        id: &str,
    ) -> Result<reqwest::Response, DriveError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, body, id))
    }

    pub async fn get_metadata(&self, file_id: &str) -> Result<DriveFile, DriveError> {
        let request = self
            .client
            .get(self.file_url(file_id))
            .query(&[("fields", METADATA_FIELDS), ("supportsAllDrives", "true")])
            .timeout(self.request_timeout());

        let response = self.authorize(request)?.send().await?;
        let response = Self::check_status(response, file_id).await?;
        Ok(response.json().await?)
    }

    /// Fails with [`DriveError::NotAFolder`] when the id names a plain file.
    pub async fn ensure_folder(&self, folder_id: &str) -> Result<DriveFile, DriveError> {
        let meta = self.get_metadata(folder_id).await?;
        if meta.is_folder() {
            Ok(meta)
        } else {
            Err(DriveError::NotAFolder(folder_id.to_string()))
        }
    }

    /// Lists the non-trashed children of a folder ordered by name, following
    /// pagination to the end.
    pub async fn list_children(&self, folder_id: &str) -> Result<Vec<DriveFile>, DriveError> {
        let url = format!(
            "{}/files",
            self.config.api_base_url.trim_end_matches('/')
        );
        let query = format!(
            "'{}' in parents and trashed=false",
            folder_id.replace('\'', "\\'")
        );
        let page_size = self.config.page_size.clamp(1, 1000).to_string();

        let mut files = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .get(&url)
                .query(&[
                    ("q", query.as_str()),
                    ("fields", LIST_FIELDS),
                    ("orderBy", "name"),
                    ("pageSize", page_size.as_str()),
                    ("supportsAllDrives", "true"),
                    ("includeItemsFromAllDrives", "true"),
                ])
                .timeout(self.request_timeout());
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }

            let response = self.authorize(request)?.send().await?;
            let response = Self::check_status(response, folder_id).await?;
            let page: FileList = response.json().await?;

            debug!(
                folder_id,
                page_items = page.files.len(),
                "Fetched drive listing page"
            );
            files.extend(page.files);

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        Ok(files)
    }

    /// Opens the binary content of a file as a chunk stream. Nothing is
    /// buffered beyond what the transport holds.
    pub async fn download(
        &self,
        file_id: &str,
    ) -> Result<BoxStream<'static, Result<Bytes, std::io::Error>>, DriveError> {
        let request = self
            .client
            .get(self.file_url(file_id))
            .query(&[("alt", "media"), ("supportsAllDrives", "true")]);

        let response = self.authorize(request)?.send().await?;
        let response = Self::check_status(response, file_id).await?;

        Ok(response
            .bytes_stream()
            .map_err(std::io::Error::other)
            .boxed())
    }
}
