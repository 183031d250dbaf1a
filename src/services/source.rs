//! Remote folders that episodes are pulled from.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

use crate::clients::drive::{DriveClient, DriveError, extract_folder_id};
use crate::constants::VIDEO_EXTENSIONS;
use crate::models::transfer::RemoteFile;

/// Chunked file content, as produced by a source and consumed by storage.
pub type ByteStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("folder not found or inaccessible")]
    NotFound(String),

    #[error("not a folder: {0}")]
    NotAFolder(String),

    #[error("source error: {0}")]
    Other(String),
}

impl From<DriveError> for SourceError {
    fn from(err: DriveError) -> Self {
        match err {
            DriveError::NotFound(id) => Self::NotFound(id),
            DriveError::NotAFolder(id) => Self::NotAFolder(id),
            other => Self::Other(other.to_string()),
        }
    }
}

/// A remote location that can enumerate video files and stream their bytes.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Turns a user-supplied folder reference (id or URL) into a folder id.
    fn normalize_folder_ref(&self, reference: &str) -> String {
        reference.trim().to_string()
    }

    /// Video-like files directly inside `folder_id`, sorted by name.
    ///
    /// # Errors
    ///
    /// - [`SourceError::NotFound`] when the folder is missing or not shared
    /// - [`SourceError::NotAFolder`] when the id names a plain file
    async fn list_video_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>, SourceError>;

    async fn open_stream(&self, file_id: &str) -> Result<ByteStream, SourceError>;
}

/// Video if the MIME type says so, the extension is a known container, or
/// the extension maps to a `video/*` type.
#[must_use]
pub fn is_video_file(name: &str, mime_type: &str) -> bool {
    if mime_type.contains("video") {
        return true;
    }

    let extension = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    if let Some(ext) = extension.as_deref()
        && VIDEO_EXTENSIONS.contains(&ext)
    {
        return true;
    }

    mime_guess::from_path(name)
        .first()
        .is_some_and(|m| m.type_() == mime_guess::mime::VIDEO)
}

/// Drops non-video entries and orders the rest by name.
#[must_use]
pub fn select_video_files(mut files: Vec<RemoteFile>) -> Vec<RemoteFile> {
    files.retain(|f| is_video_file(&f.name, &f.mime_type));
    files.sort_by(|a, b| a.name.cmp(&b.name));
    files
}

pub struct DriveSource {
    client: DriveClient,
}

impl DriveSource {
    #[must_use]
    pub const fn new(client: DriveClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteSource for DriveSource {
    fn normalize_folder_ref(&self, reference: &str) -> String {
        extract_folder_id(reference)
    }

    async fn list_video_files(&self, folder_id: &str) -> Result<Vec<RemoteFile>, SourceError> {
        self.client.ensure_folder(folder_id).await?;

        let children = self.client.list_children(folder_id).await?;
        let listed = children.len();
        let files = select_video_files(
            children
                .into_iter()
                .filter(|f| !f.is_folder())
                .map(crate::clients::drive::DriveFile::into_remote)
                .collect(),
        );

        debug!(folder_id, listed, videos = files.len(), "Listed drive folder");
        Ok(files)
    }

    async fn open_stream(&self, file_id: &str) -> Result<ByteStream, SourceError> {
        Ok(self.client.download(file_id).await?)
    }
}
