use async_trait::async_trait;
use thiserror::Error;

use crate::clients::bunny::{BunnyClient, BunnyError};
use crate::services::source::ByteStream;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object storage is not configured")]
    NotConfigured,

    #[error("upload rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("upload failed: {0}")]
    Transport(String),
}

impl From<BunnyError> for StorageError {
    fn from(err: BunnyError) -> Self {
        match err {
            BunnyError::NotConfigured => Self::NotConfigured,
            BunnyError::Status { status, body } => Self::Rejected {
                status,
                message: body,
            },
            BunnyError::Http(e) => Self::Transport(e.to_string()),
        }
    }
}

/// CDN-backed object store. Uploads are streamed and never resumed.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Whether uploads can be attempted at all.
    fn is_configured(&self) -> bool {
        true
    }

    /// Stores `body` at `path` and returns the public URL of the object.
    async fn upload_stream(
        &self,
        path: &str,
        body: ByteStream,
        content_length: Option<u64>,
    ) -> Result<String, StorageError>;
}

pub struct BunnyStorage {
    client: BunnyClient,
}

impl BunnyStorage {
    #[must_use]
    pub const fn new(client: BunnyClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStorage for BunnyStorage {
    fn is_configured(&self) -> bool {
        self.client.is_configured()
    }

    async fn upload_stream(
        &self,
        path: &str,
        body: ByteStream,
        content_length: Option<u64>,
    ) -> Result<String, StorageError> {
        Ok(self.client.upload(path, body, content_length).await?)
    }
}
