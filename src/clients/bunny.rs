use bytes::Bytes;
use futures::stream::BoxStream;
use reqwest::{Body, Client, StatusCode};
use thiserror::Error;
use tracing::debug;

use crate::config::StorageConfig;
use crate::constants::transfer::UPLOAD_CONTENT_TYPE;

#[derive(Debug, Error)]
pub enum BunnyError {
    #[error("storage zone is not configured")]
    NotConfigured,

    #[error("storage request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("storage returned {status}: {body}")]
    Status { status: u16, body: String },
}

/// Client for a Bunny-style storage zone: authenticated `PUT`s into the
/// zone, public reads through the pull zone.
#[derive(Debug, Clone)]
pub struct BunnyClient {
    client: Client,
    config: StorageConfig,
}

impl BunnyClient {
    #[must_use]
    pub const fn new(client: Client, config: StorageConfig) -> Self {
        Self { client, config }
    }

    fn object_url(&self, path: &str) -> String {
        let encoded: Vec<String> = path
            .trim_start_matches('/')
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect();
        format!(
            "{}/{}/{}",
            self.config.storage_base_url.trim_end_matches('/'),
            self.config.zone_name,
            encoded.join("/")
        )
    }

    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.config.is_configured()
    }

    #[must_use]
    pub fn public_url(&self, path: &str) -> String {
        self.config.cdn_url_for(path)
    }

    /// Streams `body` into the zone at `path` and returns the public URL.
    ///
    /// An existing object at the same path is overwritten.
    pub async fn upload(
        &self,
        path: &str,
        body: BoxStream<'static, Result<Bytes, std::io::Error>>,
        content_length: Option<u64>,
    ) -> Result<String, BunnyError> {
        if !self.is_configured() {
            return Err(BunnyError::NotConfigured);
        }

        let mut request = self
            .client
            .put(self.object_url(path))
            .header("AccessKey", &self.config.access_key)
            .header(reqwest::header::CONTENT_TYPE, UPLOAD_CONTENT_TYPE);
        if let Some(length) = content_length {
            request = request.header(reqwest::header::CONTENT_LENGTH, length);
        }

        let response = request.body(Body::wrap_stream(body)).send().await?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            return Err(BunnyError::Status {
                status: status.as_u16(),
                body,
            });
        }

        debug!(path, "Object stored");
        Ok(self.public_url(path))
    }
}
