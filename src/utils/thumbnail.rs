use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, StatusCode};
use serde::Deserialize;
use tokio::fs::File;
use tokio_util::io::ReaderStream;

use crate::core::{Result, UploadError};

pub const DEFAULT_THUMBNAIL_ENDPOINT: &str = "https://thumbs.odycdn.com/upload";
pub const DEFAULT_THUMBNAIL_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Deserialize)]
struct CdnResponse {
    #[serde(default)]
    url: String,
    #[serde(default, rename = "type")]
    kind: String,
    #[serde(default)]
    message: String,
}

/// Mirrors a local thumbnail to the thumbnail CDN.
#[derive(Debug, Clone)]
pub struct ThumbnailRelay {
    client: Client,
    endpoint: String,
}

impl ThumbnailRelay {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }

    pub async fn upload(&self, path: &Path) -> Result<String> {
        let file = File::open(path).await?;
        let length = file.metadata().await?.len();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("thumbnail")
            .to_string();

        let body = Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, length).file_name(file_name);
        let form = Form::new().part("file-input", part);

        let response = self.client.post(&self.endpoint).multipart(form).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(UploadError::server_error(status.as_u16(), "Thumbnail upload failed"));
        }

        let parsed: CdnResponse = serde_json::from_slice(&response.bytes().await?)?;
        if parsed.kind != "success" {
            return Err(UploadError::protocol(format!(
                "thumbnail CDN hasn't returned 'success': {}",
                parsed.message
            )));
        }

        Ok(parsed.url)
    }

    /// Hosted thumbnail URL, or `fallback` when the relay fails.
    pub async fn upload_or(&self, path: &Path, fallback: &str) -> String {
        match self.upload(path).await {
            Ok(url) => {
                tracing::debug!(thumbnail = %url, "thumbnail uploaded");
                url
            }
            Err(err) => {
                tracing::warn!(error = %err, "unable to upload thumbnail, falling back");
                fallback.to_string()
            }
        }
    }
}
