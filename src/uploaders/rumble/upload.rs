//! Requests against the assigned upload server.

use std::collections::BTreeMap;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::LazyLock;

use bytes::Bytes;
use regex::Regex;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;
use url::Url;

use crate::core::{Result, UploadError};
use crate::utils::ChunkPlan;

pub const API_VERSION: &str = "1.3";
pub const MAX_TITLE_LEN: usize = 99;
pub const TAGS: &str = "destiny,vod,yee wins,reupload,mirror";
pub const CATEGORY: &str = "15";
pub const VISIBILITY: &str = "private";
pub const CONTENT_TYPE: &str = "video/mp4";

static LOGIN_STATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{username:.*,logged_in:(true|false)\}").expect("valid regex"));
static UPLOAD_SERVER_INPUT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<input\b[^>]*\bid\s*=\s*["']upload_server["'][^>]*>"#).expect("valid regex")
});
static VALUE_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?i)\bvalue\s*=\s*["']([^"']*)["']"#).expect("valid regex"));
static WATCH_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https://rumble\.com/v.*?\.html").expect("valid regex"));
static EMBED_URL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"https://rumble\.com/embed/v.*?/").expect("valid regex"));

#[derive(Debug, Deserialize)]
struct LoginCheck {
    #[serde(default)]
    logged_in: bool,
}

/// Reads the inline `{username:..,logged_in:..}` object off a page.
///
/// A page without it is treated as logged out.
pub fn parse_login_state(html: &str) -> bool {
    let Some(captures) = LOGIN_STATE_RE.captures(html) else {
        return false;
    };

    let object = captures[0]
        .replace("username", "\"username\"")
        .replace("logged_in", "\"logged_in\"");

    match serde_json::from_str::<LoginCheck>(&object) {
        Ok(check) => check.logged_in,
        Err(_) => &captures[1] == "true",
    }
}

/// Value of the hidden `upload_server` input on the upload page.
pub fn parse_upload_server(html: &str) -> Option<String> {
    let input = UPLOAD_SERVER_INPUT_RE.find(html)?;
    let captures = VALUE_ATTR_RE.captures(input.as_str())?;
    Some(captures[1].to_string())
}

pub fn build_upload_url(template: &str, server: &str) -> Result<Url> {
    let mut url = Url::parse(&template.replace("{server}", server))?;
    url.query_pairs_mut().append_pair("api", API_VERSION);
    Ok(url)
}

/// Watch and embed URLs from the commit response, space-joined.
pub fn extract_urls(body: &str) -> String {
    let watch = WATCH_URL_RE.find(body).map(|m| m.as_str()).unwrap_or_default();
    let embed = EMBED_URL_RE.find(body).map(|m| m.as_str()).unwrap_or_default();
    format!("{watch} {embed}")
}

/// Drops whole words from the end until the title fits `MAX_TITLE_LEN` characters.
pub fn truncate_title(title: &str) -> String {
    let mut truncated = String::new();

    for (i, word) in title.split_whitespace().enumerate() {
        let candidate = if i == 0 {
            word.to_string()
        } else {
            format!("{truncated} {word}")
        };
        if candidate.chars().count() > MAX_TITLE_LEN {
            break;
        }
        truncated = candidate;
    }

    truncated
}

/// Bytes per elapsed millisecond, times 100.
pub fn transfer_speed(size: u64, elapsed_millis: i64) -> i64 {
    (size as i64 / elapsed_millis.max(1)) * 100
}

pub fn first_thumbnail(thumbnails: &BTreeMap<String, String>) -> String {
    thumbnails.keys().next().cloned().unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileMetadata {
    pub name: String,
    pub modified: i64,
    pub size: u64,
    #[serde(rename = "type")]
    pub content_type: String,
    pub time_start: i64,
    pub speed: i64,
    pub num_chunks: u64,
    pub time_end: i64,
}

/// Fields of the final commit request.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadForm {
    pub title: String,
    pub description: String,
    pub server_file_name: String,
    pub thumbnail: String,
    pub metadata: FileMetadata,
}

impl UploadForm {
    pub fn fields(&self) -> Result<Vec<(&'static str, String)>> {
        let meta = serde_json::to_string(&self.metadata)?;

        Ok(vec![
            ("title", self.title.clone()),
            ("description", self.description.clone()),
            ("video[]", self.server_file_name.clone()),
            ("featured", "0".to_string()),
            ("rights", "1".to_string()),
            ("terms", "1".to_string()),
            ("facebookUpload", String::new()),
            ("vimeoUpload", String::new()),
            ("infoWho", String::new()),
            ("infoWhen", String::new()),
            ("infoWhere", String::new()),
            ("infoExtUser", String::new()),
            ("tags", TAGS.to_string()),
            ("channelId", "0".to_string()),
            ("sideChannelId", CATEGORY.to_string()),
            ("mediaChannelId", String::new()),
            ("visibility", VISIBILITY.to_string()),
            ("file_meta", meta),
            ("thumb", self.thumbnail.clone()),
        ])
    }
}

fn ensure_ok(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status != StatusCode::OK {
        return Err(UploadError::server_error(status.as_u16(), format!("{what} failed")));
    }
    Ok(response)
}

/// The upload server assigned to this session.
#[derive(Debug, Clone)]
pub struct UploadServer {
    client: Client,
    url: Url,
}

impl UploadServer {
    pub fn new(client: Client, url: Url) -> Self {
        Self { client, url }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn url_with(&self, pairs: &[(&str, &str)]) -> Url {
        let mut url = self.url.clone();
        url.query_pairs_mut().extend_pairs(pairs);
        url
    }

    /// Sends the whole file as one multipart request. Returns the server file name.
    pub async fn multipart_upload(&self, path: &Path, file_name: &str) -> Result<String> {
        let file = File::open(path).await?;
        let length = file.metadata().await?.len();

        let body = Body::wrap_stream(ReaderStream::new(file));
        let part = Part::stream_with_length(body, length).file_name(file_name.to_string());
        let form = Form::new().part("Filedata", part);

        let response = self.client.post(self.url.clone()).multipart(form).send().await?;
        let response = ensure_ok(response, "Multipart upload")?;

        Ok(response.text().await?.trim().to_string())
    }

    /// PUTs every chunk of `plan` in order, then asks the server to merge them.
    /// Returns the merged server file name.
    pub async fn put_upload(&self, path: &Path, plan: &ChunkPlan) -> Result<String> {
        let mut file = File::open(path).await?;
        let chunk_size = plan.chunk_size.to_string();
        let chunk_qty = plan.chunk_qty.to_string();

        for chunk in &plan.chunks {
            file.seek(SeekFrom::Start(chunk.offset)).await?;
            let mut buffer = vec![0u8; chunk.size as usize];
            file.read_exact(&mut buffer).await?;

            let url = self.url_with(&[
                ("chunk", chunk.name.as_str()),
                ("chunkSz", chunk_size.as_str()),
                ("chunkQty", chunk_qty.as_str()),
            ]);

            let response = self.client.put(url).body(Bytes::from(buffer)).send().await?;
            ensure_ok(response, &format!("Upload of chunk {}", chunk.index))?;
            tracing::debug!(chunk = %chunk.name, size = chunk.size, "chunk uploaded");
        }

        let merge = plan.merge_index().to_string();
        let url = self.url_with(&[
            ("merge", merge.as_str()),
            ("chunk", plan.base_name.as_str()),
            ("chunkSz", chunk_size.as_str()),
            ("chunkQty", chunk_qty.as_str()),
        ]);

        let response = self.client.post(url).send().await?;
        let response = ensure_ok(response, "Chunk merge")?;

        Ok(response.text().await?.trim().to_string())
    }

    pub async fn check_duration(&self, server_file_name: &str) -> Result<f64> {
        let url = self.url_with(&[("duration", server_file_name)]);
        let response = ensure_ok(self.client.get(url).send().await?, "Duration check")?;

        let body = response.text().await?;
        body.trim()
            .parse::<f64>()
            .map_err(|_| UploadError::protocol(format!("invalid duration {:?}", body.trim())))
    }

    pub async fn check_thumbnails(&self, server_file_name: &str) -> Result<BTreeMap<String, String>> {
        let url = self.url_with(&[("thumbnails", server_file_name)]);
        let response = ensure_ok(self.client.get(url).send().await?, "Thumbnail check")?;

        Ok(serde_json::from_slice(&response.bytes().await?)?)
    }

    /// Commits the upload. Returns the space-joined watch and embed URLs.
    pub async fn send_upload_form(&self, form: &UploadForm) -> Result<String> {
        let url = self.url_with(&[("form", "1")]);
        let response = self.client.post(url).form(&form.fields()?).send().await?;
        let response = ensure_ok(response, "Upload form")?;

        Ok(extract_urls(&response.text().await?))
    }
}
