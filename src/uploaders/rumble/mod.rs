//! Logs into the web upload endpoint and pushes the file through its upload
//! server, either in one request or as fixed-size chunks that the server merges.

mod cookies;
mod hashing;
mod upload;

use std::path::Path;
use std::time::SystemTime;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use url::Url;
use uuid::Uuid;

use crate::config::RumbleConfig;
use crate::core::{Result, Services, UploadError, UploadOutcome, UploadedVod, Uploader, Vod};
use crate::utils::chunks::{check_file_size, generate_put_name};
use crate::utils::{run_or_cancel, ChunkPlan, TransferMode, MAX_FILE_SIZE, MAX_SINGLE_CHUNK};

pub use cookies::{CookieSession, StoredCookie};
pub use hashing::{hash_stretch, md5_hex, password_hashes, str_bin};
pub use upload::{
    build_upload_url, extract_urls, parse_login_state, parse_upload_server, transfer_speed,
    truncate_title, FileMetadata, UploadForm, UploadServer,
};

#[derive(Debug, Deserialize)]
struct SaltResponse {
    data: SaltData,
}

#[derive(Debug, Deserialize)]
struct SaltData {
    #[serde(default)]
    salts: Vec<String>,
}

/// Facts about the local file collected before the transfer starts.
#[derive(Debug, Clone)]
struct LocalFile {
    name: String,
    size: u64,
    modified: i64,
}

pub struct RumbleUploader {
    client: Client,
    session: CookieSession,
    login: String,
    password: String,
    base_url: Url,
    upload_server_template: String,
    services: Services,
}

impl RumbleUploader {
    pub const NAME: &'static str = "rumble";

    pub fn new(config: &RumbleConfig, services: Services) -> Result<Self> {
        let session = CookieSession::open(&config.cookie_file);
        let client = Client::builder().cookie_provider(session.jar()).build()?;

        Ok(Self {
            client,
            session,
            login: config.login.clone(),
            password: config.password.clone(),
            base_url: Url::parse(&config.base_url)?,
            upload_server_template: config.upload_server_template.clone(),
            services,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }

    pub async fn is_logged_in(&self) -> Result<bool> {
        let response = self
            .client
            .get(self.endpoint("/browse")?)
            .header("content-type", "application/x-www-form-urlencoded")
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(UploadError::server_error(status.as_u16(), "Login check failed"));
        }

        Ok(parse_login_state(&response.text().await?))
    }

    pub async fn login(&self) -> Result<()> {
        let response = self
            .client
            .post(self.endpoint("/service.php?name=user.get_salts")?)
            .form(&[("username", self.login.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(UploadError::server_error(status.as_u16(), "Salt request failed"));
        }

        let salts: SaltResponse = serde_json::from_slice(&response.bytes().await?)?;
        let hashes = password_hashes(&self.password, &salts.data.salts)?;

        let response = self
            .client
            .post(self.endpoint("/service.php?name=user.login")?)
            .form(&[("username", self.login.as_str()), ("password_hashes", hashes.as_str())])
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(UploadError::server_error(status.as_u16(), "Login failed"));
        }

        tracing::info!(login = %self.login, "logged in");
        self.session.save(response.url()).await
    }

    pub async fn upload_server(&self) -> Result<UploadServer> {
        let response = self.client.get(self.endpoint("/upload.php")?).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(UploadError::server_error(status.as_u16(), "Upload page request failed"));
        }

        let server = parse_upload_server(&response.text().await?).ok_or(UploadError::NoUploadServer)?;
        let url = build_upload_url(&self.upload_server_template, &server)?;

        Ok(UploadServer::new(self.client.clone(), url))
    }

    async fn transfer(&self, server: &UploadServer, vod: &Vod, file: &LocalFile) -> Result<String> {
        let path = Path::new(&vod.path);
        let mode = TransferMode::for_size(file.size, MAX_SINGLE_CHUNK);
        let time_start = Utc::now().timestamp_millis();

        let (server_file_name, num_chunks) = match mode {
            TransferMode::Single => (server.multipart_upload(path, &file.name).await?, 1),
            TransferMode::Chunked => {
                let plan = ChunkPlan::new(
                    file.size,
                    MAX_SINGLE_CHUNK,
                    generate_put_name(&file.name, time_start),
                );
                tracing::debug!(
                    chunks = plan.chunk_qty,
                    bytes = plan.total_size(),
                    base = %plan.base_name,
                    "chunked upload"
                );
                (server.put_upload(path, &plan).await?, plan.chunk_qty)
            }
        };

        let time_end = Utc::now().timestamp_millis();

        let duration = server.check_duration(&server_file_name).await?;
        tracing::debug!(duration, file = %server_file_name, "server accepted file");
        let thumbnails = server.check_thumbnails(&server_file_name).await?;

        let title = match mode {
            TransferMode::Single => vod.display_title(),
            TransferMode::Chunked => truncate_title(&vod.display_title()),
        };

        let form = UploadForm {
            title,
            description: vod.description(),
            server_file_name,
            thumbnail: upload::first_thumbnail(&thumbnails),
            metadata: FileMetadata {
                name: file.name.clone(),
                modified: file.modified,
                size: file.size,
                content_type: upload::CONTENT_TYPE.to_string(),
                time_start,
                speed: transfer_speed(file.size, time_end - time_start),
                num_chunks,
                time_end,
            },
        };

        server.send_upload_form(&form).await
    }

    async fn persist(&self, vod: &Vod, urls: &str) -> Result<()> {
        let record = UploadedVod {
            hosting_platform: Self::NAME.to_string(),
            vod: vod.clone(),
            hosting_additional_info: Vec::new(),
            hosting_channel: self.login.clone(),
            hosting_name: String::new(),
            hosting_normalized_name: String::new(),
            hosting_url: urls.to_string(),
        };

        let result = self.services.sink.create_upload_record(record).await;
        self.services.hooks.insert(vod, result.is_ok());
        result
    }

    async fn run(&self, cancel: &CancellationToken, vod: &mut Vod) -> Result<UploadOutcome> {
        if vod.end_time.is_empty() {
            tracing::info!("calculating endtime based on the duration");
            vod.resolve_end_time()?;
        }

        let file = local_file(Path::new(&vod.path)).await?;
        check_file_size(file.size, MAX_FILE_SIZE)?;

        if !run_or_cancel(cancel, self.is_logged_in()).await? {
            run_or_cancel(cancel, self.login()).await?;
        }

        tracing::debug!("getting the upload url");
        let server = run_or_cancel(cancel, self.upload_server()).await?;

        tracing::info!(size = file.size, server = %server.url(), "starting to upload");
        let urls = run_or_cancel(cancel, self.transfer(&server, vod, &file)).await?;
        tracing::info!(urls = %urls, "VOD uploaded");

        self.persist(vod, &urls).await?;

        let identifiers = urls.split_whitespace().map(str::to_string).collect();
        Ok(UploadOutcome::succeeded(Self::NAME, identifiers))
    }
}

async fn local_file(path: &Path) -> Result<LocalFile> {
    let metadata = tokio::fs::metadata(path).await?;
    let modified = metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(SystemTime::UNIX_EPOCH).ok())
        .map(|since| since.as_millis() as i64)
        .unwrap_or_default();

    Ok(LocalFile {
        name: path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string(),
        size: metadata.len(),
        modified,
    })
}

#[async_trait]
impl Uploader for RumbleUploader {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn upload(&self, cancel: &CancellationToken, vod: &Vod) -> Result<UploadOutcome> {
        let span = tracing::info_span!(
            "upload",
            platform = Self::NAME,
            vod.id = %vod.id,
            vod.platform = %vod.platform,
            attempt = %Uuid::new_v4(),
        );

        async {
            let mut vod = vod.clone();
            let result = self.run(cancel, &mut vod).await;
            if let Err(err) = &result {
                tracing::error!(error = %err, "VOD upload failed");
            }
            result
        }
        .instrument(span)
        .await
    }
}
