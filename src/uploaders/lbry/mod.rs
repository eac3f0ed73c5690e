//! Publishes through a local video-hosting daemon over JSON-RPC.
//!
//! The daemon does the actual transfer. This engine submits the publish
//! request, polls until the daemon reports the file fully reflected, then
//! drops the daemon's local copy and records the result.

mod rpc;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::{LbryConfig, ThumbnailConfig};
use crate::core::{
    ProgressLabels, Result, Services, UploadError, UploadOutcome, UploadedVod, Uploader, Vod,
};
use crate::utils::{run_or_cancel, sleep_or_cancel, ThumbnailRelay};

pub use rpc::{
    select_claim, DaemonClient, FileListItem, FileListResult, PublishOutput, PublishParams,
    PublishResult,
};

const BID: &str = "0.0001";
const WALLET_ID: &str = "default_wallet";
const TAGS: [&str; 5] = ["destiny", "vod", "yee wins", "reupload", "mirror"];
const LANGUAGES: [&str; 1] = ["en"];

/// Steps of one publish attempt, reported with the failure log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PublishState {
    Idle,
    Publishing,
    Monitoring,
    Cleanup,
    Done,
    Failed,
}

pub struct LbryUploader {
    daemon: DaemonClient,
    relay: ThumbnailRelay,
    author: String,
    channel_name: String,
    poll_interval: Duration,
    services: Services,
}

impl LbryUploader {
    pub const NAME: &'static str = "lbry";

    pub fn new(config: &LbryConfig, thumbnail: &ThumbnailConfig, services: Services) -> Result<Self> {
        Ok(Self {
            daemon: DaemonClient::new(&config.uri),
            relay: ThumbnailRelay::new(&thumbnail.endpoint, thumbnail.timeout)?,
            author: config.author.clone(),
            channel_name: config.channel_name.clone(),
            poll_interval: config.poll_interval,
            services,
        })
    }

    pub fn publish_params(&self, vod: &Vod, thumbnail_url: String) -> PublishParams {
        let suffix: u32 = rand::thread_rng().gen_range(0..1000);

        PublishParams {
            name: format!("{}-r-{}{}", vod.id, vod.platform, suffix),
            title: vod.display_title(),
            bid: BID.to_string(),
            file_path: vod.path.clone(),
            validate_file: false,
            optimize_file: false,
            author: self.author.clone(),
            description: vod.description(),
            thumbnail_url,
            tags: TAGS.iter().map(|t| t.to_string()).collect(),
            languages: LANGUAGES.iter().map(|l| l.to_string()).collect(),
            locations: Vec::new(),
            channel_name: self.channel_name.clone(),
            wallet_id: WALLET_ID.to_string(),
            funding_account_ids: Vec::new(),
            preview: false,
            blocking: true,
        }
    }

    async fn publish(&self, cancel: &CancellationToken, vod: &Vod) -> Result<PublishOutput> {
        let thumbnail = run_or_cancel(cancel, async {
            Ok(self
                .relay
                .upload_or(Path::new(&vod.thumbnail_path), &vod.thumbnail)
                .await)
        })
        .await?;

        let params = self.publish_params(vod, thumbnail);
        tracing::info!(name = %params.name, "starting to upload");

        let result = run_or_cancel(cancel, self.daemon.publish(&params)).await?;
        if result.outputs.is_empty() {
            return Err(UploadError::NoOutputs);
        }

        select_claim(&result.outputs)
            .cloned()
            .ok_or(UploadError::NoClaim)
    }

    /// Polls until the daemon reports the claim fully reflected.
    async fn monitor(&self, cancel: &CancellationToken, vod: &Vod, claim: &str) -> Result<()> {
        let labels = ProgressLabels {
            id: vod.id.clone(),
            channel_name: self.channel_name.clone(),
            vod_title: vod.title.clone(),
        };

        tracing::debug!(sleep = ?self.poll_interval, "waiting before checking progress");
        sleep_or_cancel(cancel, self.poll_interval).await?;

        loop {
            let list = run_or_cancel(cancel, self.daemon.file_list(claim)).await?;
            if list.items.len() != 1 {
                return Err(UploadError::ClaimNotFound {
                    claim: claim.to_string(),
                    count: list.items.len(),
                });
            }

            let item = &list.items[0];
            self.services
                .gauge
                .set_progress(labels.clone(), item.reflector_progress as f64);
            self.services.hooks.progress(item.reflector_progress);

            if item.is_fully_reflected {
                return Ok(());
            }

            tracing::info!(claim, progress = item.reflector_progress, "VOD upload status");
            sleep_or_cancel(cancel, self.poll_interval).await?;
        }
    }

    /// Drops the daemon's copy. Failures here are logged, never raised.
    async fn cleanup(&self, claim: &str) {
        match self.daemon.file_delete(claim).await {
            Ok(true) => {
                tracing::info!(claim, "VOD cleaned up");
                return;
            }
            Ok(false) => tracing::warn!(claim, "daemon kept the file, cleaning blobs"),
            Err(err) => tracing::warn!(claim, error = %err, "unable to delete VOD"),
        }

        // the daemon can keep the content blobs after the claim is gone
        match self.daemon.blob_clean().await {
            Ok(true) => tracing::debug!("VOD blobs cleaned up"),
            Ok(false) => tracing::warn!("unable to clean VOD blobs"),
            Err(err) => tracing::warn!(error = %err, "unable to clean VOD blobs"),
        }
    }

    async fn persist(&self, vod: &Vod, output: &PublishOutput) -> Result<()> {
        let additional_info = serde_json::to_vec(&serde_json::json!({ "Claim": output.claim_id }))?;

        let record = UploadedVod {
            hosting_platform: Self::NAME.to_string(),
            vod: vod.clone(),
            hosting_additional_info: additional_info,
            hosting_channel: self.channel_name.clone(),
            hosting_name: output.name.clone(),
            hosting_normalized_name: output.normalized_name.clone(),
            hosting_url: output.permanent_url.clone(),
        };

        let result = self.services.sink.create_upload_record(record).await;
        self.services.hooks.insert(vod, result.is_ok());
        result
    }

    async fn run(
        &self,
        cancel: &CancellationToken,
        vod: &mut Vod,
        state: &mut PublishState,
    ) -> Result<UploadOutcome> {
        if vod.end_time.is_empty() {
            tracing::info!("calculating endtime based on the duration");
            vod.resolve_end_time()?;
        }

        *state = PublishState::Publishing;
        let output = self.publish(cancel, vod).await?;
        let claim = output.claim_id.clone();

        *state = PublishState::Monitoring;
        self.monitor(cancel, vod, &claim).await?;
        tracing::info!(claim = %claim, "VOD uploaded");

        *state = PublishState::Cleanup;
        self.cleanup(&claim).await;

        *state = PublishState::Done;
        self.persist(vod, &output).await?;

        Ok(UploadOutcome::succeeded(
            Self::NAME,
            vec![claim, output.permanent_url],
        ))
    }
}

#[async_trait]
impl Uploader for LbryUploader {
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
            let mut state = PublishState::Idle;

            let result = self.run(cancel, &mut vod, &mut state).await;
            if let Err(err) = &result {
                tracing::error!(state = ?state, error = %err, "VOD upload failed");
                state = PublishState::Failed;
            }
            tracing::debug!(state = ?state, "publish finished");
            result
        }
        .instrument(span)
        .await
    }
}
