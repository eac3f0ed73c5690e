use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::errors::UploadError;
use super::hooks::Hooks;
use super::traits::Uploader;
use super::types::{UploadOutcome, Vod};
use crate::utils::sleep_or_cancel;

pub const DEFAULT_DESTINATION_DELAY: Duration = Duration::from_secs(1);

/// Hands each VOD to every enabled destination, one after another.
pub struct UploadManager {
    uploaders: Vec<Arc<dyn Uploader>>,
    hooks: Hooks,
    destination_delay: Duration,
}

impl UploadManager {
    pub fn new(uploaders: Vec<Arc<dyn Uploader>>, hooks: Hooks) -> Self {
        Self {
            uploaders,
            hooks,
            destination_delay: DEFAULT_DESTINATION_DELAY,
        }
    }

    pub fn with_destination_delay(mut self, delay: Duration) -> Self {
        self.destination_delay = delay;
        self
    }

    pub fn destinations(&self) -> Vec<&str> {
        self.uploaders.iter().map(|u| u.name()).collect()
    }

    /// Runs every destination for `vod`. A failing destination never stops the others.
    pub async fn process(&self, cancel: &CancellationToken, vod: &Vod) -> Vec<UploadOutcome> {
        tracing::info!(vod.id = %vod.id, vod.platform = %vod.platform, "received a vod");
        self.hooks.receive(vod);

        let mut outcomes = Vec::with_capacity(self.uploaders.len());

        for (index, uploader) in self.uploaders.iter().enumerate() {
            if index > 0 && sleep_or_cancel(cancel, self.destination_delay).await.is_err() {
                outcomes.push(UploadOutcome::failed(uploader.name(), UploadError::Cancelled));
                continue;
            }
            if cancel.is_cancelled() {
                outcomes.push(UploadOutcome::failed(uploader.name(), UploadError::Cancelled));
                continue;
            }

            let outcome = match uploader.upload(cancel, vod).await {
                Ok(outcome) => outcome,
                Err(err) if err.is_precondition() => {
                    tracing::warn!(
                        platform = uploader.name(),
                        vod.id = %vod.id,
                        error = %err,
                        "destination skipped"
                    );
                    UploadOutcome::failed(uploader.name(), err)
                }
                Err(err) => {
                    tracing::error!(
                        platform = uploader.name(),
                        vod.id = %vod.id,
                        error = %err,
                        "upload error"
                    );
                    UploadOutcome::failed(uploader.name(), err)
                }
            };
            outcomes.push(outcome);
        }

        for outcome in &outcomes {
            self.hooks.finish(vod, outcome.success);
        }

        outcomes
    }
}
