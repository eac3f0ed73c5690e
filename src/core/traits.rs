use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::errors::Result;
use super::types::{UploadOutcome, UploadedVod, Vod};

/// Destination engine - every hosting platform implements this single operation
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Destination name, used for records and logs
    fn name(&self) -> &str;

    /// Uploads one VOD. Returns once the destination considers the upload final.
    async fn upload(&self, cancel: &CancellationToken, vod: &Vod) -> Result<UploadOutcome>;
}

/// Sink for completed upload rows. The storage behind it is up to the host.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn create_upload_record(&self, record: UploadedVod) -> Result<()>;
}

/// Label set of the upload progress gauge
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProgressLabels {
    pub id: String,
    pub channel_name: String,
    pub vod_title: String,
}

/// Metrics gauge reporting upload progress, 0 to 100
pub trait ProgressGauge: Send + Sync {
    fn set_progress(&self, labels: ProgressLabels, percent: f64);
}
