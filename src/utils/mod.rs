pub mod chunks;
pub mod thumbnail;
pub mod time;

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::{Result, UploadError};

pub use chunks::{ChunkPlan, ChunkSpec, TransferMode, MAX_FILE_SIZE, MAX_SINGLE_CHUNK};
pub use thumbnail::ThumbnailRelay;
pub use time::calculate_end_time;

/// Sleeps for `duration`, returning early with `Cancelled` on shutdown.
pub async fn sleep_or_cancel(cancel: &CancellationToken, duration: Duration) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(UploadError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

/// Drives `future` to completion unless `cancel` fires first.
pub async fn run_or_cancel<F, T>(cancel: &CancellationToken, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        _ = cancel.cancelled() => Err(UploadError::Cancelled),
        result = future => result,
    }
}
