mod errors;
mod hooks;
mod manager;
mod progress;
mod registry;
mod store;
mod traits;
mod types;

pub use errors::{Result, UploadError};
pub use hooks::{command_hooks, Hooks};
pub use manager::{UploadManager, DEFAULT_DESTINATION_DELAY};
pub use progress::UploadRatioGauge;
pub use registry::{Registry, Services, UploaderConstructor};
pub use store::{JsonLinesRecordSink, MemoryRecordSink};
pub use traits::{ProgressGauge, ProgressLabels, RecordSink, Uploader};
pub use types::{UploadOutcome, UploadedVod, Vod};
