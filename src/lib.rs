pub mod config;
pub mod core;
pub mod uploaders;
pub mod utils;

// Re-export the core types
pub use core::{
    Hooks,
    Registry,
    Result,
    Services,
    UploadError,
    UploadManager,
    UploadOutcome,
    UploadedVod,
    Uploader,
    Vod,
};

// Re-export the destination engines
pub use uploaders::{LbryUploader, RumbleUploader};
