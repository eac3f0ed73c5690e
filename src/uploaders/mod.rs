pub mod lbry;
pub mod rumble;

pub use lbry::LbryUploader;
pub use rumble::RumbleUploader;
