use serde::{Deserialize, Serialize};

use super::errors::Result;
use crate::utils::time::calculate_end_time;

// Additional info is opaque bytes, written out as text so records stay greppable
fn serialize_info<S>(info: &[u8], serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(&String::from_utf8_lossy(info))
}

fn deserialize_info<'de, D>(deserializer: D) -> std::result::Result<Vec<u8>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    Ok(text.into_bytes())
}

/// A recorded VOD, as announced by the capture pipeline.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vod {
    pub id: String,
    /// Source platform name
    pub platform: String,
    pub title: String,
    pub start_time: String,
    #[serde(default)]
    pub end_time: String,
    /// Duration in seconds
    #[serde(default)]
    pub duration: i64,
    /// Local media file
    pub path: String,
    #[serde(default)]
    pub thumbnail_path: String,
    /// Fallback remote thumbnail URL
    #[serde(default)]
    pub thumbnail: String,
}

impl Vod {
    /// Fills in `end_time` from `start_time + duration` when the pipeline left it empty.
    pub fn resolve_end_time(&mut self) -> Result<()> {
        if self.end_time.is_empty() {
            self.end_time = calculate_end_time(&self.start_time, self.duration)?;
        }
        Ok(())
    }

    /// `[platform:id] title`, the title every destination publishes under.
    pub fn display_title(&self) -> String {
        format!("[{}:{}] {}", self.platform, self.id, self.title)
    }

    pub fn description(&self) -> String {
        format!("{}\n{}", self.start_time, self.end_time)
    }
}

/// Result of one engine invocation for one VOD.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadOutcome {
    pub destination: String,
    pub success: bool,
    /// Destination-assigned identifiers, e.g. a claim id or content URLs
    pub identifiers: Vec<String>,
    pub error: Option<String>,
}

impl UploadOutcome {
    pub fn succeeded(destination: impl Into<String>, identifiers: Vec<String>) -> Self {
        Self {
            destination: destination.into(),
            success: true,
            identifiers,
            error: None,
        }
    }

    pub fn failed(destination: impl Into<String>, error: impl ToString) -> Self {
        Self {
            destination: destination.into(),
            success: false,
            identifiers: Vec::new(),
            error: Some(error.to_string()),
        }
    }
}

/// Row handed to the record sink after a successful upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedVod {
    pub hosting_platform: String,
    pub vod: Vod,
    #[serde(serialize_with = "serialize_info", deserialize_with = "deserialize_info")]
    pub hosting_additional_info: Vec<u8>,
    pub hosting_channel: String,
    pub hosting_name: String,
    pub hosting_normalized_name: String,
    pub hosting_url: String,
}
