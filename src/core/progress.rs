use std::collections::BTreeMap;
use std::sync::RwLock;

use super::traits::{ProgressGauge, ProgressLabels};

/// In-memory `upload_ratio` gauge keyed by (id, channel_name, vod_title).
///
/// Exporting the values is left to the host; `snapshot` hands them out.
#[derive(Debug, Default)]
pub struct UploadRatioGauge {
    values: RwLock<BTreeMap<ProgressLabels, f64>>,
}

impl UploadRatioGauge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, labels: &ProgressLabels) -> Option<f64> {
        self.values
            .read()
            .ok()
            .and_then(|values| values.get(labels).copied())
    }

    pub fn snapshot(&self) -> Vec<(ProgressLabels, f64)> {
        match self.values.read() {
            Ok(values) => values.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl ProgressGauge for UploadRatioGauge {
    fn set_progress(&self, labels: ProgressLabels, percent: f64) {
        let percent = percent.clamp(0.0, 100.0);
        match self.values.write() {
            Ok(mut values) => {
                values.insert(labels, percent);
            }
            Err(err) => tracing::warn!(error = %err, "upload ratio gauge poisoned"),
        }
    }
}
