use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::errors::{Result, UploadError};
use super::traits::RecordSink;
use super::types::UploadedVod;

/// Keeps records in memory. Used by tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryRecordSink {
    records: Mutex<Vec<UploadedVod>>,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<UploadedVod> {
        self.records.lock().await.clone()
    }
}

#[async_trait]
impl RecordSink for MemoryRecordSink {
    async fn create_upload_record(&self, record: UploadedVod) -> Result<()> {
        self.records.lock().await.push(record);
        Ok(())
    }
}

/// Appends one JSON object per line to a file.
pub struct JsonLinesRecordSink {
    path: PathBuf,
    // serialises appends from concurrent engines
    lock: Mutex<()>,
}

impl JsonLinesRecordSink {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl RecordSink for JsonLinesRecordSink {
    async fn create_upload_record(&self, record: UploadedVod) -> Result<()> {
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let _guard = self.lock.lock().await;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|err| UploadError::sink(format!("{}: {}", self.path.display(), err)))?;
        file.write_all(&line).await?;
        file.flush().await?;

        Ok(())
    }
}
