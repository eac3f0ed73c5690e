use std::path::Path;

use rand::Rng;

use crate::core::{Result, UploadError};

/// Files below this size go up in one multipart request.
pub const MAX_SINGLE_CHUNK: u64 = 5_000_000;
/// Hard limit on the upload endpoint (3000 chunks of `MAX_SINGLE_CHUNK`).
pub const MAX_FILE_SIZE: u64 = 15_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Single,
    Chunked,
}

impl TransferMode {
    pub fn for_size(file_size: u64, single_chunk_ceiling: u64) -> Self {
        if file_size < single_chunk_ceiling {
            TransferMode::Single
        } else {
            TransferMode::Chunked
        }
    }
}

/// One PUT of the chunked transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpec {
    pub index: u64,
    pub name: String,
    pub offset: u64,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    /// Name the server merges the chunks under
    pub base_name: String,
    pub chunk_size: u64,
    pub chunk_qty: u64,
    pub chunks: Vec<ChunkSpec>,
}

impl ChunkPlan {
    /// Splits `file_size` into `file_size / chunk_size` chunks.
    ///
    /// The chunk count is floored, so the last chunk runs to the end of the file
    /// and carries the remainder.
    pub fn new(file_size: u64, chunk_size: u64, base_name: impl Into<String>) -> Self {
        let base_name = base_name.into();
        let chunk_qty = if chunk_size == 0 { 0 } else { file_size / chunk_size };

        let chunks = (0..chunk_qty)
            .map(|index| {
                let offset = index * chunk_size;
                let size = if index + 1 == chunk_qty {
                    file_size - offset
                } else {
                    chunk_size
                };
                ChunkSpec {
                    index,
                    name: format!("{}_{}", index, base_name),
                    offset,
                    size,
                }
            })
            .collect();

        Self {
            base_name,
            chunk_size,
            chunk_qty,
            chunks,
        }
    }

    /// Index referenced by the single merge request.
    pub fn merge_index(&self) -> u64 {
        self.chunk_qty.saturating_sub(1)
    }

    pub fn total_size(&self) -> u64 {
        self.chunks.iter().map(|c| c.size).sum()
    }
}

pub fn check_file_size(file_size: u64, limit: u64) -> Result<()> {
    if file_size > limit {
        return Err(UploadError::FileTooLarge {
            size: file_size,
            limit,
        });
    }
    Ok(())
}

/// `<start millis>-<random 100000..200000><ext>`, the name chunks are uploaded under.
pub fn generate_put_name(file_name: &str, start_millis: i64) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(100_000..200_000);
    let ext = Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    format!("{}-{}{}", start_millis, suffix, ext)
}
