use anyhow::Result;
use async_trait::async_trait;

use super::ChunkSource;

/// In-memory archive handed out in fixed-size chunks
pub struct SliceSource {
    data: Vec<u8>,
    chunk_size: usize,
    position: usize,
}

impl SliceSource {
    /// `chunk_size` of zero delivers everything as one chunk.
    pub fn new(data: impl Into<Vec<u8>>, chunk_size: usize) -> Self {
        let data = data.into();
        let chunk_size = if chunk_size == 0 { data.len().max(1) } else { chunk_size };
        Self {
            data,
            chunk_size,
            position: 0,
        }
    }
}

#[async_trait]
impl ChunkSource for SliceSource {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        if self.position >= self.data.len() {
            return Ok(None);
        }
        let end = (self.position + self.chunk_size).min(self.data.len());
        let chunk = self.data[self.position..end].to_vec();
        self.position = end;
        Ok(Some(chunk))
    }
}
