use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::ChunkSource;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Chunk source over any async reader: local files, stdin, pipes
pub struct ReaderSource<R> {
    reader: R,
    buf: Box<[u8]>,
}

impl<R: AsyncRead + Unpin + Send> ReaderSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: vec![0u8; READ_BUFFER_SIZE].into_boxed_slice(),
        }
    }
}

impl ReaderSource<tokio::fs::File> {
    pub async fn open(path: &Path) -> Result<Self> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Self::new(file))
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> ChunkSource for ReaderSource<R> {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        let n = self.reader.read(&mut self.buf).await?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(self.buf[..n].to_vec()))
    }
}
