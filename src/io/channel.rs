use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use super::ChunkSource;

/// Adapter for push-based producers
///
/// The producer sends chunks through the paired sender and aborts the stream
/// by sending an error. Dropping every sender ends the input.
pub struct ChannelSource {
    rx: mpsc::Receiver<Result<Vec<u8>>>,
}

impl ChannelSource {
    pub fn new(capacity: usize) -> (mpsc::Sender<Result<Vec<u8>>>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }
}

#[async_trait]
impl ChunkSource for ChannelSource {
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>> {
        match self.rx.recv().await {
            Some(Ok(chunk)) => Ok(Some(chunk)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}
