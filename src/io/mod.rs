mod channel;
mod http;
mod local;
mod memory;

pub use channel::ChannelSource;
pub use http::HttpSource;
pub use local::ReaderSource;
pub use memory::SliceSource;

use anyhow::Result;
use async_trait::async_trait;

/// Trait for a forward-only source of archive bytes
///
/// Chunks may have any size and need not line up with ZIP records.
#[async_trait]
pub trait ChunkSource: Send {
    /// Next chunk of input, or `None` once the source is exhausted.
    async fn next_chunk(&mut self) -> Result<Option<Vec<u8>>>;
}
