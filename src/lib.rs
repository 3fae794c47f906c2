//! # streamzip
//!
//! Incremental unzip of ZIP archives from forward-only byte streams.
//!
//! Archives are decoded while they arrive, entry by entry, from local file
//! headers alone. Nothing is seeked and nothing is buffered beyond a small
//! fixed window, so an archive can be extracted straight from an HTTP
//! download, a pipe or any other source of chunks.
//!
//! ## Features
//!
//! - Entries reported as soon as their header is read, content streamed after
//! - Entries without known sizes, ended by a data descriptor
//! - ZIP64 sizes and end records
//! - Unicode path, UTF-8 path and extended timestamp extra fields, plus
//!   user-registered parsers
//! - STORED and DEFLATE decoding of entry content
//!
//! ## Example
//!
//! ```no_run
//! use streamzip::{Entry, HttpSource, StreamExtractor};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let source = HttpSource::new("https://example.com/archive.zip").await?;
//!     let extractor = Arc::new(StreamExtractor::new());
//!
//!     let (mut entries, task) = extractor.spawn(source)?;
//!     while let Some(entry) = entries.recv().await {
//!         if let Entry::File(report, content) = entry {
//!             let data = content.decode(report.compression_method)?.read_to_end().await?;
//!             println!("{}: {} bytes", report.path, data.len());
//!         }
//!     }
//!     task.await??;
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod io;
pub mod zip;

pub use cli::Cli;
pub use config::ExtractorConfig;
pub use error::{Error, Result};
pub use io::{ChannelSource, ChunkSource, HttpSource, ReaderSource, SliceSource};
pub use zip::{
    CompressionMethod, Entry, EntryHandler, EntryReport, EntryStream, ExtraFieldRegistry,
    StreamExtractor,
};
