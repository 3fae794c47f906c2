//! Streaming ZIP decoding.
//!
//! Archives are read front to back, one local file header at a time, without
//! seeking and without the central directory. This is what makes extraction
//! from a download possible while it is still in flight.
//!
//! ## Architecture
//!
//! - [`window`]: bounded buffer holding the unconsumed tail of the input
//! - `routine`: resumable parsing steps that ask for more input instead of
//!   blocking
//! - `records`: the record state machine (local headers, central directory,
//!   end records)
//! - [`extra`]: pluggable extra-field parsers keyed by field id
//! - `content`: routing of entry data, sized or up to a data descriptor
//! - [`extractor`]: the async driver feeding chunks and dispatching entries
//!
//! ## Limitations
//!
//! - Central directory contents are skipped, so names and sizes come from
//!   local headers only
//! - Only STORED and DEFLATE can be decoded; other methods are streamed raw
//! - No encryption or multi-disk support

mod routine;

mod content;
mod decode;
mod entry;
pub mod extra;
mod extractor;
mod records;
mod structures;
pub mod window;

pub use decode::{DecodedStream, Decoder};
pub use entry::{Entry, EntryHandler, EntryStream};
pub use extra::{ExtraFieldParser, ExtraFieldRegistry, ExtraFieldRoutine};
pub use extractor::StreamExtractor;
pub use routine::{ParseContext, Routine, Step};
pub use structures::*;
