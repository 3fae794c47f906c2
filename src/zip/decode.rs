//! Decompression stage for entry streams.
//!
//! Only STORED and raw DEFLATE are built in. Anything else is reported as
//! unsupported and left to the caller, who still has the compressed stream.

use flate2::{Decompress, FlushDecompress, Status};

use super::entry::EntryStream;
use super::structures::CompressionMethod;
use crate::error::{Error, Result};

/// Output space added whenever a decompression pass fills the buffer.
const INFLATE_STEP: usize = 32 * 1024;

pub enum Decoder {
    Stored,
    Deflate(Box<Inflater>),
}

pub struct Inflater {
    inner: Decompress,
    /// The final block has been decoded.
    finished: bool,
}

impl Decoder {
    pub fn for_method(method: CompressionMethod) -> Result<Self> {
        match method {
            CompressionMethod::Stored => Ok(Decoder::Stored),
            CompressionMethod::Deflate => Ok(Decoder::Deflate(Box::new(Inflater {
                inner: Decompress::new(false),
                finished: false,
            }))),
            other => Err(Error::UnsupportedCompression(other.as_u16())),
        }
    }

    /// Decode one piece of compressed input.
    pub fn feed(&mut self, input: Vec<u8>) -> Result<Vec<u8>> {
        match self {
            Decoder::Stored => Ok(input),
            Decoder::Deflate(inflater) => inflate(inflater, &input),
        }
    }

    /// Whether the input so far forms a complete stream.
    pub fn is_complete(&self) -> bool {
        match self {
            Decoder::Stored => true,
            Decoder::Deflate(inflater) => inflater.finished,
        }
    }
}

fn inflate(state: &mut Inflater, mut input: &[u8]) -> Result<Vec<u8>> {
    let inflater = &mut state.inner;
    let mut out = Vec::with_capacity(input.len() * 2 + 64);
    loop {
        if out.capacity() - out.len() < INFLATE_STEP / 4 {
            out.reserve(INFLATE_STEP);
        }
        let before_in = inflater.total_in();
        let before_out = inflater.total_out();
        let status = inflater
            .decompress_vec(input, &mut out, FlushDecompress::None)
            .map_err(|e| Error::Decompress(e.to_string()))?;
        let consumed = (inflater.total_in() - before_in) as usize;
        let produced = inflater.total_out() - before_out;
        input = &input[consumed..];

        match status {
            Status::StreamEnd => {
                state.finished = true;
                break;
            }
            // Output space left over means the decoder is waiting for input.
            _ if input.is_empty() && out.len() < out.capacity() => break,
            Status::BufError if consumed == 0 && produced == 0 => break,
            _ => {}
        }
    }
    Ok(out)
}

/// An [`EntryStream`] with decompression applied.
pub struct DecodedStream {
    inner: EntryStream,
    decoder: Decoder,
    /// An error has been returned, the stream is exhausted.
    failed: bool,
}

impl DecodedStream {
    pub fn new(inner: EntryStream, decoder: Decoder) -> Self {
        Self {
            inner,
            decoder,
            failed: false,
        }
    }

    /// Next piece of decoded content. Empty pieces are skipped.
    ///
    /// Content that ends before the compressed stream does is an error.
    pub async fn next_chunk(&mut self) -> Option<Result<Vec<u8>>> {
        if self.failed {
            return None;
        }
        loop {
            let chunk = match self.inner.next_chunk().await {
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) => {
                    self.failed = true;
                    return Some(Err(e));
                }
                None if self.decoder.is_complete() => return None,
                None => {
                    self.failed = true;
                    return Some(Err(Error::Decompress("truncated deflate stream".into())));
                }
            };
            match self.decoder.feed(chunk) {
                Ok(out) if out.is_empty() => continue,
                Ok(out) => return Some(Ok(out)),
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }

    pub async fn read_to_end(mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = self.next_chunk().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }
}
