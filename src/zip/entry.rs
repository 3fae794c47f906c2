//! Consumer side: entry notifications and content streams.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use super::decode::{DecodedStream, Decoder};
use super::structures::{CompressionMethod, EntryReport};
use crate::error::{Error, Result};

/// Receives entries in archive order.
///
/// Both callbacks run on the driver's task. `on_file` must not wait for the
/// content of its stream: the driver produces that content only after the
/// callback returns. Hand the stream to another task or queue it instead.
pub trait EntryHandler: Send {
    fn on_directory(&mut self, report: EntryReport) {
        let _ = report;
    }

    fn on_file(&mut self, report: EntryReport, content: EntryStream);
}

/// An entry as delivered through a queue.
#[derive(Debug)]
pub enum Entry {
    Directory(EntryReport),
    File(EntryReport, EntryStream),
}

impl Entry {
    pub fn report(&self) -> &EntryReport {
        match self {
            Entry::Directory(report) => report,
            Entry::File(report, _) => report,
        }
    }
}

/// Queue entries for a consumer task. Entries are lost once the receiver is
/// dropped, and the driver then discards their content.
impl EntryHandler for mpsc::UnboundedSender<Entry> {
    fn on_directory(&mut self, report: EntryReport) {
        let _ = self.send(Entry::Directory(report));
    }

    fn on_file(&mut self, report: EntryReport, content: EntryStream) {
        let _ = self.send(Entry::File(report, content));
    }
}

/// Compressed content of one entry, in order.
///
/// Backed by a bounded channel: while it is full the driver waits, which
/// pauses parsing of everything after this entry. Dropping the stream
/// discards the rest of the entry and lets parsing continue.
#[derive(Debug)]
pub struct EntryStream {
    rx: mpsc::Receiver<Result<Vec<u8>>>,
    complete: Arc<AtomicBool>,
    done: bool,
}

/// Producer half of an [`EntryStream`].
#[derive(Debug)]
pub(crate) struct ContentSender {
    tx: mpsc::Sender<Result<Vec<u8>>>,
    complete: Arc<AtomicBool>,
}

impl ContentSender {
    /// Returns `false` once the stream has been dropped.
    pub async fn send(&self, item: Result<Vec<u8>>) -> bool {
        self.tx.send(item).await.is_ok()
    }

    /// Close the stream after the last byte of the entry.
    pub fn finish(self) {
        self.complete.store(true, Ordering::Release);
    }
}

impl EntryStream {
    pub(crate) fn channel(capacity: usize) -> (ContentSender, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        let complete = Arc::new(AtomicBool::new(false));
        let sender = ContentSender {
            tx,
            complete: Arc::clone(&complete),
        };
        let stream = Self {
            rx,
            complete,
            done: false,
        };
        (sender, stream)
    }

    /// Next piece of content, `None` once the entry is complete.
    ///
    /// A parse failure while this entry is open is delivered here as well.
    /// If the extraction stops before the entry ends without reporting an
    /// error, for example because its task was aborted, the stream yields
    /// [`Error::Cancelled`]. After an error the stream is exhausted.
    pub async fn next_chunk(&mut self) -> Option<Result<Vec<u8>>> {
        if self.done {
            return None;
        }
        match self.rx.recv().await {
            Some(Ok(chunk)) => Some(Ok(chunk)),
            Some(Err(e)) => {
                self.done = true;
                Some(Err(e))
            }
            None => {
                self.done = true;
                if self.complete.load(Ordering::Acquire) {
                    None
                } else {
                    Some(Err(Error::Cancelled))
                }
            }
        }
    }

    /// Collect the whole entry.
    pub async fn read_to_end(mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        while let Some(chunk) = self.next_chunk().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }

    /// Pipe the content through the decoder for `method`.
    pub fn decode(self, method: CompressionMethod) -> Result<DecodedStream> {
        Ok(DecodedStream::new(self, Decoder::for_method(method)?))
    }
}
