//! Entry content routing.
//!
//! Content of a sized entry is carved straight out of the window. Content of
//! a streamed entry (bit 3 set, sizes unknown when the header was written)
//! runs until its data descriptor, which is found by scanning.

use byteorder::{ByteOrder, LittleEndian};
use memchr::memmem;

use super::routine::{Event, ParseContext, Routine, Step};
use super::structures::{DATA_DESCRIPTOR_SIZE, ZIP64_DATA_DESCRIPTOR_SIZE, magic};
use crate::error::{Error, Result};

const DESCRIPTOR_MAGIC: [u8; 4] = magic::DATA_DESCRIPTOR.to_le_bytes();

/// Forward exactly `remaining` bytes as they arrive.
pub struct SizedContent {
    remaining: u64,
    path: String,
}

impl SizedContent {
    pub fn new(length: u64, path: String) -> Self {
        Self {
            remaining: length,
            path,
        }
    }
}

impl Routine for SizedContent {
    type Output = ();

    fn resume(&mut self, cx: &mut ParseContext<'_>) -> Result<Step<()>> {
        while self.remaining > 0 {
            let available = cx.available();
            if available == 0 {
                if cx.eof {
                    return Err(Error::TruncatedContent {
                        path: std::mem::take(&mut self.path),
                    });
                }
                return Ok(Step::Need(1));
            }
            let n = usize::try_from(self.remaining).unwrap_or(usize::MAX).min(available);
            let piece = cx.window.rent_slice(n);
            cx.events.push(Event::Content(piece));
            self.remaining -= n as u64;
        }
        cx.events.push(Event::EndOfEntry);
        Ok(Step::Ready(()))
    }
}

/// Forward content until a data descriptor whose compressed size equals the
/// number of bytes delivered so far.
///
/// The magic alone is not enough, compressed payloads contain it by chance.
/// Every offset is tested once: bytes are forwarded as soon as no descriptor
/// can start at them, and only the last `descriptor_size - 1` bytes wait for
/// more input.
pub struct DescriptorScan {
    zip64: bool,
    delivered: u64,
    path: String,
}

impl DescriptorScan {
    pub fn new(zip64: bool, path: String) -> Self {
        Self {
            zip64,
            delivered: 0,
            path,
        }
    }

    fn descriptor_size(&self) -> usize {
        if self.zip64 {
            ZIP64_DATA_DESCRIPTOR_SIZE
        } else {
            DATA_DESCRIPTOR_SIZE
        }
    }

    /// Offset of the first real descriptor among the candidates in `data`.
    fn find(&self, data: &[u8]) -> Option<usize> {
        let last_start = data.len() - self.descriptor_size();
        memmem::find_iter(&data[..last_start + 4], &DESCRIPTOR_MAGIC).find(|&i| {
            let size = if self.zip64 {
                LittleEndian::read_u64(&data[i + 8..])
            } else {
                LittleEndian::read_u32(&data[i + 8..]) as u64
            };
            size == self.delivered + i as u64
        })
    }
}

impl Routine for DescriptorScan {
    type Output = ();

    fn resume(&mut self, cx: &mut ParseContext<'_>) -> Result<Step<()>> {
        let size = self.descriptor_size();
        loop {
            let available = cx.available();
            if available < size {
                if cx.eof {
                    return Err(Error::TruncatedContent {
                        path: std::mem::take(&mut self.path),
                    });
                }
                return Ok(Step::Need(size));
            }

            if let Some(i) = self.find(cx.window.unconsumed()) {
                if i > 0 {
                    let piece = cx.window.rent_slice(i);
                    cx.events.push(Event::Content(piece));
                }
                self.delivered += i as u64;
                cx.window.move_pointer(size);
                tracing::trace!(path = %self.path, length = self.delivered, "data descriptor found");
                cx.events.push(Event::EndOfEntry);
                return Ok(Step::Ready(()));
            }

            let n = available - size + 1;
            let piece = cx.window.rent_slice(n);
            cx.events.push(Event::Content(piece));
            self.delivered += n as u64;
        }
    }
}
