//! Sliding byte window.
//!
//! A fixed-capacity buffer holding the bytes that have arrived but have not
//! been consumed yet. The driver compacts it before loading every chunk, so
//! memory stays bounded no matter how large the archive is.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};

pub struct Window {
    buf: Box<[u8]>,
    /// Read position inside `buf`.
    cursor: usize,
    /// End of valid data inside `buf`.
    len: usize,
    /// Bytes consumed since the start of the stream.
    absolute: u64,
}

impl Window {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: vec![0u8; capacity].into_boxed_slice(),
            cursor: 0,
            len: 0,
            absolute: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Buffered bytes not consumed yet.
    pub fn available(&self) -> usize {
        self.len - self.cursor
    }

    /// Stream offset of the cursor.
    pub fn absolute_offset(&self) -> u64 {
        self.absolute
    }

    /// The unconsumed bytes.
    pub fn unconsumed(&self) -> &[u8] {
        &self.buf[self.cursor..self.len]
    }

    /// Append `chunk` after the buffered data.
    pub fn set(&mut self, chunk: &[u8]) -> Result<()> {
        if self.len + chunk.len() > self.buf.len() {
            return Err(Error::BufferOverflow(format!(
                "{} buffered + {} incoming exceeds capacity {}",
                self.len,
                chunk.len(),
                self.buf.len()
            )));
        }
        self.buf[self.len..self.len + chunk.len()].copy_from_slice(chunk);
        self.len += chunk.len();
        Ok(())
    }

    /// Move the unconsumed tail to the start of the buffer.
    pub fn flush(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.buf.copy_within(self.cursor..self.len, 0);
        self.len -= self.cursor;
        self.cursor = 0;
        tracing::trace!(retained = self.len, "window compacted");
    }

    /// Drop all buffered data and restart offset accounting.
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.len = 0;
        self.absolute = 0;
    }

    /// Advance past `n` bytes without copying them.
    pub fn move_pointer(&mut self, n: usize) {
        debug_assert!(n <= self.available());
        self.cursor += n;
        self.absolute += n as u64;
    }

    /// Owned copy of the next `n` bytes. The buffer is rewritten by every
    /// later load, so callers must never hold a view into it.
    pub fn rent_slice(&mut self, n: usize) -> Vec<u8> {
        let out = self.buf[self.cursor..self.cursor + n].to_vec();
        self.move_pointer(n);
        out
    }

    /// Little-endian `u32` at the cursor, without consuming it.
    pub fn peek_u32(&self) -> u32 {
        LittleEndian::read_u32(&self.buf[self.cursor..self.len])
    }

    pub fn read_u8(&mut self) -> u8 {
        let v = self.buf[self.cursor];
        self.move_pointer(1);
        v
    }

    pub fn read_u16(&mut self) -> u16 {
        let v = LittleEndian::read_u16(&self.buf[self.cursor..self.len]);
        self.move_pointer(2);
        v
    }

    pub fn read_u32(&mut self) -> u32 {
        let v = LittleEndian::read_u32(&self.buf[self.cursor..self.len]);
        self.move_pointer(4);
        v
    }

    pub fn read_u64(&mut self) -> u64 {
        let v = LittleEndian::read_u64(&self.buf[self.cursor..self.len]);
        self.move_pointer(8);
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_little_endian_and_tracks_offset() {
        let mut w = Window::new(32);
        w.set(&[0x01, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12]).unwrap();
        assert_eq!(w.read_u8(), 1);
        assert_eq!(w.read_u16(), 0x1234);
        assert_eq!(w.peek_u32(), 0x12345678);
        assert_eq!(w.read_u32(), 0x12345678);
        assert_eq!(w.available(), 0);
        assert_eq!(w.absolute_offset(), 7);
    }

    #[test]
    fn flush_keeps_tail_and_offset() {
        let mut w = Window::new(8);
        w.set(b"abcdef").unwrap();
        w.move_pointer(4);
        w.flush();
        assert_eq!(w.unconsumed(), b"ef");
        w.set(b"ghijkl").unwrap();
        assert_eq!(w.unconsumed(), b"efghijkl");
        assert_eq!(w.absolute_offset(), 4);
    }

    #[test]
    fn overflow_is_rejected() {
        let mut w = Window::new(4);
        w.set(b"abc").unwrap();
        assert!(matches!(w.set(b"de"), Err(Error::BufferOverflow(_))));
        assert_eq!(w.available(), 3);
    }

    #[test]
    fn rented_slice_does_not_alias_buffer() {
        let mut w = Window::new(8);
        w.set(b"abcd").unwrap();
        let rented = w.rent_slice(2);
        w.flush();
        w.set(b"zzzzzz").unwrap();
        assert_eq!(rented, b"ab");
        assert_eq!(w.unconsumed(), b"cdzzzzzz");
    }

    #[test]
    fn reset_clears_everything() {
        let mut w = Window::new(8);
        w.set(b"abcd").unwrap();
        w.move_pointer(1);
        w.reset();
        assert_eq!(w.available(), 0);
        assert_eq!(w.absolute_offset(), 0);
    }

    #[test]
    fn read_u64() {
        let mut w = Window::new(16);
        w.set(&0x0102030405060708u64.to_le_bytes()).unwrap();
        assert_eq!(w.read_u64(), 0x0102030405060708);
    }
}
