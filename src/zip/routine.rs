//! Suspension protocol shared by every parse step.
//!
//! A routine is a resumable state machine. Each call to
//! [`Routine::resume`] either finishes, or reports how many unconsumed bytes
//! it needs before it can make progress and returns control to the driver.
//! The driver loads more input and resumes it later. Routines may own
//! sub-routines and forward their requests with [`step!`], which keeps
//! delegation invisible to the driver.
//!
//! Suspension happens only at these explicit requests, so the window is never
//! left half-updated between two resumes.

use super::extra::ExtraFieldRegistry;
use super::structures::EntryReport;
use super::window::Window;
use crate::error::{Error, Result};

/// Outcome of one resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step<T> {
    /// Resume again once at least this many bytes are unconsumed.
    Need(usize),
    /// The archive is fully consumed; the driver drops any trailing input.
    Terminate,
    /// Finished with a value.
    Ready(T),
}

/// Something the parser wants the driver to hand to the consumer.
#[derive(Debug)]
pub enum Event {
    Directory(EntryReport),
    File(EntryReport),
    Content(Vec<u8>),
    EndOfEntry,
}

/// Everything a routine may touch while it runs.
pub struct ParseContext<'a> {
    pub window: &'a mut Window,
    pub events: &'a mut Vec<Event>,
    pub registry: &'a ExtraFieldRegistry,
    pub max_name_length: usize,
    /// The source is exhausted; no further bytes will arrive.
    pub eof: bool,
}

impl ParseContext<'_> {
    /// Unconsumed bytes in the window.
    pub fn available(&self) -> usize {
        self.window.available()
    }

    /// `Ready` once `needed` bytes are buffered, `Need` while more may come,
    /// `MalformedHeader` once the input has ended short.
    pub fn require(&self, needed: usize, record: &'static str) -> Result<Step<()>> {
        let available = self.available();
        if available >= needed {
            Ok(Step::Ready(()))
        } else if self.eof {
            Err(Error::MalformedHeader {
                record,
                needed,
                available,
            })
        } else {
            Ok(Step::Need(needed))
        }
    }

    /// Ask for any further input while `remaining` bytes are still owed,
    /// failing once the input has ended.
    pub fn more<T>(&self, remaining: usize, record: &'static str) -> Result<Step<T>> {
        if self.eof {
            Err(Error::MalformedHeader {
                record,
                needed: remaining,
                available: self.available(),
            })
        } else {
            Ok(Step::Need(1))
        }
    }
}

pub trait Routine {
    type Output;

    fn resume(&mut self, cx: &mut ParseContext<'_>) -> Result<Step<Self::Output>>;
}

impl<R: Routine + ?Sized> Routine for Box<R> {
    type Output = R::Output;

    fn resume(&mut self, cx: &mut ParseContext<'_>) -> Result<Step<Self::Output>> {
        (**self).resume(cx)
    }
}

/// Unwrap a `Ready` value, or return the request from the enclosing routine.
macro_rules! step {
    ($e:expr) => {
        match $e {
            $crate::zip::routine::Step::Ready(value) => value,
            $crate::zip::routine::Step::Need(n) => {
                return Ok($crate::zip::routine::Step::Need(n));
            }
            $crate::zip::routine::Step::Terminate => {
                return Ok($crate::zip::routine::Step::Terminate);
            }
        }
    };
}
pub(crate) use step;

fn clamp(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}

/// Skip a run of bytes as they arrive.
pub struct Skip {
    remaining: u64,
    record: &'static str,
}

impl Skip {
    pub fn new(length: u64, record: &'static str) -> Self {
        Self {
            remaining: length,
            record,
        }
    }
}

impl Routine for Skip {
    type Output = ();

    fn resume(&mut self, cx: &mut ParseContext<'_>) -> Result<Step<()>> {
        while self.remaining > 0 {
            let available = cx.available();
            if available == 0 {
                return cx.more(clamp(self.remaining), self.record);
            }
            let n = clamp(self.remaining).min(available);
            cx.window.move_pointer(n);
            self.remaining -= n as u64;
        }
        Ok(Step::Ready(()))
    }
}

/// Copy a run of bytes into an owned buffer, a piece at a time.
pub struct Collect {
    buf: Vec<u8>,
    length: usize,
    record: &'static str,
}

impl Collect {
    pub fn new(length: usize, record: &'static str) -> Self {
        Self {
            buf: Vec::with_capacity(length),
            length,
            record,
        }
    }
}

impl Routine for Collect {
    type Output = Vec<u8>;

    fn resume(&mut self, cx: &mut ParseContext<'_>) -> Result<Step<Vec<u8>>> {
        while self.buf.len() < self.length {
            let available = cx.available();
            if available == 0 {
                return cx.more(self.length - self.buf.len(), self.record);
            }
            let n = (self.length - self.buf.len()).min(available);
            let piece = cx.window.rent_slice(n);
            self.buf.extend_from_slice(&piece);
        }
        Ok(Step::Ready(std::mem::take(&mut self.buf)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Feed `data` to `routine` in `chunk`-sized pieces the way the driver
    /// does, returning the final value and the bytes left unconsumed.
    pub(crate) fn drive<R: Routine>(
        routine: &mut R,
        registry: &ExtraFieldRegistry,
        data: &[u8],
        chunk: usize,
    ) -> (Result<R::Output>, Vec<Event>, usize) {
        let mut window = Window::new(4096);
        let mut events = Vec::new();
        let mut requested = 0;
        let mut pieces = data.chunks(chunk);
        let mut eof = false;
        loop {
            if !eof && window.available() < requested {
                match pieces.next() {
                    Some(piece) => {
                        window.flush();
                        window.set(piece).unwrap();
                        continue;
                    }
                    None => eof = true,
                }
            }
            let mut cx = ParseContext {
                window: &mut window,
                events: &mut events,
                registry,
                max_name_length: 512,
                eof,
            };
            match routine.resume(&mut cx) {
                Ok(Step::Ready(value)) => {
                    let left = window.available() + pieces.map(<[u8]>::len).sum::<usize>();
                    return (Ok(value), events, left);
                }
                Ok(Step::Need(n)) => {
                    if eof && n > window.available() {
                        panic!("routine requested {n} bytes after end of input");
                    }
                    requested = n;
                }
                Ok(Step::Terminate) => panic!("unexpected terminate"),
                Err(e) => return (Err(e), events, window.available()),
            }
        }
    }

    #[test]
    fn skip_spans_chunks() {
        let registry = ExtraFieldRegistry::default();
        let (out, _, left) = drive(&mut Skip::new(10, "test"), &registry, &[7u8; 13], 3);
        assert!(out.is_ok());
        assert_eq!(left, 3);
    }

    #[test]
    fn skip_fails_at_end_of_input() {
        let registry = ExtraFieldRegistry::default();
        let (out, _, _) = drive(&mut Skip::new(10, "comment"), &registry, &[7u8; 4], 3);
        assert!(matches!(
            out,
            Err(Error::MalformedHeader {
                record: "comment",
                ..
            })
        ));
    }

    #[test]
    fn collect_assembles_pieces() {
        let registry = ExtraFieldRegistry::default();
        let (out, _, left) = drive(&mut Collect::new(5, "name"), &registry, b"hello!", 2);
        assert_eq!(out.unwrap(), b"hello");
        assert_eq!(left, 1);
    }
}
