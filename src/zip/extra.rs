//! Extra-field parsing.
//!
//! Each local header may carry extra fields, a `{id, size}` header followed by
//! `size` bytes of payload. The [`ExtraFieldRegistry`] maps ids to parsers;
//! each parser is a [`Routine`] that reads the payload and returns an
//! [`EntryPatch`]. Ids without a parser are skipped by their declared size.
//!
//! Parsers never need to consume the whole payload. The local header routine
//! skips whatever remains of the field, so the next field header is always
//! read at the right offset.

use std::collections::HashMap;
use std::sync::Arc;

use super::routine::{Collect, ParseContext, Routine, Step, step};
use super::structures::{EntryPatch, ExtraFieldHeader};
use crate::error::{Error, Result};

/// Well-known extra field ids.
pub mod extra_field_id {
    pub const ZIP64: u16 = 0x0001;
    pub const NTFS: u16 = 0x000a;
    pub const STRONG_ENCRYPTION: u16 = 0x0017;
    pub const MACOSX: u16 = 0x07c8;
    pub const CENTRAL_DIRECTORY_PROTECTION: u16 = 0x4341;
    pub const EXTENDED_TIMESTAMP: u16 = 0x5455;
    pub const UNICODE_COMMENT: u16 = 0x6375;
    pub const UNICODE_PATH: u16 = 0x7075;
    pub const UTF8_PATH: u16 = 0x756e;
    pub const UNIX_UID_GID: u16 = 0x7855;
    pub const UNIX_OWNER: u16 = 0x7875;
    pub const AES: u16 = 0x9901;
}

/// A running extra-field parser.
pub type ExtraFieldRoutine = Box<dyn Routine<Output = EntryPatch> + Send>;

/// Creates a parser for one occurrence of an extra field.
pub trait ExtraFieldParser: Send + Sync {
    fn start(&self, header: ExtraFieldHeader) -> ExtraFieldRoutine;
}

impl<F> ExtraFieldParser for F
where
    F: Fn(ExtraFieldHeader) -> ExtraFieldRoutine + Send + Sync,
{
    fn start(&self, header: ExtraFieldHeader) -> ExtraFieldRoutine {
        self(header)
    }
}

/// Mapping from extra field id to parser.
#[derive(Clone)]
pub struct ExtraFieldRegistry {
    parsers: HashMap<u16, Arc<dyn ExtraFieldParser>>,
}

impl Default for ExtraFieldRegistry {
    /// Registry with the ZIP64, extended timestamp, Unicode path and UTF-8
    /// path parsers.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(extra_field_id::ZIP64, |h: ExtraFieldHeader| {
                Box::new(Zip64Sizes::new(h.size)) as ExtraFieldRoutine
            })
            .register(extra_field_id::EXTENDED_TIMESTAMP, |h: ExtraFieldHeader| {
                Box::new(ExtendedTimestamp::new(h.size)) as ExtraFieldRoutine
            })
            .register(extra_field_id::UNICODE_PATH, |h: ExtraFieldHeader| {
                Box::new(PathField::unicode(h.size)) as ExtraFieldRoutine
            })
            .register(extra_field_id::UTF8_PATH, |h: ExtraFieldHeader| {
                Box::new(PathField::utf8(h.size)) as ExtraFieldRoutine
            });
        registry
    }
}

impl ExtraFieldRegistry {
    /// Registry that skips every field.
    pub fn empty() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Add or replace the parser for `id`. The last registration wins.
    pub fn register<P>(&mut self, id: u16, parser: P) -> &mut Self
    where
        P: ExtraFieldParser + 'static,
    {
        self.parsers.insert(id, Arc::new(parser));
        self
    }

    /// Remove the parser for `id`, so the field is skipped.
    pub fn unregister(&mut self, id: u16) -> bool {
        self.parsers.remove(&id).is_some()
    }

    pub fn contains(&self, id: u16) -> bool {
        self.parsers.contains_key(&id)
    }

    pub fn start(&self, header: ExtraFieldHeader) -> Option<ExtraFieldRoutine> {
        self.parsers.get(&header.id).map(|p| p.start(header))
    }
}

enum PathState {
    Version,
    Crc,
    Name(Collect),
}

/// Unicode (`0x7075`: version, CRC32 of the header name, name) and UTF-8
/// (`0x756e`: version, name) path fields.
pub struct PathField {
    size: usize,
    with_crc: bool,
    state: PathState,
}

impl PathField {
    pub fn unicode(size: u16) -> Self {
        Self {
            size: size as usize,
            with_crc: true,
            state: PathState::Version,
        }
    }

    pub fn utf8(size: u16) -> Self {
        Self {
            size: size as usize,
            with_crc: false,
            state: PathState::Version,
        }
    }

    fn prefix(&self) -> usize {
        if self.with_crc { 5 } else { 1 }
    }

    fn name_state(&self, cx: &ParseContext<'_>) -> Result<PathState> {
        let length = self.size - self.prefix();
        if length > cx.max_name_length {
            return Err(Error::OversizedName {
                length,
                limit: cx.max_name_length,
            });
        }
        Ok(PathState::Name(Collect::new(length, "path extra field")))
    }
}

impl Routine for PathField {
    type Output = EntryPatch;

    fn resume(&mut self, cx: &mut ParseContext<'_>) -> Result<Step<EntryPatch>> {
        loop {
            match &mut self.state {
                PathState::Version => {
                    if self.size < self.prefix() {
                        return Ok(Step::Ready(EntryPatch::default()));
                    }
                    step!(cx.require(1, "path extra field")?);
                    if cx.window.read_u8() != 1 {
                        return Ok(Step::Ready(EntryPatch::default()));
                    }
                    self.state = if self.with_crc {
                        PathState::Crc
                    } else {
                        self.name_state(cx)?
                    };
                }
                PathState::Crc => {
                    step!(cx.require(4, "path extra field")?);
                    let _name_crc = cx.window.read_u32();
                    self.state = self.name_state(cx)?;
                }
                PathState::Name(collect) => {
                    let bytes = step!(collect.resume(cx)?);
                    return Ok(Step::Ready(EntryPatch {
                        path: Some(String::from_utf8_lossy(&bytes).into_owned()),
                        ..Default::default()
                    }));
                }
            }
        }
    }
}

/// ZIP64 extended information: uncompressed size, then compressed size.
pub struct Zip64Sizes {
    size: usize,
}

impl Zip64Sizes {
    pub fn new(size: u16) -> Self {
        Self {
            size: size as usize,
        }
    }
}

impl Routine for Zip64Sizes {
    type Output = EntryPatch;

    fn resume(&mut self, cx: &mut ParseContext<'_>) -> Result<Step<EntryPatch>> {
        if self.size < 8 {
            return Ok(Step::Ready(EntryPatch::default()));
        }
        let both = self.size >= 16;
        step!(cx.require(if both { 16 } else { 8 }, "zip64 extra field")?);
        let uncompressed_size = cx.window.read_u64();
        let compressed_size = both.then(|| cx.window.read_u64());
        Ok(Step::Ready(EntryPatch {
            uncompressed_size: Some(uncompressed_size),
            compressed_size,
            is_zip64: true,
            ..Default::default()
        }))
    }
}

/// Extended timestamp: a flag byte, then one `u32` per set flag bit
/// (modification, access, creation).
pub struct ExtendedTimestamp {
    size: usize,
    flags: Option<u8>,
    consumed: usize,
    bit: u8,
    patch: EntryPatch,
}

impl ExtendedTimestamp {
    pub fn new(size: u16) -> Self {
        Self {
            size: size as usize,
            flags: None,
            consumed: 0,
            bit: 0,
            patch: EntryPatch::default(),
        }
    }
}

impl Routine for ExtendedTimestamp {
    type Output = EntryPatch;

    fn resume(&mut self, cx: &mut ParseContext<'_>) -> Result<Step<EntryPatch>> {
        let flags = match self.flags {
            Some(flags) => flags,
            None => {
                if self.size == 0 {
                    return Ok(Step::Ready(EntryPatch::default()));
                }
                step!(cx.require(1, "extended timestamp")?);
                let flags = cx.window.read_u8();
                self.flags = Some(flags);
                self.consumed = 1;
                flags
            }
        };

        while self.bit < 3 {
            if flags & (1 << self.bit) != 0 && self.consumed + 4 <= self.size {
                step!(cx.require(4, "extended timestamp")?);
                let value = Some(cx.window.read_u32());
                match self.bit {
                    0 => self.patch.modification_time = value,
                    1 => self.patch.access_time = value,
                    _ => self.patch.creation_time = value,
                }
                self.consumed += 4;
            }
            self.bit += 1;
        }
        Ok(Step::Ready(std::mem::take(&mut self.patch)))
    }
}
