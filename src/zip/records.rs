//! Record state machine.
//!
//! The archive is walked front to back. At every record boundary a 4-byte
//! signature selects the handler:
//!
//! - local file header: entry metadata, extra fields, then content
//! - central directory header: skipped, entries come from local headers
//! - ZIP64 end of central directory and its locator: skipped
//! - end of central directory: skips the comment and ends the archive

use super::content::{DescriptorScan, SizedContent};
use super::extra::ExtraFieldRoutine;
use super::routine::{Event, ParseContext, Routine, Skip, Step, step};
use super::structures::*;
use crate::error::{Error, Result};

/// Top-level routine: one archive from its first byte to the end of its
/// central directory.
pub struct Archive {
    state: ArchiveState,
}

enum ArchiveState {
    Boundary,
    Record(Record),
    Finished,
}

impl Default for Archive {
    fn default() -> Self {
        Self::new()
    }
}

impl Archive {
    pub fn new() -> Self {
        Self {
            state: ArchiveState::Boundary,
        }
    }
}

impl Routine for Archive {
    type Output = ();

    fn resume(&mut self, cx: &mut ParseContext<'_>) -> Result<Step<()>> {
        loop {
            match &mut self.state {
                ArchiveState::Boundary => {
                    step!(cx.require(4, "record signature")?);
                    let offset = cx.window.absolute_offset();
                    let signature = cx.window.peek_u32();
                    cx.window.move_pointer(4);
                    self.state = ArchiveState::Record(Record::start(signature, offset)?);
                }
                ArchiveState::Record(record) => {
                    let end = step!(record.resume(cx)?);
                    if end {
                        self.state = ArchiveState::Finished;
                        return Ok(Step::Terminate);
                    }
                    self.state = ArchiveState::Boundary;
                }
                ArchiveState::Finished => return Ok(Step::Ready(())),
            }
        }
    }
}

/// Handler for the record behind one signature. Resolves to `true` once the
/// archive has ended.
enum Record {
    LocalFile(Box<LocalFile>),
    CentralDirectory(CentralDirectory),
    Zip64End(Zip64End),
    Zip64Locator,
    End(End),
}

impl Record {
    fn start(signature: u32, offset: u64) -> Result<Self> {
        Ok(match signature {
            magic::LOCAL_FILE_HEADER => Record::LocalFile(Box::new(LocalFile::new(offset))),
            magic::CENTRAL_DIRECTORY_HEADER => Record::CentralDirectory(CentralDirectory::Header),
            magic::ZIP64_END_OF_CENTRAL_DIRECTORY => Record::Zip64End(Zip64End::Header),
            magic::ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR => Record::Zip64Locator,
            magic::END_OF_CENTRAL_DIRECTORY => Record::End(End::Header),
            other => {
                return Err(Error::UnrecognizedMagic {
                    magic: other,
                    offset,
                });
            }
        })
    }

    fn resume(&mut self, cx: &mut ParseContext<'_>) -> Result<Step<bool>> {
        match self {
            Record::LocalFile(local) => {
                step!(local.resume(cx)?);
                Ok(Step::Ready(false))
            }
            Record::CentralDirectory(cd) => {
                step!(cd.resume(cx)?);
                Ok(Step::Ready(false))
            }
            Record::Zip64End(end) => {
                step!(end.resume(cx)?);
                Ok(Step::Ready(false))
            }
            Record::Zip64Locator => {
                step!(cx.require(Zip64EOCDLocator::SIZE, "zip64 end of central directory locator")?);
                let locator = Zip64EOCDLocator::read(cx.window);
                tracing::debug!(eocd64_offset = locator.eocd64_offset, "zip64 locator");
                Ok(Step::Ready(false))
            }
            Record::End(end) => {
                step!(end.resume(cx)?);
                Ok(Step::Ready(true))
            }
        }
    }
}

enum LocalFileState {
    Header,
    Name(LocalFileHeader),
    ExtraHeader,
    ExtraParser {
        routine: ExtraFieldRoutine,
        header: ExtraFieldHeader,
        start: u64,
    },
    ExtraSkip(Skip),
    Content(Box<dyn Routine<Output = ()> + Send>),
}

/// Local file header, its extra fields and the entry content.
pub struct LocalFile {
    offset: u64,
    state: LocalFileState,
    report: Option<EntryReport>,
    /// Bytes of the extra area not consumed yet.
    extra_remaining: usize,
}

impl LocalFile {
    pub fn new(offset: u64) -> Self {
        Self {
            offset,
            state: LocalFileState::Header,
            report: None,
            extra_remaining: 0,
        }
    }

    /// Hand the finished report to the consumer and pick the content route.
    /// `None` when nothing follows the header.
    fn finish_header(&mut self, cx: &mut ParseContext<'_>) -> Option<LocalFileState> {
        let report = self.report.take()?;
        if report.is_directory() {
            tracing::debug!(path = %report.path, "directory entry");
            let stray = report.compressed_size;
            cx.events.push(Event::Directory(report));
            return (stray > 0).then(|| {
                LocalFileState::Content(Box::new(Skip::new(stray, "directory content")))
            });
        }

        tracing::debug!(
            path = %report.path,
            method = report.compression_method.as_u16(),
            compressed = report.compressed_size,
            streamed = report.is_streamed,
            zip64 = report.is_zip64,
            "file entry"
        );
        let path = report.path.clone();
        let content: Box<dyn Routine<Output = ()> + Send> = if report.is_streamed {
            Box::new(DescriptorScan::new(report.is_zip64, path))
        } else {
            Box::new(SizedContent::new(report.compressed_size, path))
        };
        cx.events.push(Event::File(report));
        Some(LocalFileState::Content(content))
    }
}

impl Routine for LocalFile {
    type Output = ();

    fn resume(&mut self, cx: &mut ParseContext<'_>) -> Result<Step<()>> {
        loop {
            match &mut self.state {
                LocalFileState::Header => {
                    step!(cx.require(LocalFileHeader::SIZE, "local file header")?);
                    let header = LocalFileHeader::read(cx.window);
                    let length = header.name_length as usize;
                    if length > cx.max_name_length {
                        return Err(Error::OversizedName {
                            length,
                            limit: cx.max_name_length,
                        });
                    }
                    self.state = LocalFileState::Name(header);
                }
                LocalFileState::Name(header) => {
                    step!(cx.require(header.name_length as usize, "file name")?);
                    let name = cx.window.rent_slice(header.name_length as usize);
                    let path = String::from_utf8_lossy(&name).into_owned();
                    self.extra_remaining = header.extra_length as usize;
                    self.report = Some(EntryReport::from_header(header, path, self.offset));
                    self.state = LocalFileState::ExtraHeader;
                }
                LocalFileState::ExtraHeader => {
                    if self.extra_remaining == 0 {
                        match self.finish_header(cx) {
                            Some(state) => self.state = state,
                            None => return Ok(Step::Ready(())),
                        }
                        continue;
                    }
                    if self.extra_remaining < ExtraFieldHeader::SIZE {
                        // Padding too short to hold another field.
                        let padding = self.extra_remaining as u64;
                        self.extra_remaining = 0;
                        self.state = LocalFileState::ExtraSkip(Skip::new(padding, "extra field"));
                        continue;
                    }
                    step!(cx.require(ExtraFieldHeader::SIZE, "extra field header")?);
                    let header = ExtraFieldHeader::read(cx.window);
                    self.extra_remaining -= ExtraFieldHeader::SIZE;
                    let size = header.size as usize;
                    if size > self.extra_remaining {
                        return Err(Error::MalformedExtraField {
                            id: header.id,
                            reason: format!(
                                "declares {size} bytes but only {} remain",
                                self.extra_remaining
                            ),
                        });
                    }
                    self.extra_remaining -= size;
                    self.state = match cx.registry.start(header) {
                        Some(routine) => LocalFileState::ExtraParser {
                            routine,
                            header,
                            start: cx.window.absolute_offset(),
                        },
                        None => {
                            tracing::trace!(id = header.id, size, "skipping extra field");
                            LocalFileState::ExtraSkip(Skip::new(size as u64, "extra field"))
                        }
                    };
                }
                LocalFileState::ExtraParser {
                    routine,
                    header,
                    start,
                } => {
                    let patch = step!(routine.resume(cx)?);
                    let used = cx.window.absolute_offset() - *start;
                    let size = header.size as u64;
                    if used > size {
                        return Err(Error::MalformedExtraField {
                            id: header.id,
                            reason: format!("parser read {used} of {size} bytes"),
                        });
                    }
                    if let Some(report) = self.report.as_mut() {
                        report.apply(patch);
                    }
                    self.state = LocalFileState::ExtraSkip(Skip::new(size - used, "extra field"));
                }
                LocalFileState::ExtraSkip(skip) => {
                    step!(skip.resume(cx)?);
                    self.state = LocalFileState::ExtraHeader;
                }
                LocalFileState::Content(content) => {
                    step!(content.resume(cx)?);
                    return Ok(Step::Ready(()));
                }
            }
        }
    }
}

/// Central directory header. Nothing is indexed: the fixed record is read
/// and name, extra field and comment are skipped.
enum CentralDirectory {
    Header,
    Trailing(Skip),
}

impl Routine for CentralDirectory {
    type Output = ();

    fn resume(&mut self, cx: &mut ParseContext<'_>) -> Result<Step<()>> {
        loop {
            match self {
                CentralDirectory::Header => {
                    step!(cx.require(CentralDirectoryHeader::SIZE, "central directory header")?);
                    let header = CentralDirectoryHeader::read(cx.window);
                    tracing::trace!(
                        local_header_offset = header.local_header_offset,
                        name_length = header.name_length,
                        "central directory header"
                    );
                    *self = CentralDirectory::Trailing(Skip::new(
                        header.trailing_length(),
                        "central directory header",
                    ));
                }
                CentralDirectory::Trailing(skip) => {
                    step!(skip.resume(cx)?);
                    return Ok(Step::Ready(()));
                }
            }
        }
    }
}

/// ZIP64 end of central directory record and its extensible data.
enum Zip64End {
    Header,
    Extensible(Skip),
}

impl Routine for Zip64End {
    type Output = ();

    fn resume(&mut self, cx: &mut ParseContext<'_>) -> Result<Step<()>> {
        loop {
            match self {
                Zip64End::Header => {
                    step!(cx.require(Zip64EOCD::SIZE, "zip64 end of central directory")?);
                    let record = Zip64EOCD::read(cx.window);
                    tracing::debug!(
                        entries = record.total_entries,
                        cd_size = record.cd_size,
                        "zip64 end of central directory"
                    );
                    *self = Zip64End::Extensible(Skip::new(
                        record.extensible_data_length(),
                        "zip64 end of central directory",
                    ));
                }
                Zip64End::Extensible(skip) => {
                    step!(skip.resume(cx)?);
                    return Ok(Step::Ready(()));
                }
            }
        }
    }
}

/// End of central directory record and the archive comment.
enum End {
    Header,
    Comment(Skip),
}

impl Routine for End {
    type Output = ();

    fn resume(&mut self, cx: &mut ParseContext<'_>) -> Result<Step<()>> {
        loop {
            match self {
                End::Header => {
                    step!(cx.require(EndOfCentralDirectory::SIZE, "end of central directory")?);
                    let record = EndOfCentralDirectory::read(cx.window);
                    tracing::debug!(
                        entries = record.total_entries,
                        comment_len = record.comment_len,
                        zip64 = record.is_zip64(),
                        "end of central directory"
                    );
                    *self = End::Comment(Skip::new(record.comment_len as u64, "archive comment"));
                }
                End::Comment(skip) => {
                    step!(skip.resume(cx)?);
                    return Ok(Step::Ready(()));
                }
            }
        }
    }
}
