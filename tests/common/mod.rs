//! Archive builder and collection helpers shared by the integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::sync::Arc;

use byteorder::{LittleEndian, WriteBytesExt};
use flate2::Compression;
use flate2::write::DeflateEncoder;

use streamzip::{Entry, EntryReport, Error, SliceSource, StreamExtractor};

pub const LOCAL_FILE_HEADER: u32 = 0x04034b50;
pub const CENTRAL_DIRECTORY_HEADER: u32 = 0x02014b50;
pub const DATA_DESCRIPTOR: u32 = 0x08074b50;
pub const END_OF_CENTRAL_DIRECTORY: u32 = 0x06054b50;
pub const ZIP64_END_OF_CENTRAL_DIRECTORY: u32 = 0x06064b50;
pub const ZIP64_LOCATOR: u32 = 0x07064b50;

pub const DOS_TIME: u16 = (13 << 11) | (37 << 5) | 5;
pub const DOS_DATE: u16 = ((2024 - 1980) << 9) | (6 << 5) | 15;

pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = flate2::Crc::new();
    crc.update(data);
    crc.sum()
}

pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// One entry as it will be written to the archive.
#[derive(Clone)]
pub struct FileEntry {
    pub name: Vec<u8>,
    /// Bytes stored in the archive, compressed when `method` says so.
    pub payload: Vec<u8>,
    pub method: u16,
    pub crc32: u32,
    pub uncompressed_size: u64,
    pub streamed: bool,
    pub zip64: bool,
    pub extra: Vec<u8>,
}

impl FileEntry {
    pub fn stored(name: &str, data: &[u8]) -> Self {
        Self {
            name: name.as_bytes().to_vec(),
            payload: data.to_vec(),
            method: 0,
            crc32: crc32(data),
            uncompressed_size: data.len() as u64,
            streamed: false,
            zip64: false,
            extra: Vec::new(),
        }
    }

    pub fn deflated(name: &str, data: &[u8]) -> Self {
        Self {
            payload: deflate(data),
            method: 8,
            ..Self::stored(name, data)
        }
    }

    pub fn directory(name: &str) -> Self {
        Self::stored(name, b"")
    }

    /// Sizes and CRC go to a data descriptor after the content.
    pub fn streamed(mut self) -> Self {
        self.streamed = true;
        self
    }

    /// Sizes go to a ZIP64 extra field.
    pub fn zip64(mut self) -> Self {
        self.zip64 = true;
        self
    }

    pub fn with_extra(mut self, id: u16, data: &[u8]) -> Self {
        self.extra.write_u16::<LittleEndian>(id).unwrap();
        self.extra
            .write_u16::<LittleEndian>(data.len() as u16)
            .unwrap();
        self.extra.extend_from_slice(data);
        self
    }

    fn flags(&self) -> u16 {
        if self.streamed { 0x0008 } else { 0 }
    }

    /// Extra area as written to the local header.
    fn local_extra(&self) -> Vec<u8> {
        let mut extra = Vec::new();
        if self.zip64 {
            let (uncompressed, compressed) = if self.streamed {
                (0, 0)
            } else {
                (self.uncompressed_size, self.payload.len() as u64)
            };
            extra.write_u16::<LittleEndian>(0x0001).unwrap();
            extra.write_u16::<LittleEndian>(16).unwrap();
            extra.write_u64::<LittleEndian>(uncompressed).unwrap();
            extra.write_u64::<LittleEndian>(compressed).unwrap();
        }
        extra.extend_from_slice(&self.extra);
        extra
    }

    /// Sizes and CRC for the fixed header fields.
    fn header_values(&self) -> (u32, u32, u32) {
        if self.streamed {
            (0, 0, 0)
        } else if self.zip64 {
            (self.crc32, u32::MAX, u32::MAX)
        } else {
            (
                self.crc32,
                self.payload.len() as u32,
                self.uncompressed_size as u32,
            )
        }
    }
}

/// Writes local entries, then a central directory and end record.
#[derive(Default)]
pub struct ArchiveBuilder {
    out: Vec<u8>,
    central: Vec<u8>,
    count: u16,
}

impl ArchiveBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, entry: &FileEntry) -> &mut Self {
        let offset = self.out.len() as u32;
        let extra = entry.local_extra();
        let (crc, compressed, uncompressed) = entry.header_values();

        let out = &mut self.out;
        out.write_u32::<LittleEndian>(LOCAL_FILE_HEADER).unwrap();
        out.write_u16::<LittleEndian>(if entry.zip64 { 45 } else { 20 })
            .unwrap();
        out.write_u16::<LittleEndian>(entry.flags()).unwrap();
        out.write_u16::<LittleEndian>(entry.method).unwrap();
        out.write_u16::<LittleEndian>(DOS_TIME).unwrap();
        out.write_u16::<LittleEndian>(DOS_DATE).unwrap();
        out.write_u32::<LittleEndian>(crc).unwrap();
        out.write_u32::<LittleEndian>(compressed).unwrap();
        out.write_u32::<LittleEndian>(uncompressed).unwrap();
        out.write_u16::<LittleEndian>(entry.name.len() as u16)
            .unwrap();
        out.write_u16::<LittleEndian>(extra.len() as u16).unwrap();
        out.extend_from_slice(&entry.name);
        out.extend_from_slice(&extra);
        out.extend_from_slice(&entry.payload);

        if entry.streamed {
            out.write_u32::<LittleEndian>(DATA_DESCRIPTOR).unwrap();
            out.write_u32::<LittleEndian>(entry.crc32).unwrap();
            if entry.zip64 {
                out.write_u64::<LittleEndian>(entry.payload.len() as u64)
                    .unwrap();
                out.write_u64::<LittleEndian>(entry.uncompressed_size)
                    .unwrap();
            } else {
                out.write_u32::<LittleEndian>(entry.payload.len() as u32)
                    .unwrap();
                out.write_u32::<LittleEndian>(entry.uncompressed_size as u32)
                    .unwrap();
            }
        }

        let cd = &mut self.central;
        cd.write_u32::<LittleEndian>(CENTRAL_DIRECTORY_HEADER).unwrap();
        cd.write_u16::<LittleEndian>(0x031e).unwrap();
        cd.write_u16::<LittleEndian>(20).unwrap();
        cd.write_u16::<LittleEndian>(entry.flags()).unwrap();
        cd.write_u16::<LittleEndian>(entry.method).unwrap();
        cd.write_u16::<LittleEndian>(DOS_TIME).unwrap();
        cd.write_u16::<LittleEndian>(DOS_DATE).unwrap();
        cd.write_u32::<LittleEndian>(entry.crc32).unwrap();
        cd.write_u32::<LittleEndian>(entry.payload.len() as u32)
            .unwrap();
        cd.write_u32::<LittleEndian>(entry.uncompressed_size as u32)
            .unwrap();
        cd.write_u16::<LittleEndian>(entry.name.len() as u16).unwrap();
        cd.write_u16::<LittleEndian>(0).unwrap();
        cd.write_u16::<LittleEndian>(7).unwrap();
        cd.write_u16::<LittleEndian>(0).unwrap();
        cd.write_u16::<LittleEndian>(0).unwrap();
        cd.write_u32::<LittleEndian>(0o100644 << 16).unwrap();
        cd.write_u32::<LittleEndian>(offset).unwrap();
        cd.extend_from_slice(&entry.name);
        cd.extend_from_slice(b"comment");

        self.count += 1;
        self
    }

    /// Bytes written as is at the current position.
    pub fn raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.out.extend_from_slice(bytes);
        self
    }

    /// Local entries only, nothing after them.
    pub fn local_only(&self) -> Vec<u8> {
        self.out.clone()
    }

    pub fn finish(&self) -> Vec<u8> {
        let mut out = self.out.clone();
        let cd_offset = out.len() as u32;
        out.extend_from_slice(&self.central);
        write_eocd(
            &mut out,
            self.count,
            self.central.len() as u32,
            cd_offset,
            b"archive comment",
        );
        out
    }

    /// Central directory followed by ZIP64 end records.
    pub fn finish_zip64(&self) -> Vec<u8> {
        let mut out = self.out.clone();
        let cd_offset = out.len() as u64;
        out.extend_from_slice(&self.central);

        let eocd64_offset = out.len() as u64;
        let extensible = b"extensible data";
        out.write_u32::<LittleEndian>(ZIP64_END_OF_CENTRAL_DIRECTORY)
            .unwrap();
        out.write_u64::<LittleEndian>(44 + extensible.len() as u64)
            .unwrap();
        out.write_u16::<LittleEndian>(45).unwrap();
        out.write_u16::<LittleEndian>(45).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_u64::<LittleEndian>(self.count as u64).unwrap();
        out.write_u64::<LittleEndian>(self.count as u64).unwrap();
        out.write_u64::<LittleEndian>(self.central.len() as u64)
            .unwrap();
        out.write_u64::<LittleEndian>(cd_offset).unwrap();
        out.extend_from_slice(extensible);

        out.write_u32::<LittleEndian>(ZIP64_LOCATOR).unwrap();
        out.write_u32::<LittleEndian>(0).unwrap();
        out.write_u64::<LittleEndian>(eocd64_offset).unwrap();
        out.write_u32::<LittleEndian>(1).unwrap();

        write_eocd(&mut out, 0xFFFF, u32::MAX, u32::MAX, b"");
        out
    }
}

pub fn write_eocd(out: &mut Vec<u8>, count: u16, cd_size: u32, cd_offset: u32, comment: &[u8]) {
    out.write_u32::<LittleEndian>(END_OF_CENTRAL_DIRECTORY).unwrap();
    out.write_u16::<LittleEndian>(0).unwrap();
    out.write_u16::<LittleEndian>(0).unwrap();
    out.write_u16::<LittleEndian>(count).unwrap();
    out.write_u16::<LittleEndian>(count).unwrap();
    out.write_u32::<LittleEndian>(cd_size).unwrap();
    out.write_u32::<LittleEndian>(cd_offset).unwrap();
    out.write_u16::<LittleEndian>(comment.len() as u16).unwrap();
    out.extend_from_slice(comment);
}

/// A bare end of central directory record.
pub fn empty_archive() -> Vec<u8> {
    let mut out = Vec::new();
    write_eocd(&mut out, 0, 0, 0, b"");
    out
}

/// Everything an extraction produced, in archive order.
#[derive(Default)]
pub struct Collected {
    pub directories: Vec<EntryReport>,
    pub files: Vec<(EntryReport, Vec<u8>)>,
    /// Errors delivered through entry streams.
    pub stream_errors: Vec<Error>,
}

impl Collected {
    pub fn file(&self, path: &str) -> &(EntryReport, Vec<u8>) {
        self.files
            .iter()
            .find(|(report, _)| report.path == path)
            .unwrap_or_else(|| panic!("no file entry {path}"))
    }
}

/// Run `extractor` over `data` delivered in `chunk`-sized pieces, reading
/// each entry to the end before looking at the next.
pub async fn extract_with(
    extractor: &Arc<StreamExtractor>,
    data: Vec<u8>,
    chunk: usize,
    decode: bool,
) -> (Collected, streamzip::Result<()>) {
    let (mut entries, task) = extractor
        .spawn(SliceSource::new(data, chunk))
        .expect("extractor is idle");
    let mut collected = Collected::default();

    while let Some(entry) = entries.recv().await {
        match entry {
            Entry::Directory(report) => collected.directories.push(report),
            Entry::File(report, stream) => {
                let content = if decode {
                    match stream.decode(report.compression_method) {
                        Ok(decoded) => decoded.read_to_end().await,
                        Err(e) => Err(e),
                    }
                } else {
                    stream.read_to_end().await
                };
                match content {
                    Ok(bytes) => collected.files.push((report, bytes)),
                    Err(e) => {
                        collected.stream_errors.push(e);
                        collected.files.push((report, Vec::new()));
                    }
                }
            }
        }
    }

    let result = task.await.expect("extractor task panicked");
    (collected, result)
}

pub async fn extract(data: Vec<u8>, chunk: usize) -> (Collected, streamzip::Result<()>) {
    extract_with(&Arc::new(StreamExtractor::new()), data, chunk, false).await
}
