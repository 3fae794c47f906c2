use super::window::Window;

/// Record signatures, read as little-endian `u32`.
pub mod magic {
    pub const LOCAL_FILE_HEADER: u32 = 0x04034b50;
    pub const CENTRAL_DIRECTORY_HEADER: u32 = 0x02014b50;
    pub const DATA_DESCRIPTOR: u32 = 0x08074b50;
    pub const END_OF_CENTRAL_DIRECTORY: u32 = 0x06054b50;
    pub const ZIP64_END_OF_CENTRAL_DIRECTORY: u32 = 0x06064b50;
    pub const ZIP64_END_OF_CENTRAL_DIRECTORY_LOCATOR: u32 = 0x07064b50;
}

/// General purpose bit flags.
pub mod bit_flags {
    pub const ENCRYPTED: u16 = 0x0001;
    pub const COMPRESSION_OPTION_1: u16 = 0x0002;
    pub const COMPRESSION_OPTION_2: u16 = 0x0004;
    /// Sizes and CRC follow the content in a data descriptor.
    pub const HAS_DATA_DESCRIPTOR: u16 = 0x0008;
    pub const STRONG_ENCRYPTION: u16 = 0x0040;
    /// Name and comment are UTF-8.
    pub const UTF8_ENCODING: u16 = 0x0800;
    pub const MASK_HEADER_VALUES: u16 = 0x2000;
}

/// ZIP compression methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMethod {
    Stored,
    Shrink,
    Implode,
    Deflate,
    Deflate64,
    Bzip2,
    Lzma,
    Zstd,
    Xz,
    Ppmd,
    Aes,
    Unknown(u16),
}

impl CompressionMethod {
    pub fn from_u16(value: u16) -> Self {
        match value {
            0 => CompressionMethod::Stored,
            1 => CompressionMethod::Shrink,
            6 => CompressionMethod::Implode,
            8 => CompressionMethod::Deflate,
            9 => CompressionMethod::Deflate64,
            12 => CompressionMethod::Bzip2,
            14 => CompressionMethod::Lzma,
            93 => CompressionMethod::Zstd,
            95 => CompressionMethod::Xz,
            98 => CompressionMethod::Ppmd,
            99 => CompressionMethod::Aes,
            _ => CompressionMethod::Unknown(value),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Shrink => 1,
            CompressionMethod::Implode => 6,
            CompressionMethod::Deflate => 8,
            CompressionMethod::Deflate64 => 9,
            CompressionMethod::Bzip2 => 12,
            CompressionMethod::Lzma => 14,
            CompressionMethod::Zstd => 93,
            CompressionMethod::Xz => 95,
            CompressionMethod::Ppmd => 98,
            CompressionMethod::Aes => 99,
            CompressionMethod::Unknown(v) => *v,
        }
    }
}

/// Local File Header - 30 bytes including the signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFileHeader {
    pub version: u16,
    pub bit_flags: u16,
    pub compression_method: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name_length: u16,
    pub extra_length: u16,
}

impl LocalFileHeader {
    /// Size of the record after its signature.
    pub const SIZE: usize = 30 - 4;

    pub fn read(window: &mut Window) -> Self {
        Self {
            version: window.read_u16(),
            bit_flags: window.read_u16(),
            compression_method: window.read_u16(),
            last_mod_time: window.read_u16(),
            last_mod_date: window.read_u16(),
            crc32: window.read_u32(),
            compressed_size: window.read_u32(),
            uncompressed_size: window.read_u32(),
            name_length: window.read_u16(),
            extra_length: window.read_u16(),
        }
    }
}

/// Central Directory File Header - 46 bytes minimum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralDirectoryHeader {
    pub version_made_by: u16,
    pub version_needed: u16,
    pub bit_flags: u16,
    pub compression_method: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub name_length: u16,
    pub extra_length: u16,
    pub comment_length: u16,
    pub disk_number_start: u16,
    pub internal_attributes: u16,
    pub external_attributes: u32,
    pub local_header_offset: u32,
}

impl CentralDirectoryHeader {
    pub const SIZE: usize = 46 - 4;

    pub fn read(window: &mut Window) -> Self {
        Self {
            version_made_by: window.read_u16(),
            version_needed: window.read_u16(),
            bit_flags: window.read_u16(),
            compression_method: window.read_u16(),
            last_mod_time: window.read_u16(),
            last_mod_date: window.read_u16(),
            crc32: window.read_u32(),
            compressed_size: window.read_u32(),
            uncompressed_size: window.read_u32(),
            name_length: window.read_u16(),
            extra_length: window.read_u16(),
            comment_length: window.read_u16(),
            disk_number_start: window.read_u16(),
            internal_attributes: window.read_u16(),
            external_attributes: window.read_u32(),
            local_header_offset: window.read_u32(),
        }
    }

    /// Bytes of name, extra field and comment following the fixed record.
    pub fn trailing_length(&self) -> u64 {
        self.name_length as u64 + self.extra_length as u64 + self.comment_length as u64
    }
}

/// End of Central Directory (EOCD) - 22 bytes minimum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndOfCentralDirectory {
    pub disk_number: u16,
    pub disk_with_cd: u16,
    pub disk_entries: u16,
    pub total_entries: u16,
    pub cd_size: u32,
    pub cd_offset: u32,
    pub comment_len: u16,
}

impl EndOfCentralDirectory {
    pub const SIZE: usize = 22 - 4;

    pub fn read(window: &mut Window) -> Self {
        Self {
            disk_number: window.read_u16(),
            disk_with_cd: window.read_u16(),
            disk_entries: window.read_u16(),
            total_entries: window.read_u16(),
            cd_size: window.read_u32(),
            cd_offset: window.read_u32(),
            comment_len: window.read_u16(),
        }
    }

    pub fn is_zip64(&self) -> bool {
        self.disk_entries == 0xFFFF
            || self.total_entries == 0xFFFF
            || self.cd_size == 0xFFFFFFFF
            || self.cd_offset == 0xFFFFFFFF
    }
}

/// ZIP64 End of Central Directory Locator - 20 bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zip64EOCDLocator {
    pub disk_with_eocd64: u32,
    pub eocd64_offset: u64,
    pub total_disks: u32,
}

impl Zip64EOCDLocator {
    pub const SIZE: usize = 20 - 4;

    pub fn read(window: &mut Window) -> Self {
        Self {
            disk_with_eocd64: window.read_u32(),
            eocd64_offset: window.read_u64(),
            total_disks: window.read_u32(),
        }
    }
}

/// ZIP64 End of Central Directory - 56 bytes minimum
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Zip64EOCD {
    /// Size of the record after this field, extensible data included.
    pub eocd64_size: u64,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub disk_number: u32,
    pub disk_with_cd: u32,
    pub disk_entries: u64,
    pub total_entries: u64,
    pub cd_size: u64,
    pub cd_offset: u64,
}

impl Zip64EOCD {
    pub const SIZE: usize = 56 - 4;
    /// Fixed fields counted by `eocd64_size`.
    pub const FIXED_BODY: u64 = 44;

    pub fn read(window: &mut Window) -> Self {
        Self {
            eocd64_size: window.read_u64(),
            version_made_by: window.read_u16(),
            version_needed: window.read_u16(),
            disk_number: window.read_u32(),
            disk_with_cd: window.read_u32(),
            disk_entries: window.read_u64(),
            total_entries: window.read_u64(),
            cd_size: window.read_u64(),
            cd_offset: window.read_u64(),
        }
    }

    pub fn extensible_data_length(&self) -> u64 {
        self.eocd64_size.saturating_sub(Self::FIXED_BODY)
    }
}

/// Data descriptor sizes, signature included.
pub const DATA_DESCRIPTOR_SIZE: usize = 16;
pub const ZIP64_DATA_DESCRIPTOR_SIZE: usize = 24;

/// Header of one extra field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtraFieldHeader {
    pub id: u16,
    pub size: u16,
}

impl ExtraFieldHeader {
    pub const SIZE: usize = 4;

    pub fn read(window: &mut Window) -> Self {
        Self {
            id: window.read_u16(),
            size: window.read_u16(),
        }
    }
}

/// Metadata accumulated for one entry while its local header is parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryReport {
    pub path: String,
    pub compression_method: CompressionMethod,
    pub bit_flags: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    /// Sizes came from a ZIP64 extra field.
    pub is_zip64: bool,
    /// Size unknown up front; content ends at a data descriptor.
    pub is_streamed: bool,
    /// Unix epoch seconds from the extended timestamp field.
    pub modification_time: Option<u32>,
    pub access_time: Option<u32>,
    pub creation_time: Option<u32>,
    /// Absolute stream offset of the local header signature.
    pub header_offset: u64,
}

impl EntryReport {
    pub fn from_header(header: &LocalFileHeader, path: String, header_offset: u64) -> Self {
        Self {
            path,
            compression_method: CompressionMethod::from_u16(header.compression_method),
            bit_flags: header.bit_flags,
            last_mod_time: header.last_mod_time,
            last_mod_date: header.last_mod_date,
            crc32: header.crc32,
            compressed_size: header.compressed_size as u64,
            uncompressed_size: header.uncompressed_size as u64,
            is_zip64: false,
            is_streamed: header.bit_flags & bit_flags::HAS_DATA_DESCRIPTOR != 0,
            modification_time: None,
            access_time: None,
            creation_time: None,
            header_offset,
        }
    }

    /// Merge the fields an extra-field parser recognized. Later patches win.
    pub fn apply(&mut self, patch: EntryPatch) {
        if let Some(path) = patch.path {
            self.path = path;
        }
        if let Some(size) = patch.compressed_size {
            self.compressed_size = size;
        }
        if let Some(size) = patch.uncompressed_size {
            self.uncompressed_size = size;
        }
        if patch.is_zip64 {
            self.is_zip64 = true;
        }
        if patch.modification_time.is_some() {
            self.modification_time = patch.modification_time;
        }
        if patch.access_time.is_some() {
            self.access_time = patch.access_time;
        }
        if patch.creation_time.is_some() {
            self.creation_time = patch.creation_time;
        }
    }

    /// Zero-length, sized entry whose path ends in a separator.
    pub fn is_directory(&self) -> bool {
        self.uncompressed_size == 0
            && !self.is_streamed
            && (self.path.ends_with('/') || self.path.ends_with('\\'))
    }

    pub fn is_encrypted(&self) -> bool {
        self.bit_flags & bit_flags::ENCRYPTED != 0
    }

    pub fn has_utf8_name(&self) -> bool {
        self.bit_flags & bit_flags::UTF8_ENCODING != 0
    }

    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        let day = (self.last_mod_date & 0x1F) as u8;
        let month = ((self.last_mod_date >> 5) & 0x0F) as u8;
        let year = ((self.last_mod_date >> 9) & 0x7F) + 1980;
        (year, month, day)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        let second = ((self.last_mod_time & 0x1F) * 2) as u8;
        let minute = ((self.last_mod_time >> 5) & 0x3F) as u8;
        let hour = ((self.last_mod_time >> 11) & 0x1F) as u8;
        (hour, minute, second)
    }
}

/// Fields an extra-field parser sets on the entry report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryPatch {
    pub path: Option<String>,
    pub compressed_size: Option<u64>,
    pub uncompressed_size: Option<u64>,
    pub is_zip64: bool,
    pub modification_time: Option<u32>,
    pub access_time: Option<u32>,
    pub creation_time: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(path: &str) -> EntryReport {
        let header = LocalFileHeader {
            version: 20,
            bit_flags: 0,
            compression_method: 8,
            last_mod_time: (13 << 11) | (45 << 5) | 10,
            last_mod_date: (44 << 9) | (6 << 5) | 15,
            crc32: 0xdeadbeef,
            compressed_size: 10,
            uncompressed_size: 0,
            name_length: path.len() as u16,
            extra_length: 0,
        };
        EntryReport::from_header(&header, path.to_string(), 0)
    }

    #[test]
    fn dos_timestamp_decoding() {
        let r = report("a.txt");
        assert_eq!(r.mod_date(), (2024, 6, 15));
        assert_eq!(r.mod_time(), (13, 45, 20));
        assert_eq!(r.compression_method, CompressionMethod::Deflate);
    }

    #[test]
    fn directory_detection() {
        assert!(report("dir/").is_directory());
        assert!(report("dir\\").is_directory());
        assert!(!report("dir").is_directory());

        let mut streamed = report("dir/");
        streamed.is_streamed = true;
        assert!(!streamed.is_directory());
    }

    #[test]
    fn patch_overrides_only_set_fields() {
        let mut r = report("old");
        r.apply(EntryPatch {
            path: Some("new".into()),
            uncompressed_size: Some(1 << 33),
            is_zip64: true,
            ..Default::default()
        });
        assert_eq!(r.path, "new");
        assert_eq!(r.uncompressed_size, 1 << 33);
        assert_eq!(r.compressed_size, 10);
        assert!(r.is_zip64);
        assert_eq!(r.modification_time, None);
    }
}
