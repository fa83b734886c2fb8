use crate::{compression::Compression, header::flags, path::PharPath};

/// A manifest entry as stored in (or read from) an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// The path of the file. A path is always relative (no leading separator),
    /// always delimited by `/`, and may not contain any `.` or `..` path chunks.
    pub path: PharPath,

    /// The exact length of the contents once decompressed.
    pub uncompressed_size: u32,

    /// Seconds since the unix epoch.
    pub timestamp: u32,

    /// The exact length of the payload as written.
    pub compressed_size: u32,

    /// CRC32 of the uncompressed contents.
    pub crc32: u32,

    /// Permission bits and compression flags.
    pub flags: u32,

    /// Per-entry metadata, empty unless set by another producer.
    pub metadata: Vec<u8>,

    /// Absolute position of the payload within the archive file. Only known
    /// once an archive has been read back.
    pub offset: u64,
}

impl FileRecord {
    #[inline(always)]
    pub fn compression(&self) -> Compression {
        Compression::from_flags(self.flags)
    }

    #[inline(always)]
    pub fn permissions(&self) -> u32 {
        self.flags & flags::PERMISSIONS_MASK
    }

    #[inline(always)]
    pub fn path(&self) -> &PharPath {
        &self.path
    }

    #[inline(always)]
    pub fn is_compressed(&self) -> bool {
        self.compression() != Compression::None
    }
}
