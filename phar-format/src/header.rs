/// The manifest API version written by this library (1.1.1).
pub const API_VERSION: u16 = 0x1110;

pub mod flags {
    pub const SIGNED: u32 = 0x0001_0000;
    pub const HAS_GZ: u32 = 0x0000_1000;
    pub const HAS_BZ2: u32 = 0x0000_2000;
    pub const PERMISSIONS_MASK: u32 = 0x0000_01FF;
}

/// Fixed-size leading part of the manifest plus the archive-wide fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestHeader {
    pub(crate) manifest_length: u32,
    pub(crate) entry_count: u32,
    pub(crate) api_version: u16,
    pub(crate) flags: u32,
    pub(crate) alias: String,
    pub(crate) metadata: Vec<u8>,
}

impl ManifestHeader {
    pub(crate) fn new(entry_count: u32, flags: u32, alias: String, metadata: Vec<u8>) -> Self {
        ManifestHeader {
            manifest_length: 0,
            entry_count,
            api_version: API_VERSION,
            flags,
            alias,
            metadata,
        }
    }

    pub fn entry_count(&self) -> u32 {
        self.entry_count
    }

    pub fn manifest_length(&self) -> u32 {
        self.manifest_length
    }

    /// Version formatted as `major.minor.patch`.
    pub fn api_version(&self) -> String {
        let v = self.api_version;
        format!("{}.{}.{}", v >> 12, (v >> 8) & 0xF, (v >> 4) & 0xF)
    }

    pub fn is_signed(&self) -> bool {
        self.flags & flags::SIGNED != 0
    }

    pub fn flags(&self) -> u32 {
        self.flags
    }

    pub fn alias(&self) -> Option<&str> {
        if self.alias.is_empty() {
            None
        } else {
            Some(&self.alias)
        }
    }

    /// Raw archive-level metadata, as stored.
    pub fn metadata(&self) -> Option<&[u8]> {
        if self.metadata.is_empty() {
            None
        } else {
            Some(&self.metadata)
        }
    }
}

impl Default for ManifestHeader {
    fn default() -> Self {
        ManifestHeader::new(0, flags::SIGNED, String::new(), vec![])
    }
}
