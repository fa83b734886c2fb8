use crate::{header::ManifestHeader, path::PharPath, record::FileRecord};

#[derive(Debug, Default)]
pub struct PharMetadata {
    pub(crate) header: ManifestHeader,

    /// Records in manifest order. Offsets are absolute within the archive file.
    pub(crate) records: Vec<FileRecord>,
}

impl PharMetadata {
    #[inline(always)]
    pub fn header(&self) -> &ManifestHeader {
        &self.header
    }

    #[inline(always)]
    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    #[inline(always)]
    pub fn record(&self, path: &PharPath) -> Option<&FileRecord> {
        self.records.iter().find(|r| r.path() == path)
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Archive-level metadata decoded as JSON.
    pub fn json(&self) -> Option<serde_json::Result<serde_json::Value>> {
        self.header.metadata().map(serde_json::from_slice)
    }

    /// Sum of the sizes of all entries once decompressed.
    pub fn uncompressed_size(&self) -> u64 {
        self.records.iter().map(|r| r.uncompressed_size as u64).sum()
    }

    /// Sum of the sizes of all entry payloads as stored.
    pub fn compressed_size(&self) -> u64 {
        self.records.iter().map(|r| r.compressed_size as u64).sum()
    }
}
