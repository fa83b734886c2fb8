use std::borrow::Cow;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::{
    compression::Compression,
    header::{flags, ManifestHeader},
    path::PharPath,
    record::FileRecord,
    ser::{Manifest, Serialize},
};

use super::{normalize_stub, DEFAULT_STUB};

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("The archive already contains an entry for `{0}`.")]
    FileConflict(PharPath),

    #[error("Archive metadata must be a scalar, an array or an object, not null.")]
    InvalidMetadata,

    #[error("The stub does not contain `__HALT_COMPILER();`.")]
    InvalidStub,

    #[error("Entry `{0}` is too large for the archive format ({1} bytes).")]
    TooLarge(PharPath, usize),

    #[error("Compressing `{1}` with {2} failed.")]
    CompressionFailed(#[source] std::io::Error, PharPath, Compression),

    #[error("Serializing the manifest failed.")]
    ManifestFailed(#[source] std::io::Error),
}

/// A file staged for writing.
#[derive(Debug, Clone)]
pub struct Entry {
    pub path: PharPath,

    /// Where the contents were read from, if anywhere.
    pub source: Option<PathBuf>,

    pub contents: Vec<u8>,

    /// Unix permission bits.
    pub permissions: u32,

    pub compression: Compression,
}

/// Accumulates entries in memory and serializes them into an unsigned
/// archive. Signing is a separate step over the finalized bytes.
#[derive(Debug, Default)]
pub struct PharWriter {
    stub: Option<Vec<u8>>,
    alias: String,
    metadata: Vec<u8>,
    file_mode: Option<u32>,
    timestamp: u32,
    compression: Compression,
    entries: Vec<Entry>,
    index: HashSet<PharPath>,
}

impl PharWriter {
    pub fn new() -> PharWriter {
        PharWriter::default()
    }

    /// Stages `contents` at `path`. Paths are unique within an archive.
    pub fn add_entry(
        &mut self,
        path: PharPath,
        contents: Vec<u8>,
        permissions: u32,
    ) -> Result<&Entry, WriteError> {
        self.insert(path, None, contents, permissions)
    }

    /// Like [`add_entry`](Self::add_entry), remembering where the contents
    /// came from.
    pub fn add_entry_from_source<P: AsRef<Path>>(
        &mut self,
        path: PharPath,
        source: P,
        contents: Vec<u8>,
        permissions: u32,
    ) -> Result<&Entry, WriteError> {
        self.insert(path, Some(source.as_ref().to_path_buf()), contents, permissions)
    }

    fn insert(
        &mut self,
        path: PharPath,
        source: Option<PathBuf>,
        contents: Vec<u8>,
        permissions: u32,
    ) -> Result<&Entry, WriteError> {
        if !self.index.insert(path.clone()) {
            return Err(WriteError::FileConflict(path));
        }

        tracing::trace!(%path, bytes = contents.len(), "staged entry");

        self.entries.push(Entry {
            path,
            source,
            contents,
            permissions: permissions & flags::PERMISSIONS_MASK,
            compression: self.compression,
        });

        let idx = self.entries.len() - 1;
        Ok(&self.entries[idx])
    }

    pub fn contains(&self, path: &PharPath) -> bool {
        self.index.contains(path)
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sets the stub. It must contain `__HALT_COMPILER();`; anything after the
    /// token is dropped when the archive is finalized.
    pub fn set_stub<B: Into<Vec<u8>>>(&mut self, stub: B) -> Result<(), WriteError> {
        let stub = stub.into();
        if normalize_stub(&stub).is_none() {
            return Err(WriteError::InvalidStub);
        }
        self.stub = Some(stub);
        Ok(())
    }

    pub fn stub(&self) -> &[u8] {
        self.stub.as_deref().unwrap_or(DEFAULT_STUB)
    }

    pub fn set_alias<S: Into<String>>(&mut self, alias: S) {
        self.alias = alias.into();
    }

    pub fn alias(&self) -> Option<&str> {
        if self.alias.is_empty() {
            None
        } else {
            Some(&self.alias)
        }
    }

    /// Sets the archive-level metadata, stored as JSON.
    pub fn set_metadata(&mut self, value: &serde_json::Value) -> Result<(), WriteError> {
        if value.is_null() {
            return Err(WriteError::InvalidMetadata);
        }
        self.metadata = serde_json::to_vec(value).map_err(|_| WriteError::InvalidMetadata)?;
        Ok(())
    }

    /// Overrides the permission bits of every entry.
    pub fn set_file_mode(&mut self, mode: u32) {
        self.file_mode = Some(mode & flags::PERMISSIONS_MASK);
    }

    /// Timestamp recorded for every entry. Defaults to zero so that identical
    /// inputs produce identical archives.
    pub fn set_timestamp(&mut self, timestamp: u32) {
        self.timestamp = timestamp;
    }

    /// Marks every entry staged so far, and every entry staged afterwards,
    /// for compression with `compression`.
    pub fn compress(&mut self, compression: Compression) {
        self.compression = compression;
        for entry in self.entries.iter_mut() {
            entry.compression = compression;
        }
    }

    /// Serializes stub, manifest and payloads. The result carries no
    /// signature trailer yet.
    pub fn finalize(&self) -> Result<Vec<u8>, WriteError> {
        let stub = normalize_stub(self.stub()).ok_or(WriteError::InvalidStub)?;

        let mut archive_flags = flags::SIGNED;
        let mut records = Vec::with_capacity(self.entries.len());
        let mut payloads = Vec::with_capacity(self.entries.len());
        let mut offset = 0u64;

        for entry in &self.entries {
            let too_large = |len| WriteError::TooLarge(entry.path.clone(), len);
            let uncompressed_size =
                u32::try_from(entry.contents.len()).map_err(|_| too_large(entry.contents.len()))?;

            let payload: Cow<'_, [u8]> = match entry.compression {
                Compression::None => Cow::Borrowed(entry.contents.as_slice()),
                compression => Cow::Owned(compression.compress(&entry.contents).map_err(|e| {
                    WriteError::CompressionFailed(e, entry.path.clone(), compression)
                })?),
            };
            let compressed_size =
                u32::try_from(payload.len()).map_err(|_| too_large(payload.len()))?;

            archive_flags |= entry.compression.id();

            let permissions = self.file_mode.unwrap_or(entry.permissions);
            records.push(FileRecord {
                path: entry.path.clone(),
                uncompressed_size,
                timestamp: self.timestamp,
                compressed_size,
                crc32: crc32fast::hash(&entry.contents),
                flags: permissions | entry.compression.id(),
                metadata: vec![],
                offset,
            });
            offset += compressed_size as u64;

            payloads.push(payload);
        }

        let header = ManifestHeader::new(
            self.entries.len() as u32,
            archive_flags,
            self.alias.clone(),
            self.metadata.clone(),
        );

        let mut out = Vec::with_capacity(stub.len() + offset as usize + 1024);
        out.extend_from_slice(&stub);
        let manifest_start = out.len();
        Manifest {
            header: &header,
            records: &records,
        }
        .write(&mut out)
        .map_err(WriteError::ManifestFailed)?;
        let manifest_end = out.len();

        for payload in payloads {
            out.extend_from_slice(&payload);
        }

        tracing::debug!(
            stub = stub.len(),
            manifest = manifest_end - manifest_start,
            payloads = offset,
            count = records.len(),
            "finalized archive"
        );

        Ok(out)
    }
}
