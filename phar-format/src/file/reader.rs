use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use super::{stub_length, PharMetadata, HALT_MARKER};
use crate::{
    de::read_manifest,
    header::ManifestHeader,
    path::PharPath,
    record::FileRecord,
    signature::{self, Signature, SignatureError},
};

#[derive(Debug, thiserror::Error)]
pub enum OpenError {
    #[error("Could not find the end of the stub. Is this an archive? Path: '{}'", .0.display())]
    MissingHaltMarker(PathBuf),

    #[error("The stub length {0} is past the end of the file. Path: '{}'", .1.display())]
    InvalidStubLength(u64, PathBuf),

    #[error("Invalid manifest (the data that describes where all the files are is invalid). Path: '{}'", .1.display())]
    InvalidManifest(#[source] std::io::Error, PathBuf),

    #[error("File data runs past the end of the archive ({needed} > {available} bytes). Path: '{}'", .path.display())]
    Truncated {
        needed: u64,
        available: u64,
        path: PathBuf,
    },

    #[error("Failed to read archive. Path: '{}'", .1.display())]
    ReadFailed(#[source] std::io::Error, PathBuf),
}

/// A read-only view over an archive on disk.
#[derive(Debug)]
pub struct PharReader {
    pub(crate) mmap: Mmap,
    pub(crate) path: PathBuf,
    pub(crate) stub_length: u64,
    pub(crate) payload_end: u64,
    pub(crate) meta: PharMetadata,
}

impl PharReader {
    /// Opens an archive whose stub ends with the standard halt marker.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<PharReader, OpenError> {
        let path = path.as_ref();
        let mmap = map_file(path)?;
        let stub_length = stub_length(&mmap, HALT_MARKER)
            .ok_or_else(|| OpenError::MissingHaltMarker(path.to_path_buf()))?;
        Self::from_mmap(mmap, path, stub_length)
    }

    /// Opens an archive whose manifest starts exactly `stub_length` bytes
    /// into the file.
    pub fn open_at_offset<P: AsRef<Path>>(path: P, stub_length: u64) -> Result<PharReader, OpenError> {
        let path = path.as_ref();
        let mmap = map_file(path)?;
        if stub_length > mmap.len() as u64 {
            return Err(OpenError::InvalidStubLength(stub_length, path.to_path_buf()));
        }

        Self::from_mmap(mmap, path, stub_length)
    }

    fn from_mmap(mmap: Mmap, path: &Path, stub_length: u64) -> Result<PharReader, OpenError> {
        let manifest_start = stub_length as usize;
        let (header, mut records) = read_manifest(&mmap[manifest_start..])
            .map_err(|e| OpenError::InvalidManifest(e, path.to_path_buf()))?;

        let payload_start = stub_length + 4 + header.manifest_length as u64;
        for record in records.iter_mut() {
            record.offset += payload_start;
        }

        let payload_end = payload_start
            + records
                .iter()
                .map(|r| r.compressed_size as u64)
                .sum::<u64>();
        if payload_end > mmap.len() as u64 {
            return Err(OpenError::Truncated {
                needed: payload_end,
                available: mmap.len() as u64,
                path: path.to_path_buf(),
            });
        }

        tracing::debug!(
            stub = stub_length,
            payloads = format_args!("{:#x}..{:#x}", payload_start, payload_end),
            count = records.len(),
            "opened archive"
        );

        Ok(PharReader {
            mmap,
            path: path.to_path_buf(),
            stub_length,
            payload_end,
            meta: PharMetadata { header, records },
        })
    }

    #[inline(always)]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline(always)]
    pub fn stub(&self) -> &[u8] {
        &self.mmap[..self.stub_length as usize]
    }

    #[inline(always)]
    pub fn stub_length(&self) -> u64 {
        self.stub_length
    }

    #[inline(always)]
    pub fn header(&self) -> &ManifestHeader {
        &self.meta.header
    }

    #[inline(always)]
    pub fn metadata(&self) -> &PharMetadata {
        &self.meta
    }

    #[inline(always)]
    pub fn records(&self) -> &[FileRecord] {
        &self.meta.records
    }

    #[inline(always)]
    pub fn record(&self, path: &PharPath) -> Option<&FileRecord> {
        self.meta.record(path)
    }

    /// The whole archive file, stub and trailer included.
    #[inline(always)]
    pub fn bytes(&self) -> &[u8] {
        &self.mmap
    }

    /// Bytes following the last payload, normally the signature trailer.
    #[inline(always)]
    pub fn trailer(&self) -> &[u8] {
        &self.mmap[self.payload_end as usize..]
    }

    /// The payload of `record` as stored.
    #[inline(always)]
    pub fn raw(&self, record: &FileRecord) -> &[u8] {
        let start = record.offset as usize;
        &self.mmap[start..start + record.compressed_size as usize]
    }

    pub fn decompress<W: Write>(&self, record: &FileRecord, dest: W) -> std::io::Result<u64> {
        record.compression().decompress_write(self.raw(record), dest)
    }

    /// Decompressed contents of `record`. The CRC is not checked here.
    pub fn read(&self, record: &FileRecord) -> std::io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(record.uncompressed_size as usize);
        self.decompress(record, &mut out)?;
        Ok(out)
    }

    pub fn signature(&self) -> Result<Signature, SignatureError> {
        if self.trailer().is_empty() {
            return Err(SignatureError::NotSigned);
        }
        signature::split_trailer(&self.mmap).map(|(_, signature)| signature)
    }

    /// See [`signature::verify`].
    pub fn verify(&self, public_key: Option<&[u8]>) -> Result<bool, SignatureError> {
        if self.trailer().is_empty() {
            return Err(SignatureError::NotSigned);
        }
        signature::verify(&self.mmap, public_key)
    }
}

fn map_file(path: &Path) -> Result<Mmap, OpenError> {
    let file = File::open(path).map_err(|e| OpenError::ReadFailed(e, path.to_path_buf()))?;
    let len = file
        .metadata()
        .map_err(|e| OpenError::ReadFailed(e, path.to_path_buf()))?
        .len();
    if len == 0 {
        return Err(OpenError::MissingHaltMarker(path.to_path_buf()));
    }

    // The archive is not expected to change while it is open.
    unsafe { Mmap::map(&file) }.map_err(|e| OpenError::ReadFailed(e, path.to_path_buf()))
}
