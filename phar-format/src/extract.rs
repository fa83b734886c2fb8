//! Locating the end of the stub and unpacking an archive to disk.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use memmap2::Mmap;

use crate::file::{reader::OpenError, stub_length, HALT_MARKER};
use crate::{path::PharPath, PharReader};

/// Pattern searched for when none is given.
pub const DEFAULT_PATTERN: &[u8] = HALT_MARKER;

#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("Could not find `{pattern}` in file. Path: '{}'", .path.display())]
    PatternNotFound { pattern: String, path: PathBuf },

    #[error("Could not read file. Path: '{}'", .1.display())]
    ReadFailed(#[source] std::io::Error, PathBuf),

    #[error(transparent)]
    Open(#[from] OpenError),

    #[error("Could not create temporary directory")]
    TempDirFailed(#[source] std::io::Error),

    #[error("Could not create directory. Path: '{}'", .1.display())]
    CreateDirFailed(#[source] std::io::Error, PathBuf),

    #[error("Could not create file. Path: '{}'", .1.display())]
    CreateFileFailed(#[source] std::io::Error, PathBuf),

    #[error("Could not decompress `{1}`")]
    DecompressFailed(#[source] std::io::Error, PharPath),

    #[error("Checksum mismatch for `{path}` (expected {expected:#010x}, got {actual:#010x})")]
    ChecksumMismatch {
        path: PharPath,
        expected: u32,
        actual: u32,
    },

    #[error("Could not remove file. Path: '{}'", .1.display())]
    RemoveFailed(#[source] std::io::Error, PathBuf),
}

/// Returns the offset right after the first occurrence of `pattern` (the halt
/// marker by default), including one following line break.
pub fn find_stub_length<P: AsRef<Path>>(path: P, pattern: Option<&[u8]>) -> Result<u64, ExtractError> {
    let path = path.as_ref();
    let pattern = pattern.unwrap_or(DEFAULT_PATTERN);
    let not_found = || ExtractError::PatternNotFound {
        pattern: String::from_utf8_lossy(pattern).into_owned(),
        path: path.to_path_buf(),
    };

    let file = File::open(path).map_err(|e| ExtractError::ReadFailed(e, path.to_path_buf()))?;
    let len = file
        .metadata()
        .map_err(|e| ExtractError::ReadFailed(e, path.to_path_buf()))?
        .len();
    if len == 0 {
        return Err(not_found());
    }

    let mmap = unsafe { Mmap::map(&file) }.map_err(|e| ExtractError::ReadFailed(e, path.to_path_buf()))?;
    let offset = stub_length(&mmap, pattern).ok_or_else(not_found)?;
    tracing::debug!(offset, path = %path.display(), "found end of stub");
    Ok(offset)
}

/// Unpacks every entry of the archive at `path` into `destination`, or into a
/// fresh temporary directory when none is given. Returns the directory used.
///
/// An existing destination is written into, never cleared.
pub fn extract<P: AsRef<Path>>(
    path: P,
    stub_length: u64,
    destination: Option<&Path>,
) -> Result<PathBuf, ExtractError> {
    let reader = PharReader::open_at_offset(path.as_ref(), stub_length)?;

    match destination {
        Some(dir) => {
            fs::create_dir_all(dir).map_err(|e| ExtractError::CreateDirFailed(e, dir.to_path_buf()))?;
            extract_all(&reader, dir)?;
            Ok(dir.to_path_buf())
        }
        None => extract_to_temp(&reader, &std::env::temp_dir()),
    }
}

/// Unpacks into a new directory below `parent`. The directory is removed
/// again if unpacking fails.
fn extract_to_temp(reader: &PharReader, parent: &Path) -> Result<PathBuf, ExtractError> {
    let dir = tempfile::Builder::new()
        .prefix("pharbox-")
        .tempdir_in(parent)
        .map_err(ExtractError::TempDirFailed)?;

    extract_all(reader, dir.path())?;
    Ok(dir.into_path())
}

/// Unpacks every entry of an open archive beneath `destination`.
pub fn extract_all(reader: &PharReader, destination: &Path) -> Result<(), ExtractError> {
    for record in reader.records() {
        let target = destination.join(record.path().to_path_buf());

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| ExtractError::CreateDirFailed(e, parent.to_path_buf()))?;
        }

        let contents = reader
            .read(record)
            .map_err(|e| ExtractError::DecompressFailed(e, record.path().clone()))?;

        let actual = crc32fast::hash(&contents);
        if actual != record.crc32 {
            return Err(ExtractError::ChecksumMismatch {
                path: record.path().clone(),
                expected: record.crc32,
                actual,
            });
        }

        let file = File::create(&target)
            .map_err(|e| ExtractError::CreateFileFailed(e, target.clone()))?;
        let mut writer = BufWriter::new(file);
        writer
            .write_all(&contents)
            .and_then(|_| writer.flush())
            .map_err(|e| ExtractError::CreateFileFailed(e, target.clone()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = record.permissions();
            if mode != 0 {
                fs::set_permissions(&target, fs::Permissions::from_mode(mode))
                    .map_err(|e| ExtractError::CreateFileFailed(e, target.clone()))?;
            }
        }

        tracing::debug!(path = %record.path(), bytes = contents.len(), "extracted");
    }

    tracing::info!(
        count = reader.records().len(),
        destination = %destination.display(),
        "extracted archive"
    );
    Ok(())
}

/// Removes `path` recursively. A path that does not exist is not an error.
pub fn purge<P: AsRef<Path>>(path: P) -> Result<(), ExtractError> {
    let path = path.as_ref();
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(ExtractError::RemoveFailed(e, path.to_path_buf())),
    };

    if meta.is_dir() {
        let entries =
            fs::read_dir(path).map_err(|e| ExtractError::RemoveFailed(e, path.to_path_buf()))?;
        for entry in entries {
            let entry = entry.map_err(|e| ExtractError::RemoveFailed(e, path.to_path_buf()))?;
            purge(entry.path())?;
        }
        fs::remove_dir(path).map_err(|e| ExtractError::RemoveFailed(e, path.to_path_buf()))
    } else {
        fs::remove_file(path).map_err(|e| ExtractError::RemoveFailed(e, path.to_path_buf()))
    }
}
