use std::path::{Path, PathBuf};

use phar_format::{PharPath, PharWriter};

use crate::compactor::Compactors;
use crate::config::Config;
use crate::error::{BuildError, Result};
use crate::mapper::PathMapper;

/// File contents ready to be staged: mapped, read and compacted.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub path: PharPath,
    pub source: PathBuf,
    pub contents: Vec<u8>,
    pub permissions: u32,
}

/// A [`PharWriter`] that knows how to turn files on disk into entries.
///
/// [`load`](Archive::load) only borrows the archive, so files can be loaded
/// in parallel and then staged in order with [`insert`](Archive::insert).
#[derive(Debug, Default)]
pub struct Archive {
    writer: PharWriter,
    mapper: PathMapper,
    compactors: Compactors,
}

impl Archive {
    pub fn new(mapper: PathMapper, compactors: Compactors) -> Archive {
        Archive {
            writer: PharWriter::new(),
            mapper,
            compactors,
        }
    }

    pub fn from_config(config: &Config) -> Result<Archive> {
        let mapper = PathMapper::new(config.map.clone())?;
        let compactors = Compactors::from_config(config)?;
        Ok(Archive::new(mapper, compactors))
    }

    /// The archive path for a base-relative `local` path.
    pub fn map(&self, local: &str) -> Result<PharPath> {
        let mapped = self.mapper.map(local);
        PharPath::new(&mapped).map_err(|source| BuildError::InvalidPath {
            path: mapped,
            source,
        })
    }

    /// Reads `source` and prepares it for the archive. Binary files are never
    /// compacted.
    pub fn load(&self, source: &Path, local: &str, binary: bool) -> Result<Loaded> {
        let path = self.map(local)?;
        let read_error = |e| BuildError::Read {
            path: source.to_path_buf(),
            source: e,
        };

        let contents = std::fs::read(source).map_err(read_error)?;
        let permissions = std::fs::metadata(source)
            .map(|meta| phar_format::fs::permissions(&meta))
            .map_err(read_error)?;

        let contents = if binary {
            contents
        } else {
            self.compactors.compact(&path, contents)?
        };

        tracing::debug!(%path, binary, bytes = contents.len(), "loaded");
        Ok(Loaded {
            path,
            source: source.to_path_buf(),
            contents,
            permissions,
        })
    }

    /// Stages a loaded file. Paths are unique: a second file mapped to the
    /// same archive path is a conflict.
    pub fn insert(&mut self, loaded: Loaded) -> Result<&PharPath> {
        let entry = self.writer.add_entry_from_source(
            loaded.path,
            loaded.source,
            loaded.contents,
            loaded.permissions,
        )?;
        Ok(&entry.path)
    }

    pub fn add_entry_from_file(&mut self, source: &Path, local: &str, binary: bool) -> Result<&PharPath> {
        let loaded = self.load(source, local, binary)?;
        self.insert(loaded)
    }

    /// Stages in-memory contents as they are.
    pub fn add_entry(&mut self, local: &str, contents: Vec<u8>, permissions: u32) -> Result<&PharPath> {
        let path = self.map(local)?;
        let entry = self.writer.add_entry(path, contents, permissions)?;
        Ok(&entry.path)
    }

    pub fn compactors(&self) -> &Compactors {
        &self.compactors
    }

    pub fn writer(&self) -> &PharWriter {
        &self.writer
    }

    pub fn into_writer(self) -> PharWriter {
        self.writer
    }
}
