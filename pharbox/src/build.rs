//! The build pipeline: collect, load, stage, stub, compress, sign, write.

use std::path::{Path, PathBuf};

use phar_format::signature::{self, PrivateKey, Signature};
use phar_format::Algorithm;
use rayon::prelude::*;

use crate::archive::{Archive, Loaded};
use crate::collector::{self, CollectedFile};
use crate::config::{Config, StubSource};
use crate::error::{BuildError, CollectError, Origin, Result};
use crate::stub::{StubGenerator, REQUIREMENT_CHECKER};

#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    /// Load and compact files on the current thread only.
    pub serial: bool,
}

/// What a successful build produced.
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub output: PathBuf,
    pub entries: usize,
    pub size: u64,
    pub signature: Signature,
    /// Written next to the archive for OpenSSL signatures.
    pub public_key: Option<PathBuf>,
}

fn load_all(archive: &Archive, files: &[(&CollectedFile, bool)], serial: bool) -> Result<Vec<Loaded>> {
    let load = |(file, binary): &(&CollectedFile, bool)| archive.load(&file.source, &file.local, *binary);

    if serial {
        files.iter().map(load).collect()
    } else {
        files.par_iter().map(load).collect()
    }
}

/// Drops a leading `#!` line; the stub carries its own.
fn strip_shebang(contents: Vec<u8>) -> Vec<u8> {
    if !contents.starts_with(b"#!") {
        return contents;
    }

    match contents.iter().position(|b| *b == b'\n') {
        Some(nl) => contents[nl + 1..].to_vec(),
        None => vec![],
    }
}

/// Stages the main script and returns its archive path.
fn add_main(archive: &mut Archive, config: &Config, main: &Path) -> Result<String> {
    let local = config
        .local_path(main)
        .filter(|local| !local.is_empty())
        .ok_or_else(|| CollectError::OutsideBase {
            path: main.to_path_buf(),
            base: config.base_path.clone(),
        })?;

    std::fs::symlink_metadata(main).map_err(|source| BuildError::Read {
        path: main.to_path_buf(),
        source,
    })?;
    if let Some(path) = collector::symlinked_component(&config.base_path, main) {
        return Err(CollectError::Symlink {
            path,
            origin: Origin::File,
        }
        .into());
    }

    let mut loaded = archive.load(main, &local, true)?;
    let contents = strip_shebang(std::mem::take(&mut loaded.contents));
    loaded.contents = archive.compactors().compact(&loaded.path, contents)?;

    let path = archive.insert(loaded)?;
    tracing::debug!(%path, "added main script");
    Ok(path.to_string())
}

fn stub(config: &Config, index: Option<String>) -> Result<Option<Vec<u8>>> {
    match &config.stub {
        StubSource::Generate => Ok(Some(StubGenerator::from_config(config, index).generate().into_bytes())),
        StubSource::Default => Ok(None),
        StubSource::File(path) => std::fs::read(path)
            .map(Some)
            .map_err(|source| BuildError::Read {
                path: path.clone(),
                source,
            }),
    }
}

fn signing_key(config: &Config) -> Result<Option<PrivateKey>> {
    if config.algorithm != Algorithm::OpenSsl {
        return Ok(None);
    }

    match &config.key {
        Some(path) => Ok(Some(PrivateKey::load(path, config.key_pass.clone())?)),
        None => Ok(None),
    }
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

/// Writes `bytes` to the temporary output, then moves it over the output.
/// The temporary file is removed on failure.
fn commit(config: &Config, bytes: &[u8]) -> Result<()> {
    let output = &config.output;
    let tmp = config.tmp_output();
    let output_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| BuildError::Output { path, source }
    };

    if let Some(parent) = output.parent() {
        std::fs::create_dir_all(parent).map_err(output_error(parent))?;
    }

    let written = std::fs::write(&tmp, bytes)
        .map_err(output_error(&tmp))
        .and_then(|_| match config.chmod {
            Some(mode) => set_mode(&tmp, mode).map_err(output_error(&tmp)),
            None => Ok(()),
        })
        .and_then(|_| std::fs::rename(&tmp, output).map_err(output_error(output)));

    if written.is_err() && tmp.exists() {
        if let Err(e) = std::fs::remove_file(&tmp) {
            tracing::warn!(path = %tmp.display(), error = %e, "could not remove temporary output");
        }
    }

    written
}

/// Writes the public key next to the committed archive. The archive is
/// removed again when the key cannot be written.
fn publish_key(config: &Config, pem: &[u8]) -> Result<PathBuf> {
    let path = signature::public_key_path(&config.output);

    match std::fs::write(&path, pem) {
        Ok(()) => Ok(path),
        Err(source) => {
            if let Err(e) = std::fs::remove_file(&config.output) {
                tracing::warn!(path = %config.output.display(), error = %e, "could not remove output");
            }
            Err(BuildError::Output { path, source })
        }
    }
}

/// Builds the archive described by `config`.
pub fn build(config: &Config, options: &BuildOptions) -> Result<BuildReport> {
    let mut archive = Archive::from_config(config)?;

    let files = collector::collect(config)?;
    let queue = files
        .regular
        .iter()
        .map(|file| (file, false))
        .chain(files.binary.iter().map(|file| (file, true)))
        .collect::<Vec<_>>();

    tracing::info!(files = queue.len(), serial = options.serial, "loading files");
    for loaded in load_all(&archive, &queue, options.serial)? {
        archive.insert(loaded)?;
    }

    let index = match &config.main {
        Some(main) => Some(add_main(&mut archive, config, main)?),
        None => None,
    };

    if config.check_requirements && config.stub == StubSource::Generate {
        let present = archive
            .writer()
            .entries()
            .iter()
            .any(|entry| entry.path.as_str() == REQUIREMENT_CHECKER);
        if !present {
            return Err(BuildError::MissingRequirementChecker);
        }
    }

    let stub = stub(config, index)?;
    let mut writer = archive.into_writer();
    if let Some(stub) = stub {
        writer.set_stub(stub)?;
    }
    if let Some(alias) = &config.alias {
        writer.set_alias(alias.clone());
    }
    if let Some(metadata) = &config.metadata {
        writer.set_metadata(metadata)?;
    }
    if let Some(mode) = config.file_mode {
        writer.set_file_mode(mode);
    }
    writer.set_timestamp(config.timestamp);
    writer.compress(config.compression);

    tracing::info!(entries = writer.len(), compression = %config.compression, "writing archive");
    let entries = writer.len();
    let bytes = writer.finalize()?;

    let key = signing_key(config)?;
    let signature = signature::sign(&bytes, config.algorithm, key.as_ref())?;
    let bytes = signature::append_trailer(bytes, &signature);
    tracing::info!(algorithm = %signature.algorithm(), "signed archive");

    let public_key = key.as_ref().map(signature::public_key_pem).transpose()?;

    commit(config, &bytes)?;

    let public_key = match public_key {
        Some(pem) => Some(publish_key(config, &pem)?),
        None => None,
    };

    tracing::info!(output = %config.output.display(), bytes = bytes.len(), "built archive");
    Ok(BuildReport {
        output: config.output.clone(),
        entries,
        size: bytes.len() as u64,
        signature,
        public_key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shebang_line_is_dropped() {
        assert_eq!(strip_shebang(b"#!/usr/bin/env php\n<?php".to_vec()), b"<?php");
        assert_eq!(strip_shebang(b"<?php\n#!x".to_vec()), b"<?php\n#!x");
        assert_eq!(strip_shebang(b"#!only".to_vec()), b"");
    }

    #[test]
    fn failed_commit_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_json_str("{}", dir.path()).unwrap();
        // A directory in the way of the output makes the rename fail.
        std::fs::create_dir(&config.output).unwrap();
        std::fs::write(config.output.join("keep"), "x").unwrap();

        assert!(matches!(
            commit(&config, b"archive"),
            Err(BuildError::Output { .. })
        ));
        assert!(!config.tmp_output().exists());
        assert!(config.output.join("keep").exists());
    }

    #[test]
    fn unwritable_public_key_removes_the_archive() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_json_str("{}", dir.path()).unwrap();
        commit(&config, b"archive").unwrap();
        std::fs::create_dir(signature::public_key_path(&config.output)).unwrap();

        assert!(matches!(
            publish_key(&config, b"-----BEGIN PUBLIC KEY-----"),
            Err(BuildError::Output { .. })
        ));
        assert!(!config.output.exists());
    }
}
