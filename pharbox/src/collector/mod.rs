//! Resolves the configured inclusion rules into the ordered sets of files to
//! archive.

mod blacklist;
pub mod composer;
mod finder;

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

pub use self::blacklist::Blacklist;
pub use self::finder::{is_vcs_dir, Finder, VCS_DIRS};

use crate::config::{Config, FinderRule};
use crate::error::{CollectError, Origin};

/// A file picked for the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedFile {
    /// Path relative to the base path, `/`-separated, before mapping.
    pub local: String,
    pub source: PathBuf,
    pub origin: Origin,
}

/// Regular files are compacted; binary files are archived untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedFileSet {
    pub regular: Vec<CollectedFile>,
    pub binary: Vec<CollectedFile>,
}

impl CollectedFileSet {
    pub fn len(&self) -> usize {
        self.regular.len() + self.binary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regular.is_empty() && self.binary.is_empty()
    }
}

/// Compares names case-insensitively, with digit runs compared by value, so
/// `file2` sorts before `file10`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        let (l, r) = match (left.peek(), right.peek()) {
            (None, None) => return a.cmp(b),
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(l), Some(r)) => (*l, *r),
        };

        if l.is_ascii_digit() && r.is_ascii_digit() {
            let ln = take_number(&mut left);
            let rn = take_number(&mut right);
            let (lt, rt) = (ln.trim_start_matches('0'), rn.trim_start_matches('0'));
            let ord = lt.len().cmp(&rt.len()).then_with(|| lt.cmp(rt));
            if ord != Ordering::Equal {
                return ord;
            }
            continue;
        }

        let ord = l.to_lowercase().cmp(r.to_lowercase());
        if ord != Ordering::Equal {
            return ord;
        }
        left.next();
        right.next();
    }
}

fn take_number<I: Iterator<Item = char>>(chars: &mut std::iter::Peekable<I>) -> String {
    let mut out = String::new();
    while let Some(c) = chars.next_if(|c| c.is_ascii_digit()) {
        out.push(c);
    }
    out
}

fn io_error(path: &Path, source: std::io::Error, origin: Origin) -> CollectError {
    if source.kind() == std::io::ErrorKind::NotFound {
        CollectError::NotFound {
            path: path.to_path_buf(),
            origin,
        }
    } else {
        CollectError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The first symlink among the components of `path` below `base`, the leaf
/// included. Components that cannot be read end the search.
pub fn symlinked_component(base: &Path, path: &Path) -> Option<PathBuf> {
    let rel = path.strip_prefix(base).ok()?;
    let mut current = base.to_path_buf();

    for component in rel.components() {
        current.push(component);
        match std::fs::symlink_metadata(&current) {
            Ok(meta) if meta.file_type().is_symlink() => return Some(current),
            Ok(_) => {}
            Err(_) => return None,
        }
    }

    None
}

fn check_symlinks(base: &Path, path: &Path, origin: Origin) -> Result<(), CollectError> {
    match symlinked_component(base, path) {
        Some(path) => Err(CollectError::Symlink { path, origin }),
        None => Ok(()),
    }
}

/// Declared files must be plain files reached without symlinks.
fn check_file(base: &Path, path: &Path, origin: Origin) -> Result<(), CollectError> {
    check_symlinks(base, path, origin)?;
    let meta = std::fs::symlink_metadata(path).map_err(|e| io_error(path, e, origin))?;
    let path = path.to_path_buf();

    if meta.file_type().is_symlink() {
        Err(CollectError::Symlink { path, origin })
    } else if meta.is_dir() {
        Err(CollectError::NotAFile { path, origin })
    } else {
        Ok(())
    }
}

/// Declared directories must be real directories reached without symlinks.
fn check_dir(base: &Path, path: &Path, origin: Origin) -> Result<(), CollectError> {
    check_symlinks(base, path, origin)?;
    let meta = std::fs::symlink_metadata(path).map_err(|e| io_error(path, e, origin))?;
    let path = path.to_path_buf();

    if meta.file_type().is_symlink() {
        Err(CollectError::Symlink { path, origin })
    } else if !meta.is_dir() {
        Err(CollectError::NotADirectory { path, origin })
    } else {
        Ok(())
    }
}

fn relative(entry: &DirEntry, root: &Path) -> String {
    entry
        .path()
        .strip_prefix(root)
        .map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default()
}

/// One of the two sets being built.
struct Collection<'a> {
    config: &'a Config,
    blacklist: &'a Blacklist,
    excluded: &'a HashSet<PathBuf>,
    files: Vec<CollectedFile>,
    seen: HashSet<String>,
}

impl<'a> Collection<'a> {
    fn new(config: &'a Config, blacklist: &'a Blacklist, excluded: &'a HashSet<PathBuf>) -> Self {
        Collection {
            config,
            blacklist,
            excluded,
            files: vec![],
            seen: HashSet::new(),
        }
    }

    /// Adds `source` unless it is excluded or already claimed. Filters run
    /// before the symlink check, so a blacklisted symlink is just skipped.
    fn push(&mut self, source: PathBuf, origin: Origin, filtered: bool) -> Result<(), CollectError> {
        let local = self
            .config
            .local_path(&source)
            .filter(|local| !local.is_empty())
            .ok_or_else(|| CollectError::OutsideBase {
                path: source.clone(),
                base: self.config.base_path.clone(),
            })?;

        if self.excluded.contains(&source) {
            tracing::trace!(%local, "skipping excluded path");
            return Ok(());
        }
        if filtered && self.blacklist.contains(&local) {
            tracing::trace!(%local, "skipping blacklisted path");
            return Ok(());
        }

        std::fs::symlink_metadata(&source).map_err(|e| io_error(&source, e, origin))?;
        check_symlinks(&self.config.base_path, &source, origin)?;

        if !self.seen.insert(local.clone()) {
            return Ok(());
        }

        tracing::debug!(%local, %origin, "collected");
        self.files.push(CollectedFile {
            local,
            source,
            origin,
        });
        Ok(())
    }

    /// Walks `root` in natural order. `accept` sees every entry below the
    /// root; rejecting a directory prunes it.
    fn walk<F>(&mut self, root: &Path, origin: Origin, mut accept: F) -> Result<(), CollectError>
    where
        F: FnMut(&DirEntry) -> bool,
    {
        if self.config.local_path(root).is_none() {
            return Err(CollectError::OutsideBase {
                path: root.to_path_buf(),
                base: self.config.base_path.clone(),
            });
        }

        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by(|a, b| natural_cmp(&a.file_name().to_string_lossy(), &b.file_name().to_string_lossy()))
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || accept(entry));

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(root).to_path_buf();
                CollectError::Io {
                    path,
                    source: e.into(),
                }
            })?;

            if entry.file_type().is_dir() {
                continue;
            }

            self.push(entry.into_path(), origin, true)?;
        }

        Ok(())
    }

    fn files(&mut self, files: &[PathBuf]) -> Result<(), CollectError> {
        for file in files {
            check_file(&self.config.base_path, file, Origin::File)?;
            self.push(file.clone(), Origin::File, false)?;
        }
        Ok(())
    }

    fn directories(&mut self, dirs: &[PathBuf]) -> Result<(), CollectError> {
        for dir in dirs {
            check_dir(&self.config.base_path, dir, Origin::Directory)?;
            self.walk(dir, Origin::Directory, |entry| {
                !(entry.file_type().is_dir() && is_vcs_dir(&entry.file_name().to_string_lossy()))
            })?;
        }
        Ok(())
    }

    fn finders(&mut self, rules: &[FinderRule]) -> Result<(), CollectError> {
        for rule in rules {
            let finder = Finder::new(rule, &self.config.base_path)?;

            for root in finder.roots() {
                check_dir(&self.config.base_path, root, Origin::FinderIn)?;
                self.walk(root, Origin::FinderIn, |entry| {
                    let rel = relative(entry, root);
                    let name = entry.file_name().to_string_lossy();
                    if entry.file_type().is_dir() {
                        finder.accepts_dir(&rel, &name)
                    } else {
                        finder.accepts_file(&rel, &name)
                    }
                })?;
            }

            for file in finder.append() {
                let blacklisted = self
                    .config
                    .local_path(file)
                    .map_or(false, |local| self.blacklist.contains(&local));
                if blacklisted {
                    continue;
                }
                check_file(&self.config.base_path, file, Origin::FinderAppend)?;
                self.push(file.clone(), Origin::FinderAppend, true)?;
            }
        }
        Ok(())
    }

    fn autodiscovery(&mut self) -> Result<(), CollectError> {
        let found = composer::discover(self.config)?;

        for file in found.files {
            if file.is_file() || file.is_symlink() {
                self.push(file, Origin::Autodiscovery, true)?;
            }
        }

        for dir in &found.directories {
            if !dir.is_dir() {
                tracing::debug!(path = %dir.display(), "autoload directory missing");
                continue;
            }

            self.walk(dir, Origin::Autodiscovery, |entry| {
                let name = entry.file_name().to_string_lossy();
                if entry.file_type().is_dir() {
                    !is_vcs_dir(&name)
                } else {
                    !composer::is_denied(&name) && !found.excluded.iter().any(|p| p == entry.path())
                }
            })?;
        }

        Ok(())
    }
}

/// Collects the regular and binary file sets for `config`.
///
/// Within a set, the first origin to claim a path keeps it. A path in both
/// sets ends up binary, unless both sets list it explicitly.
pub fn collect(config: &Config) -> Result<CollectedFileSet, CollectError> {
    let blacklist = Blacklist::new(&config.blacklist)?;

    let mut excluded = HashSet::new();
    excluded.insert(config.output.clone());
    excluded.insert(config.tmp_output());
    if let Some(main) = &config.main {
        excluded.insert(main.clone());
    }

    let mut binary = Collection::new(config, &blacklist, &excluded);
    binary.files(&config.files_bin)?;
    binary.directories(&config.directories_bin)?;
    binary.finders(&config.finder_bin)?;

    let mut regular = Collection::new(config, &blacklist, &excluded);
    regular.files(&config.files)?;
    regular.directories(&config.directories)?;
    regular.finders(&config.finder)?;
    if config.autodiscovery() {
        regular.autodiscovery()?;
    }

    let binary = binary.files;
    let claimed: HashMap<&str, Origin> = binary.iter().map(|f| (f.local.as_str(), f.origin)).collect();

    if let Some(file) = regular
        .files
        .iter()
        .find(|f| f.origin == Origin::File && claimed.get(f.local.as_str()) == Some(&Origin::File))
    {
        return Err(CollectError::Conflict {
            path: file.source.clone(),
        });
    }

    let regular = regular
        .files
        .into_iter()
        .filter(|f| !claimed.contains_key(f.local.as_str()))
        .collect::<Vec<_>>();

    tracing::info!(regular = regular.len(), binary = binary.len(), "collected files");
    Ok(CollectedFileSet { regular, binary })
}
