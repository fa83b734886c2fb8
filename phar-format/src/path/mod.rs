use relative_path::{Component, RelativePath};
use std::{
    fmt,
    path::{Path, PathBuf},
};

mod error;

pub use self::error::IntoPharPathError;

/// The separator used in `PharPath` type paths, regardless of platform.
pub const PATH_PHAR_SEP: &str = "/";

/// An archive-relative path: never absolute, never containing `..`, always
/// delimited by forward slashes with no empty or `.` chunks.
#[derive(Debug, Clone, PartialOrd, Ord, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct PharPath(pub(crate) String);

/// Splits a path into its normalised chunks, failing if any chunk cannot be
/// represented in an archive.
pub fn sanitize<S: AsRef<str>>(path: S) -> Result<Vec<String>, IntoPharPathError> {
    let path = path.as_ref().replace('\\', PATH_PHAR_SEP);

    if path.starts_with(PATH_PHAR_SEP) || has_drive_prefix(&path) {
        return Err(IntoPharPathError::Absolute);
    }

    let mut out = vec![];

    for component in RelativePath::new(&path).components() {
        match component {
            Component::CurDir => {}
            Component::Normal("") => {}
            Component::ParentDir => return Err(IntoPharPathError::ParentTraversal),
            Component::Normal(chunk) => {
                if chunk.chars().any(|c| c.is_control()) {
                    return Err(IntoPharPathError::UnrepresentableStr);
                }
                out.push(chunk.to_string());
            }
        }
    }

    Ok(out)
}

fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

impl PharPath {
    pub fn new<S: AsRef<str>>(path: S) -> std::result::Result<PharPath, IntoPharPathError> {
        let out = sanitize(path)?;

        if out.is_empty() {
            return Err(IntoPharPathError::EmptyPath);
        }

        Ok(PharPath(out.join(PATH_PHAR_SEP)))
    }

    /// Builds an archive path from a filesystem path relative to `base`.
    pub fn from_relative<P: AsRef<Path>, B: AsRef<Path>>(
        path: P,
        base: B,
    ) -> std::result::Result<PharPath, IntoPharPathError> {
        let relative = path
            .as_ref()
            .strip_prefix(base.as_ref())
            .map_err(|_| IntoPharPathError::OutsideBase)?;
        let relative = relative
            .to_str()
            .ok_or(IntoPharPathError::UnrepresentableStr)?;
        Self::new(relative)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_path_buf(&self) -> PathBuf {
        self.iter().collect()
    }

    pub fn parent(&self) -> Option<PharPath> {
        let mut parts: Vec<_> = self.iter().collect();
        if parts.len() == 1 {
            return None;
        }
        parts.pop();
        Some(PharPath(parts.join(PATH_PHAR_SEP)))
    }

    pub fn filename(&self) -> &str {
        self.iter().last().unwrap_or_default()
    }

    /// Lowercased extension of the final chunk, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.filename();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(name[idx + 1..].to_ascii_lowercase()),
        }
    }

    pub fn depth(&self) -> usize {
        self.0.matches(PATH_PHAR_SEP).count()
    }

    pub fn starts_with(&self, other: &PharPath) -> bool {
        let mut ours = self.iter();
        other.iter().all(|theirs| ours.next() == Some(theirs))
    }

    pub fn join<S: AsRef<str>>(&self, tail: S) -> std::result::Result<PharPath, IntoPharPathError> {
        Self::new(format!("{}{}{}", self.0, PATH_PHAR_SEP, tail.as_ref()))
    }

    pub fn iter(&self) -> std::str::Split<'_, &str> {
        self.0.split(PATH_PHAR_SEP)
    }
}

impl fmt::Display for PharPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PharPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
