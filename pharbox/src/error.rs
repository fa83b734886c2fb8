use std::path::PathBuf;

use phar_format::path::IntoPharPathError;
use phar_format::{Algorithm, PharPath, SignatureError, WriteError};

pub type Result<T> = std::result::Result<T, BuildError>;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No configuration file found in `{}` (looked for pharbox.json and pharbox.json.dist)", .dir.display())]
    NotFound { dir: PathBuf },

    #[error("Cannot read configuration `{}`", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse configuration `{}`", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Base path `{}` is not an accessible directory", .path.display())]
    InvalidBasePath {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unknown compression `{0}`")]
    UnknownCompression(String),

    #[error("Unknown signing algorithm `{0}`")]
    UnknownAlgorithm(String),

    #[error("The {0} algorithm requires a private key (`key`)")]
    MissingKey(Algorithm),

    #[error("`{key}` must be an octal permission value, got `{value}`")]
    InvalidMode { key: &'static str, value: String },

    #[error("Map entry {index} must contain exactly one prefix")]
    InvalidMapEntry { index: usize },

    #[error("The catch-all (empty) map prefix must be the last rule")]
    CatchAllNotLast,

    #[error("Unknown compactor `{0}`")]
    UnknownCompactor(String),

    #[error("The `{compactor}` compactor requires `{key}` to be set")]
    MissingSetting {
        compactor: &'static str,
        key: &'static str,
    },

    #[error("Shebang `{0}` must start with `#!`")]
    InvalidShebang(String),

    #[error("`metadata` must not be null; omit the key instead")]
    NullMetadata,

    #[error("Invalid namespace prefix `{0}`")]
    InvalidNamespacePrefix(String),

    #[error("Cannot compile pattern")]
    InvalidPattern(#[source] regex::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum CollectError {
    #[error("{origin} `{}` does not exist", .path.display())]
    NotFound { path: PathBuf, origin: Origin },

    #[error("{origin} `{}` is a directory, expected a file", .path.display())]
    NotAFile { path: PathBuf, origin: Origin },

    #[error("{origin} `{}` is a file, expected a directory", .path.display())]
    NotADirectory { path: PathBuf, origin: Origin },

    #[error("Cannot add `{}` ({origin}): symlinks are not supported", .path.display())]
    Symlink { path: PathBuf, origin: Origin },

    #[error("`{}` is outside the base path `{}`", .path.display(), .base.display())]
    OutsideBase { path: PathBuf, base: PathBuf },

    #[error("`{}` is declared as both a regular and a binary file", .path.display())]
    Conflict { path: PathBuf },

    #[error("Invalid pattern `{pattern}`")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },

    #[error("Invalid regular expression `{pattern}`")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Cannot read `{}`", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse dependency manifest `{}`", .path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Where a collected path was declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    File,
    Directory,
    FinderIn,
    FinderAppend,
    Autodiscovery,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Origin::File => "file",
            Origin::Directory => "directory",
            Origin::FinderIn => "finder directory",
            Origin::FinderAppend => "finder appended file",
            Origin::Autodiscovery => "autodiscovered path",
        };
        f.write_str(s)
    }
}

/// Why a single compactor rejected a file.
#[derive(Debug, thiserror::Error)]
pub enum CompactFailure {
    #[error("invalid JSON")]
    Json(#[source] serde_json::Error),

    #[error("unterminated comment starting on line {line}")]
    UnterminatedComment { line: usize },

    #[error("unterminated string starting on line {line}")]
    UnterminatedString { line: usize },

    #[error("unterminated heredoc `{label}` starting on line {line}")]
    UnterminatedHeredoc { label: String, line: usize },
}

#[derive(Debug, thiserror::Error)]
#[error("Compactor `{compactor}` failed on `{path}`: {source}")]
pub struct CompactionError {
    pub path: PharPath,
    pub compactor: &'static str,
    #[source]
    pub source: CompactFailure,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Collect(#[from] CollectError),

    #[error(transparent)]
    Compaction(#[from] CompactionError),

    #[error("Cannot read `{}`", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot represent `{path}` inside the archive")]
    InvalidPath {
        path: String,
        #[source]
        source: IntoPharPathError,
    },

    #[error("`check-requirements` is set but `.pharbox/bin/check-requirements.php` is not in the archive")]
    MissingRequirementChecker,

    #[error("Cannot add entry to archive")]
    Write(#[from] WriteError),

    #[error("Cannot sign archive")]
    Signature(#[from] SignatureError),

    #[error("Cannot write `{}`", .path.display())]
    Output {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
