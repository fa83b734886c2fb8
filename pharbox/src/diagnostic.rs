use std::path::PathBuf;

use miette::Diagnostic;
use phar_format::extract::ExtractError;
use phar_format::{Algorithm, OpenError, SignatureError};
use pharbox::error::{BuildError, ConfigError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error, Diagnostic)]
pub enum Error {
    #[error("Cannot determine the working directory")]
    CurrentDir {
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration")]
    #[diagnostic(help("See `pharbox validate --help`; unknown keys are rejected"))]
    Config {
        #[source]
        source: ConfigError,
    },

    #[error("Cannot build `{}`", .path.display())]
    Build {
        path: PathBuf,
        #[source]
        source: BuildError,
    },

    #[error("Cannot open archive `{}`", .path.display())]
    #[diagnostic(help("Is this a valid .phar file?"))]
    OpenArchive {
        path: PathBuf,
        #[source]
        source: OpenError,
    },

    #[error("Cannot extract `{}`", .path.display())]
    Extract {
        path: PathBuf,
        #[source]
        source: ExtractError,
    },

    #[error("Archive `{}` is not signed", .path.display())]
    #[diagnostic(help("The archive has no signature trailer; it may have been truncated"))]
    NotSigned { path: PathBuf },

    #[error("The {algorithm} signature of `{}` does not match its contents", .path.display())]
    #[diagnostic(help("The archive was modified after it was signed"))]
    InvalidSignature { path: PathBuf, algorithm: Algorithm },

    #[error("Cannot verify `{}`", .path.display())]
    Verify {
        path: PathBuf,
        #[source]
        source: SignatureError,
    },

    #[error("Archive metadata of `{}` is not valid JSON", .path.display())]
    Metadata {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
